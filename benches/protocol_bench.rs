use criterion::{black_box, criterion_group, criterion_main, Criterion};
use beacon_core::clock::ManualClock;
use beacon_core::codec;
use beacon_core::config::{default_network, SessionConfig};
use beacon_core::contracts::OutgoingMessage;
use beacon_core::exchange::ExchangeEngine;
use beacon_core::sim::{LinkScript, SimulatedLink, SimulatedStation, StationScript};
use beacon_core::transport::TransportBinding;
use beacon_core::{Endpoint, Payload, RetryPolicy, SendRetryMode, Session};

fn benchmark_encode(c: &mut Criterion) {
    let payload = Payload::body("Component server-ready check at 1699470000ms");
    let mut out = OutgoingMessage::new();

    c.bench_function("encode_readiness_payload", |b| {
        b.iter(|| codec::encode(black_box(&payload), &mut out));
    });
}

fn benchmark_exchange(c: &mut Criterion) {
    let payload = Payload::body("Elapsed time: 312ms");
    let send = RetryPolicy::from_millis(5, 10).unwrap();
    let ack = RetryPolicy::from_millis(5, 20).unwrap();

    c.bench_function("simulated_exchange", |b| {
        b.iter(|| {
            let mut transport = TransportBinding::new(
                SimulatedLink::new(LinkScript::acking("ACK")),
                Endpoint::localhost(41235),
                Endpoint::localhost(41234),
            );
            transport.listen().unwrap();
            let engine = ExchangeEngine::new(ManualClock::new(), SendRetryMode::default());
            engine.send_and_await_ack(&mut transport, black_box(&payload), send, ack)
        });
    });
}

fn benchmark_session(c: &mut Criterion) {
    c.bench_function("simulated_wake_cycle", |b| {
        b.iter(|| {
            let mut session = Session::new(
                SessionConfig::default(),
                default_network(),
                SimulatedStation::new(StationScript::ConnectAfterPolls(4)),
                SimulatedLink::new(LinkScript::acking("ACK").dropping_first(1)),
                ManualClock::new(),
            )
            .unwrap();
            session.run()
        });
    });
}

criterion_group!(
    benches,
    benchmark_encode,
    benchmark_exchange,
    benchmark_session
);
criterion_main!(benches);
