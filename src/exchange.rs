/// Reliable exchange engine - bounded send then bounded wait for ACK
///
/// Imposes "sent, then acknowledged" on a transport that guarantees neither.
/// The engine keeps no buffers of its own: it encodes into, sends from, and
/// receives into the transport binding it borrows for the call.
use std::borrow::Cow;

use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::codec;
use crate::contracts::{ExchangeOutcome, Payload, RetryPolicy, SendRetryMode};
use crate::errors::BeaconError;
use crate::transport::{DatagramIo, TransportBinding};

/// Exchange engine
///
/// Every failure below it (encode, open, write, close, ack timeout) is
/// logged here and collapsed into an [`ExchangeOutcome`].
pub struct ExchangeEngine<C> {
    clock: C,
    send_mode: SendRetryMode,
}

impl<C: Clock> ExchangeEngine<C> {
    pub fn new(clock: C, send_mode: SendRetryMode) -> Self {
        Self { clock, send_mode }
    }

    pub fn send_mode(&self) -> SendRetryMode {
        self.send_mode
    }

    /// Send `payload` and wait for any datagram in reply
    ///
    /// # Arguments
    /// * `transport` - Bound transport; its buffers are reused for this call
    /// * `payload` - Body mapping to encode
    /// * `send_retry` - Send attempts and the delay before each one
    /// * `ack_retry` - Receive polls and the delay between them
    ///
    /// # Returns
    /// - `EncodeFailed` without touching the transport if the payload does not fit
    /// - `SendFailed` if no attempt got the datagram out
    /// - `NoAckReceived` after exactly `ack_retry.max_attempts()` empty polls
    /// - `Success` on the first non-empty datagram, whatever it contains
    pub fn send_and_await_ack<D: DatagramIo>(
        &self,
        transport: &mut TransportBinding<D>,
        payload: &Payload,
        send_retry: RetryPolicy,
        ack_retry: RetryPolicy,
    ) -> ExchangeOutcome {
        if let Err(e) = codec::encode(payload, transport.outgoing_mut()) {
            warn!(error = %e, "payload does not fit outgoing buffer");
            return ExchangeOutcome::EncodeFailed;
        }

        if !self.send_with_retry(transport, send_retry) {
            return ExchangeOutcome::SendFailed;
        }

        if self.await_ack(transport, ack_retry) {
            ExchangeOutcome::Success
        } else {
            ExchangeOutcome::NoAckReceived
        }
    }

    fn send_with_retry<D: DatagramIo>(
        &self,
        transport: &mut TransportBinding<D>,
        policy: RetryPolicy,
    ) -> bool {
        let max_attempts = match self.send_mode {
            SendRetryMode::UpToMaxAttempts => policy.max_attempts(),
            SendRetryMode::StopAfterFirstFailure => 1,
        };

        for attempt in 1..=max_attempts {
            self.clock.sleep(policy.delay());
            match transport.send_outgoing() {
                Ok(bytes) => {
                    // Let the network stack push the datagram out.
                    self.clock.yield_now();
                    debug!(
                        bytes,
                        attempt,
                        at_ms = self.clock.now_ms(),
                        remote = %transport.remote(),
                        "sent packet"
                    );
                    return true;
                }
                Err(e) => warn!(error = %e, attempt, max_attempts, "send attempt failed"),
            }
        }
        false
    }

    fn await_ack<D: DatagramIo>(
        &self,
        transport: &mut TransportBinding<D>,
        policy: RetryPolicy,
    ) -> bool {
        let max_attempts = policy.max_attempts();

        for attempt in 1..=max_attempts {
            match transport.poll_incoming() {
                Ok(Some(received)) => {
                    if received.from != transport.remote() {
                        warn!(from = %received.from, "ACK from unexpected endpoint accepted");
                    }
                    info!(
                        bytes = received.len,
                        from = %received.from,
                        attempt,
                        at_ms = self.clock.now_ms(),
                        reply = %ack_text(transport.incoming()),
                        "received ACK"
                    );
                    return true;
                }
                Ok(None) => {}
                Err(e) => warn!(error = %e, attempt, "receive poll failed"),
            }
            if attempt < max_attempts {
                self.clock.sleep(policy.delay());
            }
        }

        warn!(error = %BeaconError::AckTimeout { attempts: max_attempts }, "giving up on ACK");
        false
    }
}

/// Reply text for diagnostics; acks are opaque so invalid UTF-8 is tolerated
fn ack_text(bytes: &[u8]) -> Cow<'_, str> {
    match codec::decode_text(bytes) {
        Ok(text) => Cow::Borrowed(text),
        Err(_) => String::from_utf8_lossy(bytes),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::contracts::Endpoint;
    use crate::sim::{LinkScript, SendFault, SimulatedLink};
    use std::time::Duration;

    const LOCAL: Endpoint = Endpoint::new_v4(172, 24, 1, 20, 41235);
    const REMOTE: Endpoint = Endpoint::new_v4(172, 24, 1, 1, 41234);

    fn send_policy() -> RetryPolicy {
        RetryPolicy::from_millis(5, 10).unwrap()
    }

    fn ack_policy() -> RetryPolicy {
        RetryPolicy::from_millis(5, 20).unwrap()
    }

    fn setup(
        script: LinkScript,
        mode: SendRetryMode,
    ) -> (ExchangeEngine<ManualClock>, TransportBinding<SimulatedLink>, SimulatedLink, ManualClock)
    {
        let link = SimulatedLink::new(script);
        let clock = ManualClock::new();
        let mut transport = TransportBinding::new(link.clone(), LOCAL, REMOTE);
        transport.listen().unwrap();
        (ExchangeEngine::new(clock.clone(), mode), transport, link, clock)
    }

    #[test]
    fn test_success_on_first_attempt() {
        let (engine, mut transport, link, clock) =
            setup(LinkScript::acking("ACK"), SendRetryMode::default());

        let outcome =
            engine.send_and_await_ack(&mut transport, &Payload::body("hi"), send_policy(), ack_policy());

        assert_eq!(outcome, ExchangeOutcome::Success);
        let stats = link.stats();
        assert_eq!(stats.sent, vec![br#"{"body":"hi"}"#.to_vec()]);
        assert_eq!(stats.polls, 1);
        assert_eq!(clock.sleeps(), vec![Duration::from_millis(10)]);
        assert_eq!(clock.yield_count(), 1);
        assert_eq!(transport.incoming(), b"ACK");
    }

    #[test]
    fn test_oversize_payload_does_no_io() {
        let (engine, mut transport, link, clock) =
            setup(LinkScript::acking("ACK"), SendRetryMode::default());

        let outcome = engine.send_and_await_ack(
            &mut transport,
            &Payload::body("x".repeat(200)),
            send_policy(),
            ack_policy(),
        );

        assert_eq!(outcome, ExchangeOutcome::EncodeFailed);
        assert_eq!(link.stats().io_calls(), 0);
        assert_eq!(clock.sleep_count(), 0);
    }

    #[test]
    fn test_silent_peer_polls_exactly_max_attempts() {
        let (engine, mut transport, link, clock) =
            setup(LinkScript::silent(), SendRetryMode::default());

        let outcome =
            engine.send_and_await_ack(&mut transport, &Payload::body("hi"), send_policy(), ack_policy());

        assert_eq!(outcome, ExchangeOutcome::NoAckReceived);
        assert_eq!(link.stats().polls, 5);
        // One send delay, then four gaps between five polls.
        let mut expected = vec![Duration::from_millis(10)];
        expected.extend(vec![Duration::from_millis(20); 4]);
        assert_eq!(clock.sleeps(), expected);
    }

    #[test]
    fn test_failing_sends_retry_up_to_max_attempts() {
        for fault in [SendFault::Open, SendFault::Write, SendFault::Close] {
            let (engine, mut transport, link, clock) = setup(
                LinkScript::acking("ACK").with_send_fault(fault, u32::MAX),
                SendRetryMode::UpToMaxAttempts,
            );

            let outcome = engine.send_and_await_ack(
                &mut transport,
                &Payload::body("hi"),
                send_policy(),
                ack_policy(),
            );

            assert_eq!(outcome, ExchangeOutcome::SendFailed, "fault {:?}", fault);
            let stats = link.stats();
            assert_eq!(stats.begins, 5, "fault {:?}", fault);
            assert_eq!(stats.polls, 0, "no ack wait after a failed send");
            assert!(stats.sent.is_empty());
            assert_eq!(clock.sleep_count(), 5);
        }
    }

    #[test]
    fn test_compat_mode_stops_after_first_failure() {
        let (engine, mut transport, link, _clock) = setup(
            LinkScript::acking("ACK").with_send_fault(SendFault::Open, u32::MAX),
            SendRetryMode::StopAfterFirstFailure,
        );

        let outcome =
            engine.send_and_await_ack(&mut transport, &Payload::body("hi"), send_policy(), ack_policy());

        assert_eq!(outcome, ExchangeOutcome::SendFailed);
        assert_eq!(link.stats().begins, 1);
    }

    #[test]
    fn test_transient_send_failure_recovers() {
        let (engine, mut transport, link, _clock) = setup(
            LinkScript::acking("ACK").with_send_fault(SendFault::Close, 2),
            SendRetryMode::default(),
        );

        let outcome =
            engine.send_and_await_ack(&mut transport, &Payload::body("hi"), send_policy(), ack_policy());

        assert_eq!(outcome, ExchangeOutcome::Success);
        assert_eq!(link.stats().begins, 3);
        assert_eq!(link.stats().sent.len(), 1);
    }

    #[test]
    fn test_late_ack_within_budget() {
        let (engine, mut transport, link, _clock) =
            setup(LinkScript::acking("ACK").with_ack_delay(3), SendRetryMode::default());

        let outcome =
            engine.send_and_await_ack(&mut transport, &Payload::body("hi"), send_policy(), ack_policy());

        assert_eq!(outcome, ExchangeOutcome::Success);
        assert_eq!(link.stats().polls, 4);
    }

    #[test]
    fn test_ack_beyond_budget_is_missed() {
        let (engine, mut transport, link, _clock) =
            setup(LinkScript::acking("ACK").with_ack_delay(5), SendRetryMode::default());

        let outcome =
            engine.send_and_await_ack(&mut transport, &Payload::body("hi"), send_policy(), ack_policy());

        assert_eq!(outcome, ExchangeOutcome::NoAckReceived);
        assert_eq!(link.stats().polls, 5);
        assert_eq!(link.pending(), 1);
    }

    #[test]
    fn test_any_datagram_counts_as_ack() {
        let (engine, mut transport, link, _clock) =
            setup(LinkScript::silent(), SendRetryMode::default());
        link.inject(&[0xff, 0x00, 0xfe], Endpoint::new_v4(10, 0, 0, 9, 9999));

        let outcome =
            engine.send_and_await_ack(&mut transport, &Payload::body("hi"), send_policy(), ack_policy());

        assert_eq!(outcome, ExchangeOutcome::Success);
        assert_eq!(transport.incoming(), &[0xffu8, 0x00, 0xfe]);
    }

    #[test]
    fn test_empty_datagram_is_not_an_ack() {
        let (engine, mut transport, link, _clock) =
            setup(LinkScript::silent(), SendRetryMode::default());
        link.inject(b"", REMOTE);

        let outcome =
            engine.send_and_await_ack(&mut transport, &Payload::body("hi"), send_policy(), ack_policy());

        assert_eq!(outcome, ExchangeOutcome::NoAckReceived);
        assert_eq!(link.stats().polls, 5);
    }

    #[test]
    fn test_ack_text_tolerates_invalid_utf8() {
        assert_eq!(ack_text(b"ACK"), "ACK");
        assert_eq!(ack_text(&[b'o', b'k', 0xff]), "ok\u{fffd}");
    }
}
