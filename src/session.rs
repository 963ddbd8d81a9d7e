//! Session orchestrator: one wake cycle as an explicit state machine.
//!
//! ```text
//! Idle -> Connecting -> ProbingReadiness -> SendingEvent -> Done(Success)
//!             |                |                 |
//!             +----------------+-----------------+--> Done(Failure(cause))
//! ```
//!
//! `Done` is terminal. A device runs exactly one session per wake and keeps
//! no memory of earlier failures.

use tracing::{info, warn};

use crate::clock::Clock;
use crate::config::SessionConfig;
use crate::connectivity::{ConnectivityManager, NetworkConfig, WifiStation};
use crate::contracts::{ExchangeOutcome, Payload};
use crate::errors::Result;
use crate::exchange::ExchangeEngine;
use crate::transport::{DatagramIo, TransportBinding};

/// Why a session ended without delivering its event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureCause {
    /// Access point never reported connected.
    ConnectivityTimeout,
    /// Local endpoint could not be bound.
    TransportUnavailable,
    /// Every readiness exchange failed.
    ServerNotReady,
    /// The event exchange failed.
    EventNotDelivered,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    Success,
    Failure(FailureCause),
}

impl SessionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Connecting,
    ProbingReadiness,
    SendingEvent,
    Done(SessionOutcome),
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done(_))
    }
}

/// Body of the readiness probe.
pub fn readiness_payload(now_ms: u64) -> Payload {
    Payload::body(format!("Component server-ready check at {}ms", now_ms))
}

/// Body of the event notification.
pub fn event_payload(elapsed_ms: u64) -> Payload {
    Payload::body(format!("Elapsed time: {}ms", elapsed_ms))
}

pub struct Session<W, D, C> {
    connectivity: ConnectivityManager<W, C>,
    transport: TransportBinding<D>,
    engine: ExchangeEngine<C>,
    config: SessionConfig,
    clock: C,
    state: SessionState,
    trail: Vec<SessionState>,
}

impl<W, D, C> Session<W, D, C>
where
    W: WifiStation,
    D: DatagramIo,
    C: Clock + Clone,
{
    /// # Errors
    /// Returns `BeaconError::InvalidConfig` if the network configuration is malformed.
    pub fn new(
        config: SessionConfig,
        network: NetworkConfig,
        station: W,
        io: D,
        clock: C,
    ) -> Result<Self> {
        let connectivity = ConnectivityManager::new(station, network, config.connect, clock.clone())?;
        let transport = TransportBinding::new(io, config.local, config.remote);
        let engine = ExchangeEngine::new(clock.clone(), config.send_mode);
        Ok(Self {
            connectivity,
            transport,
            engine,
            config,
            clock,
            state: SessionState::Idle,
            trail: vec![SessionState::Idle],
        })
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Every state entered so far, starting with `Idle`.
    pub fn trail(&self) -> &[SessionState] {
        &self.trail
    }

    /// Whether the session ever entered `state`.
    pub fn visited(&self, state: SessionState) -> bool {
        self.trail.contains(&state)
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn transport(&self) -> &TransportBinding<D> {
        &self.transport
    }

    pub fn outcome(&self) -> Option<SessionOutcome> {
        match self.state {
            SessionState::Done(outcome) => Some(outcome),
            _ => None,
        }
    }

    /// Perform exactly one transition and return the new state.
    ///
    /// On a finished session this is a no-op.
    pub fn step(&mut self) -> SessionState {
        let next = match self.state {
            SessionState::Idle => {
                info!(at_ms = self.clock.now_ms(), "awake, starting session");
                SessionState::Connecting
            }
            SessionState::Connecting => self.connect(),
            SessionState::ProbingReadiness => self.probe_readiness(),
            SessionState::SendingEvent => self.send_event(),
            done @ SessionState::Done(_) => return done,
        };
        self.enter(next);
        next
    }

    /// Drive the session to `Done`.
    pub fn run(&mut self) -> SessionOutcome {
        loop {
            if let SessionState::Done(outcome) = self.step() {
                return outcome;
            }
        }
    }

    fn enter(&mut self, next: SessionState) {
        self.state = next;
        self.trail.push(next);
        match next {
            SessionState::Done(SessionOutcome::Success) => {
                info!(at_ms = self.clock.now_ms(), "session complete")
            }
            SessionState::Done(SessionOutcome::Failure(cause)) => {
                warn!(?cause, at_ms = self.clock.now_ms(), "session failed")
            }
            _ => {}
        }
    }

    fn connect(&mut self) -> SessionState {
        if !self.connectivity.connect() {
            return SessionState::Done(SessionOutcome::Failure(FailureCause::ConnectivityTimeout));
        }
        if let Err(e) = self.transport.listen() {
            warn!(error = %e, local = %self.transport.local(), "failed to initialize UDP");
            return SessionState::Done(SessionOutcome::Failure(FailureCause::TransportUnavailable));
        }
        info!(local = %self.transport.local(), "listening");
        SessionState::ProbingReadiness
    }

    fn probe_readiness(&mut self) -> SessionState {
        let policy = self.config.readiness;
        let max_attempts = policy.max_attempts();

        for attempt in 1..=max_attempts {
            let now_ms = self.clock.now_ms();
            info!(attempt, at_ms = now_ms, "server-ready check");
            let outcome = self.engine.send_and_await_ack(
                &mut self.transport,
                &readiness_payload(now_ms),
                self.config.send,
                self.config.ack,
            );
            match outcome {
                ExchangeOutcome::Success => {
                    info!(attempt, "component server is ready");
                    return SessionState::SendingEvent;
                }
                // Deterministic; retrying cannot help.
                ExchangeOutcome::EncodeFailed => break,
                other => warn!(attempt, ?other, "component server is not ready"),
            }
            if attempt < max_attempts {
                self.clock.sleep(policy.delay());
            }
        }
        SessionState::Done(SessionOutcome::Failure(FailureCause::ServerNotReady))
    }

    fn send_event(&mut self) -> SessionState {
        let elapsed_ms = self.clock.now_ms();
        info!(elapsed_ms, "sending event message");
        let outcome = self.engine.send_and_await_ack(
            &mut self.transport,
            &event_payload(elapsed_ms),
            self.config.send,
            self.config.ack,
        );
        if outcome.is_success() {
            SessionState::Done(SessionOutcome::Success)
        } else {
            warn!(?outcome, "event message not acknowledged");
            SessionState::Done(SessionOutcome::Failure(FailureCause::EventNotDelivered))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::codec;
    use crate::config::default_network;
    use crate::sim::{LinkScript, SimulatedLink, SimulatedStation, StationScript};

    fn session(
        station: StationScript,
        link: LinkScript,
    ) -> (Session<SimulatedStation, SimulatedLink, ManualClock>, SimulatedLink) {
        let link = SimulatedLink::new(link);
        let session = Session::new(
            SessionConfig::default(),
            default_network(),
            SimulatedStation::new(station),
            link.clone(),
            ManualClock::starting_at(12),
        )
        .unwrap();
        (session, link)
    }

    #[test]
    fn test_step_walks_happy_path() {
        let (mut session, _link) =
            session(StationScript::AlreadyConnected, LinkScript::acking("ACK"));

        assert_eq!(session.state(), SessionState::Idle);
        assert_eq!(session.step(), SessionState::Connecting);
        assert_eq!(session.step(), SessionState::ProbingReadiness);
        assert_eq!(session.step(), SessionState::SendingEvent);
        assert_eq!(session.step(), SessionState::Done(SessionOutcome::Success));
        assert_eq!(session.outcome(), Some(SessionOutcome::Success));
    }

    #[test]
    fn test_done_is_terminal() {
        let (mut session, link) = session(StationScript::AlreadyConnected, LinkScript::acking("ACK"));
        assert!(session.run().is_success());
        let before = link.stats();
        let trail_len = session.trail().len();

        assert_eq!(session.step(), SessionState::Done(SessionOutcome::Success));
        assert_eq!(session.run(), SessionOutcome::Success);
        assert_eq!(link.stats(), before, "finished session must not touch the transport");
        assert_eq!(session.trail().len(), trail_len);
    }

    #[test]
    fn test_payload_bodies() {
        let (mut session, link) = session(StationScript::AlreadyConnected, LinkScript::acking("ACK"));
        session.run();

        let sent = link.stats().sent;
        assert_eq!(sent.len(), 2);
        let probe = codec::decode_payload(&sent[0]).unwrap();
        assert!(probe.body_text().unwrap().starts_with("Component server-ready check at "));
        let event = codec::decode_payload(&sent[1]).unwrap();
        assert!(event.body_text().unwrap().starts_with("Elapsed time: "));
        assert!(event.body_text().unwrap().ends_with("ms"));
    }

    #[test]
    fn test_bind_failure_ends_session() {
        let (mut session, link) =
            session(StationScript::AlreadyConnected, LinkScript::acking("ACK").failing_bind());

        assert_eq!(
            session.run(),
            SessionOutcome::Failure(FailureCause::TransportUnavailable)
        );
        assert!(!session.visited(SessionState::ProbingReadiness));
        assert_eq!(link.stats().io_calls(), 0);
    }

    #[test]
    fn test_event_failure_after_ready() {
        // A stray datagram satisfies the probe; the peer itself never answers.
        let (mut session, link) = session(StationScript::AlreadyConnected, LinkScript::silent());

        assert_eq!(session.step(), SessionState::Connecting);
        assert_eq!(session.step(), SessionState::ProbingReadiness);
        link.inject(b"late reply", crate::config::SERVER_ENDPOINT);
        assert_eq!(session.step(), SessionState::SendingEvent);
        assert_eq!(
            session.step(),
            SessionState::Done(SessionOutcome::Failure(FailureCause::EventNotDelivered))
        );
        assert_eq!(link.stats().sent.len(), 2);
    }

    #[test]
    fn test_readiness_payload_fits_buffer() {
        let mut out = crate::contracts::OutgoingMessage::new();
        assert!(codec::encode(&readiness_payload(u64::MAX), &mut out).is_ok());
        assert!(codec::encode(&event_payload(u64::MAX), &mut out).is_ok());
    }
}
