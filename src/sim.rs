//! Network simulator for deterministic testing.
//!
//! Real wireless links drop the first packet or two while the peer's stack
//! wakes up, refuse to open send contexts, and sometimes never associate.
//! To exercise the retry loops without a radio, this module provides:
//!
//! | Type               | Stands in for                                   |
//! |--------------------|-------------------------------------------------|
//! | [`SimulatedLink`]  | the UDP stack plus a component server behind it |
//! | [`SimulatedStation`] | the Wi-Fi station driver                      |
//!
//! Both are cheap handles over shared state: clone one, hand the clone to the
//! code under test, and inspect the original afterwards. Random loss uses a
//! seeded [`StdRng`] so failures are reproducible.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::connectivity::{NetworkConfig, WifiStation};
use crate::contracts::Endpoint;
use crate::errors::{BeaconError, Result};
use crate::transport::DatagramIo;

/// Which send sub-step fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendFault {
    Open,
    Write,
    Close,
}

/// How the simulated component server answers a delivered datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerBehavior {
    /// Never replies.
    Silent,
    /// Replies with fixed text.
    Ack(String),
    /// Sends the datagram straight back (loopback).
    Echo,
}

/// Fault model for a [`SimulatedLink`].
#[derive(Debug, Clone)]
pub struct LinkScript {
    pub peer: PeerBehavior,
    pub send_fault: Option<SendFault>,
    /// Send attempts (counted from the first) that hit `send_fault`.
    pub failing_sends: u32,
    /// Datagrams that leave the device but are lost, counted from the first.
    pub drop_first: u32,
    /// Probability in `[0.0, 1.0]` that any other datagram is lost.
    pub loss_rate: f64,
    /// Extra polls before a reply becomes visible.
    pub ack_after_polls: u32,
    pub seed: u64,
    pub bind_fails: bool,
}

impl LinkScript {
    pub fn new(peer: PeerBehavior) -> Self {
        Self {
            peer,
            send_fault: None,
            failing_sends: 0,
            drop_first: 0,
            loss_rate: 0.0,
            ack_after_polls: 0,
            seed: 0,
            bind_fails: false,
        }
    }

    /// Healthy link with a server that acks everything.
    pub fn acking(text: &str) -> Self {
        Self::new(PeerBehavior::Ack(text.to_string()))
    }

    /// Healthy link with a server that never answers.
    pub fn silent() -> Self {
        Self::new(PeerBehavior::Silent)
    }

    pub fn echo() -> Self {
        Self::new(PeerBehavior::Echo)
    }

    pub fn with_send_fault(mut self, fault: SendFault, attempts: u32) -> Self {
        self.send_fault = Some(fault);
        self.failing_sends = attempts;
        self
    }

    pub fn dropping_first(mut self, datagrams: u32) -> Self {
        self.drop_first = datagrams;
        self
    }

    pub fn with_loss(mut self, rate: f64, seed: u64) -> Self {
        self.loss_rate = rate.clamp(0.0, 1.0);
        self.seed = seed;
        self
    }

    pub fn with_ack_delay(mut self, polls: u32) -> Self {
        self.ack_after_polls = polls;
        self
    }

    pub fn failing_bind(mut self) -> Self {
        self.bind_fails = true;
        self
    }
}

/// Counters collected by a [`SimulatedLink`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkStats {
    pub binds: u32,
    pub begins: u32,
    pub writes: u32,
    pub ends: u32,
    pub polls: u32,
    /// Every datagram that left the device, in order.
    pub sent: Vec<Vec<u8>>,
    pub lost: u32,
    pub replies: u32,
}

impl LinkStats {
    /// Any transport activity at all beyond binding.
    pub fn io_calls(&self) -> u32 {
        self.begins + self.writes + self.ends + self.polls
    }
}

#[derive(Debug)]
struct Pending {
    bytes: Vec<u8>,
    from: Endpoint,
    ready_at: u32,
}

#[derive(Debug)]
struct LinkState {
    script: LinkScript,
    rng: StdRng,
    stats: LinkStats,
    open: Option<(Endpoint, Vec<u8>)>,
    attempt_fails: bool,
    inbound: VecDeque<Pending>,
}

impl LinkState {
    fn fault_is(&self, stage: SendFault) -> bool {
        self.attempt_fails && self.script.send_fault == Some(stage)
    }

    fn deliver(&mut self, remote: Endpoint, bytes: Vec<u8>) {
        let index = self.stats.sent.len() as u32;
        self.stats.sent.push(bytes.clone());

        let lost = index < self.script.drop_first
            || (self.script.loss_rate > 0.0 && self.rng.gen_bool(self.script.loss_rate));
        if lost {
            self.stats.lost += 1;
            return;
        }

        let reply = match &self.script.peer {
            PeerBehavior::Silent => return,
            PeerBehavior::Ack(text) => text.as_bytes().to_vec(),
            PeerBehavior::Echo => bytes,
        };
        let ready_at = self.stats.polls + 1 + self.script.ack_after_polls;
        self.inbound.push_back(Pending { bytes: reply, from: remote, ready_at });
        self.stats.replies += 1;
    }
}

/// In-memory datagram link with a scripted component server.
#[derive(Debug, Clone)]
pub struct SimulatedLink {
    state: Rc<RefCell<LinkState>>,
}

impl SimulatedLink {
    pub fn new(script: LinkScript) -> Self {
        let rng = StdRng::seed_from_u64(script.seed);
        Self {
            state: Rc::new(RefCell::new(LinkState {
                script,
                rng,
                stats: LinkStats::default(),
                open: None,
                attempt_fails: false,
                inbound: VecDeque::new(),
            })),
        }
    }

    pub fn stats(&self) -> LinkStats {
        self.state.borrow().stats.clone()
    }

    /// Queue a datagram that is visible on the next poll, e.g. a stray late reply.
    pub fn inject(&self, bytes: &[u8], from: Endpoint) {
        self.state.borrow_mut().inbound.push_back(Pending {
            bytes: bytes.to_vec(),
            from,
            ready_at: 0,
        });
    }

    /// Datagrams waiting to be received.
    pub fn pending(&self) -> usize {
        self.state.borrow().inbound.len()
    }
}

impl DatagramIo for SimulatedLink {
    fn bind(&mut self, _local: Endpoint) -> Result<()> {
        let mut state = self.state.borrow_mut();
        state.stats.binds += 1;
        if state.script.bind_fails {
            return Err(BeaconError::IoError("address in use".to_string()));
        }
        Ok(())
    }

    fn begin_packet(&mut self, remote: Endpoint) -> Result<()> {
        let mut state = self.state.borrow_mut();
        state.stats.begins += 1;
        state.attempt_fails = state.stats.begins <= state.script.failing_sends;
        if state.fault_is(SendFault::Open) {
            return Err(BeaconError::IoError("no route to host".to_string()));
        }
        state.open = Some((remote, Vec::new()));
        Ok(())
    }

    fn write(&mut self, bytes: &[u8]) -> Result<usize> {
        let mut state = self.state.borrow_mut();
        state.stats.writes += 1;
        if state.fault_is(SendFault::Write) {
            return Ok(0);
        }
        let (_, buf) = state
            .open
            .as_mut()
            .ok_or_else(|| BeaconError::IoError("no open packet".to_string()))?;
        buf.extend_from_slice(bytes);
        Ok(bytes.len())
    }

    fn end_packet(&mut self) -> Result<()> {
        let mut state = self.state.borrow_mut();
        state.stats.ends += 1;
        let open = state.open.take();
        if state.fault_is(SendFault::Close) {
            return Err(BeaconError::IoError("tx queue full".to_string()));
        }
        let (remote, bytes) =
            open.ok_or_else(|| BeaconError::IoError("no open packet".to_string()))?;
        state.deliver(remote, bytes);
        Ok(())
    }

    fn try_recv(&mut self, buf: &mut [u8]) -> Result<Option<(usize, Endpoint)>> {
        let mut state = self.state.borrow_mut();
        state.stats.polls += 1;
        let polls = state.stats.polls;

        let ready = state.inbound.front().is_some_and(|p| p.ready_at <= polls);
        if !ready {
            return Ok(None);
        }
        let Some(pending) = state.inbound.pop_front() else {
            return Ok(None);
        };
        let len = pending.bytes.len().min(buf.len());
        buf[..len].copy_from_slice(&pending.bytes[..len]);
        Ok(Some((len, pending.from)))
    }
}

/// Link behaviour of a [`SimulatedStation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StationScript {
    /// Link is already up before association is requested.
    AlreadyConnected,
    /// Status reads "not connected" for this many polls after `begin`, then connected.
    ConnectAfterPolls(u32),
    NeverConnects,
}

#[derive(Debug)]
struct StationState {
    script: StationScript,
    stored: Option<u32>,
    persistent: Option<bool>,
    configure_fails: bool,
    configured: u32,
    begins: u32,
    status_polls: u32,
    polls_since_begin: u32,
}

/// Scripted Wi-Fi station.
#[derive(Debug, Clone)]
pub struct SimulatedStation {
    state: Rc<RefCell<StationState>>,
}

impl SimulatedStation {
    pub fn new(script: StationScript) -> Self {
        Self {
            state: Rc::new(RefCell::new(StationState {
                script,
                stored: None,
                persistent: None,
                configure_fails: false,
                configured: 0,
                begins: 0,
                status_polls: 0,
                polls_since_begin: 0,
            })),
        }
    }

    /// Pretend flash already holds a configuration with this fingerprint.
    pub fn with_stored(self, fingerprint: u32) -> Self {
        self.state.borrow_mut().stored = Some(fingerprint);
        self
    }

    pub fn failing_configure(self) -> Self {
        self.state.borrow_mut().configure_fails = true;
        self
    }

    /// Last persistence decision, `None` if never made.
    pub fn persistent(&self) -> Option<bool> {
        self.state.borrow().persistent
    }

    pub fn begin_calls(&self) -> u32 {
        self.state.borrow().begins
    }

    pub fn status_polls(&self) -> u32 {
        self.state.borrow().status_polls
    }

    pub fn configure_calls(&self) -> u32 {
        self.state.borrow().configured
    }
}

impl WifiStation for SimulatedStation {
    fn stored_fingerprint(&self) -> Option<u32> {
        self.state.borrow().stored
    }

    fn set_persistent(&mut self, persistent: bool) {
        self.state.borrow_mut().persistent = Some(persistent);
    }

    fn configure(&mut self, _network: &NetworkConfig) -> Result<()> {
        let mut state = self.state.borrow_mut();
        state.configured += 1;
        if state.configure_fails {
            return Err(BeaconError::InvalidConfig("radio rejected static address".to_string()));
        }
        Ok(())
    }

    fn begin(&mut self, network: &NetworkConfig) -> Result<()> {
        let mut state = self.state.borrow_mut();
        state.begins += 1;
        if state.persistent == Some(true) {
            state.stored = Some(network.fingerprint());
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        let mut state = self.state.borrow_mut();
        state.status_polls += 1;
        if state.begins > 0 {
            state.polls_since_begin += 1;
        }
        match state.script {
            StationScript::AlreadyConnected => true,
            StationScript::ConnectAfterPolls(n) => state.begins > 0 && state.polls_since_begin > n,
            StationScript::NeverConnects => false,
        }
    }
}
