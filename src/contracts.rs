/// Core data structures for the beacon protocol
///
/// Buffers are fixed-capacity `heapless` vectors so that nothing grows past
/// what the device can hold; overflow is an explicit error path.
use std::collections::BTreeMap;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, SocketAddrV4};
use std::num::NonZeroU32;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{BeaconError, Result};
use crate::{INCOMING_CAPACITY, OUTGOING_CAPACITY};

/// Encoded outbound datagram, rewritten on every exchange attempt
pub type OutgoingMessage = heapless::Vec<u8, OUTGOING_CAPACITY>;

/// Last inbound datagram, valid until the next receive overwrites it
pub type IncomingMessage = heapless::Vec<u8, INCOMING_CAPACITY>;

/// A network endpoint (IPv4/IPv6 address + UDP port)
///
/// Immutable after construction. The client holds exactly two: its own
/// listening endpoint and the component server's.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Endpoint(SocketAddr);

impl Endpoint {
    /// Create an endpoint from an address and port
    pub const fn new(addr: IpAddr, port: u16) -> Self {
        Self(SocketAddr::new(addr, port))
    }

    /// Create an IPv4 endpoint
    pub const fn new_v4(a: u8, b: u8, c: u8, d: u8, port: u16) -> Self {
        Self(SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::new(a, b, c, d), port)))
    }

    /// Endpoint on all interfaces (0.0.0.0)
    pub const fn any(port: u16) -> Self {
        Self::new_v4(0, 0, 0, 0, port)
    }

    /// Loopback endpoint (127.0.0.1)
    pub const fn localhost(port: u16) -> Self {
        Self::new_v4(127, 0, 0, 1, port)
    }

    pub const fn ip(&self) -> IpAddr {
        self.0.ip()
    }

    pub const fn port(&self) -> u16 {
        self.0.port()
    }

    pub const fn as_socket_addr(&self) -> SocketAddr {
        self.0
    }
}

impl From<SocketAddr> for Endpoint {
    fn from(addr: SocketAddr) -> Self {
        Self(addr)
    }
}

impl From<Endpoint> for SocketAddr {
    fn from(endpoint: Endpoint) -> Self {
        endpoint.0
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Message body - a small string to string mapping
///
/// Serializes as a flat JSON object, e.g. `{"body":"Elapsed time: 312ms"}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Payload(BTreeMap<String, String>);

impl Payload {
    pub fn new() -> Self {
        Self::default()
    }

    /// Payload with a single `"body"` entry, the shape the component server expects
    pub fn body(text: impl Into<String>) -> Self {
        let mut payload = Self::new();
        payload.insert("body", text);
        payload
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// The `"body"` entry, if present
    pub fn body_text(&self) -> Option<&str> {
        self.get("body")
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Bounded retry policy for one protocol phase
///
/// Connect, readiness probe, send and ack-wait each get their own instance;
/// they have different latency characteristics and are never shared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: NonZeroU32,
    delay: Duration,
}

impl RetryPolicy {
    /// Create a policy from an already non-zero attempt count
    pub const fn new(max_attempts: NonZeroU32, delay: Duration) -> Self {
        Self { max_attempts, delay }
    }

    /// Create a policy from plain values
    ///
    /// # Errors
    /// Returns `BeaconError::InvalidConfig` if `max_attempts` is zero
    pub fn from_millis(max_attempts: u32, delay_ms: u64) -> Result<Self> {
        let max_attempts = NonZeroU32::new(max_attempts).ok_or_else(|| {
            BeaconError::InvalidConfig("retry policy needs at least one attempt".to_string())
        })?;
        Ok(Self::new(max_attempts, Duration::from_millis(delay_ms)))
    }

    /// Compile-time policy; a zero attempt count fails the build
    pub(crate) const fn fixed(max_attempts: u32, delay_ms: u64) -> Self {
        let max_attempts = match NonZeroU32::new(max_attempts) {
            Some(n) => n,
            None => panic!("retry policy needs at least one attempt"),
        };
        Self::new(max_attempts, Duration::from_millis(delay_ms))
    }

    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts.get()
    }

    pub const fn delay(&self) -> Duration {
        self.delay
    }

    /// Upper bound on time spent sleeping under this policy
    pub fn worst_case(&self) -> Duration {
        self.delay.saturating_mul(self.max_attempts.get())
    }
}

/// How the engine reacts to a failed send attempt
///
/// `StopAfterFirstFailure` gives up after one failed attempt whatever the
/// configured count, matching devices already in the field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SendRetryMode {
    #[default]
    UpToMaxAttempts,
    StopAfterFirstFailure,
}

/// Result of one send-then-await-ack exchange
///
/// Tag only: the orchestrator needs success or failure, not which packet failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeOutcome {
    Success,
    SendFailed,
    NoAckReceived,
    EncodeFailed,
}

impl ExchangeOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}
