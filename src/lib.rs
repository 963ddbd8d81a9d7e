/// Beacon Core - acknowledged event delivery over UDP for wake-cycle devices
///
/// **Creator**: Shayan Golmezerji
/// **License**: Creative Commons Attribution 4.0 International (CC BY 4.0)
///
/// A battery-powered client wakes, joins a known access point, confirms that
/// the component server is processing datagrams (the readiness probe), sends
/// one event notification, and goes back to sleep.
///
/// # Design Principles
/// - Every wait is a bounded poll loop with a fixed delay
/// - Fixed-capacity buffers owned by the transport binding
/// - Transient failures are absorbed locally and surface as coarse outcomes
/// - Single-threaded and strictly sequential

pub mod errors;
pub mod contracts;
pub mod clock;
pub mod codec;
pub mod transport;
pub mod connectivity;
pub mod exchange;
pub mod session;
pub mod config;
pub mod sim;
pub mod trace;

pub use contracts::{Endpoint, ExchangeOutcome, Payload, RetryPolicy, SendRetryMode};
pub use errors::{BeaconError, Result};
pub use session::{FailureCause, Session, SessionOutcome, SessionState};

/// Protocol version
pub const BEACON_VERSION: u16 = 1;

/// Outgoing datagram buffer capacity in bytes (one byte reserved for the terminator)
pub const OUTGOING_CAPACITY: usize = 100;

/// Incoming datagram buffer capacity in bytes (one byte reserved for the terminator)
pub const INCOMING_CAPACITY: usize = 255;

/// Longest body string that reliably fits the outgoing buffer after JSON framing
pub const MAX_BODY_LEN: usize = 80;

/// UDP port the component server listens on
pub const COMPONENT_SERVER_PORT: u16 = 41234;

/// UDP port this client listens on for acknowledgments
pub const COMPONENT_CLIENT_PORT: u16 = 41235;

/// Link status polls before giving up on the access point (200-250ms typical)
pub const WIFI_CONNECTION_MAX_WAIT_TRIES: u32 = 10;

/// Delay between link status polls
pub const WIFI_CONNECTION_WAIT_DELAY_MS: u64 = 50;

/// Full exchanges attempted while probing server readiness
pub const SERVER_READY_MAX_ATTEMPTS: u32 = 5;

/// Delay between readiness exchanges
pub const SERVER_READY_RETRY_DELAY_MS: u64 = 10;

/// Send attempts within one exchange
pub const MESSAGE_SEND_MAX_ATTEMPTS: u32 = 5;

/// Delay before each send attempt
pub const MESSAGE_SEND_RETRY_DELAY_MS: u64 = 10;

/// Non-blocking receive polls while waiting for an ack
pub const ACK_WAIT_MAX_ATTEMPTS: u32 = 5;

/// Delay between ack polls
pub const ACK_WAIT_POLL_DELAY_MS: u64 = 20;
