/// Error types for beacon operations
///
/// Most of these never reach the caller: the exchange engine absorbs them,
/// logs them, and reports a coarse outcome instead.
use std::fmt;
use std::io;

/// Result type alias for beacon operations
pub type Result<T> = std::result::Result<T, BeaconError>;

/// Beacon error enumeration
///
/// Covers every failure mode in the wake cycle:
/// - Payload encoding (non-retriable, a configuration defect)
/// - Transport open/write/close (transient, retried by the engine)
/// - Ack and link timeouts
/// - Invalid static configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BeaconError {
    /// Encoded payload does not fit the outgoing buffer
    EncodeFailed { limit: usize },

    /// Inbound bytes are not valid UTF-8 / JSON
    DecodeFailed(String),

    /// Could not open a send context to the remote endpoint
    TransportOpenFailed(String),

    /// Writing the encoded bytes into the send context failed or wrote nothing
    TransportWriteFailed(String),

    /// Closing/flushing the send context failed
    TransportCloseFailed(String),

    /// Send or receive attempted before the local endpoint was bound
    TransportNotBound,

    /// No datagram arrived within the ack-wait budget
    AckTimeout { attempts: u32 },

    /// Link status never reported connected within the poll budget
    ConnectivityTimeout { attempts: u32 },

    /// Static configuration is empty or malformed
    InvalidConfig(String),

    /// Underlying I/O error
    IoError(String),
}

impl fmt::Display for BeaconError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EncodeFailed { limit } => {
                write!(f, "Encode failed: payload exceeds {} bytes", limit)
            }
            Self::DecodeFailed(msg) => write!(f, "Decode failed: {}", msg),
            Self::TransportOpenFailed(msg) => write!(f, "Failed to initialize packet: {}", msg),
            Self::TransportWriteFailed(msg) => write!(f, "Failed to write packet: {}", msg),
            Self::TransportCloseFailed(msg) => write!(f, "Failed to send packet: {}", msg),
            Self::TransportNotBound => write!(f, "Transport is not bound to a local endpoint"),
            Self::AckTimeout { attempts } => {
                write!(f, "No ACK from server after {} attempts", attempts)
            }
            Self::ConnectivityTimeout { attempts } => {
                write!(f, "Failed to connect after {} attempts", attempts)
            }
            Self::InvalidConfig(msg) => write!(f, "Invalid configuration: {}", msg),
            Self::IoError(msg) => write!(f, "I/O error: {}", msg),
        }
    }
}

impl std::error::Error for BeaconError {}

/// Convert from io::Error to BeaconError
impl From<io::Error> for BeaconError {
    fn from(err: io::Error) -> Self {
        Self::IoError(err.to_string())
    }
}
