/// Session configuration
///
/// Everything tunable is a compile-time constant (see the crate root); the
/// builder only exists so tests and alternative deployments can override
/// individual values at startup.
use std::net::Ipv4Addr;
use std::time::Duration;

use crate::connectivity::{NetworkConfig, PhyMode};
use crate::contracts::{Endpoint, RetryPolicy, SendRetryMode};
use crate::{
    ACK_WAIT_MAX_ATTEMPTS, ACK_WAIT_POLL_DELAY_MS, COMPONENT_CLIENT_PORT, COMPONENT_SERVER_PORT,
    MESSAGE_SEND_MAX_ATTEMPTS, MESSAGE_SEND_RETRY_DELAY_MS, SERVER_READY_MAX_ATTEMPTS,
    SERVER_READY_RETRY_DELAY_MS, WIFI_CONNECTION_MAX_WAIT_TRIES, WIFI_CONNECTION_WAIT_DELAY_MS,
};

/// Access point the device joins (a Raspberry Pi running hostapd in the lab setup)
pub const ACCESS_POINT_SSID: &str = "BrownBox-AP";
pub const ACCESS_POINT_PASSPHRASE: &str = "bb_password";
pub const ACCESS_POINT_BSSID: [u8; 6] = [0x74, 0xda, 0x38, 0x26, 0x07, 0xf5];
pub const ACCESS_POINT_CHANNEL: u8 = 6;
pub const ACCESS_POINT_GATEWAY: Ipv4Addr = Ipv4Addr::new(172, 24, 1, 1);
pub const ACCESS_POINT_SUBNET_MASK: Ipv4Addr = Ipv4Addr::new(255, 255, 255, 0);

/// Static address of this client
pub const CLIENT_IP: Ipv4Addr = Ipv4Addr::new(172, 24, 1, 20);

/// Component server (typically the access point itself)
pub const SERVER_ENDPOINT: Endpoint = Endpoint::new_v4(172, 24, 1, 1, COMPONENT_SERVER_PORT);

/// Local listening endpoint
pub const CLIENT_ENDPOINT: Endpoint = Endpoint::new_v4(172, 24, 1, 20, COMPONENT_CLIENT_PORT);

/// Compile-time network configuration
pub fn default_network() -> NetworkConfig {
    NetworkConfig {
        ssid: ACCESS_POINT_SSID.to_string(),
        passphrase: ACCESS_POINT_PASSPHRASE.to_string(),
        channel: ACCESS_POINT_CHANNEL,
        bssid: ACCESS_POINT_BSSID,
        local_ip: CLIENT_IP,
        gateway: ACCESS_POINT_GATEWAY,
        subnet_mask: ACCESS_POINT_SUBNET_MASK,
        phy_mode: PhyMode::G,
    }
}

/// Per-phase retry policies and endpoints for one wake cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    pub local: Endpoint,
    pub remote: Endpoint,
    pub connect: RetryPolicy,
    pub readiness: RetryPolicy,
    pub send: RetryPolicy,
    pub ack: RetryPolicy,
    pub send_mode: SendRetryMode,
}

impl SessionConfig {
    /// Upper bound on time spent in retry delays during one session
    ///
    /// connect + readiness attempts x (send + ack) + gaps between readiness
    /// attempts + one event exchange. Transport latency is not included.
    pub fn worst_case_budget(&self) -> Duration {
        let exchange = self.exchange_budget();
        let readiness_attempts = self.readiness.max_attempts();
        let readiness_gaps = self.readiness.delay().saturating_mul(readiness_attempts - 1);

        self.connect.worst_case()
            + exchange.saturating_mul(readiness_attempts)
            + readiness_gaps
            + exchange
    }

    /// Longest a single exchange can sleep: every send delay plus the gaps between ack polls
    pub fn exchange_budget(&self) -> Duration {
        let send_attempts = match self.send_mode {
            SendRetryMode::UpToMaxAttempts => self.send.max_attempts(),
            SendRetryMode::StopAfterFirstFailure => 1,
        };
        self.send.delay().saturating_mul(send_attempts)
            + self.ack.delay().saturating_mul(self.ack.max_attempts() - 1)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfigBuilder::new().build()
    }
}

/// SessionConfigBuilder - Fluent interface for session configuration
pub struct SessionConfigBuilder {
    config: SessionConfig,
}

impl SessionConfigBuilder {
    /// Create a builder holding the compile-time defaults
    pub fn new() -> Self {
        Self {
            config: SessionConfig {
                local: CLIENT_ENDPOINT,
                remote: SERVER_ENDPOINT,
                connect: RetryPolicy::fixed(
                    WIFI_CONNECTION_MAX_WAIT_TRIES,
                    WIFI_CONNECTION_WAIT_DELAY_MS,
                ),
                readiness: RetryPolicy::fixed(
                    SERVER_READY_MAX_ATTEMPTS,
                    SERVER_READY_RETRY_DELAY_MS,
                ),
                send: RetryPolicy::fixed(MESSAGE_SEND_MAX_ATTEMPTS, MESSAGE_SEND_RETRY_DELAY_MS),
                ack: RetryPolicy::fixed(ACK_WAIT_MAX_ATTEMPTS, ACK_WAIT_POLL_DELAY_MS),
                send_mode: SendRetryMode::UpToMaxAttempts,
            },
        }
    }

    pub fn with_local(mut self, local: Endpoint) -> Self {
        self.config.local = local;
        self
    }

    pub fn with_remote(mut self, remote: Endpoint) -> Self {
        self.config.remote = remote;
        self
    }

    pub fn with_connect_policy(mut self, policy: RetryPolicy) -> Self {
        self.config.connect = policy;
        self
    }

    pub fn with_readiness_policy(mut self, policy: RetryPolicy) -> Self {
        self.config.readiness = policy;
        self
    }

    pub fn with_send_policy(mut self, policy: RetryPolicy) -> Self {
        self.config.send = policy;
        self
    }

    pub fn with_ack_policy(mut self, policy: RetryPolicy) -> Self {
        self.config.ack = policy;
        self
    }

    pub fn with_send_mode(mut self, mode: SendRetryMode) -> Self {
        self.config.send_mode = mode;
        self
    }

    pub fn get_local(&self) -> Endpoint {
        self.config.local
    }

    pub fn get_remote(&self) -> Endpoint {
        self.config.remote
    }

    pub fn get_send_mode(&self) -> SendRetryMode {
        self.config.send_mode
    }

    pub fn build(self) -> SessionConfig {
        self.config
    }
}

impl Default for SessionConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
