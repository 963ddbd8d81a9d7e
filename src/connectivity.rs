//! Connectivity manager: joins the access point within a bounded wait.
//!
//! Association itself belongs to the radio stack behind [`WifiStation`]. This
//! module configures the station for the fastest possible join (static
//! address, known channel and BSSID, no scan) and polls link status a fixed
//! number of times.

use std::net::Ipv4Addr;

use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::contracts::RetryPolicy;
use crate::errors::{BeaconError, Result};

/// 802.11 PHY mode requested from the radio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PhyMode {
    B,
    /// Joins fastest against the lab access point.
    #[default]
    G,
    N,
}

/// Static network configuration for one access point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkConfig {
    pub ssid: String,
    pub passphrase: String,
    pub channel: u8,
    pub bssid: [u8; 6],
    pub local_ip: Ipv4Addr,
    pub gateway: Ipv4Addr,
    pub subnet_mask: Ipv4Addr,
    pub phy_mode: PhyMode,
}

impl NetworkConfig {
    /// Check that every field is present and well-formed.
    ///
    /// # Errors
    /// Returns `BeaconError::InvalidConfig` naming the first bad field.
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: &str| -> Result<()> { Err(BeaconError::InvalidConfig(msg.to_string())) };

        if self.ssid.is_empty() || self.ssid.len() > 32 {
            return invalid("ssid must be 1-32 bytes");
        }
        if !(8..=63).contains(&self.passphrase.len()) {
            return invalid("WPA2 passphrase must be 8-63 bytes");
        }
        if !(1..=14).contains(&self.channel) {
            return invalid("channel must be 1-14");
        }
        if self.bssid == [0u8; 6] || self.bssid[0] & 0x01 != 0 {
            return invalid("bssid must be a unicast station address");
        }
        if self.local_ip.is_unspecified() || self.gateway.is_unspecified() {
            return invalid("static local address and gateway are required");
        }
        if self.subnet_mask.is_unspecified() {
            return invalid("subnet mask is required");
        }
        if self.local_ip == self.gateway {
            return invalid("local address collides with gateway");
        }
        Ok(())
    }

    /// CRC-32 over every field the radio persists to flash.
    ///
    /// Compared against the stored fingerprint so that a change to any of
    /// them, not only the SSID, triggers a rewrite.
    pub fn fingerprint(&self) -> u32 {
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(self.ssid.as_bytes());
        hasher.update(&[0]);
        hasher.update(self.passphrase.as_bytes());
        hasher.update(&[0, self.channel]);
        hasher.update(&self.bssid);
        hasher.finalize()
    }
}

/// Link-layer station driver.
pub trait WifiStation {
    /// Fingerprint of the configuration currently held in flash, if any.
    fn stored_fingerprint(&self) -> Option<u32>;

    /// Whether the next `begin` writes its configuration to flash.
    fn set_persistent(&mut self, persistent: bool);

    /// Apply static addressing, PHY mode and station/auto-reconnect mode.
    fn configure(&mut self, network: &NetworkConfig) -> Result<()>;

    /// Start association with the given access point.
    fn begin(&mut self, network: &NetworkConfig) -> Result<()>;

    /// Current link status.
    fn is_connected(&self) -> bool;
}

pub struct ConnectivityManager<W, C> {
    station: W,
    network: NetworkConfig,
    policy: RetryPolicy,
    clock: C,
}

impl<W: WifiStation, C: Clock> ConnectivityManager<W, C> {
    /// # Errors
    /// Returns `BeaconError::InvalidConfig` if `network` fails validation.
    pub fn new(station: W, network: NetworkConfig, policy: RetryPolicy, clock: C) -> Result<Self> {
        network.validate()?;
        Ok(Self { station, network, policy, clock })
    }

    pub fn network(&self) -> &NetworkConfig {
        &self.network
    }

    pub fn station(&self) -> &W {
        &self.station
    }

    /// Join the access point, returning whether the link came up in time.
    ///
    /// Failure is reported, not fatal; the caller decides what to do.
    pub fn connect(&mut self) -> bool {
        if let Err(e) = self.station.configure(&self.network) {
            warn!(error = %e, "station configuration failed");
            return false;
        }

        let fingerprint = self.network.fingerprint();
        let persist = self.station.stored_fingerprint() != Some(fingerprint);
        self.station.set_persistent(persist);
        if persist {
            debug!(fingerprint, "network settings changed, persisting");
        } else {
            debug!("using saved network settings");
        }

        if let Err(e) = self.station.begin(&self.network) {
            warn!(error = %e, ssid = %self.network.ssid, "association request failed");
            return false;
        }

        self.await_link()
    }

    fn await_link(&self) -> bool {
        let max_attempts = self.policy.max_attempts();
        let mut attempts = 0;
        loop {
            if self.station.is_connected() {
                info!(
                    attempts,
                    at_ms = self.clock.now_ms(),
                    ssid = %self.network.ssid,
                    "connected to access point"
                );
                return true;
            }
            if attempts >= max_attempts {
                warn!(
                    error = %BeaconError::ConnectivityTimeout { attempts },
                    max_attempts,
                    "giving up on access point"
                );
                return false;
            }
            attempts += 1;
            self.clock.sleep(self.policy.delay());
        }
    }
}
