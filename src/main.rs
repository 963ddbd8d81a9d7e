//! One wake cycle on a host machine.
//!
//! The host OS already owns the network link, so the station driver here
//! only reports it as up; everything from the readiness probe onward runs
//! over a real non-blocking UDP socket against the configured component
//! server.

use std::process::ExitCode;

use beacon_core::clock::{Clock, SystemClock};
use beacon_core::config::{default_network, SessionConfig};
use beacon_core::connectivity::{NetworkConfig, WifiStation};
use beacon_core::transport::UdpDatagram;
use beacon_core::{trace, Endpoint, Result, Session, BEACON_VERSION};
use tracing::{error, info};

/// Station whose link is managed by the host OS.
struct HostStation;

impl WifiStation for HostStation {
    fn stored_fingerprint(&self) -> Option<u32> {
        None
    }

    fn set_persistent(&mut self, _persistent: bool) {}

    fn configure(&mut self, _network: &NetworkConfig) -> Result<()> {
        Ok(())
    }

    fn begin(&mut self, _network: &NetworkConfig) -> Result<()> {
        Ok(())
    }

    fn is_connected(&self) -> bool {
        true
    }
}

fn main() -> ExitCode {
    trace::init_tracing();

    let clock = SystemClock::new();
    let mut config = SessionConfig::default();
    // Listen on every interface; the static client address only exists on the device.
    config.local = Endpoint::any(config.local.port());

    info!(
        version = BEACON_VERSION,
        remote = %config.remote,
        budget_ms = config.worst_case_budget().as_millis() as u64,
        "wake cycle"
    );

    let mut session = match Session::new(config, default_network(), HostStation, UdpDatagram::new(), clock) {
        Ok(session) => session,
        Err(e) => {
            error!(error = %e, "invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    let outcome = session.run();
    info!(?outcome, awake_ms = clock.now_ms(), "returning to sleep");

    if outcome.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
