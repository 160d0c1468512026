// Driver for a u-blox receiver speaking UBX over a serial link.
// Leaf modules first: framing, byte pipe, power lines, then the protocol layers.
pub mod assist;
pub mod backup;
pub mod codec;
pub mod config;
pub mod error;
pub mod handshake;
pub mod host;
pub mod power;
pub mod receive;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use std::fmt;
use std::thread;
use std::time::Duration;

use crate::shared::signal::ShutdownSignal;
use assist::AssistSource;
pub use error::{PigeonError, Result};
use power::PowerSequencer;
use transport::{Link, Session};

/// Lifecycle of the receiver as seen by the driver.
///
/// Transitions only move forward, except `Operational -> BaudNegotiated` when
/// a corrupted read forces a re-initialization, and any state may enter
/// `ShuttingDown` once a stop is requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    PoweredOff,
    PoweredOn,
    BaudNegotiated,
    Configured,
    Operational,
    ShuttingDown,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::PoweredOff => "powered-off",
            Self::PoweredOn => "powered-on",
            Self::BaudNegotiated => "baud-negotiated",
            Self::Configured => "configured",
            Self::Operational => "operational",
            Self::ShuttingDown => "shutting-down",
        };
        f.write_str(name)
    }
}

/// Timeout budgets and settle delays used across the driver.
#[derive(Debug, Clone)]
pub struct Timings {
    pub ack_timeout: Duration,
    pub backup_status_timeout: Duration,
    pub poll_interval: Duration,
    pub baud_settle: Duration,
    pub cold_start_settle: Duration,
    pub reset_hold: Duration,
    pub power_off_settle: Duration,
    pub power_ready_delay: Duration,
    pub always_on_shutdown_settle: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            ack_timeout: Duration::from_millis(500),
            backup_status_timeout: Duration::from_secs(1),
            poll_interval: Duration::from_millis(1),
            baud_settle: Duration::from_millis(100),
            cold_start_settle: Duration::from_secs(1),
            reset_hold: Duration::from_millis(100),
            power_off_settle: Duration::from_millis(100),
            power_ready_delay: Duration::from_millis(500),
            always_on_shutdown_settle: Duration::from_millis(500),
        }
    }
}

#[cfg(test)]
impl Timings {
    pub fn immediate() -> Self {
        Self {
            ack_timeout: Duration::from_millis(30),
            backup_status_timeout: Duration::from_millis(30),
            poll_interval: Duration::from_millis(1),
            baud_settle: Duration::ZERO,
            cold_start_settle: Duration::ZERO,
            reset_hold: Duration::ZERO,
            power_off_settle: Duration::ZERO,
            power_ready_delay: Duration::ZERO,
            always_on_shutdown_settle: Duration::ZERO,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BaudRates {
    pub default: u32,
    pub operational: u32,
}

impl Default for BaudRates {
    fn default() -> Self {
        Self {
            default: 9_600,
            operational: 460_800,
        }
    }
}

// Host-supplied facts consulted once during boot.
#[derive(Debug, Clone)]
pub struct BootOptions {
    pub now: DateTime<Utc>,
    pub clock_valid: bool,
    pub assist_token: Option<String>,
}

/// Receiver session: exclusive owner of the link and the power lines.
pub struct Pigeon<L> {
    session: Session<L>,
    power: PowerSequencer,
    timings: Timings,
    bauds: BaudRates,
    state: SessionState,
}

impl<L: Link> Pigeon<L> {
    // The module is expected to be powered already; the link is at the default rate.
    pub fn new(link: L, power: PowerSequencer, timings: Timings, bauds: BaudRates) -> Self {
        Self {
            session: Session::new(link, bauds.default),
            power,
            timings,
            bauds,
            state: SessionState::PoweredOn,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_power_controllable(&self) -> bool {
        self.power.is_controllable()
    }

    fn transition(&mut self, next: SessionState) {
        if self.state != next {
            debug!("receiver state {} -> {}", self.state, next);
            self.state = next;
        }
    }

    /// Full boot after baud negotiation: configuration, almanac restore,
    /// time and assistance injection.
    ///
    /// Only a failed configuration is reported; the remaining steps log their
    /// problems and let the receiver come up without them.
    pub fn initialize(
        &mut self,
        boot: &BootOptions,
        assist: &dyn AssistSource,
        stop: &ShutdownSignal,
    ) -> Result<()> {
        self.configure(stop)?;

        match self.restore_on_boot() {
            Ok(_) => {}
            Err(err) if err.is_recoverable() || matches!(err, PigeonError::BackupStatus(_)) => {
                error!("almanac restore did not complete: {err}");
            }
            Err(err) => return Err(err),
        }

        if boot.clock_valid {
            warn!("Sending current time to receiver");
            match self.inject_time(boot.now) {
                Ok(()) => {}
                Err(err) if err.is_recoverable() => warn!("time injection failed: {err}"),
                Err(err) => return Err(err),
            }
        }

        if let Some(token) = &boot.assist_token {
            match self.inject_assist(assist, token) {
                Ok(count) => warn!("AssistNow messages sent ({count} frames)"),
                Err(PigeonError::Io(err)) => return Err(PigeonError::Io(err)),
                Err(err) => warn!("failed to inject AssistNow messages: {err}"),
            }
        }

        self.transition(SessionState::Operational);
        info!("receiver operational");
        Ok(())
    }

    /// Persist the almanac and remove power. Always runs to completion: a
    /// missing or failed acknowledgement is logged and power-off proceeds.
    pub fn shutdown(&mut self) -> Result<()> {
        if self.state == SessionState::PoweredOff {
            return Ok(());
        }
        self.transition(SessionState::ShuttingDown);

        warn!("Storing almanac in receiver flash");
        match self.store_almanac() {
            Ok(true) => warn!("Done storing almanac"),
            Ok(false) => error!("Error storing almanac"),
            Err(err) => error!("almanac store not confirmed: {err}"),
        }

        if self.power.is_controllable() {
            self.power.power(false)?;
        } else {
            if let Err(err) = self.reset_device() {
                error!("resetting always-on receiver failed: {err}");
            }
            thread::sleep(self.timings.always_on_shutdown_settle);
        }

        self.transition(SessionState::PoweredOff);
        info!("receiver powered off");
        Ok(())
    }
}
