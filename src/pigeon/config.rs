use log::{debug, info, warn};

use super::codec::AckToken;
use super::error::{PigeonError, Result};
use super::transport::Link;
use super::{Pigeon, SessionState};
use crate::shared::signal::ShutdownSignal;

pub const MAX_CONFIG_ATTEMPTS: u32 = 10;

/// One entry of the startup configuration: pre-checksummed command plus the
/// tokens that settle it.
#[derive(Debug, Clone, Copy)]
pub struct ConfigCommand {
    pub label: &'static str,
    pub bytes: &'static [u8],
    pub ack: AckToken,
    pub nack: Option<AckToken>,
}

const fn acked(label: &'static str, bytes: &'static [u8]) -> ConfigCommand {
    ConfigCommand {
        label,
        bytes,
        ack: AckToken::Ack,
        nack: Some(AckToken::Nack),
    }
}

// Order is fixed. The port group comes first and resets the I/O setup of every
// interface, so replaying the whole list from the top is always safe.
pub const CONFIG_SEQUENCE: &[ConfigCommand] = &[
    // CFG-PRT: USB, I2C, UART1 @ 460800, SPI
    acked("CFG-PRT usb", &[
        0xB5, 0x62, 0x06, 0x00, 0x14, 0x00, 0x03, 0xFF, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        0x00, 0x00, 0x00, 0x01, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x1E, 0x7F,
    ]),
    acked("CFG-PRT i2c", &[
        0xB5, 0x62, 0x06, 0x00, 0x14, 0x00, 0x00, 0xFF, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x19, 0x35,
    ]),
    acked("CFG-PRT uart1", &[
        0xB5, 0x62, 0x06, 0x00, 0x14, 0x00, 0x01, 0x00, 0x00, 0x00, 0xC0, 0x08, 0x00, 0x00, 0x00,
        0x08, 0x07, 0x00, 0x01, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0xF4, 0x80,
    ]),
    acked("CFG-PRT spi", &[
        0xB5, 0x62, 0x06, 0x00, 0x14, 0x00, 0x04, 0xFF, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x1D, 0x85,
    ]),
    acked("CFG-PRT poll", &[0xB5, 0x62, 0x06, 0x00, 0x00, 0x00, 0x06, 0x18]),
    acked("CFG-PRT poll uart1", &[0xB5, 0x62, 0x06, 0x00, 0x01, 0x00, 0x01, 0x08, 0x22]),
    acked("CFG-PRT poll usb", &[0xB5, 0x62, 0x06, 0x00, 0x01, 0x00, 0x03, 0x0A, 0x24]),
    // CFG-RATE: 100 ms measurement period
    acked("CFG-RATE", &[
        0xB5, 0x62, 0x06, 0x08, 0x06, 0x00, 0x64, 0x00, 0x01, 0x00, 0x00, 0x00, 0x79, 0x10,
    ]),
    // CFG-NAV5: automotive dynamic model
    acked("CFG-NAV5", &[
        0xB5, 0x62, 0x06, 0x24, 0x24, 0x00, 0x05, 0x00, 0x04, 0x03, 0x00, 0x00, 0x00, 0x00, 0x00,
        0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x5A, 0x63,
    ]),
    acked("CFG-ODO", &[
        0xB5, 0x62, 0x06, 0x1E, 0x14, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01, 0x03, 0x00, 0x00, 0x00,
        0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x3C, 0x37,
    ]),
    acked("CFG-ITFM", &[
        0xB5, 0x62, 0x06, 0x39, 0x08, 0x00, 0xFF, 0xAD, 0x62, 0xAD, 0x1E, 0x63, 0x00, 0x00, 0x83,
        0x0C,
    ]),
    acked("CFG-NAVX5", &[
        0xB5, 0x62, 0x06, 0x23, 0x28, 0x00, 0x00, 0x00, 0x00, 0x04, 0x00, 0x00, 0x00, 0x00, 0x00,
        0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        0x00, 0x56, 0x24,
    ]),
    // Poll back what was just written.
    acked("CFG-NAV5 poll", &[0xB5, 0x62, 0x06, 0x24, 0x00, 0x00, 0x2A, 0x84]),
    acked("CFG-NAVX5 poll", &[0xB5, 0x62, 0x06, 0x23, 0x00, 0x00, 0x29, 0x81]),
    acked("CFG-ODO poll", &[0xB5, 0x62, 0x06, 0x1E, 0x00, 0x00, 0x24, 0x72]),
    acked("CFG-ITFM poll", &[0xB5, 0x62, 0x06, 0x39, 0x00, 0x00, 0x3F, 0xC3]),
    // CFG-MSG: one output per navigation epoch
    acked("CFG-MSG NAV-PVT", &[0xB5, 0x62, 0x06, 0x01, 0x03, 0x00, 0x01, 0x07, 0x01, 0x13, 0x51]),
    acked("CFG-MSG RXM-RAWX", &[0xB5, 0x62, 0x06, 0x01, 0x03, 0x00, 0x02, 0x15, 0x01, 0x22, 0x70]),
    acked("CFG-MSG RXM-SFRBX", &[0xB5, 0x62, 0x06, 0x01, 0x03, 0x00, 0x02, 0x13, 0x01, 0x20, 0x6C]),
    acked("CFG-MSG MON-HW", &[0xB5, 0x62, 0x06, 0x01, 0x03, 0x00, 0x0A, 0x09, 0x01, 0x1E, 0x70]),
    acked("CFG-MSG MON-HW2", &[0xB5, 0x62, 0x06, 0x01, 0x03, 0x00, 0x0A, 0x0B, 0x01, 0x20, 0x74]),
    acked("CFG-MSG NAV-SAT", &[0xB5, 0x62, 0x06, 0x01, 0x03, 0x00, 0x01, 0x35, 0x01, 0x41, 0xAD]),
];

impl<L: Link> Pigeon<L> {
    // Single pass over the sequence; stops at the first unanswered or rejected command.
    pub fn apply_config(&mut self) -> Result<()> {
        for command in CONFIG_SEQUENCE {
            debug!("applying {}", command.label);
            self.send_with_ack(command.bytes, command.ack, command.nack)?;
        }
        self.transition(SessionState::Configured);
        Ok(())
    }

    /// Apply the configuration, replaying it from the top after any timeout or
    /// nack, at most `MAX_CONFIG_ATTEMPTS` times.
    pub fn configure(&mut self, stop: &ShutdownSignal) -> Result<()> {
        for attempt in 1..=MAX_CONFIG_ATTEMPTS {
            if stop.requested() {
                return Err(PigeonError::InitializationFailed {
                    attempts: attempt - 1,
                });
            }
            match self.apply_config() {
                Ok(()) => {
                    info!("receiver configured (attempt {attempt})");
                    return Ok(());
                }
                Err(err) if err.is_recoverable() => {
                    warn!(
                        "Initialization attempt {attempt}/{MAX_CONFIG_ATTEMPTS} failed: {err}, trying again!"
                    );
                }
                Err(err) => return Err(err),
            }
        }
        warn!("Failed to initialize receiver");
        Err(PigeonError::InitializationFailed {
            attempts: MAX_CONFIG_ATTEMPTS,
        })
    }
}
