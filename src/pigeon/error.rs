use std::io;
use std::time::Duration;

use thiserror::Error;

// Failure kinds surfaced by the receiver driver.
// Callers match on these instead of catching generic errors.
#[derive(Debug, Error)]
pub enum PigeonError {
    #[error("no response from receiver within {0:?}")]
    Timeout(Duration),

    #[error("receiver rejected command (class 0x{class:02X} id 0x{id:02X})")]
    Nack { class: u8, id: u8 },

    #[error("unexpected backup restore status {0}")]
    BackupStatus(u8),

    #[error("malformed assistance stream at offset {offset}: {reason}")]
    MalformedStream { offset: usize, reason: &'static str },

    #[error("payload of {0} bytes does not fit a UBX frame")]
    PayloadTooLarge(usize),

    #[error("fetching assistance data failed: {0}")]
    AssistFetch(String),

    #[error("receiver initialization failed after {attempts} attempt(s)")]
    InitializationFailed { attempts: u32 },

    #[error("receiver i/o failed")]
    Io(#[from] io::Error),
}

impl PigeonError {
    // Timeouts and nacks are handled by the retry layer; everything else bubbles up.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::Nack { .. })
    }
}

pub type Result<T> = std::result::Result<T, PigeonError>;
