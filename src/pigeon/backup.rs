use log::{error, info, warn};
use std::thread;

use super::codec::AckToken;
use super::error::{PigeonError, Result};
use super::transport::Link;
use super::Pigeon;

pub const MAX_RESET_ATTEMPTS: u32 = 5;

// CFG-RST: cold start, hardware reset
pub const COLD_START: &[u8] = &[0xB5, 0x62, 0x06, 0x04, 0x04, 0x00, 0xFF, 0xFF, 0x00, 0x00, 0x0C, 0x5D];
// CFG-RST: controlled GNSS stop, keeps backup RAM
pub const GNSS_STOP: &[u8] = &[0xB5, 0x62, 0x06, 0x04, 0x04, 0x00, 0x00, 0x00, 0x08, 0x00, 0x16, 0x74];
// CFG-CFG: clear every configuration section
pub const CLEAR_CONFIG: &[u8] = &[
    0xB5, 0x62, 0x06, 0x09, 0x0D, 0x00, 0x1F, 0x1F, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x17, 0x71, 0xD7,
];
// UPD-SOS
pub const STORE_BACKUP: &[u8] = &[0xB5, 0x62, 0x09, 0x14, 0x04, 0x00, 0x00, 0x00, 0x00, 0x00, 0x21, 0xEC];
pub const CLEAR_BACKUP: &[u8] = &[0xB5, 0x62, 0x09, 0x14, 0x04, 0x00, 0x01, 0x00, 0x00, 0x00, 0x22, 0xF0];
pub const RESTORE_PROBE: &[u8] = &[0xB5, 0x62, 0x09, 0x14, 0x00, 0x00, 0x1D, 0x60];

/// Outcome reported by the receiver after probing its flash backup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupRestoreStatus {
    Failed = 1,
    Restored = 2,
    NoBackup = 3,
}

impl TryFrom<u8> for BackupRestoreStatus {
    type Error = u8;

    fn try_from(code: u8) -> std::result::Result<Self, Self::Error> {
        match code {
            1 => Ok(Self::Failed),
            2 => Ok(Self::Restored),
            3 => Ok(Self::NoBackup),
            other => Err(other),
        }
    }
}

impl<L: Link> Pigeon<L> {
    /// Cold start the receiver and wipe its configuration and almanac backup.
    ///
    /// A probe that finds nothing to restore (`Failed` or `NoBackup`) confirms
    /// the wipe. Deleting the backup often needs a second pass, so the cycle
    /// is repeated up to `MAX_RESET_ATTEMPTS` times.
    pub fn reset_device(&mut self) -> Result<bool> {
        for attempt in 1..=MAX_RESET_ATTEMPTS {
            self.session.send(COLD_START)?;
            thread::sleep(self.timings.cold_start_settle);

            // Bus-powered modules keep no backup worth clearing.
            if !self.power.is_controllable() {
                return Ok(true);
            }
            self.negotiate_baud()?;

            match self.clear_and_probe() {
                Ok(BackupRestoreStatus::Failed | BackupRestoreStatus::NoBackup) => {
                    info!("receiver backup cleared (attempt {attempt})");
                    return Ok(true);
                }
                Ok(BackupRestoreStatus::Restored) => {
                    warn!("almanac backup still present after clear (attempt {attempt})");
                }
                Err(err) if err.is_recoverable() || matches!(err, PigeonError::BackupStatus(_)) => {
                    warn!("clearing receiver backup failed (attempt {attempt}): {err}");
                }
                Err(err) => return Err(err),
            }
        }
        Ok(false)
    }

    fn clear_and_probe(&mut self) -> Result<BackupRestoreStatus> {
        self.send_with_ack(CLEAR_CONFIG, AckToken::Ack, Some(AckToken::Nack))?;
        self.send_with_ack(CLEAR_BACKUP, AckToken::Ack, Some(AckToken::Nack))?;
        self.session.send(RESTORE_PROBE)?;
        self.wait_for_backup_restore_status(self.timings.backup_status_timeout)
    }

    // A failed restore at boot is logged but leaves the receiver usable.
    pub fn restore_on_boot(&mut self) -> Result<BackupRestoreStatus> {
        self.session.send(RESTORE_PROBE)?;
        let status = self.wait_for_backup_restore_status(self.timings.backup_status_timeout)?;
        match status {
            BackupRestoreStatus::Restored => warn!("almanac backup restored"),
            BackupRestoreStatus::NoBackup => warn!("no almanac backup found"),
            BackupRestoreStatus::Failed => {
                error!("failed to restore almanac backup, status: {}", status as u8)
            }
        }
        Ok(status)
    }

    // Stop navigation and ask the receiver to persist its almanac to flash.
    pub fn store_almanac(&mut self) -> Result<bool> {
        self.session.send(GNSS_STOP)?;
        self.session.send(STORE_BACKUP)?;
        self.wait_for(
            AckToken::BackupAck,
            Some(AckToken::BackupNack),
            self.timings.ack_timeout,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pigeon::codec::is_valid_frame;
    use crate::pigeon::testing::{
        LineLog, ScriptedLink, ack_for, controllable_pigeon_with, pigeon_with, restore_status_frame,
    };

    fn controllable_pigeon(link: &ScriptedLink) -> Pigeon<ScriptedLink> {
        controllable_pigeon_with(link, &LineLog::default())
    }

    // Replies for one clear-and-probe pass after the cold start and baud switch.
    fn script_reset_pass(link: &ScriptedLink, status: u8) {
        link.reply_to_next_write(Vec::new()); // cold start
        link.reply_to_next_write(Vec::new()); // $PUBX
        link.reply_to_next_write(ack_for(CLEAR_CONFIG));
        link.reply_to_next_write(ack_for(CLEAR_BACKUP));
        link.reply_to_next_write(restore_status_frame(status));
    }

    #[test]
    fn commands_are_valid_frames() {
        for command in [COLD_START, GNSS_STOP, CLEAR_CONFIG, STORE_BACKUP, CLEAR_BACKUP, RESTORE_PROBE] {
            assert!(is_valid_frame(command));
        }
    }

    #[test]
    fn status_codes_map_to_variants() {
        assert_eq!(BackupRestoreStatus::try_from(1), Ok(BackupRestoreStatus::Failed));
        assert_eq!(BackupRestoreStatus::try_from(2), Ok(BackupRestoreStatus::Restored));
        assert_eq!(BackupRestoreStatus::try_from(3), Ok(BackupRestoreStatus::NoBackup));
        assert_eq!(BackupRestoreStatus::try_from(0), Err(0));
    }

    #[test]
    fn reset_succeeds_when_no_backup_remains() {
        let link = ScriptedLink::new();
        script_reset_pass(&link, 3);
        let mut pigeon = controllable_pigeon(&link);

        assert!(pigeon.reset_device().unwrap());
        let writes = link.writes();
        assert_eq!(writes[0], COLD_START);
        assert_eq!(writes[2], CLEAR_CONFIG);
        assert_eq!(writes[3], CLEAR_BACKUP);
        assert_eq!(writes[4], RESTORE_PROBE);
    }

    #[test]
    fn reset_treats_failed_restore_as_cleared() {
        let link = ScriptedLink::new();
        script_reset_pass(&link, 1);
        let mut pigeon = controllable_pigeon(&link);
        assert!(pigeon.reset_device().unwrap());
    }

    #[test]
    fn reset_retries_while_backup_survives() {
        let link = ScriptedLink::new();
        script_reset_pass(&link, 2);
        script_reset_pass(&link, 3);
        let mut pigeon = controllable_pigeon(&link);

        assert!(pigeon.reset_device().unwrap());
        let cold_starts = link.writes().iter().filter(|w| *w == COLD_START).count();
        assert_eq!(cold_starts, 2);
    }

    #[test]
    fn reset_gives_up_after_bounded_attempts() {
        let link = ScriptedLink::new();
        for _ in 0..MAX_RESET_ATTEMPTS {
            script_reset_pass(&link, 2);
        }
        let mut pigeon = controllable_pigeon(&link);

        assert!(!pigeon.reset_device().unwrap());
        let cold_starts = link.writes().iter().filter(|w| *w == COLD_START).count();
        assert_eq!(cold_starts, MAX_RESET_ATTEMPTS as usize);
    }

    #[test]
    fn reset_on_always_on_host_stops_after_cold_start() {
        let link = ScriptedLink::new();
        let mut pigeon = pigeon_with(&link);

        assert!(pigeon.reset_device().unwrap());
        assert_eq!(link.writes(), vec![COLD_START.to_vec()]);
    }

    #[test]
    fn boot_restore_tolerates_failed_status() {
        let link = ScriptedLink::new();
        link.reply_to_next_write(restore_status_frame(1));
        let mut pigeon = pigeon_with(&link);

        assert_eq!(pigeon.restore_on_boot().unwrap(), BackupRestoreStatus::Failed);
        assert_eq!(link.writes(), vec![RESTORE_PROBE.to_vec()]);
    }

    #[test]
    fn store_almanac_reports_ack_and_nack() {
        let link = ScriptedLink::new();
        link.reply_to_next_write(Vec::new());
        link.reply_to_next_write(AckToken::BackupAck.bytes().to_vec());
        let mut pigeon = pigeon_with(&link);
        assert!(pigeon.store_almanac().unwrap());

        let link = ScriptedLink::new();
        link.reply_to_next_write(Vec::new());
        link.reply_to_next_write(AckToken::BackupNack.bytes().to_vec());
        let mut pigeon = pigeon_with(&link);
        assert!(!pigeon.store_almanac().unwrap());
    }
}
