use log::{debug, error};
use std::thread;
use std::time::{Duration, Instant};

use super::backup::BackupRestoreStatus;
use super::codec::{
    AckToken, BACKUP_RESTORE_MARKER, BACKUP_RESTORE_STATUS_OFFSET, find_subslice,
};
use super::error::{PigeonError, Result};
use super::transport::Link;
use super::{Pigeon, SessionState};

// Receive buffer bound while waiting; older bytes are dropped past this size.
const MAX_PENDING_BYTES: usize = 0x4000;

// `$PUBX,41` port configuration: UART1, in UBX+NMEA+RTCM, out UBX+NMEA, given baud.
pub fn pubx_port_config(baud: u32) -> Vec<u8> {
    let body = format!("PUBX,41,1,0007,0003,{baud},0");
    let checksum = body.bytes().fold(0_u8, |acc, byte| acc ^ byte);
    format!("${body}*{checksum:02X}\r\n").into_bytes()
}

// Keep only the tail that could still hold the start of a token.
fn trim_pending(pending: &mut Vec<u8>, keep: usize) {
    if pending.len() > MAX_PENDING_BYTES {
        let cut = pending.len() - keep.min(pending.len());
        pending.drain(..cut);
    }
}

impl<L: Link> Pigeon<L> {
    /// Poll the link until `ack` or `nack` shows up anywhere in the received bytes.
    ///
    /// Returns `Ok(true)` on ack, `Ok(false)` on nack and `PigeonError::Timeout`
    /// when neither arrives within `timeout`.
    pub fn wait_for(
        &mut self,
        ack: AckToken,
        nack: Option<AckToken>,
        timeout: Duration,
    ) -> Result<bool> {
        let keep = ack
            .bytes()
            .len()
            .max(nack.map_or(0, |token| token.bytes().len()));
        let mut pending = Vec::new();
        let started = Instant::now();
        loop {
            pending.extend_from_slice(&self.session.receive()?);
            if ack.found_in(&pending) {
                debug!("received {ack:?} from receiver");
                return Ok(true);
            }
            if let Some(nack) = nack
                && nack.found_in(&pending)
            {
                error!("received {nack:?} from receiver");
                return Ok(false);
            }
            if started.elapsed() > timeout {
                error!("no response from receiver");
                return Err(PigeonError::Timeout(timeout));
            }
            trim_pending(&mut pending, keep);
            thread::sleep(self.timings.poll_interval);
        }
    }

    // Send, then require an ack; a nack is surfaced as an error for the retry layer.
    pub fn send_with_ack(
        &mut self,
        command: &[u8],
        ack: AckToken,
        nack: Option<AckToken>,
    ) -> Result<()> {
        self.session.send(command)?;
        if self.wait_for(ack, nack, self.timings.ack_timeout)? {
            Ok(())
        } else {
            Err(PigeonError::Nack {
                class: command.get(2).copied().unwrap_or_default(),
                id: command.get(3).copied().unwrap_or_default(),
            })
        }
    }

    pub fn wait_for_backup_restore_status(
        &mut self,
        timeout: Duration,
    ) -> Result<BackupRestoreStatus> {
        let mut pending = Vec::new();
        let started = Instant::now();
        loop {
            pending.extend_from_slice(&self.session.receive()?);
            if let Some(position) = find_subslice(&pending, BACKUP_RESTORE_MARKER)
                && pending.len() > position + BACKUP_RESTORE_STATUS_OFFSET
            {
                let code = pending[position + BACKUP_RESTORE_STATUS_OFFSET];
                return BackupRestoreStatus::try_from(code)
                    .map_err(|_| PigeonError::BackupStatus(code));
            }
            if started.elapsed() > timeout {
                error!("no backup restore response from receiver");
                return Err(PigeonError::Timeout(timeout));
            }
            trim_pending(&mut pending, BACKUP_RESTORE_STATUS_OFFSET + 1);
            thread::sleep(self.timings.poll_interval);
        }
    }

    /// Switch the receiver UART from its power-on rate to the operational rate.
    ///
    /// The port command is sent blind at the default rate; there is no ack to
    /// wait for since the answer would arrive at the new rate.
    pub fn negotiate_baud(&mut self) -> Result<()> {
        self.session.set_baud(self.bauds.default)?;
        self.session
            .send(&pubx_port_config(self.bauds.operational))?;
        thread::sleep(self.timings.baud_settle);
        self.session.set_baud(self.bauds.operational)?;
        debug!("link running at {} baud", self.session.baud());
        self.transition(SessionState::BaudNegotiated);
        Ok(())
    }
}
