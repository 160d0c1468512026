use log::{error, info, warn};
use std::io;
use std::thread;
use std::time::{Duration, Instant};

use super::error::{PigeonError, Result};
use super::transport::Link;
use super::{Pigeon, SessionState};
use crate::shared::signal::ShutdownSignal;

// A read starting with this byte means the link lost sync (usually a baud mismatch).
pub const DESYNC_MARKER: u8 = 0x00;

/// Raw receiver output handed downstream, one per non-empty read.
#[derive(Debug, Clone)]
pub struct RawMessage {
    pub mono_time: Instant,
    pub valid: bool,
    pub data: Vec<u8>,
}

/// Downstream consumer of the raw stream.
pub trait RawSink {
    fn publish(&mut self, message: RawMessage) -> io::Result<()>;
}

#[derive(Debug, Clone, Default)]
pub struct ReceiveOptions {
    // `None` runs until a stop is requested.
    pub duration: Option<Duration>,
    pub stats_interval: Option<Duration>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReceiveSummary {
    pub bytes: u64,
    pub messages: u64,
    pub reinits: u32,
}

impl<L: Link> Pigeon<L> {
    /// Forward receiver output until stopped, re-initializing the link whenever
    /// a read comes back desynchronized.
    pub fn run_receiving(
        &mut self,
        sink: &mut dyn RawSink,
        stop: &ShutdownSignal,
        options: &ReceiveOptions,
    ) -> Result<ReceiveSummary> {
        let started = Instant::now();
        let mut summary = ReceiveSummary::default();
        let mut last_stats = Instant::now();
        let mut stats_window_bytes: u64 = 0;

        while !stop.requested() && options.duration.is_none_or(|limit| started.elapsed() < limit) {
            let data = self.session.receive()?;
            if data.is_empty() {
                // Keep an idle or unplugged receiver from pinning a core.
                thread::sleep(self.timings.poll_interval);
            } else if data[0] == DESYNC_MARKER {
                warn!("received invalid data from receiver, re-initializing!");
                self.reinitialize(stop)?;
                summary.reinits += 1;
            } else {
                let size = data.len() as u64;
                sink.publish(RawMessage {
                    mono_time: Instant::now(),
                    valid: true,
                    data,
                })?;
                summary.bytes += size;
                summary.messages += 1;
                stats_window_bytes += size;
            }

            if let Some(interval) = options.stats_interval
                && last_stats.elapsed() >= interval
            {
                let elapsed = last_stats.elapsed().as_secs_f64().max(0.001);
                let bps = ((stats_window_bytes as f64 * 8.0) / elapsed).round() as u64;
                info!(
                    "[STAT] {:>10} B {:>7} bps state={}",
                    summary.bytes, bps, self.state
                );
                stats_window_bytes = 0;
                last_stats = Instant::now();
            }
        }

        info!(
            "receive loop stopped after {} messages ({} bytes, {} re-inits)",
            summary.messages, summary.bytes, summary.reinits
        );
        Ok(summary)
    }

    // Baud renegotiation plus configuration; the almanac is left alone.
    fn reinitialize(&mut self, stop: &ShutdownSignal) -> Result<()> {
        self.negotiate_baud()?;
        match self.configure(stop) {
            Ok(()) => {
                self.transition(SessionState::Operational);
                Ok(())
            }
            Err(err @ PigeonError::InitializationFailed { .. }) => {
                error!("re-initialization failed, continuing without fix: {err}");
                Ok(())
            }
            Err(err) => Err(err),
        }
    }
}
