use chrono::{DateTime, Timelike, Utc};
use log::info;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::pigeon::receive::{RawMessage, RawSink};

// Raw stream written to UTC-hour files, rotated on the hour and flushed periodically.
pub struct FileSink {
    data_dir: PathBuf,
    flush_interval: Duration,
    last_flush: Instant,
    active_hour_key: String,
    writer: BufWriter<File>,
}

impl FileSink {
    pub fn create(data_dir: &Path, flush_interval: Duration) -> io::Result<Self> {
        fs::create_dir_all(data_dir)?;
        let (active_hour_key, file, path) = open_new_log_file_for_time(data_dir, Utc::now())?;
        info!("Logging raw receiver data to {}", path.display());
        Ok(Self {
            data_dir: data_dir.to_path_buf(),
            flush_interval: flush_interval.max(Duration::from_secs(1)),
            last_flush: Instant::now(),
            active_hour_key,
            writer: BufWriter::new(file),
        })
    }

    fn rotate_if_needed(&mut self, now: DateTime<Utc>) -> io::Result<()> {
        if hour_key(now) == self.active_hour_key {
            return Ok(());
        }
        self.writer.flush()?;
        let (new_hour_key, file, path) = open_new_log_file_for_time(&self.data_dir, now)?;
        self.writer = BufWriter::new(file);
        self.active_hour_key = new_hour_key;
        info!("Rotated raw output to {}", path.display());
        Ok(())
    }
}

impl RawSink for FileSink {
    fn publish(&mut self, message: RawMessage) -> io::Result<()> {
        if !message.valid {
            return Ok(());
        }
        self.rotate_if_needed(Utc::now())?;
        self.writer.write_all(&message.data)?;
        // Flush cadence follows the receive timestamps, not the wall clock.
        if message.mono_time.saturating_duration_since(self.last_flush) >= self.flush_interval {
            self.writer.flush()?;
            self.last_flush = message.mono_time;
        }
        Ok(())
    }
}

impl Drop for FileSink {
    fn drop(&mut self) {
        let _ = self.writer.flush();
    }
}

// Raw stream piped to stdout for an external consumer.
pub struct StdoutSink {
    out: io::Stdout,
}

impl StdoutSink {
    pub fn new() -> Self {
        Self { out: io::stdout() }
    }
}

impl RawSink for StdoutSink {
    fn publish(&mut self, message: RawMessage) -> io::Result<()> {
        if !message.valid {
            return Ok(());
        }
        let mut out = self.out.lock();
        out.write_all(&message.data)?;
        out.flush()
    }
}

fn hour_key(now: DateTime<Utc>) -> String {
    floor_to_hour(now).format("%Y%m%d_%H").to_string()
}

// Open a fresh timestamped file and return the corresponding UTC hour bucket key.
fn open_new_log_file_for_time(
    data_dir: &Path,
    now: DateTime<Utc>,
) -> io::Result<(String, File, PathBuf)> {
    let file_name = format!("{}.ubx", now.format("%Y%m%d_%H%M%S"));
    let path = data_dir.join(file_name);
    let file = OpenOptions::new().create(true).append(true).open(&path)?;
    Ok((hour_key(now), file, path))
}

// Truncate to top-of-hour; falls back to the input if the calendar rejects it.
fn floor_to_hour(dt: DateTime<Utc>) -> DateTime<Utc> {
    dt.with_minute(0)
        .and_then(|v| v.with_second(0))
        .and_then(|v| v.with_nanosecond(0))
        .unwrap_or(dt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::env;
    use std::process;

    #[test]
    fn hour_key_ignores_minutes() {
        let a = Utc.with_ymd_and_hms(2026, 10, 19, 13, 0, 1).unwrap();
        let b = Utc.with_ymd_and_hms(2026, 10, 19, 13, 59, 59).unwrap();
        let c = Utc.with_ymd_and_hms(2026, 10, 19, 14, 0, 0).unwrap();
        assert_eq!(hour_key(a), "20261019_13");
        assert_eq!(hour_key(a), hour_key(b));
        assert_ne!(hour_key(b), hour_key(c));
    }

    #[test]
    fn file_sink_writes_raw_bytes() {
        let dir = env::temp_dir().join(format!("pigeond-output-{}", process::id()));
        let _ = fs::remove_dir_all(&dir);

        {
            let mut sink = FileSink::create(&dir, Duration::from_secs(5)).unwrap();
            for chunk in [vec![0xB5, 0x62], vec![0x01, 0x07]] {
                sink.publish(RawMessage {
                    mono_time: Instant::now(),
                    valid: true,
                    data: chunk,
                })
                .unwrap();
            }
        }

        let written: Vec<u8> = fs::read_dir(&dir)
            .unwrap()
            .flat_map(|entry| fs::read(entry.unwrap().path()).unwrap())
            .collect();
        assert_eq!(written, vec![0xB5, 0x62, 0x01, 0x07]);
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn file_sink_drops_invalid_and_flushes_on_interval() {
        let dir = env::temp_dir().join(format!("pigeond-output-flush-{}", process::id()));
        let _ = fs::remove_dir_all(&dir);
        let mut sink = FileSink::create(&dir, Duration::from_secs(1)).unwrap();
        let started = sink.last_flush;

        let message = |data: Vec<u8>, valid, after| RawMessage {
            mono_time: started + Duration::from_millis(after),
            valid,
            data,
        };
        sink.publish(message(vec![0x00, 0x00], false, 10)).unwrap();
        sink.publish(message(vec![0xB5, 0x62], true, 20)).unwrap();
        let on_disk = || -> Vec<u8> {
            fs::read_dir(&dir)
                .unwrap()
                .flat_map(|entry| fs::read(entry.unwrap().path()).unwrap())
                .collect()
        };
        assert!(on_disk().is_empty());

        sink.publish(message(vec![0x01, 0x07], true, 1_500)).unwrap();
        assert_eq!(on_disk(), vec![0xB5, 0x62, 0x01, 0x07]);
        drop(sink);
        let _ = fs::remove_dir_all(&dir);
    }
}
