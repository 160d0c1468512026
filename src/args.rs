use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::pigeon::assist::DEFAULT_ASSIST_ENDPOINT;
use crate::pigeon::host::GpioPins;
use crate::pigeon::{BaudRates, Timings};
use crate::shared::lock::lock_path_for_port;

// CLI root definition. This is the single entrypoint for all supported modes.
#[derive(Parser, Debug)]
#[command(name = "pigeond", version)]
#[command(about = "u-blox receiver driver: configure, stream raw UBX, persist almanac")]
pub struct Cli {
    #[command(subcommand)]
    pub command: AppCommand,
}

// Subcommands map directly to one module each under src/commands/.
#[derive(Subcommand, Debug)]
pub enum AppCommand {
    /// Power up, configure and stream raw receiver output until interrupted
    Run(RunArgs),
    /// Cold start the receiver and wipe its configuration and almanac backup
    Reset(ResetArgs),
}

// How the receiver is attached. Unset means the host is not supported.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostKind {
    /// Fixed UART with GPIO-controlled reset and supply
    Fixed,
    /// Bus-powered USB-CDC receiver
    Usb,
}

// Device access shared by every subcommand.
#[derive(Args, Debug, Clone)]
pub struct DeviceArgs {
    #[arg(long, value_enum, env = "PIGEON_HOST")]
    pub host: Option<HostKind>,
    #[arg(long, default_value = "/dev/ttyHS0")]
    pub serial_port: String,
    #[arg(long, default_value_t = 9_600)]
    pub default_baud: u32,
    #[arg(long, default_value_t = 460_800)]
    pub operational_baud: u32,
    /// Defaults to a per-port lock file in the temp directory
    #[arg(long)]
    pub lock_file: Option<PathBuf>,
    #[arg(long, default_value_t = 32)]
    pub gpio_reset_n: u32,
    #[arg(long, default_value_t = 33)]
    pub gpio_safeboot_n: u32,
    #[arg(long, default_value_t = 34)]
    pub gpio_power_enable: u32,
    #[arg(long, default_value_t = 500)]
    pub ack_timeout_ms: u64,
    #[arg(long, default_value_t = 1_000)]
    pub backup_status_timeout_ms: u64,
}

impl DeviceArgs {
    pub fn bauds(&self) -> BaudRates {
        BaudRates {
            default: self.default_baud,
            operational: self.operational_baud,
        }
    }

    pub fn lock_path(&self) -> PathBuf {
        self.lock_file
            .clone()
            .unwrap_or_else(|| lock_path_for_port(&env::temp_dir(), &self.serial_port))
    }

    pub fn pins(&self) -> GpioPins {
        GpioPins {
            reset_n: self.gpio_reset_n,
            safeboot_n: self.gpio_safeboot_n,
            power_enable: self.gpio_power_enable,
        }
    }

    pub fn timings(&self) -> Timings {
        Timings {
            ack_timeout: Duration::from_millis(self.ack_timeout_ms),
            backup_status_timeout: Duration::from_millis(self.backup_status_timeout_ms),
            ..Timings::default()
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    #[command(flatten)]
    pub device: DeviceArgs,
    /// Directory holding one file per parameter (AssistNowToken, IsOnroad)
    #[arg(long)]
    pub params_dir: Option<PathBuf>,
    #[arg(long, env = "ASSISTNOW_TOKEN", hide_env_values = true)]
    pub assist_token: Option<String>,
    #[arg(long, default_value = DEFAULT_ASSIST_ENDPOINT)]
    pub assist_endpoint: String,
    /// Wall-clock dates before this are treated as an unsynced clock
    #[arg(long, default_value = "2025-01-01")]
    pub min_valid_date: NaiveDate,
    #[arg(long, default_value = "data")]
    pub output_dir: PathBuf,
    /// Write the raw stream to stdout instead of hourly files
    #[arg(long, default_value_t = false)]
    pub stdout: bool,
    #[arg(long, default_value_t = 5)]
    pub flush_interval_secs: u64,
    #[arg(long, default_value_t = 60)]
    pub stats_interval_secs: u64,
    /// Stop receiving after this many seconds (0 runs until interrupted)
    #[arg(long, default_value_t = 0)]
    pub duration_secs: u64,
}

#[derive(Args, Debug, Clone)]
pub struct ResetArgs {
    #[command(flatten)]
    pub device: DeviceArgs,
}
