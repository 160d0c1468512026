use crate::args::ResetArgs;
use crate::commands::run::{open_pigeon, select_host};
use crate::pigeon::backup::MAX_RESET_ATTEMPTS;
use crate::shared::lock::LockGuard;
use anyhow::{Context, Result, bail};
use log::info;

// Public reset command entrypoint.
// Wipes receiver configuration and the flash almanac backup, e.g. before handing a unit over.
pub fn run_reset(args: ResetArgs) -> Result<()> {
    let host = select_host(&args.device)?;
    let _lock = LockGuard::acquire(&args.device.lock_path())?;

    let mut pigeon = open_pigeon(host.as_ref(), &args.device)?;
    pigeon
        .negotiate_baud()
        .context("negotiating receiver baud rate failed")?;

    let cleared = pigeon.reset_device().context("resetting receiver failed")?;
    if !cleared {
        bail!("receiver backup still present after {MAX_RESET_ATTEMPTS} attempts");
    }
    info!("Receiver configuration and almanac backup cleared");
    Ok(())
}
