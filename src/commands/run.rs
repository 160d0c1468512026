use crate::args::{DeviceArgs, HostKind, RunArgs};
use crate::pigeon::assist::{AssistSource, HttpAssistSource};
use crate::pigeon::host::{FixedUartHost, Host, UsbCdcHost};
use crate::pigeon::power::PowerSequencer;
use crate::pigeon::receive::{RawSink, ReceiveOptions};
use crate::pigeon::transport::Link;
use crate::pigeon::{BootOptions, Pigeon, PigeonError};
use crate::shared::clock::system_time_valid;
use crate::shared::lock::LockGuard;
use crate::shared::output::{FileSink, StdoutSink};
use crate::shared::params::{ASSIST_TOKEN_KEY, IS_ONROAD_KEY, Params};
use crate::shared::signal::ShutdownSignal;
use anyhow::{Context, Result, bail};
use chrono::Utc;
use log::{error, info};
use serialport::SerialPort;
use std::time::Duration;

// Public run command entrypoint.
// Power up, configure, stream until Ctrl-C (or the duration limit), then store the almanac and power off.
pub fn run_mode(args: RunArgs) -> Result<()> {
    // Refuse unsupported hosts before touching any hardware.
    let host = select_host(&args.device)?;
    let signal = ShutdownSignal::install()?;
    let _lock = LockGuard::acquire(&args.device.lock_path())?;

    let params = args.params_dir.as_deref().map(Params::new);
    let assist_token = match (&args.assist_token, &params) {
        (Some(token), _) => Some(token.clone()),
        (None, Some(params)) => params.get(ASSIST_TOKEN_KEY)?,
        (None, None) => None,
    };
    let assist = HttpAssistSource::new(&args.assist_endpoint)
        .context("building assistance HTTP client failed")?;

    let mut sink: Box<dyn RawSink> = if args.stdout {
        Box::new(StdoutSink::new())
    } else {
        let flush_interval = Duration::from_secs(args.flush_interval_secs);
        Box::new(FileSink::create(&args.output_dir, flush_interval).with_context(|| {
            format!(
                "creating output directory failed: {}",
                args.output_dir.display()
            )
        })?)
    };

    let mut pigeon = open_pigeon(host.as_ref(), &args.device)?;
    pigeon
        .negotiate_baud()
        .context("negotiating receiver baud rate failed")?;

    let now = Utc::now();
    let boot = BootOptions {
        now,
        clock_valid: system_time_valid(now, args.min_valid_date),
        assist_token,
    };

    if let Err(err) = initialize_offroad(&mut pigeon, params.as_ref(), &boot, &assist, &signal) {
        if let Err(shutdown_err) = pigeon.shutdown() {
            error!("receiver shutdown failed: {shutdown_err}");
        }
        return Err(err);
    }
    info!(
        "Receiver {} (power {})",
        pigeon.state(),
        if pigeon.is_power_controllable() {
            "controlled"
        } else {
            "always on"
        }
    );

    let options = ReceiveOptions {
        duration: (args.duration_secs > 0).then(|| Duration::from_secs(args.duration_secs)),
        stats_interval: (args.stats_interval_secs > 0)
            .then(|| Duration::from_secs(args.stats_interval_secs)),
    };
    let received = pigeon.run_receiving(sink.as_mut(), &signal, &options);

    // Shutdown runs whether the loop ended cleanly or on a transport error.
    let shutdown = pigeon.shutdown();
    let summary = received.context("reading raw stream from receiver failed")?;
    shutdown.context("receiver shutdown failed")?;
    info!(
        "Run mode stopped, forwarded {} bytes in {} messages",
        summary.bytes, summary.messages
    );
    Ok(())
}

// Boot the receiver with IsOnroad forced off; the prior value comes back when this returns.
// A configuration that never took is logged and left to a later re-init.
pub(crate) fn initialize_offroad<L: Link>(
    pigeon: &mut Pigeon<L>,
    params: Option<&Params>,
    boot: &BootOptions,
    assist: &dyn AssistSource,
    signal: &ShutdownSignal,
) -> Result<()> {
    let _onroad = params
        .map(|params| params.override_bool(IS_ONROAD_KEY, false))
        .transpose()?;

    match pigeon.initialize(boot, assist, signal) {
        Ok(()) => Ok(()),
        Err(err @ PigeonError::InitializationFailed { .. }) => {
            error!("{err}; continuing without GNSS fix capability");
            Ok(())
        }
        Err(err) => Err(err).context("initializing receiver failed"),
    }
}

// Pick the host capability once; no host means unsupported hardware.
pub(crate) fn select_host(device: &DeviceArgs) -> Result<Box<dyn Host>> {
    let Some(kind) = device.host else {
        bail!("unsupported hardware for pigeond (set --host or PIGEON_HOST)");
    };
    let host: Box<dyn Host> = match kind {
        HostKind::Fixed => Box::new(FixedUartHost {
            port: device.serial_port.clone(),
            baud: device.default_baud,
            pins: device.pins(),
        }),
        HostKind::Usb => Box::new(UsbCdcHost {
            port: device.serial_port.clone(),
            baud: device.default_baud,
        }),
    };
    Ok(host)
}

// Power-cycle the module (when the host can) and open its link at the default rate.
pub(crate) fn open_pigeon(
    host: &dyn Host,
    device: &DeviceArgs,
) -> Result<Pigeon<Box<dyn SerialPort>>> {
    let timings = device.timings();
    let control = host
        .power_control(&timings)
        .context("claiming receiver power lines failed")?;
    let mut power = PowerSequencer::new(control, &timings);
    power
        .power_cycle()
        .context("power cycling receiver failed")?;

    let port = host.open().with_context(|| {
        format!(
            "opening serial port failed: {} @ {}",
            device.serial_port, device.default_baud
        )
    })?;
    info!(
        "Opened {} at {} baud ({} host)",
        device.serial_port,
        device.default_baud,
        if host.power_controllable() {
            "fixed"
        } else {
            "usb"
        }
    );
    Ok(Pigeon::new(port, power, timings, device.bauds()))
}
