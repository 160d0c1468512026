use log::debug;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use super::Timings;

const SYSFS_GPIO_ROOT: &str = "/sys/class/gpio";

/// One digital output line.
pub trait GpioLine {
    fn set(&mut self, high: bool) -> io::Result<()>;
}

// Output line driven through the sysfs GPIO interface.
pub struct SysfsGpio {
    value_path: PathBuf,
}

impl SysfsGpio {
    // Export the pin when needed and configure it as an output.
    pub fn open(pin: u32) -> io::Result<Self> {
        let root = PathBuf::from(SYSFS_GPIO_ROOT);
        let pin_dir = root.join(format!("gpio{pin}"));
        if !pin_dir.exists() {
            fs::write(root.join("export"), pin.to_string())?;
        }
        fs::write(pin_dir.join("direction"), "out")?;
        Ok(Self {
            value_path: pin_dir.join("value"),
        })
    }
}

impl GpioLine for SysfsGpio {
    fn set(&mut self, high: bool) -> io::Result<()> {
        fs::write(&self.value_path, if high { "1" } else { "0" })
    }
}

/// Hosts either drive the module supply themselves or leave it permanently on.
pub trait PowerControl {
    fn set_power(&mut self, enabled: bool) -> io::Result<()>;
    fn is_controllable(&self) -> bool;
}

/// Module wired to reset, safeboot and supply-enable lines (all active-low except enable).
pub struct GpioPower<G> {
    reset_n: G,
    safeboot_n: G,
    power_enable: G,
    reset_hold: Duration,
}

impl<G: GpioLine> GpioPower<G> {
    pub fn new(reset_n: G, safeboot_n: G, power_enable: G, reset_hold: Duration) -> Self {
        Self {
            reset_n,
            safeboot_n,
            power_enable,
            reset_hold,
        }
    }
}

impl<G: GpioLine> PowerControl for GpioPower<G> {
    // Reset stays asserted while the supply changes state.
    fn set_power(&mut self, enabled: bool) -> io::Result<()> {
        self.safeboot_n.set(true)?;
        self.reset_n.set(false)?;
        self.power_enable.set(enabled)?;
        if enabled {
            thread::sleep(self.reset_hold);
            self.reset_n.set(true)?;
        }
        Ok(())
    }

    fn is_controllable(&self) -> bool {
        true
    }
}

/// Bus-powered module (e.g. USB-CDC) whose supply cannot be switched.
pub struct AlwaysOn;

impl PowerControl for AlwaysOn {
    fn set_power(&mut self, _enabled: bool) -> io::Result<()> {
        Ok(())
    }

    fn is_controllable(&self) -> bool {
        false
    }
}

pub struct PowerSequencer {
    control: Box<dyn PowerControl>,
    off_settle: Duration,
    ready_delay: Duration,
}

impl PowerSequencer {
    pub fn new(control: Box<dyn PowerControl>, timings: &Timings) -> Self {
        Self {
            control,
            off_settle: timings.power_off_settle,
            ready_delay: timings.power_ready_delay,
        }
    }

    pub fn is_controllable(&self) -> bool {
        self.control.is_controllable()
    }

    pub fn power(&mut self, enabled: bool) -> io::Result<()> {
        if !self.is_controllable() {
            return Ok(());
        }
        debug!("setting receiver power {}", if enabled { "on" } else { "off" });
        self.control.set_power(enabled)?;
        thread::sleep(if enabled {
            self.ready_delay
        } else {
            self.off_settle
        });
        Ok(())
    }

    // Off, settle, on, and wait until the module accepts commands.
    pub fn power_cycle(&mut self) -> io::Result<()> {
        self.power(false)?;
        self.power(true)
    }
}
