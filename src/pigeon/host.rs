use serialport::SerialPort;
use std::io;
use std::time::Duration;

use super::Timings;
use super::power::{AlwaysOn, GpioPower, PowerControl, SysfsGpio};

/// GPIO pin numbers wiring the receiver on boards with controllable power.
#[derive(Debug, Clone, Copy)]
pub struct GpioPins {
    pub reset_n: u32,
    pub safeboot_n: u32,
    pub power_enable: u32,
}

/// What a host can do with the receiver: open its link and, maybe, switch its supply.
pub trait Host {
    fn open(&self) -> io::Result<Box<dyn SerialPort>>;
    fn power_controllable(&self) -> bool;
    fn power_control(&self, timings: &Timings) -> io::Result<Box<dyn PowerControl>>;
}

// Zero timeout: reads return whatever is buffered and never block.
fn open_port(path: &str, baud: u32) -> io::Result<Box<dyn SerialPort>> {
    serialport::new(path, baud)
        .timeout(Duration::ZERO)
        .open()
        .map_err(io::Error::from)
}

/// Receiver on a fixed UART with reset and supply lines on GPIO.
pub struct FixedUartHost {
    pub port: String,
    pub baud: u32,
    pub pins: GpioPins,
}

impl Host for FixedUartHost {
    fn open(&self) -> io::Result<Box<dyn SerialPort>> {
        open_port(&self.port, self.baud)
    }

    fn power_controllable(&self) -> bool {
        true
    }

    fn power_control(&self, timings: &Timings) -> io::Result<Box<dyn PowerControl>> {
        let power = GpioPower::new(
            SysfsGpio::open(self.pins.reset_n)?,
            SysfsGpio::open(self.pins.safeboot_n)?,
            SysfsGpio::open(self.pins.power_enable)?,
            timings.reset_hold,
        );
        Ok(Box::new(power))
    }
}

/// Bus-powered receiver enumerated as a USB-CDC serial device.
pub struct UsbCdcHost {
    pub port: String,
    pub baud: u32,
}

impl Host for UsbCdcHost {
    fn open(&self) -> io::Result<Box<dyn SerialPort>> {
        open_port(&self.port, self.baud)
    }

    fn power_controllable(&self) -> bool {
        false
    }

    fn power_control(&self, _timings: &Timings) -> io::Result<Box<dyn PowerControl>> {
        Ok(Box::new(AlwaysOn))
    }
}
