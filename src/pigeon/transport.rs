use serialport::SerialPort;
use std::io::{self, Read, Write};

// Read granularity and per-call cap for `Session::receive`.
const READ_CHUNK_BYTES: usize = 0x40;
const RECEIVE_CAP_BYTES: usize = 0x1000;

/// Byte-level primitives of the link to the receiver.
///
/// `read_available` must never block: it returns `Ok(0)` when nothing is pending.
pub trait Link {
    fn write_all(&mut self, data: &[u8]) -> io::Result<()>;
    fn read_available(&mut self, buf: &mut [u8]) -> io::Result<usize>;
    fn set_baud_rate(&mut self, baud: u32) -> io::Result<()>;
}

// Serial ports are opened with a zero timeout, so an empty read surfaces as TimedOut.
impl Link for Box<dyn SerialPort> {
    fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        Write::write_all(self, data)?;
        self.flush()
    }

    fn read_available(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.read(buf) {
            Ok(size) => Ok(size),
            Err(err)
                if matches!(
                    err.kind(),
                    io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
                ) =>
            {
                Ok(0)
            }
            Err(err) => Err(err),
        }
    }

    fn set_baud_rate(&mut self, baud: u32) -> io::Result<()> {
        SerialPort::set_baud_rate(self.as_mut(), baud).map_err(io::Error::from)
    }
}

/// Byte pipe to the receiver. Holds no protocol knowledge.
pub struct Session<L> {
    link: L,
    baud: u32,
}

impl<L: Link> Session<L> {
    pub fn new(link: L, baud: u32) -> Self {
        Self { link, baud }
    }

    pub fn send(&mut self, data: &[u8]) -> io::Result<()> {
        self.link.write_all(data)
    }

    // Drain whatever is pending, bounded so one call cannot grow without limit.
    pub fn receive(&mut self) -> io::Result<Vec<u8>> {
        let mut data = Vec::new();
        let mut chunk = [0_u8; READ_CHUNK_BYTES];
        while data.len() < RECEIVE_CAP_BYTES {
            let size = self.link.read_available(&mut chunk)?;
            if size == 0 {
                break;
            }
            data.extend_from_slice(&chunk[..size]);
        }
        Ok(data)
    }

    pub fn set_baud(&mut self, baud: u32) -> io::Result<()> {
        self.link.set_baud_rate(baud)?;
        self.baud = baud;
        Ok(())
    }

    pub fn baud(&self) -> u32 {
        self.baud
    }
}
