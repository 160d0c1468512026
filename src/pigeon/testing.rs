// In-memory receiver double used by the driver tests.
use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use super::assist::AssistSource;
use super::codec::{Frame, SYNC};
use super::error::{PigeonError, Result};
use super::power::{AlwaysOn, GpioLine, GpioPower, PowerSequencer};
use super::receive::{RawMessage, RawSink};
use super::transport::Link;
use super::{BaudRates, Pigeon, Timings};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Write(Vec<u8>),
    Publish(Vec<u8>),
}

#[derive(Default)]
struct State {
    bursts: VecDeque<Vec<u8>>,
    replies: VecDeque<Vec<u8>>,
    scheduled: Vec<(usize, Vec<u8>)>,
    auto_ack: bool,
    writes: usize,
    events: Vec<Event>,
    bauds: Vec<u32>,
    read_error: Option<io::ErrorKind>,
}

/// Scripted link: reads are served in bursts, writes may trigger replies.
#[derive(Clone, Default)]
pub struct ScriptedLink {
    state: Arc<Mutex<State>>,
}

impl ScriptedLink {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    // Bytes that become readable now; one burst ends with an empty read.
    pub fn push_burst(&self, bytes: Vec<u8>) {
        self.state().bursts.push_back(bytes);
    }

    // Every UBX write without a queued reply is answered with UBX-ACK-ACK.
    pub fn auto_ack(&self, enabled: bool) {
        self.state().auto_ack = enabled;
    }

    // Reply to the next write that does not already have a queued reply.
    pub fn reply_to_next_write(&self, bytes: Vec<u8>) {
        self.state().replies.push_back(bytes);
    }

    // Burst delivered once the total number of writes reaches `writes`.
    pub fn deliver_after_writes(&self, writes: usize, bytes: Vec<u8>) {
        self.state().scheduled.push((writes, bytes));
    }

    pub fn fail_reads(&self, kind: io::ErrorKind) {
        self.state().read_error = Some(kind);
    }

    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.state()
            .events
            .iter()
            .filter_map(|event| match event {
                Event::Write(bytes) => Some(bytes.clone()),
                Event::Publish(_) => None,
            })
            .collect()
    }

    pub fn events(&self) -> Vec<Event> {
        self.state().events.clone()
    }

    pub fn baud_history(&self) -> Vec<u32> {
        self.state().bauds.clone()
    }

    // Sink whose publishes land in the same event log as the writes.
    pub fn sink(&self) -> RecordingSink {
        RecordingSink {
            state: Arc::clone(&self.state),
        }
    }
}

pub fn ack_for(command: &[u8]) -> Vec<u8> {
    Frame::build(0x05, 0x01, &[command[2], command[3]])
        .unwrap()
        .into_bytes()
}

pub fn nack_for(command: &[u8]) -> Vec<u8> {
    Frame::build(0x05, 0x00, &[command[2], command[3]])
        .unwrap()
        .into_bytes()
}

impl Link for ScriptedLink {
    fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        let mut state = self.state();
        state.events.push(Event::Write(data.to_vec()));
        state.writes += 1;

        if let Some(reply) = state.replies.pop_front() {
            state.bursts.push_back(reply);
        } else if state.auto_ack && data.starts_with(&SYNC) && data.len() >= 4 {
            state.bursts.push_back(ack_for(data));
        }

        let writes = state.writes;
        let due: Vec<Vec<u8>> = state
            .scheduled
            .iter()
            .filter(|(at, _)| *at == writes)
            .map(|(_, bytes)| bytes.clone())
            .collect();
        state.bursts.extend(due);
        Ok(())
    }

    fn read_available(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut state = self.state();
        if let Some(kind) = state.read_error {
            return Err(io::Error::new(kind, "scripted read failure"));
        }
        let Some(front) = state.bursts.front_mut() else {
            return Ok(0);
        };
        if front.is_empty() {
            state.bursts.pop_front();
            return Ok(0);
        }
        let size = front.len().min(buf.len());
        buf[..size].copy_from_slice(&front[..size]);
        front.drain(..size);
        Ok(size)
    }

    fn set_baud_rate(&mut self, baud: u32) -> io::Result<()> {
        self.state().bauds.push(baud);
        Ok(())
    }
}

pub struct RecordingSink {
    state: Arc<Mutex<State>>,
}

impl RawSink for RecordingSink {
    fn publish(&mut self, message: RawMessage) -> io::Result<()> {
        assert!(message.valid);
        self.state
            .lock()
            .unwrap()
            .events
            .push(Event::Publish(message.data));
        Ok(())
    }
}

// Session on an always-on host with millisecond timeouts.
pub fn pigeon_with(link: &ScriptedLink) -> Pigeon<ScriptedLink> {
    let timings = Timings::immediate();
    let power = PowerSequencer::new(Box::new(AlwaysOn), &timings);
    Pigeon::new(link.clone(), power, timings, BaudRates::default())
}

/// Level changes of every recorded GPIO line, in order.
pub type LineLog = Arc<Mutex<Vec<(&'static str, bool)>>>;

pub struct RecordingLine {
    name: &'static str,
    log: LineLog,
}

impl GpioLine for RecordingLine {
    fn set(&mut self, high: bool) -> io::Result<()> {
        self.log.lock().unwrap().push((self.name, high));
        Ok(())
    }
}

pub fn recording_gpio_power(log: &LineLog) -> GpioPower<RecordingLine> {
    let line = |name| RecordingLine {
        name,
        log: Arc::clone(log),
    };
    GpioPower::new(line("rst_n"), line("safeboot_n"), line("pwr_en"), Duration::ZERO)
}

// Session on a host that switches the supply, with the lines recorded into `log`.
pub fn controllable_pigeon_with(link: &ScriptedLink, log: &LineLog) -> Pigeon<ScriptedLink> {
    let timings = Timings::immediate();
    let power = PowerSequencer::new(Box::new(recording_gpio_power(log)), &timings);
    Pigeon::new(link.clone(), power, timings, BaudRates::default())
}

pub fn restore_status_frame(status: u8) -> Vec<u8> {
    vec![
        0xB5, 0x62, 0x09, 0x14, 0x08, 0x00, 0x03, 0x00, 0x00, 0x00, status, 0x00, 0x00, 0x00,
    ]
}

/// Assistance source returning a fixed body or a fetch failure.
pub struct StaticAssist {
    body: Option<Vec<u8>>,
}

impl StaticAssist {
    pub fn empty() -> Self {
        Self {
            body: Some(Vec::new()),
        }
    }

    pub fn serving(body: Vec<u8>) -> Self {
        Self { body: Some(body) }
    }

    pub fn failing() -> Self {
        Self { body: None }
    }
}

impl AssistSource for StaticAssist {
    fn fetch(&self, _token: &str) -> Result<Vec<u8>> {
        self.body
            .clone()
            .ok_or_else(|| PigeonError::AssistFetch("service unavailable".to_string()))
    }
}
