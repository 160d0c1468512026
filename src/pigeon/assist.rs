use chrono::{DateTime, Datelike, Timelike, Utc};
use log::debug;
use reqwest::blocking::{Client, RequestBuilder};
use reqwest::{StatusCode, Url};
use std::time::Duration;
use url::form_urlencoded;

use super::Pigeon;
use super::codec::{AckToken, Frame, split_assist_stream};
use super::error::{PigeonError, Result};
use super::transport::Link;

pub const DEFAULT_ASSIST_ENDPOINT: &str =
    "https://online-live2.services.u-blox.com/GetOnlineData.ashx";
const FETCH_TIMEOUT: Duration = Duration::from_secs(5);
// The service wants the list separators as literal commas.
const ASSIST_SELECTION: &str = "gnss=gps,glo&datatype=eph,alm,aux";

// UBX-MGA-INI-TIME_UTC
const MGA_CLASS: u8 = 0x13;
const MGA_INI_ID: u8 = 0x40;
const TIME_UTC_TYPE: u8 = 0x10;
const LEAP_SECONDS_UNKNOWN: u8 = 0x80;
const TIME_ACCURACY_SECS: u16 = 30;

/// Where assistance (ephemeris/almanac) data comes from.
pub trait AssistSource {
    fn fetch(&self, token: &str) -> Result<Vec<u8>>;
}

pub struct HttpAssistSource {
    client: Client,
    endpoint: Url,
}

impl HttpAssistSource {
    pub fn new(endpoint: &str) -> Result<Self> {
        let endpoint = Url::parse(endpoint)
            .map_err(|err| PigeonError::AssistFetch(format!("invalid endpoint {endpoint}: {err}")))?;
        let client = Client::builder()
            .timeout(FETCH_TIMEOUT)
            .build()
            .map_err(|err| PigeonError::AssistFetch(err.to_string()))?;
        Ok(Self { client, endpoint })
    }

    // Only the token is form-encoded; the selection is appended verbatim.
    fn request(&self, token: &str) -> RequestBuilder {
        let token: String = form_urlencoded::byte_serialize(token.as_bytes()).collect();
        let mut url = self.endpoint.clone();
        url.set_query(Some(&format!("token={token}&{ASSIST_SELECTION}")));
        self.client.get(url)
    }
}

impl AssistSource for HttpAssistSource {
    fn fetch(&self, token: &str) -> Result<Vec<u8>> {
        let response = self
            .request(token)
            .send()
            .map_err(|err| PigeonError::AssistFetch(err.to_string()))?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(PigeonError::AssistFetch(format!("unexpected status {status}")));
        }
        let body = response
            .bytes()
            .map_err(|err| PigeonError::AssistFetch(err.to_string()))?;
        Ok(body.to_vec())
    }
}

// Wall-clock time with 30 s accuracy; leap seconds left for the receiver to decide.
pub fn time_injection_frame(now: DateTime<Utc>) -> Result<Frame> {
    let mut payload = Vec::with_capacity(24);
    payload.extend_from_slice(&[TIME_UTC_TYPE, 0x00, 0x00, LEAP_SECONDS_UNKNOWN]);
    payload.extend_from_slice(&(now.year() as u16).to_le_bytes());
    payload.extend_from_slice(&[
        now.month() as u8,
        now.day() as u8,
        now.hour() as u8,
        now.minute() as u8,
        now.second() as u8,
        0x00,
    ]);
    payload.extend_from_slice(&0_u32.to_le_bytes());
    payload.extend_from_slice(&TIME_ACCURACY_SECS.to_le_bytes());
    payload.extend_from_slice(&[0x00, 0x00]);
    payload.extend_from_slice(&0_u32.to_le_bytes());
    Frame::build(MGA_CLASS, MGA_INI_ID, &payload)
}

impl<L: Link> Pigeon<L> {
    pub fn inject_time(&mut self, now: DateTime<Utc>) -> Result<()> {
        let frame = time_injection_frame(now)?;
        self.send_with_ack(frame.as_bytes(), AckToken::AssistAck, Some(AckToken::Nack))
    }

    /// Fetch assistance data and feed it frame by frame.
    ///
    /// A broken stream is rejected before anything is sent; a frame that goes
    /// unacknowledged ends the injection.
    pub fn inject_assist(&mut self, source: &dyn AssistSource, token: &str) -> Result<usize> {
        let body = source.fetch(token)?;
        let frames = split_assist_stream(&body)?;
        for (index, frame) in frames.iter().enumerate() {
            debug!(
                "injecting assistance frame {}/{} (0x{:02X} 0x{:02X}, {} bytes)",
                index + 1,
                frames.len(),
                frame.class(),
                frame.id(),
                frame.payload().len()
            );
            self.send_with_ack(frame.as_bytes(), AckToken::AssistAck, Some(AckToken::Nack))?;
        }
        Ok(frames.len())
    }
}
