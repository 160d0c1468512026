use super::error::{PigeonError, Result};

pub const SYNC: [u8; 2] = [0xB5, 0x62];
pub const HEADER_LEN: usize = 6;
pub const CHECKSUM_LEN: usize = 2;

// Marker of the UPD-SOS backup-restore response; status byte sits at offset 10.
pub const BACKUP_RESTORE_MARKER: &[u8] = &[0xB5, 0x62, 0x09, 0x14, 0x08, 0x00, 0x03];
pub const BACKUP_RESTORE_STATUS_OFFSET: usize = 10;

/// Fixed byte sequences the receiver emits in response to commands.
///
/// Tokens are matched as substrings of whatever has been received so far,
/// so they do not need to be frame aligned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckToken {
    /// UBX-ACK-ACK
    Ack,
    /// UBX-ACK-NAK
    Nack,
    /// UBX-UPD-SOS acknowledging a backup store
    BackupAck,
    /// UBX-UPD-SOS rejecting a backup store
    BackupNack,
    /// UBX-MGA-ACK for assistance and time injection
    AssistAck,
}

impl AckToken {
    pub fn bytes(self) -> &'static [u8] {
        match self {
            Self::Ack => &[0xB5, 0x62, 0x05, 0x01, 0x02, 0x00],
            Self::Nack => &[0xB5, 0x62, 0x05, 0x00, 0x02, 0x00],
            Self::BackupAck => &[
                0xB5, 0x62, 0x09, 0x14, 0x08, 0x00, 0x02, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00,
            ],
            Self::BackupNack => &[
                0xB5, 0x62, 0x09, 0x14, 0x08, 0x00, 0x02, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            ],
            Self::AssistAck => &[0xB5, 0x62, 0x13, 0x60, 0x08, 0x00],
        }
    }

    pub fn found_in(self, haystack: &[u8]) -> bool {
        find_subslice(haystack, self.bytes()).is_some()
    }
}

// Two running 8-bit sums over the bytes following the sync marker.
pub fn checksum(body: &[u8]) -> (u8, u8) {
    let mut ck_a = 0_u8;
    let mut ck_b = 0_u8;
    for byte in body {
        ck_a = ck_a.wrapping_add(*byte);
        ck_b = ck_b.wrapping_add(ck_a);
    }
    (ck_a, ck_b)
}

// Append the checksum pair to a message that already starts with the sync marker.
pub fn add_checksum(message: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(message.len() + CHECKSUM_LEN);
    frame.extend_from_slice(message);
    let (ck_a, ck_b) = checksum(message.get(SYNC.len()..).unwrap_or_default());
    frame.push(ck_a);
    frame.push(ck_b);
    frame
}

/// Complete UBX frame: sync, class, id, little-endian length, payload, checksum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    bytes: Vec<u8>,
}

impl Frame {
    // Build a full frame with header, payload length and checksum.
    // The length field is 16 bits wide; longer payloads cannot be framed.
    pub fn build(class: u8, id: u8, payload: &[u8]) -> Result<Self> {
        let length = u16::try_from(payload.len())
            .map_err(|_| PigeonError::PayloadTooLarge(payload.len()))?;
        let mut message = Vec::with_capacity(HEADER_LEN + payload.len());
        message.extend_from_slice(&SYNC);
        message.extend_from_slice(&[class, id]);
        message.extend_from_slice(&length.to_le_bytes());
        message.extend_from_slice(payload);
        Ok(Self {
            bytes: add_checksum(&message),
        })
    }

    pub fn parse(bytes: &[u8]) -> Option<Self> {
        is_valid_frame(bytes).then(|| Self {
            bytes: bytes.to_vec(),
        })
    }

    pub fn class(&self) -> u8 {
        self.bytes[2]
    }

    pub fn id(&self) -> u8 {
        self.bytes[3]
    }

    pub fn payload(&self) -> &[u8] {
        &self.bytes[HEADER_LEN..self.bytes.len() - CHECKSUM_LEN]
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    #[cfg(test)]
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

// A frame is accepted only when sync, declared length and trailing checksum all agree.
pub fn is_valid_frame(bytes: &[u8]) -> bool {
    if bytes.len() < HEADER_LEN + CHECKSUM_LEN || bytes[..2] != SYNC {
        return false;
    }
    if bytes.len() != HEADER_LEN + payload_len(bytes) + CHECKSUM_LEN {
        return false;
    }
    let (body, trailer) = bytes.split_at(bytes.len() - CHECKSUM_LEN);
    checksum(&body[SYNC.len()..]) == (trailer[0], trailer[1])
}

fn payload_len(header: &[u8]) -> usize {
    usize::from(u16::from_le_bytes([header[4], header[5]]))
}

pub fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// Walks a concatenated stream of frames as served by the assistance service.
///
/// Yields one item per frame; after the first error the iterator is exhausted
/// and the rest of the buffer is discarded.
pub struct AssistFrames<'a> {
    data: &'a [u8],
    offset: usize,
    failed: bool,
}

impl<'a> AssistFrames<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            offset: 0,
            failed: false,
        }
    }

    fn fail(&mut self, reason: &'static str) -> Option<Result<Frame>> {
        self.failed = true;
        Some(Err(PigeonError::MalformedStream {
            offset: self.offset,
            reason,
        }))
    }
}

impl Iterator for AssistFrames<'_> {
    type Item = Result<Frame>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.offset >= self.data.len() {
            return None;
        }

        let rest = &self.data[self.offset..];
        if rest.len() < HEADER_LEN {
            return self.fail("truncated header");
        }
        if rest[..2] != SYNC {
            return self.fail("missing sync marker");
        }

        let frame_len = HEADER_LEN + payload_len(rest) + CHECKSUM_LEN;
        if rest.len() < frame_len {
            return self.fail("frame length overruns buffer");
        }

        let Some(frame) = Frame::parse(&rest[..frame_len]) else {
            return self.fail("checksum mismatch");
        };
        self.offset += frame_len;
        Some(Ok(frame))
    }
}

// Split a whole assistance payload; any framing error rejects the entire stream.
pub fn split_assist_stream(data: &[u8]) -> Result<Vec<Frame>> {
    AssistFrames::new(data).collect()
}
