//! Wire codec for amplifier command packets
//!
//! Packets are serialized field by field in little-endian order, the byte
//! order announced during the handshake. Nothing here depends on in-memory
//! struct layout.

use std::time::Instant;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::CodecError;

/// Little-endian declaration sent first on every session
pub const LITTLE_ENDIAN_DECLARATION: &[u8; 5] = b"QNTEL";
/// Protocol version byte the amplifier sends after acknowledging the declaration
pub const PROTOCOL_VERSION: u8 = 1;

/// Begin recording (also the handshake's begin command)
pub const CMD_BEGIN: u8 = b'B';
/// End recording
pub const CMD_END: u8 = b'E';
/// Request clock synchronization
pub const CMD_ATTENTION: u8 = b'A';
/// Trigger event
pub const CMD_TRIGGER: u8 = b'D';
/// Clock sync packet
pub const CMD_SYNC: u8 = b'T';
/// Disconnect
pub const CMD_DISCONNECT: u8 = b'X';

/// Generic success
pub const RESPONSE_QUERY_SUCCESS: u8 = b'I';
/// Command-specific success
pub const RESPONSE_SUCCESS: u8 = b'Z';
/// Amplifier-reported failure
pub const RESPONSE_FAILURE: u8 = b'F';

/// `dataSize` field of every trigger packet
pub const TRIGGER_DATA_SIZE: u16 = 8;
/// Encoded trigger packet length
pub const TRIGGER_PACKET_LEN: usize = 1 + 2 + 4 + 4 + 4;
/// Encoded sync packet length
pub const SYNC_PACKET_LEN: usize = 1 + 4;

/// Amplifier response byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Response {
    /// `'I'`
    QuerySuccess,
    /// `'Z'`
    Success,
    /// `'F'`
    Failure,
    /// Anything else
    Unknown(u8),
}

impl Response {
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            RESPONSE_QUERY_SUCCESS => Self::QuerySuccess,
            RESPONSE_SUCCESS => Self::Success,
            RESPONSE_FAILURE => Self::Failure,
            other => Self::Unknown(other),
        }
    }

    pub fn as_byte(self) -> u8 {
        match self {
            Self::QuerySuccess => RESPONSE_QUERY_SUCCESS,
            Self::Success => RESPONSE_SUCCESS,
            Self::Failure => RESPONSE_FAILURE,
            Self::Unknown(byte) => byte,
        }
    }
}

/// Trigger event packet (`'D'`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriggerPacket {
    /// Milliseconds since the link's sync epoch
    pub timestamp_ms: i32,
    /// Event duration in milliseconds
    pub duration_ms: i32,
    /// Trigger code
    pub code: i32,
}

impl TriggerPacket {
    pub fn new(code: i32, timestamp_ms: i32, duration_ms: i32) -> Self {
        Self {
            timestamp_ms,
            duration_ms,
            code,
        }
    }

    pub fn encode(&self, buf: &mut impl BufMut) {
        buf.put_u8(CMD_TRIGGER);
        buf.put_u16_le(TRIGGER_DATA_SIZE);
        buf.put_i32_le(self.timestamp_ms);
        buf.put_i32_le(self.duration_ms);
        buf.put_i32_le(self.code);
    }

    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(TRIGGER_PACKET_LEN);
        self.encode(&mut buf);
        buf.freeze()
    }

    /// Decode a complete packet, command byte included
    pub fn decode(mut buf: &[u8]) -> Result<Self, CodecError> {
        check_len(buf, TRIGGER_PACKET_LEN)?;
        check_command(buf.get_u8(), CMD_TRIGGER)?;
        let data_size = buf.get_u16_le();
        if data_size != TRIGGER_DATA_SIZE {
            return Err(CodecError::DataSize {
                expected: TRIGGER_DATA_SIZE,
                actual: data_size,
            });
        }
        Ok(Self {
            timestamp_ms: buf.get_i32_le(),
            duration_ms: buf.get_i32_le(),
            code: buf.get_i32_le(),
        })
    }
}

/// Clock sync packet (`'T'`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SyncPacket {
    pub timestamp_ms: i32,
}

impl SyncPacket {
    pub fn new(timestamp_ms: i32) -> Self {
        Self { timestamp_ms }
    }

    pub fn encode(&self, buf: &mut impl BufMut) {
        buf.put_u8(CMD_SYNC);
        buf.put_i32_le(self.timestamp_ms);
    }

    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(SYNC_PACKET_LEN);
        self.encode(&mut buf);
        buf.freeze()
    }

    pub fn decode(mut buf: &[u8]) -> Result<Self, CodecError> {
        check_len(buf, SYNC_PACKET_LEN)?;
        check_command(buf.get_u8(), CMD_SYNC)?;
        Ok(Self {
            timestamp_ms: buf.get_i32_le(),
        })
    }
}

/// Pack a four-character tag into a trigger code (first byte most significant)
pub fn tag_code(tag: &[u8; 4]) -> i32 {
    i32::from_be_bytes(*tag)
}

/// Signed milliseconds from `epoch` to `timestamp`, saturating at the i32 range
pub fn millis_since_epoch(epoch: Instant, timestamp: Instant) -> i32 {
    let millis = match timestamp.checked_duration_since(epoch) {
        Some(after) => after.as_millis() as i128,
        None => -(epoch.duration_since(timestamp).as_millis() as i128),
    };
    millis.clamp(i32::MIN as i128, i32::MAX as i128) as i32
}

fn check_len(buf: &[u8], expected: usize) -> Result<(), CodecError> {
    if buf.len() < expected {
        return Err(CodecError::Truncated {
            expected,
            actual: buf.len(),
        });
    }
    Ok(())
}

fn check_command(actual: u8, expected: u8) -> Result<(), CodecError> {
    if actual != expected {
        return Err(CodecError::UnexpectedCommand { expected, actual });
    }
    Ok(())
}
