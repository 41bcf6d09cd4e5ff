//! RCON wire framing.
//!
//! Every frame is `[len: i32 LE][id: i32 LE][type: i32 LE][payload][0x00 0x00]`
//! where `len` counts everything after itself.

use super::ProtocolError;
use byteorder::{ByteOrder, LittleEndian};

/// Smallest complete frame: length, id, type and the two NUL terminators.
pub const MIN_FRAME_LEN: usize = 14;

/// Smallest legal value of the length field (id + type + terminators).
pub const MIN_BODY_LEN: usize = 10;

/// Upper bound for a response body. Minecraft caps payloads at 4096 bytes;
/// the extra room tolerates other implementations.
pub const MAX_BODY_LEN: usize = 16 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketType {
    /// Type 0, SERVERDATA_RESPONSE_VALUE
    Response,
    /// Type 2, SERVERDATA_EXECCOMMAND; auth replies share the tag
    Command,
    /// Type 3, SERVERDATA_AUTH
    Auth,
}

impl PacketType {
    pub fn as_i32(self) -> i32 {
        match self {
            Self::Response => 0,
            Self::Command => 2,
            Self::Auth => 3,
        }
    }

    pub fn from_i32(value: i32) -> Result<Self, ProtocolError> {
        match value {
            0 => Ok(Self::Response),
            2 => Ok(Self::Command),
            3 => Ok(Self::Auth),
            other => Err(ProtocolError::Malformed(format!("unknown packet type {}", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RconPacket {
    pub id: i32,
    pub kind: PacketType,
    pub payload: String,
}

impl RconPacket {
    pub fn new(id: i32, kind: PacketType, payload: impl Into<String>) -> Self {
        Self {
            id,
            kind,
            payload: payload.into(),
        }
    }

    /// Serialize into a complete frame, length prefix included.
    pub fn encode(&self) -> Vec<u8> {
        let payload = self.payload.as_bytes();
        let body_len = 4 + 4 + payload.len() + 2;
        let mut buf = vec![0u8; 4 + body_len];
        LittleEndian::write_i32(&mut buf[0..4], body_len as i32);
        LittleEndian::write_i32(&mut buf[4..8], self.id);
        LittleEndian::write_i32(&mut buf[8..12], self.kind.as_i32());
        buf[12..12 + payload.len()].copy_from_slice(payload);
        // trailing two bytes stay zero
        buf
    }

    /// Parse a complete frame, length prefix included.
    pub fn decode(data: &[u8]) -> Result<Self, ProtocolError> {
        if data.len() < MIN_FRAME_LEN {
            return Err(ProtocolError::Malformed(format!(
                "packet too short: {} bytes",
                data.len()
            )));
        }
        let declared = LittleEndian::read_i32(&data[0..4]);
        if declared < MIN_BODY_LEN as i32 {
            return Err(ProtocolError::Malformed(format!("invalid length field {}", declared)));
        }
        let id = LittleEndian::read_i32(&data[4..8]);
        let kind = PacketType::from_i32(LittleEndian::read_i32(&data[8..12]))?;
        let payload = String::from_utf8_lossy(&data[12..data.len() - 2]).into_owned();
        Ok(Self { id, kind, payload })
    }

    /// Decode the body-length prefix of an incoming frame.
    pub fn body_len(prefix: [u8; 4]) -> Result<usize, ProtocolError> {
        let len = LittleEndian::read_i32(&prefix);
        if len < MIN_BODY_LEN as i32 || len as usize > MAX_BODY_LEN {
            return Err(ProtocolError::Malformed(format!("invalid frame length {}", len)));
        }
        Ok(len as usize)
    }
}
