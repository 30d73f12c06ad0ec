//! Binary report codec
//!
//! Pure, stateless frame parsing. One transport message is one frame; the
//! first byte selects the frame type:
//!
//! | type   | body                                                  |
//! |--------|-------------------------------------------------------|
//! | `0x01` | status batch (see [`status`])                         |
//! | `0x02` | inventory, UTF-8 JSON                                 |
//! | `0x03` | report batch, UTF-8 JSON array                        |
//! | `0x04` | device response, UTF-8 JSON                           |
//!
//! Outbound frames are commands (`0x10`) and firmware chunks (`0x11`).
//!
//! The codec knows nothing about peripheral semantics: status payloads are
//! handed on opaque and resolved later by the add-on registry.

pub mod status;

pub use status::{decode_status_batch, encode_status_batch, StatusRecord};

use crate::device::{DeviceResponse, Inventory, ReportMessage};
use bytes::{BufMut, Bytes, BytesMut};
use serde::de::DeserializeOwned;
use thiserror::Error;

/// Frame type bytes
pub mod frame_type {
    pub const STATUS_BATCH: u8 = 0x01;
    pub const INVENTORY: u8 = 0x02;
    pub const REPORT_BATCH: u8 = 0x03;
    pub const DEVICE_RESPONSE: u8 = 0x04;
    pub const COMMAND: u8 = 0x10;
    pub const FIRMWARE_CHUNK: u8 = 0x11;
}

/// Decode failures. All of them drop the whole frame.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("empty frame")]
    Empty,
    #[error("unknown frame type 0x{0:02x}")]
    UnknownFrameType(u8),
    #[error("status sub-record header truncated")]
    TruncatedHeader,
    #[error("add-on {id}: payload length {declared} exceeds remaining {remaining} bytes")]
    TruncatedFrame {
        id: u8,
        declared: usize,
        remaining: usize,
    },
    #[error("malformed body: {0}")]
    MalformedBody(String),
}

/// Decoded inbound frame
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// Add-on status sub-records, in wire order
    StatusBatch(Vec<StatusRecord>),
    /// Hardware-element inventory
    Inventory(Inventory),
    /// Initialization reports
    Reports(Vec<ReportMessage>),
    /// Response to a command
    Response(DeviceResponse),
}

impl Frame {
    /// Short name for logging
    pub fn name(&self) -> &'static str {
        match self {
            Self::StatusBatch(_) => "status_batch",
            Self::Inventory(_) => "inventory",
            Self::Reports(_) => "reports",
            Self::Response(_) => "response",
        }
    }
}

/// Decode one inbound frame
pub fn decode_frame(data: &[u8]) -> Result<Frame, CodecError> {
    let (&kind, body) = data.split_first().ok_or(CodecError::Empty)?;

    match kind {
        frame_type::STATUS_BATCH => decode_status_batch(body).map(Frame::StatusBatch),
        frame_type::INVENTORY => decode_json(body).map(Frame::Inventory),
        frame_type::REPORT_BATCH => decode_json(body).map(Frame::Reports),
        frame_type::DEVICE_RESPONSE => decode_json(body).map(Frame::Response),
        other => Err(CodecError::UnknownFrameType(other)),
    }
}

fn decode_json<T: DeserializeOwned>(body: &[u8]) -> Result<T, CodecError> {
    serde_json::from_slice(body).map_err(|e| CodecError::MalformedBody(e.to_string()))
}

/// Encode a text command
pub fn encode_command(command: &str) -> Bytes {
    let mut buf = BytesMut::with_capacity(command.len() + 1);
    buf.put_u8(frame_type::COMMAND);
    buf.put_slice(command.as_bytes());
    buf.freeze()
}

/// Encode a firmware chunk at `offset` into the image
pub fn encode_firmware_chunk(offset: u32, chunk: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(chunk.len() + 5);
    buf.put_u8(frame_type::FIRMWARE_CHUNK);
    buf.put_u32(offset);
    buf.put_slice(chunk);
    buf.freeze()
}

/// Extract the command string from an outbound command frame
///
/// Used by device simulators and tests.
pub fn parse_command(frame: &[u8]) -> Option<&str> {
    match frame.split_first() {
        Some((&frame_type::COMMAND, body)) => std::str::from_utf8(body).ok(),
        _ => None,
    }
}

/// Encode a JSON-bodied inbound frame (device side)
pub fn encode_json_frame<T: serde::Serialize>(kind: u8, value: &T) -> Bytes {
    let mut buf = BytesMut::new();
    buf.put_u8(kind);
    // Serializing derived types into a Vec cannot fail
    if let Ok(body) = serde_json::to_vec(value) {
        buf.put_slice(&body);
    }
    buf.freeze()
}
