//! Add-on status batch parsing
//!
//! Body format: repeated sub-records
//! `[id: u8, status: u8, len: u8, payload: len bytes]`
//!
//! A batch is all-or-nothing: if any sub-record declares more payload than
//! remains, the whole batch is rejected. Applying the records before the
//! truncation point could leave peripheral state misaligned.

use super::CodecError;
use bytes::{BufMut, Bytes, BytesMut};

/// Sub-record header size (id, status, len)
const HEADER_SIZE: usize = 3;

/// One add-on status sub-record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusRecord {
    /// Owning hardware-element id
    pub id: u8,
    /// Kind-specific status flags
    pub status: u8,
    /// Opaque payload, interpreted by the add-on decoder
    pub payload: Bytes,
}

impl StatusRecord {
    pub fn new(id: u8, status: u8, payload: impl Into<Bytes>) -> Self {
        Self {
            id,
            status,
            payload: payload.into(),
        }
    }

    /// Append the wire form of this record to `out`
    ///
    /// Payloads longer than 255 bytes are cut to fit the length byte.
    pub fn encode_into(&self, out: &mut BytesMut) {
        let len = self.payload.len().min(u8::MAX as usize);
        out.put_u8(self.id);
        out.put_u8(self.status);
        out.put_u8(len as u8);
        out.put_slice(&self.payload[..len]);
    }
}

/// Parse a status batch body into its sub-records
pub fn decode_status_batch(body: &[u8]) -> Result<Vec<StatusRecord>, CodecError> {
    let mut records = Vec::new();
    let mut rest = body;

    while !rest.is_empty() {
        if rest.len() < HEADER_SIZE {
            return Err(CodecError::TruncatedHeader);
        }
        let id = rest[0];
        let status = rest[1];
        let declared = rest[2] as usize;
        let remaining = rest.len() - HEADER_SIZE;

        if declared > remaining {
            return Err(CodecError::TruncatedFrame {
                id,
                declared,
                remaining,
            });
        }

        let payload = Bytes::copy_from_slice(&rest[HEADER_SIZE..HEADER_SIZE + declared]);
        records.push(StatusRecord {
            id,
            status,
            payload,
        });
        rest = &rest[HEADER_SIZE + declared..];
    }

    Ok(records)
}

/// Encode a complete status batch frame (device side)
pub fn encode_status_batch(records: &[StatusRecord]) -> Bytes {
    let mut buf = BytesMut::new();
    buf.put_u8(super::frame_type::STATUS_BATCH);
    for record in records {
        record.encode_into(&mut buf);
    }
    buf.freeze()
}
