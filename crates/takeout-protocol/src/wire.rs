//! Wire format: fixed-size records.
//!
//! Each message on the wire is:
//!   [4 bytes big-endian kind][2048 bytes UTF-8 payload, NUL padded]

use bytes::{Buf, BufMut, Bytes, BytesMut};
use takeout_types::{Message, MessageKind, Payload, MAX_PAYLOAD_LEN};

use crate::error::ProtocolError;

/// Size of the kind field.
pub const KIND_LEN: usize = 4;

/// Size of one encoded record.
pub const RECORD_LEN: usize = KIND_LEN + MAX_PAYLOAD_LEN;

/// Encode a message to a fixed-size record.
pub fn encode_message(msg: &Message) -> Bytes {
    let mut buf = BytesMut::with_capacity(RECORD_LEN);
    buf.put_u32(msg.kind.as_u32());
    buf.put_slice(msg.payload.as_str().as_bytes());
    buf.put_bytes(0, RECORD_LEN - buf.len());
    buf.freeze()
}

/// Decode one complete record.
pub fn decode_message(record: &[u8]) -> Result<Message, ProtocolError> {
    if record.len() != RECORD_LEN {
        return Err(ProtocolError::Truncated {
            got: record.len(),
            expected: RECORD_LEN,
        });
    }

    let mut buf = record;
    let raw_kind = buf.get_u32();
    let kind =
        MessageKind::try_from(raw_kind).map_err(|_| ProtocolError::InvalidMessageKind(raw_kind))?;

    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    let text = std::str::from_utf8(&buf[..end])
        .map_err(|e| ProtocolError::Deserialization(e.to_string()))?;
    let payload =
        Payload::new(text).map_err(|e| ProtocolError::Deserialization(e.to_string()))?;

    Ok(Message { kind, payload })
}
