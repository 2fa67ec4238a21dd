//! §6.5 Wire format — binary, tag-prefixed real-time protocol frames.

use thiserror::Error;

pub const TAG_SYNC_STEP1: u8 = 0x00;
pub const TAG_SYNC_STEP2: u8 = 0x01;
pub const TAG_DOC_UPDATE: u8 = 0x02;
pub const TAG_AWARENESS_SNAPSHOT: u8 = 0x03;
pub const TAG_AWARENESS_UPDATE: u8 = 0x04;
pub const TAG_PING: u8 = 0x10;
pub const TAG_PONG: u8 = 0x11;

/// Larger frames close the connection with 4413 before decoding is attempted.
pub const MAX_FRAME_BYTES: usize = 1024 * 1024;

#[derive(Debug, Error)]
pub enum WireError {
    #[error("empty frame")]
    Empty,
    #[error("unknown frame tag: 0x{0:02x}")]
    UnknownTag(u8),
    #[error("truncated frame")]
    Truncated,
    #[error("malformed varuint length prefix")]
    MalformedLength,
    #[error("frame exceeds {MAX_FRAME_BYTES} bytes")]
    TooLarge,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    SyncStep1(Vec<u8>),
    SyncStep2(Vec<u8>),
    DocUpdate(Vec<u8>),
    AwarenessSnapshot(Vec<u8>),
    AwarenessUpdate(Vec<u8>),
    Ping,
    Pong,
}

impl Frame {
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Frame::SyncStep1(p) => encode_tagged(TAG_SYNC_STEP1, p),
            Frame::SyncStep2(p) => encode_tagged(TAG_SYNC_STEP2, p),
            Frame::DocUpdate(p) => encode_tagged(TAG_DOC_UPDATE, p),
            Frame::AwarenessSnapshot(p) => encode_tagged(TAG_AWARENESS_SNAPSHOT, p),
            Frame::AwarenessUpdate(p) => encode_tagged(TAG_AWARENESS_UPDATE, p),
            Frame::Ping => vec![TAG_PING],
            Frame::Pong => vec![TAG_PONG],
        }
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, WireError> {
        if bytes.len() > MAX_FRAME_BYTES {
            return Err(WireError::TooLarge);
        }
        let (&tag, rest) = bytes.split_first().ok_or(WireError::Empty)?;
        match tag {
            TAG_PING => Ok(Frame::Ping),
            TAG_PONG => Ok(Frame::Pong),
            TAG_SYNC_STEP1 => Ok(Frame::SyncStep1(decode_payload(rest)?)),
            TAG_SYNC_STEP2 => Ok(Frame::SyncStep2(decode_payload(rest)?)),
            TAG_DOC_UPDATE => Ok(Frame::DocUpdate(decode_payload(rest)?)),
            TAG_AWARENESS_SNAPSHOT => Ok(Frame::AwarenessSnapshot(decode_payload(rest)?)),
            TAG_AWARENESS_UPDATE => Ok(Frame::AwarenessUpdate(decode_payload(rest)?)),
            other => Err(WireError::UnknownTag(other)),
        }
    }
}

fn encode_tagged(tag: u8, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(1 + 5 + payload.len());
    out.push(tag);
    write_varuint(&mut out, payload.len() as u64);
    out.extend_from_slice(payload);
    out
}

fn decode_payload(rest: &[u8]) -> Result<Vec<u8>, WireError> {
    let (len, consumed) = read_varuint(rest)?;
    let body = rest
        .get(consumed..consumed + len as usize)
        .ok_or(WireError::Truncated)?;
    Ok(body.to_vec())
}

/// Unsigned LEB128: 7 payload bits per byte, high bit set on all but the
/// last byte.
fn write_varuint(out: &mut Vec<u8>, mut value: u64) {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            break;
        }
        out.push(byte | 0x80);
    }
}

fn read_varuint(bytes: &[u8]) -> Result<(u64, usize), WireError> {
    let mut value: u64 = 0;
    let mut shift = 0u32;
    for (i, &byte) in bytes.iter().enumerate() {
        value |= ((byte & 0x7f) as u64) << shift;
        if byte & 0x80 == 0 {
            return Ok((value, i + 1));
        }
        shift += 7;
        if shift >= 64 {
            return Err(WireError::MalformedLength);
        }
    }
    Err(WireError::MalformedLength)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ping_pong_round_trip() {
        assert_eq!(Frame::decode(&Frame::Ping.encode()).unwrap(), Frame::Ping);
        assert_eq!(Frame::decode(&Frame::Pong.encode()).unwrap(), Frame::Pong);
    }

    #[test]
    fn doc_update_round_trip() {
        let frame = Frame::DocUpdate(vec![1, 2, 3, 4, 5]);
        let encoded = frame.encode();
        assert_eq!(Frame::decode(&encoded).unwrap(), frame);
    }

    #[test]
    fn empty_payload_round_trips() {
        let frame = Frame::SyncStep1(vec![]);
        assert_eq!(Frame::decode(&frame.encode()).unwrap(), frame);
    }

    #[test]
    fn large_payload_exercises_multi_byte_varuint() {
        let payload = vec![7u8; 20_000];
        let frame = Frame::AwarenessSnapshot(payload.clone());
        let decoded = Frame::decode(&frame.encode()).unwrap();
        assert_eq!(decoded, Frame::AwarenessSnapshot(payload));
    }

    #[test]
    fn unknown_tag_is_rejected() {
        assert!(matches!(
            Frame::decode(&[0xEE]),
            Err(WireError::UnknownTag(0xEE))
        ));
    }

    #[test]
    fn truncated_frame_is_rejected() {
        // Tag + varuint length of 10 but no payload bytes follow.
        assert!(matches!(
            Frame::decode(&[TAG_DOC_UPDATE, 10]),
            Err(WireError::Truncated)
        ));
    }

    #[test]
    fn oversized_frame_is_rejected() {
        let payload = vec![0u8; MAX_FRAME_BYTES + 1];
        let frame = Frame::DocUpdate(payload);
        assert!(matches!(
            Frame::decode(&frame.encode()),
            Err(WireError::TooLarge)
        ));
    }
}
