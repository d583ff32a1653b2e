use bytes::{BufMut, Bytes, BytesMut};
use tracing::debug;

use crate::error::{FrameError, Result};

/// Frame header: sender (2) + receiver (2) + length (1) = 5 bytes.
pub const HEADER_SIZE: usize = 5;

/// Largest payload the 1-byte length field can describe.
pub const MAX_PAYLOAD: usize = u8::MAX as usize;

/// An addressed long-range packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LongRangeFrame {
    /// Node that transmitted the frame.
    pub sender: u16,
    /// Node the frame is addressed to.
    pub receiver: u16,
    /// Frame payload.
    pub payload: Bytes,
}

impl LongRangeFrame {
    pub fn new(sender: u16, receiver: u16, payload: impl Into<Bytes>) -> Self {
        Self {
            sender,
            receiver,
            payload: payload.into(),
        }
    }

    /// Total wire size (header + payload).
    pub fn wire_size(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }

    /// Encode into a fresh buffer.
    pub fn to_bytes(&self) -> Result<Bytes> {
        let mut dst = BytesMut::with_capacity(self.wire_size());
        encode_frame(self.sender, self.receiver, &self.payload, &mut dst)?;
        Ok(dst.freeze())
    }
}

/// Encode a frame into the wire format.
///
/// ```text
/// ┌─────────────┬──────────────┬──────────┬──────────────────┐
/// │ Sender (2B) │ Receiver (2B)│ Len (1B) │ Payload          │
/// │ big-endian  │ big-endian   │          │ (Len bytes)      │
/// └─────────────┴──────────────┴──────────┴──────────────────┘
/// ```
pub fn encode_frame(sender: u16, receiver: u16, payload: &[u8], dst: &mut BytesMut) -> Result<()> {
    if payload.len() > MAX_PAYLOAD {
        return Err(FrameError::PayloadTooLarge {
            size: payload.len(),
            max: MAX_PAYLOAD,
        });
    }
    dst.reserve(HEADER_SIZE + payload.len());
    dst.put_u16(sender);
    dst.put_u16(receiver);
    dst.put_u8(payload.len() as u8);
    dst.put_slice(payload);
    Ok(())
}

/// Decode one received packet.
///
/// Bytes past the declared payload are ignored.
pub fn decode_frame(src: &[u8]) -> Result<LongRangeFrame> {
    if src.len() < HEADER_SIZE {
        return Err(FrameError::TooShort { len: src.len() });
    }

    let sender = u16::from_be_bytes([src[0], src[1]]);
    let receiver = u16::from_be_bytes([src[2], src[3]]);
    let declared = usize::from(src[4]);
    let available = src.len() - HEADER_SIZE;

    if declared > available {
        return Err(FrameError::IncompletePayload {
            declared,
            available,
        });
    }

    Ok(LongRangeFrame {
        sender,
        receiver,
        payload: Bytes::copy_from_slice(&src[HEADER_SIZE..HEADER_SIZE + declared]),
    })
}

/// Decode a packet and keep it only if it is addressed to `local_id`.
///
/// Structural problems are errors. Frames for other receivers are normal on
/// a shared medium and yield `Ok(None)`.
pub fn accept_frame(src: &[u8], local_id: u16) -> Result<Option<LongRangeFrame>> {
    let frame = decode_frame(src)?;
    if frame.receiver != local_id {
        debug!(
            sender = frame.sender,
            receiver = frame.receiver,
            local_id,
            "frame not addressed to this node"
        );
        return Ok(None);
    }
    Ok(Some(frame))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_header_layout() {
        let mut buf = BytesMut::new();
        encode_frame(0x0102, 0xA0B0, &[0x10, 0x20], &mut buf).unwrap();
        assert_eq!(buf.as_ref(), &[0x01, 0x02, 0xA0, 0xB0, 0x02, 0x10, 0x20]);
    }

    #[test]
    fn decode_remote_command() {
        let frame = decode_frame(&[0x00, 0x00, 0x00, 0x01, 0x01, 0x03]).unwrap();
        assert_eq!(frame.sender, 0);
        assert_eq!(frame.receiver, 1);
        assert_eq!(frame.payload.as_ref(), &[0x03]);
    }

    #[test]
    fn roundtrip_through_bytes() {
        let frame = LongRangeFrame::new(7, 9, vec![1u8, 2, 3]);
        let wire = frame.to_bytes().unwrap();
        assert_eq!(wire.len(), frame.wire_size());
        assert_eq!(decode_frame(&wire).unwrap(), frame);
    }

    #[test]
    fn trailing_bytes_are_ignored() {
        let frame = decode_frame(&hex::decode("000500010103ffff").unwrap()).unwrap();
        assert_eq!(frame.payload.as_ref(), &[0x03]);
    }

    #[test]
    fn short_frame_is_rejected() {
        assert_eq!(
            decode_frame(&[0x00, 0x01, 0x00]),
            Err(FrameError::TooShort { len: 3 })
        );
    }

    #[test]
    fn declared_payload_must_fit() {
        assert_eq!(
            decode_frame(&[0x00, 0x00, 0x00, 0x01, 0x04, 0x03]),
            Err(FrameError::IncompletePayload {
                declared: 4,
                available: 1
            })
        );
    }

    #[test]
    fn oversized_payload_is_rejected() {
        let mut buf = BytesMut::new();
        let err = encode_frame(0, 1, &[0u8; 256], &mut buf).unwrap_err();
        assert_eq!(
            err,
            FrameError::PayloadTooLarge {
                size: 256,
                max: MAX_PAYLOAD
            }
        );
        assert!(buf.is_empty());
    }

    #[test]
    fn frames_for_other_nodes_are_dropped_silently() {
        let wire = [0x00, 0x00, 0x00, 0x02, 0x01, 0x03];
        assert_eq!(accept_frame(&wire, 1), Ok(None));
        assert!(accept_frame(&wire, 2).unwrap().is_some());
    }

    #[test]
    fn structure_is_checked_before_addressing() {
        let wire = [0x00, 0x00, 0x00, 0x02, 0x09];
        assert!(matches!(
            accept_frame(&wire, 1),
            Err(FrameError::IncompletePayload { .. })
        ));
    }
}
