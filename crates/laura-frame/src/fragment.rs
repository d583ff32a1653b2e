use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{FragmentError, HeaderKind};

/// High bit of the first byte marks a continuation fragment.
pub const CONTINUATION_FLAG: u8 = 0x80;

/// Low 7 bits of a continuation carry its sequence number.
pub const SEQUENCE_MASK: u8 = 0x7F;

/// Number of distinct continuation sequence numbers.
pub const MAX_CONTINUATIONS: usize = 128;

/// Largest length each start header can encode.
const INLINE5_MAX: usize = 0x1F;
const EXTENDED13_MAX: usize = 0x1FFF;
const EXTENDED16_MAX: usize = 0xFFFF;

/// Decoded first byte(s) of a fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FragmentHeader {
    /// First fragment of a new message.
    Start {
        kind: HeaderKind,
        expected_len: usize,
        payload_offset: usize,
    },
    /// Next fragment of the message in progress.
    Continuation { sequence: u8 },
}

/// Parse the header of one fragment.
///
/// ```text
/// 0b0_00_LLLLL                      5-bit length, payload at 1
/// 0b0_01_LLLLL LLLLLLLL             13-bit length, payload at 2
/// 0b0_10_xxxxx LLLLLLLL LLLLLLLL    16-bit length, payload at 3
/// 0b1_SSSSSSS                       continuation, 7-bit sequence
/// ```
pub fn parse_header(fragment: &[u8]) -> Result<FragmentHeader, FragmentError> {
    let Some(&first) = fragment.first() else {
        return Err(FragmentError::Empty);
    };

    if first & CONTINUATION_FLAG != 0 {
        return Ok(FragmentHeader::Continuation {
            sequence: first & SEQUENCE_MASK,
        });
    }

    let (kind, expected_len) = match (first >> 5) & 0x03 {
        0b00 => (HeaderKind::Inline5, usize::from(first & 0x1F)),
        0b01 => {
            let kind = HeaderKind::Extended13;
            if fragment.len() < kind.size() {
                return Err(FragmentError::Truncated {
                    kind,
                    len: fragment.len(),
                });
            }
            (
                kind,
                (usize::from(first & 0x1F) << 8) + usize::from(fragment[1]),
            )
        }
        0b10 => {
            let kind = HeaderKind::Extended16;
            if fragment.len() < kind.size() {
                return Err(FragmentError::Truncated {
                    kind,
                    len: fragment.len(),
                });
            }
            (
                kind,
                (usize::from(fragment[1]) << 8) + usize::from(fragment[2]),
            )
        }
        _ => return Err(FragmentError::UnknownHeader(first)),
    };

    Ok(FragmentHeader::Start {
        kind,
        expected_len,
        payload_offset: kind.size(),
    })
}

/// Split a message into fragments no larger than `mtu`.
///
/// Uses the smallest start header that can encode the length and numbers
/// continuations from 0.
pub fn fragment_message(message: &[u8], mtu: usize) -> Result<Vec<Bytes>, FragmentError> {
    let header = start_header(message.len())?;
    if mtu <= header.len() {
        return Err(FragmentError::MtuTooSmall(mtu));
    }

    let first_len = message.len().min(mtu - header.len());
    let capacity = MAX_CONTINUATIONS
        .saturating_mul(mtu - 1)
        .saturating_add(first_len);
    if message.len() > capacity {
        return Err(FragmentError::TooLarge {
            len: message.len(),
            max: capacity,
        });
    }

    let mut fragments = Vec::with_capacity(1 + (message.len() - first_len).div_ceil(mtu - 1));
    let mut first = BytesMut::with_capacity(header.len() + first_len);
    first.put_slice(&header);
    first.put_slice(&message[..first_len]);
    fragments.push(first.freeze());

    for (sequence, chunk) in message[first_len..].chunks(mtu - 1).enumerate() {
        let mut fragment = BytesMut::with_capacity(1 + chunk.len());
        fragment.put_u8(CONTINUATION_FLAG | (sequence as u8 & SEQUENCE_MASK));
        fragment.put_slice(chunk);
        fragments.push(fragment.freeze());
    }

    Ok(fragments)
}

fn start_header(len: usize) -> Result<Vec<u8>, FragmentError> {
    if len <= INLINE5_MAX {
        Ok(vec![len as u8])
    } else if len <= EXTENDED13_MAX {
        Ok(vec![0x20 | (len >> 8) as u8, (len & 0xFF) as u8])
    } else if len <= EXTENDED16_MAX {
        Ok(vec![0x40, (len >> 8) as u8, (len & 0xFF) as u8])
    } else {
        Err(FragmentError::TooLarge {
            len,
            max: EXTENDED16_MAX,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inline_header_length_and_offset() {
        for first in 0x00u8..=0x1F {
            let header = parse_header(&[first, 0xAA]).unwrap();
            assert_eq!(
                header,
                FragmentHeader::Start {
                    kind: HeaderKind::Inline5,
                    expected_len: usize::from(first & 0x1F),
                    payload_offset: 1,
                }
            );
        }
    }

    #[test]
    fn extended13_header_length_and_offset() {
        let header = parse_header(&[0x21, 0x04, 0xAA]).unwrap();
        assert_eq!(
            header,
            FragmentHeader::Start {
                kind: HeaderKind::Extended13,
                expected_len: (0x01 << 8) + 0x04,
                payload_offset: 2,
            }
        );

        let header = parse_header(&[0x3F, 0xFF]).unwrap();
        assert!(matches!(
            header,
            FragmentHeader::Start {
                expected_len: 0x1FFF,
                ..
            }
        ));
    }

    #[test]
    fn extended16_header_length_and_offset() {
        let header = parse_header(&[0x40, 0x12, 0x34]).unwrap();
        assert_eq!(
            header,
            FragmentHeader::Start {
                kind: HeaderKind::Extended16,
                expected_len: 0x1234,
                payload_offset: 3,
            }
        );
    }

    #[test]
    fn continuation_header_carries_sequence() {
        assert_eq!(
            parse_header(&[0x80, 0x01]).unwrap(),
            FragmentHeader::Continuation { sequence: 0 }
        );
        assert_eq!(
            parse_header(&[0xFF]).unwrap(),
            FragmentHeader::Continuation { sequence: 0x7F }
        );
    }

    #[test]
    fn reserved_header_type_is_rejected() {
        assert_eq!(
            parse_header(&[0x60, 0x00]),
            Err(FragmentError::UnknownHeader(0x60))
        );
    }

    #[test]
    fn truncated_extended_headers_are_rejected() {
        assert_eq!(
            parse_header(&[0x21]),
            Err(FragmentError::Truncated {
                kind: HeaderKind::Extended13,
                len: 1
            })
        );
        assert_eq!(
            parse_header(&[0x40, 0x01]),
            Err(FragmentError::Truncated {
                kind: HeaderKind::Extended16,
                len: 2
            })
        );
        assert_eq!(parse_header(&[]), Err(FragmentError::Empty));
    }

    #[test]
    fn short_message_fits_one_fragment() {
        let fragments = fragment_message(b"HELLO", 20).unwrap();
        assert_eq!(fragments.len(), 1);
        assert_eq!(fragments[0].as_ref(), b"\x05HELLO");
    }

    #[test]
    fn long_message_uses_extended_header_and_continuations() {
        let message: Vec<u8> = (0..50u8).collect();
        let fragments = fragment_message(&message, 20).unwrap();

        assert_eq!(&fragments[0][..2], &[0x20, 50]);
        assert_eq!(fragments[0].len(), 20);
        assert_eq!(fragments[1][0], 0x80);
        assert_eq!(fragments[2][0], 0x81);

        let rebuilt: Vec<u8> = fragments[0][2..]
            .iter()
            .chain(fragments[1..].iter().flat_map(|f| f[1..].iter()))
            .copied()
            .collect();
        assert_eq!(rebuilt, message);
    }

    #[test]
    fn oversized_messages_are_rejected() {
        assert!(matches!(
            fragment_message(&vec![0u8; 70_000], 512),
            Err(FragmentError::TooLarge { max: 0xFFFF, .. })
        ));
        assert!(matches!(
            fragment_message(&vec![0u8; 1_000], 4),
            Err(FragmentError::TooLarge { .. })
        ));
        assert_eq!(
            fragment_message(b"abc", 1),
            Err(FragmentError::MtuTooSmall(1))
        );
    }

    #[test]
    fn huge_mtu_yields_a_single_fragment() {
        let message = vec![0x5Au8; 300];
        let fragments = fragment_message(&message, usize::MAX).expect("message should fit");

        assert_eq!(fragments.len(), 1);
        assert_eq!(&fragments[0][..2], &[0x21, 0x2C]);
        assert_eq!(&fragments[0][2..], &message[..]);
    }
}
