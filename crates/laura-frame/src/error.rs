use std::fmt;

/// Length encoding selected by a start fragment's header byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderKind {
    /// 5-bit length inline in the header byte.
    Inline5,
    /// 13-bit length across the header byte and one extra byte.
    Extended13,
    /// 16-bit length in two bytes after the header byte.
    Extended16,
}

impl HeaderKind {
    /// Header size in bytes.
    pub const fn size(self) -> usize {
        match self {
            HeaderKind::Inline5 => 1,
            HeaderKind::Extended13 => 2,
            HeaderKind::Extended16 => 3,
        }
    }
}

impl fmt::Display for HeaderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeaderKind::Inline5 => f.write_str("5-bit"),
            HeaderKind::Extended13 => f.write_str("13-bit"),
            HeaderKind::Extended16 => f.write_str("16-bit"),
        }
    }
}

/// Errors on the short-range fragment layer.
///
/// All of them except [`FragmentError::Empty`] leave the reassembly buffer
/// idle; none is fatal to the link.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FragmentError {
    /// A zero-length fragment. Ignored.
    #[error("empty fragment")]
    Empty,

    /// The start fragment selects the reserved `0b11` header type.
    #[error("unknown header type in first byte 0x{0:02x}")]
    UnknownHeader(u8),

    /// The fragment ends before its declared header does.
    #[error("fragment too short for {kind} length header ({len} bytes)")]
    Truncated { kind: HeaderKind, len: usize },

    /// A continuation arrived with no message in progress.
    #[error("continuation seq={sequence} without an active message")]
    UnexpectedContinuation { sequence: u8 },

    /// A continuation arrived out of order.
    #[error("sequence mismatch: expected seq={expected}, got seq={got}")]
    SequenceMismatch { expected: usize, got: u8 },

    /// The message is longer than the configured or encodable maximum.
    #[error("message too large ({len} bytes, max {max})")]
    TooLarge { len: usize, max: usize },

    /// The MTU cannot hold a header plus at least one payload byte.
    #[error("mtu {0} too small for fragmentation")]
    MtuTooSmall(usize),
}

/// Errors on the long-range frame codec.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    /// The packet cannot hold the 5-byte header.
    #[error("frame too short ({len} bytes, header needs 5)")]
    TooShort { len: usize },

    /// The declared payload does not fit in the received bytes.
    #[error("incomplete payload (declared {declared} bytes, {available} available)")]
    IncompletePayload { declared: usize, available: usize },

    /// The payload cannot be described by the 1-byte length field.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },
}

pub type Result<T> = std::result::Result<T, FrameError>;
