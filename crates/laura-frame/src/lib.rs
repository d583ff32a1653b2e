//! Wire formats of the L.A.U.R.A. camera link.
//!
//! Short-range side: camera notifications arrive as fragments. A start
//! fragment carries a 1-, 2- or 3-byte length header; continuation
//! fragments carry a 7-bit sequence number. [`ReassemblyBuffer`] rebuilds
//! one message per channel, [`Reassembler`] keys buffers by [`Channel`].
//!
//! Long-range side: every radio packet is framed with
//! - a 2-byte big-endian sender id
//! - a 2-byte big-endian receiver id
//! - a 1-byte payload length
//!
//! followed by the payload.

pub mod channel;
pub mod codec;
pub mod error;
pub mod fragment;
pub mod reassembly;

pub use channel::{Channel, CAMERA_SERVICE};
pub use codec::{
    accept_frame, decode_frame, encode_frame, LongRangeFrame, HEADER_SIZE, MAX_PAYLOAD,
};
pub use error::{FragmentError, FrameError, HeaderKind, Result};
pub use fragment::{fragment_message, parse_header, FragmentHeader};
pub use reassembly::{ReassemblyBuffer, ReassemblyConfig, Reassembler};
