//! L.A.U.R.A.: wireless camera remote control.
//!
//! A controller keeps a short-range link to one action camera and talks to
//! handheld remotes over a long-range radio. Remotes send one-byte
//! commands; controllers answer with periodic heartbeats describing the
//! camera.
//!
//! # Crate Structure
//!
//! - [`transport`]: collaborator traits for the two radios, plus in-memory implementations
//! - [`frame`]: fragment reassembly and the long-range frame codec
//! - [`link`]: camera link state machine, decoding, heartbeats, liveness (behind `link` feature)

/// Re-export transport types.
pub mod transport {
    pub use laura_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use laura_frame::*;
}

/// Re-export link types (requires `link` feature).
#[cfg(feature = "link")]
pub mod link {
    pub use laura_link::*;
}
