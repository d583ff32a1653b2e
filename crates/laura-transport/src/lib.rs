//! Transport abstractions for the L.A.U.R.A. camera link.
//!
//! Two collaborators sit underneath the protocol core:
//! - a short-range central (scan, connect, discover, subscribe, write)
//!   talking to the camera,
//! - a long-range radio (addressed broadcast with signal-quality metadata)
//!   talking to the remotes.
//!
//! This is the lowest layer. Everything else builds on the
//! [`ShortRangeCentral`] and [`LongRangeRadio`] traits provided here.
//! The [`memory`] module has in-process implementations of both.

pub mod error;
pub mod memory;
pub mod traits;

pub use error::{Result, TransportError};
pub use memory::{CentralStats, FaultPlan, MemoryCentral, MemoryMedium, MemoryRadio};
pub use traits::{
    Advertisement, DeviceAddress, LongRangeRadio, Notifications, RadioPacket, ShortRangeCentral,
    SignalQuality,
};
