//! Camera and radio links for L.A.U.R.A.
//!
//! The short-range side keeps one camera connected ([`ShortRangeLink`]),
//! reassembles its notifications on per-channel listener tasks, decodes
//! them ([`decode_message`]) and fans the results out to observers
//! ([`EventDispatcher`]).
//!
//! The long-range side ([`LongRangeLink`]) exchanges addressed frames with
//! other nodes: heartbeats from controllers, one-byte commands from
//! remotes. A [`PeerTable`] tracks which peers are still heard from.
//!
//! [`Controller`] runs both sides for one camera.

pub mod controller;
pub mod decoder;
pub mod dispatch;
pub mod error;
pub mod heartbeat;
pub mod link;
pub mod listener;
pub mod liveness;
pub mod radio;
pub mod registry;
pub mod requests;

pub use controller::{
    heartbeat_from, shutter_for, CameraState, CameraStateObserver, Controller, ControllerConfig,
};
pub use decoder::{decode_message, parse_statuses, DecodedEvent, StatusSnapshot, StatusValue};
pub use dispatch::{EventDispatcher, Observer, ObserverError};
pub use error::{LinkError, Result};
pub use heartbeat::{Heartbeat, HEARTBEAT_MARKER};
pub use link::{LinkConfig, LinkState, ShortRangeLink};
pub use listener::{spawn_listener, ListenerReport};
pub use liveness::{PeerRecord, PeerTable};
pub use radio::{
    HeartbeatConfig, LongRangeLink, Outgoing, RadioConfig, RadioHandler, RadioMessage, RadioStats,
    RemoteCommand,
};
pub use requests::{Request, DEFAULT_STATUS_INTEREST};
