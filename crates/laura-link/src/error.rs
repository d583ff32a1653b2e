use std::time::Duration;

use laura_transport::TransportError;

use crate::link::LinkState;

/// Errors that can occur on the camera and radio links.
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Long-range frame error.
    #[error("frame error: {0}")]
    Frame(#[from] laura_frame::FrameError),

    /// Short-range fragment error.
    #[error("fragment error: {0}")]
    Fragment(#[from] laura_frame::FragmentError),

    /// No advertisement matched the device name and service.
    #[error("no device named '*{name}*' advertising {service}")]
    DeviceNotFound { name: String, service: uuid::Uuid },

    /// The camera service lacks a required characteristic.
    #[error("characteristic {0} missing from camera service")]
    MissingCharacteristic(uuid::Uuid),

    /// The link is not ready and the one-shot reconnect did not help.
    #[error("link not ready (state: {0})")]
    NotReady(LinkState),

    /// Every recovery attempt failed. The process must be restarted.
    #[error("link recovery exhausted after {attempts} attempts")]
    RecoveryExhausted { attempts: u32 },

    /// A heartbeat payload has the wrong marker or length.
    #[error("invalid heartbeat: {0}")]
    InvalidHeartbeat(String),

    /// A remote command byte outside the known set.
    #[error("unknown remote command 0x{0:02x}")]
    UnknownCommand(u8),

    /// A received radio payload is neither a heartbeat nor a command.
    #[error("invalid radio payload: {0}")]
    InvalidPayload(String),

    /// An outbound request could not be built.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// An operation did not finish in time.
    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

impl LinkError {
    /// Whether this error must escalate to a process restart.
    pub fn is_fatal(&self) -> bool {
        matches!(self, LinkError::RecoveryExhausted { .. })
    }
}

pub type Result<T> = std::result::Result<T, LinkError>;
