use std::fmt;

use laura_frame::{FragmentError, FrameError};
use laura_link::LinkError;
use laura_transport::TransportError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
/// Link recovery gave up; whoever started us should start us again.
pub const RESTART_REQUESTED: i32 = 75;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    match err {
        TransportError::Shutdown => CliError::new(FAILURE, format!("{context}: {err}")),
        other => CliError::new(TRANSPORT_ERROR, format!("{context}: {other}")),
    }
}

pub fn frame_error(context: &str, err: FrameError) -> CliError {
    CliError::new(DATA_INVALID, format!("{context}: {err}"))
}

pub fn fragment_error(context: &str, err: FragmentError) -> CliError {
    CliError::new(DATA_INVALID, format!("{context}: {err}"))
}

pub fn hex_error(context: &str, err: hex::FromHexError) -> CliError {
    CliError::new(DATA_INVALID, format!("{context}: invalid hex: {err}"))
}

pub fn link_error(context: &str, err: LinkError) -> CliError {
    match err {
        LinkError::Transport(err) => transport_error(context, err),
        LinkError::Frame(err) => frame_error(context, err),
        LinkError::Fragment(err) => fragment_error(context, err),
        LinkError::RecoveryExhausted { .. } => {
            CliError::new(RESTART_REQUESTED, format!("{context}: {err}"))
        }
        LinkError::InvalidHeartbeat(_)
        | LinkError::UnknownCommand(_)
        | LinkError::InvalidPayload(_)
        | LinkError::InvalidRequest(_) => CliError::new(DATA_INVALID, format!("{context}: {err}")),
        LinkError::DeviceNotFound { .. }
        | LinkError::MissingCharacteristic(_)
        | LinkError::NotReady(_)
        | LinkError::Timeout(_) => CliError::new(TRANSPORT_ERROR, format!("{context}: {err}")),
    }
}
