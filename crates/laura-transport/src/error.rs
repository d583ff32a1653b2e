use uuid::Uuid;

use crate::traits::DeviceAddress;

/// Errors that can occur in transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The scan could not be started or was aborted.
    #[error("scan failed: {0}")]
    Scan(String),

    /// Failed to connect to (or pair with) the specified device.
    #[error("failed to connect to {address}: {reason}")]
    Connect {
        address: DeviceAddress,
        reason: String,
    },

    /// An operation that requires a connection was attempted without one.
    #[error("not connected")]
    NotConnected,

    /// The connected device does not expose the requested service.
    #[error("service {0} not found")]
    ServiceNotFound(Uuid),

    /// The requested characteristic does not exist on the connected device.
    #[error("characteristic {0} not found")]
    CharacteristicNotFound(Uuid),

    /// Enabling notifications on a characteristic failed.
    #[error("failed to subscribe to {characteristic}: {reason}")]
    Subscribe {
        characteristic: Uuid,
        reason: String,
    },

    /// A characteristic write was rejected or not acknowledged.
    #[error("write to {characteristic} failed: {reason}")]
    Write {
        characteristic: Uuid,
        reason: String,
    },

    /// The transport has been shut down.
    #[error("transport shut down")]
    Shutdown,
}

pub type Result<T> = std::result::Result<T, TransportError>;
