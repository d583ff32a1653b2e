//! Logical notification channels.
//!
//! Each channel is a (request, response) characteristic pair on the camera
//! control service. Responses are reassembled independently per channel.

use std::fmt;
use std::str::FromStr;

use uuid::Uuid;

/// Camera control service (16-bit 0xFEA6 on the Bluetooth base UUID).
pub const CAMERA_SERVICE: Uuid = Uuid::from_u128(0x0000_fea6_0000_1000_8000_0080_5f9b_34fb);

const CAMERA_BASE: u128 = 0xb5f9_0000_aa8d_11e3_9046_0002_a5d5_c51b;

const fn camera_characteristic(short: u16) -> Uuid {
    Uuid::from_u128(CAMERA_BASE | ((short as u128) << 96))
}

pub const COMMAND_REQUEST: Uuid = camera_characteristic(0x0072);
pub const COMMAND_RESPONSE: Uuid = camera_characteristic(0x0073);
pub const SETTINGS_REQUEST: Uuid = camera_characteristic(0x0074);
pub const SETTINGS_RESPONSE: Uuid = camera_characteristic(0x0075);
pub const QUERY_REQUEST: Uuid = camera_characteristic(0x0076);
pub const QUERY_RESPONSE: Uuid = camera_characteristic(0x0077);

/// A logical notification source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Channel {
    /// Command requests and their acknowledgments.
    Command,
    /// Setting requests and their acknowledgments.
    Settings,
    /// Status queries, registrations and status snapshots.
    Query,
}

impl Channel {
    /// Every channel, in subscription order.
    pub const ALL: [Channel; 3] = [Channel::Command, Channel::Settings, Channel::Query];

    /// Characteristic the controller writes requests to.
    pub const fn request_characteristic(self) -> Uuid {
        match self {
            Channel::Command => COMMAND_REQUEST,
            Channel::Settings => SETTINGS_REQUEST,
            Channel::Query => QUERY_REQUEST,
        }
    }

    /// Characteristic the camera notifies responses on.
    pub const fn response_characteristic(self) -> Uuid {
        match self {
            Channel::Command => COMMAND_RESPONSE,
            Channel::Settings => SETTINGS_RESPONSE,
            Channel::Query => QUERY_RESPONSE,
        }
    }

    /// Channel owning a response characteristic.
    pub fn from_response_characteristic(uuid: Uuid) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|channel| channel.response_characteristic() == uuid)
    }

    /// Channel owning a request characteristic.
    pub fn from_request_characteristic(uuid: Uuid) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|channel| channel.request_characteristic() == uuid)
    }

    /// Lowercase channel name.
    pub const fn name(self) -> &'static str {
        match self {
            Channel::Command => "command",
            Channel::Settings => "settings",
            Channel::Query => "query",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Channel {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "command" => Ok(Channel::Command),
            "settings" | "setting" => Ok(Channel::Settings),
            "query" | "status" => Ok(Channel::Query),
            other => Err(format!("unknown channel '{other}'")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn characteristic_ids_match_camera_layout() {
        assert_eq!(
            COMMAND_REQUEST.to_string(),
            "b5f90072-aa8d-11e3-9046-0002a5d5c51b"
        );
        assert_eq!(
            QUERY_RESPONSE.to_string(),
            "b5f90077-aa8d-11e3-9046-0002a5d5c51b"
        );
        assert_eq!(
            CAMERA_SERVICE.to_string(),
            "0000fea6-0000-1000-8000-00805f9b34fb"
        );
    }

    #[test]
    fn response_lookup_roundtrips() {
        for channel in Channel::ALL {
            assert_eq!(
                Channel::from_response_characteristic(channel.response_characteristic()),
                Some(channel)
            );
            assert_eq!(
                Channel::from_request_characteristic(channel.request_characteristic()),
                Some(channel)
            );
        }
        assert_eq!(Channel::from_response_characteristic(COMMAND_REQUEST), None);
    }

    #[test]
    fn parses_names() {
        assert_eq!("settings".parse::<Channel>(), Ok(Channel::Settings));
        assert_eq!("status".parse::<Channel>(), Ok(Channel::Query));
        assert!("video".parse::<Channel>().is_err());
    }
}
