use bytes::{BufMut, Bytes, BytesMut};
use serde::Serialize;

use crate::error::{LinkError, Result};

/// First payload byte of a heartbeat.
pub const HEARTBEAT_MARKER: u8 = 0x10;

/// Heartbeat body size after the marker.
pub const HEARTBEAT_BODY_LEN: usize = 11;

/// Status a controller broadcasts to its remotes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Heartbeat {
    pub camera_connected: bool,
    pub battery_level: u8,
    /// False while the camera sleeps.
    pub powered: bool,
    pub overheating: bool,
    pub low_temperature: bool,
    pub flatmode: u8,
    pub preset_group: u8,
    pub video_preset: u8,
    pub framerate: u8,
    pub resolution: u8,
    pub recording: bool,
}

impl Heartbeat {
    /// Marker plus the 11 body bytes.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(1 + HEARTBEAT_BODY_LEN);
        buf.put_u8(HEARTBEAT_MARKER);
        buf.put_u8(u8::from(self.camera_connected));
        buf.put_u8(self.battery_level);
        buf.put_u8(u8::from(self.powered));
        buf.put_u8(u8::from(self.overheating));
        buf.put_u8(u8::from(self.low_temperature));
        buf.put_u8(self.flatmode);
        buf.put_u8(self.preset_group);
        buf.put_u8(self.video_preset);
        buf.put_u8(self.framerate);
        buf.put_u8(self.resolution);
        buf.put_u8(u8::from(self.recording));
        buf.freeze()
    }

    pub fn decode(payload: &[u8]) -> Result<Self> {
        let Some((&marker, body)) = payload.split_first() else {
            return Err(LinkError::InvalidHeartbeat("empty payload".to_string()));
        };
        if marker != HEARTBEAT_MARKER {
            return Err(LinkError::InvalidHeartbeat(format!(
                "marker 0x{marker:02x}, expected 0x{HEARTBEAT_MARKER:02x}"
            )));
        }
        let Ok(body) = <&[u8; HEARTBEAT_BODY_LEN]>::try_from(body) else {
            return Err(LinkError::InvalidHeartbeat(format!(
                "{} body bytes, expected {HEARTBEAT_BODY_LEN}",
                body.len()
            )));
        };

        Ok(Self {
            camera_connected: body[0] != 0,
            battery_level: body[1],
            powered: body[2] != 0,
            overheating: body[3] != 0,
            low_temperature: body[4] != 0,
            flatmode: body[5],
            preset_group: body[6],
            video_preset: body[7],
            framerate: body[8],
            resolution: body[9],
            recording: body[10] != 0,
        })
    }

    /// Short activity label as shown on a remote display.
    pub fn activity(&self) -> &'static str {
        if !self.powered {
            "SLEEP"
        } else if self.recording {
            "REC"
        } else {
            "STBY"
        }
    }

    /// Temperature warning, if any.
    pub fn health(&self) -> &'static str {
        if self.overheating {
            "HOT"
        } else if self.low_temperature {
            "COLD"
        } else {
            "OK"
        }
    }
}
