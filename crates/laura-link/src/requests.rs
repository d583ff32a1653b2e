//! Outbound camera requests.
//!
//! Every request is a small TLV: a length byte counting the rest, the
//! command or setting id, then parameters.

use bytes::{BufMut, Bytes, BytesMut};
use laura_frame::Channel;

use crate::error::{LinkError, Result};

const CMD_SHUTTER: u8 = 0x01;
const CMD_SLEEP: u8 = 0x05;
const CMD_AP_CONTROL: u8 = 0x17;
const CMD_PRESET_GROUP: u8 = 0x3E;

const SETTING_RESOLUTION: u8 = 0x02;
const SETTING_FRAMERATE: u8 = 0x03;
const SETTING_AUTO_POWER_DOWN: u8 = 0x3B;
const SETTING_VIDEO_LENS: u8 = 0x79;

const QUERY_STATUS: u8 = 0x13;
const QUERY_REGISTER_STATUS: u8 = 0x53;

/// Statuses polled and registered for by default: recording, low temperature, overheating.
pub const DEFAULT_STATUS_INTEREST: [u8; 3] = [0x0A, 0x55, 0x06];

/// One request ready to be written to its channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub channel: Channel,
    pub label: &'static str,
    pub payload: Bytes,
}

impl Request {
    fn tlv(channel: Channel, label: &'static str, id: u8, params: &[u8]) -> Self {
        let mut payload = BytesMut::with_capacity(2 + params.len());
        payload.put_u8((1 + params.len()) as u8);
        payload.put_u8(id);
        payload.put_slice(params);
        Self {
            channel,
            label,
            payload: payload.freeze(),
        }
    }

    fn command(label: &'static str, id: u8, params: &[u8]) -> Self {
        Self::tlv(Channel::Command, label, id, params)
    }

    fn setting(label: &'static str, id: u8, value: u8) -> Self {
        Self::tlv(Channel::Settings, label, id, &[0x01, value])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresetGroup {
    Video,
    Photo,
    Timelapse,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Res1080,
    Res2_7K,
    Res4K,
    Res5_3K,
}

impl Resolution {
    /// Setting value on the wire.
    pub const fn value(self) -> u8 {
        match self {
            Resolution::Res1080 => 0x09,
            Resolution::Res2_7K => 0x04,
            Resolution::Res4K => 0x01,
            Resolution::Res5_3K => 0x64,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framerate {
    Fps30,
    Fps60,
    Fps120,
    Fps240,
}

impl Framerate {
    pub const fn value(self) -> u8 {
        match self {
            Framerate::Fps30 => 0x08,
            Framerate::Fps60 => 0x05,
            Framerate::Fps120 => 0x01,
            Framerate::Fps240 => 0x00,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoLens {
    Wide,
    Narrow,
    Superview,
    Linear,
    MaxSuperview,
    LinearLevel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoPowerDown {
    Never,
    Minutes5,
    Minutes15,
    Minutes30,
}

pub fn shutter(start: bool) -> Request {
    let label = if start { "shutter_start" } else { "shutter_stop" };
    Request::command(label, CMD_SHUTTER, &[0x01, u8::from(start)])
}

pub fn sleep() -> Request {
    Request::command("sleep", CMD_SLEEP, &[])
}

pub fn wifi_ap(enabled: bool) -> Request {
    let label = if enabled { "wifi_ap_on" } else { "wifi_ap_off" };
    Request::command(label, CMD_AP_CONTROL, &[0x01, u8::from(enabled)])
}

pub fn preset_group(group: PresetGroup) -> Request {
    let (label, id) = match group {
        PresetGroup::Video => ("preset_group_video", 0xE8),
        PresetGroup::Photo => ("preset_group_photo", 0xE9),
        PresetGroup::Timelapse => ("preset_group_timelapse", 0xEA),
    };
    Request::command(label, CMD_PRESET_GROUP, &[0x02, 0x03, id])
}

pub fn resolution(value: Resolution) -> Request {
    Request::setting("resolution", SETTING_RESOLUTION, value.value())
}

pub fn framerate(value: Framerate) -> Request {
    Request::setting("framerate", SETTING_FRAMERATE, value.value())
}

pub fn video_lens(value: VideoLens) -> Request {
    let value = match value {
        VideoLens::Wide => 0x00,
        VideoLens::Narrow => 0x02,
        VideoLens::Superview => 0x03,
        VideoLens::Linear => 0x04,
        VideoLens::MaxSuperview => 0x07,
        VideoLens::LinearLevel => 0x08,
    };
    Request::setting("video_lens", SETTING_VIDEO_LENS, value)
}

pub fn auto_power_down(value: AutoPowerDown) -> Request {
    let value = match value {
        AutoPowerDown::Never => 0x00,
        AutoPowerDown::Minutes5 => 0x04,
        AutoPowerDown::Minutes15 => 0x06,
        AutoPowerDown::Minutes30 => 0x07,
    };
    Request::setting("auto_power_down", SETTING_AUTO_POWER_DOWN, value)
}

/// One-off read of the given statuses.
pub fn status_query(codes: &[u8]) -> Result<Request> {
    status_request("status_query", QUERY_STATUS, codes)
}

/// Ask the camera to push updates for the given statuses.
pub fn register_status_updates(codes: &[u8]) -> Result<Request> {
    status_request("register_status_updates", QUERY_REGISTER_STATUS, codes)
}

fn status_request(label: &'static str, id: u8, codes: &[u8]) -> Result<Request> {
    if codes.is_empty() {
        return Err(LinkError::InvalidRequest(format!("{label}: no status codes")));
    }
    if codes.len() >= usize::from(u8::MAX) {
        return Err(LinkError::InvalidRequest(format!(
            "{label}: {} status codes do not fit one request",
            codes.len()
        )));
    }
    Ok(Request::tlv(Channel::Query, label, id, codes))
}

/// Requests applied once after connecting: wifi off, never auto power
/// down, video preset group, 4K, 60 fps, wide lens.
pub fn initial_setup() -> Vec<Request> {
    vec![
        wifi_ap(false),
        auto_power_down(AutoPowerDown::Never),
        preset_group(PresetGroup::Video),
        resolution(Resolution::Res4K),
        framerate(Framerate::Fps60),
        video_lens(VideoLens::Wide),
    ]
}
