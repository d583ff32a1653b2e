//! Static code tables for camera responses.

use std::borrow::Cow;

/// How a status value is encoded on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusKind {
    Bool,
    Int,
    Text,
}

/// Name and value kind of one status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusDefinition {
    pub code: u8,
    pub name: &'static str,
    pub kind: StatusKind,
}

const fn status(code: u8, name: &'static str, kind: StatusKind) -> StatusDefinition {
    StatusDefinition { code, name, kind }
}

pub const STATUS_RECORDING: u8 = 0x0A;
pub const STATUS_SYSTEM_HOT: u8 = 0x06;
pub const STATUS_LOW_TEMP: u8 = 0x55;

pub const RESULTS: &[(u8, &str)] = &[
    (0x00, "success"),
    (0x01, "error"),
    (0x02, "invalid_parameter"),
];

pub const COMMANDS: &[(u8, &str)] = &[
    (0x01, "set_shutter"),
    (0x05, "sleep"),
    (0x17, "set_ap_control"),
    (0x3E, "preset_group"),
    (0x5B, "keep_alive"),
];

pub const SETTINGS: &[(u8, &str)] = &[
    (0x02, "video_resolution"),
    (0x03, "frame_per_second"),
    (0x3B, "auto_power_down"),
    (0x40, "preset"),
    (0x53, "gps"),
    (0x79, "video_lens"),
];

pub const STATUSES: &[StatusDefinition] = &[
    status(0x01, "battery_present", StatusKind::Bool),
    status(0x02, "internal_battery_bars", StatusKind::Int),
    status(STATUS_SYSTEM_HOT, "system_hot", StatusKind::Bool),
    status(STATUS_RECORDING, "recording_status", StatusKind::Bool),
    status(0x11, "wireless_enabled", StatusKind::Bool),
    status(0x1E, "access_point_ssid", StatusKind::Text),
    status(0x21, "primary_storage", StatusKind::Int),
    status(0x22, "wifi_scan_state", StatusKind::Int),
    status(0x23, "remaining_video_time", StatusKind::Int),
    status(0x27, "videos", StatusKind::Int),
    status(0x46, "internal_battery_percentage", StatusKind::Int),
    status(STATUS_LOW_TEMP, "low_temp", StatusKind::Bool),
    status(0x59, "flatmode", StatusKind::Int),
    status(0x5D, "video_preset", StatusKind::Int),
    status(0x5E, "photo_preset", StatusKind::Int),
    status(0x5F, "timelapse_preset", StatusKind::Int),
    status(0x60, "preset_group", StatusKind::Int),
    status(0x61, "preset", StatusKind::Int),
];

fn lookup(table: &'static [(u8, &'static str)], code: u8) -> Cow<'static, str> {
    table
        .iter()
        .find(|(known, _)| *known == code)
        .map(|(_, name)| Cow::Borrowed(*name))
        .unwrap_or_else(|| Cow::Owned(format!("unknown({code})")))
}

pub fn result_name(code: u8) -> Cow<'static, str> {
    lookup(RESULTS, code)
}

pub fn command_name(code: u8) -> Cow<'static, str> {
    lookup(COMMANDS, code)
}

pub fn setting_name(code: u8) -> Cow<'static, str> {
    lookup(SETTINGS, code)
}

pub fn status_definition(code: u8) -> Option<&'static StatusDefinition> {
    STATUSES.iter().find(|def| def.code == code)
}
