//! Turns reassembled camera messages into typed events.
//!
//! Decoding never fails hard: short or malformed input is logged and
//! yields nothing or a partial snapshot.

use std::collections::BTreeMap;

use laura_frame::Channel;
use serde::Serialize;
use tracing::{debug, warn};

use crate::registry::{self, StatusKind};

/// Minimum size of a command or setting acknowledgment.
pub const MIN_ACK_LEN: usize = 2;

/// Minimum size of a status response.
pub const MIN_STATUS_LEN: usize = 5;

/// Status entries start after the query id and result bytes.
pub const STATUS_OFFSET: usize = 2;

/// A decoded status value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum StatusValue {
    Bool(bool),
    Int(u64),
    Text(String),
}

impl StatusValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            StatusValue::Bool(value) => Some(*value),
            StatusValue::Int(value) => Some(*value != 0),
            StatusValue::Text(_) => None,
        }
    }

    pub fn as_int(&self) -> Option<u64> {
        match self {
            StatusValue::Int(value) => Some(*value),
            StatusValue::Bool(value) => Some(u64::from(*value)),
            StatusValue::Text(_) => None,
        }
    }
}

/// Status name to value, ordered by name.
pub type StatusSnapshot = BTreeMap<String, StatusValue>;

/// One decoded camera response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DecodedEvent {
    CommandResult {
        code: u8,
        name: String,
        result_code: u8,
        result: String,
    },
    SettingResult {
        code: u8,
        name: String,
        result_code: u8,
        result: String,
    },
    StatusSnapshot { statuses: StatusSnapshot },
}

impl DecodedEvent {
    /// Short event kind, as used in logs and tables.
    pub fn kind(&self) -> &'static str {
        match self {
            DecodedEvent::CommandResult { .. } => "command_result",
            DecodedEvent::SettingResult { .. } => "setting_result",
            DecodedEvent::StatusSnapshot { .. } => "status_snapshot",
        }
    }
}

/// Decode a complete message received on `channel`.
pub fn decode_message(channel: Channel, message: &[u8]) -> Option<DecodedEvent> {
    match channel {
        Channel::Command => decode_ack(channel, message).map(|(code, result_code)| {
            DecodedEvent::CommandResult {
                code,
                name: registry::command_name(code).into_owned(),
                result_code,
                result: registry::result_name(result_code).into_owned(),
            }
        }),
        Channel::Settings => decode_ack(channel, message).map(|(code, result_code)| {
            DecodedEvent::SettingResult {
                code,
                name: registry::setting_name(code).into_owned(),
                result_code,
                result: registry::result_name(result_code).into_owned(),
            }
        }),
        Channel::Query => {
            if message.len() < MIN_STATUS_LEN {
                warn!(
                    channel = %channel,
                    len = message.len(),
                    "status response too short"
                );
                return None;
            }
            Some(DecodedEvent::StatusSnapshot {
                statuses: parse_statuses(&message[STATUS_OFFSET..]),
            })
        }
    }
}

fn decode_ack(channel: Channel, message: &[u8]) -> Option<(u8, u8)> {
    match message {
        [code, result, ..] => Some((*code, *result)),
        _ => {
            warn!(
                channel = %channel,
                len = message.len(),
                "acknowledgment too short"
            );
            None
        }
    }
}

/// Parse `(code, length, value)` entries until the input runs out.
///
/// Unknown codes are skipped. A truncated entry ends parsing.
pub fn parse_statuses(entries: &[u8]) -> StatusSnapshot {
    let mut statuses = StatusSnapshot::new();
    let mut rest = entries;

    while let [code, len, tail @ ..] = rest {
        let len = usize::from(*len);
        if tail.len() < len {
            debug!(
                code = *code,
                declared = len,
                available = tail.len(),
                "truncated status entry"
            );
            break;
        }
        let (value, next) = tail.split_at(len);
        rest = next;

        let Some(def) = registry::status_definition(*code) else {
            debug!(code = *code, len, "skipping unknown status");
            continue;
        };
        let value = match def.kind {
            StatusKind::Bool => StatusValue::Bool(value.iter().any(|byte| *byte != 0)),
            StatusKind::Int => StatusValue::Int(be_uint(value)),
            StatusKind::Text => StatusValue::Text(lossy_text(value)),
        };
        statuses.insert(def.name.to_string(), value);
    }

    statuses
}

/// Big-endian unsigned integer from the low-order eight bytes.
fn be_uint(bytes: &[u8]) -> u64 {
    let start = bytes.len().saturating_sub(8);
    bytes[start..]
        .iter()
        .fold(0u64, |acc, byte| (acc << 8) | u64::from(*byte))
}

/// UTF-8 text with invalid sequences dropped.
fn lossy_text(bytes: &[u8]) -> String {
    bytes.utf8_chunks().map(|chunk| chunk.valid()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(event: Option<DecodedEvent>) -> StatusSnapshot {
        match event {
            Some(DecodedEvent::StatusSnapshot { statuses }) => statuses,
            other => panic!("expected status snapshot, got {other:?}"),
        }
    }

    #[test]
    fn command_ack_decodes_names() {
        let event = decode_message(Channel::Command, &[0x01, 0x00]);
        assert_eq!(
            event,
            Some(DecodedEvent::CommandResult {
                code: 0x01,
                name: "set_shutter".to_string(),
                result_code: 0,
                result: "success".to_string(),
            })
        );
    }

    #[test]
    fn setting_ack_with_unknown_codes() {
        let event = decode_message(Channel::Settings, &[0xAB, 0x09, 0xFF]);
        assert_eq!(
            event,
            Some(DecodedEvent::SettingResult {
                code: 0xAB,
                name: "unknown(171)".to_string(),
                result_code: 0x09,
                result: "unknown(9)".to_string(),
            })
        );
    }

    #[test]
    fn short_messages_decode_to_nothing() {
        assert_eq!(decode_message(Channel::Command, &[0x01]), None);
        assert_eq!(decode_message(Channel::Settings, &[]), None);
        assert_eq!(decode_message(Channel::Query, &[0x13, 0x00, 0x0A, 0x01]), None);
    }

    #[test]
    fn unknown_status_is_skipped_and_known_kept() {
        let message = hex::decode("13007702beef0a0101").expect("fixture should be hex");
        let statuses = snapshot(decode_message(Channel::Query, &message));

        assert_eq!(statuses.len(), 1);
        assert_eq!(statuses["recording_status"], StatusValue::Bool(true));
    }

    #[test]
    fn status_kinds_decode() {
        let message = hex::decode(concat!(
            "1300",
            "060100",
            "46015a",
            "230400000e10",
            "1e056c61757261",
        ))
        .expect("fixture should be hex");
        let statuses = snapshot(decode_message(Channel::Query, &message));

        assert_eq!(statuses["system_hot"], StatusValue::Bool(false));
        assert_eq!(statuses["internal_battery_percentage"], StatusValue::Int(90));
        assert_eq!(statuses["remaining_video_time"], StatusValue::Int(3600));
        assert_eq!(
            statuses["access_point_ssid"],
            StatusValue::Text("laura".to_string())
        );
    }

    #[test]
    fn multi_byte_bool_is_true_if_any_byte_set() {
        let statuses = parse_statuses(&[0x55, 0x02, 0x00, 0x01]);
        assert_eq!(statuses["low_temp"], StatusValue::Bool(true));
    }

    #[test]
    fn wide_integers_keep_low_bytes() {
        let mut entry = vec![0x27, 10, 0xFF, 0xFF];
        entry.extend_from_slice(&42u64.to_be_bytes());
        let statuses = parse_statuses(&entry);
        assert_eq!(statuses["videos"], StatusValue::Int(42));
    }

    #[test]
    fn invalid_utf8_is_dropped_from_text() {
        let statuses = parse_statuses(&[0x1E, 0x04, b'a', 0xFF, b'b', 0xC3]);
        assert_eq!(
            statuses["access_point_ssid"],
            StatusValue::Text("ab".to_string())
        );
    }

    #[test]
    fn truncated_entry_stops_parsing() {
        let statuses = parse_statuses(&[0x0A, 0x01, 0x01, 0x46, 0x04, 0x00]);
        assert_eq!(statuses.len(), 1);
        assert!(statuses.contains_key("recording_status"));
    }

    #[test]
    fn events_serialize_with_kind_tag() {
        let event = decode_message(Channel::Command, &[0x05, 0x01]).expect("ack should decode");
        let json = serde_json::to_value(&event).expect("event should serialize");
        assert_eq!(json["event"], "command_result");
        assert_eq!(json["name"], "sleep");
        assert_eq!(json["result"], "error");
        assert_eq!(event.kind(), "command_result");
    }
}
