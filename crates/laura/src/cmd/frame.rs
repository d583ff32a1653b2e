use laura_frame::{accept_frame, decode_frame, LongRangeFrame};
use laura_link::{RadioMessage, RemoteCommand};
use serde::Serialize;

use crate::cmd::{FrameDecodeArgs, FrameEncodeArgs};
use crate::exit::{frame_error, hex_error, CliError, CliResult, SUCCESS, USAGE};
use crate::output::{print_fields, print_json, OutputFormat};

#[derive(Debug, Serialize)]
struct EncodedFrame {
    sender: u16,
    receiver: u16,
    payload: String,
    frame: String,
    size: usize,
}

#[derive(Debug, Serialize)]
struct DecodedFrame {
    sender: u16,
    receiver: u16,
    payload: String,
    /// False when `--local-id` was given and the frame is for someone else.
    addressed: bool,
    message: Option<RadioMessage>,
    message_error: Option<String>,
}

pub fn encode(args: FrameEncodeArgs, format: OutputFormat) -> CliResult<i32> {
    let payload = match (&args.payload, args.command) {
        (Some(text), None) => hex::decode(text.trim()).map_err(|err| hex_error("--payload", err))?,
        (None, Some(command)) => vec![RemoteCommand::from(command).as_byte()],
        _ => {
            return Err(CliError::new(
                USAGE,
                "exactly one of --payload or --command is required",
            ))
        }
    };

    let frame = LongRangeFrame::new(args.sender, args.receiver, payload);
    let wire = frame
        .to_bytes()
        .map_err(|err| frame_error("encode failed", err))?;

    let out = EncodedFrame {
        sender: frame.sender,
        receiver: frame.receiver,
        payload: hex::encode(&frame.payload),
        frame: hex::encode(&wire),
        size: wire.len(),
    };
    match format {
        OutputFormat::Json => print_json(&out),
        OutputFormat::Table | OutputFormat::Pretty => print_fields(
            &[
                ("sender", out.sender.to_string()),
                ("receiver", out.receiver.to_string()),
                ("payload", out.payload.clone()),
                ("frame", out.frame.clone()),
                ("size", out.size.to_string()),
            ],
            format,
        ),
    }
    Ok(SUCCESS)
}

pub fn decode(args: FrameDecodeArgs, format: OutputFormat) -> CliResult<i32> {
    let raw = hex::decode(args.frame.trim()).map_err(|err| hex_error("frame", err))?;
    let out = inspect(&raw, args.local_id)?;

    match format {
        OutputFormat::Json => print_json(&out),
        OutputFormat::Table | OutputFormat::Pretty => {
            let mut fields = vec![
                ("sender", out.sender.to_string()),
                ("receiver", out.receiver.to_string()),
                ("addressed", out.addressed.to_string()),
                ("payload", out.payload.clone()),
            ];
            match (&out.message, &out.message_error) {
                (Some(RadioMessage::Command { command }), _) => {
                    fields.push(("command", command.to_string()));
                }
                (Some(RadioMessage::Heartbeat(heartbeat)), _) => {
                    fields.push(("heartbeat", heartbeat.activity().to_string()));
                    fields.push(("health", heartbeat.health().to_string()));
                    fields.push(("battery", heartbeat.battery_level.to_string()));
                    fields.push(("camera_connected", heartbeat.camera_connected.to_string()));
                }
                (None, Some(error)) => fields.push(("error", error.clone())),
                (None, None) => {}
            }
            print_fields(&fields, format);
        }
    }
    Ok(SUCCESS)
}

fn inspect(raw: &[u8], local_id: Option<u16>) -> CliResult<DecodedFrame> {
    let (frame, addressed) = match local_id {
        Some(id) => match accept_frame(raw, id).map_err(|err| frame_error("decode failed", err))? {
            Some(frame) => (frame, true),
            None => (
                decode_frame(raw).map_err(|err| frame_error("decode failed", err))?,
                false,
            ),
        },
        None => (
            decode_frame(raw).map_err(|err| frame_error("decode failed", err))?,
            true,
        ),
    };

    let (message, message_error) = match RadioMessage::parse(&frame.payload) {
        Ok(message) => (Some(message), None),
        Err(err) => (None, Some(err.to_string())),
    };

    Ok(DecodedFrame {
        sender: frame.sender,
        receiver: frame.receiver,
        payload: hex::encode(&frame.payload),
        addressed,
        message,
        message_error,
    })
}

#[cfg(test)]
mod tests {
    use laura_link::Heartbeat;

    use super::*;

    #[test]
    fn classifies_remote_trigger() {
        let out = inspect(&[0x00, 0x00, 0x00, 0x01, 0x01, 0x03], Some(1)).expect("valid frame");
        assert!(out.addressed);
        assert_eq!(
            out.message,
            Some(RadioMessage::Command {
                command: RemoteCommand::Trigger
            })
        );
    }

    #[test]
    fn classifies_heartbeat() {
        let heartbeat = Heartbeat {
            camera_connected: true,
            battery_level: 50,
            powered: true,
            ..Heartbeat::default()
        };
        let wire = LongRangeFrame::new(1, 0, heartbeat.encode())
            .to_bytes()
            .expect("heartbeat fits a frame");

        let out = inspect(&wire, None).expect("valid frame");
        assert_eq!(out.message, Some(RadioMessage::Heartbeat(heartbeat)));
        assert!(out.message_error.is_none());
    }

    #[test]
    fn foreign_frame_is_not_addressed() {
        let out = inspect(&[0x00, 0x00, 0x00, 0x02, 0x01, 0x03], Some(1)).expect("valid frame");
        assert!(!out.addressed);
        assert_eq!(out.receiver, 2);
    }

    #[test]
    fn unknown_payload_is_reported() {
        let out = inspect(&[0x00, 0x00, 0x00, 0x01, 0x01, 0x09], None).expect("valid frame");
        assert!(out.message.is_none());
        assert!(out
            .message_error
            .expect("classification error expected")
            .contains("0x09"));
    }

    #[test]
    fn truncated_frame_is_data_invalid() {
        let err = inspect(&[0x00, 0x01], None).expect_err("too short");
        assert_eq!(err.code, crate::exit::DATA_INVALID);
    }
}
