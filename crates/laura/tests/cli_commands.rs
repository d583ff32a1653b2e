#![cfg(feature = "cli")]

use std::process::{Command, Output};

use serde_json::Value;

fn laura(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_laura"))
        .args(["--log-level", "off", "--format", "json"])
        .args(args)
        .env_remove("LAURA_LOCAL_ID")
        .env_remove("LAURA_LOG_LEVEL")
        .output()
        .expect("laura binary should run")
}

fn stdout_json(output: &Output) -> Value {
    serde_json::from_slice(&output.stdout).expect("stdout should be json")
}

#[test]
fn decode_reassembles_status_query() {
    let output = laura(&["decode", "--channel", "query", "0b13000a0101", "80550100060100"]);
    assert_eq!(output.status.code(), Some(0));

    let json = stdout_json(&output);
    assert_eq!(json["events"][0]["event"], "status_snapshot");
    assert_eq!(json["events"][0]["statuses"]["recording_status"], true);
    assert_eq!(json["pending_bytes"], Value::Null);
}

#[test]
fn decode_rejects_bad_hex() {
    let output = laura(&["decode", "--channel", "command", "zz"]);
    assert_eq!(output.status.code(), Some(60));
    assert!(String::from_utf8_lossy(&output.stderr).contains("invalid hex"));
}

#[test]
fn frame_encode_remote_trigger() {
    let output = laura(&[
        "frame", "encode", "--sender", "0", "--receiver", "1", "--command", "trigger",
    ]);
    assert_eq!(output.status.code(), Some(0));
    assert_eq!(stdout_json(&output)["frame"], "000000010103");
}

#[test]
fn frame_decode_heartbeat() {
    let output = laura(&["frame", "decode", "00010000"]);
    assert_eq!(output.status.code(), Some(60));

    let output = laura(&[
        "frame",
        "decode",
        "000100000c100132010000000000050c00",
    ]);
    assert_eq!(output.status.code(), Some(0));
    let json = stdout_json(&output);
    assert_eq!(json["sender"], 1);
    assert_eq!(json["message"]["type"], "heartbeat");
    assert_eq!(json["message"]["battery_level"], 50);
}

#[test]
fn frame_decode_reports_foreign_frames() {
    let output = laura(&["frame", "decode", "000000020103", "--local-id", "1"]);
    assert_eq!(output.status.code(), Some(0));

    let json = stdout_json(&output);
    assert_eq!(json["addressed"], false);
    assert_eq!(json["receiver"], 2);
}

#[test]
fn simulate_short_run_completes() {
    let output = laura(&[
        "simulate",
        "--duration",
        "3s",
        "--heartbeat-interval",
        "1s",
        "--trigger-every",
        "1s",
        "--query-interval",
        "1s",
        "--command-spacing",
        "10ms",
    ]);
    assert_eq!(output.status.code(), Some(0));

    let json = stdout_json(&output);
    assert_eq!(json["outcome"], "completed");
    assert_eq!(json["restarts"], 0);
    assert!(json["remote"]["heartbeats"].as_u64().unwrap_or(0) > 0);
    assert!(json["camera"]["writes"].as_u64().unwrap_or(0) > 0);
}

#[test]
fn simulate_without_camera_requests_restart() {
    let output = laura(&[
        "simulate",
        "--no-camera",
        "--initial-backoff",
        "10ms",
        "--max-restarts",
        "1",
        "--duration",
        "10s",
    ]);
    assert_eq!(output.status.code(), Some(75));

    let json = stdout_json(&output);
    assert_eq!(json["outcome"], "restart_limit");
    assert_eq!(json["restarts"], 1);
    assert_eq!(json["exhausted_recoveries"], 2);
}

#[test]
fn version_prints_package_version() {
    let output = laura(&["version"]);
    assert_eq!(output.status.code(), Some(0));
    assert_eq!(
        String::from_utf8_lossy(&output.stdout).trim(),
        format!("laura {}", env!("CARGO_PKG_VERSION"))
    );
}
