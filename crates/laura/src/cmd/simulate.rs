//! In-memory end-to-end run: a scripted camera, a controller and one
//! remote on a shared radio medium.
//!
//! This command is also the restart supervisor: when the controller gives
//! up on the camera link, its whole state is dropped and rebuilt, up to
//! `--max-restarts` times.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use laura_frame::{fragment_message, Channel, CAMERA_SERVICE};
use laura_link::{
    Controller, ControllerConfig, DecodedEvent, EventDispatcher, Heartbeat, HeartbeatConfig,
    LinkConfig, LongRangeLink, ObserverError, Outgoing, PeerTable, RadioConfig, RadioHandler,
    RadioMessage, RadioStats, RemoteCommand, DEFAULT_STATUS_INTEREST,
};
use laura_transport::{
    Advertisement, DeviceAddress, FaultPlan, MemoryCentral, MemoryMedium, MemoryRadio,
    SignalQuality,
};
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::time::{self, Instant};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::cmd::SimulateArgs;
use crate::exit::{link_error, CliError, CliResult, INTERNAL, RESTART_REQUESTED, SUCCESS};
use crate::output::{print_fields, print_json, OutputFormat};

const CAMERA_NAME: &str = "GoPro 4821";
const CAMERA_SSID: &[u8] = b"GP24821";
const CAMERA_MTU: usize = 20;
const STATUS_BATTERY: u8 = 0x46;
const STATUS_SSID: u8 = 0x1E;
/// Pushed status updates use the registration id with the high bit set.
const STATUS_PUSH: u8 = 0x93;
/// The remote outlives the controller briefly so the last heartbeat lands.
const REMOTE_GRACE: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum Outcome {
    Completed,
    Interrupted,
    RestartLimit,
}

#[derive(Debug, Default, Serialize)]
struct CameraReport {
    scans: usize,
    connects: usize,
    disconnects: usize,
    writes: usize,
    recording: bool,
}

#[derive(Debug, Serialize)]
struct ControllerReport {
    link_state: String,
    camera_awake: bool,
    camera: laura_link::CameraState,
    radio: RadioStats,
}

#[derive(Debug, Default, Serialize)]
struct RemoteReport {
    commands_sent: u64,
    heartbeats: u64,
    controller_timed_out: Option<bool>,
    last_heartbeat: Option<Heartbeat>,
    last_rssi: Option<i16>,
    radio: RadioStats,
}

#[derive(Debug, Serialize)]
struct SimReport {
    outcome: Outcome,
    duration_ms: u64,
    restarts: u32,
    exhausted_recoveries: u32,
    camera: CameraReport,
    controller: Option<ControllerReport>,
    remote: RemoteReport,
}

pub fn run(args: SimulateArgs, format: OutputFormat) -> CliResult<i32> {
    let (stop_tx, stop_rx) = watch::channel(false);
    install_ctrlc_handler(stop_tx)?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .map_err(|err| CliError::new(INTERNAL, format!("runtime setup failed: {err}")))?;
    let report = runtime.block_on(simulate(&args, stop_rx))?;

    print_report(&report, format);
    if report.outcome == Outcome::RestartLimit {
        return Err(CliError::new(
            RESTART_REQUESTED,
            format!(
                "camera link recovery exhausted {} times, restart limit {} reached",
                report.exhausted_recoveries, args.max_restarts
            ),
        ));
    }
    Ok(SUCCESS)
}

async fn simulate(args: &SimulateArgs, stop: watch::Receiver<bool>) -> CliResult<SimReport> {
    let started = Instant::now();
    let deadline = started + args.duration;

    let recording = Arc::new(AtomicBool::new(false));
    let central = simulated_camera(args, Arc::clone(&recording));
    let medium = MemoryMedium::default();

    let mut remote = LongRangeLink::new(
        medium.attach(SignalQuality {
            rssi: -92,
            snr: 8.5,
        }),
        RadioConfig {
            local_id: args.remote_id,
            peers: vec![args.controller_id],
            liveness_timeout: args.liveness_timeout,
            heartbeat: None,
            ..RadioConfig::default()
        },
    );
    let outbox = remote.outbox();
    let mut display = RemoteDisplay::default();

    let mut report = SimReport {
        outcome: Outcome::Completed,
        duration_ms: 0,
        restarts: 0,
        exhausted_recoveries: 0,
        camera: CameraReport::default(),
        controller: None,
        remote: RemoteReport::default(),
    };

    let remote_node = async {
        let (result, (), ()) = tokio::join!(
            remote.run_until(&mut display, stopped(stop.clone(), deadline + REMOTE_GRACE)),
            press_trigger(outbox, args.controller_id, args.trigger_every, deadline),
            drop_connection_once(central.clone(), args.drop_after, deadline),
        );
        result
    };

    tokio::select! {
        result = supervise(args, &central, &medium, stop.clone(), deadline, &mut report) => result?,
        result = remote_node => result.map_err(|err| link_error("remote failed", err))?,
    }

    if report.outcome == Outcome::Completed && *stop.borrow() {
        report.outcome = Outcome::Interrupted;
    }
    report.duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

    let stats = central.stats();
    report.camera = CameraReport {
        scans: stats.scans,
        connects: stats.connects,
        disconnects: stats.disconnects,
        writes: stats.writes.len(),
        recording: recording.load(Ordering::SeqCst),
    };
    report.remote = RemoteReport {
        commands_sent: remote.stats().sent,
        heartbeats: display.heartbeats,
        controller_timed_out: remote.peer_liveness(args.controller_id),
        last_heartbeat: display.last,
        last_rssi: display.last_signal.map(|signal| signal.rssi),
        radio: remote.stats(),
    };
    Ok(report)
}

/// Run controllers until the deadline, rebuilding after exhausted recovery.
async fn supervise(
    args: &SimulateArgs,
    central: &MemoryCentral,
    medium: &MemoryMedium,
    stop: watch::Receiver<bool>,
    deadline: Instant,
    report: &mut SimReport,
) -> CliResult<()> {
    loop {
        let radio = medium.attach(SignalQuality {
            rssi: -88,
            snr: 9.25,
        });
        let mut controller = build_controller(args, central.clone(), radio);
        info!(restarts = report.restarts, "controller starting");
        let result = controller.run_until(stopped(stop.clone(), deadline)).await;

        report.controller = Some(ControllerReport {
            link_state: controller.link().state().to_string(),
            camera_awake: controller.camera_awake(),
            camera: controller.camera_state(),
            radio: controller.radio().stats(),
        });
        drop(controller);

        match result {
            Ok(()) => return Ok(()),
            Err(err) if err.is_fatal() => {
                report.exhausted_recoveries += 1;
                if report.restarts >= args.max_restarts {
                    error!(restarts = report.restarts, error = %err, "restart limit reached");
                    report.outcome = Outcome::RestartLimit;
                    return Ok(());
                }
                report.restarts += 1;
                warn!(restart = report.restarts, error = %err, "restarting controller");
            }
            Err(err) => return Err(link_error("controller failed", err)),
        }
    }
}

fn build_controller(
    args: &SimulateArgs,
    central: MemoryCentral,
    radio: MemoryRadio,
) -> Controller<MemoryCentral, MemoryRadio> {
    let link_config = LinkConfig {
        retry_budget: args.retry_budget,
        initial_backoff: args.initial_backoff,
        ..LinkConfig::default()
    };
    let radio_config = RadioConfig {
        local_id: args.controller_id,
        peers: Vec::new(),
        heartbeat: Some(HeartbeatConfig {
            destination: args.remote_id,
            interval: args.heartbeat_interval,
            ..HeartbeatConfig::default()
        }),
        ..RadioConfig::default()
    };
    let mut status_codes = DEFAULT_STATUS_INTEREST.to_vec();
    status_codes.extend([STATUS_BATTERY, STATUS_SSID]);
    let config = ControllerConfig {
        status_query_interval: args.query_interval,
        command_spacing: args.command_spacing,
        inactivity_timeout: args.inactivity_timeout,
        status_codes,
        ..ControllerConfig::default()
    };
    let dispatcher = EventDispatcher::new().with_observer(Arc::new(
        |event: &DecodedEvent| -> Result<(), ObserverError> {
            debug!(event = event.kind(), "camera event");
            Ok(())
        },
    ));

    Controller::new(central, link_config, radio, radio_config, config, dispatcher)
}

/// Resolves at `deadline` or on Ctrl-C, whichever comes first.
async fn stopped(mut stop: watch::Receiver<bool>, deadline: Instant) {
    let interrupted = async move {
        while !*stop.borrow_and_update() {
            if stop.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    };
    tokio::select! {
        _ = time::sleep_until(deadline) => {}
        _ = interrupted => debug!("interrupted"),
    }
}

async fn press_trigger(
    outbox: mpsc::UnboundedSender<Outgoing>,
    controller_id: u16,
    every: Duration,
    deadline: Instant,
) {
    let mut presses = time::interval_at(Instant::now() + every, every);
    loop {
        tokio::select! {
            _ = time::sleep_until(deadline) => return,
            _ = presses.tick() => {
                let press = Outgoing {
                    receiver: controller_id,
                    message: RadioMessage::Command {
                        command: RemoteCommand::Trigger,
                    },
                };
                if outbox.send(press).is_err() {
                    return;
                }
                info!(controller = controller_id, "remote trigger pressed");
            }
        }
    }
}

async fn drop_connection_once(central: MemoryCentral, after: Option<Duration>, deadline: Instant) {
    let Some(after) = after else {
        return;
    };
    let at = Instant::now() + after;
    if at >= deadline {
        return;
    }
    time::sleep_until(at).await;
    warn!("camera dropped the connection");
    central.drop_connection();
}

/// What a handheld remote shows: the controller's last heartbeat and
/// whether it is still heard from.
#[derive(Debug, Default)]
struct RemoteDisplay {
    heartbeats: u64,
    last: Option<Heartbeat>,
    last_signal: Option<SignalQuality>,
    lost: bool,
}

impl RadioHandler for RemoteDisplay {
    fn on_command(&mut self, sender: u16, command: RemoteCommand, _signal: SignalQuality) {
        debug!(sender, command = %command, "remote ignores commands");
    }

    fn on_heartbeat(&mut self, sender: u16, heartbeat: &Heartbeat, signal: SignalQuality) {
        self.heartbeats += 1;
        self.last = Some(*heartbeat);
        self.last_signal = Some(signal);
        info!(
            controller = sender,
            status = heartbeat.activity(),
            health = heartbeat.health(),
            battery = heartbeat.battery_level,
            rssi = signal.rssi,
            snr = signal.snr,
            "heartbeat"
        );
    }

    fn on_liveness(&mut self, peers: &PeerTable) {
        let lost = peers.iter().any(|peer| peer.timed_out && peer.last_seen.is_some());
        if lost && !self.lost {
            warn!("controller lost");
        }
        self.lost = lost;
    }
}

/// Scripted camera state behind the in-memory central.
struct CameraModel {
    recording: Arc<AtomicBool>,
    battery: u8,
    registered: Vec<u8>,
}

impl CameraModel {
    fn respond(&mut self, characteristic: Uuid, payload: &[u8]) -> Vec<(Uuid, Bytes)> {
        let Some(channel) = Channel::from_request_characteristic(characteristic) else {
            return Vec::new();
        };
        let [_, id, params @ ..] = payload else {
            return Vec::new();
        };
        let reply = |message: &[u8]| fragments(channel, message);

        match (channel, *id) {
            (Channel::Command, 0x01) => {
                let on = params.get(1).is_some_and(|value| *value == 1);
                self.recording.store(on, Ordering::SeqCst);
                let mut out = reply(&[0x01, 0x00]);
                if self.registered.contains(&0x0A) {
                    let mut push = vec![STATUS_PUSH, 0x00];
                    push.extend(self.entry(0x0A).unwrap_or_default());
                    out.extend(fragments(Channel::Query, &push));
                }
                out
            }
            (Channel::Command, code) | (Channel::Settings, code) => reply(&[code, 0x00]),
            (Channel::Query, query @ (0x13 | 0x53)) => {
                if query == 0x53 {
                    self.registered = params.to_vec();
                } else {
                    self.battery = self.battery.saturating_sub(1).max(1);
                }
                let mut message = vec![query, 0x00];
                for code in params {
                    message.extend(self.entry(*code).unwrap_or_default());
                }
                reply(&message)
            }
            (Channel::Query, other) => reply(&[other, 0x01]),
        }
    }

    fn entry(&self, code: u8) -> Option<Vec<u8>> {
        let value = match code {
            0x0A => vec![u8::from(self.recording.load(Ordering::SeqCst))],
            0x06 | 0x55 => vec![0x00],
            STATUS_BATTERY => vec![self.battery],
            STATUS_SSID => CAMERA_SSID.to_vec(),
            _ => return None,
        };
        let mut entry = vec![code, u8::try_from(value.len()).ok()?];
        entry.extend(value);
        Some(entry)
    }
}

fn fragments(channel: Channel, message: &[u8]) -> Vec<(Uuid, Bytes)> {
    match fragment_message(message, CAMERA_MTU) {
        Ok(parts) => parts
            .into_iter()
            .map(|part| (channel.response_characteristic(), part))
            .collect(),
        Err(err) => {
            warn!(channel = %channel, error = %err, "simulated camera could not fragment reply");
            Vec::new()
        }
    }
}

fn simulated_camera(args: &SimulateArgs, recording: Arc<AtomicBool>) -> MemoryCentral {
    let characteristics: Vec<Uuid> = Channel::ALL
        .into_iter()
        .flat_map(|channel| {
            [
                channel.request_characteristic(),
                channel.response_characteristic(),
            ]
        })
        .collect();
    let central = MemoryCentral::new().with_peripheral(
        Advertisement {
            address: DeviceAddress([0xD4, 0x32, 0x60, 0x5A, 0x48, 0x21]),
            name: Some(CAMERA_NAME.to_string()),
            services: vec![CAMERA_SERVICE],
            rssi: Some(-52),
        },
        CAMERA_SERVICE,
        &characteristics,
    );

    let mut model = CameraModel {
        recording,
        battery: 97,
        registered: Vec::new(),
    };
    central.set_responder(Box::new(move |characteristic: Uuid, payload: &[u8]| {
        model.respond(characteristic, payload)
    }));
    central.set_faults(FaultPlan {
        failing_scans: if args.no_camera {
            usize::MAX
        } else {
            args.fail_scans
        },
        failing_writes: args.fail_writes,
        ..FaultPlan::default()
    });
    central
}

fn install_ctrlc_handler(stop: watch::Sender<bool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        stop.send_replace(true);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}

fn print_report(report: &SimReport, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(report),
        OutputFormat::Table | OutputFormat::Pretty => {
            let outcome = match report.outcome {
                Outcome::Completed => "completed",
                Outcome::Interrupted => "interrupted",
                Outcome::RestartLimit => "restart_limit",
            };
            let mut fields = vec![
                ("outcome", outcome.to_string()),
                ("duration_ms", report.duration_ms.to_string()),
                ("restarts", report.restarts.to_string()),
                ("camera_writes", report.camera.writes.to_string()),
                ("recording", report.camera.recording.to_string()),
                ("remote_commands", report.remote.commands_sent.to_string()),
                ("remote_heartbeats", report.remote.heartbeats.to_string()),
            ];
            if let Some(controller) = &report.controller {
                fields.push(("link_state", controller.link_state.clone()));
            }
            if let Some(heartbeat) = &report.remote.last_heartbeat {
                fields.push(("remote_display", heartbeat.activity().to_string()));
                fields.push(("remote_health", heartbeat.health().to_string()));
            }
            print_fields(&fields, format);
        }
    }
}
