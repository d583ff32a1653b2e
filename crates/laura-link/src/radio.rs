//! Long-range link: addressed frames, periodic heartbeats and peer
//! liveness on a shared broadcast radio.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use bytes::Bytes;
use laura_frame::{accept_frame, LongRangeFrame};
use laura_transport::{LongRangeRadio, RadioPacket, SignalQuality};
use rand::Rng;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

use crate::error::{LinkError, Result};
use crate::heartbeat::{Heartbeat, HEARTBEAT_MARKER};
use crate::liveness::PeerTable;

/// One-byte commands a remote sends to a controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteCommand {
    Start,
    Stop,
    Trigger,
}

impl RemoteCommand {
    pub const fn as_byte(self) -> u8 {
        match self {
            RemoteCommand::Start => 0x01,
            RemoteCommand::Stop => 0x02,
            RemoteCommand::Trigger => 0x03,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            RemoteCommand::Start => "start",
            RemoteCommand::Stop => "stop",
            RemoteCommand::Trigger => "trigger",
        }
    }
}

impl TryFrom<u8> for RemoteCommand {
    type Error = LinkError;

    fn try_from(byte: u8) -> Result<Self> {
        match byte {
            0x01 => Ok(RemoteCommand::Start),
            0x02 => Ok(RemoteCommand::Stop),
            0x03 => Ok(RemoteCommand::Trigger),
            other => Err(LinkError::UnknownCommand(other)),
        }
    }
}

impl fmt::Display for RemoteCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Payload of a long-range frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RadioMessage {
    Heartbeat(Heartbeat),
    Command { command: RemoteCommand },
}

impl RadioMessage {
    /// Classify a frame payload.
    pub fn parse(payload: &[u8]) -> Result<Self> {
        match payload {
            [HEARTBEAT_MARKER, ..] => Heartbeat::decode(payload).map(RadioMessage::Heartbeat),
            [byte] => RemoteCommand::try_from(*byte).map(|command| RadioMessage::Command { command }),
            [] => Err(LinkError::InvalidPayload("empty radio payload".to_string())),
            [first, ..] => Err(LinkError::InvalidPayload(format!(
                "unrecognized radio payload (first byte 0x{first:02x}, {} bytes)",
                payload.len()
            ))),
        }
    }

    pub fn encode(&self) -> Bytes {
        match self {
            RadioMessage::Heartbeat(heartbeat) => heartbeat.encode(),
            RadioMessage::Command { command } => Bytes::copy_from_slice(&[command.as_byte()]),
        }
    }
}

/// Periodic heartbeat settings.
#[derive(Debug, Clone)]
pub struct HeartbeatConfig {
    /// Node the heartbeat is addressed to.
    pub destination: u16,
    pub interval: Duration,
    /// Upper bound of the random delay before each transmission.
    pub max_jitter: Duration,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            destination: 0,
            interval: Duration::from_secs(5),
            max_jitter: Duration::from_millis(15),
        }
    }
}

/// Long-range link configuration.
#[derive(Debug, Clone)]
pub struct RadioConfig {
    /// This node's address.
    pub local_id: u16,
    /// Peers whose heartbeats are tracked.
    pub peers: Vec<u16>,
    pub liveness_timeout: Duration,
    pub liveness_interval: Duration,
    /// Send heartbeats when set.
    pub heartbeat: Option<HeartbeatConfig>,
}

impl Default for RadioConfig {
    fn default() -> Self {
        Self {
            local_id: 1,
            peers: Vec::new(),
            liveness_timeout: Duration::from_secs(16),
            liveness_interval: Duration::from_secs(1),
            heartbeat: None,
        }
    }
}

/// Application side of the radio loop.
///
/// Called synchronously from the loop between suspension points.
pub trait RadioHandler {
    /// Heartbeat to transmit now. `None` skips this tick.
    fn heartbeat(&mut self) -> Option<Heartbeat> {
        None
    }

    /// A valid command addressed to this node.
    fn on_command(&mut self, sender: u16, command: RemoteCommand, signal: SignalQuality);

    /// A heartbeat from a tracked peer.
    fn on_heartbeat(&mut self, _sender: u16, _heartbeat: &Heartbeat, _signal: SignalQuality) {}

    /// Called after each liveness recomputation.
    fn on_liveness(&mut self, _peers: &PeerTable) {}
}

/// Message queued for transmission by another task.
#[derive(Debug, Clone)]
pub struct Outgoing {
    pub receiver: u16,
    pub message: RadioMessage,
}

/// Counters kept by the radio loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RadioStats {
    pub sent: u64,
    pub send_failures: u64,
    pub received: u64,
    pub foreign: u64,
    pub malformed: u64,
    pub heartbeats: u64,
    pub commands: u64,
}

enum Wake {
    Heartbeat,
    Liveness,
    Packet(laura_transport::Result<RadioPacket>),
    Outgoing(Option<Outgoing>),
    Shutdown,
}

/// A node on the long-range radio.
pub struct LongRangeLink<R> {
    radio: R,
    config: RadioConfig,
    peers: PeerTable,
    stats: RadioStats,
    outbox_tx: mpsc::UnboundedSender<Outgoing>,
    outbox_rx: mpsc::UnboundedReceiver<Outgoing>,
}

impl<R: LongRangeRadio> LongRangeLink<R> {
    pub fn new(radio: R, config: RadioConfig) -> Self {
        let peers = PeerTable::new(config.peers.iter().copied(), config.liveness_timeout);
        let (outbox_tx, outbox_rx) = mpsc::unbounded_channel();
        Self {
            radio,
            config,
            peers,
            stats: RadioStats::default(),
            outbox_tx,
            outbox_rx,
        }
    }

    pub fn local_id(&self) -> u16 {
        self.config.local_id
    }

    pub fn peers(&self) -> &PeerTable {
        &self.peers
    }

    /// Whether peer `id` is timed out. `None` for untracked ids.
    pub fn peer_liveness(&self, id: u16) -> Option<bool> {
        self.peers.peer_liveness(id)
    }

    pub fn stats(&self) -> RadioStats {
        self.stats
    }

    /// Handle for queueing transmissions from other tasks while the loop runs.
    pub fn outbox(&self) -> mpsc::UnboundedSender<Outgoing> {
        self.outbox_tx.clone()
    }

    /// Frame and transmit a payload.
    pub async fn send_to(&mut self, receiver: u16, payload: &[u8]) -> Result<()> {
        let frame = LongRangeFrame::new(self.config.local_id, receiver, Bytes::copy_from_slice(payload));
        let wire = frame.to_bytes()?;
        trace!(receiver, len = payload.len(), "radio send");
        match self.radio.send(&wire).await {
            Ok(()) => {
                self.stats.sent += 1;
                Ok(())
            }
            Err(err) => {
                self.stats.send_failures += 1;
                Err(err.into())
            }
        }
    }

    pub async fn send_message(&mut self, receiver: u16, message: &RadioMessage) -> Result<()> {
        self.send_to(receiver, &message.encode()).await
    }

    /// Transmit a heartbeat after a random jitter delay.
    pub async fn send_heartbeat(&mut self, receiver: u16, heartbeat: &Heartbeat) -> Result<()> {
        let max_jitter = self
            .config
            .heartbeat
            .as_ref()
            .map_or(HeartbeatConfig::default().max_jitter, |hb| hb.max_jitter);
        let jitter = jitter_delay(max_jitter);
        if !jitter.is_zero() {
            time::sleep(jitter).await;
        }
        self.send_to(receiver, &heartbeat.encode()).await
    }

    /// Validate and route one received packet.
    pub fn handle_packet<H: RadioHandler>(&mut self, packet: RadioPacket, handler: &mut H, now: Instant) {
        self.stats.received += 1;
        let frame = match accept_frame(&packet.data, self.config.local_id) {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                self.stats.foreign += 1;
                return;
            }
            Err(err) => {
                self.stats.malformed += 1;
                warn!(error = %err, len = packet.data.len(), "malformed radio frame");
                return;
            }
        };

        debug!(
            sender = frame.sender,
            rssi = packet.signal.rssi,
            snr = packet.signal.snr,
            len = frame.payload.len(),
            "radio frame"
        );

        match RadioMessage::parse(&frame.payload) {
            Ok(RadioMessage::Heartbeat(heartbeat)) => {
                if self
                    .peers
                    .record_heartbeat(frame.sender, heartbeat, packet.signal, now)
                {
                    self.stats.heartbeats += 1;
                    handler.on_heartbeat(frame.sender, &heartbeat, packet.signal);
                } else {
                    debug!(sender = frame.sender, "heartbeat from untracked peer");
                }
            }
            Ok(RadioMessage::Command { command }) => {
                self.stats.commands += 1;
                info!(sender = frame.sender, command = %command, "remote command");
                handler.on_command(frame.sender, command, packet.signal);
            }
            Err(err) => {
                self.stats.malformed += 1;
                warn!(sender = frame.sender, error = %err, "unusable radio payload");
            }
        }
    }

    /// Recompute peer liveness.
    pub fn check_liveness<H: RadioHandler>(&mut self, handler: &mut H, now: Instant) {
        for id in self.peers.refresh(now) {
            let silence = self.peers.get(id).and_then(|peer| peer.silence(now));
            warn!(peer = id, silence_s = silence.map(|d| d.as_secs()), "peer heartbeat timed out");
        }
        handler.on_liveness(&self.peers);
    }

    /// Run until the radio fails.
    pub async fn run<H: RadioHandler>(&mut self, handler: &mut H) -> Result<()> {
        self.run_until(handler, std::future::pending()).await
    }

    /// Run the radio loop until `shutdown` resolves or the radio fails.
    pub async fn run_until<H, F>(&mut self, handler: &mut H, shutdown: F) -> Result<()>
    where
        H: RadioHandler,
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        let mut heartbeat_tick = self.config.heartbeat.as_ref().map(|hb| {
            let mut tick = time::interval(hb.interval);
            tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
            tick
        });
        let mut liveness_tick = time::interval(self.config.liveness_interval);
        liveness_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            let wake = tokio::select! {
                biased;
                _ = &mut shutdown => Wake::Shutdown,
                _ = next_tick(heartbeat_tick.as_mut()) => Wake::Heartbeat,
                _ = liveness_tick.tick() => Wake::Liveness,
                outgoing = self.outbox_rx.recv() => Wake::Outgoing(outgoing),
                packet = self.radio.recv() => Wake::Packet(packet),
            };

            match wake {
                Wake::Shutdown => {
                    debug!("radio loop stopping");
                    return Ok(());
                }
                Wake::Heartbeat => {
                    let Some(destination) = self.config.heartbeat.as_ref().map(|hb| hb.destination)
                    else {
                        continue;
                    };
                    if let Some(heartbeat) = handler.heartbeat() {
                        if let Err(err) = self.send_heartbeat(destination, &heartbeat).await {
                            warn!(error = %err, "heartbeat transmission failed");
                        }
                    }
                }
                Wake::Liveness => self.check_liveness(handler, Instant::now()),
                Wake::Outgoing(Some(outgoing)) => {
                    if let Err(err) = self.send_message(outgoing.receiver, &outgoing.message).await {
                        warn!(receiver = outgoing.receiver, error = %err, "queued transmission failed");
                    }
                }
                // The link holds its own sender, so the outbox never closes.
                Wake::Outgoing(None) => {}
                Wake::Packet(Ok(packet)) => self.handle_packet(packet, handler, Instant::now()),
                Wake::Packet(Err(err)) => return Err(err.into()),
            }
        }
    }
}

async fn next_tick(tick: Option<&mut time::Interval>) {
    match tick {
        Some(tick) => {
            tick.tick().await;
        }
        None => std::future::pending().await,
    }
}

fn jitter_delay(max: Duration) -> Duration {
    let max_ms = u64::try_from(max.as_millis()).unwrap_or(u64::MAX);
    if max_ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::thread_rng().gen_range(0..=max_ms))
}

#[cfg(test)]
mod tests {
    use laura_transport::MemoryMedium;

    use super::*;

    #[derive(Default)]
    struct Recorder {
        commands: Vec<(u16, RemoteCommand)>,
        heartbeats: Vec<(u16, Heartbeat)>,
        liveness_checks: usize,
        next_heartbeat: Option<Heartbeat>,
    }

    impl RadioHandler for Recorder {
        fn heartbeat(&mut self) -> Option<Heartbeat> {
            self.next_heartbeat
        }

        fn on_command(&mut self, sender: u16, command: RemoteCommand, _signal: SignalQuality) {
            self.commands.push((sender, command));
        }

        fn on_heartbeat(&mut self, sender: u16, heartbeat: &Heartbeat, _signal: SignalQuality) {
            self.heartbeats.push((sender, *heartbeat));
        }

        fn on_liveness(&mut self, _peers: &PeerTable) {
            self.liveness_checks += 1;
        }
    }

    fn packet(bytes: &[u8]) -> RadioPacket {
        RadioPacket {
            data: Bytes::copy_from_slice(bytes),
            signal: SignalQuality { rssi: -90, snr: 6.5 },
        }
    }

    fn link_with_peers(local_id: u16, peers: Vec<u16>) -> LongRangeLink<laura_transport::MemoryRadio> {
        let medium = MemoryMedium::default();
        LongRangeLink::new(
            medium.attach(SignalQuality::default()),
            RadioConfig {
                local_id,
                peers,
                ..RadioConfig::default()
            },
        )
    }

    #[test]
    fn remote_command_bytes() {
        for command in [RemoteCommand::Start, RemoteCommand::Stop, RemoteCommand::Trigger] {
            assert_eq!(
                RemoteCommand::try_from(command.as_byte()).expect("known command"),
                command
            );
        }
        assert!(matches!(
            RemoteCommand::try_from(0x04),
            Err(LinkError::UnknownCommand(0x04))
        ));
    }

    #[test]
    fn payload_classification() {
        assert_eq!(
            RadioMessage::parse(&[0x03]).expect("trigger should parse"),
            RadioMessage::Command {
                command: RemoteCommand::Trigger
            }
        );
        let heartbeat = Heartbeat {
            battery_level: 40,
            ..Heartbeat::default()
        };
        assert_eq!(
            RadioMessage::parse(&heartbeat.encode()).expect("heartbeat should parse"),
            RadioMessage::Heartbeat(heartbeat)
        );
        assert!(matches!(
            RadioMessage::parse(&[]),
            Err(LinkError::InvalidPayload(_))
        ));
        assert!(matches!(
            RadioMessage::parse(&[0x10, 0x00]),
            Err(LinkError::InvalidHeartbeat(_))
        ));
        assert!(matches!(
            RadioMessage::parse(&[0x01, 0x02]),
            Err(LinkError::InvalidPayload(msg)) if msg.contains("0x01")
        ));
    }

    #[tokio::test]
    async fn command_frame_reaches_handler() {
        let mut link = link_with_peers(1, vec![0]);
        let mut handler = Recorder::default();

        link.handle_packet(packet(&[0x00, 0x00, 0x00, 0x01, 0x01, 0x03]), &mut handler, Instant::now());

        assert_eq!(handler.commands, vec![(0, RemoteCommand::Trigger)]);
        assert_eq!(link.stats().commands, 1);
    }

    #[tokio::test]
    async fn foreign_and_malformed_frames_are_dropped() {
        let mut link = link_with_peers(1, vec![0]);
        let mut handler = Recorder::default();
        let now = Instant::now();

        link.handle_packet(packet(&[0x00, 0x00, 0x00, 0x02, 0x01, 0x03]), &mut handler, now);
        link.handle_packet(packet(&[0x00, 0x00, 0x00]), &mut handler, now);
        link.handle_packet(packet(&[0x00, 0x00, 0x00, 0x01, 0x05, 0x03]), &mut handler, now);
        link.handle_packet(packet(&[0x00, 0x00, 0x00, 0x01, 0x01, 0x7F]), &mut handler, now);

        assert!(handler.commands.is_empty());
        let stats = link.stats();
        assert_eq!(stats.received, 4);
        assert_eq!(stats.foreign, 1);
        assert_eq!(stats.malformed, 3);
    }

    #[tokio::test]
    async fn heartbeats_update_tracked_peers_only() {
        let mut link = link_with_peers(0, vec![1]);
        let mut handler = Recorder::default();
        let now = Instant::now();
        let heartbeat = Heartbeat {
            camera_connected: true,
            recording: true,
            ..Heartbeat::default()
        };

        let mut from_tracked = vec![0x00, 0x01, 0x00, 0x00, 12];
        from_tracked.extend_from_slice(&heartbeat.encode());
        link.handle_packet(packet(&from_tracked), &mut handler, now);

        let mut from_stranger = vec![0x00, 0x07, 0x00, 0x00, 12];
        from_stranger.extend_from_slice(&heartbeat.encode());
        link.handle_packet(packet(&from_stranger), &mut handler, now);

        assert_eq!(handler.heartbeats, vec![(1, heartbeat)]);
        assert_eq!(link.peer_liveness(1), Some(false));
        assert_eq!(link.peer_liveness(7), None);
        let record = link.peers().get(1).expect("peer 1 is tracked");
        assert_eq!(record.signal.map(|s| s.rssi), Some(-90));
    }

    #[tokio::test(start_paused = true)]
    async fn heartbeats_flow_and_liveness_expires() {
        let medium = MemoryMedium::default();
        let mut controller = LongRangeLink::new(
            medium.attach(SignalQuality::default()),
            RadioConfig {
                local_id: 1,
                peers: vec![],
                heartbeat: Some(HeartbeatConfig::default()),
                ..RadioConfig::default()
            },
        );
        let mut remote = LongRangeLink::new(
            medium.attach(SignalQuality { rssi: -70, snr: 8.0 }),
            RadioConfig {
                local_id: 0,
                peers: vec![1],
                ..RadioConfig::default()
            },
        );
        let mut sender = Recorder {
            next_heartbeat: Some(Heartbeat {
                battery_level: 77,
                powered: true,
                ..Heartbeat::default()
            }),
            ..Recorder::default()
        };
        let mut receiver = Recorder::default();

        let (controller_result, remote_result) = tokio::join!(
            controller.run_until(&mut sender, time::sleep(Duration::from_secs(12))),
            remote.run_until(&mut receiver, time::sleep(Duration::from_secs(40))),
        );
        controller_result.expect("controller loop should stop cleanly");
        remote_result.expect("remote loop should stop cleanly");

        // Ticks at 0s, 5s and 10s.
        assert_eq!(receiver.heartbeats.len(), 3);
        assert_eq!(receiver.heartbeats[0].1.battery_level, 77);
        assert_eq!(remote.peer_liveness(1), Some(true));
        assert!(receiver.liveness_checks > 16);
        assert_eq!(controller.stats().sent, 3);
    }

    #[tokio::test]
    async fn queued_messages_are_transmitted() {
        let medium = MemoryMedium::default();
        let mut remote = LongRangeLink::new(
            medium.attach(SignalQuality::default()),
            RadioConfig {
                local_id: 0,
                ..RadioConfig::default()
            },
        );
        let mut listener = medium.attach(SignalQuality::default());
        let outbox = remote.outbox();
        outbox
            .send(Outgoing {
                receiver: 1,
                message: RadioMessage::Command {
                    command: RemoteCommand::Start,
                },
            })
            .expect("outbox should be open");

        let mut handler = Recorder::default();
        let (result, packet) = tokio::join!(
            remote.run_until(&mut handler, time::sleep(Duration::from_millis(50))),
            listener.recv(),
        );
        result.expect("loop should stop cleanly");
        let packet = packet.expect("listener should hear the command");
        assert_eq!(packet.data.as_ref(), &[0x00, 0x00, 0x00, 0x01, 0x01, 0x01]);
    }

    #[test]
    fn jitter_stays_within_bound() {
        for _ in 0..200 {
            assert!(jitter_delay(Duration::from_millis(15)) <= Duration::from_millis(15));
        }
        assert_eq!(jitter_delay(Duration::ZERO), Duration::ZERO);
    }
}
