//! Controller session: the camera link and the long-range radio wired
//! together.
//!
//! Status snapshots from the camera feed a [`CameraState`], which feeds the
//! heartbeat. Remote commands received over the radio become shutter
//! requests on the camera link.
//!
//! With an inactivity timeout configured, a camera nobody has used for that
//! long is sent to sleep and polling stops. The next remote command wakes
//! it instead of operating the shutter.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use laura_transport::{LongRangeRadio, ShortRangeCentral, SignalQuality};
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::decoder::{DecodedEvent, StatusSnapshot};
use crate::dispatch::{EventDispatcher, Observer, ObserverError};
use crate::error::Result;
use crate::heartbeat::Heartbeat;
use crate::link::{LinkConfig, LinkState, ShortRangeLink};
use crate::radio::{LongRangeLink, RadioConfig, RadioHandler, RemoteCommand};
use crate::requests::{self, Framerate, Request, Resolution, DEFAULT_STATUS_INTEREST};

/// Last known camera status, built from status snapshots.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CameraState {
    pub recording: bool,
    pub system_hot: bool,
    pub low_temp: bool,
    pub battery_percentage: Option<u64>,
    pub flatmode: u64,
    pub preset_group: u64,
    pub video_preset: u64,
    /// Snapshots applied so far.
    pub snapshots: u64,
}

impl CameraState {
    /// Merge a snapshot. Statuses it does not carry keep their value.
    pub fn apply(&mut self, statuses: &StatusSnapshot) {
        let flag = |name: &str| statuses.get(name).and_then(|v| v.as_bool());
        let int = |name: &str| statuses.get(name).and_then(|v| v.as_int());

        if let Some(recording) = flag("recording_status") {
            self.recording = recording;
        }
        if let Some(hot) = flag("system_hot") {
            self.system_hot = hot;
        }
        if let Some(cold) = flag("low_temp") {
            self.low_temp = cold;
        }
        if let Some(battery) = int("internal_battery_percentage") {
            self.battery_percentage = Some(battery);
        }
        if let Some(flatmode) = int("flatmode") {
            self.flatmode = flatmode;
        }
        if let Some(group) = int("preset_group") {
            self.preset_group = group;
        }
        if let Some(preset) = int("video_preset") {
            self.video_preset = preset;
        }
        self.snapshots += 1;
    }
}

/// Observer that keeps a [`CameraState`] current.
pub struct CameraStateObserver {
    state: watch::Sender<CameraState>,
}

impl CameraStateObserver {
    pub fn new() -> (Self, watch::Receiver<CameraState>) {
        let (state, rx) = watch::channel(CameraState::default());
        (Self { state }, rx)
    }
}

impl Observer for CameraStateObserver {
    fn name(&self) -> &str {
        "camera_state"
    }

    fn on_event(&self, event: &DecodedEvent) -> std::result::Result<(), ObserverError> {
        match event {
            DecodedEvent::StatusSnapshot { statuses } => {
                self.state.send_modify(|state| state.apply(statuses));
                debug!(statuses = statuses.len(), "camera state updated");
            }
            DecodedEvent::CommandResult {
                name,
                result_code,
                result,
                ..
            }
            | DecodedEvent::SettingResult {
                name,
                result_code,
                result,
                ..
            } if *result_code != 0 => {
                warn!(request = %name, result = %result, "camera rejected request");
            }
            _ => {}
        }
        Ok(())
    }
}

/// Controller session settings.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Period of the status poll.
    pub status_query_interval: Duration,
    /// Pause after each setup request.
    pub command_spacing: Duration,
    /// Requests applied once the camera link first comes up.
    pub setup: Vec<Request>,
    /// Statuses polled on every query.
    pub status_codes: Vec<u8>,
    /// Reported in heartbeats.
    pub resolution: Resolution,
    /// Reported in heartbeats.
    pub framerate: Framerate,
    /// Put the camera to sleep after this long without remote commands or
    /// shutter changes. `None` keeps it always on.
    pub inactivity_timeout: Option<Duration>,
    /// Time a sleeping camera gets to wake before polling resumes.
    pub wake_delay: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            status_query_interval: Duration::from_secs(5),
            command_spacing: Duration::from_millis(500),
            setup: requests::initial_setup(),
            status_codes: DEFAULT_STATUS_INTEREST.to_vec(),
            resolution: Resolution::Res4K,
            framerate: Framerate::Fps60,
            inactivity_timeout: None,
            wake_delay: Duration::from_secs(2),
        }
    }
}

/// Heartbeat describing the camera as the controller sees it.
///
/// `awake` is false while the controller has put the camera to sleep.
/// Status values wider than a byte saturate.
pub fn heartbeat_from(
    state: &CameraState,
    link: LinkState,
    awake: bool,
    config: &ControllerConfig,
) -> Heartbeat {
    let connected = link == LinkState::Ready;
    let narrow = |value: u64| u8::try_from(value).unwrap_or(u8::MAX);
    Heartbeat {
        camera_connected: connected,
        battery_level: state.battery_percentage.map_or(0, narrow),
        powered: connected && awake,
        overheating: state.system_hot,
        low_temperature: state.low_temp,
        flatmode: narrow(state.flatmode),
        preset_group: narrow(state.preset_group),
        video_preset: narrow(state.video_preset),
        framerate: config.framerate.value(),
        resolution: config.resolution.value(),
        recording: state.recording,
    }
}

/// Shutter request for a remote command given the current recording state.
pub fn shutter_for(command: RemoteCommand, recording: bool) -> Request {
    match command {
        RemoteCommand::Start => requests::shutter(true),
        RemoteCommand::Stop => requests::shutter(false),
        RemoteCommand::Trigger => requests::shutter(!recording),
    }
}

struct ControllerRadio {
    camera: watch::Receiver<CameraState>,
    link_state: watch::Receiver<LinkState>,
    awake: watch::Receiver<bool>,
    commands: mpsc::UnboundedSender<(u16, RemoteCommand)>,
    config: ControllerConfig,
}

impl RadioHandler for ControllerRadio {
    fn heartbeat(&mut self) -> Option<Heartbeat> {
        let link = *self.link_state.borrow();
        let awake = *self.awake.borrow();
        Some(heartbeat_from(&self.camera.borrow(), link, awake, &self.config))
    }

    fn on_command(&mut self, sender: u16, command: RemoteCommand, signal: SignalQuality) {
        debug!(sender, command = %command, rssi = signal.rssi, "queueing remote command");
        if self.commands.send((sender, command)).is_err() {
            warn!(sender, command = %command, "camera session gone, command dropped");
        }
    }
}

/// A controller node: one camera, one radio.
pub struct Controller<C, R> {
    link: ShortRangeLink<C>,
    radio: LongRangeLink<R>,
    camera: watch::Receiver<CameraState>,
    awake: watch::Sender<bool>,
    config: ControllerConfig,
}

impl<C: ShortRangeCentral, R: LongRangeRadio> Controller<C, R> {
    /// Build the session. A [`CameraStateObserver`] is appended to
    /// `dispatcher` before it is shared with the listeners.
    pub fn new(
        central: C,
        link_config: LinkConfig,
        radio: R,
        radio_config: RadioConfig,
        config: ControllerConfig,
        mut dispatcher: EventDispatcher,
    ) -> Self {
        let (observer, camera) = CameraStateObserver::new();
        dispatcher.register(Arc::new(observer));
        Self {
            link: ShortRangeLink::new(central, link_config, Arc::new(dispatcher)),
            radio: LongRangeLink::new(radio, radio_config),
            camera,
            awake: watch::channel(true).0,
            config,
        }
    }

    pub fn link(&self) -> &ShortRangeLink<C> {
        &self.link
    }

    pub fn radio(&self) -> &LongRangeLink<R> {
        &self.radio
    }

    pub fn camera_state(&self) -> CameraState {
        self.camera.borrow().clone()
    }

    /// False while the camera has been put to sleep for inactivity.
    pub fn camera_awake(&self) -> bool {
        *self.awake.borrow()
    }

    /// Run both links until `shutdown` resolves.
    ///
    /// Returns [`RecoveryExhausted`](crate::LinkError::RecoveryExhausted) when the camera link cannot
    /// be repaired, and radio failures as they happen.
    pub async fn run_until<F>(&mut self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let (commands_tx, mut commands) = mpsc::unbounded_channel();
        let mut handler = ControllerRadio {
            camera: self.camera.clone(),
            link_state: self.link.watch_state(),
            awake: self.awake.subscribe(),
            commands: commands_tx,
            config: self.config.clone(),
        };

        let Self {
            link,
            radio,
            camera,
            awake,
            config,
        } = self;

        tokio::select! {
            _ = shutdown => {
                info!("controller stopping");
                Ok(())
            }
            result = radio.run(&mut handler) => result,
            result = camera_session(link, config, camera, awake, &mut commands) => result,
        }
    }
}

async fn camera_session<C: ShortRangeCentral>(
    link: &mut ShortRangeLink<C>,
    config: &ControllerConfig,
    camera: &watch::Receiver<CameraState>,
    awake: &watch::Sender<bool>,
    commands: &mut mpsc::UnboundedReceiver<(u16, RemoteCommand)>,
) -> Result<()> {
    awake.send_replace(true);
    link.start().await?;
    for request in &config.setup {
        deliver(link, request).await?;
        time::sleep(config.command_spacing).await;
    }
    info!(requests = config.setup.len(), "camera setup applied");

    let query = requests::status_query(&config.status_codes)?;
    let mut poll = time::interval(config.status_query_interval);
    poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut camera_changes = camera.clone();
    let mut last_recording = camera.borrow().recording;
    let mut last_interaction = Instant::now();

    loop {
        let asleep = !*awake.borrow();
        let idle_deadline = config
            .inactivity_timeout
            .map(|timeout| last_interaction + timeout);

        tokio::select! {
            _ = poll.tick(), if !asleep => {
                if !link.listeners_alive() {
                    warn!(state = %link.state(), "camera notifications stopped, recovering");
                    link.recover().await?;
                }
                deliver(link, &query).await?;
            }
            _ = idle_expired(idle_deadline), if !asleep => {
                info!(
                    idle_secs = last_interaction.elapsed().as_secs(),
                    "no remote activity, putting camera to sleep"
                );
                deliver(link, &requests::sleep()).await?;
                awake.send_replace(false);
            }
            Ok(()) = camera_changes.changed() => {
                let now_recording = camera_changes.borrow_and_update().recording;
                if now_recording != last_recording {
                    last_recording = now_recording;
                    last_interaction = Instant::now();
                }
            }
            Some((sender, command)) = commands.recv() => {
                last_interaction = Instant::now();
                if asleep {
                    info!(sender, command = %command, "waking camera");
                    time::sleep(config.wake_delay).await;
                    if !link.listeners_alive() {
                        link.recover().await?;
                    }
                    awake.send_replace(true);
                    poll.reset_immediately();
                    last_interaction = Instant::now();
                } else {
                    let recording = camera.borrow().recording;
                    let request = shutter_for(command, recording);
                    info!(sender, command = %command, recording, request = request.label, "remote command");
                    deliver(link, &request).await?;
                }
            }
        }
    }
}

async fn idle_expired(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Send a request; a non-fatal failure triggers full recovery.
async fn deliver<C: ShortRangeCentral>(link: &mut ShortRangeLink<C>, request: &Request) -> Result<()> {
    match link.send(request).await {
        Ok(()) => Ok(()),
        Err(err) if err.is_fatal() => Err(err),
        Err(err) => {
            warn!(request = request.label, error = %err, "send failed, recovering camera link");
            link.recover().await
        }
    }
}
