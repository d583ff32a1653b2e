//! Short-range camera link lifecycle.
//!
//! ```text
//! Idle ─start─▶ Scanning ─match─▶ Connecting ─linked─▶ DiscoveringServices
//!                                                           │
//!              Ready ◀─all channels subscribed── Subscribing ◀┘
//!
//! any failure ─▶ Recovering ─(5 attempts, 2s·2ⁿ backoff)─▶ Ready
//!                                   └─exhausted─▶ RecoveryExhausted
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use laura_frame::{Channel, ReassemblyConfig, CAMERA_SERVICE};
use laura_transport::{Advertisement, ShortRangeCentral};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::dispatch::EventDispatcher;
use crate::error::{LinkError, Result};
use crate::listener::{spawn_listener, ListenerReport};
use crate::requests::{self, Request, DEFAULT_STATUS_INTEREST};

/// Where the camera link is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkState {
    Idle,
    Scanning,
    Connecting,
    DiscoveringServices,
    Subscribing,
    Ready,
    Recovering,
}

impl LinkState {
    pub fn as_str(self) -> &'static str {
        match self {
            LinkState::Idle => "idle",
            LinkState::Scanning => "scanning",
            LinkState::Connecting => "connecting",
            LinkState::DiscoveringServices => "discovering_services",
            LinkState::Subscribing => "subscribing",
            LinkState::Ready => "ready",
            LinkState::Recovering => "recovering",
        }
    }
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Camera link configuration.
#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// Substring the advertised name must contain. Case-sensitive.
    pub name_filter: String,
    /// Service the camera must advertise and expose.
    pub service: Uuid,
    /// How long one scan listens.
    pub scan_window: Duration,
    /// Upper bound on one connect attempt.
    pub connect_timeout: Duration,
    /// Connection attempts made by recovery before giving up.
    pub retry_budget: u32,
    /// Wait after the first failed recovery attempt; doubles each time.
    pub initial_backoff: Duration,
    /// Statuses the camera is asked to push once the link is ready.
    pub status_interest: Vec<u8>,
    /// Limits applied by every channel listener.
    pub reassembly: ReassemblyConfig,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            name_filter: "GoPro".to_string(),
            service: CAMERA_SERVICE,
            scan_window: Duration::from_secs(3),
            connect_timeout: Duration::from_secs(5),
            retry_budget: 5,
            initial_backoff: Duration::from_secs(2),
            status_interest: DEFAULT_STATUS_INTEREST.to_vec(),
            reassembly: ReassemblyConfig::default(),
        }
    }
}

impl LinkConfig {
    /// Wait after failed recovery attempt `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let doublings = attempt.saturating_sub(1).min(16);
        self.initial_backoff.saturating_mul(1 << doublings)
    }

    /// Whether an advertisement is the camera this link is looking for.
    pub fn matches(&self, advertisement: &Advertisement) -> bool {
        let named = advertisement
            .name
            .as_deref()
            .is_some_and(|name| name.contains(&self.name_filter));
        named && advertisement.services.contains(&self.service)
    }
}

/// The controller's link to the camera.
pub struct ShortRangeLink<C> {
    central: C,
    config: LinkConfig,
    dispatcher: Arc<EventDispatcher>,
    state: watch::Sender<LinkState>,
    device: Option<Advertisement>,
    listeners: Vec<(Channel, JoinHandle<ListenerReport>)>,
}

impl<C: ShortRangeCentral> ShortRangeLink<C> {
    pub fn new(central: C, config: LinkConfig, dispatcher: Arc<EventDispatcher>) -> Self {
        let (state, _) = watch::channel(LinkState::Idle);
        Self {
            central,
            config,
            dispatcher,
            state,
            device: None,
            listeners: Vec::new(),
        }
    }

    pub fn state(&self) -> LinkState {
        *self.state.borrow()
    }

    /// Receiver notified on every state transition.
    pub fn watch_state(&self) -> watch::Receiver<LinkState> {
        self.state.subscribe()
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    /// The camera currently or last connected to.
    pub fn device(&self) -> Option<&Advertisement> {
        self.device.as_ref()
    }

    /// Whether every channel listener is still attached to its stream.
    pub fn listeners_alive(&self) -> bool {
        !self.listeners.is_empty() && self.listeners.iter().all(|(_, h)| !h.is_finished())
    }

    /// Bring the link up, recovering on failure.
    ///
    /// Only returns an error once recovery is exhausted.
    pub async fn start(&mut self) -> Result<()> {
        match self.connect_sequence().await {
            Ok(()) => Ok(()),
            Err(err) => {
                warn!(error = %err, "camera link failed to start");
                self.recover().await
            }
        }
    }

    /// Walk Idle → Ready once, without retries.
    pub async fn connect_sequence(&mut self) -> Result<()> {
        self.set_state(LinkState::Scanning);
        let seen = self.central.scan(self.config.scan_window).await?;
        let device = seen
            .into_iter()
            .find(|adv| self.config.matches(adv))
            .ok_or_else(|| LinkError::DeviceNotFound {
                name: self.config.name_filter.clone(),
                service: self.config.service,
            })?;
        info!(
            address = %device.address,
            name = device.name.as_deref().unwrap_or(""),
            rssi = device.rssi,
            "camera found"
        );

        self.set_state(LinkState::Connecting);
        let timeout = self.config.connect_timeout;
        tokio::time::timeout(timeout, self.central.connect(device.address, timeout))
            .await
            .map_err(|_| LinkError::Timeout(timeout))??;
        self.device = Some(device);

        self.set_state(LinkState::DiscoveringServices);
        let characteristics = self.central.discover(self.config.service).await?;
        for channel in Channel::ALL {
            for required in [
                channel.request_characteristic(),
                channel.response_characteristic(),
            ] {
                if !characteristics.contains(&required) {
                    return Err(LinkError::MissingCharacteristic(required));
                }
            }
        }

        self.set_state(LinkState::Subscribing);
        let mut streams = Vec::with_capacity(Channel::ALL.len());
        for channel in Channel::ALL {
            let notifications = self
                .central
                .subscribe(channel.response_characteristic())
                .await?;
            debug!(channel = %channel, "subscribed");
            streams.push((channel, notifications));
        }
        for (channel, notifications) in streams {
            let handle = spawn_listener(
                channel,
                notifications,
                Arc::clone(&self.dispatcher),
                self.config.reassembly,
            );
            self.listeners.push((channel, handle));
        }

        self.set_state(LinkState::Ready);
        // Without the registration the camera only answers polls; the link
        // itself is usable, so stay Ready.
        if let Err(err) = self.register_status_interest().await {
            warn!(error = %err, "status registration failed, relying on polling");
        }
        Ok(())
    }

    async fn register_status_interest(&mut self) -> Result<()> {
        if self.config.status_interest.is_empty() {
            warn!("no status codes configured, skipping registration");
            return Ok(());
        }
        let request = requests::register_status_updates(&self.config.status_interest)?;
        self.central
            .write(request.channel.request_characteristic(), &request.payload, true)
            .await?;
        debug!(codes = ?self.config.status_interest, "registered for status updates");
        Ok(())
    }

    /// Tear down and retry the full sequence with exponential backoff.
    ///
    /// Returns [`LinkError::RecoveryExhausted`] after the retry budget is
    /// spent. That error is fatal: the caller is expected to restart the
    /// whole process.
    pub async fn recover(&mut self) -> Result<()> {
        let budget = self.config.retry_budget;
        for attempt in 1..=budget {
            self.set_state(LinkState::Recovering);
            self.teardown().await;
            self.set_state(LinkState::Recovering);

            info!(attempt, budget, "reconnecting to camera");
            match self.connect_sequence().await {
                Ok(()) => {
                    info!(attempt, "camera link recovered");
                    return Ok(());
                }
                Err(err) => {
                    let delay = self.config.backoff(attempt);
                    warn!(
                        attempt,
                        budget,
                        error = %err,
                        delay_ms = delay.as_millis() as u64,
                        "reconnect failed"
                    );
                    self.set_state(LinkState::Recovering);
                    tokio::time::sleep(delay).await;
                }
            }
        }

        self.teardown().await;
        self.set_state(LinkState::Recovering);
        error!(attempts = budget, "camera link recovery exhausted");
        Err(LinkError::RecoveryExhausted { attempts: budget })
    }

    /// Send a request on its channel.
    pub async fn send(&mut self, request: &Request) -> Result<()> {
        debug!(label = request.label, channel = %request.channel, "sending request");
        self.send_raw(request.channel, &request.payload).await
    }

    /// Write raw bytes to a channel's request characteristic.
    ///
    /// When the link is not ready, or the write fails, one reconnect is
    /// attempted and the write retried once.
    pub async fn send_raw(&mut self, channel: Channel, payload: &[u8]) -> Result<()> {
        let characteristic = channel.request_characteristic();
        if self.state() != LinkState::Ready {
            warn!(state = %self.state(), "link not ready, reconnecting before send");
            self.reconnect_once().await?;
            return Ok(self.central.write(characteristic, payload, false).await?);
        }

        match self.central.write(characteristic, payload, false).await {
            Ok(()) => Ok(()),
            Err(err) => {
                warn!(channel = %channel, error = %err, "write failed, reconnecting");
                self.reconnect_once().await?;
                Ok(self.central.write(characteristic, payload, false).await?)
            }
        }
    }

    async fn reconnect_once(&mut self) -> Result<()> {
        self.teardown().await;
        if let Err(err) = self.connect_sequence().await {
            warn!(error = %err, "one-shot reconnect failed");
            self.teardown().await;
            return Err(LinkError::NotReady(self.state()));
        }
        Ok(())
    }

    /// Drop listeners and the connection; back to idle.
    pub async fn teardown(&mut self) {
        for (channel, handle) in self.listeners.drain(..) {
            handle.abort();
            debug!(channel = %channel, "listener stopped");
        }
        if let Err(err) = self.central.disconnect().await {
            warn!(error = %err, "disconnect failed");
        }
        self.set_state(LinkState::Idle);
    }

    fn set_state(&self, next: LinkState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            debug!(from = %previous, to = %next, "link state");
        }
    }
}

impl<C> Drop for ShortRangeLink<C> {
    fn drop(&mut self) {
        for (_, handle) in &self.listeners {
            handle.abort();
        }
    }
}
