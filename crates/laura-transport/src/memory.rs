//! In-process transports.
//!
//! [`MemoryCentral`] plays a scripted peripheral with fault injection;
//! [`MemoryMedium`] is a broadcast medium every attached [`MemoryRadio`]
//! hears. Both back the simulator and the link tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{Result, TransportError};
use crate::traits::{
    Advertisement, DeviceAddress, LongRangeRadio, Notifications, RadioPacket, ShortRangeCentral,
    SignalQuality,
};

const NOTIFY_QUEUE_DEPTH: usize = 32;
const DEFAULT_MEDIUM_CAPACITY: usize = 64;

/// Peripheral behaviour: maps a write to the notifications it triggers.
///
/// Each returned pair is `(response characteristic, raw fragment)`.
pub type Responder = Box<dyn FnMut(Uuid, &[u8]) -> Vec<(Uuid, Bytes)> + Send>;

/// Failures the memory central injects, consumed one per call.
#[derive(Debug, Clone, Default)]
pub struct FaultPlan {
    /// Number of upcoming scans that see nothing.
    pub failing_scans: usize,
    /// Number of upcoming scans that fail outright (adapter error).
    pub erroring_scans: usize,
    /// Number of upcoming connects that fail.
    pub failing_connects: usize,
    /// Number of upcoming writes that fail.
    pub failing_writes: usize,
    /// Characteristics whose subscription always fails.
    pub unsubscribable: Vec<Uuid>,
}

/// Call counters recorded by the memory central.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CentralStats {
    pub scans: usize,
    pub connects: usize,
    pub disconnects: usize,
    pub subscriptions: usize,
    /// Successful writes in order: `(characteristic, payload)`.
    pub writes: Vec<(Uuid, Vec<u8>)>,
}

struct CentralInner {
    advertisements: Vec<Advertisement>,
    services: HashMap<Uuid, Vec<Uuid>>,
    faults: FaultPlan,
    stats: CentralStats,
    connected: Option<DeviceAddress>,
    subscribers: HashMap<Uuid, mpsc::Sender<Bytes>>,
    responder: Option<Responder>,
}

/// Scripted short-range central.
///
/// Clones share state, so a test keeps one clone as a control handle while
/// the link owns another.
#[derive(Clone)]
pub struct MemoryCentral {
    inner: Arc<Mutex<CentralInner>>,
}

impl Default for MemoryCentral {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCentral {
    /// Create a central with no visible peripherals.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(CentralInner {
                advertisements: Vec::new(),
                services: HashMap::new(),
                faults: FaultPlan::default(),
                stats: CentralStats::default(),
                connected: None,
                subscribers: HashMap::new(),
                responder: None,
            })),
        }
    }

    /// Make a peripheral visible with one service and its characteristics.
    pub fn with_peripheral(
        self,
        advertisement: Advertisement,
        service: Uuid,
        characteristics: &[Uuid],
    ) -> Self {
        {
            let mut inner = self.lock();
            inner.advertisements.push(advertisement);
            inner.services.insert(service, characteristics.to_vec());
        }
        self
    }

    /// Install the peripheral behaviour invoked on every successful write.
    pub fn set_responder(&self, responder: Responder) {
        self.lock().responder = Some(responder);
    }

    /// Replace the injected fault plan.
    pub fn set_faults(&self, faults: FaultPlan) {
        self.lock().faults = faults;
    }

    /// Snapshot of the call counters.
    pub fn stats(&self) -> CentralStats {
        self.lock().stats.clone()
    }

    /// Whether a connection is currently established.
    pub fn is_connected(&self) -> bool {
        self.lock().connected.is_some()
    }

    /// Push a raw fragment to the subscriber of `characteristic`.
    ///
    /// Returns `false` when nobody is subscribed or the queue is full.
    pub fn notify(&self, characteristic: Uuid, fragment: impl Into<Bytes>) -> bool {
        let inner = self.lock();
        match inner.subscribers.get(&characteristic) {
            Some(tx) => tx.try_send(fragment.into()).is_ok(),
            None => false,
        }
    }

    /// Simulate the peripheral dropping the connection.
    pub fn drop_connection(&self) {
        let mut inner = self.lock();
        inner.connected = None;
        inner.subscribers.clear();
    }

    fn lock(&self) -> MutexGuard<'_, CentralInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ShortRangeCentral for MemoryCentral {
    async fn scan(&mut self, _window: Duration) -> Result<Vec<Advertisement>> {
        let mut inner = self.lock();
        inner.stats.scans += 1;
        if inner.faults.erroring_scans > 0 {
            inner.faults.erroring_scans -= 1;
            return Err(TransportError::Scan("injected adapter failure".to_string()));
        }
        if inner.faults.failing_scans > 0 {
            inner.faults.failing_scans -= 1;
            debug!("memory central: injected empty scan");
            return Ok(Vec::new());
        }
        Ok(inner.advertisements.clone())
    }

    async fn connect(&mut self, address: DeviceAddress, _timeout: Duration) -> Result<()> {
        let mut inner = self.lock();
        inner.stats.connects += 1;
        if inner.faults.failing_connects > 0 {
            inner.faults.failing_connects -= 1;
            return Err(TransportError::Connect {
                address,
                reason: "injected connect failure".to_string(),
            });
        }
        if !inner.advertisements.iter().any(|adv| adv.address == address) {
            return Err(TransportError::Connect {
                address,
                reason: "device not in range".to_string(),
            });
        }
        inner.connected = Some(address);
        Ok(())
    }

    async fn discover(&mut self, service: Uuid) -> Result<Vec<Uuid>> {
        let inner = self.lock();
        if inner.connected.is_none() {
            return Err(TransportError::NotConnected);
        }
        inner
            .services
            .get(&service)
            .cloned()
            .ok_or(TransportError::ServiceNotFound(service))
    }

    async fn subscribe(&mut self, characteristic: Uuid) -> Result<Notifications> {
        let mut inner = self.lock();
        if inner.connected.is_none() {
            return Err(TransportError::NotConnected);
        }
        if inner.faults.unsubscribable.contains(&characteristic) {
            return Err(TransportError::Subscribe {
                characteristic,
                reason: "injected subscribe failure".to_string(),
            });
        }
        let known = inner
            .services
            .values()
            .any(|chars| chars.contains(&characteristic));
        if !known {
            return Err(TransportError::CharacteristicNotFound(characteristic));
        }
        let (tx, rx) = mpsc::channel(NOTIFY_QUEUE_DEPTH);
        inner.subscribers.insert(characteristic, tx);
        inner.stats.subscriptions += 1;
        Ok(rx)
    }

    async fn write(
        &mut self,
        characteristic: Uuid,
        payload: &[u8],
        _with_response: bool,
    ) -> Result<()> {
        let mut inner = self.lock();
        if inner.connected.is_none() {
            return Err(TransportError::NotConnected);
        }
        if inner.faults.failing_writes > 0 {
            inner.faults.failing_writes -= 1;
            return Err(TransportError::Write {
                characteristic,
                reason: "injected write failure".to_string(),
            });
        }
        inner.stats.writes.push((characteristic, payload.to_vec()));

        let notifications = match inner.responder.as_mut() {
            Some(responder) => responder(characteristic, payload),
            None => Vec::new(),
        };
        for (target, fragment) in notifications {
            match inner.subscribers.get(&target) {
                Some(tx) => {
                    if tx.try_send(fragment).is_err() {
                        warn!(characteristic = %target, "memory central: notification dropped");
                    }
                }
                None => debug!(characteristic = %target, "memory central: no subscriber"),
            }
        }
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        let mut inner = self.lock();
        if inner.connected.take().is_some() {
            inner.stats.disconnects += 1;
        }
        inner.subscribers.clear();
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct Transmission {
    origin: usize,
    data: Bytes,
}

/// Shared broadcast medium for [`MemoryRadio`] stations.
pub struct MemoryMedium {
    tx: broadcast::Sender<Transmission>,
    next_station: AtomicUsize,
}

impl Default for MemoryMedium {
    fn default() -> Self {
        Self::new(DEFAULT_MEDIUM_CAPACITY)
    }
}

impl MemoryMedium {
    /// Create a medium buffering up to `capacity` in-flight packets.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            tx,
            next_station: AtomicUsize::new(0),
        }
    }

    /// Attach a new station that receives with the given signal quality.
    pub fn attach(&self, signal: SignalQuality) -> MemoryRadio {
        MemoryRadio {
            station: self.next_station.fetch_add(1, Ordering::Relaxed),
            tx: self.tx.clone(),
            rx: self.tx.subscribe(),
            signal,
        }
    }
}

/// One station on a [`MemoryMedium`]. Never hears its own transmissions.
pub struct MemoryRadio {
    station: usize,
    tx: broadcast::Sender<Transmission>,
    rx: broadcast::Receiver<Transmission>,
    signal: SignalQuality,
}

impl LongRangeRadio for MemoryRadio {
    async fn send(&mut self, data: &[u8]) -> Result<()> {
        self.tx
            .send(Transmission {
                origin: self.station,
                data: Bytes::copy_from_slice(data),
            })
            .map(|_| ())
            .map_err(|_| TransportError::Shutdown)
    }

    async fn recv(&mut self) -> Result<RadioPacket> {
        loop {
            match self.rx.recv().await {
                Ok(tx) if tx.origin == self.station => continue,
                Ok(tx) => {
                    return Ok(RadioPacket {
                        data: tx.data,
                        signal: self.signal,
                    })
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(station = self.station, skipped, "memory radio lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return Err(TransportError::Shutdown),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SERVICE: Uuid = Uuid::from_u128(0x0000_fea6_0000_1000_8000_0080_5f9b_34fb);
    const CHAR_REQ: Uuid = Uuid::from_u128(0x1);
    const CHAR_RSP: Uuid = Uuid::from_u128(0x2);

    fn advert() -> Advertisement {
        Advertisement {
            address: DeviceAddress::new([1, 2, 3, 4, 5, 6]),
            name: Some("GoPro 1234".to_string()),
            services: vec![SERVICE],
            rssi: Some(-60),
        }
    }

    fn central() -> MemoryCentral {
        MemoryCentral::new().with_peripheral(advert(), SERVICE, &[CHAR_REQ, CHAR_RSP])
    }

    #[tokio::test]
    async fn scan_connect_discover() {
        let mut central = central();
        let seen = central.scan(Duration::from_secs(1)).await.unwrap();
        assert_eq!(seen, vec![advert()]);

        central
            .connect(seen[0].address, Duration::from_secs(1))
            .await
            .unwrap();
        assert!(central.is_connected());
        assert_eq!(
            central.discover(SERVICE).await.unwrap(),
            vec![CHAR_REQ, CHAR_RSP]
        );
        assert!(matches!(
            central.discover(Uuid::nil()).await,
            Err(TransportError::ServiceNotFound(_))
        ));
    }

    #[tokio::test]
    async fn operations_require_connection() {
        let mut central = central();
        assert!(matches!(
            central.subscribe(CHAR_RSP).await,
            Err(TransportError::NotConnected)
        ));
        assert!(matches!(
            central.write(CHAR_REQ, b"x", false).await,
            Err(TransportError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn injected_faults_are_consumed_in_order() {
        let mut central = central();
        central.set_faults(FaultPlan {
            failing_scans: 1,
            failing_connects: 1,
            ..FaultPlan::default()
        });

        assert!(central.scan(Duration::ZERO).await.unwrap().is_empty());
        let seen = central.scan(Duration::ZERO).await.unwrap();
        assert!(central.connect(seen[0].address, Duration::ZERO).await.is_err());
        assert!(central.connect(seen[0].address, Duration::ZERO).await.is_ok());
        assert_eq!(central.stats().scans, 2);
        assert_eq!(central.stats().connects, 2);
    }

    #[tokio::test]
    async fn erroring_scan_is_reported_before_empty_scans() {
        let mut central = central();
        central.set_faults(FaultPlan {
            erroring_scans: 1,
            failing_scans: 1,
            ..FaultPlan::default()
        });

        assert!(matches!(
            central.scan(Duration::ZERO).await,
            Err(TransportError::Scan(_))
        ));
        assert!(central.scan(Duration::ZERO).await.unwrap().is_empty());
        assert_eq!(central.scan(Duration::ZERO).await.unwrap().len(), 1);
        assert_eq!(central.stats().scans, 3);
    }

    #[tokio::test]
    async fn write_triggers_responder_notifications() {
        let mut central = central();
        central.set_responder(Box::new(|characteristic, payload| {
            assert_eq!(characteristic, CHAR_REQ);
            vec![(CHAR_RSP, Bytes::copy_from_slice(payload))]
        }));

        central
            .connect(advert().address, Duration::ZERO)
            .await
            .unwrap();
        let mut notifications = central.subscribe(CHAR_RSP).await.unwrap();
        central.write(CHAR_REQ, b"\x02\x01\x00", true).await.unwrap();

        let fragment = notifications.recv().await.unwrap();
        assert_eq!(fragment.as_ref(), b"\x02\x01\x00");
        assert_eq!(central.stats().writes.len(), 1);
    }

    #[tokio::test]
    async fn disconnect_closes_notification_streams() {
        let mut central = central();
        central
            .connect(advert().address, Duration::ZERO)
            .await
            .unwrap();
        let mut notifications = central.subscribe(CHAR_RSP).await.unwrap();
        central.disconnect().await.unwrap();

        assert!(notifications.recv().await.is_none());
        assert_eq!(central.stats().disconnects, 1);
        assert!(!central.notify(CHAR_RSP, Bytes::from_static(b"late")));
    }

    #[tokio::test]
    async fn radio_broadcasts_to_other_stations_only() {
        let medium = MemoryMedium::default();
        let mut a = medium.attach(SignalQuality {
            rssi: -40,
            snr: 9.5,
        });
        let mut b = medium.attach(SignalQuality {
            rssi: -80,
            snr: 2.0,
        });

        a.send(b"hello").await.unwrap();
        let packet = b.recv().await.unwrap();
        assert_eq!(packet.data.as_ref(), b"hello");
        assert_eq!(packet.signal.rssi, -80);

        b.send(b"back").await.unwrap();
        let packet = a.recv().await.unwrap();
        assert_eq!(packet.data.as_ref(), b"back");
    }
}
