use std::collections::BTreeMap;
use std::time::Duration;

use laura_transport::SignalQuality;
use tokio::time::Instant;

use crate::heartbeat::Heartbeat;

/// What this node knows about one long-range peer.
#[derive(Debug, Clone)]
pub struct PeerRecord {
    pub id: u16,
    pub last_seen: Option<Instant>,
    pub timed_out: bool,
    pub last_heartbeat: Option<Heartbeat>,
    pub signal: Option<SignalQuality>,
}

impl PeerRecord {
    /// A peer never heard from. Starts timed out.
    pub fn new(id: u16) -> Self {
        Self {
            id,
            last_seen: None,
            timed_out: true,
            last_heartbeat: None,
            signal: None,
        }
    }

    pub fn record_heartbeat(&mut self, heartbeat: Heartbeat, signal: SignalQuality, now: Instant) {
        self.last_seen = Some(now);
        self.timed_out = false;
        self.last_heartbeat = Some(heartbeat);
        self.signal = Some(signal);
    }

    /// Recompute `timed_out` for `now`. Returns the new value.
    pub fn refresh(&mut self, now: Instant, timeout: Duration) -> bool {
        self.timed_out = match self.last_seen {
            None => true,
            Some(seen) => now.saturating_duration_since(seen) > timeout,
        };
        self.timed_out
    }

    /// Time since the last heartbeat.
    pub fn silence(&self, now: Instant) -> Option<Duration> {
        self.last_seen
            .map(|seen| now.saturating_duration_since(seen))
    }
}

/// Fixed set of peers, created at startup and never shrunk.
///
/// Owned by the radio loop; every update happens on that one task.
#[derive(Debug, Clone)]
pub struct PeerTable {
    timeout: Duration,
    peers: BTreeMap<u16, PeerRecord>,
}

impl PeerTable {
    pub fn new(ids: impl IntoIterator<Item = u16>, timeout: Duration) -> Self {
        Self {
            timeout,
            peers: ids.into_iter().map(|id| (id, PeerRecord::new(id))).collect(),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Store a heartbeat. Returns false for peers not in the table.
    pub fn record_heartbeat(
        &mut self,
        id: u16,
        heartbeat: Heartbeat,
        signal: SignalQuality,
        now: Instant,
    ) -> bool {
        match self.peers.get_mut(&id) {
            Some(record) => {
                record.record_heartbeat(heartbeat, signal, now);
                true
            }
            None => false,
        }
    }

    /// Recompute every peer's flag. Returns ids that just timed out.
    pub fn refresh(&mut self, now: Instant) -> Vec<u16> {
        let timeout = self.timeout;
        self.peers
            .values_mut()
            .filter_map(|record| {
                let was = record.timed_out;
                (record.refresh(now, timeout) && !was).then_some(record.id)
            })
            .collect()
    }

    /// Whether `id` is timed out as of the last refresh. `None` if unknown.
    pub fn peer_liveness(&self, id: u16) -> Option<bool> {
        self.peers.get(&id).map(|record| record.timed_out)
    }

    pub fn get(&self, id: u16) -> Option<&PeerRecord> {
        self.peers.get(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PeerRecord> {
        self.peers.values()
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}
