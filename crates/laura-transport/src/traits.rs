use std::fmt;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::Result;

/// Stream of raw notification fragments for one subscribed characteristic.
///
/// Fragments arrive in transport order. The stream ends (`recv` returns
/// `None`) when the connection is torn down.
pub type Notifications = mpsc::Receiver<Bytes>;

/// A 48-bit short-range device address.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceAddress(pub [u8; 6]);

impl DeviceAddress {
    /// Create an address from raw bytes.
    pub const fn new(bytes: [u8; 6]) -> Self {
        Self(bytes)
    }

    /// Raw address bytes.
    pub const fn as_bytes(&self) -> &[u8; 6] {
        &self.0
    }
}

impl fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02X}:{b:02X}:{c:02X}:{d:02X}:{e:02X}:{g:02X}")
    }
}

impl fmt::Debug for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DeviceAddress({self})")
    }
}

/// One advertisement observed during a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Advertisement {
    /// Address to connect to.
    pub address: DeviceAddress,
    /// Advertised local name, if any.
    pub name: Option<String>,
    /// Advertised service identifiers.
    pub services: Vec<Uuid>,
    /// Received signal strength of the advertisement.
    pub rssi: Option<i16>,
}

/// Signal-quality metadata attached to every long-range reception.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SignalQuality {
    /// Received signal strength in dBm.
    pub rssi: i16,
    /// Signal-to-noise ratio in dB.
    pub snr: f32,
}

/// One packet received over the long-range radio.
#[derive(Debug, Clone)]
pub struct RadioPacket {
    /// Raw packet bytes, header included.
    pub data: Bytes,
    /// Signal quality reported by the modem.
    pub signal: SignalQuality,
}

/// Short-range central role: the controller's side of the camera link.
///
/// Implementations talk to a single peripheral at a time. Every method is a
/// suspension point; callers never hold other state borrowed across them.
#[allow(async_fn_in_trait)]
pub trait ShortRangeCentral {
    /// Actively scan for `window` and return every advertisement seen.
    async fn scan(&mut self, window: Duration) -> Result<Vec<Advertisement>>;

    /// Connect to (and pair with) a previously scanned device.
    async fn connect(&mut self, address: DeviceAddress, timeout: Duration) -> Result<()>;

    /// Resolve a primary service and return its characteristic identifiers.
    async fn discover(&mut self, service: Uuid) -> Result<Vec<Uuid>>;

    /// Enable notifications on a characteristic.
    async fn subscribe(&mut self, characteristic: Uuid) -> Result<Notifications>;

    /// Write raw bytes to a characteristic.
    async fn write(&mut self, characteristic: Uuid, payload: &[u8], with_response: bool)
        -> Result<()>;

    /// Tear down the current connection. Idempotent.
    async fn disconnect(&mut self) -> Result<()>;
}

/// Long-range radio: a shared broadcast medium.
#[allow(async_fn_in_trait)]
pub trait LongRangeRadio {
    /// Transmit one packet.
    async fn send(&mut self, data: &[u8]) -> Result<()>;

    /// Wait for the next received packet.
    ///
    /// Must be cancel safe: the link polls it inside `tokio::select!`.
    async fn recv(&mut self) -> Result<RadioPacket>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_address_formats_as_mac() {
        let address = DeviceAddress::new([0xDE, 0xAD, 0x00, 0x01, 0xBE, 0xEF]);
        assert_eq!(address.to_string(), "DE:AD:00:01:BE:EF");
        assert_eq!(format!("{address:?}"), "DeviceAddress(DE:AD:00:01:BE:EF)");
    }
}
