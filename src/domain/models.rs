use chrono::{DateTime, FixedOffset, NaiveDateTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A discovered GATT characteristic on the connected peripheral
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharacteristicInfo {
    pub uuid: Uuid,
    /// Size of the value currently held by the characteristic
    pub value_capacity: usize,
}

impl CharacteristicInfo {
    pub fn new(uuid: Uuid, value_capacity: usize) -> Self {
        Self {
            uuid,
            value_capacity,
        }
    }
}

/// Lifecycle of the single peripheral link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LinkState {
    Disconnected,
    Connecting,
    Connected,
    ServicesReady,
}

impl LinkState {
    /// True once the platform reported the link up, before or after service discovery
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected | Self::ServicesReady)
    }
}

/// Progress of the "enable GPS" handshake
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HandshakeState {
    #[default]
    Idle,
    AwaitingEnableAck,
    AwaitingConfirmAck,
    Reporting,
}

/// A single geographic sample together with the local clock it was taken at
#[derive(Debug, Clone, PartialEq)]
pub struct GeoFix {
    pub latitude: f64,
    pub longitude: f64,
    pub local_time: NaiveDateTime,
    pub utc_offset_minutes: i16,
    pub dst_offset_minutes: i16,
}

impl GeoFix {
    /// Build a fix from a zoned timestamp, deriving wall time and UTC offset.
    ///
    /// The DST component cannot be recovered from a fixed offset, so the
    /// caller supplies it.
    pub fn from_zoned(
        latitude: f64,
        longitude: f64,
        timestamp: DateTime<FixedOffset>,
        dst_offset_minutes: i16,
    ) -> Self {
        let offset_minutes = timestamp.offset().local_minus_utc() / 60;
        Self {
            latitude,
            longitude,
            local_time: timestamp.naive_local(),
            utc_offset_minutes: offset_minutes as i16,
            dst_offset_minutes,
        }
    }
}

/// Events delivered by the location collaborator
#[derive(Debug, Clone, PartialEq)]
pub enum FixEvent {
    AvailabilityChanged { available: bool },
    Ready(GeoFix),
}

/// Discrete conditions surfaced to the user-facing notifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    LinkConnecting,
    LinkConnected,
    LinkDisconnected,
    ServicesReady,
    GpsEnabled,
    GpsSignalFound,
    GpsSignalLost,
    IncompatibleDevice,
    BluetoothUnavailable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub kind: NotificationKind,
    /// Human-readable name of the peripheral, or its address when unnamed
    pub device: String,
}

#[derive(Debug, Clone)]
pub enum AppEvent {
    Notification(Notification),
    ConnectionStatus(LinkState),
}
