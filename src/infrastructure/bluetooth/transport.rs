//! Platform GATT seam
//!
//! The platform BLE stack sits behind [`GattTransport`]. Every call is a
//! non-blocking request; outcomes come back later as [`GattEvent`]s posted
//! to the link service.

use crate::domain::models::CharacteristicInfo;
use crate::infrastructure::bluetooth::protocol::GattStatus;
use thiserror::Error;
use uuid::Uuid;

/// Opaque handle for one platform connection attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub u64);

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("platform request failed: {0}")]
pub struct TransportError(pub String);

pub trait GattTransport: Send {
    /// Start connecting to `address`
    fn connect(&mut self, address: &str) -> Result<ConnectionId, TransportError>;

    /// Release a connection and stop its callbacks
    fn close(&mut self, connection: ConnectionId);

    fn discover_services(&mut self, connection: ConnectionId) -> Result<(), TransportError>;

    fn write(
        &mut self,
        connection: ConnectionId,
        characteristic: Uuid,
        payload: &[u8],
    ) -> Result<(), TransportError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connected,
    Disconnected,
}

/// Callbacks raised by the platform stack
#[derive(Debug, Clone, PartialEq)]
pub enum GattEvent {
    ConnectionStateChanged {
        connection: ConnectionId,
        status: GattStatus,
        state: ConnectionState,
    },
    ServicesDiscovered {
        connection: ConnectionId,
        status: GattStatus,
        characteristics: Vec<CharacteristicInfo>,
    },
    CharacteristicWritten {
        connection: ConnectionId,
        status: GattStatus,
        characteristic: Uuid,
    },
}

impl GattEvent {
    pub fn connection(&self) -> ConnectionId {
        match self {
            Self::ConnectionStateChanged { connection, .. }
            | Self::ServicesDiscovered { connection, .. }
            | Self::CharacteristicWritten { connection, .. } => *connection,
        }
    }
}
