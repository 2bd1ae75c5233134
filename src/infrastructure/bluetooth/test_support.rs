//! Deterministic doubles for the platform seams

use crate::domain::models::CharacteristicInfo;
use crate::infrastructure::bluetooth::connection::{LinkTimer, Scheduler};
use crate::infrastructure::bluetooth::listeners::{LinkEvent, LinkListener};
use crate::infrastructure::bluetooth::protocol::GattStatus;
use crate::infrastructure::bluetooth::transport::{
    ConnectionId, ConnectionState, GattEvent, GattTransport, TransportError,
};
use crate::infrastructure::location::{FixProducer, FixRequest};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

/// Bluetooth SIG base UUID with a 16-bit short id
pub fn characteristic(short: u16) -> CharacteristicInfo {
    let uuid = Uuid::from_u128(((short as u128) << 96) | 0x0000_0000_0000_1000_8000_00805f9b34fb);
    CharacteristicInfo::new(uuid, if short == 0xdd11 { 95 } else { 1 })
}

pub fn connected(connection: ConnectionId) -> GattEvent {
    GattEvent::ConnectionStateChanged {
        connection,
        status: GattStatus::SUCCESS,
        state: ConnectionState::Connected,
    }
}

pub fn disconnected(connection: ConnectionId) -> GattEvent {
    GattEvent::ConnectionStateChanged {
        connection,
        status: GattStatus::SUCCESS,
        state: ConnectionState::Disconnected,
    }
}

pub fn status_event(connection: ConnectionId, status: GattStatus) -> GattEvent {
    GattEvent::ConnectionStateChanged {
        connection,
        status,
        state: ConnectionState::Disconnected,
    }
}

pub fn discovered(connection: ConnectionId, characteristics: Vec<CharacteristicInfo>) -> GattEvent {
    GattEvent::ServicesDiscovered {
        connection,
        status: GattStatus::SUCCESS,
        characteristics,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCall {
    Connect(String, ConnectionId),
    Close(ConnectionId),
    Discover(ConnectionId),
    Write(ConnectionId, Uuid, Vec<u8>),
}

#[derive(Default)]
struct TransportInner {
    calls: Vec<TransportCall>,
    next_id: u64,
    fail_connects: bool,
    /// Write issued but not yet acknowledged through [`RecordingTransport::ack`]
    pending_write: Option<(ConnectionId, Uuid)>,
}

/// Records every platform request and panics if a second write is issued
/// before the first was acknowledged or its connection closed.
#[derive(Clone, Default)]
pub struct RecordingTransport {
    inner: Arc<Mutex<TransportInner>>,
}

impl RecordingTransport {
    pub fn calls(&self) -> Vec<TransportCall> {
        self.inner.lock().unwrap().calls.clone()
    }

    pub fn connect_count(&self, address: &str) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, TransportCall::Connect(a, _) if a == address))
            .count()
    }

    pub fn last_connection(&self) -> Option<ConnectionId> {
        self.calls().iter().rev().find_map(|call| match call {
            TransportCall::Connect(_, id) => Some(*id),
            _ => None,
        })
    }

    pub fn writes(&self) -> Vec<(Uuid, Vec<u8>)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                TransportCall::Write(_, uuid, payload) => Some((uuid, payload)),
                _ => None,
            })
            .collect()
    }

    pub fn write_count(&self) -> usize {
        self.writes().len()
    }

    pub fn fail_connects(&self, fail: bool) {
        self.inner.lock().unwrap().fail_connects = fail;
    }

    /// Complete the outstanding write and return the platform's ack
    pub fn ack(&self, status: GattStatus) -> GattEvent {
        let (connection, characteristic) = self
            .inner
            .lock()
            .unwrap()
            .pending_write
            .take()
            .expect("no write awaiting an ack");
        GattEvent::CharacteristicWritten {
            connection,
            status,
            characteristic,
        }
    }
}

impl GattTransport for RecordingTransport {
    fn connect(&mut self, address: &str) -> Result<ConnectionId, TransportError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.fail_connects {
            return Err(TransportError("adapter busy".to_string()));
        }
        inner.next_id += 1;
        let id = ConnectionId(inner.next_id);
        inner.calls.push(TransportCall::Connect(address.to_string(), id));
        Ok(id)
    }

    fn close(&mut self, connection: ConnectionId) {
        let mut inner = self.inner.lock().unwrap();
        if matches!(inner.pending_write, Some((c, _)) if c == connection) {
            inner.pending_write = None;
        }
        inner.calls.push(TransportCall::Close(connection));
    }

    fn discover_services(&mut self, connection: ConnectionId) -> Result<(), TransportError> {
        self.inner
            .lock()
            .unwrap()
            .calls
            .push(TransportCall::Discover(connection));
        Ok(())
    }

    fn write(
        &mut self,
        connection: ConnectionId,
        characteristic: Uuid,
        payload: &[u8],
    ) -> Result<(), TransportError> {
        let mut inner = self.inner.lock().unwrap();
        assert!(
            inner.pending_write.is_none(),
            "write to {} issued while {:?} awaits its ack",
            characteristic,
            inner.pending_write
        );
        inner.pending_write = Some((connection, characteristic));
        inner
            .calls
            .push(TransportCall::Write(connection, characteristic, payload.to_vec()));
        Ok(())
    }
}

/// Scheduler that only records; tests fire timers by hand
#[derive(Clone, Default)]
pub struct ManualScheduler {
    queue: Arc<Mutex<VecDeque<(Duration, LinkTimer)>>>,
}

impl ManualScheduler {
    pub fn pop(&self) -> Option<(Duration, LinkTimer)> {
        self.queue.lock().unwrap().pop_front()
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&mut self, delay: Duration, timer: LinkTimer) {
        self.queue.lock().unwrap().push_back((delay, timer));
    }
}

#[derive(Default)]
struct ProducerInner {
    requests: Vec<FixRequest>,
    cancels: usize,
    active: bool,
    fail: bool,
}

#[derive(Clone, Default)]
pub struct RecordingProducer {
    inner: Arc<Mutex<ProducerInner>>,
}

impl RecordingProducer {
    pub fn requests(&self) -> Vec<FixRequest> {
        self.inner.lock().unwrap().requests.clone()
    }

    pub fn cancels(&self) -> usize {
        self.inner.lock().unwrap().cancels
    }

    pub fn is_active(&self) -> bool {
        self.inner.lock().unwrap().active
    }

    pub fn fail_requests(&self, fail: bool) {
        self.inner.lock().unwrap().fail = fail;
    }
}

impl FixProducer for RecordingProducer {
    fn request_updates(&mut self, request: &FixRequest) -> anyhow::Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner.fail {
            anyhow::bail!("location permission denied");
        }
        inner.requests.push(*request);
        inner.active = true;
        Ok(())
    }

    fn cancel_updates(&mut self) {
        let mut inner = self.inner.lock().unwrap();
        inner.cancels += 1;
        inner.active = false;
    }
}

/// Listener that keeps every event it sees
#[derive(Default)]
pub struct EventLog {
    events: Mutex<Vec<LinkEvent>>,
}

impl EventLog {
    pub fn events(&self) -> Vec<LinkEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl LinkListener for EventLog {
    fn on_link_event(&self, event: &LinkEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}
