//! BLE Connection Module
//!
//! Owns the lifecycle of the single GATT link: connect, settle, discover,
//! reconnect, and the single-flight write slot. Every method runs on the
//! link service task; nothing here blocks or sleeps. Timed continuations
//! (settle delay, reconnect backoff) go through a [`Scheduler`] and come
//! back as [`LinkTimer`]s tagged with the generation that scheduled them.

use crate::domain::models::{CharacteristicInfo, LinkState};
use crate::infrastructure::bluetooth::listeners::{
    LinkContext, LinkEvent, LinkListener, ListenerRegistry,
};
use crate::infrastructure::bluetooth::protocol::GattStatus;
use crate::infrastructure::bluetooth::retry::ReconnectPolicy;
use crate::infrastructure::bluetooth::transport::{
    ConnectionId, ConnectionState, GattEvent, GattTransport, TransportError,
};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("link is not ready for writes")]
    NotReady,
    #[error("a write to {0} is still awaiting its acknowledgement")]
    WriteInFlight(Uuid),
    #[error("characteristic {0} was not discovered on this device")]
    CharacteristicNotFound(Uuid),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("listener registry is full ({0} listeners)")]
    RegistryFull(usize),
    #[error("link service has stopped")]
    ServiceStopped,
}

/// Delayed continuation requested by the link manager
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkTimer {
    /// Settle delay elapsed; run service discovery
    Settle { generation: u64 },
    /// Backoff elapsed; try to connect again
    Reconnect { generation: u64 },
}

pub trait Scheduler: Send {
    /// Arrange for `timer` to be handed back to the link manager after `delay`
    fn schedule(&mut self, delay: Duration, timer: LinkTimer);
}

/// Write access to the discovered characteristics
pub trait LinkWriter {
    fn characteristics(&self) -> &[CharacteristicInfo];

    fn write_characteristic(&mut self, characteristic: Uuid, payload: &[u8])
        -> Result<(), LinkError>;
}

/// Single-flight write slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteSlot {
    Idle,
    InFlight(Uuid),
}

#[derive(Debug)]
struct PeripheralLink {
    address: String,
    state: LinkState,
    connection: Option<ConnectionId>,
    characteristics: Vec<CharacteristicInfo>,
    write: WriteSlot,
    failed_attempts: u32,
}

impl PeripheralLink {
    fn new(address: &str) -> Self {
        Self {
            address: address.to_string(),
            state: LinkState::Disconnected,
            connection: None,
            characteristics: Vec::new(),
            write: WriteSlot::Idle,
            failed_attempts: 0,
        }
    }

    fn reset(&mut self) {
        self.state = LinkState::Disconnected;
        self.connection = None;
        self.characteristics.clear();
        self.write = WriteSlot::Idle;
    }
}

pub struct LinkManager<T: GattTransport, S: Scheduler> {
    transport: T,
    scheduler: S,
    policy: ReconnectPolicy,
    settle_delay: Duration,
    listeners: Arc<ListenerRegistry>,
    link: Option<PeripheralLink>,
    /// Address to resume once the adapter powers back on
    parked: Option<String>,
    generation: u64,
    outbox: Vec<LinkEvent>,
}

impl<T: GattTransport, S: Scheduler> LinkManager<T, S> {
    pub fn new(
        transport: T,
        scheduler: S,
        policy: ReconnectPolicy,
        settle_delay: Duration,
        listeners: Arc<ListenerRegistry>,
    ) -> Self {
        Self {
            transport,
            scheduler,
            policy,
            settle_delay,
            listeners,
            link: None,
            parked: None,
            generation: 0,
            outbox: Vec::new(),
        }
    }

    pub fn state(&self) -> LinkState {
        self.link
            .as_ref()
            .map_or(LinkState::Disconnected, |link| link.state)
    }

    pub fn address(&self) -> Option<&str> {
        self.link.as_ref().map(|link| link.address.as_str())
    }

    pub fn is_write_in_flight(&self) -> bool {
        matches!(
            self.link.as_ref().map(|link| link.write),
            Some(WriteSlot::InFlight(_))
        )
    }

    pub fn register_listener<L: LinkListener + 'static>(
        &self,
        listener: &Arc<L>,
    ) -> Result<(), LinkError> {
        self.listeners.register(listener)
    }

    pub fn unregister_listener<L: LinkListener + 'static>(&self, listener: &Arc<L>) {
        self.listeners.unregister(listener)
    }

    /// Connect to `address`. A no-op while already connecting or connected to it.
    pub fn connect(&mut self, address: &str) -> Vec<LinkEvent> {
        match &self.link {
            Some(link) if link.address == address && link.state != LinkState::Disconnected => {
                debug!("Device {} is already {:?}", address, link.state);
                return self.flush();
            }
            Some(link) if link.address == address => {
                debug!("Connecting to {} ahead of the pending retry", address);
            }
            Some(link) => {
                info!("Switching link from {} to {}", link.address, address);
                self.release();
            }
            None => {}
        }

        self.parked = None;
        if self.link.is_none() {
            self.link = Some(PeripheralLink::new(address));
        }
        self.start_connection();
        self.flush()
    }

    /// Drop the link, cancel pending retries and forget the address
    pub fn disconnect(&mut self) -> Vec<LinkEvent> {
        self.parked = None;
        self.release();
        self.flush()
    }

    pub fn handle_gatt_event(&mut self, event: GattEvent) -> Vec<LinkEvent> {
        let current = self.link.as_ref().and_then(|link| link.connection);
        if current != Some(event.connection()) {
            trace!("Ignoring event for stale connection: {:?}", event);
            return self.flush();
        }

        match event {
            GattEvent::ConnectionStateChanged { status, state, .. } => {
                self.on_connection_state_change(status, state)
            }
            GattEvent::ServicesDiscovered {
                status,
                characteristics,
                ..
            } => self.on_services_discovered(status, characteristics),
            GattEvent::CharacteristicWritten {
                status,
                characteristic,
                ..
            } => self.on_characteristic_write(status, characteristic),
        }
        self.flush()
    }

    /// Adapter power changed. Off parks the address; on resumes it.
    pub fn handle_adapter_power(&mut self, powered: bool) -> Vec<LinkEvent> {
        if powered {
            info!("Bluetooth adapter powered on");
            if let Some(address) = self.parked.take() {
                self.link = Some(PeripheralLink::new(&address));
                self.start_connection();
            }
        } else {
            info!("Bluetooth adapter powered off");
            if let Some(address) = self.address().map(str::to_string) {
                self.release();
                self.parked = Some(address);
            }
        }
        self.outbox
            .push(LinkEvent::AdapterPowerChanged { available: powered });
        self.flush()
    }

    pub fn handle_timer(&mut self, timer: LinkTimer) -> Vec<LinkEvent> {
        match timer {
            LinkTimer::Settle { generation } if generation == self.generation => {
                self.discover_services();
            }
            LinkTimer::Reconnect { generation } if generation == self.generation => {
                if self.state() == LinkState::Disconnected && self.link.is_some() {
                    self.start_connection();
                }
            }
            _ => trace!("Ignoring cancelled timer {:?}", timer),
        }
        self.flush()
    }

    fn on_connection_state_change(&mut self, status: GattStatus, state: ConnectionState) {
        let Some(link) = self.link.as_mut() else {
            return;
        };

        if !status.is_success() {
            if status == GattStatus::ERROR {
                debug!("Continuing to look for {}", link.address);
            } else {
                warn!("Status {} encountered for {}", status, link.address);
            }
            self.reconnect();
            return;
        }

        match state {
            ConnectionState::Connected if link.state.is_connected() => {
                debug!("Duplicate connected callback for {}", link.address);
            }
            ConnectionState::Connected => {
                info!("Connected to {}", link.address);
                link.state = LinkState::Connected;
                link.failed_attempts = 0;
                self.outbox.push(LinkEvent::Connected {
                    address: link.address.clone(),
                });
                // let the device settle before discovery
                self.scheduler.schedule(
                    self.settle_delay,
                    LinkTimer::Settle {
                        generation: self.generation,
                    },
                );
            }
            ConnectionState::Disconnected => {
                info!("Disconnected from {}", link.address);
                self.reconnect();
            }
        }
    }

    fn discover_services(&mut self) {
        let Some(link) = self.link.as_ref() else {
            return;
        };
        let Some(connection) = link.connection else {
            return;
        };
        if link.state != LinkState::Connected {
            return;
        }

        if let Err(e) = self.transport.discover_services(connection) {
            warn!("Service discovery request failed: {}", e);
            self.parked = None;
            self.release();
        }
    }

    fn on_services_discovered(
        &mut self,
        status: GattStatus,
        characteristics: Vec<CharacteristicInfo>,
    ) {
        let Some(link) = self.link.as_mut() else {
            return;
        };
        if link.state != LinkState::Connected {
            debug!("Ignoring service discovery result in state {:?}", link.state);
            return;
        }

        if !status.is_success() {
            warn!("Service discovery failed due to status {}", status);
            self.parked = None;
            self.release();
            return;
        }

        info!(
            "Discovered {} characteristics for {}",
            characteristics.len(),
            link.address
        );
        link.characteristics = characteristics;
        link.state = LinkState::ServicesReady;
        self.outbox.push(LinkEvent::SetupComplete(LinkContext {
            address: link.address.clone(),
            characteristics: link.characteristics.clone(),
        }));
    }

    fn on_characteristic_write(&mut self, status: GattStatus, characteristic: Uuid) {
        let Some(link) = self.link.as_mut() else {
            return;
        };

        match link.write {
            WriteSlot::InFlight(pending) if pending != characteristic => {
                warn!(
                    "Write ack for {} while {} was in flight",
                    characteristic, pending
                );
            }
            WriteSlot::Idle => debug!("Unsolicited write ack for {}", characteristic),
            WriteSlot::InFlight(_) => {}
        }
        link.write = WriteSlot::Idle;

        if status.is_success() {
            self.outbox
                .push(LinkEvent::CharacteristicWritten { characteristic });
        } else {
            warn!(
                "Characteristic write failed for {}, error: {}",
                characteristic, status
            );
        }
    }

    /// Tear down the current attempt and try again under the reconnect policy
    fn reconnect(&mut self) {
        let Some(link) = self.link.as_mut() else {
            return;
        };

        let was_connected = link.state.is_connected();
        if let Some(connection) = link.connection {
            self.transport.close(connection);
        }
        link.reset();
        link.failed_attempts = link.failed_attempts.saturating_add(1);
        if was_connected {
            self.outbox.push(LinkEvent::Disconnected {
                address: link.address.clone(),
            });
        }

        let delay = self.policy.delay_for(link.failed_attempts);
        if delay.is_zero() {
            self.start_connection();
        } else {
            self.generation += 1;
            debug!(
                "Reconnecting to {} in {:?} (attempt {})",
                link.address, delay, link.failed_attempts
            );
            self.scheduler.schedule(
                delay,
                LinkTimer::Reconnect {
                    generation: self.generation,
                },
            );
        }
    }

    fn start_connection(&mut self) {
        let Some(link) = self.link.as_mut() else {
            return;
        };

        self.generation += 1;
        if let Some(connection) = link.connection {
            self.transport.close(connection);
        }
        link.reset();

        match self.transport.connect(&link.address) {
            Ok(connection) => {
                info!("Connecting to {}", link.address);
                link.state = LinkState::Connecting;
                link.connection = Some(connection);
                self.outbox.push(LinkEvent::Connecting {
                    address: link.address.clone(),
                });
            }
            Err(e) => {
                // Retry through the scheduler so a stack that fails
                // synchronously cannot recurse.
                link.failed_attempts = link.failed_attempts.saturating_add(1);
                let delay = self.policy.delay_for(link.failed_attempts);
                warn!(
                    "Connect request for {} failed: {}; retrying in {:?}",
                    link.address, e, delay
                );
                self.scheduler.schedule(
                    delay,
                    LinkTimer::Reconnect {
                        generation: self.generation,
                    },
                );
            }
        }
    }

    /// Close the connection and drop the link record
    fn release(&mut self) {
        self.generation += 1;
        let Some(link) = self.link.take() else {
            return;
        };

        if let Some(connection) = link.connection {
            self.transport.close(connection);
        }
        info!("Released link to {}", link.address);
        if link.state.is_connected() {
            self.outbox.push(LinkEvent::Disconnected {
                address: link.address,
            });
        }
    }

    /// Publish queued events to listeners and hand them back to the caller
    fn flush(&mut self) -> Vec<LinkEvent> {
        let events = std::mem::take(&mut self.outbox);
        for event in &events {
            self.listeners.dispatch(event);
        }
        events
    }
}

impl<T: GattTransport, S: Scheduler> LinkWriter for LinkManager<T, S> {
    fn characteristics(&self) -> &[CharacteristicInfo] {
        self.link
            .as_ref()
            .filter(|link| link.state == LinkState::ServicesReady)
            .map(|link| link.characteristics.as_slice())
            .unwrap_or(&[])
    }

    /// Issue a write. Rejected while another write awaits its ack; unknown
    /// characteristics are logged and dropped.
    fn write_characteristic(
        &mut self,
        characteristic: Uuid,
        payload: &[u8],
    ) -> Result<(), LinkError> {
        let link = self
            .link
            .as_mut()
            .filter(|link| link.state == LinkState::ServicesReady)
            .ok_or(LinkError::NotReady)?;
        let connection = link.connection.ok_or(LinkError::NotReady)?;

        if let WriteSlot::InFlight(pending) = link.write {
            return Err(LinkError::WriteInFlight(pending));
        }
        if !link.characteristics.iter().any(|c| c.uuid == characteristic) {
            warn!("Unable to find characteristic {}", characteristic);
            return Err(LinkError::CharacteristicNotFound(characteristic));
        }

        self.transport.write(connection, characteristic, payload)?;
        link.write = WriteSlot::InFlight(characteristic);
        trace!("Wrote {} bytes to {}", payload.len(), characteristic);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::bluetooth::test_support::{
        characteristic, connected, discovered, disconnected, status_event, ManualScheduler,
        RecordingTransport, TransportCall,
    };

    const ADDRESS: &str = "D8:4A:2B:00:11:22";

    type Manager = LinkManager<RecordingTransport, ManualScheduler>;

    fn manager_with(policy: ReconnectPolicy) -> (Manager, RecordingTransport, ManualScheduler) {
        let transport = RecordingTransport::default();
        let scheduler = ManualScheduler::default();
        let manager = LinkManager::new(
            transport.clone(),
            scheduler.clone(),
            policy,
            Duration::from_secs(1),
            Arc::new(ListenerRegistry::default()),
        );
        (manager, transport, scheduler)
    }

    fn manager() -> (Manager, RecordingTransport, ManualScheduler) {
        manager_with(ReconnectPolicy::Immediate)
    }

    /// Drive the manager to ServicesReady and return the active connection
    fn ready(manager: &mut Manager, scheduler: &ManualScheduler) -> ConnectionId {
        manager.connect(ADDRESS);
        let connection = manager.link.as_ref().unwrap().connection.unwrap();
        manager.handle_gatt_event(connected(connection));
        let (_, timer) = scheduler.pop().unwrap();
        manager.handle_timer(timer);
        manager.handle_gatt_event(discovered(
            connection,
            vec![characteristic(0xdd30), characteristic(0xdd11)],
        ));
        connection
    }

    #[test]
    fn test_connect_is_idempotent() {
        let (mut manager, transport, scheduler) = manager();

        let events = manager.connect(ADDRESS);
        assert_eq!(
            events,
            vec![LinkEvent::Connecting {
                address: ADDRESS.to_string()
            }]
        );
        assert!(manager.connect(ADDRESS).is_empty());
        assert_eq!(manager.state(), LinkState::Connecting);

        let connection = transport.last_connection().unwrap();
        manager.handle_gatt_event(connected(connection));
        assert!(manager.connect(ADDRESS).is_empty());
        assert_eq!(manager.state(), LinkState::Connected);

        let (_, timer) = scheduler.pop().unwrap();
        manager.handle_timer(timer);
        manager.handle_gatt_event(discovered(
            connection,
            vec![characteristic(0xdd30), characteristic(0xdd11)],
        ));
        assert_eq!(manager.state(), LinkState::ServicesReady);
        assert!(manager.connect(ADDRESS).is_empty());
        assert_eq!(manager.state(), LinkState::ServicesReady);

        assert_eq!(transport.connect_count(ADDRESS), 1);
        assert!(scheduler.pop().is_none());
    }

    #[test]
    fn test_settle_delay_precedes_discovery() {
        let (mut manager, transport, scheduler) = manager();
        manager.connect(ADDRESS);
        let connection = transport.last_connection().unwrap();

        let events = manager.handle_gatt_event(connected(connection));
        assert_eq!(
            events,
            vec![LinkEvent::Connected {
                address: ADDRESS.to_string()
            }]
        );
        assert_eq!(manager.state(), LinkState::Connected);
        assert!(!transport.calls().contains(&TransportCall::Discover(connection)));

        let (delay, timer) = scheduler.pop().unwrap();
        assert_eq!(delay, Duration::from_secs(1));
        manager.handle_timer(timer);
        assert!(transport.calls().contains(&TransportCall::Discover(connection)));
    }

    #[test]
    fn test_services_ready_publishes_context() {
        let (mut manager, transport, scheduler) = manager();
        manager.connect(ADDRESS);
        let connection = transport.last_connection().unwrap();
        manager.handle_gatt_event(connected(connection));
        manager.handle_timer(scheduler.pop().unwrap().1);

        let characteristics = vec![characteristic(0xdd30), characteristic(0xdd31)];
        let events = manager.handle_gatt_event(discovered(connection, characteristics.clone()));

        assert_eq!(
            events,
            vec![LinkEvent::SetupComplete(LinkContext {
                address: ADDRESS.to_string(),
                characteristics: characteristics.clone(),
            })]
        );
        assert_eq!(manager.state(), LinkState::ServicesReady);
        assert_eq!(manager.characteristics(), characteristics.as_slice());
    }

    #[test]
    fn test_discovery_failure_disconnects() {
        let (mut manager, transport, scheduler) = manager();
        manager.connect(ADDRESS);
        let connection = transport.last_connection().unwrap();
        manager.handle_gatt_event(connected(connection));
        manager.handle_timer(scheduler.pop().unwrap().1);

        let events = manager.handle_gatt_event(GattEvent::ServicesDiscovered {
            connection,
            status: GattStatus(129),
            characteristics: Vec::new(),
        });

        assert_eq!(
            events,
            vec![LinkEvent::Disconnected {
                address: ADDRESS.to_string()
            }]
        );
        assert_eq!(manager.state(), LinkState::Disconnected);
        assert!(transport.calls().contains(&TransportCall::Close(connection)));
    }

    #[test]
    fn test_write_requires_services_ready() {
        let (mut manager, _, _) = manager();
        manager.connect(ADDRESS);
        assert!(matches!(
            manager.write_characteristic(characteristic(0xdd30).uuid, &[1]),
            Err(LinkError::NotReady)
        ));
    }

    #[test]
    fn test_single_write_in_flight() {
        let (mut manager, transport, scheduler) = manager();
        ready(&mut manager, &scheduler);
        let enable = characteristic(0xdd30).uuid;
        let telemetry = characteristic(0xdd11).uuid;

        manager.write_characteristic(enable, &[1]).unwrap();
        assert!(manager.is_write_in_flight());
        assert!(matches!(
            manager.write_characteristic(telemetry, &[0; 95]),
            Err(LinkError::WriteInFlight(pending)) if pending == enable
        ));
        assert_eq!(transport.write_count(), 1);

        let events = manager.handle_gatt_event(transport.ack(GattStatus::SUCCESS));
        assert_eq!(
            events,
            vec![LinkEvent::CharacteristicWritten {
                characteristic: enable
            }]
        );
        assert!(!manager.is_write_in_flight());

        manager.write_characteristic(telemetry, &[0; 95]).unwrap();
        assert_eq!(transport.write_count(), 2);
    }

    #[test]
    fn test_failed_write_ack_clears_slot_silently() {
        let (mut manager, transport, scheduler) = manager();
        ready(&mut manager, &scheduler);
        let enable = characteristic(0xdd30).uuid;

        manager.write_characteristic(enable, &[1]).unwrap();
        let events = manager.handle_gatt_event(transport.ack(GattStatus(3)));

        assert!(events.is_empty());
        assert!(!manager.is_write_in_flight());
    }

    #[test]
    fn test_unknown_characteristic_is_dropped() {
        let (mut manager, transport, scheduler) = manager();
        ready(&mut manager, &scheduler);
        let confirm = characteristic(0xdd31).uuid;

        assert!(matches!(
            manager.write_characteristic(confirm, &[1]),
            Err(LinkError::CharacteristicNotFound(_))
        ));
        assert_eq!(transport.write_count(), 0);
        assert!(!manager.is_write_in_flight());
    }

    #[test]
    fn test_unexpected_disconnect_reconnects_once() {
        let (mut manager, transport, scheduler) = manager();
        let connection = ready(&mut manager, &scheduler);

        let events = manager.handle_gatt_event(disconnected(connection));

        assert_eq!(
            events,
            vec![
                LinkEvent::Disconnected {
                    address: ADDRESS.to_string()
                },
                LinkEvent::Connecting {
                    address: ADDRESS.to_string()
                },
            ]
        );
        assert!(transport.calls().contains(&TransportCall::Close(connection)));
        assert_eq!(transport.connect_count(ADDRESS), 2);
        assert_eq!(manager.state(), LinkState::Connecting);
        assert!(manager.characteristics().is_empty());
    }

    #[test]
    fn test_error_status_retries_without_disconnect_event() {
        let (mut manager, transport, _) = manager();
        manager.connect(ADDRESS);
        let connection = transport.last_connection().unwrap();

        let events = manager.handle_gatt_event(status_event(connection, GattStatus::ERROR));
        assert_eq!(
            events,
            vec![LinkEvent::Connecting {
                address: ADDRESS.to_string()
            }]
        );

        let next = transport.last_connection().unwrap();
        assert_ne!(next, connection);
        manager.handle_gatt_event(status_event(next, GattStatus(8)));
        assert_eq!(transport.connect_count(ADDRESS), 3);
    }

    #[test]
    fn test_stale_connection_events_are_ignored() {
        let (mut manager, transport, _) = manager();
        manager.connect(ADDRESS);
        let first = transport.last_connection().unwrap();
        manager.handle_gatt_event(status_event(first, GattStatus::ERROR));

        let events = manager.handle_gatt_event(connected(first));
        assert!(events.is_empty());
        assert_eq!(manager.state(), LinkState::Connecting);
    }

    #[test]
    fn test_backoff_schedules_retry() {
        let (mut manager, transport, scheduler) = manager_with(ReconnectPolicy::CappedExponential {
            initial: Duration::from_millis(500),
            max: Duration::from_secs(2),
        });
        manager.connect(ADDRESS);
        let connection = transport.last_connection().unwrap();

        manager.handle_gatt_event(status_event(connection, GattStatus::ERROR));
        assert_eq!(transport.connect_count(ADDRESS), 1);
        assert_eq!(manager.state(), LinkState::Disconnected);

        let (delay, timer) = scheduler.pop().unwrap();
        assert_eq!(delay, Duration::from_millis(500));
        manager.handle_timer(timer);
        assert_eq!(transport.connect_count(ADDRESS), 2);

        let connection = transport.last_connection().unwrap();
        manager.handle_gatt_event(status_event(connection, GattStatus::ERROR));
        assert_eq!(scheduler.pop().unwrap().0, Duration::from_secs(1));
    }

    #[test]
    fn test_disconnect_cancels_pending_retry() {
        let (mut manager, transport, scheduler) = manager_with(ReconnectPolicy::CappedExponential {
            initial: Duration::from_millis(500),
            max: Duration::from_secs(2),
        });
        manager.connect(ADDRESS);
        let connection = transport.last_connection().unwrap();
        manager.handle_gatt_event(status_event(connection, GattStatus::ERROR));

        assert!(manager.disconnect().is_empty());
        let (_, timer) = scheduler.pop().unwrap();
        manager.handle_timer(timer);

        assert_eq!(transport.connect_count(ADDRESS), 1);
        assert_eq!(manager.address(), None);
    }

    #[test]
    fn test_disconnect_notifies_only_when_connected() {
        let (mut manager, transport, scheduler) = manager();
        manager.connect(ADDRESS);
        assert!(manager.disconnect().is_empty());

        let connection = ready(&mut manager, &scheduler);
        let events = manager.disconnect();
        assert_eq!(
            events,
            vec![LinkEvent::Disconnected {
                address: ADDRESS.to_string()
            }]
        );
        assert!(transport.calls().contains(&TransportCall::Close(connection)));
        assert!(manager.disconnect().is_empty());
    }

    #[test]
    fn test_synchronous_connect_failure_goes_through_scheduler() {
        let (mut manager, transport, scheduler) = manager();
        transport.fail_connects(true);

        manager.connect(ADDRESS);
        assert_eq!(manager.state(), LinkState::Disconnected);
        let (delay, timer) = scheduler.pop().unwrap();
        assert_eq!(delay, Duration::ZERO);

        transport.fail_connects(false);
        manager.handle_timer(timer);
        assert_eq!(manager.state(), LinkState::Connecting);
    }

    #[test]
    fn test_adapter_power_cycle_resumes_address() {
        let (mut manager, transport, scheduler) = manager();
        ready(&mut manager, &scheduler);

        let events = manager.handle_adapter_power(false);
        assert_eq!(
            events,
            vec![
                LinkEvent::Disconnected {
                    address: ADDRESS.to_string()
                },
                LinkEvent::AdapterPowerChanged { available: false },
            ]
        );
        assert_eq!(manager.state(), LinkState::Disconnected);

        let events = manager.handle_adapter_power(true);
        assert_eq!(
            events,
            vec![
                LinkEvent::Connecting {
                    address: ADDRESS.to_string()
                },
                LinkEvent::AdapterPowerChanged { available: true },
            ]
        );
        assert_eq!(transport.connect_count(ADDRESS), 2);
    }

    #[test]
    fn test_adapter_on_after_disconnect_stays_down() {
        let (mut manager, transport, scheduler) = manager();
        ready(&mut manager, &scheduler);
        manager.handle_adapter_power(false);
        manager.disconnect();

        manager.handle_adapter_power(true);
        assert_eq!(transport.connect_count(ADDRESS), 1);
        assert_eq!(manager.state(), LinkState::Disconnected);
    }

    #[test]
    fn test_switching_address_releases_current_link() {
        let (mut manager, transport, scheduler) = manager();
        let connection = ready(&mut manager, &scheduler);

        let events = manager.connect("AA:BB:CC:DD:EE:FF");
        assert_eq!(
            events,
            vec![
                LinkEvent::Disconnected {
                    address: ADDRESS.to_string()
                },
                LinkEvent::Connecting {
                    address: "AA:BB:CC:DD:EE:FF".to_string()
                },
            ]
        );
        assert!(transport.calls().contains(&TransportCall::Close(connection)));
        assert_eq!(manager.address(), Some("AA:BB:CC:DD:EE:FF"));
    }

    #[test]
    fn test_events_reach_registered_listeners() {
        use crate::infrastructure::bluetooth::test_support::EventLog;

        let (mut manager, _, _) = manager();
        let log = Arc::new(EventLog::default());
        manager.register_listener(&log).unwrap();

        manager.connect(ADDRESS);
        assert_eq!(
            log.events(),
            vec![LinkEvent::Connecting {
                address: ADDRESS.to_string()
            }]
        );

        manager.unregister_listener(&log);
        manager.disconnect();
        manager.connect(ADDRESS);
        assert_eq!(log.events().len(), 1);
    }
}
