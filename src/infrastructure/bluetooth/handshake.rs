//! GPS handshake
//!
//! Once services are discovered the camera expects `0x01` written to the
//! enable characteristic, then `0x01` to the confirm characteristic. Only
//! after both writes are acknowledged does it accept location packets on
//! the telemetry characteristic.
//!
//! ```text
//! Idle ──setup complete──▶ AwaitingEnableAck ──enable ack──▶ AwaitingConfirmAck
//!  ▲                                                              │
//!  └──────────── disconnect (any state) ◀── Reporting ◀──confirm ack
//! ```

use crate::domain::models::{FixEvent, GeoFix, HandshakeState, NotificationKind};
use crate::infrastructure::bluetooth::connection::LinkWriter;
use crate::infrastructure::bluetooth::listeners::LinkEvent;
use crate::infrastructure::bluetooth::packet::LocationPacket;
use crate::infrastructure::bluetooth::protocol::{
    find_characteristic, CharacteristicRole, ENABLE_GPS_COMMAND,
};
use crate::infrastructure::location::{FixProducer, FixRequest};
use crate::infrastructure::notifier::Notifier;
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

pub struct GpsHandshakeSequencer<F: FixProducer> {
    producer: F,
    request: FixRequest,
    state: HandshakeState,
    /// Characteristic whose ack advances the current `Awaiting*` state
    awaiting: Option<Uuid>,
    subscribed: bool,
}

impl<F: FixProducer> GpsHandshakeSequencer<F> {
    pub fn new(producer: F, request: FixRequest) -> Self {
        Self {
            producer,
            request,
            state: HandshakeState::Idle,
            awaiting: None,
            subscribed: false,
        }
    }

    pub fn state(&self) -> HandshakeState {
        self.state
    }

    pub fn is_reporting(&self) -> bool {
        self.subscribed
    }

    pub fn on_link_event(
        &mut self,
        event: &LinkEvent,
        writer: &mut impl LinkWriter,
        notifier: &Notifier,
    ) {
        match event {
            LinkEvent::SetupComplete(_) => {
                if self.state != HandshakeState::Idle {
                    debug!("Setup completed again in {:?}; restarting handshake", self.state);
                    self.stop();
                }
                self.send_command(
                    CharacteristicRole::Enable,
                    HandshakeState::AwaitingEnableAck,
                    writer,
                    notifier,
                );
            }
            LinkEvent::CharacteristicWritten { characteristic } => {
                self.on_write_ack(*characteristic, writer, notifier)
            }
            LinkEvent::Disconnected { .. } => self.stop(),
            _ => {}
        }
    }

    pub fn on_fix_event(&mut self, event: FixEvent, writer: &mut impl LinkWriter, notifier: &Notifier) {
        if self.state != HandshakeState::Reporting {
            trace!("Dropping fix event outside reporting: {:?}", event);
            return;
        }

        match event {
            FixEvent::AvailabilityChanged { available: true } => {
                info!("GPS signal found");
                notifier.notify(NotificationKind::GpsSignalFound);
            }
            FixEvent::AvailabilityChanged { available: false } => {
                info!("GPS signal lost");
                notifier.notify(NotificationKind::GpsSignalLost);
            }
            FixEvent::Ready(fix) => self.send_fix(&fix, writer),
        }
    }

    /// Cancel the fix subscription and return to `Idle`
    pub fn stop(&mut self) {
        if self.subscribed {
            info!("Stopping location updates");
            self.producer.cancel_updates();
            self.subscribed = false;
        }
        if self.state != HandshakeState::Idle {
            debug!("Handshake reset from {:?}", self.state);
        }
        self.state = HandshakeState::Idle;
        self.awaiting = None;
    }

    fn on_write_ack(&mut self, characteristic: Uuid, writer: &mut impl LinkWriter, notifier: &Notifier) {
        if self.awaiting != Some(characteristic) {
            trace!("Write ack for {} in {:?}", characteristic, self.state);
            return;
        }

        match self.state {
            HandshakeState::AwaitingEnableAck => self.send_command(
                CharacteristicRole::Confirm,
                HandshakeState::AwaitingConfirmAck,
                writer,
                notifier,
            ),
            HandshakeState::AwaitingConfirmAck => self.start_reporting(notifier),
            _ => {}
        }
    }

    /// Write the enable command to `role` and wait for its ack in `next`
    fn send_command(
        &mut self,
        role: CharacteristicRole,
        next: HandshakeState,
        writer: &mut impl LinkWriter,
        notifier: &Notifier,
    ) {
        let Some(target) = find_characteristic(writer.characteristics(), role).map(|c| c.uuid)
        else {
            warn!(
                "GPS enable command: cannot find characteristic containing {}",
                role.fragment()
            );
            notifier.notify(NotificationKind::IncompatibleDevice);
            self.state = HandshakeState::Idle;
            self.awaiting = None;
            return;
        };

        debug!("GPS enable command: {} ({})", target, role);
        match writer.write_characteristic(target, &ENABLE_GPS_COMMAND) {
            Ok(()) => {
                self.state = next;
                self.awaiting = Some(target);
            }
            // Stalls until the next disconnect resets the handshake
            Err(e) => error!("GPS enable command to {} failed: {}", target, e),
        }
    }

    fn start_reporting(&mut self, notifier: &Notifier) {
        self.state = HandshakeState::Reporting;
        self.awaiting = None;

        if self.subscribed {
            debug!("Already reporting, ignoring request");
            return;
        }

        match self.producer.request_updates(&self.request) {
            Ok(()) => {
                info!(
                    "Requesting location updates every {:?} ({:?} accuracy)",
                    self.request.interval, self.request.accuracy
                );
                self.subscribed = true;
                notifier.notify(NotificationKind::GpsEnabled);
            }
            Err(e) => error!("Failed to request location updates: {:#}", e),
        }
    }

    fn send_fix(&mut self, fix: &GeoFix, writer: &mut impl LinkWriter) {
        let Some(telemetry) =
            find_characteristic(writer.characteristics(), CharacteristicRole::Telemetry)
                .map(|c| c.uuid)
        else {
            warn!(
                "Dropping fix: no characteristic containing {}",
                CharacteristicRole::Telemetry.fragment()
            );
            return;
        };

        let packet = match LocationPacket::from_fix(fix) {
            Ok(packet) => packet,
            Err(e) => {
                warn!("Dropping fix: {}", e);
                return;
            }
        };

        match writer.write_characteristic(telemetry, packet.as_ref()) {
            Ok(()) => debug!(
                "Writing to {}: ({:.7}, {:.7})",
                telemetry, fix.latitude, fix.longitude
            ),
            Err(e) => warn!("Dropping fix: {}", e),
        }
    }
}
