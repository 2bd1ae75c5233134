//! Link Service Module
//!
//! One tokio task owns the [`LinkManager`] and the [`GpsHandshakeSequencer`]
//! and processes [`LinkCommand`]s strictly in arrival order. Platform
//! callbacks, fix events, caller requests and timers all funnel into the
//! same queue; [`LinkHandle`] is how other contexts reach it.

use crate::domain::models::{AppEvent, FixEvent, LinkState, NotificationKind};
use crate::domain::settings::Settings;
use crate::infrastructure::bluetooth::{
    connection::{LinkError, LinkManager, LinkTimer, Scheduler},
    handshake::GpsHandshakeSequencer,
    listeners::{LinkEvent, LinkListener, ListenerRegistry},
    retry::ReconnectPolicy,
    transport::{GattEvent, GattTransport},
};
use crate::infrastructure::location::{FixProducer, FixRequest};
use crate::infrastructure::notifier::Notifier;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub enum LinkCommand {
    Connect {
        address: String,
        name: Option<String>,
    },
    Disconnect,
    Gatt(GattEvent),
    AdapterPower(bool),
    Fix(FixEvent),
    Timer(LinkTimer),
    Shutdown,
}

/// Delivers timers back into the command queue after a tokio sleep
pub struct TokioScheduler {
    commands: mpsc::WeakUnboundedSender<LinkCommand>,
}

impl TokioScheduler {
    pub fn new(commands: &mpsc::UnboundedSender<LinkCommand>) -> Self {
        Self {
            commands: commands.downgrade(),
        }
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&mut self, delay: Duration, timer: LinkTimer) {
        let commands = self.commands.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(commands) = commands.upgrade() {
                let _ = commands.send(LinkCommand::Timer(timer));
            }
        });
    }
}

/// Link manager, handshake and notifier wired together
pub struct LinkCore<T: GattTransport, S: Scheduler, F: FixProducer> {
    manager: LinkManager<T, S>,
    sequencer: GpsHandshakeSequencer<F>,
    notifier: Notifier,
    published: LinkState,
}

impl<T: GattTransport, S: Scheduler, F: FixProducer> LinkCore<T, S, F> {
    pub fn new(
        manager: LinkManager<T, S>,
        sequencer: GpsHandshakeSequencer<F>,
        notifier: Notifier,
    ) -> Self {
        Self {
            manager,
            sequencer,
            notifier,
            published: LinkState::Disconnected,
        }
    }

    pub fn manager(&self) -> &LinkManager<T, S> {
        &self.manager
    }

    pub fn sequencer(&self) -> &GpsHandshakeSequencer<F> {
        &self.sequencer
    }

    /// Process one command. Breaks once the service should stop.
    pub fn handle(&mut self, command: LinkCommand) -> ControlFlow<()> {
        let events = match command {
            LinkCommand::Connect { address, name } => {
                // The old link's teardown is reported under its own name
                if self.manager.address().is_some_and(|current| current != address) {
                    let released = self.manager.disconnect();
                    self.dispatch(released);
                }
                self.notifier.set_device(name.as_deref(), &address);
                self.manager.connect(&address)
            }
            LinkCommand::Disconnect => {
                let events = self.manager.disconnect();
                self.sequencer.stop();
                events
            }
            LinkCommand::Gatt(event) => self.manager.handle_gatt_event(event),
            LinkCommand::AdapterPower(powered) => self.manager.handle_adapter_power(powered),
            LinkCommand::Fix(event) => {
                self.sequencer
                    .on_fix_event(event, &mut self.manager, &self.notifier);
                Vec::new()
            }
            LinkCommand::Timer(timer) => self.manager.handle_timer(timer),
            LinkCommand::Shutdown => {
                info!("Shutting down link service");
                let events = self.manager.disconnect();
                self.dispatch(events);
                self.sequencer.stop();
                return ControlFlow::Break(());
            }
        };

        self.dispatch(events);
        ControlFlow::Continue(())
    }

    fn dispatch(&mut self, events: Vec<LinkEvent>) {
        for event in events {
            match &event {
                LinkEvent::Connecting { .. } => self.notifier.notify(NotificationKind::LinkConnecting),
                LinkEvent::Connected { .. } => self.notifier.notify(NotificationKind::LinkConnected),
                LinkEvent::SetupComplete(_) => self.notifier.notify(NotificationKind::ServicesReady),
                LinkEvent::Disconnected { .. } => {
                    self.notifier.notify(NotificationKind::LinkDisconnected)
                }
                LinkEvent::AdapterPowerChanged { available: false } => {
                    self.sequencer.stop();
                    self.notifier
                        .notify(NotificationKind::BluetoothUnavailable);
                }
                LinkEvent::AdapterPowerChanged { available: true } => {
                    if self.manager.state() == LinkState::Disconnected {
                        self.notifier.notify(NotificationKind::LinkDisconnected);
                    }
                }
                LinkEvent::CharacteristicWritten { .. } => {}
            }

            self.sequencer
                .on_link_event(&event, &mut self.manager, &self.notifier);
        }

        let state = self.manager.state();
        if state != self.published {
            debug!("Link state {:?} -> {:?}", self.published, state);
            self.published = state;
            self.notifier.connection_status(state);
        }
    }
}

/// Cloneable entry point to a running link service
#[derive(Clone)]
pub struct LinkHandle {
    commands: mpsc::UnboundedSender<LinkCommand>,
    listeners: Arc<ListenerRegistry>,
}

impl LinkHandle {
    /// Connect to `address`; `name` is shown in notifications
    pub fn connect(&self, address: &str, name: Option<&str>) -> Result<(), LinkError> {
        self.send(LinkCommand::Connect {
            address: address.to_string(),
            name: name.map(str::to_string),
        })
    }

    pub fn disconnect(&self) -> Result<(), LinkError> {
        self.send(LinkCommand::Disconnect)
    }

    /// Forward a platform GATT callback
    pub fn gatt_event(&self, event: GattEvent) -> Result<(), LinkError> {
        self.send(LinkCommand::Gatt(event))
    }

    pub fn adapter_power(&self, powered: bool) -> Result<(), LinkError> {
        self.send(LinkCommand::AdapterPower(powered))
    }

    /// Forward a location provider callback
    pub fn fix_event(&self, event: FixEvent) -> Result<(), LinkError> {
        self.send(LinkCommand::Fix(event))
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

    fn send(&self, command: LinkCommand) -> Result<(), LinkError> {
        self.commands
            .send(command)
            .map_err(|_| LinkError::ServiceStopped)
    }
}

/// Running link service task
pub struct LinkService {
    handle: LinkHandle,
    task: JoinHandle<()>,
}

impl LinkService {
    /// Spawn the service on the current tokio runtime
    pub fn spawn<T, F>(
        transport: T,
        producer: F,
        settings: &Settings,
        event_sender: mpsc::UnboundedSender<AppEvent>,
    ) -> Self
    where
        T: GattTransport + 'static,
        F: FixProducer + 'static,
    {
        let (commands, mut command_rx) = mpsc::unbounded_channel();
        let listeners = Arc::new(ListenerRegistry::new(settings.link.max_listeners));

        let manager = LinkManager::new(
            transport,
            TokioScheduler::new(&commands),
            ReconnectPolicy::from(&settings.link.reconnect),
            Duration::from_millis(settings.link.settle_delay_ms),
            listeners.clone(),
        );
        let sequencer =
            GpsHandshakeSequencer::new(producer, FixRequest::from(&settings.fix_request));
        let mut core = LinkCore::new(manager, sequencer, Notifier::new(event_sender));

        let task = tokio::spawn(async move {
            info!("Link service started");
            while let Some(command) = command_rx.recv().await {
                if core.handle(command).is_break() {
                    break;
                }
            }
            info!("Link service stopped");
        });

        Self {
            handle: LinkHandle {
                commands,
                listeners,
            },
            task,
        }
    }

    pub fn handle(&self) -> LinkHandle {
        self.handle.clone()
    }

    /// Release the link and wait for the service task to finish
    pub async fn shutdown(self) {
        let _ = self.handle.send(LinkCommand::Shutdown);
        if let Err(e) = self.task.await {
            tracing::error!("Link service task failed: {}", e);
        }
    }
}
