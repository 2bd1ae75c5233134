//! Link event fan-out
//!
//! Subscribers are held weakly: dropping the last `Arc` of a listener is
//! enough to stop deliveries, and the dead slot is pruned on the next
//! registration or dispatch. Callers should still unregister on teardown.

use crate::domain::models::CharacteristicInfo;
use crate::infrastructure::bluetooth::connection::LinkError;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use uuid::Uuid;

/// Snapshot handed to subscribers once service discovery completes
#[derive(Debug, Clone, PartialEq)]
pub struct LinkContext {
    pub address: String,
    pub characteristics: Vec<CharacteristicInfo>,
}

/// Events published by the link manager
#[derive(Debug, Clone, PartialEq)]
pub enum LinkEvent {
    Connecting { address: String },
    Connected { address: String },
    SetupComplete(LinkContext),
    Disconnected { address: String },
    CharacteristicWritten { characteristic: Uuid },
    AdapterPowerChanged { available: bool },
}

/// Receives link events. Runs on the link service task, so it must not block;
/// follow-up requests go through a `LinkHandle`, which queues them.
pub trait LinkListener: Send + Sync {
    fn on_link_event(&self, event: &LinkEvent);
}

pub struct ListenerRegistry {
    entries: Mutex<Vec<Weak<dyn LinkListener>>>,
    capacity: usize,
}

impl ListenerRegistry {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            capacity,
        }
    }

    /// Register a listener. Registering the same listener again is a no-op.
    pub fn register<L: LinkListener + 'static>(&self, listener: &Arc<L>) -> Result<(), LinkError> {
        let listener: Arc<dyn LinkListener> = listener.clone();
        let weak = Arc::downgrade(&listener);

        let mut entries = self.lock();
        entries.retain(|entry| entry.strong_count() > 0);

        if entries.iter().any(|entry| entry.ptr_eq(&weak)) {
            tracing::debug!("Listener already registered");
            return Ok(());
        }
        if entries.len() >= self.capacity {
            return Err(LinkError::RegistryFull(self.capacity));
        }

        entries.push(weak);
        Ok(())
    }

    pub fn unregister<L: LinkListener + 'static>(&self, listener: &Arc<L>) {
        let listener: Arc<dyn LinkListener> = listener.clone();
        let weak = Arc::downgrade(&listener);
        self.lock().retain(|entry| !entry.ptr_eq(&weak));
    }

    /// Number of registrations whose listener is still alive
    pub fn len(&self) -> usize {
        self.lock()
            .iter()
            .filter(|entry| entry.strong_count() > 0)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deliver `event` to every live listener.
    ///
    /// The lock is not held while listeners run, so a listener may register
    /// or unregister from inside its callback. One removed mid-dispatch is
    /// skipped if it has not been reached yet.
    pub fn dispatch(&self, event: &LinkEvent) {
        let snapshot: Vec<Weak<dyn LinkListener>> = {
            let mut entries = self.lock();
            entries.retain(|entry| entry.strong_count() > 0);
            entries.clone()
        };

        for weak in snapshot {
            if !self.lock().iter().any(|entry| entry.ptr_eq(&weak)) {
                continue;
            }
            if let Some(listener) = weak.upgrade() {
                listener.on_link_event(event);
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Weak<dyn LinkListener>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for ListenerRegistry {
    fn default() -> Self {
        Self::new(16)
    }
}
