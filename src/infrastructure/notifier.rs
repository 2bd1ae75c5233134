use crate::domain::models::{AppEvent, LinkState, Notification, NotificationKind};
use tokio::sync::mpsc;
use tracing::debug;

/// Publishes user-facing notifications for the current peripheral
#[derive(Debug, Clone)]
pub struct Notifier {
    event_sender: mpsc::UnboundedSender<AppEvent>,
    device: String,
}

impl Notifier {
    pub fn new(event_sender: mpsc::UnboundedSender<AppEvent>) -> Self {
        Self {
            event_sender,
            device: String::new(),
        }
    }

    /// Name carried by subsequent notifications; an empty name falls back to `address`
    pub fn set_device(&mut self, name: Option<&str>, address: &str) {
        self.device = match name {
            Some(name) if !name.trim().is_empty() => name.to_string(),
            _ => address.to_string(),
        };
    }

    pub fn notify(&self, kind: NotificationKind) {
        debug!("Notification {:?} for {}", kind, self.device);
        let _ = self.event_sender.send(AppEvent::Notification(Notification {
            kind,
            device: self.device.clone(),
        }));
    }

    pub fn connection_status(&self, state: LinkState) {
        let _ = self.event_sender.send(AppEvent::ConnectionStatus(state));
    }
}
