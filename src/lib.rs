//! AlphaSync
//!
//! Streams phone GPS fixes to a Sony camera over Bluetooth LE: keeps the
//! link up, runs the camera's GPS enable handshake and writes a location
//! packet for every fix.

pub mod domain;
pub mod infrastructure;

pub use domain::settings::{Settings, SettingsService};
pub use infrastructure::bluetooth::{LinkHandle, LinkService};
pub use infrastructure::logging::init_logger;
