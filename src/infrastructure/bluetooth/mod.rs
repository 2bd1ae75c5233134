//! Bluetooth Module
//!
//! Keeps a GATT link to the camera alive and feeds it location packets.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                       LinkService                        │
//! │   (tokio task - commands processed in arrival order)     │
//! └──────────────────────┬───────────────────────────────────┘
//!                        │
//!          ┌─────────────┼──────────────┐
//!          │             │              │
//!          ▼             ▼              ▼
//! ┌──────────────┐ ┌────────────┐ ┌────────────┐
//! │ LinkManager  │ │ Handshake  │ │  Packet    │
//! │              │ │            │ │            │
//! │ - connect    │ │ - enable   │ │ - 95-byte  │
//! │ - reconnect  │ │ - confirm  │ │   location │
//! │ - write slot │ │ - fixes    │ │   payload  │
//! └──────┬───────┘ └────────────┘ └────────────┘
//!        │
//!        ▼
//!  GattTransport (platform BLE stack)
//! ```
//!
//! ## Modules
//!
//! - [`connection`] - Link lifecycle, settle delay, reconnect and single-flight writes
//! - [`handshake`] - Enable/confirm sequence and fix forwarding
//! - [`listeners`] - Link event fan-out to registered listeners
//! - [`packet`] - Location packet encoding
//! - [`protocol`] - Vendor characteristic identifiers and GATT status codes
//! - [`retry`] - Reconnect policy
//! - [`service`] - Actor task and handle
//! - [`transport`] - Platform GATT seam

pub mod connection;
pub mod handshake;
pub mod listeners;
pub mod packet;
pub mod protocol;
pub mod retry;
pub mod service;
pub mod transport;

#[cfg(test)]
pub(crate) mod test_support;

pub use service::{LinkHandle, LinkService};
