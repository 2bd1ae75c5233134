//! Location collaborator seam
//!
//! The platform's location provider sits behind [`FixProducer`]. Its
//! callbacks are posted back to the link service as `FixEvent`s.

use crate::domain::settings::{FixAccuracy, FixRequestSettings};
use anyhow::Result;
use std::time::Duration;

/// Cadence requested from the location provider
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixRequest {
    pub interval: Duration,
    pub min_interval: Duration,
    /// Longest a fix may be held back before delivery
    pub max_delay: Duration,
    pub accuracy: FixAccuracy,
}

impl Default for FixRequest {
    fn default() -> Self {
        Self::from(&FixRequestSettings::default())
    }
}

impl From<&FixRequestSettings> for FixRequest {
    fn from(settings: &FixRequestSettings) -> Self {
        Self {
            interval: Duration::from_millis(settings.interval_ms),
            min_interval: Duration::from_millis(settings.min_interval_ms),
            max_delay: Duration::from_millis(settings.max_delay_ms),
            accuracy: settings.accuracy,
        }
    }
}

pub trait FixProducer: Send {
    /// Start delivering fixes at the requested cadence
    fn request_updates(&mut self, request: &FixRequest) -> Result<()>;

    /// Stop delivering fixes. Safe to call when no request is active.
    fn cancel_updates(&mut self);
}
