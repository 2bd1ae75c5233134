use crate::domain::settings::{ReconnectSettings, ReconnectStrategy};
use std::time::Duration;

/// How long to wait before reconnect attempt number `attempt` (1-based)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReconnectPolicy {
    /// No backoff and no attempt limit
    #[default]
    Immediate,
    CappedExponential { initial: Duration, max: Duration },
}

impl ReconnectPolicy {
    pub fn delay_for(&self, attempt: u32) -> Duration {
        match self {
            Self::Immediate => Duration::ZERO,
            Self::CappedExponential { initial, max } => {
                let exponent = attempt.saturating_sub(1).min(31);
                initial
                    .checked_mul(1u32 << exponent)
                    .map_or(*max, |delay| delay.min(*max))
            }
        }
    }
}

impl From<&ReconnectSettings> for ReconnectPolicy {
    fn from(settings: &ReconnectSettings) -> Self {
        match settings.strategy {
            ReconnectStrategy::Immediate => Self::Immediate,
            ReconnectStrategy::Exponential => Self::CappedExponential {
                initial: Duration::from_millis(settings.initial_delay_ms),
                max: Duration::from_millis(settings.max_delay_ms),
            },
        }
    }
}
