//! Per-session protocol parameters.
//!
//! Both values are fixed for the lifetime of a session; nothing adapts them
//! at runtime.

use std::time::Duration;

use thiserror::Error;

/// Default window: stop-and-wait.
pub const DEFAULT_WINDOW: u32 = 1;

/// Default retransmission timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(2000);

/// Sweeps per timeout interval when no explicit cadence is configured.
const SWEEPS_PER_TIMEOUT: u32 = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Maximum number of unacknowledged segments in flight.
    pub window: u32,
    /// How long a segment may go unacknowledged before it is resent.
    pub timeout: Duration,
    /// Cadence of the retransmission sweep.  `None` picks a fraction of
    /// `timeout`.
    pub tick: Option<Duration>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            window: DEFAULT_WINDOW,
            timeout: DEFAULT_TIMEOUT,
            tick: None,
        }
    }
}

impl Config {
    pub fn new(window: u32, timeout: Duration) -> Self {
        Self {
            window,
            timeout,
            tick: None,
        }
    }

    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = Some(tick);
        self
    }

    /// Reject parameters the protocol cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window == 0 {
            return Err(ConfigError::ZeroWindow);
        }
        if self.timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout);
        }
        if self.tick.is_some_and(|t| t.is_zero()) {
            return Err(ConfigError::ZeroTick);
        }
        Ok(())
    }

    /// Effective sweep cadence.
    pub fn sweep_interval(&self) -> Duration {
        self.tick.unwrap_or_else(|| {
            (self.timeout / SWEEPS_PER_TIMEOUT).max(Duration::from_millis(1))
        })
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("window must be at least 1 segment")]
    ZeroWindow,
    #[error("retransmission timeout must be non-zero")]
    ZeroTimeout,
    #[error("sweep interval must be non-zero")]
    ZeroTick,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid() {
        assert_eq!(Config::default().validate(), Ok(()));
    }

    #[test]
    fn zero_window_rejected() {
        let c = Config::new(0, Duration::from_secs(1));
        assert_eq!(c.validate(), Err(ConfigError::ZeroWindow));
    }

    #[test]
    fn zero_timeout_rejected() {
        let c = Config::new(4, Duration::ZERO);
        assert_eq!(c.validate(), Err(ConfigError::ZeroTimeout));
    }

    #[test]
    fn zero_tick_rejected() {
        let c = Config::new(4, Duration::from_secs(1)).with_tick(Duration::ZERO);
        assert_eq!(c.validate(), Err(ConfigError::ZeroTick));
    }

    #[test]
    fn sweep_interval_defaults_to_fraction_of_timeout() {
        let c = Config::new(1, Duration::from_millis(1000));
        assert_eq!(c.sweep_interval(), Duration::from_millis(200));

        let c = c.with_tick(Duration::from_millis(50));
        assert_eq!(c.sweep_interval(), Duration::from_millis(50));
    }
}
