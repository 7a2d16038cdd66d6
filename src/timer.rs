//! Timeout-driven retransmission.
//!
//! An external ticker calls [`crate::registry::Registry::run_periodic_sweep`]
//! on a fixed cadence.  Every unacknowledged segment whose last transmission
//! is at least one timeout old is resent verbatim and restamped.
//!
//! The timeout is the session's fixed configuration value: there is no RTT
//! estimation, no exponential back-off and no retry limit.

use std::time::Instant;

use tokio::time::{interval, Interval, MissedTickBehavior};

use crate::conduit::Conduit;
use crate::config::Config;
use crate::session::Session;

impl<C: Conduit> Session<C> {
    /// Resend every buffered segment whose timeout has elapsed at `now`.
    ///
    /// Returns the number of segments resent.
    pub(crate) fn retransmit_due(&mut self, now: Instant) -> usize {
        let timeout = self.timeout;
        let mut resent = 0;
        for (seqno, entry) in self.send_buffer.iter_mut() {
            if now.saturating_duration_since(entry.stamp) < timeout {
                continue;
            }
            log::debug!("[sweep] → RETX seq={seqno}");
            if let Err(e) = self.conduit.send_framed(&entry.item) {
                log::warn!("[sweep] resend of seq={seqno} failed: {e}");
            }
            entry.stamp = now;
            resent += 1;
        }
        resent
    }
}

/// Ticker for the retransmission sweep at `config`'s cadence.
///
/// Missed ticks are delayed rather than bursted; one late sweep already
/// catches every overdue segment.
pub fn sweep_ticker(config: &Config) -> Interval {
    let mut ticker = interval(config.sweep_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}
