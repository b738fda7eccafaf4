//! Advisory per-tier dispatch counters over fixed one-minute windows.
//!
//! The governor never gates scheduling: producers are always accepted, and
//! drain pacing is configured on the runner's execution groups. What the
//! governor provides is a shared, worker-safe view of how fast each lane is
//! actually dispatching, so saturation can be logged and charted.

use parking_lot::Mutex;
use std::time::{Duration, Instant};

use crate::types::Priority;

/// Fixed counting window
pub const WINDOW: Duration = Duration::from_secs(60);

#[derive(Debug)]
struct TierWindow {
    started: Instant,
    count: u64,
}

/// Point-in-time view of one tier's counter, for dashboards
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateSnapshot {
    pub priority: Priority,
    pub dispatched: u64,
    pub limit: u32,
}

/// Per-priority dispatch counter with atomic increment semantics.
///
/// The only mutable state the queue core owns; every other collaborator is
/// an injected port. Counters roll over to a fresh window once the window
/// length elapses - fixed windows, since the numbers are advisory.
pub struct RateGovernor {
    window: Duration,
    tiers: [Mutex<TierWindow>; 5],
}

impl RateGovernor {
    /// Create a governor with the standard one-minute window
    pub fn new() -> Self {
        Self::with_window(WINDOW)
    }

    /// Create a governor with a custom window length
    pub fn with_window(window: Duration) -> Self {
        Self {
            window,
            tiers: std::array::from_fn(|_| {
                Mutex::new(TierWindow {
                    started: Instant::now(),
                    count: 0,
                })
            }),
        }
    }

    fn tier(&self, priority: Priority) -> &Mutex<TierWindow> {
        &self.tiers[(priority.as_u8() - 1) as usize]
    }

    /// Count one dispatch for the tier, returning the count within the
    /// active window.
    pub fn record_dispatch(&self, priority: Priority) -> u64 {
        let mut tier = self.tier(priority).lock();
        if tier.started.elapsed() >= self.window {
            tier.started = Instant::now();
            tier.count = 0;
        }
        tier.count += 1;
        if tier.count == u64::from(priority.rate_limit()) + 1 {
            tracing::warn!(
                priority = %priority,
                limit = priority.rate_limit(),
                "lane exceeded its advisory dispatch ceiling for this window"
            );
        }
        tier.count
    }

    /// Dispatches counted for the tier in the active window
    pub fn current_rate(&self, priority: Priority) -> u64 {
        let tier = self.tier(priority).lock();
        if tier.started.elapsed() >= self.window {
            0
        } else {
            tier.count
        }
    }

    /// Configured ceiling for the tier, per window
    pub fn limit_for(&self, priority: Priority) -> u32 {
        priority.rate_limit()
    }

    /// Whether the tier has reached its ceiling in the active window
    pub fn is_saturated(&self, priority: Priority) -> bool {
        self.current_rate(priority) >= u64::from(priority.rate_limit())
    }

    /// Snapshot of all tiers, most urgent first
    pub fn snapshot(&self) -> Vec<RateSnapshot> {
        Priority::all()
            .iter()
            .map(|&priority| RateSnapshot {
                priority,
                dispatched: self.current_rate(priority),
                limit: priority.rate_limit(),
            })
            .collect()
    }
}

impl Default for RateGovernor {
    fn default() -> Self {
        Self::new()
    }
}
