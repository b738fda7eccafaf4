//! Compatibility shims preserving the pre-queue dispatch call conventions.
//!
//! Every method is pure delegation: translate the old positional convention
//! into a call on [`PriorityQueue`] and return its result. No business logic
//! lives here, and the queue is authoritative on behavior. These adapters
//! exist so producer call sites migrate without edits; once producers call
//! the queue directly, delete this module first.

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use crate::error::QueueResult;
use crate::queue::PriorityQueue;
use crate::types::{JobHandle, Priority};

/// Adapter over the old timestamp-first dispatch helpers
pub struct LegacyScheduler {
    queue: Arc<PriorityQueue>,
}

impl LegacyScheduler {
    pub fn new(queue: Arc<PriorityQueue>) -> Self {
        Self { queue }
    }

    /// Old "fire an async action now" helper: immediate, Normal priority
    pub async fn enqueue_async(&self, hook: &str, args: Value) -> QueueResult<JobHandle> {
        self.queue
            .schedule(hook, args, Priority::Normal, Duration::ZERO)
            .await
    }

    /// Old single-event helper, timestamp-first argument order preserved.
    ///
    /// A timestamp in the past schedules for immediate execution.
    pub async fn schedule_single(
        &self,
        timestamp: DateTime<Utc>,
        hook: &str,
        args: Value,
    ) -> QueueResult<JobHandle> {
        let delay = (timestamp - Utc::now()).to_std().unwrap_or(Duration::ZERO);
        self.queue.schedule(hook, args, Priority::Normal, delay).await
    }

    /// Old recurring-event helper, interval-first argument order preserved.
    /// Recurring work ran on the housekeeping cadence: Maintenance priority.
    pub async fn schedule_recurring_interval(
        &self,
        interval_secs: u64,
        hook: &str,
        args: Value,
    ) -> QueueResult<JobHandle> {
        self.queue
            .schedule_recurring(hook, args, Duration::from_secs(interval_secs), Priority::Maintenance)
            .await
    }

    /// Old unschedule helper; clears pending jobs in the default lane
    pub async fn unschedule(&self, hook: &str, args: &Value) -> QueueResult<()> {
        self.queue.unschedule(hook, args, Priority::Normal).await
    }
}
