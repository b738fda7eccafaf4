use serde_json::Value;
use std::time::Duration;

use super::Priority;
use crate::codec;

/// Scheduling request - immutable submission data from a producer
#[derive(Debug, Clone)]
pub struct ScheduleRequest {
    /// Name of the registered handler to invoke
    pub job_name: String,

    /// Opaque arguments, passed through to the handler verbatim
    pub args: Value,

    /// Priority tier (default Normal)
    pub priority: Priority,

    /// Collapse into an existing pending job with the same fingerprint
    pub unique: bool,

    /// Delay before the first eligible run (zero = immediate)
    pub delay: Duration,

    /// Recurrence interval; set for repeating jobs
    pub recurring: Option<Duration>,
}

impl ScheduleRequest {
    /// Create a new request with defaults
    pub fn new(job_name: impl Into<String>, args: Value) -> Self {
        Self {
            job_name: job_name.into(),
            args,
            priority: Priority::default(),
            unique: false,
            delay: Duration::ZERO,
            recurring: None,
        }
    }

    /// Set the priority tier
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Set the initial delay
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Request fingerprint-deduplicated scheduling
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Make the job recurring at the given interval
    pub fn with_recurring(mut self, interval: Duration) -> Self {
        self.recurring = Some(interval);
        self
    }

    /// Content fingerprint of this request's job name and arguments
    pub fn fingerprint(&self) -> String {
        codec::fingerprint(&self.job_name, &self.args)
    }
}
