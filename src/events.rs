use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{EntryId, JobHandle, Priority};

/// Minimal stable event protocol for structured observability
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum QueueEvent {
    /// A job was handed to the runner
    Scheduled {
        handle: JobHandle,
        job_name: String,
        priority: Priority,
        run_at: DateTime<Utc>,
        at: DateTime<Utc>,
    },

    /// A unique scheduling request collapsed into an existing pending job
    Deduplicated {
        job_name: String,
        fingerprint: String,
        at: DateTime<Utc>,
    },

    /// A failed job was rescheduled with backoff
    RetryScheduled {
        handle: JobHandle,
        job_name: String,
        attempt: u32,
        retry_at: DateTime<Utc>,
        at: DateTime<Utc>,
    },

    /// A job landed in the dead letter store
    DeadLettered {
        entry_id: EntryId,
        job_name: String,
        attempts_made: u32,
        at: DateTime<Utc>,
    },

    /// A dead letter entry was rescheduled
    Replayed {
        entry_id: EntryId,
        handle: JobHandle,
        job_name: String,
        at: DateTime<Utc>,
    },

    /// Pending jobs were removed by fingerprint
    Unscheduled {
        job_name: String,
        at: DateTime<Utc>,
    },
}

impl QueueEvent {
    /// Get event type name as string
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::Scheduled { .. } => "scheduled",
            Self::Deduplicated { .. } => "deduplicated",
            Self::RetryScheduled { .. } => "retry_scheduled",
            Self::DeadLettered { .. } => "dead_lettered",
            Self::Replayed { .. } => "replayed",
            Self::Unscheduled { .. } => "unscheduled",
        }
    }

    /// Get the job name from any event
    pub fn job_name(&self) -> &str {
        match self {
            Self::Scheduled { job_name, .. } => job_name,
            Self::Deduplicated { job_name, .. } => job_name,
            Self::RetryScheduled { job_name, .. } => job_name,
            Self::DeadLettered { job_name, .. } => job_name,
            Self::Replayed { job_name, .. } => job_name,
            Self::Unscheduled { job_name, .. } => job_name,
        }
    }

    /// Get the timestamp from any event
    pub fn timestamp(&self) -> &DateTime<Utc> {
        match self {
            Self::Scheduled { at, .. } => at,
            Self::Deduplicated { at, .. } => at,
            Self::RetryScheduled { at, .. } => at,
            Self::DeadLettered { at, .. } => at,
            Self::Replayed { at, .. } => at,
            Self::Unscheduled { at, .. } => at,
        }
    }
}
