//! Dead letter store: durable, queryable record of terminally-failed jobs.
//!
//! Entries are append-only from the core's perspective. The single permitted
//! mutation after creation is the replay stamp, which keeps the audit trail
//! intact while preventing accidental double-replays from looking identical
//! to fresh failures.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{QueueError, QueueResult};
use crate::types::{EntryId, JobEnvelope, Priority};

/// Record of a job that exhausted its retries or failed permanently
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetterEntry {
    pub entry_id: EntryId,

    /// Hook name the job was scheduled under
    pub job_name: String,

    /// Unwrapped producer arguments, as the handler saw them
    pub original_args: Value,

    pub priority: Priority,

    /// Attempts consumed before the job landed here
    pub attempts_made: u32,

    pub last_error: String,

    pub failed_at: DateTime<Utc>,

    /// The last envelope as delivered, kept for replay
    pub envelope_snapshot: JobEnvelope,

    /// Set once the entry has been replayed; entries are never deleted on
    /// replay
    pub replayed_at: Option<DateTime<Utc>>,
}

impl DeadLetterEntry {
    /// Build an entry from the final envelope of a failed job
    pub fn from_envelope(job_name: &str, envelope: JobEnvelope, error: &str) -> Self {
        Self {
            entry_id: EntryId::new(),
            job_name: job_name.to_string(),
            original_args: envelope.args.clone(),
            priority: envelope.meta.priority,
            attempts_made: envelope.meta.attempt,
            last_error: error.to_string(),
            failed_at: Utc::now(),
            envelope_snapshot: envelope,
            replayed_at: None,
        }
    }

    pub fn is_replayed(&self) -> bool {
        self.replayed_at.is_some()
    }
}

/// Query filter for listing entries
#[derive(Debug, Clone, Default)]
pub struct DeadLetterFilter {
    pub job_name: Option<String>,
    pub failed_after: Option<DateTime<Utc>>,
    pub failed_before: Option<DateTime<Utc>>,
    /// Include entries that were already replayed (default: only live ones)
    pub include_replayed: bool,
}

impl DeadLetterFilter {
    /// Match every entry, replayed or not
    pub fn all() -> Self {
        Self {
            include_replayed: true,
            ..Self::default()
        }
    }

    /// Match live entries for one job
    pub fn for_job(job_name: impl Into<String>) -> Self {
        Self {
            job_name: Some(job_name.into()),
            ..Self::default()
        }
    }

    /// Whether an entry passes this filter
    pub fn matches(&self, entry: &DeadLetterEntry) -> bool {
        if !self.include_replayed && entry.is_replayed() {
            return false;
        }
        if let Some(ref job_name) = self.job_name {
            if entry.job_name != *job_name {
                return false;
            }
        }
        if let Some(after) = self.failed_after {
            if entry.failed_at < after {
                return false;
            }
        }
        if let Some(before) = self.failed_before {
            if entry.failed_at >= before {
                return false;
            }
        }
        true
    }
}

/// Storage port for dead-lettered jobs
#[async_trait]
pub trait DeadLetterStore: Send + Sync {
    /// Persist an entry. Append-only: recording never overwrites prior
    /// entries, and concurrent appends must not lose any.
    async fn record(&self, entry: DeadLetterEntry) -> QueueResult<()>;

    /// Fetch one entry by ID
    async fn get(&self, entry_id: &EntryId) -> QueueResult<Option<DeadLetterEntry>>;

    /// List entries matching the filter, oldest failure first
    async fn list(&self, filter: &DeadLetterFilter) -> QueueResult<Vec<DeadLetterEntry>>;

    /// Stamp an entry as replayed
    async fn mark_replayed(&self, entry_id: &EntryId, at: DateTime<Utc>) -> QueueResult<()>;

    /// Remove entries that failed before the cutoff, returning how many were
    /// purged. Operator-driven retention; the core never calls this.
    async fn purge_before(&self, cutoff: DateTime<Utc>) -> QueueResult<usize>;
}

/// In-memory store for tests and development
#[cfg(feature = "memory")]
#[derive(Default)]
pub struct MemoryDeadLetterStore {
    entries: parking_lot::RwLock<Vec<DeadLetterEntry>>,
}

#[cfg(feature = "memory")]
impl MemoryDeadLetterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries, replayed included
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[cfg(feature = "memory")]
#[async_trait]
impl DeadLetterStore for MemoryDeadLetterStore {
    async fn record(&self, entry: DeadLetterEntry) -> QueueResult<()> {
        self.entries.write().push(entry);
        Ok(())
    }

    async fn get(&self, entry_id: &EntryId) -> QueueResult<Option<DeadLetterEntry>> {
        Ok(self
            .entries
            .read()
            .iter()
            .find(|entry| entry.entry_id == *entry_id)
            .cloned())
    }

    async fn list(&self, filter: &DeadLetterFilter) -> QueueResult<Vec<DeadLetterEntry>> {
        let mut matched: Vec<DeadLetterEntry> = self
            .entries
            .read()
            .iter()
            .filter(|entry| filter.matches(entry))
            .cloned()
            .collect();
        matched.sort_by_key(|entry| entry.failed_at);
        Ok(matched)
    }

    async fn mark_replayed(&self, entry_id: &EntryId, at: DateTime<Utc>) -> QueueResult<()> {
        let mut entries = self.entries.write();
        let entry = entries
            .iter_mut()
            .find(|entry| entry.entry_id == *entry_id)
            .ok_or_else(|| QueueError::EntryNotFound(entry_id.to_string()))?;
        entry.replayed_at = Some(at);
        Ok(())
    }

    async fn purge_before(&self, cutoff: DateTime<Utc>) -> QueueResult<usize> {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|entry| entry.failed_at >= cutoff);
        Ok(before - entries.len())
    }
}
