//! Task runner port: the contract the queue core requires from the external,
//! persistent, at-least-once execution backend.
//!
//! The core never runs its own scheduler loop. It hands every job to the
//! runner with a priority-derived execution group, and the runner later
//! invokes the registered handler for the hook when the job is due. Any
//! backend with persistent, multi-worker-safe execution satisfies this trait.
//!
//! Dedup identity is a content `fingerprint` computed by the core from the
//! job name and the unwrapped arguments. Matching raw payloads would never
//! dedup - envelopes embed their build timestamp - so the fingerprint stands
//! in for "same job name + args" everywhere the contract matches on
//! arguments. The runner treats it as an opaque key.

#[cfg(feature = "memory")]
pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::error::RunnerResult;
use crate::types::JobHandle;

/// Outcome of a schedule call.
///
/// `deduplicated` is set when an existing pending task with the same
/// fingerprint absorbed the request; `handle` then refers to that task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleAck {
    pub handle: JobHandle,
    pub deduplicated: bool,
}

/// Persistent task execution backend
#[async_trait]
pub trait TaskRunner: Send + Sync {
    /// Schedule a one-shot task.
    ///
    /// With `unique` set, the check for an existing pending task with the
    /// same `(hook, group, fingerprint)` and the insert must be atomic; a
    /// duplicate request returns the existing task's handle with
    /// `deduplicated` set instead of creating a second instance.
    async fn schedule_once(
        &self,
        run_at: DateTime<Utc>,
        hook: &str,
        payload: Value,
        group: &str,
        fingerprint: &str,
        unique: bool,
    ) -> RunnerResult<ScheduleAck>;

    /// Schedule a recurring task with the given interval in seconds.
    ///
    /// Same atomicity and dedup semantics as [`schedule_once`].
    ///
    /// [`schedule_once`]: TaskRunner::schedule_once
    async fn schedule_recurring(
        &self,
        first_run_at: DateTime<Utc>,
        interval_secs: u64,
        hook: &str,
        payload: Value,
        group: &str,
        fingerprint: &str,
        unique: bool,
    ) -> RunnerResult<ScheduleAck>;

    /// Next pending run for a hook, optionally narrowed by fingerprint.
    ///
    /// Returns `None` when nothing matching is pending.
    async fn next_scheduled(
        &self,
        hook: &str,
        fingerprint: Option<&str>,
        group: &str,
    ) -> RunnerResult<Option<DateTime<Utc>>>;

    /// Remove all pending tasks for a hook, optionally narrowed by
    /// fingerprint. Removing nothing is not an error.
    async fn unschedule_all(
        &self,
        hook: &str,
        fingerprint: Option<&str>,
        group: &str,
    ) -> RunnerResult<()>;
}
