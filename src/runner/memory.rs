//! In-memory task runner for tests and development.
//!
//! Holds pending tasks under one lock, which makes the unique
//! check-and-schedule trivially atomic. Tests drive execution explicitly via
//! [`MemoryRunner::take_due`]; recurring tasks re-arm themselves when taken.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde_json::Value;

use super::{ScheduleAck, TaskRunner};
use crate::error::{RunnerError, RunnerResult};
use crate::types::JobHandle;

/// A pending task as the runner stores it
#[derive(Debug, Clone)]
pub struct ScheduledTask {
    pub handle: JobHandle,
    pub hook: String,
    pub payload: Value,
    pub group: String,
    pub run_at: DateTime<Utc>,
    /// Recurrence interval in seconds; `None` for one-shot tasks
    pub interval: Option<u64>,
    pub fingerprint: String,
}

/// In-process runner backend
#[derive(Default)]
pub struct MemoryRunner {
    tasks: RwLock<Vec<ScheduledTask>>,
    unavailable: RwLock<bool>,
}

impl MemoryRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail with `RunnerError::Unavailable`, for
    /// exercising scheduling-error propagation.
    pub fn set_unavailable(&self, unavailable: bool) {
        *self.unavailable.write() = unavailable;
    }

    fn check_available(&self) -> RunnerResult<()> {
        if *self.unavailable.read() {
            Err(RunnerError::Unavailable("runner offline".to_string()))
        } else {
            Ok(())
        }
    }

    /// Number of pending tasks
    pub fn pending_count(&self) -> usize {
        self.tasks.read().len()
    }

    /// Pending tasks in one execution group
    pub fn tasks_in_group(&self, group: &str) -> Vec<ScheduledTask> {
        self.tasks
            .read()
            .iter()
            .filter(|task| task.group == group)
            .cloned()
            .collect()
    }

    /// All pending tasks
    pub fn all_tasks(&self) -> Vec<ScheduledTask> {
        self.tasks.read().clone()
    }

    /// Remove and return every task due at `now`, soonest first.
    ///
    /// Recurring tasks are returned for this occurrence and re-armed at
    /// `now + interval`. The caller plays the worker: it feeds each task's
    /// payload to the dispatcher.
    pub fn take_due(&self, now: DateTime<Utc>) -> Vec<ScheduledTask> {
        let mut tasks = self.tasks.write();
        let mut due = Vec::new();
        let mut remaining = Vec::new();

        for mut task in tasks.drain(..) {
            if task.run_at <= now {
                due.push(task.clone());
                if let Some(interval) = task.interval {
                    task.run_at = now + chrono::Duration::seconds(interval as i64);
                    remaining.push(task);
                }
            } else {
                remaining.push(task);
            }
        }
        *tasks = remaining;

        due.sort_by_key(|task| task.run_at);
        due
    }

    fn insert(
        &self,
        run_at: DateTime<Utc>,
        hook: &str,
        payload: Value,
        group: &str,
        fingerprint: &str,
        unique: bool,
        interval: Option<u64>,
    ) -> RunnerResult<ScheduleAck> {
        self.check_available()?;
        let mut tasks = self.tasks.write();

        if unique {
            if let Some(existing) = tasks.iter().find(|task| {
                task.hook == hook && task.group == group && task.fingerprint == fingerprint
            }) {
                return Ok(ScheduleAck {
                    handle: existing.handle.clone(),
                    deduplicated: true,
                });
            }
        }

        let handle = JobHandle::new();
        tasks.push(ScheduledTask {
            handle: handle.clone(),
            hook: hook.to_string(),
            payload,
            group: group.to_string(),
            run_at,
            interval,
            fingerprint: fingerprint.to_string(),
        });

        Ok(ScheduleAck {
            handle,
            deduplicated: false,
        })
    }
}

#[async_trait]
impl TaskRunner for MemoryRunner {
    async fn schedule_once(
        &self,
        run_at: DateTime<Utc>,
        hook: &str,
        payload: Value,
        group: &str,
        fingerprint: &str,
        unique: bool,
    ) -> RunnerResult<ScheduleAck> {
        self.insert(run_at, hook, payload, group, fingerprint, unique, None)
    }

    async fn schedule_recurring(
        &self,
        first_run_at: DateTime<Utc>,
        interval_secs: u64,
        hook: &str,
        payload: Value,
        group: &str,
        fingerprint: &str,
        unique: bool,
    ) -> RunnerResult<ScheduleAck> {
        self.insert(
            first_run_at,
            hook,
            payload,
            group,
            fingerprint,
            unique,
            Some(interval_secs),
        )
    }

    async fn next_scheduled(
        &self,
        hook: &str,
        fingerprint: Option<&str>,
        group: &str,
    ) -> RunnerResult<Option<DateTime<Utc>>> {
        self.check_available()?;
        Ok(self
            .tasks
            .read()
            .iter()
            .filter(|task| {
                task.hook == hook
                    && task.group == group
                    && fingerprint.map_or(true, |key| task.fingerprint == key)
            })
            .map(|task| task.run_at)
            .min())
    }

    async fn unschedule_all(
        &self,
        hook: &str,
        fingerprint: Option<&str>,
        group: &str,
    ) -> RunnerResult<()> {
        self.check_available()?;
        self.tasks.write().retain(|task| {
            !(task.hook == hook
                && task.group == group
                && fingerprint.map_or(true, |key| task.fingerprint == key))
        });
        Ok(())
    }
}
