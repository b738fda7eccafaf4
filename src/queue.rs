//! Scheduling core: the single entry point producers use to get work onto
//! the runner, and the place retry/dead-letter decisions are made.
//!
//! The queue is a stateless-per-call orchestrator. Durability and timing
//! belong to the injected [`TaskRunner`]; terminal failures go to the
//! injected [`DeadLetterStore`]; the only mutable state owned here is the
//! advisory [`RateGovernor`]. All operations are safe to call concurrently
//! from any number of worker processes.

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::codec::{self, MetaOverrides};
use crate::config::RetryPolicy;
use crate::dead_letter::{DeadLetterEntry, DeadLetterStore};
use crate::error::{QueueError, QueueResult};
use crate::events::QueueEvent;
use crate::governor::RateGovernor;
use crate::runner::{ScheduleAck, TaskRunner};
use crate::types::{EntryId, JobEnvelope, JobHandle, Priority, ScheduleRequest};

/// Outcome of a retry decision
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryOutcome {
    /// The job was rescheduled with backoff
    Rescheduled {
        handle: JobHandle,
        retry_at: DateTime<Utc>,
        /// Attempt number the rescheduled envelope carries
        attempt: u32,
    },

    /// The retry budget was exhausted; one dead letter entry was recorded
    DeadLettered { entry_id: EntryId },
}

/// Priority-based scheduling core
pub struct PriorityQueue {
    runner: Arc<dyn TaskRunner>,
    dead_letters: Arc<dyn DeadLetterStore>,
    governor: Arc<RateGovernor>,
    policy: RetryPolicy,
    events: broadcast::Sender<QueueEvent>,
}

impl PriorityQueue {
    /// Create a queue over the given runner and dead letter store
    pub fn new(runner: Arc<dyn TaskRunner>, dead_letters: Arc<dyn DeadLetterStore>) -> Self {
        let (events, _) = broadcast::channel(1024);
        Self {
            runner,
            dead_letters,
            governor: Arc::new(RateGovernor::new()),
            policy: RetryPolicy::default(),
            events,
        }
    }

    /// Replace the retry policy
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Replace the rate governor
    pub fn with_governor(mut self, governor: RateGovernor) -> Self {
        self.governor = Arc::new(governor);
        self
    }

    /// Get the retry policy
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Get the rate governor
    pub fn governor(&self) -> &RateGovernor {
        &self.governor
    }

    /// Subscribe to lifecycle events
    pub fn event_stream(&self) -> broadcast::Receiver<QueueEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: QueueEvent) {
        let _ = self.events.send(event);
    }

    fn run_at_for(delay: Duration) -> QueueResult<DateTime<Utc>> {
        let delay = chrono::Duration::from_std(delay)
            .map_err(|err| QueueError::InvalidRequest(format!("delay out of range: {}", err)))?;
        Ok(Utc::now() + delay)
    }

    async fn submit_once(
        &self,
        job_name: &str,
        envelope: &JobEnvelope,
        run_at: DateTime<Utc>,
        fingerprint: &str,
        unique: bool,
    ) -> QueueResult<ScheduleAck> {
        let priority = envelope.meta.priority;
        if self.governor.is_saturated(priority) {
            // Advisory only: the job is still accepted, the lane is just hot
            warn!(
                job_name,
                priority = %priority,
                rate = self.governor.current_rate(priority),
                "scheduling into a saturated lane"
            );
        }

        let payload = serde_json::to_value(envelope)?;
        let ack = self
            .runner
            .schedule_once(run_at, job_name, payload, priority.lane(), fingerprint, unique)
            .await?;

        if !ack.deduplicated {
            debug!(job_name, handle = %ack.handle, lane = priority.lane(), "job scheduled");
            self.emit(QueueEvent::Scheduled {
                handle: ack.handle.clone(),
                job_name: job_name.to_string(),
                priority,
                run_at,
                at: Utc::now(),
            });
        }
        Ok(ack)
    }

    /// Schedule a one-shot job.
    ///
    /// The arguments are wrapped into a versioned envelope and handed to the
    /// runner tagged with the priority's lane. Scheduling failures propagate
    /// to the producer; the governor never blocks the call.
    pub async fn schedule(
        &self,
        job_name: &str,
        args: Value,
        priority: Priority,
        delay: Duration,
    ) -> QueueResult<JobHandle> {
        let fingerprint = codec::fingerprint(job_name, &args);
        let envelope = codec::wrap(args, priority, MetaOverrides::default());
        let run_at = Self::run_at_for(delay)?;
        let ack = self
            .submit_once(job_name, &envelope, run_at, &fingerprint, false)
            .await?;
        Ok(ack.handle)
    }

    /// Schedule a one-shot job unless an identical one is already pending.
    ///
    /// Identity is the content fingerprint of `job_name` + `args`. Returns
    /// `None` when the request collapsed into an existing pending job. The
    /// pending check runs first as a cheap fast path; a race between two
    /// concurrent callers is closed by the runner's atomic check-and-schedule,
    /// which reports the duplicate in its ack.
    pub async fn schedule_unique(
        &self,
        job_name: &str,
        args: Value,
        priority: Priority,
        delay: Duration,
    ) -> QueueResult<Option<JobHandle>> {
        let fingerprint = codec::fingerprint(job_name, &args);

        if self
            .runner
            .next_scheduled(job_name, Some(&fingerprint), priority.lane())
            .await?
            .is_some()
        {
            debug!(job_name, "duplicate scheduling request collapsed");
            self.emit(QueueEvent::Deduplicated {
                job_name: job_name.to_string(),
                fingerprint,
                at: Utc::now(),
            });
            return Ok(None);
        }

        let envelope = codec::wrap(args, priority, MetaOverrides::default());
        let run_at = Self::run_at_for(delay)?;
        let ack = self
            .submit_once(job_name, &envelope, run_at, &fingerprint, true)
            .await?;

        if ack.deduplicated {
            self.emit(QueueEvent::Deduplicated {
                job_name: job_name.to_string(),
                fingerprint,
                at: Utc::now(),
            });
            return Ok(None);
        }
        Ok(Some(ack.handle))
    }

    /// Schedule a recurring job; the first run lands one interval from now.
    ///
    /// Idempotent: re-invoking for an identical pending job returns the
    /// existing handle without creating a second schedule.
    pub async fn schedule_recurring(
        &self,
        job_name: &str,
        args: Value,
        interval: Duration,
        priority: Priority,
    ) -> QueueResult<JobHandle> {
        let fingerprint = codec::fingerprint(job_name, &args);
        let envelope = codec::wrap(args, priority, MetaOverrides::recurring(interval.as_secs()));

        if self.governor.is_saturated(priority) {
            warn!(job_name, priority = %priority, "scheduling recurring job into a saturated lane");
        }

        let first_run_at = Self::run_at_for(interval)?;
        let payload = serde_json::to_value(&envelope)?;
        let ack = self
            .runner
            .schedule_recurring(
                first_run_at,
                interval.as_secs(),
                job_name,
                payload,
                priority.lane(),
                &fingerprint,
                true,
            )
            .await?;

        if ack.deduplicated {
            debug!(job_name, "recurring job already scheduled");
        } else {
            info!(job_name, interval_secs = interval.as_secs(), lane = priority.lane(), "recurring job scheduled");
            self.emit(QueueEvent::Scheduled {
                handle: ack.handle.clone(),
                job_name: job_name.to_string(),
                priority,
                run_at: first_run_at,
                at: Utc::now(),
            });
        }
        Ok(ack.handle)
    }

    /// Schedule from a request, honoring its unique/recurring flags.
    ///
    /// Returns `None` only for unique requests that collapsed into an
    /// existing pending job.
    pub async fn schedule_request(&self, request: ScheduleRequest) -> QueueResult<Option<JobHandle>> {
        if let Some(interval) = request.recurring {
            return self
                .schedule_recurring(&request.job_name, request.args, interval, request.priority)
                .await
                .map(Some);
        }
        if request.unique {
            return self
                .schedule_unique(&request.job_name, request.args, request.priority, request.delay)
                .await;
        }
        self.schedule(&request.job_name, request.args, request.priority, request.delay)
            .await
            .map(Some)
    }

    /// Decide what happens to a failed job.
    ///
    /// Called by the execution wrapper with the envelope as delivered. Within
    /// the budget, the envelope's attempt counter is bumped and the job is
    /// rescheduled at `now + backoff`; once the budget is spent, exactly one
    /// dead letter entry is recorded and nothing is rescheduled.
    pub async fn retry(
        &self,
        job_name: &str,
        envelope: JobEnvelope,
        error: &str,
    ) -> QueueResult<RetryOutcome> {
        let attempt = envelope.meta.attempt;

        if self.policy.exhausted(attempt) {
            let entry_id = self.record_dead_letter(job_name, envelope, error).await?;
            return Ok(RetryOutcome::DeadLettered { entry_id });
        }

        let backoff = self.policy.backoff_for(attempt);
        let retry_at = Self::run_at_for(backoff)?;
        let next = codec::increment_attempt(&envelope);
        let fingerprint = codec::fingerprint(job_name, &next.args);
        let payload = serde_json::to_value(&next)?;

        let ack = self
            .runner
            .schedule_once(
                retry_at,
                job_name,
                payload,
                next.meta.priority.lane(),
                &fingerprint,
                false,
            )
            .await?;

        warn!(
            job_name,
            attempt = next.meta.attempt,
            backoff_secs = backoff.as_secs(),
            error,
            "job failed, retry scheduled"
        );
        self.emit(QueueEvent::RetryScheduled {
            handle: ack.handle.clone(),
            job_name: job_name.to_string(),
            attempt: next.meta.attempt,
            retry_at,
            at: Utc::now(),
        });

        Ok(RetryOutcome::Rescheduled {
            handle: ack.handle,
            retry_at,
            attempt: next.meta.attempt,
        })
    }

    /// Dead-letter a job without consuming retry budget.
    ///
    /// The permanent-error path: handlers call this when retrying cannot
    /// help (malformed business data, validation failures).
    pub async fn dead_letter_immediately(
        &self,
        job_name: &str,
        envelope: JobEnvelope,
        error: &str,
    ) -> QueueResult<EntryId> {
        self.record_dead_letter(job_name, envelope, error).await
    }

    async fn record_dead_letter(
        &self,
        job_name: &str,
        envelope: JobEnvelope,
        error: &str,
    ) -> QueueResult<EntryId> {
        let entry = DeadLetterEntry::from_envelope(job_name, envelope, error);
        let entry_id = entry.entry_id.clone();
        let attempts_made = entry.attempts_made;

        self.dead_letters.record(entry).await?;

        warn!(job_name, entry_id = %entry_id, attempts_made, error, "job dead-lettered");
        self.emit(QueueEvent::DeadLettered {
            entry_id: entry_id.clone(),
            job_name: job_name.to_string(),
            attempts_made,
            at: Utc::now(),
        });
        Ok(entry_id)
    }

    /// Reschedule a dead-lettered job from its stored arguments.
    ///
    /// The replayed envelope starts over at attempt 1. The entry stays in
    /// the store, stamped as replayed.
    pub async fn replay(&self, entry_id: &EntryId) -> QueueResult<JobHandle> {
        let entry = self
            .dead_letters
            .get(entry_id)
            .await?
            .ok_or_else(|| QueueError::EntryNotFound(entry_id.to_string()))?;

        let handle = self
            .schedule(
                &entry.job_name,
                entry.original_args.clone(),
                entry.priority,
                Duration::ZERO,
            )
            .await?;

        self.dead_letters.mark_replayed(entry_id, Utc::now()).await?;

        info!(entry_id = %entry_id, job_name = %entry.job_name, handle = %handle, "dead letter replayed");
        self.emit(QueueEvent::Replayed {
            entry_id: entry_id.clone(),
            handle: handle.clone(),
            job_name: entry.job_name,
            at: Utc::now(),
        });
        Ok(handle)
    }

    /// Remove pending jobs matching the fingerprint of `job_name` + `args`.
    ///
    /// Only reaches jobs that have not started executing; there is no
    /// mid-execution cancellation.
    pub async fn unschedule(&self, job_name: &str, args: &Value, priority: Priority) -> QueueResult<()> {
        let fingerprint = codec::fingerprint(job_name, args);
        self.runner
            .unschedule_all(job_name, Some(&fingerprint), priority.lane())
            .await?;

        debug!(job_name, "pending jobs unscheduled");
        self.emit(QueueEvent::Unscheduled {
            job_name: job_name.to_string(),
            at: Utc::now(),
        });
        Ok(())
    }

    /// Stable alias of the codec's compat unwrap, for handlers and adapters
    pub fn unwrap_payload_compat(&self, payload: Value) -> Value {
        codec::unwrap_compat(payload)
    }

    /// Stable alias of the codec's wrapped-payload predicate
    pub fn is_wrapped_payload(&self, payload: &Value) -> bool {
        codec::is_wrapped(payload)
    }
}
