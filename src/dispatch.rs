//! Handler registry and execution wrapper.
//!
//! The registry is an explicit job-name → handler map built at startup and
//! injected into the dispatcher; nothing resolves handlers through ambient
//! globals. The dispatcher is what the runner's workers invoke when a task
//! comes due: it performs the one payload pattern match, feeds the handler
//! its unwrapped arguments, and routes failures into the queue's retry or
//! dead-letter paths. Handler failures resolve to a [`DispatchOutcome`]
//! rather than an `Err`, so business-logic failures can never crash a worker
//! process; only runner/store infrastructure failures surface as errors.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, error, warn};

use crate::codec::{self, MetaOverrides};
use crate::error::{JobError, QueueError, QueueResult};
use crate::queue::{PriorityQueue, RetryOutcome};
use crate::types::{EntryId, Payload, Priority};

/// A registered job handler
#[async_trait]
pub trait JobHandler: Send + Sync {
    /// Execute with the unwrapped producer arguments.
    ///
    /// Return [`JobError::Retryable`] for transient failures worth another
    /// attempt, [`JobError::Permanent`] for failures where retrying cannot
    /// help.
    async fn run(&self, args: Value) -> Result<(), JobError>;
}

struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> JobHandler for FnHandler<F>
where
    F: Fn(Value) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), JobError>> + Send,
{
    async fn run(&self, args: Value) -> Result<(), JobError> {
        (self.0)(args).await
    }
}

/// Explicit mapping from job name to handler, built at startup
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn JobHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for a job name
    pub fn register(&mut self, job_name: &str, handler: Arc<dyn JobHandler>) -> QueueResult<()> {
        if self.handlers.contains_key(job_name) {
            return Err(QueueError::HandlerAlreadyRegistered(job_name.to_string()));
        }
        self.handlers.insert(job_name.to_string(), handler);
        Ok(())
    }

    /// Register an async closure as a handler
    pub fn register_fn<F, Fut>(&mut self, job_name: &str, handler: F) -> QueueResult<()>
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), JobError>> + Send + 'static,
    {
        self.register(job_name, Arc::new(FnHandler(handler)))
    }

    /// Look up a handler
    pub fn get(&self, job_name: &str) -> Option<Arc<dyn JobHandler>> {
        self.handlers.get(job_name).cloned()
    }

    /// Check if a job name has a handler
    pub fn is_registered(&self, job_name: &str) -> bool {
        self.handlers.contains_key(job_name)
    }

    /// Get all registered job names
    pub fn registered_names(&self) -> Vec<String> {
        self.handlers.keys().cloned().collect()
    }
}

/// What happened to one delivered task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The handler succeeded
    Completed,

    /// The handler failed transiently; a retry is scheduled
    Retried {
        retry_at: DateTime<Utc>,
        attempt: u32,
    },

    /// The job was dead-lettered (permanent failure, exhausted budget, or no
    /// handler)
    DeadLettered { entry_id: EntryId },
}

/// Execution wrapper invoked by the runner's workers
pub struct Dispatcher {
    registry: Arc<HandlerRegistry>,
    queue: Arc<PriorityQueue>,
}

impl Dispatcher {
    pub fn new(registry: Arc<HandlerRegistry>, queue: Arc<PriorityQueue>) -> Self {
        Self { registry, queue }
    }

    /// Execute the handler registered for `hook` against a raw payload.
    ///
    /// Accepts both wrapped and legacy payload shapes. A legacy payload gets
    /// a synthesized envelope (Normal priority, attempt 1), so its first
    /// failed execution enters the versioned retry path wrapped.
    pub async fn dispatch(&self, hook: &str, payload: Value) -> QueueResult<DispatchOutcome> {
        let envelope = match codec::decode(payload) {
            Payload::Wrapped(envelope) => envelope,
            Payload::Legacy(args) => {
                debug!(hook, "legacy payload, synthesizing envelope meta");
                codec::wrap(args, Priority::Normal, MetaOverrides::default())
            }
        };

        self.queue.governor().record_dispatch(envelope.meta.priority);

        let Some(handler) = self.registry.get(hook) else {
            warn!(hook, "no handler registered, dead-lettering");
            let entry_id = self
                .queue
                .dead_letter_immediately(hook, envelope, &format!("no handler registered for {}", hook))
                .await?;
            return Ok(DispatchOutcome::DeadLettered { entry_id });
        };

        match handler.run(envelope.args.clone()).await {
            Ok(()) => {
                debug!(hook, attempt = envelope.meta.attempt, "job completed");
                Ok(DispatchOutcome::Completed)
            }
            Err(JobError::Permanent(message)) => {
                error!(hook, error = %message, "permanent failure, dead-lettering");
                let entry_id = self
                    .queue
                    .dead_letter_immediately(hook, envelope, &message)
                    .await?;
                Ok(DispatchOutcome::DeadLettered { entry_id })
            }
            Err(JobError::Retryable(message)) => {
                match self.queue.retry(hook, envelope, &message).await? {
                    RetryOutcome::Rescheduled { retry_at, attempt, .. } => {
                        Ok(DispatchOutcome::Retried { retry_at, attempt })
                    }
                    RetryOutcome::DeadLettered { entry_id } => {
                        Ok(DispatchOutcome::DeadLettered { entry_id })
                    }
                }
            }
        }
    }

    /// The registry this dispatcher resolves handlers from
    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }
}
