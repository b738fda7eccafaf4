//! # lanework: Priority-Lane Background Job Pipeline
//!
//! A scheduling core for commerce-style background work: conversational
//! replies, catalog syncs, cart-recovery reminders, cleanup jobs. It layers
//! priority lanes, versioned payload envelopes, retry backoff, and
//! dead-letter replay over an external, persistent, at-least-once task
//! runner.
//!
//! ## What the core does
//!
//! - **Priority lanes**: five tiers, each mapped to a runner execution group
//!   and an advisory per-minute dispatch ceiling
//! - **Versioned payloads**: arguments travel in a `_version: 2` envelope
//!   carrying priority, attempt count, and recurrence metadata; pre-versioning
//!   payloads keep working indefinitely via compat unwrapping
//! - **Retry with backoff**: jittered exponential backoff bounded by a
//!   configurable attempt budget
//! - **Dead letters**: jobs that exhaust the budget (or fail permanently) are
//!   stored with enough context to inspect and replay them
//!
//! Durability, timing, and worker concurrency are the injected
//! [`TaskRunner`]'s job; the core is a stateless-per-call orchestrator that
//! is safe to use from any number of worker processes.
//!
//! ## Quick start
//!
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//! use serde_json::json;
//! use lanework::prelude::*;
//! use lanework::{MemoryDeadLetterStore, MemoryRunner};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let runner = Arc::new(MemoryRunner::new());
//! let queue = Arc::new(PriorityQueue::new(
//!     runner.clone(),
//!     Arc::new(MemoryDeadLetterStore::new()),
//! ));
//!
//! // Handlers are registered explicitly at startup
//! let mut registry = HandlerRegistry::new();
//! registry.register_fn("send_reminder", |args| async move {
//!     if args.get("cart_id").is_none() {
//!         return Err(JobError::permanent("missing cart_id"));
//!     }
//!     Ok(())
//! })?;
//! let dispatcher = Dispatcher::new(Arc::new(registry), queue.clone());
//!
//! // Producers schedule by job name; the runner drives execution later
//! queue
//!     .schedule("send_reminder", json!({"cart_id": 5}), Priority::Urgent, Duration::ZERO)
//!     .await?;
//!
//! for task in runner.take_due(chrono::Utc::now()) {
//!     dispatcher.dispatch(&task.hook, task.payload).await?;
//! }
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod compat;
pub mod config;
pub mod dead_letter;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod governor;
pub mod queue;
pub mod runner;
pub mod types;

// Core API exports
pub use codec::MetaOverrides;
pub use compat::LegacyScheduler;
pub use config::RetryPolicy;
pub use dead_letter::{DeadLetterEntry, DeadLetterFilter, DeadLetterStore};
pub use dispatch::{DispatchOutcome, Dispatcher, HandlerRegistry, JobHandler};
pub use error::{JobError, QueueError, QueueResult, RunnerError, RunnerResult};
pub use events::QueueEvent;
pub use governor::{RateGovernor, RateSnapshot};
pub use queue::{PriorityQueue, RetryOutcome};
pub use runner::{ScheduleAck, TaskRunner};
pub use types::{
    EntryId, EnvelopeMeta, JobEnvelope, JobHandle, Payload, Priority, ScheduleRequest,
    ENVELOPE_VERSION,
};

// Memory backends for tests and development
#[cfg(feature = "memory")]
pub use dead_letter::MemoryDeadLetterStore;

#[cfg(feature = "memory")]
pub use runner::memory::{MemoryRunner, ScheduledTask};

/// Prelude for producers and handler modules
pub mod prelude {
    // Scheduling surface
    pub use crate::{PriorityQueue, RetryOutcome, ScheduleRequest};

    // Essential types
    pub use crate::{JobEnvelope, JobHandle, Payload, Priority};

    // Execution side
    pub use crate::{DispatchOutcome, Dispatcher, HandlerRegistry, JobHandler};

    // Errors
    pub use crate::{JobError, QueueError, QueueResult};

    // Ports
    pub use crate::{DeadLetterStore, TaskRunner};

    // Essential traits
    pub use async_trait::async_trait;
}
