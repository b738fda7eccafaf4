use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::json;
use tokio_stream::StreamExt;

use lanework::{
    DeadLetterFilter, DeadLetterStore, DispatchOutcome, Dispatcher, HandlerRegistry, JobEnvelope,
    JobError, MemoryDeadLetterStore, MemoryRunner, PriorityQueue, Priority, QueueError,
    QueueEvent, RetryPolicy, TaskRunner,
};

/// Test factory functions
struct Pipeline {
    runner: Arc<MemoryRunner>,
    store: Arc<MemoryDeadLetterStore>,
    queue: Arc<PriorityQueue>,
}

fn create_pipeline() -> Pipeline {
    create_pipeline_with_policy(RetryPolicy::default())
}

fn create_pipeline_with_policy(policy: RetryPolicy) -> Pipeline {
    let runner = Arc::new(MemoryRunner::new());
    let store = Arc::new(MemoryDeadLetterStore::new());
    let queue = Arc::new(PriorityQueue::new(runner.clone(), store.clone()).with_policy(policy));
    Pipeline { runner, store, queue }
}

fn counting_registry(job_name: &str, calls: Arc<AtomicUsize>) -> HandlerRegistry {
    let mut registry = HandlerRegistry::new();
    registry
        .register_fn(job_name, move |_args| {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })
        .unwrap();
    registry
}

/// Play the runner's worker: keep taking due tasks up to the horizon and
/// feed them through the dispatcher, retries included.
async fn drain(runner: &MemoryRunner, dispatcher: &Dispatcher, horizon: DateTime<Utc>) -> usize {
    let mut dispatched = 0;
    loop {
        let due = runner.take_due(horizon);
        if due.is_empty() {
            break;
        }
        for task in due {
            dispatcher.dispatch(&task.hook, task.payload).await.unwrap();
            dispatched += 1;
        }
    }
    dispatched
}

async fn receive_next_event(
    stream: &mut tokio_stream::wrappers::BroadcastStream<QueueEvent>,
) -> QueueEvent {
    tokio::time::timeout(Duration::from_secs(1), stream.next())
        .await
        .expect("Timeout waiting for event")
        .expect("Stream ended")
        .expect("Event receive error")
}

/// A1. Schedule Wraps And Tags The Priority Lane
#[tokio::test]
async fn test_schedule_wraps_into_maintenance_lane() {
    let pipeline = create_pipeline();

    pipeline
        .queue
        .schedule("wch_cleanup_expired_carts", json!({}), Priority::Maintenance, Duration::ZERO)
        .await
        .unwrap();

    let tasks = pipeline.runner.tasks_in_group("lane-maintenance");
    assert_eq!(tasks.len(), 1);

    let envelope: JobEnvelope = serde_json::from_value(tasks[0].payload.clone()).unwrap();
    assert_eq!(envelope.version, 2);
    assert_eq!(envelope.meta.priority.as_u8(), 5);
    assert_eq!(envelope.meta.attempt, 1);
    assert_eq!(envelope.args, json!({}));
}

/// A2. Scheduled Job Executes End To End
#[test_log::test(tokio::test)]
async fn test_schedule_execute_complete() {
    let pipeline = create_pipeline();
    let calls = Arc::new(AtomicUsize::new(0));
    let registry = counting_registry("send_reminder", calls.clone());
    let dispatcher = Dispatcher::new(Arc::new(registry), pipeline.queue.clone());

    pipeline
        .queue
        .schedule("send_reminder", json!({"cart_id": 5}), Priority::Urgent, Duration::ZERO)
        .await
        .unwrap();

    let dispatched = drain(&pipeline.runner, &dispatcher, Utc::now()).await;

    assert_eq!(dispatched, 1);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(pipeline.runner.pending_count(), 0);
    assert!(pipeline.store.is_empty());
}

/// B1. Unique Scheduling Collapses To One Executing Instance
#[tokio::test]
async fn test_unique_double_tap_executes_once() {
    let pipeline = create_pipeline();
    let calls = Arc::new(AtomicUsize::new(0));
    let registry = counting_registry("send_reminder", calls.clone());
    let dispatcher = Dispatcher::new(Arc::new(registry), pipeline.queue.clone());

    // Double-tap before anything executes
    let first = pipeline
        .queue
        .schedule_unique("send_reminder", json!({"cart_id": 5}), Priority::Normal, Duration::ZERO)
        .await
        .unwrap();
    let second = pipeline
        .queue
        .schedule_unique("send_reminder", json!({"cart_id": 5}), Priority::Normal, Duration::ZERO)
        .await
        .unwrap();

    assert!(first.is_some());
    assert!(second.is_none());

    let dispatched = drain(&pipeline.runner, &dispatcher, Utc::now()).await;
    assert_eq!(dispatched, 1);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

/// B2. Uniqueness Clears Once The Job Has Run
#[tokio::test]
async fn test_unique_reschedules_after_execution() {
    let pipeline = create_pipeline();
    let calls = Arc::new(AtomicUsize::new(0));
    let registry = counting_registry("send_reminder", calls.clone());
    let dispatcher = Dispatcher::new(Arc::new(registry), pipeline.queue.clone());

    pipeline
        .queue
        .schedule_unique("send_reminder", json!({"cart_id": 5}), Priority::Normal, Duration::ZERO)
        .await
        .unwrap();
    drain(&pipeline.runner, &dispatcher, Utc::now()).await;

    // The fingerprint no longer matches anything pending
    let again = pipeline
        .queue
        .schedule_unique("send_reminder", json!({"cart_id": 5}), Priority::Normal, Duration::ZERO)
        .await
        .unwrap();
    assert!(again.is_some());
}

/// C1. Transient Failures Retry Then Dead-Letter Exactly Once
#[test_log::test(tokio::test)]
async fn test_retry_exhaustion_end_to_end() {
    let pipeline = create_pipeline();
    let calls = Arc::new(AtomicUsize::new(0));
    let calls_in_handler = calls.clone();

    let mut registry = HandlerRegistry::new();
    registry
        .register_fn("send_reminder", move |_args| {
            let calls = calls_in_handler.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(JobError::retryable("upstream timeout"))
            }
        })
        .unwrap();
    let dispatcher = Dispatcher::new(Arc::new(registry), pipeline.queue.clone());

    pipeline
        .queue
        .schedule("send_reminder", json!({"cart_id": 5}), Priority::Normal, Duration::ZERO)
        .await
        .unwrap();

    // Horizon far enough out that every backoff is already due
    let horizon = Utc::now() + chrono::Duration::hours(12);
    let dispatched = drain(&pipeline.runner, &dispatcher, horizon).await;

    // max_attempts = 3: three executions, then the budget is spent
    assert_eq!(dispatched, 3);
    assert_eq!(calls.load(Ordering::SeqCst), 3);

    let entries = pipeline.store.list(&DeadLetterFilter::all()).await.unwrap();
    assert_eq!(entries.len(), 1, "exactly one dead letter entry");
    assert_eq!(entries[0].attempts_made, 3);
    assert_eq!(entries[0].job_name, "send_reminder");
    assert_eq!(entries[0].original_args, json!({"cart_id": 5}));
    assert_eq!(pipeline.runner.pending_count(), 0, "nothing left rescheduled");
}

/// C2. Retry Delays Grow Between Attempts
#[tokio::test]
async fn test_retry_backoff_grows() {
    let pipeline = create_pipeline();
    let mut registry = HandlerRegistry::new();
    registry
        .register_fn("send_reminder", |_args| async {
            Err(JobError::retryable("upstream timeout"))
        })
        .unwrap();
    let dispatcher = Dispatcher::new(Arc::new(registry), pipeline.queue.clone());

    pipeline
        .queue
        .schedule("send_reminder", json!({}), Priority::Normal, Duration::ZERO)
        .await
        .unwrap();

    let horizon = Utc::now() + chrono::Duration::hours(12);
    let mut retry_ats = Vec::new();
    loop {
        let due = pipeline.runner.take_due(horizon);
        if due.is_empty() {
            break;
        }
        for task in due {
            let before = Utc::now();
            if let DispatchOutcome::Retried { retry_at, .. } =
                dispatcher.dispatch(&task.hook, task.payload).await.unwrap()
            {
                retry_ats.push((before, retry_at));
            }
        }
    }

    assert_eq!(retry_ats.len(), 2);
    let first_delay = retry_ats[0].1 - retry_ats[0].0;
    let second_delay = retry_ats[1].1 - retry_ats[1].0;
    assert!(
        second_delay > first_delay,
        "backoff must grow: {:?} then {:?}",
        first_delay,
        second_delay
    );
}

/// C3. Permanent Failures Skip The Retry Budget
#[tokio::test]
async fn test_permanent_failure_dead_letters_immediately() {
    let pipeline = create_pipeline();
    let mut registry = HandlerRegistry::new();
    registry
        .register_fn("confirm_payment", |_args| async {
            Err(JobError::permanent("malformed business data"))
        })
        .unwrap();
    let dispatcher = Dispatcher::new(Arc::new(registry), pipeline.queue.clone());

    pipeline
        .queue
        .schedule("confirm_payment", json!({"order_id": 9}), Priority::Critical, Duration::ZERO)
        .await
        .unwrap();

    let dispatched = drain(&pipeline.runner, &dispatcher, Utc::now()).await;

    assert_eq!(dispatched, 1, "no retries for permanent errors");
    let entries = pipeline.store.list(&DeadLetterFilter::all()).await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].attempts_made, 1);
}

/// D1. Dead Letter Replay Starts Over At Attempt One
#[tokio::test]
async fn test_dead_letter_replay() {
    let pipeline = create_pipeline();

    // Fail a job permanently to produce an entry
    let mut registry = HandlerRegistry::new();
    let fail = Arc::new(std::sync::atomic::AtomicBool::new(true));
    let fail_in_handler = fail.clone();
    registry
        .register_fn("sync_product", move |_args| {
            let fail = fail_in_handler.clone();
            async move {
                if fail.load(Ordering::SeqCst) {
                    Err(JobError::permanent("upstream rejected"))
                } else {
                    Ok(())
                }
            }
        })
        .unwrap();
    let dispatcher = Dispatcher::new(Arc::new(registry), pipeline.queue.clone());

    pipeline
        .queue
        .schedule("sync_product", json!({"product_id": 42}), Priority::Bulk, Duration::ZERO)
        .await
        .unwrap();
    drain(&pipeline.runner, &dispatcher, Utc::now()).await;

    let entries = pipeline.store.list(&DeadLetterFilter::all()).await.unwrap();
    assert_eq!(entries.len(), 1);
    let entry_id = entries[0].entry_id.clone();

    // Replay: fresh envelope, attempt reset, identical args
    pipeline.queue.replay(&entry_id).await.unwrap();

    let tasks = pipeline.runner.tasks_in_group("lane-bulk");
    assert_eq!(tasks.len(), 1);
    let replayed: JobEnvelope = serde_json::from_value(tasks[0].payload.clone()).unwrap();
    assert_eq!(replayed.meta.attempt, 1);
    assert_eq!(replayed.args, json!({"product_id": 42}));

    let entry = pipeline.store.get(&entry_id).await.unwrap().unwrap();
    assert!(entry.is_replayed());

    // And this time it succeeds
    fail.store(false, Ordering::SeqCst);
    let dispatched = drain(&pipeline.runner, &dispatcher, Utc::now()).await;
    assert_eq!(dispatched, 1);
}

/// E1. Legacy Payloads Keep Working Through The Dispatcher
#[tokio::test]
async fn test_legacy_payload_end_to_end() {
    let pipeline = create_pipeline();
    let seen = Arc::new(parking_lot::Mutex::new(None));
    let seen_in_handler = seen.clone();

    let mut registry = HandlerRegistry::new();
    registry
        .register_fn("send_reminder", move |args| {
            let seen = seen_in_handler.clone();
            async move {
                *seen.lock() = Some(args);
                Ok(())
            }
        })
        .unwrap();
    let dispatcher = Dispatcher::new(Arc::new(registry), pipeline.queue.clone());

    // A pre-versioning producer scheduled bare args straight on the runner
    pipeline
        .runner
        .schedule_once(
            Utc::now(),
            "send_reminder",
            json!({"cart_id": 5, "channel": "wa"}),
            "lane-normal",
            "legacy-fingerprint",
            false,
        )
        .await
        .unwrap();

    drain(&pipeline.runner, &dispatcher, Utc::now()).await;

    // The handler sees the bare args exactly as scheduled
    assert_eq!(seen.lock().clone(), Some(json!({"cart_id": 5, "channel": "wa"})));
}

/// E2. A Failing Legacy Job Is Upgraded To A Versioned Envelope On Retry
#[tokio::test]
async fn test_legacy_payload_upgraded_on_retry() {
    let pipeline = create_pipeline();
    let mut registry = HandlerRegistry::new();
    registry
        .register_fn("send_reminder", |_args| async {
            Err(JobError::retryable("flaky upstream"))
        })
        .unwrap();
    let dispatcher = Dispatcher::new(Arc::new(registry), pipeline.queue.clone());

    pipeline
        .runner
        .schedule_once(
            Utc::now(),
            "send_reminder",
            json!({"cart_id": 5}),
            "lane-normal",
            "legacy-fingerprint",
            false,
        )
        .await
        .unwrap();

    // One execution: fails, gets a synthesized envelope, retries wrapped
    let due = pipeline.runner.take_due(Utc::now());
    assert_eq!(due.len(), 1);
    let outcome = dispatcher
        .dispatch(&due[0].hook, due[0].payload.clone())
        .await
        .unwrap();
    assert!(matches!(outcome, DispatchOutcome::Retried { attempt: 2, .. }));

    let pending = pipeline.runner.all_tasks();
    assert_eq!(pending.len(), 1);
    let upgraded: JobEnvelope = serde_json::from_value(pending[0].payload.clone()).unwrap();
    assert_eq!(upgraded.version, 2);
    assert_eq!(upgraded.meta.attempt, 2);
    assert_eq!(upgraded.args, json!({"cart_id": 5}));
}

/// F1. Lifecycle Events Are Observable
#[tokio::test]
async fn test_emits_lifecycle_events() {
    let pipeline = create_pipeline();
    let mut event_stream =
        tokio_stream::wrappers::BroadcastStream::new(pipeline.queue.event_stream());

    let mut registry = HandlerRegistry::new();
    registry
        .register_fn("confirm_payment", |_args| async {
            Err(JobError::permanent("bad order"))
        })
        .unwrap();
    let dispatcher = Dispatcher::new(Arc::new(registry), pipeline.queue.clone());

    pipeline
        .queue
        .schedule("confirm_payment", json!({"order_id": 9}), Priority::Critical, Duration::ZERO)
        .await
        .unwrap();

    let scheduled = receive_next_event(&mut event_stream).await;
    assert_eq!(scheduled.event_name(), "scheduled");
    assert_eq!(scheduled.job_name(), "confirm_payment");

    drain(&pipeline.runner, &dispatcher, Utc::now()).await;

    let dead_lettered = receive_next_event(&mut event_stream).await;
    assert_eq!(dead_lettered.event_name(), "dead_lettered");
    match dead_lettered {
        QueueEvent::DeadLettered { attempts_made, .. } => assert_eq!(attempts_made, 1),
        other => panic!("expected DeadLettered, got {:?}", other),
    }
}

/// F2. Dispatch Feeds The Rate Governor
#[tokio::test]
async fn test_governor_counts_dispatches() {
    let pipeline = create_pipeline();
    let calls = Arc::new(AtomicUsize::new(0));
    let registry = counting_registry("sync_catalog", calls.clone());
    let dispatcher = Dispatcher::new(Arc::new(registry), pipeline.queue.clone());

    for n in 0..3 {
        pipeline
            .queue
            .schedule("sync_catalog", json!({"page": n}), Priority::Bulk, Duration::ZERO)
            .await
            .unwrap();
    }
    drain(&pipeline.runner, &dispatcher, Utc::now()).await;

    assert_eq!(pipeline.queue.governor().current_rate(Priority::Bulk), 3);
    let snapshot = pipeline.queue.governor().snapshot();
    let bulk = snapshot.iter().find(|s| s.priority == Priority::Bulk).unwrap();
    assert_eq!(bulk.dispatched, 3);
    assert_eq!(bulk.limit, 20);
}

/// G1. Runner Failure Surfaces To The Producer
#[tokio::test]
async fn test_scheduling_failure_propagates() {
    let pipeline = create_pipeline();
    pipeline.runner.set_unavailable(true);

    let result = pipeline
        .queue
        .schedule("send_reminder", json!({}), Priority::Normal, Duration::ZERO)
        .await;

    assert!(matches!(result, Err(QueueError::Scheduling(_))));
}

/// G2. A Tight Retry Budget Is Honored
#[tokio::test]
async fn test_custom_retry_policy() {
    let pipeline =
        create_pipeline_with_policy(RetryPolicy::new(1, Duration::from_secs(1)));
    let mut registry = HandlerRegistry::new();
    registry
        .register_fn("send_reminder", |_args| async {
            Err(JobError::retryable("timeout"))
        })
        .unwrap();
    let dispatcher = Dispatcher::new(Arc::new(registry), pipeline.queue.clone());

    pipeline
        .queue
        .schedule("send_reminder", json!({}), Priority::Normal, Duration::ZERO)
        .await
        .unwrap();

    let horizon = Utc::now() + chrono::Duration::hours(1);
    let dispatched = drain(&pipeline.runner, &dispatcher, horizon).await;

    // One attempt allowed, so the first failure dead-letters
    assert_eq!(dispatched, 1);
    let entries = pipeline.store.list(&DeadLetterFilter::all()).await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].attempts_made, 1);
}
