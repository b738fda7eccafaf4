//! Payload codec: lossless envelope encode/decode and legacy-format detection.
//!
//! The codec performs the wrapped-vs-legacy pattern match exactly once, at the
//! boundary; everything downstream works with the [`Payload`] union. Decoding
//! never fails: a well-formed legacy payload passes through verbatim, and a
//! payload that claims the envelope version but fails validation falls back to
//! empty arguments with a logged warning, because handlers must never crash
//! the runner's worker process over payload shape.

use chrono::Utc;
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::warn;

use crate::types::envelope::{ARGS_KEY, VERSION_KEY};
use crate::types::{EnvelopeMeta, JobEnvelope, Payload, Priority, ENVELOPE_VERSION};

/// Optional metadata merged into a freshly built envelope
#[derive(Debug, Clone, Default)]
pub struct MetaOverrides {
    pub recurring: Option<bool>,
    pub interval: Option<u64>,
}

impl MetaOverrides {
    /// Overrides for a recurring job at the given interval, in seconds
    pub fn recurring(interval_secs: u64) -> Self {
        Self {
            recurring: Some(true),
            interval: Some(interval_secs),
        }
    }
}

/// Build a version-2 envelope around producer arguments.
///
/// Sets `scheduled_at` to now and `attempt` to 1; the overrides contribute
/// the recurrence fields when present.
pub fn wrap(args: Value, priority: Priority, overrides: MetaOverrides) -> JobEnvelope {
    JobEnvelope {
        version: ENVELOPE_VERSION,
        meta: EnvelopeMeta {
            priority,
            scheduled_at: Utc::now(),
            attempt: 1,
            last_retry: None,
            recurring: overrides.recurring,
            interval: overrides.interval,
        },
        args,
    }
}

/// Check whether a raw payload is a wrapped envelope.
///
/// True iff the payload is an object with `_version == 2` and an `args`
/// field. Any other shape is legacy - including objects that happen to carry
/// a `_version` key with a different value, which is the deliberate
/// discriminator for the migration window.
pub fn is_wrapped(payload: &Value) -> bool {
    payload.as_object().is_some_and(|map| {
        map.get(VERSION_KEY).and_then(Value::as_u64) == Some(ENVELOPE_VERSION as u64)
            && map.contains_key(ARGS_KEY)
    })
}

/// Resolve a raw payload into the [`Payload`] union.
///
/// Payloads claiming `_version == 2` that fail envelope validation (missing
/// `args`, unknown priority value, malformed meta) decode to
/// `Legacy(Value::Null)` - the empty-args fallback - after a logged warning.
pub fn decode(payload: Value) -> Payload {
    let claims_envelope = payload
        .as_object()
        .and_then(|map| map.get(VERSION_KEY))
        .and_then(Value::as_u64)
        == Some(ENVELOPE_VERSION as u64);

    if !claims_envelope {
        return Payload::Legacy(payload);
    }

    match serde_json::from_value::<JobEnvelope>(payload) {
        Ok(envelope) => Payload::Wrapped(envelope),
        Err(err) => {
            warn!(
                error = %err,
                "payload claims envelope version {} but failed validation; treating as empty args",
                ENVELOPE_VERSION
            );
            Payload::Legacy(Value::Null)
        }
    }
}

/// Yield the handler-visible arguments for either payload shape.
///
/// Wrapped payloads unwrap to their `args`; legacy payloads pass through
/// unchanged, so handlers see exactly what the producer scheduled.
pub fn unwrap_compat(payload: Value) -> Value {
    decode(payload).into_args()
}

/// Return a new envelope with the attempt counter bumped and `last_retry`
/// stamped. The input is not mutated.
pub fn increment_attempt(envelope: &JobEnvelope) -> JobEnvelope {
    let mut next = envelope.clone();
    next.meta.attempt += 1;
    next.meta.last_retry = Some(Utc::now());
    next
}

/// Content fingerprint of a job name and its unwrapped arguments.
///
/// serde_json orders object keys, so equal argument structures hash equally
/// regardless of construction order. Used for unique-scheduling dedup and
/// fingerprint-based unscheduling.
pub fn fingerprint(job_name: &str, args: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(job_name.as_bytes());
    hasher.update([0u8]);
    hasher.update(args.to_string().as_bytes());
    hex::encode(hasher.finalize())
}
