use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::Priority;

/// Current envelope format version
pub const ENVELOPE_VERSION: u8 = 2;

/// Wire key carrying the format version
pub const VERSION_KEY: &str = "_version";

/// Wire key carrying the scheduling metadata
pub const META_KEY: &str = "_meta";

/// Wire key carrying the original producer arguments
pub const ARGS_KEY: &str = "args";

/// Scheduling metadata attached to a wrapped payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvelopeMeta {
    /// Priority tier, serialized as its numeric value
    pub priority: Priority,

    /// When the envelope was built, unix seconds on the wire
    #[serde(with = "chrono::serde::ts_seconds")]
    pub scheduled_at: DateTime<Utc>,

    /// Execution attempt this envelope represents, starting at 1
    pub attempt: u32,

    /// When the last retry was scheduled, if any
    #[serde(
        default,
        with = "chrono::serde::ts_seconds_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_retry: Option<DateTime<Utc>>,

    /// Set for recurring jobs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recurring: Option<bool>,

    /// Recurrence interval in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<u64>,
}

/// Versioned job payload - scheduling metadata alongside the original arguments
///
/// The producer arguments are opaque to the queue core and pass through
/// verbatim; only the codec touches the envelope structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobEnvelope {
    #[serde(rename = "_version")]
    pub version: u8,

    #[serde(rename = "_meta")]
    pub meta: EnvelopeMeta,

    /// Original producer-supplied arguments
    pub args: Value,
}

impl JobEnvelope {
    /// Priority tier this envelope was scheduled with
    pub fn priority(&self) -> Priority {
        self.meta.priority
    }

    /// Attempt number this envelope represents
    pub fn attempt(&self) -> u32 {
        self.meta.attempt
    }

    /// Whether this envelope belongs to a recurring job
    pub fn is_recurring(&self) -> bool {
        self.meta.recurring.unwrap_or(false)
    }
}

/// Decoded payload shape, resolved once at the boundary
///
/// Internal code matches on this union instead of re-probing raw JSON for
/// the envelope keys.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// A version-2 envelope
    Wrapped(JobEnvelope),

    /// A pre-versioning payload, delivered to handlers verbatim
    Legacy(Value),
}

impl Payload {
    /// Scheduling metadata, if this payload carries any
    pub fn meta(&self) -> Option<&EnvelopeMeta> {
        match self {
            Self::Wrapped(envelope) => Some(&envelope.meta),
            Self::Legacy(_) => None,
        }
    }

    /// Priority tier; legacy payloads default to Normal
    pub fn priority(&self) -> Priority {
        self.meta().map(|meta| meta.priority).unwrap_or_default()
    }

    /// Borrow the handler-visible arguments
    pub fn args(&self) -> &Value {
        match self {
            Self::Wrapped(envelope) => &envelope.args,
            Self::Legacy(args) => args,
        }
    }

    /// Consume the payload, yielding the handler-visible arguments
    pub fn into_args(self) -> Value {
        match self {
            Self::Wrapped(envelope) => envelope.args,
            Self::Legacy(args) => args,
        }
    }
}
