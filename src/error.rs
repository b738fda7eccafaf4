use thiserror::Error;

/// Result type for queue operations
pub type QueueResult<T> = Result<T, QueueError>;

/// Result type for task-runner operations
pub type RunnerResult<T> = Result<T, RunnerError>;

/// Infrastructure errors for scheduling-core operations
#[derive(Error, Debug, Clone)]
pub enum QueueError {
    #[error("scheduling failed: {0}")]
    Scheduling(#[from] RunnerError),

    #[error("invalid schedule request: {0}")]
    InvalidRequest(String),

    #[error("dead letter store failed: {0}")]
    DeadLetterStore(String),

    #[error("dead letter entry not found: {0}")]
    EntryNotFound(String),

    #[error("handler already registered for job: {0}")]
    HandlerAlreadyRegistered(String),

    #[error("no handler registered for job: {0}")]
    HandlerNotRegistered(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("job execution failed: {0}")]
    JobFailed(#[from] JobError),
}

/// Failures reported by the external task runner.
///
/// The runner is an injected port; its failures surface as explicit variants
/// so producers can detect that a job was never persisted.
#[derive(Error, Debug, Clone)]
pub enum RunnerError {
    #[error("task not found: {0}")]
    NotFound(String),

    #[error("runner unavailable: {0}")]
    Unavailable(String),

    #[error("storage failure: {0}")]
    Storage(String),
}

/// Job execution outcome - determines retry behavior
#[derive(Error, Debug, Clone)]
pub enum JobError {
    /// Retryable error - handler asks for another attempt within the budget
    #[error("retryable error: {0}")]
    Retryable(String),

    /// Permanent error - dead-letter immediately, no retry
    #[error("permanent error: {0}")]
    Permanent(String),
}

impl JobError {
    /// Create a retryable error
    pub fn retryable(msg: impl Into<String>) -> Self {
        Self::Retryable(msg.into())
    }

    /// Create a permanent error
    pub fn permanent(msg: impl Into<String>) -> Self {
        Self::Permanent(msg.into())
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Retryable(_))
    }

    /// Get the error message
    pub fn message(&self) -> &str {
        match self {
            Self::Retryable(msg) | Self::Permanent(msg) => msg,
        }
    }
}

impl From<serde_json::Error> for QueueError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
