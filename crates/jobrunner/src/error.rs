use thiserror::Error;

/// Failures of the durable queue store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("queue {queue} is corrupt: {reason}")]
    Corrupt { queue: String, reason: String },

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("failed to persist queue {queue}: {source}")]
    Persist {
        queue: String,
        #[source]
        source: StoreError,
    },

    #[error("failed to load queue {queue}: {source}")]
    Load {
        queue: String,
        #[source]
        source: StoreError,
    },

    #[error("job of type {got} cannot be added to the {expected} queue")]
    WrongJobType { expected: String, got: String },

    #[error("queue {0} is stopped")]
    Stopped(String),
}

/// Error returned by the collaborators job bodies delegate to.
///
/// Bodies map `NotFound`/`Invalid` to a permanent failure and `Transient` to a retry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid: {0}")]
    Invalid(String),

    #[error("transient: {0}")]
    Transient(String),
}

impl ServiceError {
    pub fn is_permanent(&self) -> bool {
        matches!(self, ServiceError::NotFound(_) | ServiceError::Invalid(_))
    }
}
