use thiserror::Error;

#[derive(Error, Debug)]
pub enum SecurityError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Ambiguous {kind} profile for {record}: {candidates} candidates")]
    AmbiguousProfile {
        kind:       &'static str,
        record:     String,
        candidates: usize,
    },

    #[error("\"{code}\" is not a recognised rule")]
    UnknownRule { code: String },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: i64 },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SecurityError {
    /// Errors the aggregator logs and skips past instead of aborting the batch.
    pub fn is_resolution_error(&self) -> bool {
        matches!(self, Self::AmbiguousProfile { .. })
    }
}

pub type SecurityResult<T> = Result<T, SecurityError>;
