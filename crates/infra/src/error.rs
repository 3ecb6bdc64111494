use thiserror::Error;

use depotflow_core::DomainError;

use crate::sequence::SequenceError;
use crate::store::StoreError;

/// Error of an engine operation.
///
/// Store concurrency and uniqueness failures surface as
/// `Domain(DomainError::Conflict)`: to the caller a lost race and a stale
/// read look the same, and both are retried by re-reading.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("store error: {0}")]
    Store(StoreError),

    #[error("sequence allocation failed: {0}")]
    Sequence(#[from] SequenceError),

    #[error("event payload serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The changeset was committed but publishing its events failed.
    #[error("event publication failed: {0}")]
    Publish(String),
}

impl From<StoreError> for EngineError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Concurrency(msg) | StoreError::UniqueViolation(msg) => {
                EngineError::Domain(DomainError::Conflict(msg))
            }
            other => EngineError::Store(other),
        }
    }
}

impl EngineError {
    /// Whether re-reading current state and retrying once may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::Domain(DomainError::Conflict(_)))
    }

    pub fn domain(&self) -> Option<&DomainError> {
        match self {
            EngineError::Domain(e) => Some(e),
            _ => None,
        }
    }
}
