//! Document number sequences.
//!
//! A sequence is scoped to {company, supplier code, prefix, day}. Allocation
//! is serialized per key, so concurrent callers always get distinct values
//! and a key's values have no gaps.

pub mod in_memory;
pub mod postgres;

use std::sync::Arc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use depotflow_core::{CompanyId, DocumentNumber, DomainResult, NumberPrefix};

pub use in_memory::InMemorySequenceAllocator;
pub use postgres::PostgresSequenceAllocator;

use crate::settings::{EngineSettings, SequenceBackend};

/// Counter scope.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SequenceKey {
    pub company_id: CompanyId,
    pub supplier_code: String,
    pub prefix: NumberPrefix,
    pub date: NaiveDate,
}

impl SequenceKey {
    pub fn new(
        company_id: CompanyId,
        supplier_code: impl Into<String>,
        prefix: NumberPrefix,
        date: NaiveDate,
    ) -> Self {
        Self {
            company_id,
            supplier_code: supplier_code.into(),
            prefix,
            date,
        }
    }

    /// Render the document number for `sequence` within this key.
    pub fn number(&self, sequence: u32) -> DomainResult<DocumentNumber> {
        DocumentNumber::new(self.prefix, &self.supplier_code, self.date, sequence)
    }
}

impl core::fmt::Display for SequenceKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "{}-{}-{}",
            self.prefix,
            self.supplier_code,
            self.date.format("%d%m%y")
        )
    }
}

/// Sequence allocation error.
#[derive(Debug, Error)]
pub enum SequenceError {
    #[error("sequence {0} is exhausted")]
    Exhausted(String),

    #[error("sequence backend unavailable: {0}")]
    Unavailable(String),

    #[error("sequence storage error: {0}")]
    Storage(String),
}

/// Hands out the next value of a counter.
pub trait SequenceAllocator: Send + Sync {
    /// Atomically increment the counter of `key` and return the new value.
    /// The first value of a key is 1.
    fn next(&self, key: &SequenceKey) -> Result<u32, SequenceError>;
}

impl<A> SequenceAllocator for Arc<A>
where
    A: SequenceAllocator + ?Sized,
{
    fn next(&self, key: &SequenceKey) -> Result<u32, SequenceError> {
        (**self).next(key)
    }
}

/// Build the allocator selected by `settings`.
///
/// The Postgres backend must be built inside a tokio runtime.
pub fn allocator_from_settings(
    settings: &EngineSettings,
) -> Result<Arc<dyn SequenceAllocator>, SequenceError> {
    match &settings.sequence_backend {
        SequenceBackend::Memory => Ok(Arc::new(InMemorySequenceAllocator::new())),
        SequenceBackend::Postgres { database_url } => {
            let handle = tokio::runtime::Handle::try_current().map_err(|_| {
                SequenceError::Unavailable("postgres sequences need a tokio runtime".to_string())
            })?;
            let _guard = handle.enter();
            let pool = sqlx::PgPool::connect_lazy(database_url)
                .map_err(|e| SequenceError::Unavailable(format!("invalid database url: {e}")))?;
            Ok(Arc::new(PostgresSequenceAllocator::new(pool)))
        }
    }
}
