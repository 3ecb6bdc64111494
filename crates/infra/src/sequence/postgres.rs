//! Postgres-backed sequence allocator.
//!
//! Counters live in `sequence_counters` (see `migrations/`). Allocation is a
//! single upsert that increments and returns the counter, so the row lock
//! taken by Postgres serializes concurrent callers of the same key.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | SequenceError |
//! |------------|----------------------|---------------|
//! | Database (check constraint) | `23514` | `Exhausted` |
//! | Database (other) | Any other | `Storage` |
//! | PoolClosed / Io / connect failures | N/A | `Unavailable` |
//! | Other | N/A | `Storage` |

use std::sync::Arc;

use sqlx::{PgPool, Row};
use tracing::{Span, instrument};

use super::{SequenceAllocator, SequenceError, SequenceKey};

const SCHEMA: &str = include_str!("../../migrations/0001_sequence_counters.sql");

/// Counter table in Postgres.
#[derive(Debug, Clone)]
pub struct PostgresSequenceAllocator {
    pool: Arc<PgPool>,
}

impl PostgresSequenceAllocator {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Create the counter table if it does not exist.
    #[instrument(skip(self), err)]
    pub async fn ensure_schema(&self) -> Result<(), SequenceError> {
        sqlx::query(SCHEMA)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        Ok(())
    }

    /// Increment and return the counter of `key`.
    #[instrument(
        skip(self),
        fields(
            company_id = %key.company_id,
            prefix = %key.prefix,
            supplier_code = %key.supplier_code,
            value = tracing::field::Empty
        ),
        err
    )]
    pub async fn allocate(&self, key: &SequenceKey) -> Result<u32, SequenceError> {
        let row = sqlx::query(
            r#"
            INSERT INTO sequence_counters (company_id, prefix, supplier_code, number_date, last_value)
            VALUES ($1, $2, $3, $4, 1)
            ON CONFLICT (company_id, prefix, supplier_code, number_date)
            DO UPDATE SET last_value = sequence_counters.last_value + 1, updated_at = now()
            RETURNING last_value
            "#,
        )
        .bind(key.company_id.as_uuid())
        .bind(key.prefix.as_str())
        .bind(&key.supplier_code)
        .bind(key.date)
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("allocate", e))?;

        let value = read_counter(&row, key)?;
        Span::current().record("value", value);
        Ok(value)
    }

    /// Prime `key` so the next allocation follows `highest`; never lowers a
    /// counter.
    #[instrument(
        skip(self),
        fields(company_id = %key.company_id, prefix = %key.prefix),
        err
    )]
    pub async fn seed(&self, key: &SequenceKey, highest: u32) -> Result<u32, SequenceError> {
        if highest == 0 {
            return Ok(0);
        }
        let row = sqlx::query(
            r#"
            INSERT INTO sequence_counters (company_id, prefix, supplier_code, number_date, last_value)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (company_id, prefix, supplier_code, number_date)
            DO UPDATE SET last_value = GREATEST(sequence_counters.last_value, EXCLUDED.last_value),
                          updated_at = now()
            RETURNING last_value
            "#,
        )
        .bind(key.company_id.as_uuid())
        .bind(key.prefix.as_str())
        .bind(&key.supplier_code)
        .bind(key.date)
        .bind(i64::from(highest))
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("seed", e))?;

        read_counter(&row, key)
    }
}

fn read_counter(row: &sqlx::postgres::PgRow, key: &SequenceKey) -> Result<u32, SequenceError> {
    let value: i64 = row
        .try_get("last_value")
        .map_err(|e| SequenceError::Storage(format!("failed to read last_value: {e}")))?;
    u32::try_from(value).map_err(|_| SequenceError::Exhausted(key.to_string()))
}

impl SequenceAllocator for PostgresSequenceAllocator {
    /// Blocking allocation on the current tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics when called from inside an async task, since the runtime
    /// cannot block on itself. Async callers use [`Self::allocate`]; engine
    /// operations run on a blocking thread (`tokio::task::spawn_blocking`).
    fn next(&self, key: &SequenceKey) -> Result<u32, SequenceError> {
        // The allocator trait is synchronous; run the query on the caller's
        // tokio runtime.
        let handle = tokio::runtime::Handle::try_current().map_err(|_| {
            SequenceError::Unavailable(
                "PostgresSequenceAllocator requires a tokio runtime context".to_string(),
            )
        })?;

        handle.block_on(self.allocate(key))
    }
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> SequenceError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("23514") => SequenceError::Exhausted(msg),
                _ => SequenceError::Storage(msg),
            }
        }
        sqlx::Error::PoolClosed | sqlx::Error::PoolTimedOut => {
            SequenceError::Unavailable(format!("connection pool unavailable in {operation}"))
        }
        sqlx::Error::Io(e) => SequenceError::Unavailable(format!("io error in {operation}: {e}")),
        _ => SequenceError::Storage(format!("sqlx error in {}: {}", operation, err)),
    }
}
