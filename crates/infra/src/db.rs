//! Database pool and storage errors.

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl StoreError {
    /// True when the underlying error is a unique-constraint violation
    /// (Postgres 23505), i.e. a natural-key conflict.
    pub fn is_unique_violation(&self) -> bool {
        match self {
            StoreError::Database(sqlx::Error::Database(db)) => {
                db.code().as_deref() == Some("23505")
            }
            _ => false,
        }
    }
}

/// Bounded connection pool; one lease per logical unit of work.
pub async fn connect_pool(database_url: &str) -> Result<PgPool, StoreError> {
    let pool = PgPoolOptions::new()
        .min_connections(1)
        .max_connections(15)
        .connect(database_url)
        .await?;
    Ok(pool)
}
