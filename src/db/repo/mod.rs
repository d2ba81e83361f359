//! Repository layer for database operations.
//!
//! Methods are organized across submodules by domain:
//! - `catalog.rs` - referral links, products, marketers
//! - `clicks.rs` - click ledger and the `ReferralSource` implementation
//! - `conversions.rs` - conversion events and the `ConversionSource` implementation
//! - `commissions.rs` - commissions and the adjustment ledger
//!
//! Commission writes that must be atomic take a `&mut SqliteConnection` so the
//! caller can run them inside one transaction from [`Repository::begin`].

mod catalog;
mod clicks;
mod commissions;
mod conversions;

use crate::domain::{Amount, TimeMs};
use sqlx::sqlite::{Sqlite, SqlitePool, SqliteRow};
use sqlx::{Row, Transaction};

pub use commissions::PeriodCounts;

/// Repository for database operations.
#[derive(Debug, Clone)]
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    /// Create a new repository with the given connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Repository { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Start a transaction for a multi-statement write.
    ///
    /// Takes the write lock before any read: a deferred transaction that reads
    /// first fails with `SQLITE_BUSY` when it later upgrades under contention.
    pub async fn begin(&self) -> Result<Transaction<'static, Sqlite>, sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("UPDATE ledger_write_lock SET generation = generation + 1 WHERE id = 1")
            .execute(&mut *tx)
            .await?;
        Ok(tx)
    }
}

/// True if the error is a UNIQUE constraint violation.
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => db.is_unique_violation(),
        _ => false,
    }
}

pub(crate) fn decode_error(msg: String) -> sqlx::Error {
    sqlx::Error::Decode(msg.into())
}

pub(crate) fn amount_col(row: &SqliteRow, col: &str) -> Result<Amount, sqlx::Error> {
    let raw: String = row.try_get(col)?;
    Amount::parse(&raw).map_err(|e| decode_error(format!("{} = {:?}: {}", col, raw, e)))
}

pub(crate) fn opt_amount_col(row: &SqliteRow, col: &str) -> Result<Option<Amount>, sqlx::Error> {
    let raw: Option<String> = row.try_get(col)?;
    raw.map(|s| Amount::parse(&s).map_err(|e| decode_error(format!("{} = {:?}: {}", col, s, e))))
        .transpose()
}

pub(crate) fn time_col(row: &SqliteRow, col: &str) -> Result<TimeMs, sqlx::Error> {
    Ok(TimeMs::new(row.try_get(col)?))
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::Repository;
    use crate::db::migrations::init_db;
    use tempfile::TempDir;

    pub async fn setup_test_db() -> (Repository, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir
            .path()
            .join("test.db")
            .to_string_lossy()
            .to_string();
        let pool = init_db(&db_path).await.expect("init_db failed");
        (Repository::new(pool), temp_dir)
    }
}
