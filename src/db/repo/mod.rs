//! Typed access to the ledger tables.
//!
//! Asset classes live here; the other tables have their own submodules:
//! - `rate_events.rs` - Rate changes and their cumulative indices
//! - `transactions.rs` - Debt deltas and their adjusted amounts

mod rate_events;
mod transactions;

use crate::domain::{AssetClass, AssetClassId, IlkType, Timestamp, TxHash};
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::Row;
use std::str::FromStr;
use tracing::warn;

/// Ledger reads and write-once updates over a shared pool.
#[derive(Debug, Clone)]
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    /// Create a new repository with the given connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Repository { pool }
    }

    // =========================================================================
    // Asset class operations
    // =========================================================================

    /// Register an asset class by its ilk type, returning its id.
    ///
    /// Registering an existing ilk is a no-op that returns the existing id.
    ///
    /// # Errors
    /// Returns an error if the insert or lookup fails.
    pub async fn upsert_asset_class(&self, ilk_type: &IlkType) -> Result<AssetClassId, sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO asset_classes (ilk_type, created_at)
            VALUES (?, ?)
            ON CONFLICT(ilk_type) DO NOTHING
            "#,
        )
        .bind(ilk_type.as_str())
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await?;

        let row = sqlx::query("SELECT id FROM asset_classes WHERE ilk_type = ?")
            .bind(ilk_type.as_str())
            .fetch_one(&self.pool)
            .await?;

        Ok(AssetClassId::new(row.get("id")))
    }

    /// Record the instant an asset class's index starts at 1.0.
    ///
    /// The epoch start is write-once: returns `false` without touching the row
    /// if it is already set.
    ///
    /// # Errors
    /// Returns an error if the update fails.
    pub async fn backfill_epoch_start(
        &self,
        asset_class_id: AssetClassId,
        epoch_start: Timestamp,
        init_tx_hash: Option<&TxHash>,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE asset_classes
            SET epoch_start = ?, init_tx_hash = ?
            WHERE id = ? AND epoch_start IS NULL
            "#,
        )
        .bind(epoch_start.as_secs())
        .bind(init_tx_hash.map(|h| h.as_str()))
        .bind(asset_class_id.as_i64())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Get an asset class by ilk type.
    pub async fn get_asset_class(&self, ilk_type: &IlkType) -> Result<Option<AssetClass>, sqlx::Error> {
        let row = sqlx::query("SELECT id, ilk_type, epoch_start FROM asset_classes WHERE ilk_type = ?")
            .bind(ilk_type.as_str())
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.as_ref().map(asset_class_from_row))
    }

    /// All registered asset classes, ordered by id.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn list_asset_classes(&self) -> Result<Vec<AssetClass>, sqlx::Error> {
        let rows = sqlx::query("SELECT id, ilk_type, epoch_start FROM asset_classes ORDER BY id ASC")
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.iter().map(asset_class_from_row).collect())
    }
}

fn asset_class_from_row(row: &SqliteRow) -> AssetClass {
    AssetClass::new(
        AssetClassId::new(row.get("id")),
        IlkType::new(row.get("ilk_type")),
        row.get::<Option<i64>, _>("epoch_start").map(Timestamp::new),
    )
}

/// Parse a decimal column, failing the read instead of substituting a default.
///
/// A corrupt rate or amount must never flow into accrual as zero.
fn parse_column<T>(row: &SqliteRow, column: &str) -> Result<T, sqlx::Error>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: String = row.try_get(column)?;
    T::from_str(&raw).map_err(|e| {
        warn!(column = %column, value = %raw, error = %e, "Failed to parse stored decimal");
        sqlx::Error::ColumnDecode {
            index: column.to_string(),
            source: Box::new(e),
        }
    })
}

/// Nullable variant of [`parse_column`].
fn parse_optional_column<T>(row: &SqliteRow, column: &str) -> Result<Option<T>, sqlx::Error>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: Option<String> = row.try_get(column)?;
    match raw {
        None => Ok(None),
        Some(raw) => T::from_str(&raw).map(Some).map_err(|e| {
            warn!(column = %column, value = %raw, error = %e, "Failed to parse stored decimal");
            sqlx::Error::ColumnDecode {
                index: column.to_string(),
                source: Box::new(e),
            }
        }),
    }
}
