//! Rate event operations for the repository.

use crate::domain::{
    AccruedRateEvent, AssetClassId, BlockNumber, EventKey, FixedPoint, RateEvent, Timestamp, TxHash,
};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use super::{parse_column, parse_optional_column, Repository};

impl Repository {
    /// Insert rate events in a single transaction.
    ///
    /// Events already present at the same `(asset_class_id, block_number,
    /// log_index)` are left untouched. Returns the number of newly inserted
    /// events.
    ///
    /// # Errors
    /// Returns an error if the transaction fails.
    pub async fn insert_rate_events_batch(&self, events: &[RateEvent]) -> Result<usize, sqlx::Error> {
        if events.is_empty() {
            return Ok(0);
        }

        let mut total_inserted = 0usize;
        let mut tx = self.pool.begin().await?;

        for event in events {
            let result = sqlx::query(
                r#"
                INSERT INTO rate_events (
                    asset_class_id, block_number, log_index, block_timestamp,
                    block_time, tx_hash, new_rate
                ) VALUES (?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(asset_class_id, block_number, log_index) DO NOTHING
                "#,
            )
            .bind(event.asset_class_id.as_i64())
            .bind(event.key.block_number.as_u64() as i64)
            .bind(event.key.log_index as i64)
            .bind(event.block_timestamp.as_secs())
            .bind(event.block_timestamp.to_rfc3339())
            .bind(event.tx_hash.as_ref().map(|h| h.as_str()))
            .bind(event.new_rate.to_string())
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() > 0 {
                total_inserted += 1;
            }
        }

        tx.commit().await?;
        Ok(total_inserted)
    }

    /// An asset class's rate events ordered by `(block_number, log_index)`.
    ///
    /// # Errors
    /// Returns an error if the query fails or a stored decimal is corrupt.
    pub async fn query_rate_events(
        &self,
        asset_class_id: AssetClassId,
    ) -> Result<Vec<RateEvent>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT id, asset_class_id, block_number, log_index, block_timestamp,
                   tx_hash, new_rate, cumulative_index
            FROM rate_events
            WHERE asset_class_id = ?
            ORDER BY block_number ASC, log_index ASC
            "#,
        )
        .bind(asset_class_id.as_i64())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(rate_event_from_row).collect()
    }

    /// Persist the cumulative indices computed by an index build.
    ///
    /// Only events flagged `newly_computed` are written, and only into rows
    /// whose index is still NULL: a stored index is never overwritten.
    /// Returns the number of rows written.
    ///
    /// # Errors
    /// Returns an error if the transaction fails.
    pub async fn store_cumulative_indices(
        &self,
        events: &[AccruedRateEvent],
    ) -> Result<usize, sqlx::Error> {
        let pending: Vec<(i64, &FixedPoint)> = events
            .iter()
            .filter(|e| e.newly_computed)
            .filter_map(|e| e.id.map(|id| (id, &e.cumulative_index)))
            .collect();
        if pending.is_empty() {
            return Ok(0);
        }

        let indexed_at = chrono::Utc::now().timestamp();
        let mut written = 0usize;
        let mut tx = self.pool.begin().await?;

        for (id, index) in pending {
            let result = sqlx::query(
                r#"
                UPDATE rate_events
                SET cumulative_index = ?, indexed_at = ?
                WHERE id = ? AND cumulative_index IS NULL
                "#,
            )
            .bind(index.to_string())
            .bind(indexed_at)
            .bind(id)
            .execute(&mut *tx)
            .await?;

            written += result.rows_affected() as usize;
        }

        tx.commit().await?;
        Ok(written)
    }

    /// Number of rate events still lacking a cumulative index.
    pub async fn count_unindexed_rate_events(&self) -> Result<i64, sqlx::Error> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM rate_events WHERE cumulative_index IS NULL")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("n"))
    }
}

fn rate_event_from_row(row: &SqliteRow) -> Result<RateEvent, sqlx::Error> {
    let block_number: i64 = row.try_get("block_number")?;
    let log_index: i64 = row.try_get("log_index")?;

    Ok(RateEvent {
        id: Some(row.try_get("id")?),
        asset_class_id: AssetClassId::new(row.try_get("asset_class_id")?),
        key: EventKey::new(BlockNumber::new(block_number as u64), log_index as u32),
        block_timestamp: Timestamp::new(row.try_get("block_timestamp")?),
        tx_hash: row.try_get::<Option<String>, _>("tx_hash")?.map(TxHash::new),
        new_rate: parse_column(row, "new_rate")?,
        cumulative_index: parse_optional_column(row, "cumulative_index")?,
    })
}
