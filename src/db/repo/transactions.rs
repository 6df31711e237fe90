//! Transaction ledger operations for the repository.

use crate::domain::{
    AssetClassId, BlockNumber, EventKey, NewTransaction, RestatedTransaction, Timestamp,
    Transaction, TxHash,
};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use super::{parse_column, parse_optional_column, Repository};

/// A row is pending while its raw amount is non-zero and it has no adjusted
/// amount. Raw amounts are stored as plain decimal text, so a value is
/// non-zero exactly when it contains a non-zero digit.
const PENDING_PREDICATE: &str = "adjusted_amount IS NULL AND raw_amount GLOB '*[1-9]*'";

impl Repository {
    /// Insert debt deltas in a single transaction.
    ///
    /// A delta already recorded at the same `(block_number, log_index)` is left
    /// untouched. Returns the number of newly inserted rows.
    ///
    /// # Errors
    /// Returns an error if the transaction fails.
    pub async fn insert_transactions_batch(
        &self,
        transactions: &[NewTransaction],
    ) -> Result<usize, sqlx::Error> {
        if transactions.is_empty() {
            return Ok(0);
        }

        let mut total_inserted = 0usize;
        let mut tx = self.pool.begin().await?;

        for t in transactions {
            let result = sqlx::query(
                r#"
                INSERT INTO transactions (
                    asset_class_id, block_number, log_index, block_timestamp,
                    block_time, tx_hash, raw_amount
                ) VALUES (?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(block_number, log_index) DO NOTHING
                "#,
            )
            .bind(t.asset_class_id.map(|id| id.as_i64()))
            .bind(t.key.block_number.as_u64() as i64)
            .bind(t.key.log_index as i64)
            .bind(t.block_timestamp.as_secs())
            .bind(t.block_timestamp.to_rfc3339())
            .bind(t.tx_hash.as_ref().map(|h| h.as_str()))
            .bind(t.raw_amount.to_string())
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() > 0 {
                total_inserted += 1;
            }
        }

        tx.commit().await?;
        Ok(total_inserted)
    }

    /// Number of transactions awaiting restatement.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn count_pending_transactions(&self) -> Result<i64, sqlx::Error> {
        let row = sqlx::query(&format!(
            "SELECT COUNT(*) AS n FROM transactions WHERE {PENDING_PREDICATE}"
        ))
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get("n"))
    }

    /// Next chunk of pending transactions with `id > after_id`, ordered by id.
    ///
    /// Paging by id rather than re-querying the pending set keeps rows that are
    /// skipped in one pass from being fetched again in the same pass.
    ///
    /// # Errors
    /// Returns an error if the query fails or a stored amount is corrupt.
    pub async fn query_pending_transactions(
        &self,
        after_id: i64,
        limit: usize,
    ) -> Result<Vec<Transaction>, sqlx::Error> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT id, asset_class_id, block_number, log_index, block_timestamp,
                   tx_hash, raw_amount, adjusted_amount
            FROM transactions
            WHERE id > ? AND {PENDING_PREDICATE}
            ORDER BY id ASC
            LIMIT ?
            "#
        ))
        .bind(after_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(transaction_from_row).collect()
    }

    /// Get a single transaction by id.
    pub async fn get_transaction(&self, id: i64) -> Result<Option<Transaction>, sqlx::Error> {
        let row = sqlx::query(
            r#"
            SELECT id, asset_class_id, block_number, log_index, block_timestamp,
                   tx_hash, raw_amount, adjusted_amount
            FROM transactions
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(transaction_from_row).transpose()
    }

    /// Write adjusted amounts in a single transaction.
    ///
    /// Each update only applies to a row whose adjusted amount is still NULL,
    /// so an amount once written never changes. Returns the number of rows
    /// written.
    ///
    /// # Errors
    /// Returns an error if the transaction fails; no row of the chunk is
    /// written in that case.
    pub async fn store_adjusted_amounts(
        &self,
        restated: &[RestatedTransaction],
    ) -> Result<usize, sqlx::Error> {
        if restated.is_empty() {
            return Ok(0);
        }

        let adjusted_at = chrono::Utc::now().timestamp();
        let mut written = 0usize;
        let mut tx = self.pool.begin().await?;

        for r in restated {
            let result = sqlx::query(
                r#"
                UPDATE transactions
                SET adjusted_amount = ?, adjustment_index = ?, adjusted_at = ?
                WHERE id = ? AND adjusted_amount IS NULL
                "#,
            )
            .bind(r.adjusted_amount.to_string())
            .bind(r.index.to_string())
            .bind(adjusted_at)
            .bind(r.transaction_id)
            .execute(&mut *tx)
            .await?;

            written += result.rows_affected() as usize;
        }

        tx.commit().await?;
        Ok(written)
    }
}

fn transaction_from_row(row: &SqliteRow) -> Result<Transaction, sqlx::Error> {
    let block_number: i64 = row.try_get("block_number")?;
    let log_index: i64 = row.try_get("log_index")?;

    Ok(Transaction {
        id: row.try_get("id")?,
        asset_class_id: row
            .try_get::<Option<i64>, _>("asset_class_id")?
            .map(AssetClassId::new),
        key: EventKey::new(BlockNumber::new(block_number as u64), log_index as u32),
        block_timestamp: Timestamp::new(row.try_get("block_timestamp")?),
        tx_hash: row.try_get::<Option<String>, _>("tx_hash")?.map(TxHash::new),
        raw_amount: parse_column(row, "raw_amount")?,
        adjusted_amount: parse_optional_column(row, "adjusted_amount")?,
    })
}
