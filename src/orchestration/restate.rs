//! Restatement phase: chunked, resumable scan over pending transactions.

use crate::config::RunMode;
use crate::db::Repository;
use crate::domain::RestatedTransaction;
use crate::engine::{RateLookup, RestatementProcessor};
use backoff::future::retry;
use backoff::ExponentialBackoff;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Summary of one restatement phase.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RestatementReport {
    pub run_mode: RunMode,
    /// Rows pending when the phase started.
    pub pending_before: i64,
    pub chunks: usize,
    pub rows_scanned: usize,
    pub restated: usize,
    /// Rows actually written; zero in dry-run mode.
    pub written: usize,
    pub already_restated: usize,
    pub zero_amount: usize,
    /// Skipped rows by reason.
    pub skipped: BTreeMap<String, usize>,
}

impl RestatementReport {
    pub fn skipped_total(&self) -> usize {
        self.skipped.values().sum()
    }
}

pub struct Restater {
    repo: Arc<Repository>,
    chunk_size: usize,
    run_mode: RunMode,
}

impl Restater {
    pub fn new(repo: Arc<Repository>, chunk_size: usize, run_mode: RunMode) -> Self {
        Self {
            repo,
            chunk_size: chunk_size.max(1),
            run_mode,
        }
    }

    /// Restate every pending transaction, one chunk at a time.
    ///
    /// Chunks are read by ascending id after the last id seen, so rows skipped
    /// in this pass are not fetched again and an interrupted run resumes by
    /// simply running again. Each chunk is computed in full before it is
    /// written in a single store transaction.
    ///
    /// # Errors
    /// Returns an error if the store stays unavailable after retrying.
    pub async fn run(&self, lookup: &RateLookup) -> Result<RestatementReport, sqlx::Error> {
        let processor = RestatementProcessor::new(lookup);
        let mut report = RestatementReport {
            run_mode: self.run_mode,
            pending_before: self.repo.count_pending_transactions().await?,
            ..Default::default()
        };
        info!(
            pending = report.pending_before,
            chunk_size = self.chunk_size,
            run_mode = ?self.run_mode,
            "Restating transactions"
        );

        let mut after_id = 0i64;
        loop {
            let rows = with_store_retry(|| {
                self.repo
                    .query_pending_transactions(after_id, self.chunk_size)
            })
            .await?;
            let Some(last) = rows.last() else {
                break;
            };
            after_id = last.id;
            report.chunks += 1;

            let outcome = processor.process_batch(&rows);
            for skipped in &outcome.skipped {
                warn!(
                    transaction_id = skipped.transaction_id,
                    reason = skipped.reason.kind(),
                    "Skipping transaction: {}",
                    skipped.reason
                );
                *report
                    .skipped
                    .entry(skipped.reason.kind().to_string())
                    .or_default() += 1;
            }

            let written = match self.run_mode {
                RunMode::Apply => {
                    with_store_retry(|| self.repo.store_adjusted_amounts(&outcome.restated)).await?
                }
                RunMode::DryRun => {
                    log_dry_run(&outcome.restated);
                    0
                }
            };

            report.rows_scanned += outcome.rows_seen();
            report.restated += outcome.restated.len();
            report.written += written;
            report.already_restated += outcome.already_restated;
            report.zero_amount += outcome.zero_amount;

            info!(
                chunk = report.chunks,
                last_id = after_id,
                rows = rows.len(),
                restated = outcome.restated.len(),
                written,
                skipped = outcome.skipped.len(),
                "Chunk processed"
            );
        }

        info!(
            chunks = report.chunks,
            restated = report.restated,
            written = report.written,
            skipped = report.skipped_total(),
            "Restatement complete"
        );
        Ok(report)
    }
}

fn log_dry_run(restated: &[RestatedTransaction]) {
    for r in restated {
        debug!(
            transaction_id = r.transaction_id,
            asset_class = %r.asset_class_id,
            block_time = %r.block_timestamp.to_rfc3339(),
            raw = %r.raw_amount,
            index = %r.index,
            adjusted = %r.adjusted_amount,
            "Dry run: would write adjusted amount"
        );
    }
}

/// Retry a store operation on errors that can clear up on their own
/// (busy/locked database, pool exhaustion, I/O).
///
/// Writes are write-once at the row level, so repeating a chunk write after a
/// partial failure cannot change an amount already stored.
async fn with_store_retry<T, F, Fut>(op: F) -> Result<T, sqlx::Error>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T, sqlx::Error>>,
{
    let backoff = ExponentialBackoff {
        max_elapsed_time: Some(Duration::from_secs(30)),
        ..Default::default()
    };

    retry(backoff, || async {
        op().await.map_err(|e| {
            if is_transient(&e) {
                warn!(error = %e, "Transient store error, retrying");
                backoff::Error::transient(e)
            } else {
                backoff::Error::permanent(e)
            }
        })
    })
    .await
}

fn is_transient(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => true,
        // SQLITE_BUSY / SQLITE_LOCKED
        sqlx::Error::Database(db) => matches!(db.code().as_deref(), Some("5") | Some("6")),
        _ => false,
    }
}
