//! Restating raw debt deltas into interest-adjusted amounts.

use super::rate_index::IndexBuildError;
use super::rate_lookup::{LookupError, RateLookup};
use crate::domain::{AssetClassId, PrecisionError, RestatedTransaction, Timestamp, Transaction};
use serde::Serialize;
use thiserror::Error;

/// Why a pending transaction was left without an adjusted amount.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SkipReason {
    #[error("unknown asset class {}", display_class(.asset_class_id))]
    UnknownAssetClass { asset_class_id: Option<AssetClassId> },
    #[error("no index for asset class {asset_class_id}: {cause}")]
    IndexUnavailable {
        asset_class_id: AssetClassId,
        cause: IndexBuildError,
    },
    #[error("asset class {asset_class_id} has no rate change before {timestamp}")]
    NoRateRegime {
        asset_class_id: AssetClassId,
        timestamp: Timestamp,
    },
    #[error("restatement arithmetic failed: {0}")]
    Precision(PrecisionError),
}

fn display_class(id: &Option<AssetClassId>) -> String {
    id.map(|id| id.to_string())
        .unwrap_or_else(|| "<none>".to_string())
}

impl SkipReason {
    /// Stable label used in reports and log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            SkipReason::UnknownAssetClass { .. } => "unknown_asset_class",
            SkipReason::IndexUnavailable {
                cause: IndexBuildError::MissingEpochStart(_),
                ..
            } => "missing_epoch_start",
            SkipReason::IndexUnavailable { .. } => "index_build_failed",
            SkipReason::NoRateRegime { .. } => "no_rate_regime",
            SkipReason::Precision(_) => "precision",
        }
    }
}

impl From<LookupError> for SkipReason {
    fn from(err: LookupError) -> Self {
        match err {
            LookupError::UnknownAssetClass(id) => SkipReason::UnknownAssetClass {
                asset_class_id: Some(id),
            },
            LookupError::IndexUnavailable {
                asset_class_id,
                cause,
            } => SkipReason::IndexUnavailable {
                asset_class_id,
                cause,
            },
            LookupError::NoRateRegime {
                asset_class_id,
                timestamp,
            } => SkipReason::NoRateRegime {
                asset_class_id,
                timestamp,
            },
            LookupError::Precision(e) => SkipReason::Precision(e),
        }
    }
}

/// A pending row that could not be restated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedRow {
    pub transaction_id: i64,
    #[serde(serialize_with = "serialize_reason")]
    pub reason: SkipReason,
}

fn serialize_reason<S: serde::Serializer>(reason: &SkipReason, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&reason.to_string())
}

/// Result of processing one chunk of transactions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub restated: Vec<RestatedTransaction>,
    pub skipped: Vec<SkippedRow>,
    /// Rows that already carried an adjusted amount.
    pub already_restated: usize,
    /// Rows with a zero raw amount; nothing to restate.
    pub zero_amount: usize,
}

impl BatchOutcome {
    pub fn rows_seen(&self) -> usize {
        self.restated.len() + self.skipped.len() + self.already_restated + self.zero_amount
    }
}

/// Applies the index lookup to each transaction of a chunk.
///
/// Each row depends only on its own raw amount and the index at its own
/// timestamp, so chunks can be processed in any order and re-processed safely.
#[derive(Debug, Clone, Copy)]
pub struct RestatementProcessor<'a> {
    lookup: &'a RateLookup,
}

impl<'a> RestatementProcessor<'a> {
    pub fn new(lookup: &'a RateLookup) -> Self {
        Self { lookup }
    }

    /// Restate every pending transaction in `transactions`.
    ///
    /// Rows with an adjusted amount are never recomputed; rows whose asset
    /// class or rate regime cannot be resolved are reported in `skipped`.
    pub fn process_batch(&self, transactions: &[Transaction]) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();

        for tx in transactions {
            if tx.adjusted_amount.is_some() {
                outcome.already_restated += 1;
                continue;
            }
            if tx.raw_amount.is_zero() {
                outcome.zero_amount += 1;
                continue;
            }

            match self.restate(tx) {
                Ok(restated) => outcome.restated.push(restated),
                Err(reason) => outcome.skipped.push(SkippedRow {
                    transaction_id: tx.id,
                    reason,
                }),
            }
        }

        outcome
    }

    fn restate(&self, tx: &Transaction) -> Result<RestatedTransaction, SkipReason> {
        let asset_class_id = tx.asset_class_id.ok_or(SkipReason::UnknownAssetClass {
            asset_class_id: None,
        })?;
        let index = self.lookup.index_at(asset_class_id, tx.block_timestamp)?;
        let adjusted_amount = tx
            .raw_amount
            .scaled_by(&index)
            .map_err(SkipReason::Precision)?;

        Ok(RestatedTransaction {
            transaction_id: tx.id,
            asset_class_id,
            block_timestamp: tx.block_timestamp,
            raw_amount: tx.raw_amount,
            index,
            adjusted_amount,
        })
    }
}
