//! Index-build phase: accrue every asset class's rate history before any
//! transaction is restated.

use crate::config::RunMode;
use crate::db::Repository;
use crate::domain::DecimalScale;
use crate::engine::{IndexBuildError, RateIndexBuilder, RateLookup};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, warn};

/// An asset class whose rate history could not be accrued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedAssetClass {
    pub ilk: String,
    pub error: String,
}

/// Summary of one index-build phase.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IndexReport {
    pub asset_classes_built: usize,
    /// Ilks left out of the lookup because their epoch start is unknown.
    pub asset_classes_without_epoch: Vec<String>,
    /// Classes with malformed history or unrepresentable arithmetic; none of
    /// their indices are used or written.
    pub asset_classes_failed: Vec<FailedAssetClass>,
    pub rate_events_loaded: usize,
    pub indices_computed: usize,
    pub indices_written: usize,
}

pub struct IndexStage {
    repo: Arc<Repository>,
    builder: RateIndexBuilder,
    run_mode: RunMode,
}

impl IndexStage {
    pub fn new(repo: Arc<Repository>, scale: DecimalScale, run_mode: RunMode) -> Self {
        Self {
            repo,
            builder: RateIndexBuilder::new(scale),
            run_mode,
        }
    }

    /// Build the index series of every registered asset class.
    ///
    /// Stored indices are reused; only events without one are computed, and in
    /// apply mode those are persisted. A class whose series cannot be built
    /// (no epoch start yet, out-of-order history, precision failure) is
    /// reported and marked unavailable in the returned lookup, so its
    /// transactions are skipped downstream while other classes proceed.
    ///
    /// # Errors
    /// Returns an error if the store fails.
    pub async fn run(&self) -> Result<(RateLookup, IndexReport), sqlx::Error> {
        let mut lookup = RateLookup::new(self.builder.scale());
        let mut report = IndexReport::default();

        for asset_class in self.repo.list_asset_classes().await? {
            let events = self.repo.query_rate_events(asset_class.id).await?;
            report.rate_events_loaded += events.len();

            let series = match self.builder.build(&asset_class, &events) {
                Ok(series) => series,
                Err(err @ IndexBuildError::MissingEpochStart(_)) => {
                    warn!(
                        asset_class = %asset_class.id,
                        ilk = %asset_class.ilk_type,
                        rate_events = events.len(),
                        "Asset class has no epoch start; its transactions will be skipped"
                    );
                    report
                        .asset_classes_without_epoch
                        .push(asset_class.ilk_type.to_string());
                    lookup.mark_unavailable(asset_class.id, err);
                    continue;
                }
                Err(err) => {
                    error!(
                        asset_class = %asset_class.id,
                        ilk = %asset_class.ilk_type,
                        error = %err,
                        "Index build failed; asset class excluded from restatement"
                    );
                    report.asset_classes_failed.push(FailedAssetClass {
                        ilk: asset_class.ilk_type.to_string(),
                        error: err.to_string(),
                    });
                    lookup.mark_unavailable(asset_class.id, err);
                    continue;
                }
            };

            let computed = series.newly_computed().count();
            let written = if self.run_mode.writes() && computed > 0 {
                self.repo.store_cumulative_indices(series.events()).await?
            } else {
                0
            };

            info!(
                asset_class = %asset_class.id,
                ilk = %asset_class.ilk_type,
                rate_events = events.len(),
                computed,
                written,
                "Index series built"
            );

            report.asset_classes_built += 1;
            report.indices_computed += computed;
            report.indices_written += written;
            lookup.insert(series);
        }

        Ok((lookup, report))
    }
}
