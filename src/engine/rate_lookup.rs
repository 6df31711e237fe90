//! Index queries at arbitrary instants.

use super::rate_index::IndexBuildError;
use crate::domain::{AccruedRateEvent, AssetClassId, DecimalScale, FixedPoint, PrecisionError, Timestamp};
use std::collections::HashMap;
use thiserror::Error;

/// Failure resolving the index for one asset class at one instant.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LookupError {
    #[error("unknown asset class {0}")]
    UnknownAssetClass(AssetClassId),
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
    #[error(transparent)]
    Precision(#[from] PrecisionError),
}

/// One asset class's accrued rate history, sorted by `(block_number, log_index)`
/// and therefore by timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateSeries {
    asset_class_id: AssetClassId,
    events: Vec<AccruedRateEvent>,
}

impl RateSeries {
    pub(crate) fn new(asset_class_id: AssetClassId, events: Vec<AccruedRateEvent>) -> Self {
        Self {
            asset_class_id,
            events,
        }
    }

    pub fn asset_class_id(&self) -> AssetClassId {
        self.asset_class_id
    }

    pub fn events(&self) -> &[AccruedRateEvent] {
        &self.events
    }

    /// Events whose index was computed by the build that produced this series.
    pub fn newly_computed(&self) -> impl Iterator<Item = &AccruedRateEvent> {
        self.events.iter().filter(|e| e.newly_computed)
    }

    /// The latest rate change strictly before `timestamp`: the regime in force.
    ///
    /// A rate change at exactly `timestamp` is not yet in force; the query
    /// resolves to its predecessor.
    pub fn regime_at(&self, timestamp: Timestamp) -> Option<&AccruedRateEvent> {
        let after = self
            .events
            .partition_point(|e| e.block_timestamp < timestamp);
        after.checked_sub(1).map(|i| &self.events[i])
    }

    /// `regime.cumulative_index * regime.new_rate^(timestamp - regime.block_timestamp)`.
    pub fn index_at(&self, timestamp: Timestamp, scale: DecimalScale) -> Result<FixedPoint, LookupError> {
        let regime = self.regime_at(timestamp).ok_or(LookupError::NoRateRegime {
            asset_class_id: self.asset_class_id,
            timestamp,
        })?;
        // regime_at guarantees regime.block_timestamp < timestamp
        let elapsed = timestamp
            .seconds_since(regime.block_timestamp)
            .unwrap_or_default();
        let growth = regime.new_rate.pow(elapsed, scale.get())?;
        Ok(regime.cumulative_index.mul(&growth, scale.get())?)
    }
}

/// Index query surface over every built asset class.
#[derive(Debug, Clone, Default)]
pub struct RateLookup {
    scale: DecimalScale,
    series: HashMap<AssetClassId, RateSeries>,
    /// Registered classes whose series could not be built.
    unavailable: HashMap<AssetClassId, IndexBuildError>,
}

impl RateLookup {
    pub fn new(scale: DecimalScale) -> Self {
        Self {
            scale,
            series: HashMap::new(),
            unavailable: HashMap::new(),
        }
    }

    pub fn from_series(scale: DecimalScale, series: impl IntoIterator<Item = RateSeries>) -> Self {
        let mut lookup = Self::new(scale);
        for s in series {
            lookup.insert(s);
        }
        lookup
    }

    /// Add or replace an asset class's series.
    pub fn insert(&mut self, series: RateSeries) {
        self.unavailable.remove(&series.asset_class_id());
        self.series.insert(series.asset_class_id(), series);
    }

    /// Record that `asset_class_id` has no usable series. Queries against it
    /// fail with `IndexUnavailable` carrying `cause`.
    pub fn mark_unavailable(&mut self, asset_class_id: AssetClassId, cause: IndexBuildError) {
        self.series.remove(&asset_class_id);
        self.unavailable.insert(asset_class_id, cause);
    }

    pub fn series(&self, asset_class_id: AssetClassId) -> Option<&RateSeries> {
        self.series.get(&asset_class_id)
    }

    pub fn scale(&self) -> DecimalScale {
        self.scale
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    /// Compounded index of `asset_class_id` effective at `timestamp`.
    ///
    /// # Errors
    /// `IndexUnavailable` if the class's series failed to build,
    /// `UnknownAssetClass` if the class was never seen, `NoRateRegime` if the
    /// query predates its first rate change. No default index is ever
    /// substituted.
    pub fn index_at(
        &self,
        asset_class_id: AssetClassId,
        timestamp: Timestamp,
    ) -> Result<FixedPoint, LookupError> {
        if let Some(series) = self.series.get(&asset_class_id) {
            return series.index_at(timestamp, self.scale);
        }
        match self.unavailable.get(&asset_class_id) {
            Some(cause) => Err(LookupError::IndexUnavailable {
                asset_class_id,
                cause: cause.clone(),
            }),
            None => Err(LookupError::UnknownAssetClass(asset_class_id)),
        }
    }
}
