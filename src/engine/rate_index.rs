//! Cumulative index accrual over an asset class's rate-change history.
//!
//! The index starts at exactly 1.0 at the asset class's epoch start. Between
//! two rate changes it grows by `rate^elapsed_seconds` using the rate that was
//! in force, so the index at event `k` is
//! `index[k-1] * rate[k-1]^(t[k] - t[k-1])`.

use super::rate_lookup::RateSeries;
use crate::domain::{
    AccruedRateEvent, AssetClass, AssetClassId, DecimalScale, EventKey, FixedPoint,
    PrecisionError, RateEvent, Timestamp,
};
use thiserror::Error;

/// Rate assumed in force before the first explicit rate change: no interest
/// accrues between the epoch start and the first event.
pub const BASELINE_RATE: FixedPoint = FixedPoint::one();

/// Malformed or out-of-order rate history.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderingError {
    #[error("event {current} does not follow {previous} in block/log order")]
    KeyNotIncreasing {
        previous: EventKey,
        current: EventKey,
    },
    #[error("event {key} timestamp {current} precedes the prior event's {previous}")]
    TimestampDecreased {
        key: EventKey,
        previous: Timestamp,
        current: Timestamp,
    },
    #[error("event {key} at {timestamp} predates epoch start {epoch_start}")]
    BeforeEpochStart {
        key: EventKey,
        epoch_start: Timestamp,
        timestamp: Timestamp,
    },
    #[error("event {key} carries a cached index after an event without one")]
    CachedIndexAfterGap { key: EventKey },
    #[error("event {key} belongs to asset class {found}, expected {expected}")]
    ForeignEvent {
        key: EventKey,
        expected: AssetClassId,
        found: AssetClassId,
    },
}

/// Failure building one asset class's index series.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IndexBuildError {
    #[error("asset class {0} has no epoch start")]
    MissingEpochStart(AssetClassId),
    #[error(transparent)]
    Ordering(#[from] OrderingError),
    #[error("accruing event {key}: {source}")]
    Precision {
        key: EventKey,
        #[source]
        source: PrecisionError,
    },
}

/// Builds the compounding index series for an asset class.
#[derive(Debug, Clone, Copy, Default)]
pub struct RateIndexBuilder {
    scale: DecimalScale,
}

/// Running accrual state: the last point at which the index is known.
struct Accrual {
    timestamp: Timestamp,
    index: FixedPoint,
    rate: FixedPoint,
}

impl RateIndexBuilder {
    pub fn new(scale: DecimalScale) -> Self {
        Self { scale }
    }

    pub fn scale(&self) -> DecimalScale {
        self.scale
    }

    /// Populate the cumulative index of every event.
    ///
    /// `events` must be sorted ascending by `(block_number, log_index)` with
    /// non-decreasing timestamps. Indices already present are kept verbatim
    /// (they are immutable once computed) and must form a prefix of the
    /// sequence; only the missing tail is computed.
    ///
    /// # Errors
    /// Returns `MissingEpochStart` if the asset class has no epoch start,
    /// `Ordering` for out-of-order or foreign input, and `Precision` if the
    /// arithmetic cannot be carried out at the configured scale.
    pub fn build(
        &self,
        asset_class: &AssetClass,
        events: &[RateEvent],
    ) -> Result<RateSeries, IndexBuildError> {
        let epoch_start = asset_class
            .epoch_start
            .ok_or(IndexBuildError::MissingEpochStart(asset_class.id))?;
        let scale = self.scale.get();

        let mut accrual = Accrual {
            timestamp: epoch_start,
            index: FixedPoint::one(),
            rate: BASELINE_RATE,
        };
        let mut previous_key: Option<EventKey> = None;
        let mut computing = false;
        let mut accrued = Vec::with_capacity(events.len());

        for event in events {
            if event.asset_class_id != asset_class.id {
                return Err(OrderingError::ForeignEvent {
                    key: event.key,
                    expected: asset_class.id,
                    found: event.asset_class_id,
                }
                .into());
            }
            if let Some(previous) = previous_key {
                if event.key <= previous {
                    return Err(OrderingError::KeyNotIncreasing {
                        previous,
                        current: event.key,
                    }
                    .into());
                }
            }

            let elapsed = event
                .block_timestamp
                .seconds_since(accrual.timestamp)
                .ok_or_else(|| match previous_key {
                    None => OrderingError::BeforeEpochStart {
                        key: event.key,
                        epoch_start,
                        timestamp: event.block_timestamp,
                    },
                    Some(_) => OrderingError::TimestampDecreased {
                        key: event.key,
                        previous: accrual.timestamp,
                        current: event.block_timestamp,
                    },
                })?;

            let (index, newly_computed) = match event.cumulative_index {
                Some(_) if computing => {
                    return Err(OrderingError::CachedIndexAfterGap { key: event.key }.into())
                }
                Some(cached) => (cached, false),
                None => {
                    computing = true;
                    let index = accrue(&accrual, elapsed, scale).map_err(|source| {
                        IndexBuildError::Precision {
                            key: event.key,
                            source,
                        }
                    })?;
                    (index, true)
                }
            };

            accrued.push(AccruedRateEvent {
                id: event.id,
                asset_class_id: event.asset_class_id,
                key: event.key,
                block_timestamp: event.block_timestamp,
                new_rate: event.new_rate,
                cumulative_index: index,
                newly_computed,
            });

            accrual = Accrual {
                timestamp: event.block_timestamp,
                index,
                rate: event.new_rate,
            };
            previous_key = Some(event.key);
        }

        Ok(RateSeries::new(asset_class.id, accrued))
    }
}

/// `index * rate^elapsed`, each step rounded half-up to `scale`.
fn accrue(accrual: &Accrual, elapsed: u64, scale: u32) -> Result<FixedPoint, PrecisionError> {
    let growth = accrual.rate.pow(elapsed, scale)?;
    accrual.index.mul(&growth, scale)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{BlockNumber, IlkType};
    use std::str::FromStr;

    fn asset_class(epoch_start: Option<i64>) -> AssetClass {
        AssetClass::new(
            AssetClassId::new(1),
            IlkType::new("ETH-A".to_string()),
            epoch_start.map(Timestamp::new),
        )
    }

    fn event(block: u64, timestamp: i64, rate: &str) -> RateEvent {
        RateEvent::new(
            AssetClassId::new(1),
            EventKey::new(BlockNumber::new(block), 0),
            Timestamp::new(timestamp),
            FixedPoint::from_str(rate).unwrap(),
        )
    }

    fn fp(s: &str) -> FixedPoint {
        FixedPoint::from_str(s).unwrap()
    }

    #[test]
    fn test_first_event_accrues_at_baseline_rate() {
        let builder = RateIndexBuilder::new(DecimalScale::RAY);
        let series = builder
            .build(&asset_class(Some(0)), &[event(10, 1000, "1.0000001")])
            .unwrap();

        assert_eq!(series.events()[0].cumulative_index, FixedPoint::one());
        assert!(series.events()[0].newly_computed);
    }

    #[test]
    fn test_two_event_history() {
        let builder = RateIndexBuilder::new(DecimalScale::RAY);
        let series = builder
            .build(
                &asset_class(Some(0)),
                &[event(10, 1000, "1.0000001"), event(20, 5000, "1.0000002")],
            )
            .unwrap();

        let events = series.events();
        assert_eq!(events[0].cumulative_index, FixedPoint::one());
        // 1.0 * 1.0000001^4000
        assert_eq!(
            events[1].cumulative_index.to_string(),
            "1.000400079990659733152525755"
        );
    }

    #[test]
    fn test_missing_epoch_start() {
        let builder = RateIndexBuilder::default();
        let err = builder
            .build(&asset_class(None), &[event(10, 1000, "1.0000001")])
            .unwrap_err();
        assert_eq!(err, IndexBuildError::MissingEpochStart(AssetClassId::new(1)));
    }

    #[test]
    fn test_rejects_unsorted_blocks() {
        let builder = RateIndexBuilder::default();
        let err = builder
            .build(
                &asset_class(Some(0)),
                &[event(20, 1000, "1.0000001"), event(10, 2000, "1.0000002")],
            )
            .unwrap_err();
        assert!(matches!(
            err,
            IndexBuildError::Ordering(OrderingError::KeyNotIncreasing { .. })
        ));
    }

    #[test]
    fn test_rejects_timestamp_going_backwards() {
        let builder = RateIndexBuilder::default();
        let err = builder
            .build(
                &asset_class(Some(0)),
                &[event(10, 2000, "1.0000001"), event(20, 1999, "1.0000002")],
            )
            .unwrap_err();
        assert_eq!(
            err,
            IndexBuildError::Ordering(OrderingError::TimestampDecreased {
                key: EventKey::new(BlockNumber::new(20), 0),
                previous: Timestamp::new(2000),
                current: Timestamp::new(1999),
            })
        );
    }

    #[test]
    fn test_rejects_event_before_epoch_start() {
        let builder = RateIndexBuilder::default();
        let err = builder
            .build(&asset_class(Some(5000)), &[event(10, 4000, "1.0000001")])
            .unwrap_err();
        assert!(matches!(
            err,
            IndexBuildError::Ordering(OrderingError::BeforeEpochStart { .. })
        ));
    }

    #[test]
    fn test_same_block_events_ordered_by_log_index() {
        let builder = RateIndexBuilder::default();
        let mut second = event(10, 1000, "1.0000002");
        second.key.log_index = 3;
        let series = builder
            .build(&asset_class(Some(0)), &[event(10, 1000, "1.0000001"), second])
            .unwrap();
        // zero seconds elapse between the two
        assert_eq!(series.events()[1].cumulative_index, FixedPoint::one());
    }

    #[test]
    fn test_reuses_cached_prefix_and_computes_tail() {
        let builder = RateIndexBuilder::default();
        // A deliberately unusual cached value proves it is reused, not recomputed.
        let cached = event(10, 1000, "1.0000001").with_cumulative_index(fp("2"));
        let series = builder
            .build(&asset_class(Some(0)), &[cached, event(20, 5000, "1.0000002")])
            .unwrap();

        let events = series.events();
        assert!(!events[0].newly_computed);
        assert_eq!(events[0].cumulative_index, fp("2"));
        assert!(events[1].newly_computed);
        assert_eq!(
            events[1].cumulative_index.to_string(),
            "2.000800159981319466305051510"
        );
    }

    #[test]
    fn test_rejects_cached_index_after_gap() {
        let builder = RateIndexBuilder::default();
        let late = event(20, 5000, "1.0000002").with_cumulative_index(fp("1.5"));
        let err = builder
            .build(&asset_class(Some(0)), &[event(10, 1000, "1.0000001"), late])
            .unwrap_err();
        assert!(matches!(
            err,
            IndexBuildError::Ordering(OrderingError::CachedIndexAfterGap { .. })
        ));
    }

    #[test]
    fn test_rejects_foreign_event() {
        let builder = RateIndexBuilder::default();
        let mut foreign = event(10, 1000, "1.0000001");
        foreign.asset_class_id = AssetClassId::new(2);
        let err = builder
            .build(&asset_class(Some(0)), &[foreign])
            .unwrap_err();
        assert!(matches!(
            err,
            IndexBuildError::Ordering(OrderingError::ForeignEvent { .. })
        ));
    }

    #[test]
    fn test_empty_history_builds_empty_series() {
        let builder = RateIndexBuilder::default();
        let series = builder.build(&asset_class(Some(0)), &[]).unwrap();
        assert!(series.events().is_empty());
    }
}
