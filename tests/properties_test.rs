//! Property-based tests for accrual, lookup and restatement rounding.

use ethnum::U256;
use ilk_accrual::domain::{
    Amount, AssetClass, AssetClassId, BlockNumber, DecimalScale, EventKey, FixedPoint, IlkType,
    RateEvent, Timestamp,
};
use ilk_accrual::engine::{RateIndexBuilder, RateLookup, RateSeries};
use proptest::prelude::*;

const CLASS: AssetClassId = AssetClassId(1);
const EPOCH: i64 = 1_000_000;

// ============================================================================
// Strategies
// ============================================================================

/// Per-second rates in [1, 1 + 1e-8], expressed at 27 decimals.
fn rate_at_least_one() -> impl Strategy<Value = FixedPoint> {
    (0u64..=10_000).prop_map(|k| {
        let mantissa = U256::from(10u8).pow(27) + U256::from(k) * U256::from(10u8).pow(15);
        FixedPoint::from_mantissa(mantissa, 27)
    })
}

/// A rate history: (gap since the previous event, rate). Gaps of zero give
/// several rate changes in the same second.
fn history(max_events: usize) -> impl Strategy<Value = Vec<(i64, FixedPoint)>> {
    prop::collection::vec((0i64..50_000, rate_at_least_one()), 1..max_events)
}

/// Positive amounts up to one million tokens, 18 decimals.
fn amount_mantissa() -> impl Strategy<Value = u128> {
    1u128..1_000_000_000_000_000_000_000_000
}

fn build(history: &[(i64, FixedPoint)]) -> RateSeries {
    let class = AssetClass::new(
        CLASS,
        IlkType::new("ETH-A".to_string()),
        Some(Timestamp::new(EPOCH)),
    );
    let mut ts = EPOCH;
    let events: Vec<RateEvent> = history
        .iter()
        .enumerate()
        .map(|(i, (gap, rate))| {
            ts += gap;
            RateEvent::new(
                CLASS,
                EventKey::new(BlockNumber::new(100 + i as u64), 0),
                Timestamp::new(ts),
                *rate,
            )
        })
        .collect();
    RateIndexBuilder::new(DecimalScale::RAY)
        .build(&class, &events)
        .unwrap()
}

fn last_timestamp(series: &RateSeries) -> i64 {
    series.events().last().unwrap().block_timestamp.as_secs()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// With every rate at or above one the index never decreases over time.
    #[test]
    fn prop_index_monotonic_when_rates_at_least_one(
        steps in history(8),
        offsets in prop::collection::vec(1i64..400_000, 2..10),
    ) {
        let series = build(&steps);
        let first = series.events()[0].block_timestamp.as_secs();
        let lookup = RateLookup::from_series(DecimalScale::RAY, [series]);

        let mut instants: Vec<i64> = offsets.iter().map(|o| first + o).collect();
        instants.sort_unstable();

        let mut previous = FixedPoint::one();
        for t in instants {
            let index = lookup.index_at(CLASS, Timestamp::new(t)).unwrap();
            prop_assert!(index >= previous, "index fell to {} at t={}", index, t);
            previous = index;
        }
    }

    /// Cumulative indices stored on the events are non-decreasing too.
    #[test]
    fn prop_event_indices_monotonic(steps in history(12)) {
        let series = build(&steps);
        for pair in series.events().windows(2) {
            prop_assert!(pair[1].cumulative_index >= pair[0].cumulative_index);
        }
    }

    /// The binary-search regime resolution agrees with a linear scan.
    #[test]
    fn prop_regime_matches_linear_scan(
        steps in history(16),
        query in 0i64..900_000,
    ) {
        let series = build(&steps);
        let at = Timestamp::new(EPOCH + query);

        let expected = series
            .events()
            .iter()
            .rev()
            .find(|e| e.block_timestamp < at)
            .map(|e| e.key);
        prop_assert_eq!(series.regime_at(at).map(|e| e.key), expected);
    }

    /// Queries before or at the first rate change never resolve.
    #[test]
    fn prop_no_regime_before_first_event(steps in history(4), before in 0i64..50_000) {
        let series = build(&steps);
        let first = series.events()[0].block_timestamp.as_secs();
        let lookup = RateLookup::from_series(DecimalScale::RAY, [series]);
        prop_assert!(lookup.index_at(CLASS, Timestamp::new(first - before)).is_err());
    }

    /// The adjusted amount is the exact product rounded once: it is within
    /// half a unit in the 18th decimal of `raw * index`, and the sign follows
    /// the raw amount.
    #[test]
    fn prop_restatement_rounding_within_half_unit(
        steps in history(6),
        elapsed in 1i64..200_000,
        raw in amount_mantissa(),
        negative in any::<bool>(),
    ) {
        let series = build(&steps);
        let at = Timestamp::new(last_timestamp(&series) + elapsed);
        let lookup = RateLookup::from_series(DecimalScale::RAY, [series]);
        let index = lookup.index_at(CLASS, at).unwrap();

        let amount = Amount::new(negative, FixedPoint::from_mantissa(U256::new(raw), 18));
        let adjusted = amount.scaled_by(&index).unwrap();
        prop_assert_eq!(adjusted.is_negative(), negative);
        prop_assert_eq!(adjusted.magnitude().scale(), 18);

        // exact = raw * index at 18 + 27 decimals
        let exact = U256::new(raw) * index.mantissa();
        let ulp = U256::from(10u8).pow(index.scale());
        let rounded = adjusted.magnitude().mantissa() * ulp;
        let error = if rounded > exact { rounded - exact } else { exact - rounded };
        prop_assert!(error * U256::from(2u8) <= ulp);
    }
}
