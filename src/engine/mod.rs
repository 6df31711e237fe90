//! Pure computation engines: index accrual, index lookup, debt restatement.
//!
//! Nothing in here touches the store or the chain; the orchestration layer
//! loads inputs, runs these, and persists the results.

pub mod rate_index;
pub mod rate_lookup;
pub mod restatement;

pub use rate_index::{IndexBuildError, OrderingError, RateIndexBuilder, BASELINE_RATE};
pub use rate_lookup::{LookupError, RateLookup, RateSeries};
pub use restatement::{BatchOutcome, RestatementProcessor, SkipReason, SkippedRow};
