//! Domain types for rate accrual and debt restatement.
//!
//! This module provides:
//! - Exact fixed-point decimals (`FixedPoint`) and signed token amounts (`Amount`)
//! - Domain primitives: Timestamp, BlockNumber, AssetClassId, IlkType, TxHash
//! - Asset classes, rate-change events and transactions

pub mod amount;
pub mod asset_class;
pub mod fixed_point;
pub mod primitives;
pub mod rate_event;
pub mod transaction;

pub use amount::{Amount, AMOUNT_SCALE};
pub use asset_class::AssetClass;
pub use fixed_point::{
    DecimalScale, FixedPoint, ParseDecimalError, PrecisionError, Rounding, MAX_SCALE, MIN_SCALE,
};
pub use primitives::{AssetClassId, BlockNumber, IlkType, Timestamp, TxHash};
pub use rate_event::{AccruedRateEvent, EventKey, RateEvent};
pub use transaction::{NewTransaction, RestatedTransaction, Transaction};
