//! Debt-changing transactions and their restated form.

use super::amount::Amount;
use super::fixed_point::FixedPoint;
use super::primitives::{AssetClassId, Timestamp, TxHash};
use super::rate_event::EventKey;
use serde::{Deserialize, Serialize};

/// A debt delta recorded against one asset class at one instant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: i64,
    /// Association supplied by the ledger; `None` when it could not be resolved.
    pub asset_class_id: Option<AssetClassId>,
    pub key: EventKey,
    pub block_timestamp: Timestamp,
    pub tx_hash: Option<TxHash>,
    /// Face-value token delta, not yet interest-adjusted.
    pub raw_amount: Amount,
    /// Set at most once, by restatement.
    pub adjusted_amount: Option<Amount>,
}

/// A decoded debt delta not yet stored in the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTransaction {
    pub asset_class_id: Option<AssetClassId>,
    pub key: EventKey,
    pub block_timestamp: Timestamp,
    pub tx_hash: Option<TxHash>,
    pub raw_amount: Amount,
}

/// Output of restating one transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestatedTransaction {
    pub transaction_id: i64,
    pub asset_class_id: AssetClassId,
    pub block_timestamp: Timestamp,
    pub raw_amount: Amount,
    /// Cumulative index effective at the transaction's timestamp.
    pub index: FixedPoint,
    pub adjusted_amount: Amount,
}
