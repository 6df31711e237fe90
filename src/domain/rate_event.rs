//! Rate-change events and their accrued form.

use super::fixed_point::FixedPoint;
use super::primitives::{AssetClassId, BlockNumber, Timestamp, TxHash};
use serde::{Deserialize, Serialize};

/// Total ordering key of chain events: block, then log position in the block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EventKey {
    pub block_number: BlockNumber,
    pub log_index: u32,
}

impl EventKey {
    pub fn new(block_number: BlockNumber, log_index: u32) -> Self {
        Self {
            block_number,
            log_index,
        }
    }
}

impl std::fmt::Display for EventKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.block_number, self.log_index)
    }
}

/// A change of an asset class's per-second rate ("duty"), effective from
/// `block_timestamp` onward.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateEvent {
    /// Store row id; `None` before the event is persisted.
    pub id: Option<i64>,
    pub asset_class_id: AssetClassId,
    pub key: EventKey,
    pub block_timestamp: Timestamp,
    pub tx_hash: Option<TxHash>,
    pub new_rate: FixedPoint,
    /// Index as of `block_timestamp`; once computed it never changes.
    pub cumulative_index: Option<FixedPoint>,
}

impl RateEvent {
    pub fn new(
        asset_class_id: AssetClassId,
        key: EventKey,
        block_timestamp: Timestamp,
        new_rate: FixedPoint,
    ) -> Self {
        Self {
            id: None,
            asset_class_id,
            key,
            block_timestamp,
            tx_hash: None,
            new_rate,
            cumulative_index: None,
        }
    }

    pub fn with_cumulative_index(mut self, index: FixedPoint) -> Self {
        self.cumulative_index = Some(index);
        self
    }
}

/// A rate event whose cumulative index is known.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccruedRateEvent {
    pub id: Option<i64>,
    pub asset_class_id: AssetClassId,
    pub key: EventKey,
    pub block_timestamp: Timestamp,
    pub new_rate: FixedPoint,
    pub cumulative_index: FixedPoint,
    /// True when the index was computed by this build rather than loaded.
    pub newly_computed: bool,
}
