//! Mock chain source for testing without network calls.

use super::{ChainSource, DataSourceError, DebtChange, EventMeta, IlkInit, RateChange};
use crate::domain::{Amount, BlockNumber, EventKey, FixedPoint, IlkType, Timestamp};
use async_trait::async_trait;

/// Mock chain source that returns predefined events.
#[derive(Debug, Clone, Default)]
pub struct MockChainSource {
    inits: Vec<IlkInit>,
    rate_changes: Vec<RateChange>,
    debt_changes: Vec<DebtChange>,
}

fn meta(ilk: &str, block: u64, log_index: u32, timestamp: i64) -> EventMeta {
    EventMeta {
        ilk: IlkType::new(ilk.to_string()),
        key: EventKey::new(BlockNumber::new(block), log_index),
        block_timestamp: Timestamp::new(timestamp),
        tx_hash: None,
    }
}

fn in_range(meta: &EventMeta, from_block: u64, to_block: u64) -> bool {
    let block = meta.key.block_number.as_u64();
    block >= from_block && block <= to_block
}

impl MockChainSource {
    /// Create a new mock chain source with no events.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a fee accumulator initialization.
    pub fn with_ilk_init(mut self, ilk: &str, block: u64, timestamp: i64) -> Self {
        self.inits.push(IlkInit {
            meta: meta(ilk, block, 0, timestamp),
        });
        self
    }

    /// Add a stability fee change.
    pub fn with_rate_change(
        mut self,
        ilk: &str,
        block: u64,
        log_index: u32,
        timestamp: i64,
        rate: FixedPoint,
    ) -> Self {
        self.rate_changes.push(RateChange {
            meta: meta(ilk, block, log_index, timestamp),
            rate,
        });
        self
    }

    /// Add a debt delta.
    pub fn with_debt_change(
        mut self,
        ilk: &str,
        block: u64,
        log_index: u32,
        timestamp: i64,
        amount: Amount,
    ) -> Self {
        self.debt_changes.push(DebtChange {
            meta: meta(ilk, block, log_index, timestamp),
            amount,
        });
        self
    }
}

#[async_trait]
impl ChainSource for MockChainSource {
    async fn fetch_ilk_inits(
        &self,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<IlkInit>, DataSourceError> {
        Ok(self
            .inits
            .iter()
            .filter(|i| in_range(&i.meta, from_block, to_block))
            .cloned()
            .collect())
    }

    async fn fetch_rate_changes(
        &self,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<RateChange>, DataSourceError> {
        let mut changes: Vec<RateChange> = self
            .rate_changes
            .iter()
            .filter(|c| in_range(&c.meta, from_block, to_block))
            .cloned()
            .collect();
        changes.sort_by_key(|c| c.meta.key);
        Ok(changes)
    }

    async fn fetch_debt_changes(
        &self,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<DebtChange>, DataSourceError> {
        let mut changes: Vec<DebtChange> = self
            .debt_changes
            .iter()
            .filter(|c| in_range(&c.meta, from_block, to_block))
            .cloned()
            .collect();
        changes.sort_by_key(|c| c.meta.key);
        Ok(changes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[tokio::test]
    async fn test_mock_filters_by_block_range() {
        let mock = MockChainSource::new()
            .with_ilk_init("ETH-A", 100, 1000)
            .with_ilk_init("BAT-A", 300, 3000);

        let inits = mock.fetch_ilk_inits(0, 200).await.unwrap();
        assert_eq!(inits.len(), 1);
        assert_eq!(inits[0].meta.ilk.as_str(), "ETH-A");
    }

    #[tokio::test]
    async fn test_mock_returns_rate_changes_in_key_order() {
        let rate = FixedPoint::from_str("1.0000001").unwrap();
        let mock = MockChainSource::new()
            .with_rate_change("ETH-A", 20, 0, 2000, rate)
            .with_rate_change("ETH-A", 10, 1, 1000, rate)
            .with_rate_change("ETH-A", 10, 0, 1000, rate);

        let changes = mock.fetch_rate_changes(0, 100).await.unwrap();
        let keys: Vec<String> = changes.iter().map(|c| c.meta.key.to_string()).collect();
        assert_eq!(keys, vec!["10:0", "10:1", "20:0"]);
    }
}
