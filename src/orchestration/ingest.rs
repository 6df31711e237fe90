use crate::config::Config;
use crate::datasource::{ChainSource, DataSourceError, EventMeta};
use crate::db::Repository;
use crate::domain::{Amount, AssetClassId, IlkType, NewTransaction, RateEvent};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

#[derive(Clone)]
pub struct Ingestor {
    source: Arc<dyn ChainSource>,
    repo: Arc<Repository>,
    config: Config,
}

impl Ingestor {
    pub fn new(source: Arc<dyn ChainSource>, repo: Arc<Repository>, config: Config) -> Self {
        Self {
            source,
            repo,
            config,
        }
    }

    /// Ingest ilk initializations, rate changes and debt deltas for the
    /// configured block range.
    ///
    /// Every insert is idempotent, so re-ingesting an overlapping range only
    /// adds what is missing. Epoch starts are backfilled only while unset.
    pub async fn ingest(&self) -> Result<IngestionResult, IngestionError> {
        let (from_block, to_block) = (self.config.from_block, self.config.to_block);
        info!(from_block, to_block, "Ingesting chain events");

        let mut ids = AssetClassCache::default();
        let mut result = IngestionResult {
            from_block,
            to_block,
            ..Default::default()
        };

        let inits = self.source.fetch_ilk_inits(from_block, to_block).await?;
        for init in &inits {
            let id = ids.resolve(&self.repo, &init.meta.ilk).await?;
            if self
                .repo
                .backfill_epoch_start(id, init.meta.block_timestamp, init.meta.tx_hash.as_ref())
                .await?
            {
                result.epoch_starts_backfilled += 1;
            }
        }

        let changes = self.source.fetch_rate_changes(from_block, to_block).await?;
        let mut events = Vec::with_capacity(changes.len());
        for change in &changes {
            let id = ids.resolve(&self.repo, &change.meta.ilk).await?;
            let mut event = RateEvent::new(id, change.meta.key, change.meta.block_timestamp, change.rate);
            event.tx_hash = change.meta.tx_hash.clone();
            events.push(event);
        }
        result.rate_events_fetched = events.len();
        result.rate_events_new = self.repo.insert_rate_events_batch(&events).await?;

        let deltas = self.source.fetch_debt_changes(from_block, to_block).await?;
        let mut transactions = Vec::with_capacity(deltas.len());
        for delta in &deltas {
            transactions.push(self.new_transaction(&mut ids, &delta.meta, delta.amount).await?);
        }
        result.transactions_fetched = transactions.len();
        result.transactions_new = self.repo.insert_transactions_batch(&transactions).await?;

        result.asset_classes_seen = ids.len();
        info!(
            asset_classes = result.asset_classes_seen,
            epoch_starts_backfilled = result.epoch_starts_backfilled,
            rate_events_new = result.rate_events_new,
            transactions_new = result.transactions_new,
            "Ingestion complete"
        );
        Ok(result)
    }

    async fn new_transaction(
        &self,
        ids: &mut AssetClassCache,
        meta: &EventMeta,
        raw_amount: Amount,
    ) -> Result<NewTransaction, sqlx::Error> {
        Ok(NewTransaction {
            asset_class_id: Some(ids.resolve(&self.repo, &meta.ilk).await?),
            key: meta.key,
            block_timestamp: meta.block_timestamp,
            tx_hash: meta.tx_hash.clone(),
            raw_amount,
        })
    }
}

/// Ilk to asset class id, registering unseen ilks on first use.
#[derive(Default)]
struct AssetClassCache(HashMap<IlkType, AssetClassId>);

impl AssetClassCache {
    async fn resolve(&mut self, repo: &Repository, ilk: &IlkType) -> Result<AssetClassId, sqlx::Error> {
        if let Some(id) = self.0.get(ilk) {
            return Ok(*id);
        }
        let id = repo.upsert_asset_class(ilk).await?;
        self.0.insert(ilk.clone(), id);
        Ok(id)
    }

    fn len(&self) -> usize {
        self.0.len()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestionResult {
    pub from_block: u64,
    pub to_block: u64,
    pub asset_classes_seen: usize,
    pub epoch_starts_backfilled: usize,
    pub rate_events_fetched: usize,
    pub rate_events_new: usize,
    pub transactions_fetched: usize,
    pub transactions_new: usize,
}

#[derive(Debug, Error)]
pub enum IngestionError {
    #[error(transparent)]
    DataSource(#[from] DataSourceError),
    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RunMode;
    use crate::datasource::MockChainSource;
    use crate::db::migrations::init_db;
    use crate::domain::{DecimalScale, FixedPoint, Timestamp};
    use std::str::FromStr;
    use tempfile::TempDir;

    async fn setup_repo() -> (Arc<Repository>, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir
            .path()
            .join("test.db")
            .to_string_lossy()
            .to_string();
        let pool = init_db(&db_path).await.expect("init_db failed");
        (Arc::new(Repository::new(pool)), temp_dir)
    }

    fn test_config() -> Config {
        Config {
            database_path: ":memory:".to_string(),
            chunk_size: 1000,
            decimal_scale: DecimalScale::RAY,
            run_mode: RunMode::DryRun,
            eth_rpc_url: None,
            jug_address: "0xjug".to_string(),
            vat_address: "0xvat".to_string(),
            from_block: 0,
            to_block: 1_000,
            rpc_block_span: 100,
        }
    }

    fn source() -> MockChainSource {
        let rate = FixedPoint::from_str("1.0000001").unwrap();
        MockChainSource::new()
            .with_ilk_init("ETH-A", 1, 100)
            .with_rate_change("ETH-A", 2, 0, 200, rate)
            .with_debt_change("ETH-A", 3, 0, 300, Amount::from_str("5").unwrap())
            .with_debt_change("WBTC-A", 4, 0, 400, Amount::from_str("-1").unwrap())
            .with_debt_change("ETH-A", 5_000, 0, 500, Amount::from_str("7").unwrap())
    }

    #[tokio::test]
    async fn test_ingest_fetches_and_stores() {
        let (repo, _temp) = setup_repo().await;
        let ingestor = Ingestor::new(Arc::new(source()), repo.clone(), test_config());

        let result = ingestor.ingest().await.unwrap();
        assert_eq!(result.epoch_starts_backfilled, 1);
        assert_eq!(result.rate_events_new, 1);
        // block 5000 is outside the configured range
        assert_eq!(result.transactions_new, 2);
        assert_eq!(result.asset_classes_seen, 2);

        let eth = repo
            .get_asset_class(&IlkType::new("ETH-A".to_string()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(eth.epoch_start, Some(Timestamp::new(100)));

        // Registered from a debt delta alone, so no epoch start.
        let wbtc = repo
            .get_asset_class(&IlkType::new("WBTC-A".to_string()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(wbtc.epoch_start, None);
    }

    #[tokio::test]
    async fn test_ingest_is_idempotent() {
        let (repo, _temp) = setup_repo().await;
        let ingestor = Ingestor::new(Arc::new(source()), repo, test_config());

        ingestor.ingest().await.unwrap();
        let second = ingestor.ingest().await.unwrap();

        assert_eq!(second.epoch_starts_backfilled, 0);
        assert_eq!(second.rate_events_new, 0, "Second run should insert nothing new");
        assert_eq!(second.transactions_new, 0, "Second run should insert nothing new");
        assert_eq!(second.transactions_fetched, 2);
    }
}
