use crate::config::{Config, RunMode};
use crate::datasource::ChainSource;
use crate::db::Repository;
use crate::orchestration::accrual::{IndexReport, IndexStage};
use crate::orchestration::ingest::{IngestionError, IngestionResult, Ingestor};
use crate::orchestration::restate::{RestatementReport, Restater};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

/// Ingest (optional) → index build → restatement.
///
/// The index phase completes for every asset class before restatement starts,
/// so restatement only ever reads fully built, immutable series. A class whose
/// series fails to build is reported and skipped; only store and chain
/// failures abort the run.
#[derive(Clone)]
pub struct Pipeline {
    repo: Arc<Repository>,
    config: Config,
    source: Option<Arc<dyn ChainSource>>,
}

impl Pipeline {
    pub fn new(repo: Arc<Repository>, config: Config) -> Self {
        Self {
            repo,
            config,
            source: None,
        }
    }

    /// Ingest from `source` before building indices.
    pub fn with_source(mut self, source: Arc<dyn ChainSource>) -> Self {
        self.source = Some(source);
        self
    }

    pub async fn run(&self) -> Result<RunReport, PipelineError> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        info!(run_id = %run_id, run_mode = ?self.config.run_mode, "Pipeline run started");

        let ingestion = match &self.source {
            Some(source) => Some(
                Ingestor::new(source.clone(), self.repo.clone(), self.config.clone())
                    .ingest()
                    .await?,
            ),
            None => None,
        };

        let (lookup, index) = IndexStage::new(
            self.repo.clone(),
            self.config.decimal_scale,
            self.config.run_mode,
        )
        .run()
        .await?;

        let restatement = Restater::new(
            self.repo.clone(),
            self.config.chunk_size,
            self.config.run_mode,
        )
        .run(&lookup)
        .await?;

        let finished_at = Utc::now();
        info!(
            run_id = %run_id,
            elapsed_ms = (finished_at - started_at).num_milliseconds(),
            "Pipeline run finished"
        );

        Ok(RunReport {
            run_id,
            started_at,
            finished_at,
            run_mode: self.config.run_mode,
            decimal_scale: self.config.decimal_scale.get(),
            ingestion,
            index,
            restatement,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub run_mode: RunMode,
    pub decimal_scale: u32,
    pub ingestion: Option<IngestionResult>,
    pub index: IndexReport,
    pub restatement: RestatementReport,
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Ingestion(#[from] IngestionError),
    #[error(transparent)]
    Db(#[from] sqlx::Error),
}
