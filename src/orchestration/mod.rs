//! Run orchestration: chain ingestion, index build, and restatement phases.

pub mod accrual;
pub mod ingest;
pub mod orchestrator;
pub mod restate;

pub use accrual::{FailedAssetClass, IndexReport, IndexStage};
pub use ingest::{IngestionError, IngestionResult, Ingestor};
pub use orchestrator::{Pipeline, PipelineError, RunReport};
pub use restate::{RestatementReport, Restater};
