pub mod config;
pub mod datasource;
pub mod db;
pub mod domain;
pub mod engine;
pub mod error;
pub mod orchestration;

pub use config::{Config, RunMode};
pub use datasource::{ChainSource, DataSourceError, EthRpcSource, MockChainSource};
pub use db::{init_db, Repository};
pub use domain::{
    Amount, AssetClass, AssetClassId, DecimalScale, FixedPoint, IlkType, PrecisionError,
    Timestamp, Transaction,
};
pub use engine::{RateIndexBuilder, RateLookup, RestatementProcessor};
pub use error::AppError;
pub use orchestration::{Pipeline, RunReport};
