//! Chain source abstraction for fetching ilk initializations, stability fee
//! changes and debt deltas.

use crate::domain::{Amount, EventKey, FixedPoint, IlkType, Timestamp, TxHash};
use async_trait::async_trait;
use std::fmt;

pub mod lognote;
pub mod mock;
pub mod rpc;

pub use lognote::DecodeError;
pub use mock::MockChainSource;
pub use rpc::EthRpcSource;

/// Fields every decoded chain event carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventMeta {
    pub ilk: IlkType,
    pub key: EventKey,
    pub block_timestamp: Timestamp,
    pub tx_hash: Option<TxHash>,
}

/// An ilk's fee accumulator was initialized: its index starts at 1.0 here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IlkInit {
    pub meta: EventMeta,
}

/// A new per-second stability fee, effective from this event onward.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateChange {
    pub meta: EventMeta,
    pub rate: FixedPoint,
}

/// A change in an ilk's normalized debt (negative on repayment).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebtChange {
    pub meta: EventMeta,
    pub amount: Amount,
}

/// Chain source trait for fetching the events the ledger is built from.
///
/// All methods take an inclusive block range. Implementations must handle
/// range splitting, retry/backoff, and block timestamp resolution.
#[async_trait]
pub trait ChainSource: Send + Sync + fmt::Debug {
    /// Fetch fee accumulator initializations, one per ilk.
    async fn fetch_ilk_inits(
        &self,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<IlkInit>, DataSourceError>;

    /// Fetch stability fee changes.
    ///
    /// # Returns
    /// Vector of rate changes, ordered by (block_number, log_index)
    async fn fetch_rate_changes(
        &self,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<RateChange>, DataSourceError>;

    /// Fetch debt deltas.
    ///
    /// # Returns
    /// Vector of debt changes, ordered by (block_number, log_index)
    async fn fetch_debt_changes(
        &self,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<DebtChange>, DataSourceError>;
}

/// Error type for chain source operations.
#[derive(Debug, Clone)]
pub enum DataSourceError {
    /// Network error (e.g., connection timeout, DNS failure)
    NetworkError(String),
    /// HTTP error (e.g., 429 rate limit, 5xx server error)
    HttpError { status: u16, message: String },
    /// JSON-RPC error object returned by the node
    RpcError { code: i64, message: String },
    /// Parsing error (invalid JSON or malformed response)
    ParseError(String),
    /// Rate limit exceeded (caller should implement backoff)
    RateLimited,
    /// Other error
    Other(String),
}

impl fmt::Display for DataSourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataSourceError::NetworkError(msg) => write!(f, "Network error: {}", msg),
            DataSourceError::HttpError { status, message } => {
                write!(f, "HTTP error {}: {}", status, message)
            }
            DataSourceError::RpcError { code, message } => {
                write!(f, "RPC error {}: {}", code, message)
            }
            DataSourceError::ParseError(msg) => write!(f, "Parse error: {}", msg),
            DataSourceError::RateLimited => write!(f, "Rate limited"),
            DataSourceError::Other(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl std::error::Error for DataSourceError {}

impl From<DecodeError> for DataSourceError {
    fn from(err: DecodeError) -> Self {
        DataSourceError::ParseError(err.to_string())
    }
}
