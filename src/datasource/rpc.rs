//! Ethereum JSON-RPC chain source.

use super::lognote::{
    decode_duty_change, decode_frob, decode_ilk_init, parse_quantity, selector_topic, DecodeError,
    RawLog, JUG_FILE_SELECTOR, JUG_INIT_SELECTOR, VAT_FROB_SELECTOR,
};
use super::{ChainSource, DataSourceError, DebtChange, EventMeta, IlkInit, RateChange};
use crate::domain::{IlkType, Timestamp};
use async_trait::async_trait;
use backoff::future::retry;
use backoff::ExponentialBackoff;
use reqwest::Client;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Chain source reading Jug and Vat note logs from an Ethereum node.
#[derive(Debug, Clone)]
pub struct EthRpcSource {
    client: Client,
    url: String,
    jug_address: String,
    vat_address: String,
    block_span: u64,
    block_timestamps: Arc<Mutex<HashMap<u64, Timestamp>>>,
}

impl EthRpcSource {
    /// Create a new source against `url`.
    ///
    /// `block_span` bounds the block range of a single `eth_getLogs` call.
    pub fn new(url: String, jug_address: String, vat_address: String, block_span: u64) -> Self {
        Self {
            client: Client::new(),
            url,
            jug_address,
            vat_address,
            block_span: block_span.max(1),
            block_timestamps: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    async fn rpc_call(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<serde_json::Value, DataSourceError> {
        let payload = serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });
        let backoff = ExponentialBackoff {
            max_elapsed_time: Some(Duration::from_secs(30)),
            ..Default::default()
        };

        let body = retry(backoff, || async {
            let response = self
                .client
                .post(&self.url)
                .json(&payload)
                .send()
                .await
                .map_err(|e| {
                    backoff::Error::transient(DataSourceError::NetworkError(e.to_string()))
                })?;

            let status = response.status();
            if status == 429 {
                return Err(backoff::Error::transient(DataSourceError::RateLimited));
            }
            if status.is_server_error() {
                return Err(backoff::Error::transient(DataSourceError::HttpError {
                    status: status.as_u16(),
                    message: "Server error".to_string(),
                }));
            }
            if !status.is_success() {
                return Err(backoff::Error::permanent(DataSourceError::HttpError {
                    status: status.as_u16(),
                    message: "Client error".to_string(),
                }));
            }

            response
                .json::<serde_json::Value>()
                .await
                .map_err(|e| backoff::Error::permanent(DataSourceError::ParseError(e.to_string())))
        })
        .await?;

        if let Some(error) = body.get("error") {
            return Err(DataSourceError::RpcError {
                code: error.get("code").and_then(|v| v.as_i64()).unwrap_or_default(),
                message: error
                    .get("message")
                    .and_then(|v| v.as_str())
                    .unwrap_or("unknown error")
                    .to_string(),
            });
        }
        body.get("result")
            .cloned()
            .ok_or_else(|| DataSourceError::ParseError("Missing result field".to_string()))
    }

    /// Logs of `address` with `topics[0] == selector`, fetched in block spans.
    async fn get_logs(
        &self,
        address: &str,
        selector: [u8; 4],
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<RawLog>, DataSourceError> {
        let topic0 = selector_topic(selector);
        let mut logs = Vec::new();

        for (start, end) in block_spans(from_block, to_block, self.block_span) {
            debug!(address = %address, topic0 = %topic0, from_block = start, to_block = end, "eth_getLogs");
            let params = serde_json::json!([{
                "address": address,
                "topics": [topic0],
                "fromBlock": format!("0x{start:x}"),
                "toBlock": format!("0x{end:x}"),
            }]);
            let result = self.rpc_call("eth_getLogs", params).await?;
            let page: Vec<RawLog> = serde_json::from_value(result)
                .map_err(|e| DataSourceError::ParseError(format!("Invalid log entry: {}", e)))?;
            logs.extend(page);
        }

        Ok(logs)
    }

    async fn block_timestamp(&self, block: u64) -> Result<Timestamp, DataSourceError> {
        if let Some(ts) = self.block_timestamps.lock().await.get(&block) {
            return Ok(*ts);
        }

        let result = self
            .rpc_call(
                "eth_getBlockByNumber",
                serde_json::json!([format!("0x{block:x}"), false]),
            )
            .await?;
        let raw = result
            .get("timestamp")
            .and_then(|v| v.as_str())
            .ok_or_else(|| DataSourceError::ParseError(format!("Block {} has no timestamp", block)))?;
        let secs = parse_quantity(raw, "timestamp")?;
        let ts = Timestamp::new(
            i64::try_from(secs)
                .map_err(|_| DataSourceError::ParseError(format!("Timestamp {} out of range", secs)))?,
        );

        self.block_timestamps.lock().await.insert(block, ts);
        Ok(ts)
    }

    async fn meta(&self, log: &RawLog, ilk: IlkType) -> Result<EventMeta, DataSourceError> {
        let key = log.key()?;
        let block_timestamp = self.block_timestamp(key.block_number.as_u64()).await?;
        Ok(EventMeta {
            ilk,
            key,
            block_timestamp,
            tx_hash: log.tx_hash(),
        })
    }
}

/// Inclusive `[start, end]` sub-ranges of at most `span` blocks.
fn block_spans(from_block: u64, to_block: u64, span: u64) -> Vec<(u64, u64)> {
    let mut spans = Vec::new();
    let mut start = from_block;
    while start <= to_block {
        let end = start.saturating_add(span - 1).min(to_block);
        spans.push((start, end));
        if end == u64::MAX {
            break;
        }
        start = end + 1;
    }
    spans
}

/// Decode every log with `decode`, dropping entries that do not decode.
fn decode_all<'a, T>(
    logs: &'a [RawLog],
    what: &str,
    decode: impl Fn(&RawLog) -> Result<T, DecodeError>,
) -> Vec<(&'a RawLog, T)> {
    let mut decoded = Vec::with_capacity(logs.len());
    for log in logs {
        match decode(log) {
            Ok(value) => decoded.push((log, value)),
            Err(DecodeError::NotDuty(param)) => {
                debug!(param = %param, "Skipping non-duty file() note");
            }
            Err(e) => {
                warn!(what = %what, tx_hash = ?log.transaction_hash, error = %e, "Failed to decode note log");
            }
        }
    }
    decoded
}

#[async_trait]
impl ChainSource for EthRpcSource {
    async fn fetch_ilk_inits(
        &self,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<IlkInit>, DataSourceError> {
        let logs = self
            .get_logs(&self.jug_address, JUG_INIT_SELECTOR, from_block, to_block)
            .await?;

        let mut inits = Vec::new();
        for (log, ilk) in decode_all(&logs, "ilk init", decode_ilk_init) {
            inits.push(IlkInit {
                meta: self.meta(log, ilk).await?,
            });
        }
        inits.sort_by_key(|i| i.meta.key);
        Ok(inits)
    }

    async fn fetch_rate_changes(
        &self,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<RateChange>, DataSourceError> {
        let logs = self
            .get_logs(&self.jug_address, JUG_FILE_SELECTOR, from_block, to_block)
            .await?;

        let mut changes = Vec::new();
        for (log, (ilk, rate)) in decode_all(&logs, "duty change", decode_duty_change) {
            changes.push(RateChange {
                meta: self.meta(log, ilk).await?,
                rate,
            });
        }
        changes.sort_by_key(|c| c.meta.key);
        Ok(changes)
    }

    async fn fetch_debt_changes(
        &self,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<DebtChange>, DataSourceError> {
        let logs = self
            .get_logs(&self.vat_address, VAT_FROB_SELECTOR, from_block, to_block)
            .await?;

        let mut changes = Vec::new();
        for (log, (ilk, amount)) in decode_all(&logs, "frob", decode_frob) {
            changes.push(DebtChange {
                meta: self.meta(log, ilk).await?,
                amount,
            });
        }
        changes.sort_by_key(|c| c.meta.key);
        Ok(changes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasource::lognote::test_support::{bytes32_ascii, note_data, raw_log};

    #[test]
    fn test_block_spans_cover_range() {
        assert_eq!(
            block_spans(100, 125, 10),
            vec![(100, 109), (110, 119), (120, 125)]
        );
        assert_eq!(block_spans(5, 5, 10), vec![(5, 5)]);
        assert!(block_spans(10, 5, 10).is_empty());
    }

    #[test]
    fn test_block_spans_at_u64_max() {
        assert_eq!(
            block_spans(u64::MAX - 1, u64::MAX, 1),
            vec![(u64::MAX - 1, u64::MAX - 1), (u64::MAX, u64::MAX)]
        );
    }

    #[test]
    fn test_decode_all_drops_undecodable_logs() {
        let mut ilk = [0u8; 32];
        ilk[..5].copy_from_slice(b"ETH-A");
        let good = raw_log(
            vec![
                selector_topic(JUG_INIT_SELECTOR),
                bytes32_ascii(""),
                bytes32_ascii("ETH-A"),
            ],
            note_data(JUG_INIT_SELECTOR, &[ilk]),
            10,
            0,
        );
        let bad = raw_log(vec![selector_topic(JUG_INIT_SELECTOR)], "0x".to_string(), 11, 0);

        let logs = vec![good, bad];
        let decoded = decode_all(&logs, "ilk init", decode_ilk_init);
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0].1.as_str(), "ETH-A");
    }

    #[test]
    fn test_new_clamps_zero_span() {
        let source = EthRpcSource::new(
            "http://example.invalid".to_string(),
            "0xjug".to_string(),
            "0xvat".to_string(),
            0,
        );
        assert_eq!(source.block_span, 1);
    }
}
