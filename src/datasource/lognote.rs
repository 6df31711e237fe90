//! Decoding of anonymous `LogNote` events emitted by the Jug and Vat contracts.
//!
//! A note log records the call that produced it: `topics[0]` is the 4-byte
//! function selector left-aligned in a 32-byte word and the remaining topics
//! carry the first call arguments. `data` is the ABI encoding of the raw
//! calldata as `bytes`: a 32-byte offset, a 32-byte length, then the
//! selector followed by one 32-byte word per argument.

use crate::domain::{Amount, BlockNumber, EventKey, FixedPoint, IlkType, TxHash, AMOUNT_SCALE, MIN_SCALE};
use ethnum::U256;
use serde::Deserialize;
use thiserror::Error;

/// `Jug.init(bytes32)`
pub const JUG_INIT_SELECTOR: [u8; 4] = [0x3b, 0x66, 0x31, 0x95];
/// `Jug.file(bytes32,bytes32,uint256)`
pub const JUG_FILE_SELECTOR: [u8; 4] = [0x1a, 0x0b, 0x28, 0x7e];
/// `Vat.frob(bytes32,address,address,address,int256,int256)`
pub const VAT_FROB_SELECTOR: [u8; 4] = [0x76, 0x08, 0x87, 0x03];

/// Decimals of a Jug `duty` (a ray).
pub const DUTY_DECIMALS: u32 = MIN_SCALE;

/// Bytes before the first calldata argument in `data`: offset word, length
/// word and the selector.
const ARGS_OFFSET: usize = 32 + 32 + 4;
const WORD: usize = 32;

/// Failure decoding a single log entry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("log has {found} topics, expected at least {expected}")]
    MissingTopic { expected: usize, found: usize },
    #[error("log topic0 {0} is not the expected selector")]
    UnexpectedSelector(String),
    #[error("invalid hex in {field}: {message}")]
    InvalidHex { field: &'static str, message: String },
    #[error("log data too short: {len} bytes, need {needed}")]
    DataTooShort { len: usize, needed: usize },
    #[error("ilk is not valid UTF-8")]
    InvalidIlk,
    #[error("file() parameter {0:?} is not a duty change")]
    NotDuty(String),
}

/// A log entry as returned by `eth_getLogs`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawLog {
    pub address: String,
    pub topics: Vec<String>,
    pub data: String,
    pub block_number: String,
    pub log_index: String,
    pub transaction_hash: Option<String>,
}

impl RawLog {
    /// `(block_number, log_index)` parsed from the hex quantities.
    pub fn key(&self) -> Result<EventKey, DecodeError> {
        let block = parse_quantity(&self.block_number, "blockNumber")?;
        let log_index = parse_quantity(&self.log_index, "logIndex")?;
        let log_index = u32::try_from(log_index).map_err(|_| DecodeError::InvalidHex {
            field: "logIndex",
            message: format!("{log_index} out of range"),
        })?;
        Ok(EventKey::new(BlockNumber::new(block), log_index))
    }

    pub fn tx_hash(&self) -> Option<TxHash> {
        self.transaction_hash.clone().map(TxHash::new)
    }

    fn topic(&self, index: usize) -> Result<&str, DecodeError> {
        self.topics
            .get(index)
            .map(String::as_str)
            .ok_or(DecodeError::MissingTopic {
                expected: index + 1,
                found: self.topics.len(),
            })
    }

    fn expect_selector(&self, selector: [u8; 4]) -> Result<(), DecodeError> {
        let topic0 = self.topic(0)?;
        if topic0.eq_ignore_ascii_case(&selector_topic(selector)) {
            Ok(())
        } else {
            Err(DecodeError::UnexpectedSelector(topic0.to_string()))
        }
    }

    /// The `n`th 32-byte calldata argument.
    fn arg(&self, n: usize) -> Result<[u8; 32], DecodeError> {
        let data = decode_hex(&self.data, "data")?;
        let start = ARGS_OFFSET + n * WORD;
        let word = data
            .get(start..start + WORD)
            .ok_or(DecodeError::DataTooShort {
                len: data.len(),
                needed: start + WORD,
            })?;
        let mut out = [0u8; 32];
        out.copy_from_slice(word);
        Ok(out)
    }
}

/// `topics[0]` filter value for a selector.
pub fn selector_topic(selector: [u8; 4]) -> String {
    format!("0x{}{}", hex::encode(selector), "0".repeat(56))
}

/// Ilk of a `Jug.init` note.
pub fn decode_ilk_init(log: &RawLog) -> Result<IlkType, DecodeError> {
    log.expect_selector(JUG_INIT_SELECTOR)?;
    decode_bytes32_string(log.topic(2)?)
}

/// Ilk and new per-second rate of a `Jug.file(ilk, "duty", rate)` note.
pub fn decode_duty_change(log: &RawLog) -> Result<(IlkType, FixedPoint), DecodeError> {
    log.expect_selector(JUG_FILE_SELECTOR)?;
    let ilk = decode_bytes32_string(log.topic(2)?)?;
    let what = decode_bytes32_string(log.topic(3)?)?;
    if what.as_str() != "duty" {
        return Err(DecodeError::NotDuty(what.0));
    }
    let duty = U256::from_be_bytes(log.arg(2)?);
    Ok((ilk, FixedPoint::from_mantissa(duty, DUTY_DECIMALS)))
}

/// Ilk and signed normalized debt delta of a `Vat.frob` note.
pub fn decode_frob(log: &RawLog) -> Result<(IlkType, Amount), DecodeError> {
    log.expect_selector(VAT_FROB_SELECTOR)?;
    let ilk = decode_bytes32_string(log.topic(1)?)?;
    let dart = U256::from_be_bytes(log.arg(5)?);
    Ok((ilk, decode_int256(dart, AMOUNT_SCALE)))
}

/// Two's complement int256 word as a signed amount with `decimals` decimals.
pub fn decode_int256(word: U256, decimals: u32) -> Amount {
    let negative = word >> 255u32 == U256::ONE;
    let magnitude = if negative {
        (!word).wrapping_add(U256::ONE)
    } else {
        word
    };
    Amount::new(negative, FixedPoint::from_mantissa(magnitude, decimals))
}

/// Right-padded ASCII packed into a bytes32, e.g. an ilk name.
fn decode_bytes32_string(topic: &str) -> Result<IlkType, DecodeError> {
    let bytes = decode_hex(topic, "topic")?;
    let end = bytes.iter().position(|b| *b == 0).unwrap_or(bytes.len());
    let s = std::str::from_utf8(&bytes[..end]).map_err(|_| DecodeError::InvalidIlk)?;
    Ok(IlkType::new(s.to_string()))
}

fn decode_hex(s: &str, field: &'static str) -> Result<Vec<u8>, DecodeError> {
    let digits = s.strip_prefix("0x").unwrap_or(s);
    hex::decode(digits).map_err(|e| DecodeError::InvalidHex {
        field,
        message: e.to_string(),
    })
}

/// JSON-RPC hex quantity, e.g. `"0x883c20"`.
pub fn parse_quantity(s: &str, field: &'static str) -> Result<u64, DecodeError> {
    let digits = s.strip_prefix("0x").unwrap_or(s);
    u64::from_str_radix(digits, 16).map_err(|e| DecodeError::InvalidHex {
        field,
        message: e.to_string(),
    })
}
