use crate::domain::DecimalScale;
use serde::Serialize;
use std::collections::HashMap;
use thiserror::Error;

/// Mainnet MCD Jug (stability fee accumulator).
pub const DEFAULT_JUG_ADDRESS: &str = "0x19c0976f590d67707e62397c87829d896dc0f1f1";
/// Mainnet MCD Vat (CDP core engine).
pub const DEFAULT_VAT_ADDRESS: &str = "0x35d1b3f3d7966a1dfe207aa4514c12a259a0492b";
/// MCD deployment block.
pub const DEFAULT_FROM_BLOCK: u64 = 8_928_160;
pub const DEFAULT_TO_BLOCK: u64 = 11_700_000;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_path: String,
    pub chunk_size: usize,
    pub decimal_scale: DecimalScale,
    pub run_mode: RunMode,
    /// Ingestion is skipped when no node is configured.
    pub eth_rpc_url: Option<String>,
    pub jug_address: String,
    pub vat_address: String,
    pub from_block: u64,
    pub to_block: u64,
    pub rpc_block_span: u64,
}

/// Whether computed results are written to the store or only reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunMode {
    Apply,
    #[default]
    DryRun,
}

impl RunMode {
    pub fn writes(self) -> bool {
        self == RunMode::Apply
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_map(std::env::vars().collect())
    }

    pub fn from_env_map(env_map: HashMap<String, String>) -> Result<Self, ConfigError> {
        let database_path = env_map
            .get("DATABASE_PATH")
            .cloned()
            .ok_or_else(|| ConfigError::MissingEnv("DATABASE_PATH".to_string()))?;

        let chunk_size = parse_positive(&env_map, "CHUNK_SIZE", 1000)? as usize;

        let scale = env_map
            .get("DECIMAL_SCALE")
            .map(|s| s.as_str())
            .unwrap_or("27")
            .parse::<u32>()
            .map_err(|_| {
                ConfigError::InvalidValue(
                    "DECIMAL_SCALE".to_string(),
                    "must be a valid u32".to_string(),
                )
            })?;
        let decimal_scale = DecimalScale::new(scale).map_err(|e| {
            ConfigError::InvalidValue("DECIMAL_SCALE".to_string(), e.to_string())
        })?;

        let run_mode = match env_map
            .get("RUN_MODE")
            .map(|s| s.as_str())
            .unwrap_or("dry-run")
        {
            "apply" => RunMode::Apply,
            "dry-run" => RunMode::DryRun,
            other => {
                return Err(ConfigError::InvalidValue(
                    "RUN_MODE".to_string(),
                    format!("must be apply or dry-run, got {}", other),
                ))
            }
        };

        let eth_rpc_url = env_map
            .get("ETH_RPC_URL")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        let jug_address = env_map
            .get("JUG_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_JUG_ADDRESS.to_string());
        let vat_address = env_map
            .get("VAT_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_VAT_ADDRESS.to_string());

        let from_block = parse_u64(&env_map, "FROM_BLOCK", DEFAULT_FROM_BLOCK)?;
        let to_block = parse_u64(&env_map, "TO_BLOCK", DEFAULT_TO_BLOCK)?;
        if to_block < from_block {
            return Err(ConfigError::InvalidValue(
                "TO_BLOCK".to_string(),
                format!("must not be below FROM_BLOCK ({})", from_block),
            ));
        }
        let rpc_block_span = parse_positive(&env_map, "RPC_BLOCK_SPAN", 10_000)?;

        Ok(Config {
            database_path,
            chunk_size,
            decimal_scale,
            run_mode,
            eth_rpc_url,
            jug_address,
            vat_address,
            from_block,
            to_block,
            rpc_block_span,
        })
    }
}

fn parse_u64(env_map: &HashMap<String, String>, key: &str, default: u64) -> Result<u64, ConfigError> {
    match env_map.get(key) {
        None => Ok(default),
        Some(s) => s.trim().parse::<u64>().map_err(|_| {
            ConfigError::InvalidValue(key.to_string(), "must be a valid u64".to_string())
        }),
    }
}

fn parse_positive(
    env_map: &HashMap<String, String>,
    key: &str,
    default: u64,
) -> Result<u64, ConfigError> {
    let value = parse_u64(env_map, key, default)?;
    if value == 0 {
        return Err(ConfigError::InvalidValue(
            key.to_string(),
            "must be positive".to_string(),
        ));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup_required_env() -> HashMap<String, String> {
        let mut map = HashMap::new();
        map.insert("DATABASE_PATH".to_string(), "/tmp/test.db".to_string());
        map
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_env_map(setup_required_env()).unwrap();
        assert_eq!(config.chunk_size, 1000);
        assert_eq!(config.decimal_scale, DecimalScale::RAY);
        assert_eq!(config.run_mode, RunMode::DryRun);
        assert_eq!(config.eth_rpc_url, None);
        assert_eq!(config.jug_address, DEFAULT_JUG_ADDRESS);
        assert_eq!(config.from_block, 8928160);
        assert_eq!(config.to_block, 11700000);
        assert_eq!(config.rpc_block_span, 10000);
    }

    #[test]
    fn test_missing_database_path() {
        let mut env_map = setup_required_env();
        env_map.remove("DATABASE_PATH");
        let result = Config::from_env_map(env_map);
        match result {
            Err(ConfigError::MissingEnv(s)) => assert_eq!(s, "DATABASE_PATH"),
            _ => panic!("Expected MissingEnv error"),
        }
    }

    #[test]
    fn test_invalid_chunk_size() {
        for bad in ["0", "-5", "many"] {
            let mut env_map = setup_required_env();
            env_map.insert("CHUNK_SIZE".to_string(), bad.to_string());
            let result = Config::from_env_map(env_map);
            match result {
                Err(ConfigError::InvalidValue(k, _)) => assert_eq!(k, "CHUNK_SIZE"),
                _ => panic!("Expected InvalidValue error for {}", bad),
            }
        }
    }

    #[test]
    fn test_decimal_scale_below_minimum() {
        let mut env_map = setup_required_env();
        env_map.insert("DECIMAL_SCALE".to_string(), "18".to_string());
        let result = Config::from_env_map(env_map);
        match result {
            Err(ConfigError::InvalidValue(k, _)) => assert_eq!(k, "DECIMAL_SCALE"),
            _ => panic!("Expected InvalidValue error"),
        }
    }

    #[test]
    fn test_decimal_scale_accepted() {
        let mut env_map = setup_required_env();
        env_map.insert("DECIMAL_SCALE".to_string(), "30".to_string());
        let config = Config::from_env_map(env_map).unwrap();
        assert_eq!(config.decimal_scale.get(), 30);
    }

    #[test]
    fn test_run_mode() {
        let mut env_map = setup_required_env();
        env_map.insert("RUN_MODE".to_string(), "apply".to_string());
        assert_eq!(Config::from_env_map(env_map).unwrap().run_mode, RunMode::Apply);

        let mut env_map = setup_required_env();
        env_map.insert("RUN_MODE".to_string(), "prod".to_string());
        match Config::from_env_map(env_map) {
            Err(ConfigError::InvalidValue(k, _)) => assert_eq!(k, "RUN_MODE"),
            _ => panic!("Expected InvalidValue error"),
        }
    }

    #[test]
    fn test_blank_rpc_url_disables_ingestion() {
        let mut env_map = setup_required_env();
        env_map.insert("ETH_RPC_URL".to_string(), "  ".to_string());
        assert_eq!(Config::from_env_map(env_map).unwrap().eth_rpc_url, None);
    }

    #[test]
    fn test_inverted_block_range() {
        let mut env_map = setup_required_env();
        env_map.insert("FROM_BLOCK".to_string(), "200".to_string());
        env_map.insert("TO_BLOCK".to_string(), "100".to_string());
        match Config::from_env_map(env_map) {
            Err(ConfigError::InvalidValue(k, _)) => assert_eq!(k, "TO_BLOCK"),
            _ => panic!("Expected InvalidValue error"),
        }
    }
}
