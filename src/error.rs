use crate::config::ConfigError;
use crate::orchestration::PipelineError;
use thiserror::Error;

/// Top-level error reported by the binary.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Database error: {0}")]
    Db(#[from] sqlx::Error),
    #[error("Pipeline failed: {0}")]
    Pipeline(#[from] PipelineError),
    #[error("Failed to render report: {0}")]
    Report(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display() {
        let err: AppError = ConfigError::MissingEnv("DATABASE_PATH".to_string()).into();
        assert_eq!(
            err.to_string(),
            "Configuration error: Missing required environment variable: DATABASE_PATH"
        );
    }
}
