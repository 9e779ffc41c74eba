use std::env;
use std::path::PathBuf;

use crate::error::AppError;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub limits: LimitsConfig,
}

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    pub max_connections: u32,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// Log output format
#[derive(Debug, Clone, PartialEq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Orchestration limits and timeouts
#[derive(Debug, Clone)]
pub struct LimitsConfig {
    /// Maximum hypothesis tree depth (root = 0).
    pub max_hypothesis_depth: u32,
    /// Checkpoints retained per investigation; oldest evicted beyond this.
    pub max_checkpoints_per_investigation: u32,
    /// How long an approval request stays pending before timing out.
    pub approval_timeout_ms: u64,
    /// Default per-step dispatch timeout when the step declares none.
    pub step_timeout_ms: u64,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, AppError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let database = DatabaseConfig {
            path: PathBuf::from(
                env::var("DATABASE_PATH").unwrap_or_else(|_| "./data/investigations.db".to_string()),
            ),
            max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(5),
        };

        let logging = LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            format: match env::var("LOG_FORMAT")
                .unwrap_or_else(|_| "pretty".to_string())
                .to_lowercase()
                .as_str()
            {
                "json" => LogFormat::Json,
                _ => LogFormat::Pretty,
            },
        };

        let limits = LimitsConfig {
            max_hypothesis_depth: env::var("MAX_HYPOTHESIS_DEPTH")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(4),
            max_checkpoints_per_investigation: env::var("MAX_CHECKPOINTS_PER_INVESTIGATION")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(20),
            approval_timeout_ms: env::var("APPROVAL_TIMEOUT_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(3_600_000),
            step_timeout_ms: env::var("STEP_TIMEOUT_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(30_000),
        };

        Ok(Config {
            database,
            logging,
            limits,
        })
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_hypothesis_depth: 4,
            max_checkpoints_per_investigation: 20,
            approval_timeout_ms: 3_600_000,
            step_timeout_ms: 30_000,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./data/investigations.db"),
            max_connections: 5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limits_defaults() {
        let limits = LimitsConfig::default();
        assert_eq!(limits.max_hypothesis_depth, 4);
        assert_eq!(limits.max_checkpoints_per_investigation, 20);
        assert_eq!(limits.approval_timeout_ms, 3_600_000);
        assert_eq!(limits.step_timeout_ms, 30_000);
    }

    #[test]
    fn test_database_defaults() {
        let db = DatabaseConfig::default();
        assert_eq!(db.max_connections, 5);
        assert!(db.path.to_string_lossy().contains("investigations.db"));
    }

    #[test]
    fn test_log_format_eq() {
        assert_eq!(LogFormat::Pretty, LogFormat::Pretty);
        assert_ne!(LogFormat::Pretty, LogFormat::Json);
    }
}
