//! Application configuration loaded from environment variables.

use std::path::PathBuf;
use std::time::Duration;

use domain::MarketConfig;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default: `"0.0.0.0"`)
/// - `PORT`: listen port (default: `3000`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT`: `text` or `json` (default: `text`)
/// - `DATABASE_URL`: PostgreSQL URL; the in-memory store is used when unset
/// - `LOCK_TIMEOUT_MS`: bound on lock waits (default: `5000`)
/// - `MAX_COMMIT_RETRIES`: retries of a failed placement (default: `1`)
/// - `CODE_FILLER`: padding character for generated codes (default: `X`)
/// - `CATALOG_SEED`: JSON file of users and products to preload
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<String>,
    pub lock_timeout: Duration,
    pub max_commit_retries: u32,
    pub code_filler: char,
    pub catalog_seed: Option<PathBuf>,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration through `lookup`, falling back to defaults for
    /// missing or unparsable values.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: lookup("PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: match lookup("LOG_FORMAT").as_deref() {
                Some(f) if f.eq_ignore_ascii_case("json") => LogFormat::Json,
                _ => LogFormat::Text,
            },
            database_url: lookup("DATABASE_URL").filter(|url| !url.is_empty()),
            lock_timeout: lookup("LOCK_TIMEOUT_MS")
                .and_then(|ms| ms.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.lock_timeout),
            max_commit_retries: lookup("MAX_COMMIT_RETRIES")
                .and_then(|n| n.parse().ok())
                .unwrap_or(defaults.max_commit_retries),
            code_filler: lookup("CODE_FILLER")
                .and_then(|f| f.chars().next())
                .unwrap_or(defaults.code_filler),
            catalog_seed: lookup("CATALOG_SEED").map(PathBuf::from),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Builds the marketplace settings from this configuration.
    pub fn market_config(&self) -> MarketConfig {
        MarketConfig {
            max_commit_retries: self.max_commit_retries,
            code_filler: self.code_filler,
            ..MarketConfig::default()
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let market = MarketConfig::default();
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            database_url: None,
            lock_timeout: Duration::from_millis(5000),
            max_commit_retries: market.max_commit_retries,
            code_filler: market.code_filler,
            catalog_seed: None,
        }
    }
}
