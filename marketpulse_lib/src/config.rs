//! Process settings, loaded once from a JSON file and read-only afterwards.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::NaiveDate;
use fmp_api::StockIndex;
use serde::{Deserialize, Serialize};

use crate::rate_limiter::{DEFAULT_CALLS_PER_WINDOW, DEFAULT_WINDOW};

/// Environment variable that overrides `fmp_api.key`.
pub const API_KEY_ENV: &str = "FMP_API_KEY";

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("failed to read settings file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse settings: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid settings: {0}")]
    Invalid(String),
}

/// Top-level settings object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub fmp_api: ApiSettings,
    #[serde(default)]
    pub database: DatabaseSettings,
    #[serde(default)]
    pub rate_limit: RateLimitSettings,
    #[serde(default)]
    pub sync: SyncSettings,
    #[serde(default)]
    pub server: ServerSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiSettings {
    #[serde(default = "default_uri")]
    pub uri: String,
    #[serde(default)]
    pub key: String,
    /// First day requested from the historical price endpoint.
    #[serde(default = "default_from_date")]
    pub from_date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    pub path: PathBuf,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            path: PathBuf::from("marketpulse.db"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitSettings {
    pub calls_per_window: u64,
    pub window_secs: u64,
}

impl RateLimitSettings {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            calls_per_window: DEFAULT_CALLS_PER_WINDOW,
            window_secs: DEFAULT_WINDOW.as_secs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    /// Concurrent per-symbol workers for the historical stage. 1 is sequential.
    pub concurrency: usize,
    /// Index whose persisted constituents form the per-symbol universe.
    pub universe: StockIndex,
    pub market_cap_limit: u32,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            concurrency: 1,
            universe: StockIndex::Sp500,
            market_cap_limit: fmp_api::DEFAULT_MARKET_CAP_LIMIT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
        }
    }
}

fn default_uri() -> String {
    fmp_api::DEFAULT_BASE_URL.to_string()
}

fn default_from_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2017, 1, 1).unwrap_or_default()
}

impl Settings {
    /// Read and validate settings from a JSON file, applying the
    /// `FMP_API_KEY` override.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut settings = Self::from_json_str(&content)?;
        if let Ok(key) = std::env::var(API_KEY_ENV) {
            settings = settings.with_api_key(key);
        }
        settings.validate()?;
        Ok(settings)
    }

    /// Parse settings without touching the environment or validating.
    pub fn from_json_str(content: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(content)?)
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        let key = key.into();
        if !key.trim().is_empty() {
            self.fmp_api.key = key;
        }
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.fmp_api.uri.trim().is_empty() {
            return Err(ConfigError::Invalid("fmp_api.uri is empty".into()));
        }
        if self.fmp_api.key.trim().is_empty() {
            return Err(ConfigError::Invalid(format!(
                "fmp_api.key is empty (set it in the settings file or {})",
                API_KEY_ENV
            )));
        }
        if self.rate_limit.calls_per_window == 0 {
            return Err(ConfigError::Invalid(
                "rate_limit.calls_per_window must be at least 1".into(),
            ));
        }
        if self.rate_limit.window_secs == 0 {
            return Err(ConfigError::Invalid(
                "rate_limit.window_secs must be at least 1".into(),
            ));
        }
        if self.sync.concurrency == 0 {
            return Err(ConfigError::Invalid("sync.concurrency must be at least 1".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"{ "fmp_api": { "key": "abc" } }"#;

    #[test]
    fn minimal_settings_use_defaults() {
        let settings = Settings::from_json_str(MINIMAL).unwrap();
        settings.validate().unwrap();
        assert_eq!(settings.fmp_api.uri, fmp_api::DEFAULT_BASE_URL);
        assert_eq!(settings.fmp_api.from_date.to_string(), "2017-01-01");
        assert_eq!(settings.rate_limit.calls_per_window, 280);
        assert_eq!(settings.rate_limit.window(), Duration::from_secs(60));
        assert_eq!(settings.sync.concurrency, 1);
        assert_eq!(settings.sync.universe, StockIndex::Sp500);
        assert_eq!(settings.sync.market_cap_limit, 2000);
        assert_eq!(settings.database.path, PathBuf::from("marketpulse.db"));
        assert_eq!(settings.server.port, 5000);
    }

    #[test]
    fn full_settings_parse() {
        let json = r#"{
            "fmp_api": { "uri": "http://localhost:8080/api/v3/", "key": "k", "from_date": "2020-06-01" },
            "database": { "path": "/tmp/pulse.db" },
            "rate_limit": { "calls_per_window": 10, "window_secs": 5 },
            "sync": { "concurrency": 15, "universe": "nasdaq", "market_cap_limit": 100 },
            "server": { "host": "127.0.0.1", "port": 8000 }
        }"#;
        let settings = Settings::from_json_str(json).unwrap();
        settings.validate().unwrap();
        assert_eq!(settings.fmp_api.from_date, NaiveDate::from_ymd_opt(2020, 6, 1).unwrap());
        assert_eq!(settings.sync.concurrency, 15);
        assert_eq!(settings.sync.universe, StockIndex::Nasdaq);
        assert_eq!(settings.server.host, "127.0.0.1");
    }

    #[test]
    fn missing_key_is_invalid() {
        let settings = Settings::from_json_str(r#"{ "fmp_api": {} }"#).unwrap();
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("fmp_api.key"));
    }

    #[test]
    fn api_key_override_replaces_file_value() {
        let settings = Settings::from_json_str(MINIMAL)
            .unwrap()
            .with_api_key("from-env");
        assert_eq!(settings.fmp_api.key, "from-env");

        let unchanged = Settings::from_json_str(MINIMAL).unwrap().with_api_key("  ");
        assert_eq!(unchanged.fmp_api.key, "abc");
    }

    #[test]
    fn partial_section_keeps_other_defaults() {
        let json = r#"{ "fmp_api": { "key": "k" }, "sync": { "concurrency": 15 } }"#;
        let settings = Settings::from_json_str(json).unwrap();
        assert_eq!(settings.sync.concurrency, 15);
        assert_eq!(settings.sync.universe, StockIndex::Sp500);
        assert_eq!(settings.sync.market_cap_limit, 2000);
    }

    #[test]
    fn zero_concurrency_rejected() {
        let json = r#"{ "fmp_api": { "key": "k" }, "sync": { "concurrency": 0 } }"#;
        let settings = Settings::from_json_str(json).unwrap();
        assert!(matches!(settings.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn bad_date_is_json_error() {
        let json = r#"{ "fmp_api": { "key": "k", "from_date": "01/01/2017" } }"#;
        assert!(matches!(Settings::from_json_str(json), Err(ConfigError::Json(_))));
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = Settings::load("/definitely/not/here/config.json").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
