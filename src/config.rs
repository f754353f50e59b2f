// src/config.rs

use crate::error::PulseResult;
use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Default settings file, looked up relative to the working directory.
const DEFAULT_SETTINGS: &str = "Settings";

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DbConfig {
    /// Long window: rows older than this are pruned at startup.
    pub retention_secs: u64,
    /// Short window used for momentum and the ticker refresh.
    pub sample_period_secs: u64,
    pub in_memory: bool,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            retention_secs: 3600,
            sample_period_secs: 600,
            in_memory: true,
        }
    }
}

impl DbConfig {
    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }

    pub fn sample_period(&self) -> Duration {
        Duration::from_secs(self.sample_period_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct TradesConfig {
    /// Quote assets offered by the subscribe dialog.
    pub quotes: Vec<String>,
    pub default_quote: String,
    /// Notional threshold in `default_quote` units.
    pub threshold: f64,
}

impl Default for TradesConfig {
    fn default() -> Self {
        Self {
            quotes: ["USDT", "BTC", "BNB", "ETH"]
                .iter()
                .map(|q| q.to_string())
                .collect(),
            default_quote: "USDT".to_string(),
            threshold: 50_000.0,
        }
    }
}

/// Notice filter as configured. Allow-lists are comma-joined.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct FilterConfig {
    pub quote: String,
    pub base: String,
    pub percent: f32,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EndpointsConfig {
    pub notices_url: String,
    pub trades_url: String,
    pub rest_url: String,
}

impl Default for EndpointsConfig {
    fn default() -> Self {
        Self {
            notices_url: "wss://bstream.binance.com:9443/stream?streams=abnormaltradingnotices"
                .to_string(),
            trades_url: "wss://stream.binance.com:9443/stream?streams=".to_string(),
            rest_url: "https://api.binance.com".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    pub log_level: String,
    pub disable_logging: bool,
    pub ticker_timer_secs: u64,
    pub db: DbConfig,
    pub trades: TradesConfig,
    pub filter: FilterConfig,
    pub endpoints: EndpointsConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(".bintel"),
            log_level: "info".to_string(),
            disable_logging: false,
            ticker_timer_secs: 30,
            db: DbConfig::default(),
            trades: TradesConfig::default(),
            filter: FilterConfig::default(),
            endpoints: EndpointsConfig::default(),
        }
    }
}

/// `BINTEL_<SECTION>__<KEY>`: one underscore after the prefix, two between
/// nested keys.
fn env_overrides() -> Environment {
    Environment::with_prefix("BINTEL")
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
        .list_separator(",")
        .with_list_parse_key("trades.quotes")
}

impl AppConfig {
    /// Loads `Settings.{toml,yaml,json}` (or the file named by `BINTEL_CONFIG`)
    /// and then applies `BINTEL_*` environment overrides.
    pub fn new() -> PulseResult<Self> {
        let path = std::env::var("BINTEL_CONFIG").unwrap_or_else(|_| DEFAULT_SETTINGS.to_string());
        Self::layered(&path, env_overrides())
    }

    fn layered(path: &str, env: Environment) -> PulseResult<Self> {
        Ok(Config::builder()
            .add_source(File::with_name(path).required(false))
            .add_source(env)
            .build()?
            .try_deserialize()?)
    }

    #[cfg(test)]
    pub fn from_toml(raw: &str) -> PulseResult<Self> {
        use config::FileFormat;

        Ok(Config::builder()
            .add_source(File::from_str(raw, FileFormat::Toml))
            .build()?
            .try_deserialize()?)
    }

    pub fn ticker_timer(&self) -> Duration {
        Duration::from_secs(self.ticker_timer_secs.max(1))
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("event.db")
    }

    /// Raw frames and outbound requests are mirrored to the log only when enabled.
    pub fn log_raw(&self) -> bool {
        !self.disable_logging
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = AppConfig::from_toml("").unwrap();

        assert_eq!(config.ticker_timer(), Duration::from_secs(30));
        assert_eq!(config.db.retention(), Duration::from_secs(3600));
        assert_eq!(config.db.sample_period(), Duration::from_secs(600));
        assert!(config.db.in_memory);
        assert_eq!(config.trades.default_quote, "USDT");
        assert_eq!(config.trades.quotes, vec!["USDT", "BTC", "BNB", "ETH"]);
        assert_eq!(config.trades.threshold, 50_000.0);
        assert!(config.filter.quote.is_empty());
        assert_eq!(config.filter.percent, 0.0);
    }

    #[test]
    fn test_partial_sections_override_defaults() {
        let config = AppConfig::from_toml(
            r#"
            disable_logging = true
            ticker_timer_secs = 5

            [trades]
            default_quote = "BUSD"
            threshold = 1000.0

            [filter]
            quote = "USDT,BTC"
            percent = -2.5
            "#,
        )
        .unwrap();

        assert!(!config.log_raw());
        assert_eq!(config.ticker_timer(), Duration::from_secs(5));
        assert_eq!(config.trades.default_quote, "BUSD");
        assert_eq!(config.trades.threshold, 1000.0);
        // untouched fields in a partially specified section keep their default
        assert_eq!(config.trades.quotes.len(), 4);
        assert_eq!(config.filter.quote, "USDT,BTC");
        assert_eq!(config.filter.percent, -2.5);
        assert_eq!(config.db.retention_secs, 3600);
    }

    #[test]
    fn test_env_overrides_use_single_underscore_prefix() {
        let vars: config::Map<String, String> = [
            ("BINTEL_TRADES__THRESHOLD", "25000"),
            ("BINTEL_FILTER__QUOTE", "USDT,BTC"),
            ("BINTEL_TRADES__QUOTES", "USDT,FDUSD"),
            ("BINTEL_TICKER_TIMER_SECS", "7"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let config =
            AppConfig::layered("no-such-settings-file", env_overrides().source(Some(vars)))
                .unwrap();

        assert_eq!(config.trades.threshold, 25_000.0);
        // only the quotes list is split; the filter keeps its comma-joined form
        assert_eq!(config.filter.quote, "USDT,BTC");
        assert_eq!(config.trades.quotes, vec!["USDT", "FDUSD"]);
        assert_eq!(config.ticker_timer(), Duration::from_secs(7));
    }

    #[test]
    fn test_double_underscore_prefix_is_not_read() {
        let vars: config::Map<String, String> =
            [("BINTEL__TRADES__THRESHOLD".to_string(), "25000".to_string())]
                .into_iter()
                .collect();

        let config =
            AppConfig::layered("no-such-settings-file", env_overrides().source(Some(vars)))
                .unwrap();

        assert_eq!(config.trades.threshold, 50_000.0);
    }

    #[test]
    fn test_database_path_lives_in_data_dir() {
        let config = AppConfig::from_toml(r#"data_dir = "/tmp/bintel""#).unwrap();
        assert_eq!(config.database_path(), PathBuf::from("/tmp/bintel/event.db"));
    }
}
