use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::{fs, path::PathBuf};
use tracing::debug;

pub const EXCHANGERATE_API_KEY_ENV: &str = "EXCHANGERATE_API_KEY";

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct CurrenciesConfig {
    pub fiat: Vec<String>,
    /// Crypto currency code to CoinGecko asset id.
    pub crypto: BTreeMap<String, String>,
}

impl Default for CurrenciesConfig {
    fn default() -> Self {
        CurrenciesConfig {
            fiat: vec!["EUR".to_string(), "GBP".to_string(), "RUB".to_string()],
            crypto: BTreeMap::from([
                ("BTC".to_string(), "bitcoin".to_string()),
                ("ETH".to_string(), "ethereum".to_string()),
                ("SOL".to_string(), "solana".to_string()),
            ]),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct CoinGeckoProviderConfig {
    pub base_url: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ExchangeRateProviderConfig {
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
}

impl ExchangeRateProviderConfig {
    /// Configured key, falling back to the `EXCHANGERATE_API_KEY` env var.
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .or_else(|| std::env::var(EXCHANGERATE_API_KEY_ENV).ok())
            .filter(|key| !key.trim().is_empty())
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ProvidersConfig {
    pub coingecko: Option<CoinGeckoProviderConfig>,
    pub exchangerate: Option<ExchangeRateProviderConfig>,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        ProvidersConfig {
            coingecko: Some(CoinGeckoProviderConfig {
                base_url: "https://api.coingecko.com/api/v3".to_string(),
            }),
            exchangerate: Some(ExchangeRateProviderConfig {
                base_url: "https://v6.exchangerate-api.com/v6".to_string(),
                api_key: None,
            }),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub data_path: Option<String>,
    pub base_currency: String,
    pub rates_ttl_seconds: u64,
    pub request_timeout_secs: u64,
    pub refresh_interval_secs: u64,
    pub initial_usd_balance: f64,
    pub currencies: CurrenciesConfig,
    pub providers: ProvidersConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            data_path: None,
            base_currency: "USD".to_string(),
            rates_ttl_seconds: 3600,
            request_timeout_secs: 10,
            refresh_interval_secs: 3600,
            initial_usd_balance: 0.0,
            currencies: CurrenciesConfig::default(),
            providers: ProvidersConfig::default(),
        }
    }
}

impl AppConfig {
    /// Loads the config from the default location, falling back to defaults
    /// when no file has been set up yet.
    pub fn load() -> Result<Self> {
        debug!("Loading default config");
        let config_path = Self::default_config_path()?;
        if !config_path.exists() {
            debug!(
                "No config file at {}, using defaults",
                config_path.display()
            );
            return Ok(Self::default());
        }
        Self::load_from_path(&config_path)
    }

    pub fn default_config_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("io", "valutatrade", "valutatrade")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.config_dir().join("config.yaml"))
    }

    pub fn data_path(&self) -> Result<PathBuf> {
        if let Some(custom_path) = &self.data_path {
            return Ok(PathBuf::from(custom_path));
        }
        let proj_dirs = ProjectDirs::from("io", "valutatrade", "valutatrade")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.data_dir().to_path_buf())
    }

    /// Directory holding the action audit log.
    pub fn action_log_dir(&self) -> Result<PathBuf> {
        Ok(self.data_path()?.join("logs"))
    }

    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let config_str = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: Self = serde_yaml::from_str(&config_str)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;
        debug!("Successfully loaded config");
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_deserialization() {
        let yaml_str = r#"
data_path: "/tmp/valutatrade"
rates_ttl_seconds: 600
initial_usd_balance: 1000.0
currencies:
  fiat: ["EUR", "JPY"]
  crypto:
    BTC: bitcoin
    DOGE: dogecoin
providers:
  coingecko:
    base_url: "http://example.com/coingecko"
  exchangerate:
    base_url: "http://example.com/exchangerate"
    api_key: "secret"
"#;

        let config: AppConfig = serde_yaml::from_str(yaml_str).expect("Failed to deserialize");
        assert_eq!(config.data_path.as_deref(), Some("/tmp/valutatrade"));
        assert_eq!(config.rates_ttl_seconds, 600);
        assert_eq!(config.initial_usd_balance, 1000.0);
        // Unset fields keep their defaults
        assert_eq!(config.base_currency, "USD");
        assert_eq!(config.request_timeout_secs, 10);
        assert_eq!(config.refresh_interval_secs, 3600);

        assert_eq!(config.currencies.fiat, vec!["EUR", "JPY"]);
        assert_eq!(config.currencies.crypto.len(), 2);
        assert_eq!(
            config.currencies.crypto.get("DOGE").map(String::as_str),
            Some("dogecoin")
        );

        assert_eq!(
            config.providers.coingecko.unwrap().base_url,
            "http://example.com/coingecko"
        );
        let exchangerate = config.providers.exchangerate.unwrap();
        assert_eq!(exchangerate.base_url, "http://example.com/exchangerate");
        assert_eq!(exchangerate.resolve_api_key().as_deref(), Some("secret"));
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: AppConfig = serde_yaml::from_str("{}").unwrap();
        assert_eq!(config, AppConfig::default());
        assert!(config.providers.coingecko.is_some());
        assert!(config.providers.exchangerate.is_some());
        assert_eq!(config.rates_ttl_seconds, 3600);
    }

    #[test]
    fn test_provider_can_be_disabled() {
        let yaml_str = r#"
providers:
  coingecko:
    base_url: "http://example.com/coingecko"
"#;
        let config: AppConfig = serde_yaml::from_str(yaml_str).unwrap();
        assert!(config.providers.coingecko.is_some());
        assert!(config.providers.exchangerate.is_none());
    }

    #[test]
    fn test_action_log_dir_under_data_path() {
        let config = AppConfig {
            data_path: Some("/tmp/vt".to_string()),
            ..AppConfig::default()
        };
        assert_eq!(
            config.action_log_dir().unwrap(),
            PathBuf::from("/tmp/vt").join("logs")
        );
    }

    #[test]
    fn test_load_from_path() {
        let file = tempfile::NamedTempFile::new().unwrap();
        fs::write(file.path(), "rates_ttl_seconds: 42\n").unwrap();
        let config = AppConfig::load_from_path(file.path()).unwrap();
        assert_eq!(config.rates_ttl_seconds, 42);

        let missing = AppConfig::load_from_path("/definitely/not/here.yaml");
        assert!(missing.is_err());
        assert!(
            missing
                .unwrap_err()
                .to_string()
                .contains("Failed to read config file")
        );
    }
}
