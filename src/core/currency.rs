//! Currency codes and the registry of currencies the app can trade.

use crate::core::config::CurrenciesConfig;
use crate::core::error::{ExchangeError, ExchangeResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Display;

/// Settlement currency for every trade.
pub const USD: &str = "USD";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CurrencyKind {
    Fiat,
    Crypto,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CurrencyInfo {
    pub code: String,
    pub name: String,
    pub kind: CurrencyKind,
    /// CoinGecko asset id, crypto only.
    pub asset_id: Option<String>,
}

impl Display for CurrencyInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (&self.kind, &self.asset_id) {
            (CurrencyKind::Fiat, _) => write!(f, "[FIAT] {} - {}", self.code, self.name),
            (CurrencyKind::Crypto, Some(id)) => {
                write!(f, "[CRYPTO] {} - {} (id: {})", self.code, self.name, id)
            }
            (CurrencyKind::Crypto, None) => write!(f, "[CRYPTO] {} - {}", self.code, self.name),
        }
    }
}

/// Trims and upper-cases a currency code, rejecting anything that is not
/// 2-5 ASCII alphanumerics.
pub fn normalize_code(raw: &str) -> ExchangeResult<String> {
    let code = raw.trim().to_ascii_uppercase();
    let valid = (2..=5).contains(&code.len()) && code.chars().all(|c| c.is_ascii_alphanumeric());
    if valid {
        Ok(code)
    } else {
        Err(ExchangeError::CurrencyNotFound(raw.to_string()))
    }
}

fn display_name(code: &str) -> Option<&'static str> {
    match code {
        "USD" => Some("US Dollar"),
        "EUR" => Some("Euro"),
        "GBP" => Some("British Pound"),
        "RUB" => Some("Russian Ruble"),
        "JPY" => Some("Japanese Yen"),
        "CHF" => Some("Swiss Franc"),
        "CNY" => Some("Chinese Yuan"),
        "BTC" => Some("Bitcoin"),
        "ETH" => Some("Ethereum"),
        "SOL" => Some("Solana"),
        _ => None,
    }
}

/// Known currencies, keyed by code. USD is always registered.
#[derive(Debug, Clone)]
pub struct CurrencyRegistry {
    entries: BTreeMap<String, CurrencyInfo>,
}

impl CurrencyRegistry {
    pub fn from_config(config: &CurrenciesConfig) -> ExchangeResult<Self> {
        let mut entries = BTreeMap::new();
        let fiat = std::iter::once(USD).chain(config.fiat.iter().map(String::as_str));
        for raw in fiat {
            let code = normalize_code(raw)?;
            let name = display_name(&code).map_or_else(|| code.clone(), str::to_string);
            entries.insert(
                code.clone(),
                CurrencyInfo {
                    code,
                    name,
                    kind: CurrencyKind::Fiat,
                    asset_id: None,
                },
            );
        }
        for (raw, asset_id) in &config.crypto {
            let code = normalize_code(raw)?;
            let name = display_name(&code).map_or_else(|| asset_id.clone(), str::to_string);
            entries.insert(
                code.clone(),
                CurrencyInfo {
                    code,
                    name,
                    kind: CurrencyKind::Crypto,
                    asset_id: Some(asset_id.to_ascii_lowercase()),
                },
            );
        }
        Ok(Self { entries })
    }

    /// Normalizes `raw` and checks that it is registered.
    pub fn resolve(&self, raw: &str) -> ExchangeResult<String> {
        let code = normalize_code(raw)?;
        if self.is_known(&code) {
            Ok(code)
        } else {
            Err(ExchangeError::CurrencyNotFound(code))
        }
    }

    pub fn get(&self, code: &str) -> Option<&CurrencyInfo> {
        self.entries.get(code)
    }

    pub fn is_known(&self, code: &str) -> bool {
        self.entries.contains_key(code)
    }

    /// Maps a CoinGecko asset id (any case) back to its currency code.
    pub fn code_for_asset_id(&self, asset_id: &str) -> Option<&str> {
        self.entries
            .values()
            .find(|info| {
                info.asset_id
                    .as_deref()
                    .is_some_and(|id| id.eq_ignore_ascii_case(asset_id))
            })
            .map(|info| info.code.as_str())
    }

    pub fn crypto_asset_ids(&self) -> Vec<String> {
        self.entries
            .values()
            .filter_map(|info| info.asset_id.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> CurrencyRegistry {
        CurrencyRegistry::from_config(&CurrenciesConfig::default()).unwrap()
    }

    #[test]
    fn test_normalize_code() {
        assert_eq!(normalize_code(" btc ").unwrap(), "BTC");
        assert_eq!(normalize_code("usdt").unwrap(), "USDT");
        assert!(normalize_code("B").is_err());
        assert!(normalize_code("TOOLONG").is_err());
        assert!(normalize_code("U D").is_err());
        assert!(normalize_code("").is_err());
    }

    #[test]
    fn test_default_registry_contents() {
        let registry = registry();
        for code in ["USD", "EUR", "GBP", "RUB", "BTC", "ETH", "SOL"] {
            assert!(registry.is_known(code), "{code} should be registered");
        }
        assert_eq!(registry.get("BTC").unwrap().kind, CurrencyKind::Crypto);
        assert_eq!(registry.get("EUR").unwrap().kind, CurrencyKind::Fiat);
        assert_eq!(registry.get("ETH").unwrap().name, "Ethereum");
    }

    #[test]
    fn test_resolve_unknown_currency() {
        let registry = registry();
        assert_eq!(registry.resolve("eth").unwrap(), "ETH");
        match registry.resolve("XYZ") {
            Err(ExchangeError::CurrencyNotFound(code)) => assert_eq!(code, "XYZ"),
            other => panic!("Expected CurrencyNotFound, got {other:?}"),
        }
    }

    #[test]
    fn test_asset_id_lookup_is_case_insensitive() {
        let registry = registry();
        assert_eq!(registry.code_for_asset_id("BITCOIN"), Some("BTC"));
        assert_eq!(registry.code_for_asset_id("solana"), Some("SOL"));
        assert_eq!(registry.code_for_asset_id("dogecoin"), None);

        let mut ids = registry.crypto_asset_ids();
        ids.sort();
        assert_eq!(ids, vec!["bitcoin", "ethereum", "solana"]);
    }

    #[test]
    fn test_display_info() {
        let registry = registry();
        assert_eq!(
            registry.get("USD").unwrap().to_string(),
            "[FIAT] USD - US Dollar"
        );
        assert_eq!(
            registry.get("BTC").unwrap().to_string(),
            "[CRYPTO] BTC - Bitcoin (id: bitcoin)"
        );
    }
}
