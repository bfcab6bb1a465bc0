//! Exchange rate records and the immutable snapshot they are served from.

use crate::core::currency::normalize_code;
use crate::core::error::ExchangeError;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Canonical `FROM_TO` key for a pair.
pub fn pair_key(from: &str, to: &str) -> String {
    format!("{from}_{to}")
}

/// Splits a canonical pair key into validated `(from, to)` codes.
pub fn parse_pair_key(key: &str) -> Option<(String, String)> {
    let (from, to) = key.split_once('_')?;
    let from = normalize_code(from).ok()?;
    let to = normalize_code(to).ok()?;
    Some((from, to))
}

pub(crate) fn is_valid_rate(rate: f64) -> bool {
    rate.is_finite() && rate > 0.0
}

#[derive(Debug, Clone, PartialEq)]
pub struct PairRate {
    pub from_code: String,
    pub to_code: String,
    pub rate: f64,
    pub updated_at: DateTime<Utc>,
    pub source: String,
}

impl PairRate {
    pub fn key(&self) -> String {
        pair_key(&self.from_code, &self.to_code)
    }
}

/// A fully formed rate table plus the time it was refreshed.
///
/// Snapshots are never mutated after construction; a refresh builds a new one
/// and the cache swaps it in whole.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "SnapshotRecord", into = "SnapshotRecord")]
pub struct RateSnapshot {
    pairs: BTreeMap<String, PairRate>,
    last_refresh: DateTime<Utc>,
}

impl RateSnapshot {
    /// Builds a snapshot. If two pairs share a key the first one is kept.
    pub fn from_pairs<I>(pairs: I, last_refresh: DateTime<Utc>) -> Self
    where
        I: IntoIterator<Item = PairRate>,
    {
        let mut table = BTreeMap::new();
        for pair in pairs {
            table.entry(pair.key()).or_insert(pair);
        }
        Self {
            pairs: table,
            last_refresh,
        }
    }

    pub fn get(&self, from: &str, to: &str) -> Option<&PairRate> {
        self.pairs.get(&pair_key(from, to))
    }

    pub fn pairs(&self) -> impl Iterator<Item = &PairRate> {
        self.pairs.values()
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn last_refresh(&self) -> DateTime<Utc> {
        self.last_refresh
    }

    /// History entries for every pair in this snapshot.
    pub fn history_records(&self) -> Vec<RateRecord> {
        self.pairs.values().map(RateRecord::from).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct PairRecord {
    rate: f64,
    updated_at: DateTime<Utc>,
    source: String,
}

/// Persisted layout: `{"pairs": {"BTC_USD": {rate, updated_at, source}}, "last_refresh"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct SnapshotRecord {
    pairs: BTreeMap<String, PairRecord>,
    last_refresh: DateTime<Utc>,
}

impl TryFrom<SnapshotRecord> for RateSnapshot {
    type Error = ExchangeError;

    fn try_from(record: SnapshotRecord) -> Result<Self, Self::Error> {
        let mut pairs = BTreeMap::new();
        for (key, pair) in record.pairs {
            let (from_code, to_code) =
                parse_pair_key(&key).ok_or_else(|| ExchangeError::CurrencyNotFound(key.clone()))?;
            if !is_valid_rate(pair.rate) {
                return Err(ExchangeError::InvalidRate {
                    pair: key,
                    rate: pair.rate,
                });
            }
            let pair = PairRate {
                from_code,
                to_code,
                rate: pair.rate,
                updated_at: pair.updated_at,
                source: pair.source,
            };
            pairs.insert(pair.key(), pair);
        }
        Ok(RateSnapshot {
            pairs,
            last_refresh: record.last_refresh,
        })
    }
}

impl From<RateSnapshot> for SnapshotRecord {
    fn from(snapshot: RateSnapshot) -> Self {
        let pairs = snapshot
            .pairs
            .into_iter()
            .map(|(key, pair)| {
                (
                    key,
                    PairRecord {
                        rate: pair.rate,
                        updated_at: pair.updated_at,
                        source: pair.source,
                    },
                )
            })
            .collect();
        SnapshotRecord {
            pairs,
            last_refresh: snapshot.last_refresh,
        }
    }
}

/// One measurement in the rate history log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateRecord {
    pub id: String,
    pub from_code: String,
    pub to_code: String,
    pub rate: f64,
    pub timestamp: DateTime<Utc>,
    pub source: String,
}

impl From<&PairRate> for RateRecord {
    fn from(pair: &PairRate) -> Self {
        RateRecord {
            id: format!(
                "{}_{}",
                pair.key(),
                pair.updated_at.to_rfc3339_opts(SecondsFormat::Micros, true)
            ),
            from_code: pair.from_code.clone(),
            to_code: pair.to_code.clone(),
            rate: pair.rate,
            timestamp: pair.updated_at,
            source: pair.source.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn pair(from: &str, to: &str, rate: f64, source: &str) -> PairRate {
        PairRate {
            from_code: from.to_string(),
            to_code: to.to_string(),
            rate,
            updated_at: at(1_700_000_000),
            source: source.to_string(),
        }
    }

    #[test]
    fn test_parse_pair_key() {
        assert_eq!(
            parse_pair_key("btc_usd"),
            Some(("BTC".to_string(), "USD".to_string()))
        );
        assert_eq!(parse_pair_key("BTCUSD"), None);
        assert_eq!(parse_pair_key("B_USD"), None);
        assert_eq!(parse_pair_key("BTC_"), None);
    }

    #[test]
    fn test_from_pairs_keeps_first_duplicate() {
        let snapshot = RateSnapshot::from_pairs(
            vec![
                pair("BTC", "USD", 50000.0, "first"),
                pair("BTC", "USD", 51000.0, "second"),
                pair("USD", "EUR", 0.9, "first"),
            ],
            at(1_700_000_000),
        );
        assert_eq!(snapshot.len(), 2);
        let btc = snapshot.get("BTC", "USD").unwrap();
        assert_eq!(btc.rate, 50000.0);
        assert_eq!(btc.source, "first");
        assert!(snapshot.get("USD", "BTC").is_none());
    }

    #[test]
    fn test_persisted_layout() {
        let snapshot =
            RateSnapshot::from_pairs(vec![pair("BTC", "USD", 50000.0, "coingecko")], at(1_700_000_000));
        let value = serde_json::to_value(&snapshot).unwrap();

        let entry = &value["pairs"]["BTC_USD"];
        assert_eq!(entry["rate"], 50000.0);
        assert_eq!(entry["source"], "coingecko");
        assert!(entry["updated_at"].is_string());
        assert!(entry.get("from_code").is_none());
        assert!(value["last_refresh"].is_string());

        let restored: RateSnapshot = serde_json::from_value(value).unwrap();
        assert_eq!(restored, snapshot);
    }

    #[test]
    fn test_deserialize_rejects_malformed_records() {
        let bad_key = r#"{
            "pairs": {"BTCUSD": {"rate": 1.0, "updated_at": "2024-01-01T00:00:00Z", "source": "x"}},
            "last_refresh": "2024-01-01T00:00:00Z"
        }"#;
        assert!(serde_json::from_str::<RateSnapshot>(bad_key).is_err());

        let zero_rate = r#"{
            "pairs": {"BTC_USD": {"rate": 0.0, "updated_at": "2024-01-01T00:00:00Z", "source": "x"}},
            "last_refresh": "2024-01-01T00:00:00Z"
        }"#;
        let err = serde_json::from_str::<RateSnapshot>(zero_rate).unwrap_err();
        assert!(err.to_string().contains("Invalid stored rate for BTC_USD"));

        let missing_refresh = r#"{"pairs": {}}"#;
        assert!(serde_json::from_str::<RateSnapshot>(missing_refresh).is_err());
    }

    #[test]
    fn test_history_records() {
        let snapshot = RateSnapshot::from_pairs(
            vec![
                pair("BTC", "USD", 50000.0, "coingecko"),
                pair("USD", "EUR", 0.9, "exchangerate"),
            ],
            at(1_700_000_000),
        );
        let records = snapshot.history_records();
        assert_eq!(records.len(), 2);
        let btc = records.iter().find(|r| r.from_code == "BTC").unwrap();
        assert!(btc.id.starts_with("BTC_USD_2023-11-14T"));
        assert_eq!(btc.rate, 50000.0);
        assert_eq!(btc.source, "coingecko");
    }
}
