//! Merges the output of several quote sources into one rate snapshot.

use crate::core::currency::{CurrencyRegistry, normalize_code};
use crate::core::error::ExchangeError;
use crate::core::rates::{PairRate, RateSnapshot, is_valid_rate, pair_key};
use crate::core::source::{QuoteSource, RawRates};
use chrono::Utc;
use futures::future::join_all;
use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Result of one aggregation run.
#[derive(Debug)]
pub struct Aggregation {
    pub snapshot: RateSnapshot,
    /// One `SourceFetchFailed` per source that errored or timed out.
    pub failures: Vec<ExchangeError>,
    pub succeeded: usize,
}

impl Aggregation {
    pub fn all_failed(&self) -> bool {
        self.succeeded == 0
    }
}

pub struct RateAggregator {
    sources: Vec<Arc<dyn QuoteSource>>,
    registry: Arc<CurrencyRegistry>,
    timeout: Duration,
}

impl RateAggregator {
    /// Sources are listed in precedence order: when two of them quote the
    /// same pair, the one given first wins.
    pub fn new(
        sources: Vec<Arc<dyn QuoteSource>>,
        registry: Arc<CurrencyRegistry>,
        timeout: Duration,
    ) -> Self {
        Self {
            sources,
            registry,
            timeout,
        }
    }

    pub fn source_names(&self) -> Vec<String> {
        self.sources.iter().map(|s| s.name().to_string()).collect()
    }

    pub fn has_sources(&self) -> bool {
        !self.sources.is_empty()
    }

    /// A copy of this aggregator restricted to the named source.
    pub fn only(&self, name: &str) -> Option<Self> {
        let source = self
            .sources
            .iter()
            .find(|s| s.name().eq_ignore_ascii_case(name))?;
        Some(Self {
            sources: vec![Arc::clone(source)],
            registry: Arc::clone(&self.registry),
            timeout: self.timeout,
        })
    }

    #[instrument(name = "RateAggregate", skip(self), fields(sources = self.sources.len()))]
    pub async fn aggregate(&self) -> Aggregation {
        let fetches = self.sources.iter().map(|source| async move {
            debug!(source = source.name(), "Requesting rates");
            let outcome = match tokio::time::timeout(self.timeout, source.fetch_rates()).await {
                Ok(Ok(rates)) => Ok(rates),
                Ok(Err(e)) => Err(format!("{e:#}")),
                Err(_) => Err(format!("timed out after {}s", self.timeout.as_secs_f64())),
            };
            (source.name().to_string(), outcome)
        });
        // join_all keeps input order, which is what precedence relies on.
        let results = join_all(fetches).await;
        let now = Utc::now();

        let mut merged: BTreeMap<String, PairRate> = BTreeMap::new();
        let mut failures = Vec::new();
        let mut succeeded = 0;

        for (source_name, outcome) in results {
            match outcome {
                Ok(rates) => {
                    succeeded += 1;
                    info!(source = %source_name, count = rates.len(), "Received rates");
                    self.merge_source(&mut merged, &source_name, rates, now);
                }
                Err(reason) => {
                    warn!(source = %source_name, %reason, "Rate source failed, skipping");
                    failures.push(ExchangeError::SourceFetchFailed {
                        source_name,
                        reason,
                    });
                }
            }
        }

        Aggregation {
            snapshot: RateSnapshot::from_pairs(merged.into_values(), now),
            failures,
            succeeded,
        }
    }

    fn merge_source(
        &self,
        merged: &mut BTreeMap<String, PairRate>,
        source_name: &str,
        rates: RawRates,
        now: chrono::DateTime<Utc>,
    ) {
        let mut entries: Vec<_> = rates.into_iter().collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));

        for (raw_key, rate) in entries {
            let Some((from, to)) = self.normalize_key(&raw_key) else {
                debug!(source = source_name, key = %raw_key, "Skipping unrecognised pair key");
                continue;
            };
            if from == to {
                continue;
            }
            if !is_valid_rate(rate) {
                warn!(source = source_name, key = %raw_key, rate, "Skipping non-positive rate");
                continue;
            }
            match merged.entry(pair_key(&from, &to)) {
                Entry::Vacant(slot) => {
                    slot.insert(PairRate {
                        from_code: from,
                        to_code: to,
                        rate,
                        updated_at: now,
                        source: source_name.to_string(),
                    });
                }
                Entry::Occupied(existing) => {
                    debug!(
                        pair = %existing.key(),
                        kept = %existing.get().source,
                        ignored = source_name,
                        "Pair already provided by an earlier source"
                    );
                }
            }
        }
    }

    /// Maps a native key to canonical `(from, to)` codes. Crypto asset ids on
    /// either side are translated through the registry.
    fn normalize_key(&self, raw_key: &str) -> Option<(String, String)> {
        let (from, to) = raw_key.trim().split_once('_')?;
        Some((self.resolve_side(from)?, self.resolve_side(to)?))
    }

    fn resolve_side(&self, side: &str) -> Option<String> {
        match self.registry.code_for_asset_id(side) {
            Some(code) => Some(code.to_string()),
            None => normalize_code(side).ok(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::testing::{StaticSource, registry, rates};

    fn aggregator(sources: Vec<Arc<dyn QuoteSource>>) -> RateAggregator {
        RateAggregator::new(sources, registry(), Duration::from_millis(200))
    }

    #[tokio::test]
    async fn test_partial_failure_still_produces_snapshot() {
        let agg = aggregator(vec![
            StaticSource::ok("s1", rates(&[("BTC_USD", 50000.0)])),
            StaticSource::failing("s2", "boom"),
        ]);

        let result = agg.aggregate().await;
        assert_eq!(result.succeeded, 1);
        assert!(!result.all_failed());
        assert_eq!(result.snapshot.get("BTC", "USD").unwrap().rate, 50000.0);
        assert_eq!(result.failures.len(), 1);
        match &result.failures[0] {
            ExchangeError::SourceFetchFailed {
                source_name,
                reason,
            } => {
                assert_eq!(source_name, "s2");
                assert!(reason.contains("boom"));
            }
            other => panic!("Expected SourceFetchFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_first_source_wins_on_conflict() {
        let agg = aggregator(vec![
            StaticSource::ok("s1", rates(&[("BTC_USD", 50000.0)])),
            StaticSource::ok("s2", rates(&[("BTC_USD", 51000.0), ("ETH_USD", 3000.0)])),
        ]);

        let snapshot = agg.aggregate().await.snapshot;
        let btc = snapshot.get("BTC", "USD").unwrap();
        assert_eq!(btc.rate, 50000.0);
        assert_eq!(btc.source, "s1");
        let eth = snapshot.get("ETH", "USD").unwrap();
        assert_eq!(eth.rate, 3000.0);
        assert_eq!(eth.source, "s2");
    }

    #[tokio::test]
    async fn test_precedence_follows_construction_order_not_completion() {
        let agg = aggregator(vec![
            StaticSource::delayed("slow", rates(&[("BTC_USD", 50000.0)]), 50),
            StaticSource::ok("fast", rates(&[("BTC_USD", 51000.0)])),
        ]);

        let snapshot = agg.aggregate().await.snapshot;
        assert_eq!(snapshot.get("BTC", "USD").unwrap().source, "slow");
    }

    #[tokio::test]
    async fn test_asset_ids_are_normalized() {
        let agg = aggregator(vec![StaticSource::ok(
            "coingecko",
            rates(&[("BITCOIN_USD", 50000.0), ("ethereum_usd", 3000.0)]),
        )]);

        let snapshot = agg.aggregate().await.snapshot;
        assert_eq!(snapshot.get("BTC", "USD").unwrap().rate, 50000.0);
        assert_eq!(snapshot.get("ETH", "USD").unwrap().rate, 3000.0);
        assert_eq!(snapshot.len(), 2);
    }

    #[tokio::test]
    async fn test_invalid_entries_are_skipped() {
        let agg = aggregator(vec![StaticSource::ok(
            "s1",
            rates(&[
                ("USD_EUR", 0.9),
                ("USD_USD", 1.0),
                ("USD_GBP", 0.0),
                ("USD_RUB", -3.0),
                ("USD_JPY", f64::NAN),
                ("DOGECOIN_USD", 0.1),
                ("NOSEPARATOR", 1.0),
            ]),
        )]);

        let snapshot = agg.aggregate().await.snapshot;
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.get("USD", "EUR").unwrap().rate, 0.9);
    }

    #[tokio::test]
    async fn test_pairs_are_stamped_with_completion_time() {
        let before = Utc::now();
        let agg = aggregator(vec![
            StaticSource::ok("s1", rates(&[("BTC_USD", 50000.0)])),
            StaticSource::ok("s2", rates(&[("USD_EUR", 0.9)])),
        ]);
        let snapshot = agg.aggregate().await.snapshot;
        let after = Utc::now();

        let refreshed = snapshot.last_refresh();
        assert!(refreshed >= before && refreshed <= after);
        for pair in snapshot.pairs() {
            assert_eq!(pair.updated_at, refreshed);
        }
    }

    #[tokio::test]
    async fn test_slow_source_times_out() {
        let agg = aggregator(vec![
            StaticSource::delayed("stuck", rates(&[("BTC_USD", 1.0)]), 5_000),
            StaticSource::ok("s2", rates(&[("USD_EUR", 0.9)])),
        ]);

        let result = agg.aggregate().await;
        assert_eq!(result.succeeded, 1);
        assert!(result.snapshot.get("BTC", "USD").is_none());
        assert!(result.failures[0].to_string().contains("timed out"));
    }

    #[tokio::test]
    async fn test_all_sources_failing_yields_empty_snapshot() {
        let agg = aggregator(vec![
            StaticSource::failing("s1", "down"),
            StaticSource::failing("s2", "down"),
        ]);

        let result = agg.aggregate().await;
        assert!(result.all_failed());
        assert!(result.snapshot.is_empty());
        assert_eq!(result.failures.len(), 2);
    }

    #[tokio::test]
    async fn test_only_restricts_sources() {
        let agg = aggregator(vec![
            StaticSource::ok("coingecko", rates(&[("BTC_USD", 50000.0)])),
            StaticSource::ok("exchangerate", rates(&[("USD_EUR", 0.9)])),
        ]);

        let restricted = agg.only("ExchangeRate").unwrap();
        assert_eq!(restricted.source_names(), vec!["exchangerate"]);
        let snapshot = restricted.aggregate().await.snapshot;
        assert!(snapshot.get("BTC", "USD").is_none());
        assert!(snapshot.get("USD", "EUR").is_some());
        assert!(agg.only("unknown").is_none());
    }

    #[tokio::test]
    async fn test_identical_refreshes_keep_rates() {
        let agg = aggregator(vec![StaticSource::ok(
            "s1",
            rates(&[("BTC_USD", 50000.0), ("USD_EUR", 0.9)]),
        )]);

        let first = agg.aggregate().await.snapshot;
        tokio::time::sleep(Duration::from_millis(5)).await;
        let second = agg.aggregate().await.snapshot;

        assert!(second.last_refresh() > first.last_refresh());
        for pair in first.pairs() {
            let again = second.get(&pair.from_code, &pair.to_code).unwrap();
            assert_eq!(again.rate, pair.rate);
        }
    }
}
