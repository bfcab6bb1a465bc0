use crate::core::error::{ExchangeError, ExchangeResult};
use crate::core::rates::{PairRate, RateSnapshot, is_valid_rate, pair_key};
use chrono::{DateTime, TimeDelta, Utc};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::debug;

/// A resolved rate together with where it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Quote {
    pub from_code: String,
    pub to_code: String,
    pub rate: f64,
    pub updated_at: DateTime<Utc>,
    pub source: String,
    /// True when the rate is the reciprocal of the stored `TO_FROM` pair.
    pub inverted: bool,
}

/// Holds the latest rate snapshot.
///
/// Readers clone the `Arc` under a short read lock and keep using their copy
/// even if a refresh swaps in a new snapshot meanwhile.
pub struct RateCache {
    inner: RwLock<Option<Arc<RateSnapshot>>>,
}

impl RateCache {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(None),
        }
    }

    pub fn with_snapshot(snapshot: RateSnapshot) -> Self {
        Self {
            inner: RwLock::new(Some(Arc::new(snapshot))),
        }
    }

    pub fn current(&self) -> Option<Arc<RateSnapshot>> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Swaps in a new snapshot, returning the previous one.
    pub fn replace(&self, snapshot: RateSnapshot) -> Option<Arc<RateSnapshot>> {
        let next = Arc::new(snapshot);
        let mut slot = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        debug!(pairs = next.len(), "Cache REPLACE");
        slot.replace(next)
    }

    pub fn last_refresh(&self) -> Option<DateTime<Utc>> {
        self.current().map(|s| s.last_refresh())
    }

    pub fn is_stale(&self, ttl_seconds: u64) -> bool {
        self.is_stale_at(ttl_seconds, Utc::now())
    }

    /// Stale when empty or strictly older than `ttl_seconds` at `now`.
    pub fn is_stale_at(&self, ttl_seconds: u64, now: DateTime<Utc>) -> bool {
        let Some(last_refresh) = self.last_refresh() else {
            return true;
        };
        let ttl = i64::try_from(ttl_seconds)
            .ok()
            .and_then(TimeDelta::try_seconds)
            .unwrap_or(TimeDelta::MAX);
        now - last_refresh > ttl
    }

    pub fn get(&self, from: &str, to: &str) -> ExchangeResult<f64> {
        self.quote(from, to).map(|q| q.rate)
    }

    /// Looks up `FROM_TO`, falling back to the reciprocal of `TO_FROM`.
    pub fn quote(&self, from: &str, to: &str) -> ExchangeResult<Quote> {
        let snapshot = self.current();

        if from == to {
            let updated_at = snapshot
                .as_ref()
                .map_or_else(Utc::now, |s| s.last_refresh());
            return Ok(Quote {
                from_code: from.to_string(),
                to_code: to.to_string(),
                rate: 1.0,
                updated_at,
                source: "identity".to_string(),
                inverted: false,
            });
        }

        let snapshot = snapshot
            .ok_or_else(|| ExchangeError::RatesUnavailable("rate cache is empty".to_string()))?;

        if let Some(pair) = snapshot.get(from, to) {
            debug!(pair = %pair.key(), "Cache HIT");
            return Ok(Quote {
                from_code: from.to_string(),
                to_code: to.to_string(),
                rate: checked_rate(pair)?,
                updated_at: pair.updated_at,
                source: pair.source.clone(),
                inverted: false,
            });
        }

        if let Some(pair) = snapshot.get(to, from) {
            debug!(pair = %pair.key(), "Cache HIT (inverse)");
            return Ok(Quote {
                from_code: from.to_string(),
                to_code: to.to_string(),
                rate: 1.0 / checked_rate(pair)?,
                updated_at: pair.updated_at,
                source: pair.source.clone(),
                inverted: true,
            });
        }

        debug!(pair = %pair_key(from, to), "Cache MISS");
        Err(ExchangeError::CurrencyNotFound(pair_key(from, to)))
    }
}

fn checked_rate(pair: &PairRate) -> ExchangeResult<f64> {
    if is_valid_rate(pair.rate) {
        Ok(pair.rate)
    } else {
        Err(ExchangeError::InvalidRate {
            pair: pair.key(),
            rate: pair.rate,
        })
    }
}

impl Default for RateCache {
    fn default() -> Self {
        Self::new()
    }
}
