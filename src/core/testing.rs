//! Test doubles shared by the core unit tests.

use crate::core::config::CurrenciesConfig;
use crate::core::currency::CurrencyRegistry;
use crate::core::rates::{PairRate, RateSnapshot};
use crate::core::source::{QuoteSource, RawRates};
use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub fn registry() -> Arc<CurrencyRegistry> {
    Arc::new(CurrencyRegistry::from_config(&CurrenciesConfig::default()).unwrap())
}

pub fn rates(entries: &[(&str, f64)]) -> RawRates {
    entries
        .iter()
        .map(|(key, rate)| (key.to_string(), *rate))
        .collect()
}

pub fn snapshot(entries: &[(&str, &str, f64)], last_refresh: DateTime<Utc>) -> RateSnapshot {
    RateSnapshot::from_pairs(
        entries.iter().map(|(from, to, rate)| PairRate {
            from_code: from.to_string(),
            to_code: to.to_string(),
            rate: *rate,
            updated_at: last_refresh,
            source: "test".to_string(),
        }),
        last_refresh,
    )
}

/// A source that returns canned rates, optionally after a delay.
pub struct StaticSource {
    name: String,
    response: Mutex<Result<RawRates, String>>,
    delay: Duration,
    calls: AtomicUsize,
}

impl StaticSource {
    pub fn new(name: &str, response: Result<RawRates, String>, delay_ms: u64) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            response: Mutex::new(response),
            delay: Duration::from_millis(delay_ms),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn ok(name: &str, rates: RawRates) -> Arc<dyn QuoteSource> {
        Self::new(name, Ok(rates), 0)
    }

    pub fn failing(name: &str, reason: &str) -> Arc<dyn QuoteSource> {
        Self::new(name, Err(reason.to_string()), 0)
    }

    pub fn delayed(name: &str, rates: RawRates, delay_ms: u64) -> Arc<dyn QuoteSource> {
        Self::new(name, Ok(rates), delay_ms)
    }

    pub fn set_response(&self, response: Result<RawRates, String>) {
        *self.response.lock().unwrap() = response;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl QuoteSource for StaticSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch_rates(&self) -> Result<RawRates> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let response = self.response.lock().unwrap().clone();
        response.map_err(|reason| anyhow!(reason))
    }
}
