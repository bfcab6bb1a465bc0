//! Quote source abstraction

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;

/// Rates keyed by the source's native pair key, e.g. `BITCOIN_USD` for a
/// crypto source or `USD_EUR` for a fiat one.
pub type RawRates = HashMap<String, f64>;

#[async_trait]
pub trait QuoteSource: Send + Sync {
    /// Identifier recorded as the `source` of every pair this source wins.
    fn name(&self) -> &str;

    async fn fetch_rates(&self) -> Result<RawRates>;
}
