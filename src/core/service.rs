//! The caller-facing exchange API.

use crate::core::aggregator::{Aggregation, RateAggregator};
use crate::core::cache::{Quote, RateCache};
use crate::core::config::AppConfig;
use crate::core::currency::CurrencyRegistry;
use crate::core::error::{AuthError, ExchangeError, ExchangeResult};
use crate::core::ledger::{Ledger, Portfolio, TradeReceipt, check_trade};
use crate::core::projection::{self, RateBoard, RateFilter, Valuation};
use crate::core::rates::RateSnapshot;
use crate::core::source::QuoteSource;
use crate::core::user::{User, normalize_username};
use crate::store::Store;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

/// Outcome of a successful rate refresh.
#[derive(Debug, Clone, PartialEq)]
pub struct RefreshSummary {
    pub pairs_updated: usize,
    pub last_refresh: DateTime<Utc>,
    /// `(source, reason)` for every source that failed this round.
    pub failed_sources: Vec<(String, String)>,
}

/// Wires the rate cache, the aggregator, the ledger and the store together.
///
/// Work on one portfolio is serialized through a per-user async mutex, so
/// two trades for the same user never interleave their load and save.
/// Different users proceed independently.
pub struct Exchange {
    config: AppConfig,
    registry: Arc<CurrencyRegistry>,
    store: Arc<dyn Store>,
    cache: Arc<RateCache>,
    aggregator: RateAggregator,
    ledger: Ledger,
    refresh_lock: Mutex<()>,
    registration_lock: Mutex<()>,
    user_locks: StdMutex<HashMap<u64, Arc<Mutex<()>>>>,
}

impl Exchange {
    pub fn new(
        config: AppConfig,
        store: Arc<dyn Store>,
        sources: Vec<Arc<dyn QuoteSource>>,
    ) -> ExchangeResult<Self> {
        let registry = Arc::new(CurrencyRegistry::from_config(&config.currencies)?);
        Ok(Self::with_registry(config, registry, store, sources))
    }

    /// Like `new`, reusing a registry already built from `config.currencies`.
    pub fn with_registry(
        config: AppConfig,
        registry: Arc<CurrencyRegistry>,
        store: Arc<dyn Store>,
        sources: Vec<Arc<dyn QuoteSource>>,
    ) -> Self {
        let cache = match store.load_snapshot() {
            Ok(Some(snapshot)) => {
                debug!(pairs = snapshot.len(), "Loaded persisted rate snapshot");
                RateCache::with_snapshot(snapshot)
            }
            Ok(None) => RateCache::new(),
            Err(e) => {
                warn!(error = ?e, "Ignoring unreadable rate snapshot");
                RateCache::new()
            }
        };
        let cache = Arc::new(cache);

        let aggregator = RateAggregator::new(
            sources,
            Arc::clone(&registry),
            Duration::from_secs(config.request_timeout_secs),
        );

        Self {
            ledger: Ledger::new(Arc::clone(&cache)),
            config,
            registry,
            store,
            cache,
            aggregator,
            refresh_lock: Mutex::new(()),
            registration_lock: Mutex::new(()),
            user_locks: StdMutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn registry(&self) -> &CurrencyRegistry {
        &self.registry
    }

    pub fn source_names(&self) -> Vec<String> {
        self.aggregator.source_names()
    }

    pub fn snapshot(&self) -> Option<Arc<RateSnapshot>> {
        self.cache.current()
    }

    pub fn rates_are_stale(&self) -> bool {
        self.cache.is_stale(self.config.rates_ttl_seconds)
    }

    // Rates

    /// Fetches from every source and replaces the cached snapshot.
    ///
    /// Fails with `RatesUnavailable`, leaving the cache as it was, when no
    /// source succeeded or the sources produced no usable pair.
    #[instrument(name = "RefreshRates", skip(self))]
    pub async fn refresh_rates(&self) -> ExchangeResult<RefreshSummary> {
        let _guard = self.refresh_lock.lock().await;
        self.refresh_with(&self.aggregator, false).await
    }

    /// Refreshes from one named source. Pairs that source does not quote
    /// keep their previous value.
    #[instrument(name = "RefreshRatesFrom", skip(self))]
    pub async fn refresh_from(&self, source: &str) -> ExchangeResult<RefreshSummary> {
        let aggregator = self.aggregator.only(source).ok_or_else(|| {
            ExchangeError::RatesUnavailable(format!(
                "unknown source '{source}', configured: {}",
                self.source_names().join(", ")
            ))
        })?;
        let _guard = self.refresh_lock.lock().await;
        self.refresh_with(&aggregator, true).await
    }

    async fn refresh_with(
        &self,
        aggregator: &RateAggregator,
        carry_forward: bool,
    ) -> ExchangeResult<RefreshSummary> {
        if !aggregator.has_sources() {
            return Err(ExchangeError::RatesUnavailable(
                "no rate sources configured".to_string(),
            ));
        }

        let Aggregation {
            snapshot,
            failures,
            succeeded,
        } = aggregator.aggregate().await;

        let failed_sources: Vec<(String, String)> = failures
            .into_iter()
            .filter_map(|e| match e {
                ExchangeError::SourceFetchFailed {
                    source_name,
                    reason,
                } => Some((source_name, reason)),
                _ => None,
            })
            .collect();

        if succeeded == 0 {
            let reasons: Vec<String> = failed_sources
                .iter()
                .map(|(name, reason)| format!("{name}: {reason}"))
                .collect();
            return Err(ExchangeError::RatesUnavailable(format!(
                "all sources failed ({})",
                reasons.join("; ")
            )));
        }
        if snapshot.is_empty() {
            return Err(ExchangeError::RatesUnavailable(
                "sources returned no usable rates".to_string(),
            ));
        }

        let pairs_updated = snapshot.len();
        let history = snapshot.history_records();
        let snapshot = match (carry_forward, self.cache.current()) {
            (true, Some(previous)) => RateSnapshot::from_pairs(
                snapshot.pairs().chain(previous.pairs()).cloned(),
                snapshot.last_refresh(),
            ),
            _ => snapshot,
        };

        self.store.save_refresh(&snapshot, &history)?;

        let summary = RefreshSummary {
            pairs_updated,
            last_refresh: snapshot.last_refresh(),
            failed_sources,
        };
        self.cache.replace(snapshot);
        info!(
            pairs = summary.pairs_updated,
            failed = summary.failed_sources.len(),
            "Rates refreshed"
        );
        Ok(summary)
    }

    /// Refreshes when the cache is older than the configured TTL. A failed
    /// refresh falls back to the stale snapshot when there is one.
    async fn ensure_fresh_rates(&self) -> ExchangeResult<()> {
        if !self.rates_are_stale() {
            return Ok(());
        }
        let _guard = self.refresh_lock.lock().await;
        // Another caller may have refreshed while we waited
        if !self.rates_are_stale() {
            return Ok(());
        }
        match self.refresh_with(&self.aggregator, false).await {
            Ok(_) => Ok(()),
            Err(e) if self.cache.current().is_some() => {
                warn!(error = %e, "Rate refresh failed, serving stale rates");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    #[instrument(name = "GetRate", skip(self))]
    pub async fn get_rate(&self, from: &str, to: &str) -> ExchangeResult<Quote> {
        let from = self.registry.resolve(from)?;
        let to = self.registry.resolve(to)?;
        if from != to {
            self.ensure_fresh_rates().await?;
        }
        self.cache.quote(&from, &to)
    }

    pub fn rate_board(&self, filter: &RateFilter) -> ExchangeResult<RateBoard> {
        let snapshot = self.cache.current().ok_or_else(|| {
            ExchangeError::RatesUnavailable("no cached rates, run update-rates first".to_string())
        })?;
        let pairs = projection::rate_board(&snapshot, filter);
        if let (Some(code), true) = (&filter.currency, pairs.is_empty()) {
            return Err(ExchangeError::CurrencyNotFound(code.clone()));
        }
        Ok(RateBoard {
            pairs,
            last_refresh: snapshot.last_refresh(),
        })
    }

    // Trading

    fn user_lock(&self, user_id: u64) -> Arc<Mutex<()>> {
        let mut locks = self
            .user_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(user_id).or_default())
    }

    fn load_portfolio(&self, user_id: u64) -> ExchangeResult<Portfolio> {
        self.store
            .load_portfolio(user_id)?
            .ok_or_else(|| AuthError::UserNotFound(user_id.to_string()).into())
    }

    pub fn portfolio(&self, user_id: u64) -> ExchangeResult<Portfolio> {
        self.load_portfolio(user_id)
    }

    #[instrument(name = "Buy", skip(self))]
    pub async fn buy(&self, user_id: u64, code: &str, amount: f64) -> ExchangeResult<TradeReceipt> {
        let code = self.registry.resolve(code)?;
        check_trade(&code, amount)?;
        self.ensure_fresh_rates().await?;

        let lock = self.user_lock(user_id);
        let _guard = lock.lock().await;
        let mut portfolio = self.load_portfolio(user_id)?;
        let receipt = self.ledger.buy(&mut portfolio, &code, amount)?;
        self.store.save_portfolio(&portfolio)?;
        Ok(receipt)
    }

    #[instrument(name = "Sell", skip(self))]
    pub async fn sell(&self, user_id: u64, code: &str, amount: f64) -> ExchangeResult<TradeReceipt> {
        let code = self.registry.resolve(code)?;
        check_trade(&code, amount)?;
        self.ensure_fresh_rates().await?;

        let lock = self.user_lock(user_id);
        let _guard = lock.lock().await;
        let mut portfolio = self.load_portfolio(user_id)?;
        let receipt = self.ledger.sell(&mut portfolio, &code, amount)?;
        self.store.save_portfolio(&portfolio)?;
        Ok(receipt)
    }

    #[instrument(name = "Deposit", skip(self))]
    pub async fn deposit(&self, user_id: u64, code: &str, amount: f64) -> ExchangeResult<f64> {
        let code = self.registry.resolve(code)?;

        let lock = self.user_lock(user_id);
        let _guard = lock.lock().await;
        let mut portfolio = self.load_portfolio(user_id)?;
        let balance = self.ledger.deposit(&mut portfolio, &code, amount)?;
        self.store.save_portfolio(&portfolio)?;
        Ok(balance)
    }

    /// Values the user's wallets in `base`. Wallets without a rate are listed
    /// as unpriced rather than failing the whole view.
    #[instrument(name = "Valuation", skip(self))]
    pub async fn valuation(&self, user_id: u64, base: &str) -> ExchangeResult<Valuation> {
        let base = self.registry.resolve(base)?;
        if let Err(e) = self.ensure_fresh_rates().await {
            warn!(error = %e, "Valuing portfolio without rates");
        }
        let portfolio = self.load_portfolio(user_id)?;
        Ok(projection::valuation(&portfolio, &self.cache, &base))
    }

    // Accounts

    #[instrument(name = "Register", skip(self, password))]
    pub async fn register(&self, username: &str, password: &str) -> ExchangeResult<User> {
        let username = normalize_username(username)?;
        let _guard = self.registration_lock.lock().await;

        if self.store.find_user(&username)?.is_some() {
            return Err(AuthError::UsernameTaken(username).into());
        }
        let user_id = self.store.next_user_id()?;
        let user = User::new(user_id, &username, password)?;
        let portfolio = Portfolio::seeded(user_id, self.config.initial_usd_balance)?;
        self.store.create_user(&user, &portfolio)?;

        info!(action = "REGISTER", user_id, username = %user.username, "User registered");
        Ok(user)
    }

    #[instrument(name = "Login", skip(self, password))]
    pub async fn login(&self, username: &str, password: &str) -> ExchangeResult<User> {
        let username = normalize_username(username)?;
        let user = self
            .store
            .find_user(&username)?
            .ok_or_else(|| AuthError::UserNotFound(username.clone()))?;
        if !user.verify_password(password) {
            warn!(action = "LOGIN", user_id = user.user_id, "Wrong password");
            return Err(AuthError::InvalidCredentials.into());
        }
        self.store.save_session(user.user_id)?;
        info!(action = "LOGIN", user_id = user.user_id, "User logged in");
        Ok(user)
    }

    pub fn logout(&self) -> ExchangeResult<()> {
        self.store.clear_session()?;
        info!(action = "LOGOUT", "Session cleared");
        Ok(())
    }

    /// The logged-in user, or `NotLoggedIn`.
    pub fn current_user(&self) -> ExchangeResult<User> {
        let user_id = self.store.load_session()?.ok_or(AuthError::NotLoggedIn)?;
        self.store
            .get_user(user_id)?
            .ok_or_else(|| AuthError::NotLoggedIn.into())
    }
}
