//! Wallet balances and the buy/sell/deposit operations that change them.

use crate::core::cache::RateCache;
use crate::core::currency::{USD, normalize_code};
use crate::core::error::{ExchangeError, ExchangeResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Display;
use std::sync::Arc;
use tracing::{info, instrument, warn};

fn check_amount(amount: f64) -> ExchangeResult<()> {
    if amount.is_finite() && amount > 0.0 {
        Ok(())
    } else {
        Err(ExchangeError::InvalidAmount(amount))
    }
}

/// A single-currency balance. The balance never goes negative.
#[derive(Debug, Clone, PartialEq)]
pub struct Wallet {
    currency_code: String,
    balance: f64,
}

impl Wallet {
    pub fn new(currency_code: &str) -> Self {
        Self {
            currency_code: currency_code.to_string(),
            balance: 0.0,
        }
    }

    pub fn with_balance(currency_code: &str, balance: f64) -> ExchangeResult<Self> {
        if !balance.is_finite() || balance < 0.0 {
            return Err(ExchangeError::InvalidAmount(balance));
        }
        Ok(Self {
            currency_code: currency_code.to_string(),
            balance,
        })
    }

    pub fn currency_code(&self) -> &str {
        &self.currency_code
    }

    pub fn balance(&self) -> f64 {
        self.balance
    }

    pub fn deposit(&mut self, amount: f64) -> ExchangeResult<f64> {
        check_amount(amount)?;
        let next = self.balance + amount;
        if !next.is_finite() {
            return Err(ExchangeError::InvalidAmount(amount));
        }
        self.balance = next;
        Ok(self.balance)
    }

    /// Fails rather than rounding when `amount` exceeds the balance, however
    /// small the shortfall.
    pub fn withdraw(&mut self, amount: f64) -> ExchangeResult<f64> {
        check_amount(amount)?;
        if amount > self.balance {
            return Err(ExchangeError::InsufficientFunds {
                available: self.balance,
                required: amount,
                code: self.currency_code.clone(),
            });
        }
        self.balance -= amount;
        Ok(self.balance)
    }
}

/// All wallets of one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "PortfolioRecord", into = "PortfolioRecord")]
pub struct Portfolio {
    user_id: u64,
    wallets: BTreeMap<String, Wallet>,
}

impl Portfolio {
    pub fn new(user_id: u64) -> Self {
        Self {
            user_id,
            wallets: BTreeMap::new(),
        }
    }

    /// A fresh portfolio with a USD wallet holding `usd_balance`.
    pub fn seeded(user_id: u64, usd_balance: f64) -> ExchangeResult<Self> {
        let mut portfolio = Self::new(user_id);
        portfolio
            .wallets
            .insert(USD.to_string(), Wallet::with_balance(USD, usd_balance)?);
        Ok(portfolio)
    }

    pub fn user_id(&self) -> u64 {
        self.user_id
    }

    pub fn wallet(&self, code: &str) -> Option<&Wallet> {
        self.wallets.get(code)
    }

    /// Balance of `code`, zero when the wallet does not exist.
    pub fn balance(&self, code: &str) -> f64 {
        self.wallets.get(code).map_or(0.0, Wallet::balance)
    }

    pub fn wallets(&self) -> impl Iterator<Item = &Wallet> {
        self.wallets.values()
    }

    fn wallet_entry(&mut self, code: &str) -> &mut Wallet {
        self.wallets
            .entry(code.to_string())
            .or_insert_with(|| Wallet::new(code))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct WalletRecord {
    balance: f64,
}

/// Persisted layout: `{"user_id": 1, "wallets": {"USD": {"balance": 100.0}}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct PortfolioRecord {
    user_id: u64,
    wallets: BTreeMap<String, WalletRecord>,
}

impl TryFrom<PortfolioRecord> for Portfolio {
    type Error = ExchangeError;

    fn try_from(record: PortfolioRecord) -> Result<Self, Self::Error> {
        let mut wallets = BTreeMap::new();
        for (raw_code, wallet) in record.wallets {
            let code = normalize_code(&raw_code)?;
            wallets.insert(code.clone(), Wallet::with_balance(&code, wallet.balance)?);
        }
        Ok(Portfolio {
            user_id: record.user_id,
            wallets,
        })
    }
}

impl From<Portfolio> for PortfolioRecord {
    fn from(portfolio: Portfolio) -> Self {
        PortfolioRecord {
            user_id: portfolio.user_id,
            wallets: portfolio
                .wallets
                .into_iter()
                .map(|(code, wallet)| {
                    (
                        code,
                        WalletRecord {
                            balance: wallet.balance,
                        },
                    )
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradeSide {
    Buy,
    Sell,
}

impl Display for TradeSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TradeSide::Buy => write!(f, "BUY"),
            TradeSide::Sell => write!(f, "SELL"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TradeReceipt {
    pub side: TradeSide,
    pub currency_code: String,
    pub amount: f64,
    /// USD per unit of `currency_code`.
    pub rate: f64,
    /// Cost of a buy or proceeds of a sell, in USD.
    pub usd_delta: f64,
    pub new_balance: f64,
    pub new_usd_balance: f64,
}

/// Applies trades to portfolios at rates from the shared cache.
///
/// Every operation validates first and commits last: the rate lookup and
/// funds check run before anything is touched, and both wallet updates are
/// made on a staged copy that replaces the portfolio only if both succeed.
pub struct Ledger {
    cache: Arc<RateCache>,
}

impl Ledger {
    pub fn new(cache: Arc<RateCache>) -> Self {
        Self { cache }
    }

    #[instrument(name = "LedgerBuy", skip(self, portfolio), fields(user_id = portfolio.user_id()))]
    pub fn buy(
        &self,
        portfolio: &mut Portfolio,
        code: &str,
        amount: f64,
    ) -> ExchangeResult<TradeReceipt> {
        let result = self.apply_buy(portfolio, code, amount);
        log_trade(TradeSide::Buy, portfolio.user_id(), code, amount, &result);
        result
    }

    #[instrument(name = "LedgerSell", skip(self, portfolio), fields(user_id = portfolio.user_id()))]
    pub fn sell(
        &self,
        portfolio: &mut Portfolio,
        code: &str,
        amount: f64,
    ) -> ExchangeResult<TradeReceipt> {
        let result = self.apply_sell(portfolio, code, amount);
        log_trade(TradeSide::Sell, portfolio.user_id(), code, amount, &result);
        result
    }

    /// Credits `amount` of `code`, creating the wallet when needed.
    pub fn deposit(&self, portfolio: &mut Portfolio, code: &str, amount: f64) -> ExchangeResult<f64> {
        check_amount(amount)?;
        let mut staged = portfolio.clone();
        let new_balance = staged.wallet_entry(code).deposit(amount)?;
        *portfolio = staged;
        info!(
            action = "DEPOSIT",
            user_id = portfolio.user_id(),
            currency = code,
            amount,
            new_balance,
            "Deposit applied"
        );
        Ok(new_balance)
    }

    fn apply_buy(
        &self,
        portfolio: &mut Portfolio,
        code: &str,
        amount: f64,
    ) -> ExchangeResult<TradeReceipt> {
        check_trade(code, amount)?;
        let rate = self.cache.get(code, USD)?;
        let cost = amount * rate;

        let available = portfolio.balance(USD);
        if !(available >= cost) {
            return Err(ExchangeError::InsufficientFunds {
                available,
                required: cost,
                code: USD.to_string(),
            });
        }

        let mut staged = portfolio.clone();
        let new_usd_balance = staged.wallet_entry(USD).withdraw(cost)?;
        let new_balance = staged.wallet_entry(code).deposit(amount)?;
        *portfolio = staged;

        Ok(TradeReceipt {
            side: TradeSide::Buy,
            currency_code: code.to_string(),
            amount,
            rate,
            usd_delta: cost,
            new_balance,
            new_usd_balance,
        })
    }

    fn apply_sell(
        &self,
        portfolio: &mut Portfolio,
        code: &str,
        amount: f64,
    ) -> ExchangeResult<TradeReceipt> {
        check_trade(code, amount)?;
        let rate = self.cache.get(code, USD)?;

        let available = portfolio.balance(code);
        if available < amount {
            return Err(ExchangeError::InsufficientFunds {
                available,
                required: amount,
                code: code.to_string(),
            });
        }
        let proceeds = amount * rate;

        let mut staged = portfolio.clone();
        let new_balance = staged.wallet_entry(code).withdraw(amount)?;
        let new_usd_balance = staged.wallet_entry(USD).deposit(proceeds)?;
        *portfolio = staged;

        Ok(TradeReceipt {
            side: TradeSide::Sell,
            currency_code: code.to_string(),
            amount,
            rate,
            usd_delta: proceeds,
            new_balance,
            new_usd_balance,
        })
    }
}

/// Input checks that need no rates or balances.
pub(crate) fn check_trade(code: &str, amount: f64) -> ExchangeResult<()> {
    check_amount(amount)?;
    if code == USD {
        return Err(ExchangeError::SameCurrency(code.to_string()));
    }
    Ok(())
}

fn log_trade(
    side: TradeSide,
    user_id: u64,
    code: &str,
    amount: f64,
    result: &ExchangeResult<TradeReceipt>,
) {
    match result {
        Ok(receipt) => info!(
            action = %side,
            user_id,
            currency = code,
            amount,
            rate = receipt.rate,
            usd = receipt.usd_delta,
            "Trade applied"
        ),
        Err(e) => warn!(
            action = %side,
            user_id,
            currency = code,
            amount,
            error = %e,
            "Trade rejected"
        ),
    }
}
