//! Core business logic: rates, the ledger and the service that ties them together

pub mod aggregator;
pub mod cache;
pub mod config;
pub mod currency;
pub mod error;
pub mod ledger;
pub mod log;
pub mod projection;
pub mod rates;
pub mod scheduler;
pub mod service;
pub mod source;
pub mod user;

#[cfg(test)]
pub(crate) mod testing;

// Re-export main types for cleaner imports
pub use cache::{Quote, RateCache};
pub use error::{AuthError, ExchangeError, ExchangeResult};
pub use ledger::{Portfolio, TradeReceipt, TradeSide, Wallet};
pub use projection::{RateBoard, RateFilter, Valuation};
pub use service::{Exchange, RefreshSummary};
pub use source::{QuoteSource, RawRates};
