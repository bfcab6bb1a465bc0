//! Error types for rate lookups, trades and accounts.

use thiserror::Error;

/// Account and session failures.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AuthError {
    #[error("Username '{0}' is already taken")]
    UsernameTaken(String),

    #[error("User '{0}' not found")]
    UserNotFound(String),

    #[error("Invalid username: must not be empty")]
    InvalidUsername,

    #[error("Password must be at least {min_len} characters long")]
    WeakPassword { min_len: usize },

    #[error("Wrong password")]
    InvalidCredentials,

    #[error("Not logged in; run `login` first")]
    NotLoggedIn,
}

/// Errors surfaced by the exchange core.
///
/// Expected business conditions (unknown currency, insufficient funds, stale
/// rates) are modelled as variants so callers can match on them and print
/// them verbatim.
#[derive(Error, Debug)]
pub enum ExchangeError {
    #[error("Unknown currency or no rate route: '{0}'")]
    CurrencyNotFound(String),

    #[error("Amount must be a positive number, got {0}")]
    InvalidAmount(f64),

    #[error("Cannot trade {0} against itself")]
    SameCurrency(String),

    #[error("Insufficient funds: available {available} {code}, required {required} {code}")]
    InsufficientFunds {
        available: f64,
        required: f64,
        code: String,
    },

    #[error("Exchange rates unavailable: {0}")]
    RatesUnavailable(String),

    #[error("Invalid stored rate for {pair}: {rate}")]
    InvalidRate { pair: String, rate: f64 },

    #[error("Source '{source_name}' failed: {reason}")]
    SourceFetchFailed { source_name: String, reason: String },

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

/// Result type alias for exchange operations.
pub type ExchangeResult<T> = Result<T, ExchangeError>;
