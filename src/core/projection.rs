//! Read-only views over portfolios and rate snapshots.

use crate::core::cache::RateCache;
use crate::core::ledger::Portfolio;
use crate::core::rates::{PairRate, RateSnapshot};
use chrono::{DateTime, Utc};
use std::cmp::Ordering;

#[derive(Debug, Clone, PartialEq)]
pub struct ValuationLine {
    pub currency_code: String,
    pub balance: f64,
    /// Balance converted to the valuation base, `None` when no rate exists.
    pub value: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Valuation {
    pub base: String,
    pub lines: Vec<ValuationLine>,
    pub total: f64,
    /// Wallets left out of `total` because they have no route to `base`.
    pub unpriced: Vec<String>,
}

/// Values every wallet in `base`. Wallets that cannot be priced are listed
/// but do not contribute to the total.
pub fn valuation(portfolio: &Portfolio, cache: &RateCache, base: &str) -> Valuation {
    let mut lines = Vec::new();
    let mut unpriced = Vec::new();
    let mut total = 0.0;

    for wallet in portfolio.wallets() {
        let code = wallet.currency_code();
        let value = cache
            .get(code, base)
            .ok()
            .map(|rate| wallet.balance() * rate);
        match value {
            Some(v) => total += v,
            None => unpriced.push(code.to_string()),
        }
        lines.push(ValuationLine {
            currency_code: code.to_string(),
            balance: wallet.balance(),
            value,
        });
    }

    Valuation {
        base: base.to_string(),
        lines,
        total,
        unpriced,
    }
}

/// A filtered view of the cached rates.
#[derive(Debug, Clone, PartialEq)]
pub struct RateBoard {
    pub pairs: Vec<PairRate>,
    pub last_refresh: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct RateFilter {
    pub base: String,
    /// Restrict to pairs between `base` and this currency.
    pub currency: Option<String>,
    /// Keep the `n` highest rates.
    pub top: Option<usize>,
}

/// Pairs from `snapshot` that have `filter.base` on one side.
pub fn rate_board(snapshot: &RateSnapshot, filter: &RateFilter) -> Vec<PairRate> {
    let mut board: Vec<PairRate> = snapshot
        .pairs()
        .filter(|pair| {
            let other = if pair.from_code == filter.base {
                &pair.to_code
            } else if pair.to_code == filter.base {
                &pair.from_code
            } else {
                return false;
            };
            filter.currency.as_ref().is_none_or(|c| c == other)
        })
        .cloned()
        .collect();

    match filter.top {
        Some(n) => {
            board.sort_by(|a, b| by_rate(b, a));
            board.truncate(n);
        }
        None => board.sort_by(by_rate),
    }
    board
}

fn by_rate(a: &PairRate, b: &PairRate) -> Ordering {
    a.rate
        .total_cmp(&b.rate)
        .then_with(|| a.key().cmp(&b.key()))
}
