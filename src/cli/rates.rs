use super::ui::{self, StyleType};
use crate::core::scheduler::{MIN_REFRESH_INTERVAL, spawn_refresher};
use crate::core::{Exchange, RateBoard, RateFilter, RefreshSummary};
use anyhow::Result;
use comfy_table::Cell;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

pub async fn get_rate(exchange: &Exchange, from: &str, to: &str) -> Result<()> {
    let quote = exchange.get_rate(from, to).await?;
    println!(
        "Rate {}→{}: {:.6} (updated: {}, source: {})",
        quote.from_code,
        quote.to_code,
        quote.rate,
        quote.updated_at.to_rfc3339(),
        quote.source
    );
    if quote.rate > 0.0 {
        println!(
            "{}",
            ui::style_text(
                &format!(
                    "Reverse rate {}→{}: {:.9}",
                    quote.to_code,
                    quote.from_code,
                    1.0 / quote.rate
                ),
                StyleType::Hint
            )
        );
    }
    for code in [&quote.from_code, &quote.to_code] {
        if let Some(info) = exchange.registry().get(code) {
            println!("{}", ui::style_text(&info.to_string(), StyleType::Hint));
        }
    }
    Ok(())
}

impl RefreshSummary {
    pub fn display(&self) -> String {
        let mut output = format!(
            "Update successful. Total rates updated: {}. Last refresh: {}",
            self.pairs_updated,
            self.last_refresh.to_rfc3339()
        );
        for (source, reason) in &self.failed_sources {
            output.push_str(&format!(
                "\n{}",
                ui::style_text(&format!("Source {source} failed: {reason}"), StyleType::Warning)
            ));
        }
        output
    }
}

pub async fn update_rates(exchange: &Exchange, source: Option<&str>) -> Result<()> {
    let pb = ui::new_spinner("Fetching exchange rates...");
    let result = match source {
        Some(name) => exchange.refresh_from(name).await,
        None => exchange.refresh_rates().await,
    };
    pb.finish_and_clear();

    let summary = result?;
    println!("{}", summary.display());
    Ok(())
}

impl RateBoard {
    pub fn display_as_table(&self) -> String {
        let mut table = ui::new_table(&["Pair", "Rate", "Source"]);
        for pair in &self.pairs {
            table.add_row(vec![
                Cell::new(pair.key()),
                ui::number_cell(format!("{:.6}", pair.rate)),
                Cell::new(&pair.source),
            ]);
        }
        format!(
            "Rates from cache (updated at {}):\n{table}",
            self.last_refresh.to_rfc3339()
        )
    }
}

pub fn show_rates(
    exchange: &Exchange,
    currency: Option<&str>,
    top: Option<usize>,
    base: Option<&str>,
) -> Result<()> {
    let registry = exchange.registry();
    let base = registry.resolve(base.unwrap_or(&exchange.config().base_currency))?;
    let currency = currency.map(|c| registry.resolve(c)).transpose()?;

    let board = exchange.rate_board(&RateFilter {
        base,
        currency,
        top,
    })?;
    println!("{}", board.display_as_table());
    if exchange.rates_are_stale() {
        println!(
            "{}",
            ui::style_text(
                "Cached rates are older than the configured TTL; run update-rates",
                StyleType::Warning
            )
        );
    }
    Ok(())
}

/// Refreshes on an interval until Ctrl-C, printing each result.
pub async fn watch(exchange: Arc<Exchange>, interval_secs: Option<u64>) -> Result<()> {
    let interval = Duration::from_secs(
        interval_secs.unwrap_or(exchange.config().refresh_interval_secs),
    )
    .max(MIN_REFRESH_INTERVAL);
    println!(
        "Refreshing rates every {}s. {}",
        interval.as_secs(),
        ui::style_text("Press Ctrl-C to stop.", StyleType::Hint)
    );

    let (tx, mut rx) = mpsc::unbounded_channel();
    let handle = spawn_refresher(exchange, interval, Some(tx));

    loop {
        tokio::select! {
            Some(summary) = rx.recv() => println!("{}", summary.display()),
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    handle.shutdown().await;
    println!("Stopped");
    Ok(())
}
