pub mod cli;
pub mod core;
pub mod providers;
pub mod store;

use crate::core::Exchange;
use crate::core::config::AppConfig;
use crate::core::currency::CurrencyRegistry;
use crate::store::Store;
use anyhow::Result;
use std::sync::Arc;
use tracing::{debug, info};

/// Commands that need a configured exchange. `setup` is handled by the
/// binary before any config is loaded.
#[derive(Debug, Clone, PartialEq)]
pub enum AppCommand {
    Register { username: String, password: String },
    Login { username: String, password: String },
    Logout,
    ShowPortfolio { base: Option<String> },
    Deposit { currency: String, amount: f64 },
    Buy { currency: String, amount: f64 },
    Sell { currency: String, amount: f64 },
    GetRate { from: String, to: String },
    UpdateRates { source: Option<String> },
    ShowRates {
        currency: Option<String>,
        top: Option<usize>,
        base: Option<String>,
    },
    Watch { interval_secs: Option<u64> },
}

pub fn load_config(config_path: Option<&str>) -> Result<AppConfig> {
    let config = match config_path {
        Some(path) => AppConfig::load_from_path(path)?,
        None => AppConfig::load()?,
    };
    debug!("Loaded config: {config:#?}");
    Ok(config)
}

/// Builds the exchange with the configured providers.
pub fn build_exchange(config: AppConfig, store: Arc<dyn Store>) -> Result<Arc<Exchange>> {
    let registry = Arc::new(CurrencyRegistry::from_config(&config.currencies)?);
    let sources = providers::build_sources(&config, &registry)?;
    debug!(sources = sources.len(), "Configured rate sources");
    Ok(Arc::new(Exchange::with_registry(
        config, registry, store, sources,
    )))
}

pub async fn run_command(command: AppCommand, config_path: Option<&str>) -> Result<()> {
    let config = load_config(config_path)?;
    run_with_config(command, config).await
}

pub async fn run_with_config(command: AppCommand, config: AppConfig) -> Result<()> {
    info!("valutatrade starting...");
    let store = store::open_store(&config)?;
    let exchange = build_exchange(config, store)?;
    execute(command, exchange).await
}

pub async fn execute(command: AppCommand, exchange: Arc<Exchange>) -> Result<()> {
    match command {
        AppCommand::Register { username, password } => {
            cli::account::register(&exchange, &username, &password).await
        }
        AppCommand::Login { username, password } => {
            cli::account::login(&exchange, &username, &password).await
        }
        AppCommand::Logout => cli::account::logout(&exchange),
        AppCommand::ShowPortfolio { base } => {
            cli::portfolio::show(&exchange, base.as_deref()).await
        }
        AppCommand::Deposit { currency, amount } => {
            cli::trade::deposit(&exchange, &currency, amount).await
        }
        AppCommand::Buy { currency, amount } => cli::trade::buy(&exchange, &currency, amount).await,
        AppCommand::Sell { currency, amount } => {
            cli::trade::sell(&exchange, &currency, amount).await
        }
        AppCommand::GetRate { from, to } => cli::rates::get_rate(&exchange, &from, &to).await,
        AppCommand::UpdateRates { source } => {
            cli::rates::update_rates(&exchange, source.as_deref()).await
        }
        AppCommand::ShowRates {
            currency,
            top,
            base,
        } => cli::rates::show_rates(&exchange, currency.as_deref(), top, base.as_deref()),
        AppCommand::Watch { interval_secs } => cli::rates::watch(exchange, interval_secs).await,
    }
}
