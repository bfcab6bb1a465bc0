use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use valutatrade::AppCommand;
use valutatrade::core::log::init_logging;

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to optional configuration file
    #[arg(short, long, global = true)]
    config_path: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create default configuration
    Setup,
    /// Create a new account
    Register {
        #[arg(long)]
        username: String,
        #[arg(long)]
        password: String,
    },
    /// Log in; the session is kept until logout
    Login {
        #[arg(long)]
        username: String,
        #[arg(long)]
        password: String,
    },
    /// End the current session
    Logout,
    /// Show wallets and their value
    ShowPortfolio {
        /// Currency to value the portfolio in
        #[arg(long)]
        base: Option<String>,
    },
    /// Add funds to a wallet
    Deposit {
        #[arg(long)]
        currency: String,
        #[arg(long)]
        amount: f64,
    },
    /// Buy a currency with USD
    Buy {
        #[arg(long)]
        currency: String,
        #[arg(long)]
        amount: f64,
    },
    /// Sell a currency for USD
    Sell {
        #[arg(long)]
        currency: String,
        #[arg(long)]
        amount: f64,
    },
    /// Show the rate between two currencies
    GetRate {
        #[arg(long)]
        from: String,
        #[arg(long)]
        to: String,
    },
    /// Fetch fresh rates from the providers
    UpdateRates {
        /// Only query this provider (coingecko or exchangerate)
        #[arg(long)]
        source: Option<String>,
    },
    /// List cached rates
    ShowRates {
        /// Only show rates for this currency
        #[arg(long)]
        currency: Option<String>,
        /// Show the N highest rates
        #[arg(long)]
        top: Option<usize>,
        #[arg(long)]
        base: Option<String>,
    },
    /// Keep refreshing rates on an interval
    Watch {
        #[arg(long)]
        interval_secs: Option<u64>,
    },
}

impl From<Commands> for AppCommand {
    fn from(cmd: Commands) -> AppCommand {
        match cmd {
            Commands::Register { username, password } => {
                AppCommand::Register { username, password }
            }
            Commands::Login { username, password } => AppCommand::Login { username, password },
            Commands::Logout => AppCommand::Logout,
            Commands::ShowPortfolio { base } => AppCommand::ShowPortfolio { base },
            Commands::Deposit { currency, amount } => AppCommand::Deposit { currency, amount },
            Commands::Buy { currency, amount } => AppCommand::Buy { currency, amount },
            Commands::Sell { currency, amount } => AppCommand::Sell { currency, amount },
            Commands::GetRate { from, to } => AppCommand::GetRate { from, to },
            Commands::UpdateRates { source } => AppCommand::UpdateRates { source },
            Commands::ShowRates {
                currency,
                top,
                base,
            } => AppCommand::ShowRates {
                currency,
                top,
                base,
            },
            Commands::Watch { interval_secs } => AppCommand::Watch { interval_secs },
            Commands::Setup => unreachable!("Setup command should be handled separately"),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let Some(command) = cli.command else {
        init_logging(cli.verbose, None);
        Cli::command().print_help()?;
        return Ok(());
    };

    if let Commands::Setup = command {
        init_logging(cli.verbose, None);
        return match cli.config_path.as_deref() {
            Some(path) => valutatrade::cli::setup::setup_at_path(path),
            None => valutatrade::cli::setup::setup(),
        };
    }

    let config = valutatrade::load_config(cli.config_path.as_deref());
    let action_log_dir = config.as_ref().ok().and_then(|c| c.action_log_dir().ok());
    let _guard = init_logging(cli.verbose, action_log_dir.as_deref());

    let result = match config {
        Ok(config) => valutatrade::run_with_config(command.into(), config).await,
        Err(e) => Err(e),
    };

    if let Err(e) = &result {
        tracing::error!(error = %e, "Application failed");
    }
    result
}
