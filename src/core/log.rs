//! Logging setup for the binary.
use std::path::Path;
use tracing::level_filters::LevelFilter;
use tracing::{Level, Metadata, Subscriber, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    EnvFilter, Layer,
    filter::{Targets, filter_fn},
    fmt::{self, MakeWriter},
    prelude::__tracing_subscriber_SubscriberExt,
    registry::LookupSpan,
    util::SubscriberInitExt,
};

/// Crate target used to scope the verbose filter.
const APP_TARGET: &str = "valutatrade";

const ACTION_LOG_PREFIX: &str = "actions";
const ACTION_LOG_FILES_KEPT: usize = 14;

fn levels(verbose: bool) -> (LevelFilter, &'static str) {
    if verbose {
        (LevelFilter::DEBUG, "debug")
    } else {
        // Source failures and stale-rate fallbacks still reach the user.
        (LevelFilter::WARN, "warn")
    }
}

/// Events carrying an `action` field at INFO or above: trades, deposits,
/// registrations and logins, successful or rejected.
fn is_action_event(meta: &Metadata<'_>) -> bool {
    meta.is_event() && *meta.level() <= Level::INFO && meta.fields().field("action").is_some()
}

/// Audit layer that records every action event to `writer`, whatever the
/// console verbosity.
pub fn action_layer<S, W>(writer: W) -> impl Layer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    fmt::layer()
        .with_ansi(false)
        .with_target(false)
        .with_writer(writer)
        .with_filter(filter_fn(is_action_event))
}

/// Installs the global subscriber. Logs go to stderr so command output on
/// stdout stays clean. `RUST_LOG` overrides the default level.
///
/// With `action_log_dir`, action events are also appended to a daily
/// rolling `actions.<date>.log` there. The returned guard flushes that file
/// and must be held until exit.
pub fn init_logging(verbose: bool, action_log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let (app_level, default_directive) = levels(verbose);
    let app_filter = Targets::new()
        .with_target(APP_TARGET, app_level)
        .with_default(LevelFilter::WARN);
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    let console_layer = fmt::layer()
        .pretty()
        .without_time()
        .with_writer(std::io::stderr)
        .with_filter(app_filter)
        .with_filter(env_filter);

    let mut open_error = None;
    let (audit_layer, guard) = match action_log_dir.map(open_action_log).transpose() {
        Ok(Some(appender)) => {
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(action_layer(writer)), Some(guard))
        }
        Ok(None) => (None, None),
        Err(e) => {
            open_error = Some(e);
            (None, None)
        }
    };

    tracing_subscriber::registry()
        .with(console_layer)
        .with(audit_layer)
        .init();

    if let Some(e) = open_error {
        warn!(error = %e, "Action log disabled");
    }
    guard
}

fn open_action_log(dir: &Path) -> anyhow::Result<RollingFileAppender> {
    std::fs::create_dir_all(dir)?;
    Ok(RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(ACTION_LOG_PREFIX)
        .filename_suffix("log")
        .max_log_files(ACTION_LOG_FILES_KEPT)
        .build(dir)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cache::RateCache;
    use crate::core::ledger::{Ledger, Portfolio};
    use crate::core::testing::snapshot;
    use chrono::Utc;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[test]
    fn test_levels() {
        assert_eq!(levels(true), (LevelFilter::DEBUG, "debug"));
        assert_eq!(levels(false), (LevelFilter::WARN, "warn"));
    }

    fn read_logs(dir: &Path) -> String {
        std::fs::read_dir(dir)
            .unwrap()
            .map(|entry| std::fs::read_to_string(entry.unwrap().path()).unwrap())
            .collect()
    }

    #[test]
    fn test_trades_reach_action_log() {
        let dir = TempDir::new().unwrap();
        let appender = open_action_log(dir.path()).unwrap();
        let subscriber = tracing_subscriber::registry().with(action_layer(appender));

        let cache = Arc::new(RateCache::with_snapshot(snapshot(
            &[("BTC", "USD", 50000.0)],
            Utc::now(),
        )));
        let ledger = Ledger::new(cache);
        let mut portfolio = Portfolio::seeded(7, 100000.0).unwrap();

        tracing::subscriber::with_default(subscriber, || {
            tracing::debug!(action = "IGNORED", "Below the audit level");
            tracing::info!("No action field");
            ledger.buy(&mut portfolio, "BTC", 0.5).unwrap();
            ledger.sell(&mut portfolio, "BTC", 5.0).unwrap_err();
        });

        let logs = read_logs(dir.path());
        let buy = logs
            .lines()
            .find(|line| line.contains("action=BUY"))
            .expect("buy should be logged");
        assert!(buy.contains("user_id=7"));
        assert!(buy.contains("Trade applied"));
        assert!(
            logs.lines()
                .any(|line| line.contains("action=SELL") && line.contains("Trade rejected"))
        );
        assert!(!logs.contains("IGNORED"));
        assert!(!logs.contains("No action field"));
    }

    #[test]
    fn test_action_log_files_are_dated() {
        let dir = TempDir::new().unwrap();
        let appender = open_action_log(&dir.path().join("logs")).unwrap();
        let subscriber = tracing_subscriber::registry().with(action_layer(appender));
        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(action = "LOGIN", user_id = 1, "User logged in");
        });

        let names: Vec<String> = std::fs::read_dir(dir.path().join("logs"))
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names.len(), 1);
        assert!(names[0].starts_with("actions."));
        assert!(names[0].ends_with(".log"));
    }
}
