use crate::core::service::{Exchange, RefreshSummary};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Shortest accepted refresh period. Shorter ones, zero included, are raised
/// to this.
pub const MIN_REFRESH_INTERVAL: Duration = Duration::from_secs(1);

/// Handle to a running background refresher.
pub struct RefresherHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl RefresherHandle {
    /// Stops the loop and waits for an in-flight refresh to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            warn!(error = %e, "Refresher task ended abnormally");
        }
    }
}

/// Refreshes rates now and then every `interval`. Failures are logged and
/// the loop keeps going. Each successful round is reported on `updates`
/// when a receiver is given.
pub fn spawn_refresher(
    exchange: Arc<Exchange>,
    interval: Duration,
    updates: Option<mpsc::UnboundedSender<RefreshSummary>>,
) -> RefresherHandle {
    let interval = interval.max(MIN_REFRESH_INTERVAL);
    let (shutdown, mut stop) = watch::channel(false);

    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(interval_secs = interval.as_secs(), "Rate refresher started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match exchange.refresh_rates().await {
                        Ok(summary) => {
                            debug!(pairs = summary.pairs_updated, "Scheduled refresh done");
                            if let Some(tx) = &updates {
                                let _ = tx.send(summary);
                            }
                        }
                        Err(e) => warn!(error = %e, "Scheduled refresh failed"),
                    }
                }
                _ = stop.changed() => break,
            }
        }
        info!("Rate refresher stopped");
    });

    RefresherHandle { shutdown, task }
}
