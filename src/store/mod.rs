pub mod disk;
pub mod memory;

use crate::core::config::AppConfig;
use crate::core::ledger::Portfolio;
use crate::core::rates::{RateRecord, RateSnapshot};
use crate::core::user::User;
use anyhow::Result;
use disk::DiskStore;
use std::sync::Arc;
use tracing::debug;

/// Persistence for rates, users, portfolios and the login session.
///
/// Every write either lands completely or not at all. Methods that write
/// several records (`save_refresh`, `create_user`) do so in one batch.
pub trait Store: Send + Sync {
    fn load_snapshot(&self) -> Result<Option<RateSnapshot>>;
    /// Replaces the snapshot and appends `history` in one write.
    fn save_refresh(&self, snapshot: &RateSnapshot, history: &[RateRecord]) -> Result<()>;
    fn load_history(&self) -> Result<Vec<RateRecord>>;

    fn load_portfolio(&self, user_id: u64) -> Result<Option<Portfolio>>;
    fn save_portfolio(&self, portfolio: &Portfolio) -> Result<()>;

    fn find_user(&self, username: &str) -> Result<Option<User>>;
    fn get_user(&self, user_id: u64) -> Result<Option<User>>;
    /// Writes the user and their initial portfolio together.
    fn create_user(&self, user: &User, portfolio: &Portfolio) -> Result<()>;
    fn next_user_id(&self) -> Result<u64>;

    fn load_session(&self) -> Result<Option<u64>>;
    fn save_session(&self, user_id: u64) -> Result<()>;
    fn clear_session(&self) -> Result<()>;
}

/// Opens the on-disk store under the configured data path.
pub fn open_store(config: &AppConfig) -> Result<Arc<dyn Store>> {
    let path = config.data_path()?.join("db");
    debug!("Opening store at {}", path.display());
    Ok(Arc::new(DiskStore::open(&path)?))
}
