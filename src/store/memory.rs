use crate::core::ledger::Portfolio;
use crate::core::rates::{RateRecord, RateSnapshot};
use crate::core::user::User;
use crate::store::Store;
use anyhow::Result;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;

#[derive(Default)]
struct State {
    snapshot: Option<RateSnapshot>,
    history: BTreeMap<String, RateRecord>,
    users: HashMap<String, User>,
    portfolios: HashMap<u64, Portfolio>,
    next_user_id: u64,
    session: Option<u64>,
}

/// Keeps everything in process memory. Used by tests and ephemeral runs.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Store for MemoryStore {
    fn load_snapshot(&self) -> Result<Option<RateSnapshot>> {
        Ok(self.state().snapshot.clone())
    }

    fn save_refresh(&self, snapshot: &RateSnapshot, history: &[RateRecord]) -> Result<()> {
        debug!(
            pairs = snapshot.len(),
            records = history.len(),
            "Memory store PUT refresh"
        );
        let mut state = self.state();
        state.snapshot = Some(snapshot.clone());
        for record in history {
            state.history.insert(record.id.clone(), record.clone());
        }
        Ok(())
    }

    fn load_history(&self) -> Result<Vec<RateRecord>> {
        Ok(self.state().history.values().cloned().collect())
    }

    fn load_portfolio(&self, user_id: u64) -> Result<Option<Portfolio>> {
        Ok(self.state().portfolios.get(&user_id).cloned())
    }

    fn save_portfolio(&self, portfolio: &Portfolio) -> Result<()> {
        self.state()
            .portfolios
            .insert(portfolio.user_id(), portfolio.clone());
        Ok(())
    }

    fn find_user(&self, username: &str) -> Result<Option<User>> {
        Ok(self.state().users.get(username).cloned())
    }

    fn get_user(&self, user_id: u64) -> Result<Option<User>> {
        Ok(self
            .state()
            .users
            .values()
            .find(|u| u.user_id == user_id)
            .cloned())
    }

    fn create_user(&self, user: &User, portfolio: &Portfolio) -> Result<()> {
        let mut state = self.state();
        state.users.insert(user.username.clone(), user.clone());
        state.portfolios.insert(portfolio.user_id(), portfolio.clone());
        state.next_user_id = user.user_id + 1;
        Ok(())
    }

    fn next_user_id(&self) -> Result<u64> {
        Ok(self.state().next_user_id.max(1))
    }

    fn load_session(&self) -> Result<Option<u64>> {
        Ok(self.state().session)
    }

    fn save_session(&self, user_id: u64) -> Result<()> {
        self.state().session = Some(user_id);
        Ok(())
    }

    fn clear_session(&self) -> Result<()> {
        self.state().session = None;
        Ok(())
    }
}
