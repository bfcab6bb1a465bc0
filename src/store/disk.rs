use crate::core::ledger::Portfolio;
use crate::core::rates::{RateRecord, RateSnapshot};
use crate::core::user::User;
use crate::store::Store;
use anyhow::{Context, Result};
use fjall::{Keyspace, PartitionCreateOptions, PartitionHandle, PersistMode};
use serde::{Serialize, de::DeserializeOwned};
use std::path::Path;
use tracing::debug;

const SNAPSHOT_KEY: &str = "snapshot";
const SESSION_KEY: &str = "session";
const NEXT_USER_ID_KEY: &str = "next_user_id";

/// A fjall keyspace with one partition per record kind. Values are JSON.
pub struct DiskStore {
    keyspace: Keyspace,
    rates: PartitionHandle,
    history: PartitionHandle,
    users: PartitionHandle,
    portfolios: PartitionHandle,
    meta: PartitionHandle,
}

fn decode<V: DeserializeOwned>(bytes: &[u8], what: &str) -> Result<V> {
    serde_json::from_slice(bytes).with_context(|| format!("Corrupt {what} record in store"))
}

fn encode<V: Serialize>(value: &V) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(value)?)
}

impl DiskStore {
    pub fn open(path: &Path) -> Result<Self> {
        std::fs::create_dir_all(path)
            .with_context(|| format!("Failed to create store directory {}", path.display()))?;
        let keyspace = fjall::Config::new(path)
            .open()
            .with_context(|| format!("Failed to open store at {}", path.display()))?;

        let partition = |name: &str| -> Result<PartitionHandle> {
            keyspace
                .open_partition(name, PartitionCreateOptions::default())
                .with_context(|| format!("Failed to open partition '{name}'"))
        };
        let rates = partition("rates")?;
        let history = partition("history")?;
        let users = partition("users")?;
        let portfolios = partition("portfolios")?;
        let meta = partition("meta")?;

        Ok(Self {
            keyspace,
            rates,
            history,
            users,
            portfolios,
            meta,
        })
    }

    fn persist(&self) -> Result<()> {
        self.keyspace
            .persist(PersistMode::SyncAll)
            .context("Failed to flush store")
    }

    fn get<V: DeserializeOwned>(&self, partition: &PartitionHandle, key: &str) -> Result<Option<V>> {
        match partition.get(key)? {
            Some(bytes) => {
                debug!(key, "Store HIT");
                Ok(Some(decode(&bytes, key)?))
            }
            None => {
                debug!(key, "Store MISS");
                Ok(None)
            }
        }
    }

    fn put<V: Serialize>(&self, partition: &PartitionHandle, key: &str, value: &V) -> Result<()> {
        partition.insert(key, encode(value)?)?;
        debug!(key, "Store PUT");
        self.persist()
    }
}

impl Store for DiskStore {
    fn load_snapshot(&self) -> Result<Option<RateSnapshot>> {
        self.get(&self.rates, SNAPSHOT_KEY)
    }

    fn save_refresh(&self, snapshot: &RateSnapshot, history: &[RateRecord]) -> Result<()> {
        let mut batch = self.keyspace.batch();
        batch.insert(&self.rates, SNAPSHOT_KEY, encode(snapshot)?);
        for record in history {
            batch.insert(&self.history, record.id.as_str(), encode(record)?);
        }
        batch.commit().context("Failed to write rate refresh")?;
        debug!(
            pairs = snapshot.len(),
            records = history.len(),
            "Store PUT refresh"
        );
        self.persist()
    }

    fn load_history(&self) -> Result<Vec<RateRecord>> {
        self.history
            .iter()
            .map(|entry| {
                let (_, value) = entry?;
                decode(&value, "history")
            })
            .collect()
    }

    fn load_portfolio(&self, user_id: u64) -> Result<Option<Portfolio>> {
        self.get(&self.portfolios, &user_id.to_string())
    }

    fn save_portfolio(&self, portfolio: &Portfolio) -> Result<()> {
        self.put(
            &self.portfolios,
            &portfolio.user_id().to_string(),
            portfolio,
        )
    }

    fn find_user(&self, username: &str) -> Result<Option<User>> {
        self.get(&self.users, username)
    }

    fn get_user(&self, user_id: u64) -> Result<Option<User>> {
        for entry in self.users.iter() {
            let (_, value) = entry?;
            let user: User = decode(&value, "user")?;
            if user.user_id == user_id {
                return Ok(Some(user));
            }
        }
        Ok(None)
    }

    fn create_user(&self, user: &User, portfolio: &Portfolio) -> Result<()> {
        let mut batch = self.keyspace.batch();
        batch.insert(&self.users, user.username.as_str(), encode(user)?);
        batch.insert(
            &self.portfolios,
            portfolio.user_id().to_string(),
            encode(portfolio)?,
        );
        batch.insert(&self.meta, NEXT_USER_ID_KEY, encode(&(user.user_id + 1))?);
        batch.commit().context("Failed to write new user")?;
        debug!(user_id = user.user_id, "Created user");
        self.persist()
    }

    fn next_user_id(&self) -> Result<u64> {
        Ok(self.get(&self.meta, NEXT_USER_ID_KEY)?.unwrap_or(1))
    }

    fn load_session(&self) -> Result<Option<u64>> {
        self.get(&self.meta, SESSION_KEY)
    }

    fn save_session(&self, user_id: u64) -> Result<()> {
        self.put(&self.meta, SESSION_KEY, &user_id)
    }

    fn clear_session(&self) -> Result<()> {
        self.meta.remove(SESSION_KEY)?;
        self.persist()
    }
}
