use crate::core::error::AuthError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha3::{Digest, Sha3_256};

pub const MIN_PASSWORD_LEN: usize = 4;

/// A registered account. Only the salted hash of the password is kept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub user_id: u64,
    pub username: String,
    credential_hash: String,
    salt: String,
    pub registered_at: DateTime<Utc>,
}

fn hash_password(password: &str, salt: &str) -> String {
    let mut hasher = Sha3_256::new();
    hasher.update(password.as_bytes());
    hasher.update(salt.as_bytes());
    hex::encode(hasher.finalize())
}

fn new_salt() -> String {
    hex::encode(rand::random::<[u8; 16]>())
}

fn check_password(password: &str) -> Result<(), AuthError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AuthError::WeakPassword {
            min_len: MIN_PASSWORD_LEN,
        });
    }
    Ok(())
}

/// Trims a username, rejecting empty ones.
pub fn normalize_username(raw: &str) -> Result<String, AuthError> {
    let username = raw.trim();
    if username.is_empty() {
        return Err(AuthError::InvalidUsername);
    }
    Ok(username.to_string())
}

impl User {
    pub fn new(user_id: u64, username: &str, password: &str) -> Result<Self, AuthError> {
        let username = normalize_username(username)?;
        check_password(password)?;
        let salt = new_salt();
        Ok(Self {
            user_id,
            username,
            credential_hash: hash_password(password, &salt),
            salt,
            registered_at: Utc::now(),
        })
    }

    pub fn verify_password(&self, password: &str) -> bool {
        hash_password(password, &self.salt) == self.credential_hash
    }

    /// Re-hashes with a fresh salt.
    pub fn change_password(&mut self, new_password: &str) -> Result<(), AuthError> {
        check_password(new_password)?;
        self.salt = new_salt();
        self.credential_hash = hash_password(new_password, &self.salt);
        Ok(())
    }
}
