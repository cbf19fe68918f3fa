use std::collections::HashMap;
use std::time::{Duration, Instant, SystemTime};

use dashmap::DashMap;
use tracing::{event, Level};

use crate::auth::{error::StoreError, SessionStore, TokenStore};
use crate::core::keys;
use crate::core::models::RefreshTokenRecord;
use crate::core::types::TokenId;

#[derive(Debug, Clone)]
enum Value {
    Text(String),
    Hash(HashMap<String, String>),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |t| now < t)
    }
}

/// Process-local key-value store with per-key expiry.
///
/// Expired keys read as absent immediately and are dropped from memory by
/// `clean_up`. Every operation is atomic per key, which is all the engine
/// asks of a backend.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, Entry>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys held, expired or not, until the next `clean_up`.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn insert(&self, key: String, value: Value, ttl: Duration) {
        let expires_at = Instant::now().checked_add(ttl);
        self.entries.insert(key, Entry { value, expires_at });
    }

    fn read<R>(&self, key: &str, f: impl FnOnce(&Value) -> R) -> Option<R> {
        let now = Instant::now();
        self.entries
            .get(key)
            .filter(|e| e.is_live(now))
            .map(|e| f(&e.value))
    }

    fn remove_live(&self, key: &str) -> bool {
        let now = Instant::now();
        matches!(self.entries.remove(key), Some((_, e)) if e.is_live(now))
    }

    fn keys_matching(&self, pattern: &str) -> Vec<String> {
        let now = Instant::now();
        self.entries
            .iter()
            .filter(|e| e.value().is_live(now) && keys::glob_matches(pattern, e.key()))
            .map(|e| e.key().clone())
            .collect()
    }
}

fn wrong_type(key: &str) -> StoreError {
    StoreError::Corrupt(format!("{} holds the wrong kind of value", key))
}

#[async_trait::async_trait]
impl TokenStore for MemoryStore {
    async fn save(&self, record: &RefreshTokenRecord) -> Result<(), StoreError> {
        let key = keys::refresh_token_key(&record.subject_id, &record.token_id);
        let ttl = record.time_to_live(SystemTime::now()).ok_or_else(|| {
            event!(Level::WARN, %key, "Refusing to store an already expired refresh token");
            StoreError::AlreadyExpired
        })?;

        self.insert(key, Value::Text(record.token.clone()), ttl);
        Ok(())
    }

    async fn get(&self, subject_id: &str, token_id: &TokenId) -> Result<String, StoreError> {
        let key = keys::refresh_token_key(subject_id, token_id);
        match self.read(&key, |value| value.clone()) {
            Some(Value::Text(token)) => Ok(token),
            Some(Value::Hash(_)) => Err(wrong_type(&key)),
            None => Err(StoreError::NotFound),
        }
    }

    async fn delete(&self, subject_id: &str, token_id: &TokenId) -> Result<(), StoreError> {
        let key = keys::refresh_token_key(subject_id, token_id);
        if self.remove_live(&key) {
            Ok(())
        } else {
            Err(StoreError::NotFound)
        }
    }

    async fn delete_all(&self, subject_id: &str) -> Result<usize, StoreError> {
        let pattern = keys::refresh_token_pattern(subject_id);
        let removed = self
            .keys_matching(&pattern)
            .into_iter()
            .filter(|key| keys::is_refresh_token_key_of(subject_id, key))
            .filter(|key| self.remove_live(key))
            .count();
        Ok(removed)
    }

    async fn clean_up(&self) -> Result<(), StoreError> {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, e| e.is_live(now));
        event!(
            Level::TRACE,
            dropped = before.saturating_sub(self.entries.len()),
            "Dropped expired keys"
        );
        Ok(())
    }
}

#[async_trait::async_trait]
impl SessionStore for MemoryStore {
    async fn put_hash(
        &self,
        key: &str,
        fields: &[(&str, String)],
        ttl: Duration,
    ) -> Result<(), StoreError> {
        let hash = fields
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();
        self.insert(key.to_string(), Value::Hash(hash), ttl);
        Ok(())
    }

    async fn update_hash(&self, key: &str, fields: &[(&str, String)]) -> Result<bool, StoreError> {
        let now = Instant::now();
        let mut entry = match self.entries.get_mut(key) {
            Some(entry) if entry.is_live(now) => entry,
            _ => return Ok(false),
        };

        match &mut entry.value {
            Value::Hash(hash) => {
                for (k, v) in fields {
                    hash.insert(k.to_string(), v.clone());
                }
                Ok(true)
            }
            Value::Text(_) => Err(wrong_type(key)),
        }
    }

    async fn get_hash_fields(
        &self,
        key: &str,
        fields: &[&str],
    ) -> Result<Option<Vec<Option<String>>>, StoreError> {
        let values = self.read(key, |value| match value {
            Value::Hash(hash) => Ok(fields
                .iter()
                .map(|f| hash.get(*f).cloned())
                .collect::<Vec<_>>()),
            Value::Text(_) => Err(wrong_type(key)),
        });
        values.transpose()
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.read(key, |_| ()).is_some())
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError> {
        let now = Instant::now();
        match self.entries.get_mut(key) {
            Some(mut entry) if entry.is_live(now) => {
                entry.expires_at = now.checked_add(ttl);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn scan(&self, pattern: &str) -> Result<Vec<String>, StoreError> {
        Ok(self.keys_matching(pattern))
    }
}
