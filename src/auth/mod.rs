use std::time::Duration;

use crate::core::models::RefreshTokenRecord;
use crate::core::types::TokenId;

pub mod error;

use error::StoreError;

/// Persistence for stateful refresh tokens.
///
/// Implementations must make `delete` atomic per record: of two concurrent
/// deletes of the same record exactly one succeeds and the other gets
/// `StoreError::NotFound`. Refresh rotation relies on this for single use.
#[async_trait::async_trait]
pub trait TokenStore: Send + Sync {
    /// Writes the record with a time to live of `expires_at - now`, failing
    /// with `StoreError::AlreadyExpired` when nothing is left of it.
    async fn save(&self, record: &RefreshTokenRecord) -> Result<(), StoreError>;
    /// The raw token stored for the record.
    async fn get(&self, subject_id: &str, token_id: &TokenId) -> Result<String, StoreError>;
    async fn delete(&self, subject_id: &str, token_id: &TokenId) -> Result<(), StoreError>;
    /// Removes every refresh token of the subject, returning how many were removed.
    async fn delete_all(&self, subject_id: &str) -> Result<usize, StoreError>;
    /// Physically drops expired records. A no-op for backends that expire keys themselves.
    async fn clean_up(&self) -> Result<(), StoreError>;
}

/// Hash-per-key storage with expiry, used for session records.
#[async_trait::async_trait]
pub trait SessionStore: Send + Sync {
    /// Replaces the hash at `key` and sets its time to live in one step; a
    /// cancelled call never leaves the hash without expiry.
    async fn put_hash(
        &self,
        key: &str,
        fields: &[(&str, String)],
        ttl: Duration,
    ) -> Result<(), StoreError>;
    /// Sets `fields` on an existing hash without touching its expiry. Returns
    /// `false`, writing nothing, when the key does not exist.
    async fn update_hash(&self, key: &str, fields: &[(&str, String)]) -> Result<bool, StoreError>;
    /// Values of `fields` in order, or `None` when the key does not exist.
    async fn get_hash_fields(
        &self,
        key: &str,
        fields: &[&str],
    ) -> Result<Option<Vec<Option<String>>>, StoreError>;
    async fn exists(&self, key: &str) -> Result<bool, StoreError>;
    /// Resets the time to live of an existing key. Returns `false` when it does not exist.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError>;
    /// Every key matching the glob `pattern`.
    async fn scan(&self, pattern: &str) -> Result<Vec<String>, StoreError>;
}
