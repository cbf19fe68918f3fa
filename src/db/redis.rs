use std::time::{Duration, SystemTime};

use redis::aio::MultiplexedConnection;
use redis::{RedisError, Script};
use tracing::{event, Level};

use crate::auth::{error::StoreError, SessionStore, TokenStore};
use crate::core::keys;
use crate::core::models::RefreshTokenRecord;
use crate::core::types::TokenId;

// HSET only when the hash is still there, so an update racing the expiry
// cannot recreate the record without a TTL.
const UPDATE_IF_EXISTS: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 1 then
    redis.call('HSET', KEYS[1], unpack(ARGV))
    return 1
end
return 0
"#;

const SCAN_BATCH: usize = 200;

impl From<RedisError> for StoreError {
    fn from(e: RedisError) -> Self {
        Self::Backend(e.to_string())
    }
}

/// Redis-backed stores. The connection is multiplexed, so one `RedisStore`
/// serves every concurrent request.
pub struct RedisStore {
    conn: MultiplexedConnection,
    update_script: Script,
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore").finish()
    }
}

impl RedisStore {
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(url)?;
        let conn = client.get_multiplexed_async_connection().await?;
        event!(Level::DEBUG, "Connected to redis");
        Ok(Self {
            conn,
            update_script: Script::new(UPDATE_IF_EXISTS),
        })
    }

    async fn scan_keys(&self, pattern: &str) -> Result<Vec<String>, StoreError> {
        let mut conn = self.conn.clone();
        let mut cursor: u64 = 0;
        let mut found = Vec::new();

        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await?;
            found.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }

        // SCAN may return a key more than once.
        found.sort();
        found.dedup();
        Ok(found)
    }
}

// Rounded up to the next millisecond so a record never expires before its token.
fn ttl_millis(ttl: Duration) -> u64 {
    let millis = ttl.as_nanos().div_ceil(1_000_000);
    u64::try_from(millis).unwrap_or(u64::MAX).max(1)
}

#[async_trait::async_trait]
impl TokenStore for RedisStore {
    async fn save(&self, record: &RefreshTokenRecord) -> Result<(), StoreError> {
        let key = keys::refresh_token_key(&record.subject_id, &record.token_id);
        let ttl = record.time_to_live(SystemTime::now()).ok_or_else(|| {
            event!(Level::WARN, %key, "Refusing to store an already expired refresh token");
            StoreError::AlreadyExpired
        })?;

        let mut conn = self.conn.clone();
        let () = redis::cmd("SET")
            .arg(&key)
            .arg(&record.token)
            .arg("PX")
            .arg(ttl_millis(ttl))
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn get(&self, subject_id: &str, token_id: &TokenId) -> Result<String, StoreError> {
        let key = keys::refresh_token_key(subject_id, token_id);
        let mut conn = self.conn.clone();
        let token: Option<String> = redis::cmd("GET").arg(&key).query_async(&mut conn).await?;
        token.ok_or(StoreError::NotFound)
    }

    async fn delete(&self, subject_id: &str, token_id: &TokenId) -> Result<(), StoreError> {
        let key = keys::refresh_token_key(subject_id, token_id);
        let mut conn = self.conn.clone();
        let removed: i64 = redis::cmd("DEL").arg(&key).query_async(&mut conn).await?;
        if removed == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn delete_all(&self, subject_id: &str) -> Result<usize, StoreError> {
        let keys: Vec<String> = self
            .scan_keys(&keys::refresh_token_pattern(subject_id))
            .await?
            .into_iter()
            .filter(|key| keys::is_refresh_token_key_of(subject_id, key))
            .collect();

        if keys.is_empty() {
            return Ok(0);
        }

        let mut conn = self.conn.clone();
        let removed: i64 = redis::cmd("DEL").arg(&keys).query_async(&mut conn).await?;
        Ok(usize::try_from(removed).unwrap_or(0))
    }

    async fn clean_up(&self) -> Result<(), StoreError> {
        // Redis expires keys on its own.
        Ok(())
    }
}

#[async_trait::async_trait]
impl SessionStore for RedisStore {
    async fn put_hash(
        &self,
        key: &str,
        fields: &[(&str, String)],
        ttl: Duration,
    ) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let mut hset = redis::cmd("HSET");
        hset.arg(key);
        for (field, value) in fields {
            hset.arg(*field).arg(value);
        }

        let () = redis::pipe()
            .atomic()
            .cmd("DEL")
            .arg(key)
            .ignore()
            .add_command(hset)
            .ignore()
            .cmd("PEXPIRE")
            .arg(key)
            .arg(ttl_millis(ttl))
            .ignore()
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn update_hash(&self, key: &str, fields: &[(&str, String)]) -> Result<bool, StoreError> {
        if fields.is_empty() {
            return self.exists(key).await;
        }

        let mut conn = self.conn.clone();
        let mut invocation = self.update_script.key(key);
        for (field, value) in fields {
            invocation.arg(*field).arg(value);
        }
        let updated: i64 = invocation.invoke_async(&mut conn).await?;
        Ok(updated == 1)
    }

    async fn get_hash_fields(
        &self,
        key: &str,
        fields: &[&str],
    ) -> Result<Option<Vec<Option<String>>>, StoreError> {
        if !self.exists(key).await? {
            return Ok(None);
        }

        let mut conn = self.conn.clone();
        let values: Vec<Option<String>> = redis::cmd("HMGET")
            .arg(key)
            .arg(fields)
            .query_async(&mut conn)
            .await?;

        // The hash expired between EXISTS and HMGET.
        if values.iter().all(Option::is_none) {
            return Ok(None);
        }
        Ok(Some(values))
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let count: i64 = redis::cmd("EXISTS").arg(key).query_async(&mut conn).await?;
        Ok(count > 0)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let set: i64 = redis::cmd("PEXPIRE")
            .arg(key)
            .arg(ttl_millis(ttl))
            .query_async(&mut conn)
            .await?;
        Ok(set == 1)
    }

    async fn scan(&self, pattern: &str) -> Result<Vec<String>, StoreError> {
        self.scan_keys(pattern).await
    }
}
