use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tomiko_tokens::core::models::RefreshTokenRecord;
use tomiko_tokens::db::MemoryStore;
use tomiko_tokens::{
    EngineConfig, Error, ErrorClass, Identity, StoreError, TokenEngine, TokenId, TokenKind,
    TokenStore,
};

fn config(stateful: bool) -> EngineConfig {
    EngineConfig::builder()
        .access_secret("access-secret")
        .refresh_secret("refresh-secret")
        .access_expiry(Duration::from_secs(15 * 60))
        .refresh_expiry(Duration::from_secs(7 * 24 * 60 * 60))
        .stateful(stateful)
        .build()
        .expect("config")
}

fn stateful_engine() -> (Arc<TokenEngine>, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let engine = TokenEngine::new(config(true), Some(store.clone()));
    (Arc::new(engine), store)
}

fn identity() -> Identity {
    Identity::new("u1", "a1", "IATA")
}

/// Wraps a `MemoryStore`, failing chosen operations on demand.
#[derive(Default)]
struct FlakyStore {
    inner: MemoryStore,
    fail_save: AtomicBool,
    fail_delete: AtomicBool,
}

fn backend_down() -> StoreError {
    StoreError::Backend("connection reset".to_string())
}

#[async_trait::async_trait]
impl TokenStore for FlakyStore {
    async fn save(&self, record: &RefreshTokenRecord) -> Result<(), StoreError> {
        if self.fail_save.load(Ordering::SeqCst) {
            return Err(backend_down());
        }
        self.inner.save(record).await
    }

    async fn get(&self, subject_id: &str, token_id: &TokenId) -> Result<String, StoreError> {
        self.inner.get(subject_id, token_id).await
    }

    async fn delete(&self, subject_id: &str, token_id: &TokenId) -> Result<(), StoreError> {
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(backend_down());
        }
        self.inner.delete(subject_id, token_id).await
    }

    async fn delete_all(&self, subject_id: &str) -> Result<usize, StoreError> {
        self.inner.delete_all(subject_id).await
    }

    async fn clean_up(&self) -> Result<(), StoreError> {
        self.inner.clean_up().await
    }
}

#[tokio::test]
async fn stateless_login_and_refresh() {
    let engine = TokenEngine::new(config(false), None);
    assert!(!engine.is_stateful());

    let access = engine.generate_access_token(&identity()).expect("access");
    let refresh = engine
        .generate_refresh_token(&identity())
        .await
        .expect("refresh");

    let claims = engine.validate_access_token(&access).expect("validate access");
    assert_eq!(claims.sub, "u1");
    assert_eq!(claims.tenant_id, "a1");
    assert_eq!(claims.tenant_type, "IATA");
    assert_eq!(claims.token_type, TokenKind::Access);

    let remaining = engine.remaining_time(&access).expect("remaining");
    assert!(remaining > Duration::from_secs(14 * 60));
    assert!(remaining <= Duration::from_secs(15 * 60));

    let refreshed = engine.refresh_access_token(&refresh).await.expect("refresh");
    let refreshed = engine.validate_access_token(&refreshed).expect("validate");
    assert_eq!(refreshed.identity(), identity());
    assert_ne!(refreshed.jti, claims.jti);

    // Nothing is recorded, so the refresh token stays usable.
    engine
        .refresh_access_token(&refresh)
        .await
        .expect("refresh again");
}

#[tokio::test]
async fn token_types_are_not_interchangeable() {
    let engine = TokenEngine::new(config(false), None);
    let access = engine.generate_access_token(&identity()).expect("access");
    let refresh = engine
        .generate_refresh_token(&identity())
        .await
        .expect("refresh");

    let err = engine
        .validate_access_token(&refresh)
        .expect_err("refresh as access");
    assert!(matches!(
        err,
        Error::WrongType {
            expected: TokenKind::Access,
            found: TokenKind::Refresh
        }
    ));
    assert!(err.is_unauthenticated());

    let err = engine
        .validate_refresh_token(&access)
        .await
        .expect_err("access as refresh");
    assert!(matches!(
        err,
        Error::WrongType {
            expected: TokenKind::Refresh,
            found: TokenKind::Access
        }
    ));

    let err = engine
        .refresh_access_token(&access)
        .await
        .expect_err("access cannot refresh");
    assert!(matches!(err, Error::WrongType { .. }));
    assert_eq!(err.class(), ErrorClass::Validation);
}

#[tokio::test]
async fn tokens_expire() {
    let config = EngineConfig::builder()
        .access_secret("access-secret")
        .refresh_secret("refresh-secret")
        .access_expiry(Duration::from_secs(1))
        .build()
        .expect("config");
    let engine = TokenEngine::new(config, None);

    let access = engine.generate_access_token(&identity()).expect("access");
    tokio::time::sleep(Duration::from_millis(1100)).await;

    let err = engine.validate_access_token(&access).expect_err("expired");
    assert!(matches!(err, Error::Expired));
    assert!(engine.is_expired(&access).expect("is_expired"));
}

#[tokio::test]
async fn refresh_tokens_are_single_use() {
    let (engine, _) = stateful_engine();
    let refresh = engine
        .generate_refresh_token(&identity())
        .await
        .expect("refresh");

    engine.refresh_access_token(&refresh).await.expect("first use");
    let err = engine
        .refresh_access_token(&refresh)
        .await
        .expect_err("second use");
    assert!(matches!(err, Error::RefreshTokenNotFound));
}

#[tokio::test]
async fn racing_refreshes_have_one_winner() {
    let (engine, _) = stateful_engine();
    let refresh = engine
        .generate_refresh_token(&identity())
        .await
        .expect("refresh");

    let attempts: Vec<_> = (0..8)
        .map(|_| {
            let engine = Arc::clone(&engine);
            let refresh = refresh.clone();
            tokio::spawn(async move { engine.refresh_access_token(&refresh).await })
        })
        .collect();

    let mut winners = 0;
    for attempt in attempts {
        match attempt.await.expect("join") {
            Ok(_) => winners += 1,
            Err(e) => assert!(matches!(e, Error::RefreshTokenNotFound)),
        }
    }
    assert_eq!(winners, 1);
}

#[tokio::test]
async fn rotation_replaces_the_refresh_token() {
    let (engine, store) = stateful_engine();
    let refresh = engine
        .generate_refresh_token(&identity())
        .await
        .expect("refresh");

    let pair = engine.rotate_refresh_token(&refresh).await.expect("rotate");
    engine
        .validate_access_token(&pair.access_token)
        .expect("new access");
    let claims = engine
        .validate_refresh_token(&pair.refresh_token)
        .await
        .expect("new refresh");
    assert_eq!(claims.identity(), identity());
    assert_eq!(store.len(), 1);

    let err = engine
        .validate_refresh_token(&refresh)
        .await
        .expect_err("old refresh");
    assert!(matches!(err, Error::RefreshTokenNotFound));
}

#[tokio::test]
async fn revoke_all_removes_every_token_of_the_subject() {
    let (engine, _) = stateful_engine();
    let first = engine
        .generate_refresh_token(&identity())
        .await
        .expect("first");
    let second = engine
        .generate_refresh_token(&identity())
        .await
        .expect("second");
    let other = engine
        .generate_refresh_token(&Identity::subject("u2"))
        .await
        .expect("other");

    let removed = engine.revoke_all_refresh_tokens("u1").await.expect("revoke");
    assert_eq!(removed, 2);

    for token in [&first, &second] {
        let err = engine
            .validate_refresh_token(token)
            .await
            .expect_err("revoked");
        assert!(matches!(err, Error::RefreshTokenNotFound));
    }
    engine
        .validate_refresh_token(&other)
        .await
        .expect("other subject untouched");
}

#[tokio::test]
async fn revocation_requires_stateful_mode() {
    let engine = TokenEngine::new(config(false), None);
    let err = engine
        .revoke_refresh_token("u1", &TokenId("u1_1".to_string()))
        .await
        .expect_err("stateless");
    assert!(matches!(err, Error::UnsupportedInStatelessMode));
    assert_eq!(err.class(), ErrorClass::ModeMismatch);
}

#[tokio::test]
async fn failed_store_write_fails_generation() {
    let store = Arc::new(FlakyStore::default());
    store.fail_save.store(true, Ordering::SeqCst);
    let engine = TokenEngine::new(config(true), Some(store.clone()));

    let err = engine
        .generate_refresh_token(&identity())
        .await
        .expect_err("store down");
    assert!(matches!(err, Error::Store(StoreError::Backend(_))));
    assert_eq!(err.class(), ErrorClass::Store);
    assert!(store.inner.is_empty());
}

#[tokio::test]
async fn failed_delete_aborts_refresh_before_minting() {
    let store = Arc::new(FlakyStore::default());
    let engine = TokenEngine::new(config(true), Some(store.clone()));
    let refresh = engine
        .generate_refresh_token(&identity())
        .await
        .expect("refresh");

    store.fail_delete.store(true, Ordering::SeqCst);
    let err = engine
        .rotate_refresh_token(&refresh)
        .await
        .expect_err("delete failed");
    assert!(matches!(err, Error::Store(_)));
    assert_eq!(store.inner.len(), 1);

    // Once the store recovers the original token still works.
    store.fail_delete.store(false, Ordering::SeqCst);
    engine
        .refresh_access_token(&refresh)
        .await
        .expect("refresh after recovery");
}

#[tokio::test]
async fn stored_value_must_match() {
    let (engine, store) = stateful_engine();
    let refresh = engine
        .generate_refresh_token(&identity())
        .await
        .expect("refresh");
    let claims = engine
        .validate_refresh_token(&refresh)
        .await
        .expect("validate");

    store
        .save(&RefreshTokenRecord {
            subject_id: claims.sub.clone(),
            token_id: claims.jti.clone(),
            token: "something-else".to_string(),
            expires_at: SystemTime::now() + Duration::from_secs(60),
        })
        .await
        .expect("overwrite");

    let err = engine
        .validate_refresh_token(&refresh)
        .await
        .expect_err("mismatch");
    assert!(matches!(err, Error::Mismatch));
}

#[tokio::test]
async fn expiration_falls_back_to_the_refresh_key() {
    let engine = TokenEngine::new(config(false), None);
    let refresh = engine
        .generate_refresh_token(&identity())
        .await
        .expect("refresh");

    let expires_at = engine.token_expiration(&refresh).expect("expiration");
    let claims = engine.inspect_token(&refresh).expect("inspect");
    assert_eq!(claims.token_type, TokenKind::Refresh);
    assert_eq!(expires_at, claims.expires_at());
    assert!(!engine.is_expired(&refresh).expect("is_expired"));

    let err = engine.token_expiration("a.b.c").expect_err("garbage");
    assert!(err.is_unauthenticated());
}
