use std::sync::Arc;
use std::time::SystemTime;

use tracing::{event, Level};

use crate::auth::{error::StoreError, TokenStore};
use crate::core::models::RefreshTokenRecord;
use crate::core::types::{unix_timestamp, Identity, TokenId, TokenKind};
use crate::util::id::FromSubject;

pub mod access_token;
pub mod claims;
pub mod config;
pub mod error;
pub mod expiration;
pub mod revocation;
pub mod session;
pub mod token;

pub use claims::TokenClaims;
pub use config::EngineConfig;
pub use error::{ConfigError, Error, ErrorClass};
pub use session::{SessionManager, SessionTokens};
pub use token::{ClaimCodec, SigningKey};

/// Issues, validates, rotates and revokes access and refresh tokens.
///
/// Whether the engine is stateful is decided by its configuration and never
/// changes afterwards. The engine holds no locks; share it behind an `Arc`.
pub struct TokenEngine {
    config: EngineConfig,
    codec: ClaimCodec,
    access_key: SigningKey,
    refresh_key: SigningKey,
    tokens: Option<Arc<dyn TokenStore>>,
}

impl std::fmt::Debug for TokenEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "TokenEngine {{ config: {:?}, store: {}, ... }}",
            self.config,
            self.tokens.is_some()
        )
    }
}

impl TokenEngine {
    pub fn new(config: EngineConfig, tokens: Option<Arc<dyn TokenStore>>) -> Self {
        if !config.is_stateful() && tokens.is_some() {
            event!(Level::WARN, "Token store is ignored in stateless mode");
        }
        if config.is_stateful() && tokens.is_none() {
            event!(
                Level::WARN,
                "Stateful mode without a token store; refresh tokens cannot be issued"
            );
        }

        Self {
            codec: ClaimCodec::new(config.issuer()),
            access_key: SigningKey::from_secret(config.secret(TokenKind::Access)),
            refresh_key: SigningKey::from_secret(config.secret(TokenKind::Refresh)),
            tokens,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn is_stateful(&self) -> bool {
        self.config.is_stateful()
    }

    fn key(&self, kind: TokenKind) -> &SigningKey {
        match kind {
            TokenKind::Access => &self.access_key,
            TokenKind::Refresh => &self.refresh_key,
        }
    }

    /// The token store, for operations that only exist in stateful mode.
    pub(crate) fn token_store(&self) -> Result<&dyn TokenStore, Error> {
        if !self.is_stateful() {
            return Err(Error::UnsupportedInStatelessMode);
        }
        self.tokens.as_deref().ok_or(Error::NoStoreConfigured)
    }

    fn mint(&self, identity: &Identity, kind: TokenKind) -> Result<(TokenClaims, String), Error> {
        let now = unix_timestamp(SystemTime::now());
        let claims = TokenClaims {
            sub: identity.subject_id.clone(),
            tenant_id: identity.tenant_id.clone(),
            tenant_type: identity.tenant_type.clone(),
            token_type: kind,
            jti: TokenId::from_subject(&identity.subject_id),
            iat: now,
            exp: now.saturating_add(self.config.expiry(kind).as_secs()),
            iss: self.codec.issuer().to_string(),
        };

        let token = self.codec.encode(&claims, self.key(kind))?;
        event!(Level::DEBUG, jti = %claims.jti, exp = claims.exp, "Issuing {} token", kind);
        Ok((claims, token))
    }

    /// Decodes with the key of `kind` and checks the embedded type.
    fn decode_as(&self, token: &str, kind: TokenKind) -> Result<TokenClaims, Error> {
        match self.codec.decode(token, self.key(kind)) {
            Ok(claims) => check_kind(claims, kind),
            Err(Error::Signature) => Err(self.signature_error(token, kind)),
            Err(e) => Err(e),
        }
    }

    /// Like `decode_as`, without the expiry check.
    fn inspect_as(&self, token: &str, kind: TokenKind) -> Result<TokenClaims, Error> {
        match self.codec.inspect(token, self.key(kind)) {
            Ok(claims) => check_kind(claims, kind),
            Err(Error::Signature) => Err(self.signature_error(token, kind)),
            Err(e) => Err(e),
        }
    }

    /// A token that fails the key of `expected` but verifies under the other
    /// key is a token of the other kind.
    fn signature_error(&self, token: &str, expected: TokenKind) -> Error {
        let other = match expected {
            TokenKind::Access => TokenKind::Refresh,
            TokenKind::Refresh => TokenKind::Access,
        };
        match self.codec.inspect(token, self.key(other)) {
            Ok(_) => Error::WrongType {
                expected,
                found: other,
            },
            Err(_) => Error::Signature,
        }
    }

    #[tracing::instrument(skip_all, fields(sub = %identity.subject_id))]
    pub fn generate_access_token(&self, identity: &Identity) -> Result<String, Error> {
        self.mint(identity, TokenKind::Access).map(|(_, token)| token)
    }

    /// In stateful mode the token is returned only once its record is stored.
    #[tracing::instrument(skip_all, fields(sub = %identity.subject_id))]
    pub async fn generate_refresh_token(&self, identity: &Identity) -> Result<String, Error> {
        let store = if self.is_stateful() {
            Some(self.token_store()?)
        } else {
            None
        };

        let (claims, token) = self.mint(identity, TokenKind::Refresh)?;

        if let Some(store) = store {
            let record = RefreshTokenRecord {
                subject_id: claims.sub.clone(),
                token_id: claims.jti.clone(),
                token: token.clone(),
                expires_at: claims.expires_at(),
            };
            store.save(&record).await?;
            event!(Level::DEBUG, jti = %claims.jti, "Stored refresh token");
        }

        Ok(token)
    }

    pub fn validate_access_token(&self, token: &str) -> Result<TokenClaims, Error> {
        self.decode_as(token, TokenKind::Access)
    }

    /// In stateful mode the token must also be on record, byte for byte.
    #[tracing::instrument(skip_all)]
    pub async fn validate_refresh_token(&self, token: &str) -> Result<TokenClaims, Error> {
        let claims = self.decode_as(token, TokenKind::Refresh)?;

        if self.is_stateful() {
            let stored = match self.token_store()?.get(&claims.sub, &claims.jti).await {
                Ok(stored) => stored,
                Err(StoreError::NotFound) => {
                    event!(Level::DEBUG, jti = %claims.jti, "Refresh token not on record");
                    return Err(Error::RefreshTokenNotFound);
                }
                Err(e) => return Err(e.into()),
            };

            if stored != token {
                event!(
                    Level::WARN,
                    jti = %claims.jti,
                    "Presented refresh token differs from the stored one"
                );
                return Err(Error::Mismatch);
            }
        }

        Ok(claims)
    }
}

fn check_kind(claims: TokenClaims, expected: TokenKind) -> Result<TokenClaims, Error> {
    if claims.token_type != expected {
        return Err(Error::WrongType {
            expected,
            found: claims.token_type,
        });
    }
    Ok(claims)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::db::MemoryStore;

    fn config(stateful: bool) -> EngineConfig {
        EngineConfig::builder()
            .access_secret("access-secret")
            .refresh_secret("refresh-secret")
            .stateful(stateful)
            .build()
            .expect("config")
    }

    fn identity() -> Identity {
        Identity::new("u1", "a1", "IATA")
    }

    #[test]
    fn access_claims_carry_identity_and_ttl() {
        let engine = TokenEngine::new(config(false), None);
        let token = engine.generate_access_token(&identity()).expect("generate");
        let claims = engine.validate_access_token(&token).expect("validate");

        assert_eq!(claims.identity(), identity());
        assert_eq!(claims.token_type, TokenKind::Access);
        assert_eq!(claims.iss, config::DEFAULT_ISSUER);
        assert_eq!(claims.exp - claims.iat, 15 * 60);
        assert!(claims.jti.0.starts_with("u1_"));
    }

    #[test]
    fn forged_type_claim_is_rejected() {
        let engine = TokenEngine::new(config(false), None);
        let (mut claims, _) = engine.mint(&identity(), TokenKind::Access).expect("mint");
        claims.token_type = TokenKind::Refresh;
        let token = engine
            .codec
            .encode(&claims, &engine.access_key)
            .expect("encode");

        let err = engine.validate_access_token(&token).expect_err("wrong type");
        assert!(matches!(
            err,
            Error::WrongType {
                expected: TokenKind::Access,
                found: TokenKind::Refresh
            }
        ));
    }

    #[tokio::test]
    async fn tokens_of_the_other_kind_are_wrong_type() {
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
    }

    #[test]
    fn unknown_keys_still_fail_signature() {
        let engine = TokenEngine::new(config(false), None);
        let foreign = TokenEngine::new(
            EngineConfig::builder()
                .access_secret("other-access")
                .refresh_secret("other-refresh")
                .build()
                .expect("config"),
            None,
        );
        let token = foreign.generate_access_token(&identity()).expect("access");

        let err = engine.validate_access_token(&token).expect_err("foreign");
        assert!(matches!(err, Error::Signature));
    }

    #[tokio::test]
    async fn stateful_refresh_tokens_are_recorded() {
        let store = Arc::new(MemoryStore::new());
        let engine = TokenEngine::new(config(true), Some(store.clone()));

        let token = engine
            .generate_refresh_token(&identity())
            .await
            .expect("generate");
        let claims = engine.validate_refresh_token(&token).await.expect("validate");

        let stored = store.get("u1", &claims.jti).await.expect("stored");
        assert_eq!(stored, token);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn stateless_refresh_tokens_leave_no_record() {
        let store = Arc::new(MemoryStore::new());
        let engine = TokenEngine::new(config(false), Some(store.clone()));

        let token = engine
            .generate_refresh_token(&identity())
            .await
            .expect("generate");
        engine.validate_refresh_token(&token).await.expect("validate");
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn stateful_without_store_cannot_issue_refresh_tokens() {
        let engine = TokenEngine::new(config(true), None);
        let err = engine
            .generate_refresh_token(&identity())
            .await
            .expect_err("no store");
        assert!(matches!(err, Error::NoStoreConfigured));

        // Access tokens need no store.
        engine.generate_access_token(&identity()).expect("access");
    }

    #[tokio::test]
    async fn records_expire_with_the_token() {
        let store = Arc::new(MemoryStore::new());
        let config = EngineConfig::builder()
            .access_secret("access-secret")
            .refresh_secret("refresh-secret")
            .refresh_expiry(Duration::from_secs(2))
            .stateful(true)
            .build()
            .expect("config");
        let engine = TokenEngine::new(config, Some(store.clone()));

        engine
            .generate_refresh_token(&identity())
            .await
            .expect("generate");
        tokio::time::sleep(Duration::from_millis(2100)).await;

        store.clean_up().await.expect("clean_up");
        assert!(store.is_empty());
    }
}
