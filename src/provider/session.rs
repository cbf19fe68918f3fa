use std::sync::Arc;

use chrono::Utc;
use tracing::{event, Level};

use crate::auth::SessionStore;
use crate::core::keys;
use crate::core::models::{format_timestamp, SessionRecord, SessionStatus};
use crate::core::types::{Expire, Identity, SessionId, TokenPair};
use crate::util::id::FromSubject;

use super::{error::Error, TokenEngine};

/// Tokens issued together with a freshly created session.
#[derive(Clone, Debug)]
#[derive(serde::Serialize)]
pub struct SessionTokens {
    pub access_token: String,
    pub refresh_token: String,
    pub session_id: SessionId,
}

/// Tracks logged-in sessions on top of a stateful `TokenEngine`.
///
/// Session records live for 24 hours from creation. Updating a session
/// never extends that; `extend_session` does so explicitly.
pub struct SessionManager {
    engine: Arc<TokenEngine>,
    sessions: Option<Arc<dyn SessionStore>>,
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "SessionManager {{ engine: {:?}, store: {} }}",
            self.engine,
            self.sessions.is_some()
        )
    }
}

impl SessionManager {
    pub fn new(engine: Arc<TokenEngine>, sessions: Option<Arc<dyn SessionStore>>) -> Self {
        Self { engine, sessions }
    }

    pub fn engine(&self) -> &TokenEngine {
        &self.engine
    }

    fn store(&self) -> Result<&dyn SessionStore, Error> {
        if !self.engine.is_stateful() {
            return Err(Error::SessionRequiresStatefulStore);
        }
        self.sessions
            .as_deref()
            .ok_or(Error::SessionRequiresStatefulStore)
    }

    #[tracing::instrument(skip_all, fields(sub = %identity.subject_id))]
    pub async fn create_session(
        &self,
        identity: &Identity,
        device_info: &str,
        ip_address: &str,
    ) -> Result<(SessionRecord, SessionId), Error> {
        let store = self.store()?;

        let id = SessionId::from_subject(&identity.subject_id);
        let record = SessionRecord::new(
            identity.clone(),
            device_info.to_string(),
            ip_address.to_string(),
        );

        store
            .put_hash(
                &keys::session_key(&id),
                &record.to_fields(),
                SessionRecord::time_to_live(),
            )
            .await?;

        event!(Level::DEBUG, session_id = %id, "Created session");
        Ok((record, id))
    }

    pub async fn get_session(&self, id: &SessionId) -> Result<SessionRecord, Error> {
        let values = self
            .store()?
            .get_hash_fields(&keys::session_key(id), &SessionRecord::FIELDS)
            .await?
            .ok_or_else(|| Error::SessionNotFound(id.clone()))?;

        Ok(SessionRecord::from_fields(values)?)
    }

    /// Stamps the session as seen now. Its expiry is left alone.
    #[tracing::instrument(skip(self), fields(session_id = %id))]
    pub async fn update_session_last_seen(&self, id: &SessionId) -> Result<(), Error> {
        let now = format_timestamp(&Utc::now());
        self.update(id, &[(SessionRecord::LAST_SEEN, now)]).await
    }

    /// Marks the session inactive. The record stays until it expires.
    #[tracing::instrument(skip(self), fields(session_id = %id))]
    pub async fn end_session(&self, id: &SessionId) -> Result<(), Error> {
        let status = SessionStatus::Inactive.as_str().to_string();
        self.update(id, &[(SessionRecord::STATUS, status)]).await?;
        event!(Level::DEBUG, "Ended session");
        Ok(())
    }

    async fn update(&self, id: &SessionId, fields: &[(&str, String)]) -> Result<(), Error> {
        let updated = self
            .store()?
            .update_hash(&keys::session_key(id), fields)
            .await?;
        if !updated {
            return Err(Error::SessionNotFound(id.clone()));
        }
        Ok(())
    }

    /// Restarts the 24 hour lifetime of the session.
    #[tracing::instrument(skip(self), fields(session_id = %id))]
    pub async fn extend_session(&self, id: &SessionId) -> Result<(), Error> {
        let extended = self
            .store()?
            .expire(&keys::session_key(id), SessionRecord::time_to_live())
            .await?;
        if !extended {
            return Err(Error::SessionNotFound(id.clone()));
        }
        Ok(())
    }

    /// Sessions owned by `subject_id`, active or not.
    ///
    /// Walks every session key in the store, so the cost grows with the total
    /// number of live sessions, not with the subject's.
    #[tracing::instrument(skip(self))]
    pub async fn user_sessions(&self, subject_id: &str) -> Result<Vec<SessionId>, Error> {
        let store = self.store()?;
        let mut owned = Vec::new();

        for key in store.scan(keys::SESSION_PATTERN).await? {
            let owner = store
                .get_hash_fields(&key, &[SessionRecord::USER_ID])
                .await?
                .and_then(|values| values.into_iter().next().flatten());

            // A session may expire between the scan and the read.
            if owner.as_deref() == Some(subject_id) {
                if let Some(id) = keys::session_id_from_key(&key) {
                    owned.push(id);
                }
            }
        }

        owned.sort_by(|a, b| a.0.cmp(&b.0));
        event!(Level::TRACE, found = owned.len(), "Listed sessions");
        Ok(owned)
    }

    /// Creates a session, then issues an access and refresh token pair.
    ///
    /// When issuing fails the session is not removed; it expires on its own.
    #[tracing::instrument(skip_all, fields(sub = %identity.subject_id))]
    pub async fn generate_tokens_with_session(
        &self,
        identity: &Identity,
        device_info: &str,
        ip_address: &str,
    ) -> Result<SessionTokens, Error> {
        let (_, session_id) = self
            .create_session(identity, device_info, ip_address)
            .await?;

        let pair = match self.issue_pair(identity).await {
            Ok(pair) => pair,
            Err(e) => {
                event!(
                    Level::WARN,
                    session_id = %session_id,
                    error = %e,
                    "Token issue failed after session creation"
                );
                return Err(e);
            }
        };

        Ok(SessionTokens {
            access_token: pair.access_token,
            refresh_token: pair.refresh_token,
            session_id,
        })
    }

    async fn issue_pair(&self, identity: &Identity) -> Result<TokenPair, Error> {
        let access_token = self.engine.generate_access_token(identity)?;
        let refresh_token = self.engine.generate_refresh_token(identity).await?;
        Ok(TokenPair {
            access_token,
            refresh_token,
        })
    }

    /// Consumes `refresh_token` and starts a new session with fresh tokens for
    /// the same identity.
    #[tracing::instrument(skip_all)]
    pub async fn refresh_with_session(
        &self,
        refresh_token: &str,
        device_info: &str,
        ip_address: &str,
    ) -> Result<SessionTokens, Error> {
        // Refuse before consuming anything.
        self.store()?;

        let claims = self.engine.consume_refresh_token(refresh_token).await?;
        self.generate_tokens_with_session(&claims.identity(), device_info, ip_address)
            .await
    }
}
