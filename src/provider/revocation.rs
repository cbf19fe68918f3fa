use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{event, Level};

use crate::auth::error::StoreError;
use crate::core::types::TokenId;

use super::{error::Error, TokenEngine};

impl TokenEngine {
    /// Deletes one refresh token record. Revoking a token that is already
    /// gone succeeds.
    #[tracing::instrument(skip(self, token_id), fields(token_id = %token_id))]
    pub async fn revoke_refresh_token(
        &self,
        subject_id: &str,
        token_id: &TokenId,
    ) -> Result<(), Error> {
        let store = self.token_store()?;

        match store.delete(subject_id, token_id).await {
            Ok(()) => event!(Level::DEBUG, "Revoked refresh token"),
            Err(StoreError::NotFound) => event!(Level::DEBUG, "Refresh token already gone"),
            Err(e) => return Err(e.into()),
        }
        Ok(())
    }

    /// Deletes every refresh token of the subject, returning how many there were.
    #[tracing::instrument(skip(self))]
    pub async fn revoke_all_refresh_tokens(&self, subject_id: &str) -> Result<usize, Error> {
        let removed = self.token_store()?.delete_all(subject_id).await?;
        event!(Level::DEBUG, removed, "Revoked all refresh tokens");
        Ok(removed)
    }

    pub async fn clean_up_expired(&self) -> Result<(), Error> {
        self.token_store()?.clean_up().await?;
        Ok(())
    }

    /// Runs `clean_up_expired` every `period` until a call fails.
    pub fn start_clean_up_worker(
        self: Arc<Self>,
        period: Duration,
    ) -> JoinHandle<Result<(), Error>> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);

            loop {
                interval.tick().await;
                if let Err(e) = self.clean_up_expired().await {
                    event!(Level::WARN, error = %e, "Stopping clean up worker");
                    return Err(e);
                }
            }
        })
    }
}
