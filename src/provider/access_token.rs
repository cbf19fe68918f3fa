use tracing::{event, Level};

use crate::auth::error::StoreError;
use crate::core::types::TokenPair;

use super::{claims::TokenClaims, error::Error, TokenEngine};

impl TokenEngine {
    /// Exchanges a refresh token for a new access token.
    ///
    /// In stateful mode the refresh token is consumed: its record is deleted
    /// before anything new is minted, and when two callers race on the same
    /// token only the one whose delete lands succeeds. In stateless mode the
    /// refresh token stays usable until it expires.
    #[tracing::instrument(skip_all)]
    pub async fn refresh_access_token(&self, refresh_token: &str) -> Result<String, Error> {
        let claims = self.consume_refresh_token(refresh_token).await?;
        self.generate_access_token(&claims.identity())
    }

    /// Like `refresh_access_token`, also issuing a replacement refresh token.
    #[tracing::instrument(skip_all)]
    pub async fn rotate_refresh_token(&self, refresh_token: &str) -> Result<TokenPair, Error> {
        let claims = self.consume_refresh_token(refresh_token).await?;
        let identity = claims.identity();

        let access_token = self.generate_access_token(&identity)?;
        let refresh_token = self.generate_refresh_token(&identity).await?;
        Ok(TokenPair {
            access_token,
            refresh_token,
        })
    }

    /// Validates the token and, in stateful mode, deletes its record.
    pub(crate) async fn consume_refresh_token(&self, token: &str) -> Result<TokenClaims, Error> {
        let claims = self.validate_refresh_token(token).await?;

        if self.is_stateful() {
            match self.token_store()?.delete(&claims.sub, &claims.jti).await {
                Ok(()) => {
                    event!(Level::DEBUG, jti = %claims.jti, "Consumed refresh token");
                }
                Err(StoreError::NotFound) => {
                    event!(
                        Level::WARN,
                        jti = %claims.jti,
                        "Refresh token was consumed concurrently"
                    );
                    return Err(Error::RefreshTokenNotFound);
                }
                Err(e) => return Err(e.into()),
            }
        }

        Ok(claims)
    }
}
