use std::time::{Duration, SystemTime};

use crate::core::types::{unix_timestamp, TokenKind};

use super::{claims::TokenClaims, error::Error, TokenEngine};

// Signatures are verified but expiry is not: an expired token still reports
// when it expired.
impl TokenEngine {
    /// Claims of an access or refresh token, whichever key verifies it,
    /// expired or not.
    pub fn inspect_token(&self, token: &str) -> Result<TokenClaims, Error> {
        self.inspect_as(token, TokenKind::Access)
            .or_else(|_| self.inspect_as(token, TokenKind::Refresh))
    }

    pub fn token_expiration(&self, token: &str) -> Result<SystemTime, Error> {
        self.inspect_token(token).map(|claims| claims.expires_at())
    }

    pub fn token_expiration_as(&self, token: &str, kind: TokenKind) -> Result<SystemTime, Error> {
        self.inspect_as(token, kind).map(|claims| claims.expires_at())
    }

    /// Time left before expiry, zero once expired.
    pub fn remaining_time(&self, token: &str) -> Result<Duration, Error> {
        let expires_at = self.token_expiration(token)?;
        Ok(expires_at
            .duration_since(SystemTime::now())
            .unwrap_or(Duration::ZERO))
    }

    pub fn is_expired(&self, token: &str) -> Result<bool, Error> {
        let claims = self.inspect_token(token)?;
        Ok(claims.exp <= unix_timestamp(SystemTime::now()))
    }
}
