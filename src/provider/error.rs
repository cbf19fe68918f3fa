use crate::auth::error::StoreError;
use crate::core::types::{SessionId, TokenKind};

/// How a failure should be surfaced by whoever serves the engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorClass {
    /// Bad credential: answer as unauthenticated.
    Validation,
    /// The token or session the caller referred to does not exist.
    NotFound,
    /// An operation the deployment's mode does not support.
    ModeMismatch,
    /// Broken deployment: signing failures, missing stores.
    Configuration,
    /// The key-value backend failed.
    Store,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to sign token: {0}")]
    Signing(#[source] jsonwebtoken::errors::Error),
    #[error("token signature is invalid")]
    Signature,
    #[error("token is malformed: {0}")]
    Malformed(String),
    #[error("token has expired")]
    Expired,
    #[error("expected {expected} token, got {found}")]
    WrongType { expected: TokenKind, found: TokenKind },
    #[error("refresh token is not on record")]
    RefreshTokenNotFound,
    #[error("refresh token does not match the stored value")]
    Mismatch,
    #[error("operation is not supported in stateless mode")]
    UnsupportedInStatelessMode,
    #[error("stateful mode requires a token store")]
    NoStoreConfigured,
    #[error("sessions require stateful mode and a session store")]
    SessionRequiresStatefulStore,
    #[error("session {0} not found")]
    SessionNotFound(SessionId),
    #[error(transparent)]
    Store(StoreError),
}

impl Error {
    pub fn class(&self) -> ErrorClass {
        use Error::*;

        match self {
            Signature | Malformed(_) | Expired | WrongType { .. } | Mismatch => {
                ErrorClass::Validation
            }
            RefreshTokenNotFound | SessionNotFound(_) => ErrorClass::NotFound,
            UnsupportedInStatelessMode | SessionRequiresStatefulStore => ErrorClass::ModeMismatch,
            Signing(_) | NoStoreConfigured => ErrorClass::Configuration,
            Store(_) => ErrorClass::Store,
        }
    }

    /// Whether the presented credential itself is at fault.
    pub fn is_unauthenticated(&self) -> bool {
        matches!(self.class(), ErrorClass::Validation | ErrorClass::NotFound)
    }
}

impl From<StoreError> for Error {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("no {0} token secret configured")]
    MissingSecret(TokenKind),
    #[error("access and refresh tokens must be signed with different secrets")]
    SharedSecret,
    #[error("{0} token expiry must be at least one second")]
    InvalidExpiry(TokenKind),
    #[error("invalid value for {var}: {reason}")]
    Env { var: String, reason: String },
}
