//! Issue, validate, rotate and revoke access and refresh tokens, and track
//! logged-in sessions, for services that have already authenticated a
//! principal.
//!
//! A [`TokenEngine`] is either stateless, where tokens are self-contained,
//! or stateful, where refresh tokens are single use and revocable through a
//! [`TokenStore`]. A [`SessionManager`] adds session records on top of a
//! stateful engine.

pub mod auth;
pub mod core;
pub mod db;
pub mod provider;
pub mod util;

pub use crate::auth::{error::StoreError, SessionStore, TokenStore};
pub use crate::core::types::{Identity, SessionId, TokenId, TokenKind, TokenPair};
pub use crate::provider::{
    ConfigError, EngineConfig, Error, ErrorClass, SessionManager, SessionTokens, TokenClaims,
    TokenEngine,
};
