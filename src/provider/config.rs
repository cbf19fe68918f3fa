use std::time::Duration;

use crate::core::types::TokenKind;

use super::error::ConfigError;

pub const DEFAULT_ISSUER: &str = "tomiko";
pub const DEFAULT_ACCESS_TOKEN_EXPIRY: Duration = Duration::from_secs(15 * 60);
pub const DEFAULT_REFRESH_TOKEN_EXPIRY: Duration = Duration::from_secs(7 * 24 * 60 * 60);

pub const ACCESS_SECRET_VAR: &str = "JWT_ACCESS_SECRET";
pub const REFRESH_SECRET_VAR: &str = "JWT_REFRESH_SECRET";
pub const ACCESS_EXPIRY_VAR: &str = "JWT_ACCESS_TOKEN_EXPIRY";
pub const REFRESH_EXPIRY_VAR: &str = "JWT_REFRESH_TOKEN_EXPIRY";
pub const STATEFUL_VAR: &str = "JWT_STATEFUL";
pub const ISSUER_VAR: &str = "JWT_ISSUER";

/// Immutable engine settings. Built once, validated, then shared.
#[derive(Clone)]
pub struct EngineConfig {
    access_secret: String,
    refresh_secret: String,
    access_expiry: Duration,
    refresh_expiry: Duration,
    stateful: bool,
    issuer: String,
}

impl std::fmt::Debug for EngineConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineConfig")
            .field("issuer", &self.issuer)
            .field("access_expiry", &self.access_expiry)
            .field("refresh_expiry", &self.refresh_expiry)
            .field("stateful", &self.stateful)
            .finish_non_exhaustive()
    }
}

impl EngineConfig {
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::default()
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Reads settings through `lookup`, applying defaults for everything but
    /// the two secrets.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut builder = Self::builder();

        if let Some(secret) = lookup(ACCESS_SECRET_VAR) {
            builder = builder.access_secret(secret);
        }
        if let Some(secret) = lookup(REFRESH_SECRET_VAR) {
            builder = builder.refresh_secret(secret);
        }
        if let Some(raw) = lookup(ACCESS_EXPIRY_VAR) {
            builder = builder.access_expiry(env_duration(ACCESS_EXPIRY_VAR, &raw)?);
        }
        if let Some(raw) = lookup(REFRESH_EXPIRY_VAR) {
            builder = builder.refresh_expiry(env_duration(REFRESH_EXPIRY_VAR, &raw)?);
        }
        if let Some(raw) = lookup(STATEFUL_VAR) {
            let stateful = parse_bool(&raw).ok_or_else(|| ConfigError::Env {
                var: STATEFUL_VAR.to_string(),
                reason: format!("{:?} is not a boolean", raw),
            })?;
            builder = builder.stateful(stateful);
        }
        if let Some(issuer) = lookup(ISSUER_VAR) {
            builder = builder.issuer(issuer);
        }

        builder.build()
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    pub fn is_stateful(&self) -> bool {
        self.stateful
    }

    pub fn expiry(&self, kind: TokenKind) -> Duration {
        match kind {
            TokenKind::Access => self.access_expiry,
            TokenKind::Refresh => self.refresh_expiry,
        }
    }

    pub(crate) fn secret(&self, kind: TokenKind) -> &[u8] {
        match kind {
            TokenKind::Access => self.access_secret.as_bytes(),
            TokenKind::Refresh => self.refresh_secret.as_bytes(),
        }
    }
}

#[derive(Default)]
pub struct EngineConfigBuilder {
    access_secret: Option<String>,
    refresh_secret: Option<String>,
    access_expiry: Option<Duration>,
    refresh_expiry: Option<Duration>,
    stateful: bool,
    issuer: Option<String>,
}

impl EngineConfigBuilder {
    pub fn access_secret(mut self, secret: impl Into<String>) -> Self {
        self.access_secret = Some(secret.into());
        self
    }

    pub fn refresh_secret(mut self, secret: impl Into<String>) -> Self {
        self.refresh_secret = Some(secret.into());
        self
    }

    pub fn access_expiry(mut self, expiry: Duration) -> Self {
        self.access_expiry = Some(expiry);
        self
    }

    pub fn refresh_expiry(mut self, expiry: Duration) -> Self {
        self.refresh_expiry = Some(expiry);
        self
    }

    pub fn stateful(mut self, stateful: bool) -> Self {
        self.stateful = stateful;
        self
    }

    pub fn issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = Some(issuer.into());
        self
    }

    pub fn build(self) -> Result<EngineConfig, ConfigError> {
        let access_secret = self
            .access_secret
            .filter(|s| !s.is_empty())
            .ok_or(ConfigError::MissingSecret(TokenKind::Access))?;
        let refresh_secret = self
            .refresh_secret
            .filter(|s| !s.is_empty())
            .ok_or(ConfigError::MissingSecret(TokenKind::Refresh))?;

        if access_secret == refresh_secret {
            return Err(ConfigError::SharedSecret);
        }

        // Claims carry whole seconds.
        let access_expiry = self.access_expiry.unwrap_or(DEFAULT_ACCESS_TOKEN_EXPIRY);
        if access_expiry.as_secs() == 0 {
            return Err(ConfigError::InvalidExpiry(TokenKind::Access));
        }
        let refresh_expiry = self.refresh_expiry.unwrap_or(DEFAULT_REFRESH_TOKEN_EXPIRY);
        if refresh_expiry.as_secs() == 0 {
            return Err(ConfigError::InvalidExpiry(TokenKind::Refresh));
        }

        Ok(EngineConfig {
            access_secret,
            refresh_secret,
            access_expiry,
            refresh_expiry,
            stateful: self.stateful,
            issuer: self
                .issuer
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| DEFAULT_ISSUER.to_string()),
        })
    }
}

fn env_duration(var: &str, raw: &str) -> Result<Duration, ConfigError> {
    parse_duration(raw).ok_or_else(|| ConfigError::Env {
        var: var.to_string(),
        reason: format!("{:?} is not a duration", raw),
    })
}

/// Parses `90`, `90s`, `15m`, `12h` or `7d`.
pub fn parse_duration(raw: &str) -> Option<Duration> {
    let raw = raw.trim();
    let split = raw
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(raw.len());
    let (digits, unit) = raw.split_at(split);
    let value: u64 = digits.parse().ok()?;

    let scale = match unit.trim() {
        "" | "s" => 1,
        "m" => 60,
        "h" => 60 * 60,
        "d" => 24 * 60 * 60,
        _ => return None,
    };
    value.checked_mul(scale).map(Duration::from_secs)
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}
