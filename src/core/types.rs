use std::{
    fmt,
    str::FromStr,
    time::{Duration, SystemTime},
};

/// The principal a token or session is issued for.
///
/// Identity is established by the caller (password login, SSO, ...) before it
/// reaches the engine; the engine only carries it through claims and records.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[derive(serde::Serialize, serde::Deserialize)]
pub struct Identity {
    pub subject_id: String,
    #[serde(default)]
    pub tenant_id: String,
    #[serde(default)]
    pub tenant_type: String,
}

impl Identity {
    pub fn new(
        subject_id: impl Into<String>,
        tenant_id: impl Into<String>,
        tenant_type: impl Into<String>,
    ) -> Self {
        Self {
            subject_id: subject_id.into(),
            tenant_id: tenant_id.into(),
            tenant_type: tenant_type.into(),
        }
    }

    /// An identity with no owning tenant.
    pub fn subject(subject_id: impl Into<String>) -> Self {
        Self::new(subject_id, "", "")
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    Access,
    Refresh,
}

impl TokenKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Access => "access",
            Self::Refresh => "refresh",
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct TokenId(pub String);

impl FromStr for TokenId {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub String);

impl FromStr for SessionId {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An access token together with the refresh token minted alongside it.
#[derive(Clone, Debug)]
#[derive(serde::Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

pub trait Expire {
    const EXPIRES_IN_SECS: u64;

    fn time_to_live() -> Duration {
        Duration::from_secs(Self::EXPIRES_IN_SECS)
    }
}

/// Seconds since the Unix epoch, saturating at zero for clocks set before it.
pub fn unix_timestamp(time: SystemTime) -> u64 {
    time.duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

pub fn from_unix_timestamp(secs: u64) -> SystemTime {
    SystemTime::UNIX_EPOCH
        .checked_add(Duration::from_secs(secs))
        .unwrap_or(SystemTime::UNIX_EPOCH)
}
