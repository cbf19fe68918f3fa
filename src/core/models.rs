use std::time::{Duration, SystemTime};

use chrono::{DateTime, Utc};

use crate::auth::error::StoreError;

use super::types::*;

/// A stateful refresh token as persisted by a `TokenStore`.
#[derive(Clone, Debug)]
pub struct RefreshTokenRecord {
    pub subject_id: String,
    pub token_id: TokenId,
    pub token: String,
    pub expires_at: SystemTime,
}

impl RefreshTokenRecord {
    /// Lifetime left at `now`, or `None` once the record has expired.
    pub fn time_to_live(&self, now: SystemTime) -> Option<Duration> {
        self.expires_at
            .duration_since(now)
            .ok()
            .filter(|ttl| !ttl.is_zero())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Inactive,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Self::Active),
            "inactive" => Some(Self::Inactive),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
#[derive(serde::Serialize)]
pub struct SessionRecord {
    pub identity: Identity,
    pub device_info: String,
    pub ip_address: String,
    pub last_seen: DateTime<Utc>,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
}

impl Expire for SessionRecord {
    const EXPIRES_IN_SECS: u64 = 24 * 60 * 60;
}

impl SessionRecord {
    pub const USER_ID: &'static str = "user_id";
    pub const AGENT_ID: &'static str = "agent_id";
    pub const AGENT_TYPE: &'static str = "agent_type";
    pub const DEVICE_INFO: &'static str = "device_info";
    pub const IP_ADDRESS: &'static str = "ip_address";
    pub const LAST_SEEN: &'static str = "last_seen";
    pub const STATUS: &'static str = "status";
    pub const CREATED_AT: &'static str = "created_at";

    /// Hash field names, in the order `to_fields` and `from_fields` use.
    pub const FIELDS: [&'static str; 8] = [
        Self::USER_ID,
        Self::AGENT_ID,
        Self::AGENT_TYPE,
        Self::DEVICE_INFO,
        Self::IP_ADDRESS,
        Self::LAST_SEEN,
        Self::STATUS,
        Self::CREATED_AT,
    ];

    pub fn new(identity: Identity, device_info: String, ip_address: String) -> Self {
        let now = Utc::now();
        Self {
            identity,
            device_info,
            ip_address,
            last_seen: now,
            status: SessionStatus::Active,
            created_at: now,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == SessionStatus::Active
    }

    pub fn to_fields(&self) -> Vec<(&'static str, String)> {
        vec![
            (Self::USER_ID, self.identity.subject_id.clone()),
            (Self::AGENT_ID, self.identity.tenant_id.clone()),
            (Self::AGENT_TYPE, self.identity.tenant_type.clone()),
            (Self::DEVICE_INFO, self.device_info.clone()),
            (Self::IP_ADDRESS, self.ip_address.clone()),
            (Self::LAST_SEEN, format_timestamp(&self.last_seen)),
            (Self::STATUS, self.status.as_str().to_string()),
            (Self::CREATED_AT, format_timestamp(&self.created_at)),
        ]
    }

    /// Rebuilds a record from values fetched in `FIELDS` order.
    pub fn from_fields(values: Vec<Option<String>>) -> Result<Self, StoreError> {
        let mut values = values.into_iter();
        let mut next = || values.next().flatten();

        let subject_id = next().ok_or_else(|| missing(Self::USER_ID))?;
        let tenant_id = next().unwrap_or_default();
        let tenant_type = next().unwrap_or_default();
        let device_info = next().unwrap_or_default();
        let ip_address = next().unwrap_or_default();
        let last_seen = next();
        let status = next().ok_or_else(|| missing(Self::STATUS))?;
        let created_at = next().ok_or_else(|| missing(Self::CREATED_AT))?;

        let status = SessionStatus::parse(&status)
            .ok_or_else(|| StoreError::Corrupt(format!("unknown session status {:?}", status)))?;
        let created_at = parse_timestamp(&created_at)?;
        let last_seen = match last_seen {
            Some(s) => parse_timestamp(&s)?,
            None => created_at,
        };

        Ok(Self {
            identity: Identity::new(subject_id, tenant_id, tenant_type),
            device_info,
            ip_address,
            last_seen,
            status,
            created_at,
        })
    }
}

fn missing(field: &str) -> StoreError {
    StoreError::Corrupt(format!("session field {} is missing", field))
}

pub fn format_timestamp(time: &DateTime<Utc>) -> String {
    time.to_rfc3339()
}

// Older records carry plain Unix seconds.
fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, StoreError> {
    if let Ok(t) = DateTime::parse_from_rfc3339(s) {
        return Ok(t.with_timezone(&Utc));
    }
    s.parse::<i64>()
        .ok()
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .ok_or_else(|| StoreError::Corrupt(format!("bad session timestamp {:?}", s)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fetched(record: &SessionRecord) -> Vec<Option<String>> {
        record.to_fields().into_iter().map(|(_, v)| Some(v)).collect()
    }

    #[test]
    fn refresh_record_ttl_keeps_sub_second_precision() {
        let now = SystemTime::now();
        let record = RefreshTokenRecord {
            subject_id: "u1".to_string(),
            token_id: TokenId("u1_1".to_string()),
            token: "t".to_string(),
            expires_at: now + Duration::from_millis(1500),
        };
        assert_eq!(record.time_to_live(now), Some(Duration::from_millis(1500)));
        assert_eq!(record.time_to_live(record.expires_at), None);
        assert_eq!(
            record.time_to_live(now + Duration::from_secs(2)),
            None
        );
    }

    #[test]
    fn fields_follow_declared_order() {
        let record = SessionRecord::new(
            Identity::new("u1", "a1", "IATA"),
            "firefox".to_string(),
            "10.0.0.1".to_string(),
        );
        let names: Vec<&str> = record.to_fields().iter().map(|(k, _)| *k).collect();
        assert_eq!(names, SessionRecord::FIELDS.to_vec());
    }

    #[test]
    fn record_survives_hash_encoding() {
        let record = SessionRecord::new(
            Identity::new("u1", "a1", "IATA"),
            "firefox".to_string(),
            "10.0.0.1".to_string(),
        );
        let decoded = SessionRecord::from_fields(fetched(&record)).expect("decode");
        assert_eq!(decoded, record);
    }

    #[test]
    fn unix_second_timestamps_are_accepted() {
        let values = vec![
            Some("u1".to_string()),
            None,
            None,
            None,
            None,
            None,
            Some("inactive".to_string()),
            Some("1700000000".to_string()),
        ];
        let record = SessionRecord::from_fields(values).expect("decode");
        assert_eq!(record.status, SessionStatus::Inactive);
        assert_eq!(record.created_at.timestamp(), 1_700_000_000);
        assert_eq!(record.last_seen, record.created_at);
        assert!(record.identity.tenant_id.is_empty());
    }

    #[test]
    fn missing_subject_is_corrupt() {
        let err = SessionRecord::from_fields(vec![None; 8]).expect_err("corrupt");
        assert!(matches!(err, StoreError::Corrupt(_)));
    }
}
