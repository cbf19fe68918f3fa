use std::time::SystemTime;

use crate::core::types::{from_unix_timestamp, Identity, TokenId, TokenKind};

/// Claims carried by both access and refresh tokens.
///
/// Tenant fields keep their historical wire names so tokens issued by older
/// deployments still decode.
#[derive(Clone, Debug, PartialEq, Eq)]
#[derive(serde::Serialize, serde::Deserialize)]
pub struct TokenClaims {
    pub sub: String,
    #[serde(rename = "agent_id", default)]
    pub tenant_id: String,
    #[serde(rename = "agent_type", default)]
    pub tenant_type: String,
    pub token_type: TokenKind,
    pub jti: TokenId,
    pub iat: u64,
    pub exp: u64,
    pub iss: String,
}

impl TokenClaims {
    pub fn identity(&self) -> Identity {
        Identity::new(&self.sub, &self.tenant_id, &self.tenant_type)
    }

    pub fn issued_at(&self) -> SystemTime {
        from_unix_timestamp(self.iat)
    }

    pub fn expires_at(&self) -> SystemTime {
        from_unix_timestamp(self.exp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tenant_fields_use_agent_wire_names() {
        let claims = TokenClaims {
            sub: "u1".to_string(),
            tenant_id: "a1".to_string(),
            tenant_type: "IATA".to_string(),
            token_type: TokenKind::Access,
            jti: TokenId("u1_1".to_string()),
            iat: 10,
            exp: 20,
            iss: "tomiko".to_string(),
        };
        let json = serde_json::to_value(&claims).expect("serialize");
        assert_eq!(json["agent_id"], "a1");
        assert_eq!(json["agent_type"], "IATA");
        assert_eq!(json["token_type"], "access");
        assert_eq!(claims.identity(), Identity::new("u1", "a1", "IATA"));
    }

    #[test]
    fn absent_tenant_decodes_as_empty() {
        let claims: TokenClaims = serde_json::from_str(
            r#"{"sub":"u1","token_type":"refresh","jti":"u1_1","iat":1,"exp":2,"iss":"tomiko"}"#,
        )
        .expect("deserialize");
        assert!(claims.tenant_id.is_empty());
        assert_eq!(claims.identity(), Identity::subject("u1"));
    }
}
