use std::collections::HashSet;
use std::time::SystemTime;

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};

use crate::core::types::unix_timestamp;
use crate::provider::{claims::TokenClaims, Error};

/// HMAC secret prepared for both signing and verification.
pub struct SigningKey {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SigningKey {{ ... }}")
    }
}

impl SigningKey {
    pub fn from_secret(secret: &[u8]) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
        }
    }
}

/// Signs and verifies `TokenClaims` as HS256 JWS compact tokens.
///
/// Expiry is checked here rather than by `jsonwebtoken` so that a token whose
/// `exp` equals the current second is already expired, with no leeway.
#[derive(Clone, Debug)]
pub struct ClaimCodec {
    issuer: String,
    validation: Validation,
}

impl ClaimCodec {
    pub fn new(issuer: impl Into<String>) -> Self {
        let issuer = issuer.into();

        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.required_spec_claims = HashSet::new();
        validation.set_issuer(&[issuer.as_str()]);

        Self { issuer, validation }
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    pub fn encode(&self, claims: &TokenClaims, key: &SigningKey) -> Result<String, Error> {
        let header = Header::new(Algorithm::HS256);
        jsonwebtoken::encode(&header, claims, &key.encoding).map_err(Error::Signing)
    }

    /// Verifies signature, issuer and expiry.
    pub fn decode(&self, token: &str, key: &SigningKey) -> Result<TokenClaims, Error> {
        let claims = self.inspect(token, key)?;
        if claims.exp <= unix_timestamp(SystemTime::now()) {
            return Err(Error::Expired);
        }
        Ok(claims)
    }

    /// Verifies signature and issuer only; expired tokens are returned as is.
    pub fn inspect(&self, token: &str, key: &SigningKey) -> Result<TokenClaims, Error> {
        jsonwebtoken::decode::<TokenClaims>(token, &key.decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(decode_error)
    }
}

fn decode_error(e: jsonwebtoken::errors::Error) -> Error {
    match e.kind() {
        ErrorKind::InvalidSignature => Error::Signature,
        ErrorKind::InvalidIssuer => Error::Malformed("unexpected issuer".to_string()),
        _ => Error::Malformed(e.to_string()),
    }
}
