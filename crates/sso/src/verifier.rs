//! Provider ID-token verification.

use jsonwebtoken::jwk::Jwk;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde::Deserialize;

use crate::SsoError;

/// Claims we consume from a provider ID token.
#[derive(Debug, Clone, Deserialize)]
pub struct IdTokenClaims {
    pub sub: String,
    pub aud: String,
    pub iss: String,
    pub exp: i64,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub nonce: Option<String>,
}

/// Verifies ID tokens against a provider key set and the expected
/// audience/issuer values.
pub struct IdTokenVerifier {
    keys: Vec<Jwk>,
    audiences: Vec<String>,
    issuers: Vec<String>,
}

impl IdTokenVerifier {
    pub fn new(keys: Vec<Jwk>, audiences: Vec<String>, issuers: Vec<String>) -> Self {
        Self {
            keys,
            audiences,
            issuers,
        }
    }

    /// Verify signature (matching the token's `kid` against the key set),
    /// audience, issuer and expiry.
    pub fn verify(&self, token: &str) -> Result<IdTokenClaims, SsoError> {
        let header =
            decode_header(token).map_err(|e| SsoError::InvalidIdToken(e.to_string()))?;

        let kid = header
            .kid
            .ok_or_else(|| SsoError::InvalidIdToken("token has no kid".to_string()))?;

        let jwk = self
            .keys
            .iter()
            .find(|k| k.common.key_id.as_deref() == Some(kid.as_str()))
            .ok_or_else(|| {
                SsoError::InvalidIdToken(format!("no provider key matches kid {kid}"))
            })?;

        let key = DecodingKey::from_jwk(jwk)
            .map_err(|e| SsoError::InvalidIdToken(format!("provider key: {e}")))?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(&self.audiences);
        validation.set_issuer(&self.issuers);

        let data = decode::<IdTokenClaims>(token, &key, &validation)
            .map_err(|e| SsoError::InvalidIdToken(e.to_string()))?;

        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn verifier() -> IdTokenVerifier {
        IdTokenVerifier::new(
            vec![],
            vec!["app.coffer.client".to_string()],
            vec!["https://accounts.example.com".to_string()],
        )
    }

    #[test]
    fn malformed_tokens_are_rejected() {
        let err = verifier().verify("not-a-jwt").unwrap_err();
        assert!(matches!(err, SsoError::InvalidIdToken(_)));
    }

    #[test]
    fn tokens_without_a_matching_kid_are_rejected() {
        // A structurally valid but unsigned-by-us token: header/payload are
        // base64 JSON, signature is junk.
        let token = concat!(
            "eyJhbGciOiJSUzI1NiIsImtpZCI6Im5vcGUifQ.",
            "eyJzdWIiOiJ4In0.",
            "c2ln"
        );
        let err = verifier().verify(token).unwrap_err();
        match err {
            SsoError::InvalidIdToken(msg) => assert!(msg.contains("kid")),
            other => panic!("unexpected error: {other}"),
        }
    }
}
