//! Process-scoped access-token signer.
//!
//! The RS256 key pair is loaded once at startup and handed around by
//! reference; handlers never touch the filesystem for key material.

use jsonwebtoken::{decode, decode_header, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::claims::AccessClaims;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("signing key unavailable: {0}")]
    Key(String),

    #[error("token key id does not match the active signing key")]
    UnknownKeyId,

    #[error(transparent)]
    Jwt(#[from] jsonwebtoken::errors::Error),
}

/// RS256 signer/verifier bound to one key pair.
pub struct TokenSigner {
    encoding: EncodingKey,
    decoding: DecodingKey,
    kid: String,
}

impl TokenSigner {
    pub fn from_pem(private_pem: &[u8], public_pem: &[u8]) -> Result<Self, AuthError> {
        let encoding = EncodingKey::from_rsa_pem(private_pem)
            .map_err(|e| AuthError::Key(format!("private key: {e}")))?;
        let decoding = DecodingKey::from_rsa_pem(public_pem)
            .map_err(|e| AuthError::Key(format!("public key: {e}")))?;

        Ok(Self {
            encoding,
            decoding,
            kid: fingerprint_kid(public_pem),
        })
    }

    pub fn from_files(private_path: &str, public_path: &str) -> Result<Self, AuthError> {
        let private = std::fs::read(private_path)
            .map_err(|e| AuthError::Key(format!("{private_path}: {e}")))?;
        let public = std::fs::read(public_path)
            .map_err(|e| AuthError::Key(format!("{public_path}: {e}")))?;
        Self::from_pem(&private, &public)
    }

    pub fn kid(&self) -> &str {
        &self.kid
    }

    /// Sign a claim set into a compact JWT.
    pub fn issue(&self, claims: &AccessClaims) -> Result<String, AuthError> {
        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(self.kid.clone());
        Ok(encode(&header, claims, &self.encoding)?)
    }

    /// Verify signature, expiry and key id; returns the claims.
    pub fn verify(&self, token: &str) -> Result<AccessClaims, AuthError> {
        let header = decode_header(token)?;
        if header.kid.as_deref() != Some(self.kid.as_str()) {
            return Err(AuthError::UnknownKeyId);
        }

        let data = decode::<AccessClaims>(token, &self.decoding, &Validation::new(Algorithm::RS256))?;
        Ok(data.claims)
    }
}

/// Stable key id derived from the public key material.
fn fingerprint_kid(public_pem: &[u8]) -> String {
    let digest = Sha256::digest(public_pem);
    hex::encode(&digest[..8])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_stable_and_short() {
        let a = fingerprint_kid(b"-----BEGIN PUBLIC KEY-----");
        let b = fingerprint_kid(b"-----BEGIN PUBLIC KEY-----");
        let c = fingerprint_kid(b"different material");

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 16);
    }
}
