//! `coffer-sso` — federated identity providers (Apple, Google).
//!
//! Verifies provider-issued ID tokens against their published JWKS and
//! drives the outbound token-exchange endpoints. Key caching lives in
//! `coffer-infra`; this crate only consumes key sets.

pub mod apple;
pub mod google;
pub mod verifier;

pub use apple::{AppleAuthResponse, AppleSso};
pub use google::{google_verifier, GoogleClientIds, GOOGLE_ISSUERS};
pub use verifier::{IdTokenClaims, IdTokenVerifier};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SsoError {
    /// The presented ID token failed verification (signature, kid, aud,
    /// iss or expiry).
    #[error("invalid id token: {0}")]
    InvalidIdToken(String),

    /// The provider rejected or failed a call; carries the raw response
    /// so the failure surfaces with provider detail attached.
    #[error("{provider} returned {status}: {body}")]
    Provider {
        provider: &'static str,
        status: u16,
        body: String,
    },

    #[error("provider request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("client secret: {0}")]
    ClientSecret(String),
}
