//! Opaque refresh tokens and the rotation policy.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use rand::RngCore;
use serde::{Deserialize, Serialize};

use coffer_core::{UnixTime, UserId};

use crate::claims::ACCESS_TOKEN_TTL_MINUTES;

/// Issuer of a refresh token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenProvider {
    /// Our own password/verification flows. One row per login session.
    Native,
    Apple,
    Google,
}

impl TokenProvider {
    pub fn as_str(self) -> &'static str {
        match self {
            TokenProvider::Native => "native",
            TokenProvider::Apple => "apple",
            TokenProvider::Google => "google",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "native" => Some(TokenProvider::Native),
            "apple" => Some(TokenProvider::Apple),
            "google" => Some(TokenProvider::Google),
            _ => None,
        }
    }

    pub fn is_federated(self) -> bool {
        !matches!(self, TokenProvider::Native)
    }
}

/// A stored refresh-token row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefreshTokenRecord {
    /// Opaque row identifier.
    pub id: String,
    /// The secret value presented by clients.
    pub token: String,
    pub provider: TokenProvider,
    pub user_id: UserId,
    /// Federated identity this token is bound to, when applicable.
    pub sso_id: Option<String>,
    pub issued_at: UnixTime,
    pub last_used: Option<UnixTime>,
}

impl RefreshTokenRecord {
    /// Mint a new record with a random id (24 raw bytes) and secret value
    /// (64 raw bytes), both base64-encoded.
    pub fn generate(user_id: UserId, provider: TokenProvider, now: UnixTime) -> Self {
        Self {
            id: random_b64(24),
            token: random_b64(64),
            provider,
            user_id,
            sso_id: None,
            issued_at: now,
            last_used: Some(now),
        }
    }

    /// Wrap a provider-issued refresh token (federated logins store the
    /// provider's value verbatim, keyed by itself).
    pub fn federated(token: String, provider: TokenProvider, user_id: UserId, now: UnixTime) -> Self {
        Self {
            id: token.clone(),
            token,
            provider,
            user_id,
            sso_id: None,
            issued_at: now,
            last_used: Some(now),
        }
    }
}

fn random_b64(len: usize) -> String {
    let mut buf = vec![0u8; len];
    rand::rngs::OsRng.fill_bytes(&mut buf);
    BASE64.encode(buf)
}

/// Outcome of presenting a native refresh token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeRotation {
    /// Rapid re-use (e.g. a page double-submit): keep the same token.
    Reuse,
    /// Normal cadence: mint and return a replacement token.
    Rotate,
}

/// Native tokens rotate unless they were used within half the
/// access-token lifetime.
pub fn native_rotation(last_used: Option<UnixTime>, now: UnixTime) -> NativeRotation {
    let window = ACCESS_TOKEN_TTL_MINUTES * 60 / 2;
    match last_used {
        Some(t) if t > now - window => NativeRotation::Reuse,
        _ => NativeRotation::Rotate,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: i64 = ACCESS_TOKEN_TTL_MINUTES * 60 / 2;

    #[test]
    fn reuse_within_half_the_access_token_lifetime() {
        let now = 1_700_000_000;
        assert_eq!(native_rotation(Some(now - 1), now), NativeRotation::Reuse);
        assert_eq!(
            native_rotation(Some(now - WINDOW + 1), now),
            NativeRotation::Reuse
        );
    }

    #[test]
    fn rotate_after_the_window_or_without_history() {
        let now = 1_700_000_000;
        assert_eq!(
            native_rotation(Some(now - WINDOW), now),
            NativeRotation::Rotate
        );
        assert_eq!(
            native_rotation(Some(now - WINDOW - 100), now),
            NativeRotation::Rotate
        );
        assert_eq!(native_rotation(None, now), NativeRotation::Rotate);
    }

    #[test]
    fn generated_tokens_are_distinct_and_sized() {
        let a = RefreshTokenRecord::generate(UserId::new(), TokenProvider::Native, 0);
        let b = RefreshTokenRecord::generate(UserId::new(), TokenProvider::Native, 0);

        assert_ne!(a.token, b.token);
        assert_ne!(a.id, b.id);
        // base64 of 24 and 64 raw bytes
        assert_eq!(a.id.len(), 32);
        assert_eq!(a.token.len(), 88);
        assert_eq!(a.issued_at, 0);
        assert_eq!(a.last_used, Some(0));
    }

    #[test]
    fn federated_records_key_themselves_by_the_provider_value() {
        let rec = RefreshTokenRecord::federated(
            "apple-token".to_string(),
            TokenProvider::Apple,
            UserId::new(),
            42,
        );
        assert_eq!(rec.id, rec.token);
        assert_eq!(rec.provider, TokenProvider::Apple);
    }
}
