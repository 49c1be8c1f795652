//! Apple Sign-In: client-secret minting and the auth token endpoints.

use chrono::Utc;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};

use crate::SsoError;

pub const APPLE_ISSUER: &str = "https://appleid.apple.com";
const AUTH_TOKEN_URL: &str = "https://appleid.apple.com/auth/token";
const REVOKE_URL: &str = "https://appleid.apple.com/auth/revoke";

/// Client secrets are short-lived signed assertions.
const CLIENT_SECRET_TTL_SECS: i64 = 300;

/// Claims of the ES256 client-secret assertion Apple expects.
#[derive(Debug, Serialize)]
struct ClientSecretClaims<'a> {
    iss: &'a str,
    iat: i64,
    exp: i64,
    aud: &'a str,
    sub: &'a str,
}

/// Response of Apple's `auth/token` endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct AppleAuthResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
    /// Present only when Apple rotates the refresh token.
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub id_token: String,
}

/// Outbound Apple Sign-In client.
///
/// The signing key is loaded once at construction; each call mints a
/// fresh short-lived client secret.
pub struct AppleSso {
    team_id: String,
    services_id: String,
    key_id: String,
    signing_key: EncodingKey,
    http: reqwest::Client,
}

impl AppleSso {
    pub fn new(
        team_id: String,
        services_id: String,
        key_id: String,
        private_key_pem: &[u8],
    ) -> Result<Self, SsoError> {
        let signing_key = EncodingKey::from_ec_pem(private_key_pem)
            .map_err(|e| SsoError::ClientSecret(format!("apple signing key: {e}")))?;

        Ok(Self {
            team_id,
            services_id,
            key_id,
            signing_key,
            http: reqwest::Client::new(),
        })
    }

    pub fn services_id(&self) -> &str {
        &self.services_id
    }

    fn client_secret(&self, client_id: &str) -> Result<String, SsoError> {
        let now = Utc::now().timestamp();
        let claims = ClientSecretClaims {
            iss: &self.team_id,
            iat: now,
            exp: now + CLIENT_SECRET_TTL_SECS,
            aud: APPLE_ISSUER,
            sub: client_id,
        };

        let mut header = Header::new(Algorithm::ES256);
        header.kid = Some(self.key_id.clone());

        encode(&header, &claims, &self.signing_key)
            .map_err(|e| SsoError::ClientSecret(e.to_string()))
    }

    async fn token_request(&self, form: &[(&str, &str)]) -> Result<AppleAuthResponse, SsoError> {
        let res = self.http.post(AUTH_TOKEN_URL).form(form).send().await?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            tracing::warn!(status = status.as_u16(), %body, "apple auth request failed");
            return Err(SsoError::Provider {
                provider: "apple",
                status: status.as_u16(),
                body,
            });
        }

        Ok(res.json().await?)
    }

    /// Exchange an authorization code for tokens.
    pub async fn auth_from_code(
        &self,
        authorization_code: &str,
        client_id: Option<&str>,
    ) -> Result<AppleAuthResponse, SsoError> {
        let client_id = client_id.unwrap_or(&self.services_id);
        let secret = self.client_secret(client_id)?;

        self.token_request(&[
            ("client_id", client_id),
            ("client_secret", &secret),
            ("code", authorization_code),
            ("grant_type", "authorization_code"),
        ])
        .await
    }

    /// Refresh against Apple; a rotated refresh token comes back in the
    /// response when Apple decides to issue one.
    pub async fn auth_from_refresh_token(
        &self,
        refresh_token: &str,
    ) -> Result<AppleAuthResponse, SsoError> {
        let secret = self.client_secret(&self.services_id)?;

        self.token_request(&[
            ("client_id", self.services_id.as_str()),
            ("client_secret", &secret),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ])
        .await
    }

    /// Revoke a refresh token (account deletion).
    pub async fn revoke_refresh_token(&self, refresh_token: &str) -> Result<(), SsoError> {
        let secret = self.client_secret(&self.services_id)?;

        let res = self
            .http
            .post(REVOKE_URL)
            .form(&[
                ("client_id", self.services_id.as_str()),
                ("client_secret", &secret),
                ("token", refresh_token),
                ("token_type_hint", "refresh_token"),
            ])
            .send()
            .await?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(SsoError::Provider {
                provider: "apple",
                status: status.as_u16(),
                body,
            });
        }

        Ok(())
    }
}
