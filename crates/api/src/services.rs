//! Token/session orchestration.

use serde::Serialize;

use coffer_auth::{native_rotation, AccessClaims, DbUser, NativeRotation, TokenProvider, User};
use coffer_core::now_unix;
use coffer_infra::AuditLog;
use coffer_sso::SsoError;

use crate::errors::ApiError;
use crate::state::AppState;

/// Token response shape shared by login, SSO and refresh endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct TokenGrant {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub token_type: &'static str,
    pub user: User,
}

/// Sign an access token and assemble the grant envelope.
pub fn issue_grant(
    state: &AppState,
    user: &DbUser,
    fresh: bool,
    refresh_token: Option<String>,
) -> Result<TokenGrant, ApiError> {
    let claims = AccessClaims::for_user(user, fresh, now_unix());
    let access_token = state.signer.issue(&claims)?;

    Ok(TokenGrant {
        access_token,
        refresh_token,
        token_type: "bearer",
        user: user.to_user(),
    })
}

/// Exchange a refresh token for an access token, rotating the refresh
/// token per provider policy.
///
/// Order matters: the account's restricted flag is checked before any
/// token is minted or rotated, and an unknown value mints nothing.
pub async fn rotate_or_reuse(
    state: &AppState,
    audit: &AuditLog,
    presented: &str,
) -> Result<TokenGrant, ApiError> {
    let tokens = state.tokens();
    let users = state.users();

    let Some((provider, last_used)) = tokens.provider_and_last_used(presented).await? else {
        return Err(ApiError::InvalidRefreshToken);
    };

    let Some(user) = users.get_user_by_refresh_token(presented).await? else {
        audit.error(
            "token",
            None,
            Some("GET /users/me/token"),
            Some(401),
            serde_json::json!({ "detail": "no user for refresh token" }),
        );
        return Err(ApiError::InvalidRefreshToken);
    };

    if user.restricted {
        return Err(ApiError::Restricted);
    }

    let returned = match provider {
        TokenProvider::Apple => {
            let Some(apple) = &state.apple else {
                return Err(ApiError::Integration {
                    provider: "apple".to_string(),
                    detail: "apple sso is not configured".to_string(),
                });
            };

            // Apple validates the token for us; a 400 means the token is
            // dead, anything else is Apple's problem and surfaces as such.
            let auth = apple.auth_from_refresh_token(presented).await.map_err(|e| {
                match e {
                    SsoError::Provider { status: 400, .. } => ApiError::InvalidRefreshToken,
                    other => ApiError::from(other),
                }
            })?;

            tokens.mark_used(presented).await?;

            match auth.refresh_token {
                Some(rotated) => {
                    tokens.replace_value(presented, &rotated).await?;
                    rotated
                }
                None => presented.to_string(),
            }
        }

        // Google logins are issued native rows at login time, so any
        // google-tagged row rotates like a native one.
        TokenProvider::Native | TokenProvider::Google => {
            match native_rotation(last_used, now_unix()) {
                NativeRotation::Reuse => {
                    tokens.mark_used(presented).await?;
                    presented.to_string()
                }
                NativeRotation::Rotate => tokens.issue(user.id, TokenProvider::Native).await?.token,
            }
        }
    };

    issue_grant(state, &user, false, Some(returned))
}
