//! Federated login endpoints.

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;

use coffer_auth::{
    DbUser, NewUser, RefreshTokenRecord, SsoIdentity, TokenProvider, UserRole,
};
use coffer_core::{now_unix, UserId};
use coffer_infra::AuditLog;
use coffer_sso::apple::APPLE_ISSUER;
use coffer_sso::{google_verifier, AppleSso, IdTokenVerifier};

use crate::errors::ApiError;
use crate::services::{issue_grant, TokenGrant};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/sso/apple", post(apple_login))
        .route("/sso/google", post(google_login))
}

// ── Google ───────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoogleSsoRequest {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    email: Option<String>,
    id_token: String,
    #[serde(default)]
    user_id: Option<String>,
}

async fn google_login(
    State(state): State<AppState>,
    Json(req): Json<GoogleSsoRequest>,
) -> Result<Json<TokenGrant>, ApiError> {
    let keys = state.sso_keys.google_keys().await;
    let verifier = google_verifier(keys, &state.google_client_ids);

    let claims = verifier.verify(&req.id_token).map_err(|e| {
        tracing::warn!("google id token rejected: {e}");
        ApiError::Unauthorized("Failed to authenticate via Google".to_string())
    })?;

    let email = claims.email.clone().or(req.email);
    let name = req.name.or(claims.name.clone());
    let sso_id = req.user_id.unwrap_or_else(|| claims.sub.clone());

    let users = state.users();

    if let Some(user) = users.get_user_by_sso_id(&sso_id).await? {
        let refresh = state.tokens().issue(user.id, TokenProvider::Native).await?;
        return Ok(Json(issue_grant(&state, &user, false, Some(refresh.token))?));
    }

    let Some(email) = email else {
        return Err(ApiError::Validation(
            "email is required for non-existent users".to_string(),
        ));
    };

    let user_id = find_or_create_user(&state, &email, name.as_deref()).await?;

    users
        .insert_sso_identity(&SsoIdentity {
            id: sso_id,
            provider: "google".to_string(),
            user_id,
        })
        .await?;

    let refresh = state.tokens().issue(user_id, TokenProvider::Native).await?;
    users.mark_verified(user_id).await?;

    let user = fetch_db_user(&state, user_id).await?;
    Ok(Json(issue_grant(&state, &user, false, Some(refresh.token))?))
}

// ── Apple ────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AppleSsoRequest {
    identity_token: String,
    authorization_code: String,
    #[serde(default)]
    user_id: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    first_name: Option<String>,
    #[serde(default)]
    last_name: Option<String>,
}

async fn apple_login(
    State(state): State<AppState>,
    Json(req): Json<AppleSsoRequest>,
) -> Result<Json<TokenGrant>, ApiError> {
    let audit = state.audit();
    let result = apple_login_inner(&state, &audit, req).await;
    audit.submit_all().await;
    result
}

async fn apple_login_inner(
    state: &AppState,
    audit: &AuditLog,
    req: AppleSsoRequest,
) -> Result<Json<TokenGrant>, ApiError> {
    let Some(apple) = state.apple.clone() else {
        return Err(ApiError::Integration {
            provider: "apple".to_string(),
            detail: "apple sso is not configured".to_string(),
        });
    };

    let sso_error = |detail: &str, status: i32| {
        audit.error(
            "sso",
            None,
            Some("/sso/apple"),
            Some(status),
            serde_json::json!({ "detail": detail }),
        );
    };

    let keys = state.sso_keys.apple_keys().await;
    let verifier = IdTokenVerifier::new(
        keys,
        vec![apple.services_id().to_string()],
        vec![APPLE_ISSUER.to_string()],
    );

    let claims = verifier.verify(&req.identity_token).map_err(|e| {
        tracing::warn!("apple id token rejected: {e}");
        sso_error("Failed to validate ID token from apple", 401);
        ApiError::Unauthorized("Failed to authenticate via Apple ID".to_string())
    })?;

    if let Some(req_user_id) = &req.user_id {
        if req_user_id != &claims.sub {
            sso_error("Apple SSO request user_id does not match ID token", 401);
            return Err(ApiError::Unauthorized(
                "Failed to authenticate via Apple ID".to_string(),
            ));
        }
    }

    if req.user_id.is_none() && claims.nonce.is_none() {
        sso_error("User ID or nonce required.", 400);
        return Err(ApiError::Validation("User ID or nonce required.".to_string()));
    }

    if let Some(nonce) = &claims.nonce {
        if !state.user_cache().take_nonce(nonce).await? {
            sso_error("nonce not available", 401);
            return Err(ApiError::Unauthorized("nonce not available".to_string()));
        }
    }

    if req.authorization_code.is_empty() {
        sso_error("Apple SSO request did not provide authorizationCode", 401);
        return Err(ApiError::Unauthorized(
            "Apple SSO request did not provide authorizationCode".to_string(),
        ));
    }

    let mut auth = apple
        .auth_from_code(&req.authorization_code, Some(claims.aud.as_str()))
        .await
        .map_err(|e| {
            tracing::warn!("apple code exchange failed: {e}");
            sso_error("Failed to authenticate via Apple ID", 401);
            ApiError::Unauthorized("Failed to authenticate via Apple ID".to_string())
        })?;

    let users = state.users();
    let tokens = state.tokens();

    if let Some(user) = users.get_user_by_sso_id(&claims.sub).await? {
        // Known identity: reuse or refresh the stored Apple token.
        let Some(req_user_id) = &req.user_id else {
            return Err(ApiError::Validation(
                "Apple SSO request user_id not provided.".to_string(),
            ));
        };

        let stored = tokens.token_by_sso_id(req_user_id).await?;

        match stored {
            None => {
                if let Some(value) = &auth.refresh_token {
                    insert_apple_token(&tokens, value, &claims.sub, user.id).await?;
                }
            }
            Some(stored) => {
                let reauth = apple.auth_from_refresh_token(&stored.token).await?;
                if let Some(rotated) = &reauth.refresh_token {
                    tokens.update_value_by_id(&stored.id, rotated).await?;
                }
                auth = reauth;
            }
        }

        return Ok(Json(issue_grant(state, &user, false, auth.refresh_token.clone())?));
    }

    // First login for this identity: provision the account.
    let Some(email) = &req.email else {
        return Err(ApiError::Validation(
            "email is required for non-existent users".to_string(),
        ));
    };

    let name = match (&req.first_name, &req.last_name) {
        (Some(first), Some(last)) => Some(format!("{first} {last}")),
        (Some(first), None) => Some(first.clone()),
        _ => None,
    };

    let user_id = find_or_create_user(state, email, name.as_deref()).await?;

    users
        .insert_sso_identity(&SsoIdentity {
            id: claims.sub.clone(),
            provider: "apple".to_string(),
            user_id,
        })
        .await?;

    if let Some(value) = &auth.refresh_token {
        insert_apple_token(&tokens, value, &claims.sub, user_id).await?;
    }

    users.mark_verified(user_id).await?;

    let user = fetch_db_user(state, user_id).await?;
    Ok(Json(issue_grant(state, &user, false, auth.refresh_token.clone())?))
}

// ── Shared provisioning ──────────────────────────────────────────────────────

/// SSO users arrive verified: the provider already proved the email.
async fn find_or_create_user(
    state: &AppState,
    email: &str,
    name: Option<&str>,
) -> Result<UserId, ApiError> {
    let users = state.users();

    if let Some(existing) = users.get_user_by_email(email).await? {
        return Ok(existing.id);
    }

    let new = NewUser {
        email: email.to_string(),
        name: name.unwrap_or("No Name Provided").to_string(),
        roles: vec![UserRole::Consumer],
        is_verified: true,
        password_hash: String::new(),
    };

    users.insert_user(&new).await.map_err(|e| {
        if e.is_unique_violation() {
            ApiError::Conflict("User already exist with that email".to_string())
        } else {
            e.into()
        }
    })
}

async fn insert_apple_token(
    tokens: &coffer_infra::TokenRepository,
    value: &str,
    sso_id: &str,
    user_id: UserId,
) -> Result<(), ApiError> {
    let mut record =
        RefreshTokenRecord::federated(value.to_string(), TokenProvider::Apple, user_id, now_unix());
    record.sso_id = Some(sso_id.to_string());
    tokens.insert(&record).await?;
    Ok(())
}

async fn fetch_db_user(state: &AppState, user_id: UserId) -> Result<DbUser, ApiError> {
    state
        .users()
        .get_user_by_id(user_id)
        .await?
        .ok_or_else(|| ApiError::Internal(format!("user {user_id} vanished during sso login")))
}

// Apple revocation on account deletion lives in the users routes; this
// module only authenticates.
pub async fn revoke_apple_tokens(state: &AppState, apple: &AppleSso, user_id: UserId) -> Result<(), ApiError> {
    if let Some(token) = state
        .tokens()
        .last_token_for(user_id, TokenProvider::Apple)
        .await?
    {
        apple.revoke_refresh_token(&token.token).await?;
    }
    Ok(())
}
