//! User account endpoints.

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{delete, get, post, put};
use axum::{Extension, Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use coffer_auth::{hash_password, verify_password, NewUser, TokenProvider, User, UserRole};
use coffer_core::UserId;
use coffer_infra::{AuditLog, EmailType};

use crate::compat::{ClientCompat, ClientInfo};
use crate::errors::ApiError;
use crate::middleware::{bearer_token, CurrentUser};
use crate::services::{issue_grant, rotate_or_reuse, TokenGrant};
use crate::state::AppState;

pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/users", post(create_user))
        .route("/users/me/token", get(get_user_token))
        .route("/users/:id/verify", post(verify_email_code))
        .route("/users/:id/code", post(resend_email_code))
        .route("/users/:email_id/unsubscribe", post(unsubscribe_user))
}

pub fn active_router() -> Router<AppState> {
    Router::new()
        .route("/users/me", get(read_me).put(update_me))
        .route("/users/:id/password", put(update_password))
        .route("/users/:id", delete(delete_user))
}

// ── Registration & verification ──────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateUserRequest {
    name: String,
    email: String,
    password: String,
    #[serde(default)]
    role_requested: Option<String>,
}

async fn create_user(
    State(state): State<AppState>,
    Json(req): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<User>), ApiError> {
    let users = state.users();

    if users.get_user_by_email(&req.email).await?.is_some() {
        return Err(ApiError::Conflict(
            "User already exist with that email".to_string(),
        ));
    }

    let roles = match req.role_requested.as_deref() {
        Some("consumer") => vec![UserRole::Consumer],
        Some("publisher") => vec![UserRole::Publisher],
        _ => Vec::new(),
    };

    let new = NewUser {
        email: req.email.clone(),
        name: req.name,
        roles,
        is_verified: false,
        password_hash: hash_password(&req.password)?,
    };

    let user_id = users.insert_user(&new).await.map_err(|e| {
        if e.is_unique_violation() {
            ApiError::Conflict("User already exist with that email".to_string())
        } else {
            ApiError::from(e)
        }
    })?;

    send_verification_email(&state, user_id, &req.email).await?;

    let user = users
        .get_user(user_id)
        .await?
        .ok_or_else(|| ApiError::Internal(format!("user {user_id} vanished after insert")))?;

    Ok((StatusCode::CREATED, Json(user)))
}

async fn send_verification_email(
    state: &AppState,
    user_id: UserId,
    to: &str,
) -> Result<(), ApiError> {
    let code = state
        .users()
        .generate_email_verification_code(user_id)
        .await?;

    let subject = format!("{} Verification", state.settings.email_tagline);
    let mail = state.templates.generate_email(
        &subject,
        "verification",
        &[("code".to_string(), code)],
    )?;

    state
        .mailer
        .sendmail(to, &mail.subject, &mail.text, Some(&mail.html))
        .await?;

    Ok(())
}

#[derive(Debug, Deserialize)]
struct VerifyEmailCode {
    code: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VerificationResponse {
    user: User,
    refresh_token: Option<String>,
    access_token: Option<String>,
}

async fn verify_email_code(
    State(state): State<AppState>,
    Path(id): Path<UserId>,
    Json(body): Json<VerifyEmailCode>,
) -> Result<Json<VerificationResponse>, ApiError> {
    let audit = state.audit();
    let result = verify_email_code_inner(&state, &audit, id, body).await;
    audit.submit_all().await;
    result
}

async fn verify_email_code_inner(
    state: &AppState,
    audit: &AuditLog,
    id: UserId,
    body: VerifyEmailCode,
) -> Result<Json<VerificationResponse>, ApiError> {
    let users = state.users();

    let log_failure = |status: i32, detail: &str, db_code: Option<&str>| {
        audit.error(
            "verification",
            Some(id),
            Some("POST /users/{id}/verify"),
            Some(status),
            serde_json::json!({
                "detail": detail,
                "receivedCode": body.code,
                "dbCode": db_code,
            }),
        );
    };

    let Some(pending) = users.get_unverified_user_by_id(id).await? else {
        log_failure(404, "User does not exist with that id", None);
        return Err(ApiError::NotFound(
            "User does not exist with that id".to_string(),
        ));
    };

    if pending.is_verified {
        let user = users
            .get_user(id)
            .await?
            .ok_or_else(|| ApiError::NotFound("User does not exist with that id".to_string()))?;
        return Ok(Json(VerificationResponse {
            user,
            refresh_token: None,
            access_token: None,
        }));
    }

    let Some(expires_at) = pending.code_expires_at else {
        log_failure(400, "Code has not been sent", pending.code.as_deref());
        return Err(ApiError::Validation("Code has not been sent".to_string()));
    };

    if Utc::now() > expires_at {
        log_failure(400, "Code has expired", pending.code.as_deref());
        return Err(ApiError::Validation("Code has expired".to_string()));
    }

    if pending.code.as_deref() != Some(body.code.as_str()) {
        log_failure(403, "Code does not match", pending.code.as_deref());
        return Err(ApiError::Forbidden("Code does not match".to_string()));
    }

    users.mark_verified(id).await?;

    let db_user = users
        .get_user_by_id(id)
        .await?
        .ok_or_else(|| ApiError::Internal(format!("user {id} vanished during verification")))?;

    let refresh = state.tokens().issue(id, TokenProvider::Native).await?;
    let grant = issue_grant(state, &db_user, true, Some(refresh.token))?;

    Ok(Json(VerificationResponse {
        user: grant.user,
        refresh_token: grant.refresh_token,
        access_token: Some(grant.access_token),
    }))
}

async fn resend_email_code(
    State(state): State<AppState>,
    Path(id): Path<UserId>,
) -> Result<(), ApiError> {
    let audit = state.audit();
    let users = state.users();

    let Some(pending) = users.get_unverified_user_by_id(id).await? else {
        audit.error(
            "verification",
            Some(id),
            Some("POST /users/{id}/code"),
            Some(404),
            serde_json::json!({ "detail": "User not found" }),
        );
        audit.submit_all().await;
        return Err(ApiError::NotFound("User not found".to_string()));
    };

    send_verification_email(&state, id, &pending.email).await
}

// ── Session ──────────────────────────────────────────────────────────────────

/// Bearer credential here is a *refresh* token, not an access token.
async fn get_user_token(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<TokenGrant>, ApiError> {
    let Some(refresh_token) = bearer_token(&headers) else {
        return Err(ApiError::Forbidden(
            "Attach refresh token via bearer auth".to_string(),
        ));
    };

    let audit = state.audit();
    let result = rotate_or_reuse(&state, &audit, refresh_token).await;
    audit.submit_all().await;

    result.map(Json)
}

// ── Profile ──────────────────────────────────────────────────────────────────

async fn read_me(
    State(state): State<AppState>,
    Extension(CurrentUser(claims)): Extension<CurrentUser>,
    headers: HeaderMap,
) -> Result<Json<User>, ApiError> {
    let user_id = claims.user_id()?;
    let user = state
        .users()
        .get_user(user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

    let client = ClientInfo::from_headers(&headers);
    Ok(Json(user.adapt(&client)))
}

#[derive(Debug, Deserialize)]
struct ProfileUpdate {
    name: String,
}

async fn update_me(
    State(state): State<AppState>,
    Extension(CurrentUser(claims)): Extension<CurrentUser>,
    Json(update): Json<ProfileUpdate>,
) -> Result<Json<User>, ApiError> {
    let user_id = claims.user_id()?;
    let users = state.users();

    users.update_user_from_app(user_id, &update.name).await?;

    let user = users
        .get_user(user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

    Ok(Json(user))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdatePassword {
    old_password: String,
    new_password: String,
}

async fn update_password(
    State(state): State<AppState>,
    Extension(CurrentUser(claims)): Extension<CurrentUser>,
    Path(id): Path<UserId>,
    Json(body): Json<UpdatePassword>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if claims.user_id()? != id {
        return Err(ApiError::Forbidden(
            "You do not have permission to update this user's password".to_string(),
        ));
    }

    let users = state.users();
    let Some(user) = users.get_user_by_id(id).await? else {
        return Err(ApiError::NotFound(
            "User does not exist with that id".to_string(),
        ));
    };

    if !verify_password(&body.old_password, &user.password_hash) {
        return Err(ApiError::Forbidden("Old password does not match".to_string()));
    }

    let new_hash = hash_password(&body.new_password)?;
    users.update_password(id, &new_hash).await?;

    Ok(Json(serde_json::json!({ "message": "Password updated" })))
}

// ── Deletion & unsubscribe ───────────────────────────────────────────────────

async fn delete_user(
    State(state): State<AppState>,
    Extension(CurrentUser(claims)): Extension<CurrentUser>,
    Path(id): Path<UserId>,
) -> Result<StatusCode, ApiError> {
    let audit = state.audit();
    let users = state.users();

    let Some(user) = users.get_user_by_id(id).await? else {
        audit.error(
            "deletion",
            Some(id),
            Some("DELETE /users/{id}"),
            Some(404),
            serde_json::json!({ "detail": "User does not exist with that id" }),
        );
        audit.submit_all().await;
        return Err(ApiError::NotFound(
            "User does not exist with that id".to_string(),
        ));
    };

    if claims.user_id()? != id && !claims.is_admin() {
        audit.error(
            "deletion",
            Some(id),
            Some("DELETE /users/{id}"),
            Some(403),
            serde_json::json!({
                "detail": "You do not have permission to delete this user",
                "attemptedDeleteEmail": user.email,
            }),
        );
        audit.submit_all().await;
        return Err(ApiError::Forbidden(
            "You do not have permission to delete this user".to_string(),
        ));
    }

    // Sever the Apple binding first so the identity cannot silently
    // re-login after the local account is gone.
    if let Some(apple) = &state.apple {
        let identities = users.get_sso_identities(id).await?;
        if identities.iter().any(|i| i.provider == "apple") {
            crate::routes::sso::revoke_apple_tokens(&state, apple, id).await?;
        }
    }

    users.delete_user(id).await?;
    audit.submit_all().await;

    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
struct UnsubscribeQuery {
    #[serde(rename = "type")]
    email_type: Option<String>,
}

async fn unsubscribe_user(
    State(state): State<AppState>,
    Path(email_id): Path<Uuid>,
    Query(query): Query<UnsubscribeQuery>,
) -> Result<(), ApiError> {
    let users = state.users();

    let Some(user) = users.get_user_by_email_id(email_id).await? else {
        return Err(ApiError::NotFound("User not found".to_string()));
    };

    let email_type = query.email_type.as_deref().and_then(EmailType::parse);
    users.unsubscribe_user(user.id, email_type).await?;

    Ok(())
}
