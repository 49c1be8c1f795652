//! Credential login, logout and password reset.

use axum::extract::{Query, State};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use rand::Rng;
use serde::Deserialize;

use coffer_auth::{hash_password, UserRole};
use coffer_infra::{ActionTracker, AuditLog};

use crate::errors::ApiError;
use crate::services::{issue_grant, TokenGrant};
use crate::state::AppState;

// Guards against pathological argon2 inputs.
const MAX_PASSWORD_LEN: usize = 3172;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/login", post(login))
        .route("/logout", post(logout))
        .route("/password-reset", get(begin_password_reset).post(end_password_reset))
        .route("/user-roles", get(user_roles))
}

#[derive(Debug, Deserialize)]
struct LoginForm {
    username: String,
    password: String,
}

async fn login(
    State(state): State<AppState>,
    Form(form): Form<LoginForm>,
) -> Result<Json<TokenGrant>, ApiError> {
    let audit = state.audit();
    let email = form.username.to_lowercase();

    if form.password.len() >= MAX_PASSWORD_LEN {
        login_failure(&audit, &email, 400, "Password is too long").await;
        return Err(ApiError::Validation("Password is too long".to_string()));
    }

    let Some(user) = state.users().authenticate_user(&email, &form.password).await? else {
        login_failure(&audit, &email, 401, "Incorrect email or password").await;
        return Err(ApiError::Unauthorized(
            "Incorrect email or password".to_string(),
        ));
    };

    let refresh = state
        .tokens()
        .issue(user.id, coffer_auth::TokenProvider::Native)
        .await?;

    let tracker = ActionTracker::new(state.redis.clone(), Some(user.id));
    if let Err(e) = tracker.track("login", None).await {
        tracing::debug!("login action not tracked: {e}");
    }

    Ok(Json(issue_grant(&state, &user, true, Some(refresh.token))?))
}

async fn login_failure(audit: &AuditLog, email: &str, status: i32, detail: &str) {
    audit.error(
        "login",
        None,
        Some("/login"),
        Some(status),
        serde_json::json!({ "detail": detail, "email": email }),
    );
    audit.submit_all().await;
}

async fn logout() -> Json<serde_json::Value> {
    // Sessions are bearer-token based; the client drops its tokens.
    Json(serde_json::json!({ "message": "Logged out" }))
}

#[derive(Debug, Deserialize)]
struct BeginPasswordReset {
    email: String,
}

/// Start a password reset. Deliberately silent about whether the email
/// exists, with a small random delay so timing does not leak it either.
async fn begin_password_reset(
    State(state): State<AppState>,
    Query(query): Query<BeginPasswordReset>,
) -> Result<(), ApiError> {
    let pad_millis = rand::thread_rng().gen_range(0..1000u64);
    tokio::time::sleep(std::time::Duration::from_millis(pad_millis)).await;

    let Some(user) = state.users().get_user_by_email(&query.email).await? else {
        return Ok(());
    };

    let code = state.users().generate_password_reset(user.id).await?;
    let mail = state.templates.generate_password_reset(&code)?;
    state
        .mailer
        .sendmail(&user.email, &mail.subject, &mail.text, Some(&mail.html))
        .await?;

    Ok(())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EndPasswordReset {
    code: String,
    email: String,
    password: String,
}

async fn end_password_reset(
    State(state): State<AppState>,
    Json(req): Json<EndPasswordReset>,
) -> Result<(), ApiError> {
    if !state
        .users()
        .check_password_reset(&req.email, &req.code)
        .await?
    {
        return Err(ApiError::Forbidden(
            "Code and Email did not match.".to_string(),
        ));
    }

    let password_hash = hash_password(&req.password)?;
    state
        .users()
        .reset_password(&req.email, &password_hash)
        .await?;

    Ok(())
}

async fn user_roles() -> Json<Vec<&'static str>> {
    Json(UserRole::ALL.iter().map(|r| r.as_str()).collect())
}
