//! Admin user management.
//!
//! Every mutation refreshes the Redis user cache so role changes and
//! restrictions apply before the subject's access token expires.

use std::collections::HashMap;

use axum::extract::{Path, Query, State};
use axum::response::Html;
use axum::routing::{get, put};
use axum::{Json, Router};
use serde::Deserialize;

use coffer_auth::{User, UserRole};
use coffer_core::UserId;

use crate::errors::ApiError;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users))
        .route("/users/:id", get(get_user).put(update_user))
        .route("/users/:id/restrict", put(restrict_user))
        .route("/users/:id/un-restrict", put(un_restrict_user))
        .route("/test-email/:template", get(test_email))
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    offset: Option<i64>,
    limit: Option<i64>,
    search: Option<String>,
}

async fn list_users(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let (users, total) = state
        .users()
        .get_users(query.offset, query.limit, query.search.as_deref())
        .await?;

    Ok(Json(serde_json::json!({ "data": users, "total": total })))
}

async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<UserId>,
) -> Result<Json<User>, ApiError> {
    state
        .users()
        .get_user(id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AdminUserUpdate {
    roles: Vec<UserRole>,
    is_verified: bool,
}

async fn update_user(
    State(state): State<AppState>,
    Path(id): Path<UserId>,
    Json(update): Json<AdminUserUpdate>,
) -> Result<Json<User>, ApiError> {
    let Some(user) = state
        .users()
        .update_user(id, &update.roles, update.is_verified)
        .await?
    else {
        return Err(ApiError::NotFound("User not found".to_string()));
    };

    refresh_cached_user(&state, &user).await;
    Ok(Json(user))
}

async fn restrict_user(
    State(state): State<AppState>,
    Path(id): Path<UserId>,
) -> Result<(), ApiError> {
    state.users().restrict_user(id).await?;
    if let Some(user) = state.users().get_user(id).await? {
        refresh_cached_user(&state, &user).await;
    }
    Ok(())
}

async fn un_restrict_user(
    State(state): State<AppState>,
    Path(id): Path<UserId>,
) -> Result<(), ApiError> {
    state.users().un_restrict_user(id).await?;
    if let Some(user) = state.users().get_user(id).await? {
        refresh_cached_user(&state, &user).await;
    }
    Ok(())
}

async fn refresh_cached_user(state: &AppState, user: &User) {
    if let Err(e) = state.user_cache().put_user(user).await {
        tracing::warn!(user_id = %user.id, "user cache refresh failed: {e}");
    }
}

/// Render and send any template to an explicit recipient; returns the
/// rendered HTML for eyeballing.
async fn test_email(
    State(state): State<AppState>,
    Path(template): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Html<String>, ApiError> {
    let Some(to) = params.get("to").cloned() else {
        return Err(ApiError::Validation("query parameter 'to' is required".to_string()));
    };

    let vars: Vec<(String, String)> = params
        .iter()
        .filter(|(k, _)| k.as_str() != "to")
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    let mail = state
        .templates
        .generate_email("Test Email", &template, &vars)?;

    state
        .mailer
        .sendmail(&to, &mail.subject, &mail.text, Some(&mail.html))
        .await?;

    Ok(Html(mail.html))
}
