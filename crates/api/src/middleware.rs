//! Authentication middleware and request contexts.

use axum::extract::State;
use axum::http::{header, HeaderMap, Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use coffer_auth::AccessClaims;

use crate::errors::{json_error, ApiError};
use crate::state::AppState;

/// Claims extracted from the bearer token, when one was presented and
/// valid. Inserted on every request.
#[derive(Clone)]
pub struct OptionalClaims(pub Option<AccessClaims>);

/// Authenticated caller context for protected routes.
#[derive(Clone)]
pub struct CurrentUser(pub AccessClaims);

/// Decode the bearer access token if present. Invalid or expired tokens
/// simply yield no claims; route guards decide whether that is fatal.
pub async fn optional_claims(
    State(state): State<AppState>,
    mut req: Request<axum::body::Body>,
    next: Next,
) -> Response {
    let claims = bearer_token(req.headers()).and_then(|token| match state.signer.verify(token) {
        Ok(claims) => Some(claims),
        Err(e) => {
            tracing::debug!("bearer token rejected: {e}");
            None
        }
    });

    req.extensions_mut().insert(OptionalClaims(claims));
    next.run(req).await
}

/// Require a valid, unrestricted caller.
///
/// The restricted flag is checked on the claims and against the Redis
/// user cache: an admin restricting an account takes effect here before
/// the account's JWT expires. Admins may act as another user via the
/// `x-emulated-user` header.
pub async fn require_user(
    State(state): State<AppState>,
    mut req: Request<axum::body::Body>,
    next: Next,
) -> Response {
    let Some(OptionalClaims(Some(mut claims))) =
        req.extensions().get::<OptionalClaims>().cloned()
    else {
        return json_error(
            StatusCode::UNAUTHORIZED,
            "unauthorized",
            "Could not validate credentials",
        );
    };

    let cached = match claims.user_id() {
        Ok(user_id) => state
            .user_cache()
            .get_user(user_id)
            .await
            .unwrap_or_else(|e| {
                tracing::warn!("user cache unavailable: {e}");
                None
            }),
        Err(_) => None,
    };

    if claims.restricted || cached.as_ref().is_some_and(|u| u.restricted) {
        return ApiError::Restricted.into_response();
    }

    if let Some(emulated) = emulated_user(req.headers()) {
        if claims.is_admin() {
            tracing::info!(%emulated, "admin emulating user");
            claims.sub = emulated;
        }
    }

    req.extensions_mut().insert(CurrentUser(claims));
    next.run(req).await
}

/// Require the admin role, cross-checked against the cached user record
/// so revocations apply without waiting out the JWT.
pub async fn require_admin(
    State(state): State<AppState>,
    req: Request<axum::body::Body>,
    next: Next,
) -> Response {
    let Some(CurrentUser(claims)) = req.extensions().get::<CurrentUser>().cloned() else {
        return json_error(
            StatusCode::UNAUTHORIZED,
            "unauthorized",
            "Could not validate credentials",
        );
    };

    let cached_roles = match claims.user_id() {
        Ok(user_id) => state
            .user_cache()
            .get_user(user_id)
            .await
            .ok()
            .flatten()
            .map(|u| u.roles),
        Err(_) => None,
    };

    let cache_denies = cached_roles
        .as_ref()
        .is_some_and(|roles| !roles.contains(&coffer_auth::UserRole::Admin));

    if cache_denies || !claims.is_admin() {
        return json_error(
            StatusCode::FORBIDDEN,
            "forbidden",
            "Admin privileges are required to do that.",
        );
    }

    next.run(req).await
}

pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let header = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let token = header.strip_prefix("Bearer ")?.trim();
    if token.is_empty() {
        return None;
    }
    Some(token)
}

fn emulated_user(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-emulated-user")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bearer_extraction_requires_the_scheme() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, "Bearer abc123".parse().unwrap());
        assert_eq!(bearer_token(&headers), Some("abc123"));

        headers.insert(header::AUTHORIZATION, "Basic abc123".parse().unwrap());
        assert_eq!(bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, "Bearer    ".parse().unwrap());
        assert_eq!(bearer_token(&headers), None);
    }
}
