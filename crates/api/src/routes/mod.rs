//! Router assembly.

pub mod admin;
pub mod auth;
pub mod bucket;
pub mod sso;
pub mod users;

use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use tower::ServiceBuilder;

use crate::middleware::{optional_claims, require_admin, require_user};
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    let protected = Router::new()
        .merge(users::active_router())
        .merge(bucket::user_router())
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            require_user,
        ));

    let admin_routes = Router::new()
        .merge(admin::router())
        .merge(bucket::admin_router())
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            require_admin,
        ))
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            require_user,
        ));

    Router::new()
        .route("/health", get(health))
        .merge(auth::router())
        .merge(sso::router())
        .merge(users::public_router())
        .merge(bucket::public_router())
        .merge(protected)
        .nest("/admin", admin_routes)
        .layer(
            ServiceBuilder::new().layer(axum::middleware::from_fn_with_state(
                state.clone(),
                optional_claims,
            )),
        )
        .with_state(state)
}

async fn health() -> StatusCode {
    StatusCode::OK
}
