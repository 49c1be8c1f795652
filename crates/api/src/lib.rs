//! `coffer-api` — HTTP surface and process wiring.

pub mod compat;
pub mod config;
pub mod errors;
pub mod middleware;
pub mod routes;
pub mod services;
pub mod state;

pub use config::Settings;
pub use state::AppState;
