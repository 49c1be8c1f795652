//! `coffer-infra` — persistence, cache and background workers.
//!
//! Repositories own the SQL and map rows into the domain models with
//! explicit per-entity mapping functions; nothing above this crate sees
//! `sqlx` types.

pub mod audit;
pub mod bucket;
pub mod cache;
pub mod db;
pub mod repositories;
pub mod sso_keys;
pub mod workers;

pub use audit::AuditLog;
pub use bucket::{BucketArea, BucketError, FileBucket};
pub use cache::{connect_redis, ActionTracker, UserCache};
pub use db::{connect_pool, StoreError};
pub use repositories::automated_emails::{AutomatedEmail, AutomatedEmailsRepository, EmailType};
pub use repositories::tokens::TokenRepository;
pub use repositories::transactions::TransactionsRepository;
pub use repositories::users::UserRepository;
pub use sso_keys::SsoKeyCache;
