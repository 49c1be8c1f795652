//! User account models.
//!
//! `User` is the wire/cache shape; `DbUser` additionally carries the
//! password hash and only ever crosses repository boundaries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use coffer_core::UserId;

use crate::roles::UserRole;

/// Public user record (API responses, Redis cache).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    pub email: String,
    /// Opaque id used in unsubscribe links so the primary id never leaks
    /// into mail bodies.
    #[serde(default)]
    pub email_id: Option<Uuid>,
    pub name: String,
    #[serde(default)]
    pub is_verified: bool,
    #[serde(default)]
    pub restricted: bool,
    #[serde(default)]
    pub roles: Vec<UserRole>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub sso_connections: Vec<String>,
    #[serde(default)]
    pub has_password: bool,
}

/// User record as read by authentication paths.
#[derive(Debug, Clone, PartialEq)]
pub struct DbUser {
    pub id: UserId,
    pub email: String,
    pub email_id: Option<Uuid>,
    pub name: String,
    pub roles: Vec<UserRole>,
    pub is_verified: bool,
    pub restricted: bool,
    pub password_hash: String,
    pub sso_connections: Vec<String>,
}

impl DbUser {
    /// Strip credential material for the wire.
    pub fn to_user(&self) -> User {
        User {
            id: self.id,
            email: self.email.clone(),
            email_id: self.email_id,
            name: self.name.clone(),
            is_verified: self.is_verified,
            restricted: self.restricted,
            roles: self.roles.clone(),
            created_at: None,
            sso_connections: self.sso_connections.clone(),
            has_password: !self.password_hash.is_empty(),
        }
    }
}

/// Input for creating an account.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub name: String,
    pub roles: Vec<UserRole>,
    pub is_verified: bool,
    pub password_hash: String,
}

/// User joined with their pending verification code, if any.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnverifiedUser {
    pub id: UserId,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub is_verified: bool,
    #[serde(skip_serializing)]
    pub code: Option<String>,
    #[serde(skip_serializing)]
    pub code_expires_at: Option<DateTime<Utc>>,
}

/// Link between a federated identity and a local account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SsoIdentity {
    /// Provider-assigned subject (Apple/Google `sub`).
    pub id: String,
    pub provider: String,
    pub user_id: UserId,
}
