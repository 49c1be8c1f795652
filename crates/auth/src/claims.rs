//! Access-token claims.

use serde::{Deserialize, Serialize};

use coffer_core::{DomainError, UnixTime, UserId};

use crate::roles::UserRole;
use crate::user::DbUser;

/// Access-token lifetime.
pub const ACCESS_TOKEN_TTL_MINUTES: i64 = 120;

/// Claim set carried by an access token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Subject: user id.
    pub sub: String,
    pub roles: Vec<UserRole>,
    /// True only for tokens minted directly from credentials (not from a
    /// refresh-token exchange).
    pub fresh: bool,
    pub restricted: bool,
    pub exp: i64,
}

impl AccessClaims {
    /// Build the claim set for a user with the standard expiry.
    pub fn for_user(user: &DbUser, fresh: bool, now: UnixTime) -> Self {
        Self {
            sub: user.id.to_string(),
            roles: user.roles.clone(),
            fresh,
            restricted: user.restricted,
            exp: now + ACCESS_TOKEN_TTL_MINUTES * 60,
        }
    }

    pub fn user_id(&self) -> Result<UserId, DomainError> {
        self.sub.parse()
    }

    pub fn has_role(&self, role: UserRole) -> bool {
        self.roles.contains(&role)
    }

    pub fn is_admin(&self) -> bool {
        self.has_role(UserRole::Admin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn db_user() -> DbUser {
        DbUser {
            id: UserId::new(),
            email: "someone@example.com".to_string(),
            email_id: None,
            name: "Someone".to_string(),
            roles: vec![UserRole::Consumer, UserRole::Admin],
            is_verified: true,
            restricted: false,
            password_hash: "x".to_string(),
            sso_connections: vec![],
        }
    }

    #[test]
    fn claims_carry_subject_roles_and_expiry() {
        let user = db_user();
        let claims = AccessClaims::for_user(&user, true, 1_000);

        assert_eq!(claims.sub, user.id.to_string());
        assert_eq!(claims.exp, 1_000 + ACCESS_TOKEN_TTL_MINUTES * 60);
        assert!(claims.fresh);
        assert!(claims.is_admin());
        assert_eq!(claims.user_id().unwrap(), user.id);
    }

    #[test]
    fn restricted_flag_is_propagated() {
        let mut user = db_user();
        user.restricted = true;

        let claims = AccessClaims::for_user(&user, false, 0);
        assert!(claims.restricted);
        assert!(!claims.fresh);
    }
}
