//! `coffer-auth` — identity, credentials and token primitives.
//!
//! Access tokens are short-lived RS256 JWTs; refresh tokens are opaque
//! random values rotated per provider policy. Persistence of users and
//! token rows lives in `coffer-infra`.

pub mod claims;
pub mod password;
pub mod refresh;
pub mod roles;
pub mod signer;
pub mod user;

pub use claims::{AccessClaims, ACCESS_TOKEN_TTL_MINUTES};
pub use password::{hash_password, verify_password};
pub use refresh::{native_rotation, NativeRotation, RefreshTokenRecord, TokenProvider};
pub use roles::UserRole;
pub use signer::{AuthError, TokenSigner};
pub use user::{DbUser, NewUser, SsoIdentity, UnverifiedUser, User};
