//! Redis-backed caches and action streams.

use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};

use coffer_auth::User;
use coffer_core::{now_unix, UnixTime, UserId};

/// Denormalized user records live as long as an access token, so a
/// restrict or role change becomes visible before the JWT expires.
const USER_CACHE_TTL_SECS: u64 = 2 * 60 * 60;

pub async fn connect_redis(redis_url: &str) -> Result<ConnectionManager, redis::RedisError> {
    let client = redis::Client::open(redis_url)?;
    ConnectionManager::new(client).await
}

/// Short-lived denormalized user records plus SSO nonce storage.
#[derive(Clone)]
pub struct UserCache {
    redis: ConnectionManager,
}

impl UserCache {
    pub fn new(redis: ConnectionManager) -> Self {
        Self { redis }
    }

    pub async fn put_user(&self, user: &User) -> Result<(), redis::RedisError> {
        let payload = match serde_json::to_string(user) {
            Ok(p) => p,
            Err(e) => {
                tracing::error!("user cache serialization failed: {e}");
                return Ok(());
            }
        };

        let mut conn = self.redis.clone();
        conn.set_ex(format!("users:{}", user.id), payload, USER_CACHE_TTL_SECS)
            .await
    }

    pub async fn get_user(&self, user_id: UserId) -> Result<Option<User>, redis::RedisError> {
        let mut conn = self.redis.clone();
        let raw: Option<String> = conn.get(format!("users:{user_id}")).await?;

        Ok(raw.and_then(|json| match serde_json::from_str(&json) {
            Ok(user) => Some(user),
            Err(e) => {
                tracing::warn!(%user_id, "dropping unreadable cached user: {e}");
                None
            }
        }))
    }

    /// Consume a single-use SSO nonce; true when it existed.
    pub async fn take_nonce(&self, nonce: &str) -> Result<bool, redis::RedisError> {
        let mut conn = self.redis.clone();
        let key = format!("nonce:{nonce}");
        let existing: Option<String> = conn.get(&key).await?;

        if existing.is_some() {
            let _: () = conn.del(&key).await?;
            return Ok(true);
        }
        Ok(false)
    }
}

/// A user action destined for the audit stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserAction {
    pub action: String,
    pub user_id: Option<UserId>,
    pub info: Option<serde_json::Value>,
    pub occurred_at: UnixTime,
    #[serde(default)]
    pub stream_id: Option<String>,
}

/// Appends action events to Redis streams; the stream worker drains them
/// into the database off the request path.
#[derive(Clone)]
pub struct ActionTracker {
    redis: ConnectionManager,
    user_id: Option<UserId>,
}

pub const USER_ACTIONS_STREAM: &str = "user-actions";
pub const TRANSACTIONS_STREAM: &str = "transactions";

impl ActionTracker {
    pub fn new(redis: ConnectionManager, user_id: Option<UserId>) -> Self {
        Self { redis, user_id }
    }

    pub async fn track(
        &self,
        action: &str,
        info: Option<serde_json::Value>,
    ) -> Result<(), redis::RedisError> {
        let event = UserAction {
            action: action.to_string(),
            user_id: self.user_id,
            info,
            occurred_at: now_unix(),
            stream_id: None,
        };

        let payload = match serde_json::to_string(&event) {
            Ok(p) => p,
            Err(e) => {
                tracing::error!("action serialization failed: {e}");
                return Ok(());
            }
        };

        let mut conn = self.redis.clone();
        let _: String = conn
            .xadd(USER_ACTIONS_STREAM, "*", &[("data", payload)])
            .await?;
        Ok(())
    }

    /// Queue a transaction for the background ledger writer.
    pub async fn track_transaction(
        &self,
        transaction: &serde_json::Value,
    ) -> Result<(), redis::RedisError> {
        let mut conn = self.redis.clone();
        let _: String = conn
            .xadd(TRANSACTIONS_STREAM, "*", &[("data", transaction.to_string())])
            .await?;
        Ok(())
    }
}
