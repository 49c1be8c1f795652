//! Provider JWKS caching.
//!
//! Key sets are fetched from the providers and cached in Redis; a failed
//! refresh keeps serving the stale set rather than dropping logins.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::jwk::Jwk;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

const APPLE_KEYS_URL: &str = "https://appleid.apple.com/auth/keys";
const GOOGLE_KEYS_URL: &str = "https://www.googleapis.com/oauth2/v3/certs";

#[derive(Clone)]
pub struct SsoKeyCache {
    redis: ConnectionManager,
    http: reqwest::Client,
}

impl SsoKeyCache {
    pub fn new(redis: ConnectionManager) -> Self {
        Self {
            redis,
            http: reqwest::Client::new(),
        }
    }

    pub async fn apple_keys(&self) -> Vec<Jwk> {
        self.cached_keys("apple", APPLE_KEYS_URL, Duration::hours(12))
            .await
    }

    pub async fn google_keys(&self) -> Vec<Jwk> {
        self.cached_keys("google", GOOGLE_KEYS_URL, Duration::hours(6))
            .await
    }

    async fn cached_keys(&self, provider: &str, url: &str, ttl: Duration) -> Vec<Jwk> {
        let mut conn = self.redis.clone();
        let keys_key = format!("{provider}_keys:keys");
        let expiration_key = format!("{provider}_keys:expiration");

        let cached: Option<String> = conn.get(&keys_key).await.ok().flatten();
        let expiration: Option<String> = conn.get(&expiration_key).await.ok().flatten();

        let stale = match expiration.as_deref().map(DateTime::parse_from_rfc3339) {
            Some(Ok(at)) => at.with_timezone(&Utc) <= Utc::now(),
            _ => true,
        };

        let mut keys: Vec<Jwk> = cached
            .as_deref()
            .and_then(|json| serde_json::from_str(json).ok())
            .unwrap_or_default();

        if keys.is_empty() || stale {
            match self.fetch_keys(url).await {
                Ok(fresh) => {
                    if let Ok(json) = serde_json::to_string(&fresh) {
                        let _: Result<(), _> = conn.set(&keys_key, json).await;
                        let _: Result<(), _> = conn
                            .set(&expiration_key, (Utc::now() + ttl).to_rfc3339())
                            .await;
                    }
                    keys = fresh;
                }
                Err(e) => {
                    tracing::warn!(provider, "could not refresh provider keys, keeping stale set: {e}");
                }
            }
        }

        keys
    }

    async fn fetch_keys(&self, url: &str) -> Result<Vec<Jwk>, reqwest::Error> {
        #[derive(serde::Deserialize)]
        struct KeySet {
            keys: Vec<Jwk>,
        }

        let set: KeySet = self.http.get(url).send().await?.json().await?;
        Ok(set.keys)
    }
}
