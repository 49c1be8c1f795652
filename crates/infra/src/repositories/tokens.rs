//! Refresh-token persistence.

use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use coffer_auth::{RefreshTokenRecord, TokenProvider};
use coffer_core::{now_unix, UnixTime, UserId};

use crate::db::StoreError;

const TOKEN_COLUMNS: &str =
    "id, refresh_token, provider, user_id, sso_id, issued_at, last_used";

#[derive(Clone)]
pub struct TokenRepository {
    pool: PgPool,
}

impl TokenRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Mint and persist a fresh token for the user.
    pub async fn issue(
        &self,
        user_id: UserId,
        provider: TokenProvider,
    ) -> Result<RefreshTokenRecord, StoreError> {
        let record = RefreshTokenRecord::generate(user_id, provider, now_unix());
        self.insert(&record).await?;
        Ok(record)
    }

    pub async fn insert(&self, record: &RefreshTokenRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO user_tokens
                (id, refresh_token, provider, user_id, sso_id, issued_at, last_used)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(&record.id)
        .bind(&record.token)
        .bind(record.provider.as_str())
        .bind(record.user_id.as_uuid())
        .bind(&record.sso_id)
        .bind(record.issued_at)
        .bind(record.last_used)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Provider and last-used time of a presented token value; `None` when
    /// the value is unknown.
    pub async fn provider_and_last_used(
        &self,
        refresh_token: &str,
    ) -> Result<Option<(TokenProvider, Option<UnixTime>)>, StoreError> {
        let row = sqlx::query(
            "SELECT provider, last_used FROM user_tokens WHERE refresh_token = $1",
        )
        .bind(refresh_token)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let provider: String = row.try_get("provider")?;
        let last_used: Option<i64> = row.try_get("last_used")?;

        // An unparseable provider tag is treated as unknown rather than a
        // server error; the token cannot be rotated safely.
        Ok(TokenProvider::parse(&provider).map(|p| (p, last_used)))
    }

    /// Bump the last-used timestamp of a token value.
    pub async fn mark_used(&self, refresh_token: &str) -> Result<(), StoreError> {
        sqlx::query("UPDATE user_tokens SET last_used = $1 WHERE refresh_token = $2")
            .bind(now_unix())
            .bind(refresh_token)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Replace a token value in place (federated rotation keeps the row
    /// and its identity binding).
    pub async fn replace_value(&self, old_value: &str, new_value: &str) -> Result<(), StoreError> {
        sqlx::query("UPDATE user_tokens SET refresh_token = $1 WHERE refresh_token = $2")
            .bind(new_value)
            .bind(old_value)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn update_value_by_id(&self, token_id: &str, new_value: &str) -> Result<(), StoreError> {
        sqlx::query("UPDATE user_tokens SET refresh_token = $1 WHERE id = $2")
            .bind(new_value)
            .bind(token_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Most recently issued token for a (user, provider) pair.
    pub async fn last_token_for(
        &self,
        user_id: UserId,
        provider: TokenProvider,
    ) -> Result<Option<RefreshTokenRecord>, StoreError> {
        let sql = format!(
            "SELECT {TOKEN_COLUMNS} FROM user_tokens
             WHERE user_id = $1 AND provider = $2
             ORDER BY issued_at DESC
             LIMIT 1"
        );
        let row = sqlx::query(&sql)
            .bind(user_id.as_uuid())
            .bind(provider.as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| map_token(&r)).transpose().map_err(StoreError::from)
    }

    pub async fn token_by_sso_id(
        &self,
        sso_id: &str,
    ) -> Result<Option<RefreshTokenRecord>, StoreError> {
        let sql = format!("SELECT {TOKEN_COLUMNS} FROM user_tokens WHERE sso_id = $1");
        let row = sqlx::query(&sql)
            .bind(sso_id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| map_token(&r)).transpose().map_err(StoreError::from)
    }
}

fn map_token(row: &PgRow) -> Result<RefreshTokenRecord, sqlx::Error> {
    let provider: String = row.try_get("provider")?;

    Ok(RefreshTokenRecord {
        id: row.try_get("id")?,
        token: row.try_get("refresh_token")?,
        // Rows are only written through TokenProvider; unknown tags fall
        // back to native, which rotates conservatively.
        provider: TokenProvider::parse(&provider).unwrap_or(TokenProvider::Native),
        user_id: UserId::from_uuid(row.try_get::<Uuid, _>("user_id")?),
        sso_id: row.try_get("sso_id")?,
        issued_at: row.try_get("issued_at")?,
        last_used: row.try_get("last_used")?,
    })
}
