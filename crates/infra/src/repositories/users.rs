//! User account persistence.

use chrono::{DateTime, Duration, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, QueryBuilder, Row};
use uuid::Uuid;

use coffer_auth::{verify_password, DbUser, NewUser, SsoIdentity, UnverifiedUser, User, UserRole};
use coffer_core::UserId;

use crate::db::StoreError;
use crate::repositories::automated_emails::EmailType;

const VERIFICATION_CODE_TTL_MINUTES: i64 = 15;
const PASSWORD_RESET_TTL_MINUTES: i64 = 15;

const DB_USER_COLUMNS: &str = r#"
    u.id, u.email, u.email_id, u.name, u.roles, u.password_hash,
    u.is_verified, u.restricted,
    ARRAY_AGG(su.provider) FILTER (WHERE su.provider IS NOT NULL) AS sso_connections
"#;

#[derive(Clone)]
pub struct UserRepository {
    pool: PgPool,
}

impl UserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    // ── Listing / lookups ────────────────────────────────────────────────

    /// Admin listing with optional paging and email/name search; returns
    /// the page and the total count.
    pub async fn get_users(
        &self,
        offset: Option<i64>,
        limit: Option<i64>,
        search: Option<&str>,
    ) -> Result<(Vec<User>, i64), StoreError> {
        let pattern = search.map(|s| format!("%{s}%"));

        let mut count_query: QueryBuilder<sqlx::Postgres> = QueryBuilder::new(
            "SELECT COUNT(1) AS count FROM users u WHERE u.deleted_at IS NULL",
        );
        if let Some(pattern) = &pattern {
            count_query
                .push(" AND (u.email ILIKE ")
                .push_bind(pattern)
                .push(" OR u.name ILIKE ")
                .push_bind(pattern)
                .push(")");
        }
        let total: i64 = count_query
            .build()
            .fetch_one(&self.pool)
            .await?
            .try_get("count")?;

        let mut list_query: QueryBuilder<sqlx::Postgres> = QueryBuilder::new(
            r#"
            SELECT u.id, u.email, u.email_id, u.name, u.roles, u.is_verified,
                   u.restricted, u.created_at
            FROM users u
            WHERE u.deleted_at IS NULL
            "#,
        );
        if let Some(pattern) = &pattern {
            list_query
                .push(" AND (u.email ILIKE ")
                .push_bind(pattern)
                .push(" OR u.name ILIKE ")
                .push_bind(pattern)
                .push(")");
        }
        list_query.push(" ORDER BY u.created_at DESC");
        if let Some(limit) = limit {
            list_query.push(" LIMIT ").push_bind(limit);
        }
        if let Some(offset) = offset {
            list_query.push(" OFFSET ").push_bind(offset);
        }

        let rows = list_query.build().fetch_all(&self.pool).await?;
        let users = rows
            .iter()
            .map(map_user_summary)
            .collect::<Result<Vec<_>, _>>()?;

        Ok((users, total))
    }

    /// Full public record with SSO connections and password presence.
    pub async fn get_user(&self, user_id: UserId) -> Result<Option<User>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT u.id, u.email, u.email_id, u.name, u.roles, u.is_verified,
                   u.restricted, u.created_at,
                   ARRAY_AGG(su.provider) FILTER (WHERE su.provider IS NOT NULL) AS sso_connections,
                   (u.password_hash IS NOT NULL AND u.password_hash <> '') AS has_password
            FROM users u
            LEFT JOIN sso_users su ON su.user_id = u.id
            WHERE u.id = $1 AND u.deleted_at IS NULL
            GROUP BY u.id
            "#,
        )
        .bind(user_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| map_user(&r)).transpose().map_err(StoreError::from)
    }

    pub async fn get_user_by_id(&self, user_id: UserId) -> Result<Option<DbUser>, StoreError> {
        let sql = format!(
            "SELECT {DB_USER_COLUMNS}
             FROM users u
             LEFT JOIN sso_users su ON su.user_id = u.id
             WHERE u.id = $1 AND u.deleted_at IS NULL
             GROUP BY u.id"
        );
        let row = sqlx::query(&sql)
            .bind(user_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| map_db_user(&r)).transpose().map_err(StoreError::from)
    }

    pub async fn get_user_by_email(&self, email: &str) -> Result<Option<DbUser>, StoreError> {
        let sql = format!(
            "SELECT {DB_USER_COLUMNS}
             FROM users u
             LEFT JOIN sso_users su ON su.user_id = u.id
             WHERE u.email = $1 AND u.deleted_at IS NULL
             GROUP BY u.id"
        );
        let row = sqlx::query(&sql)
            .bind(email.to_lowercase())
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| map_db_user(&r)).transpose().map_err(StoreError::from)
    }

    pub async fn get_user_by_email_id(&self, email_id: Uuid) -> Result<Option<DbUser>, StoreError> {
        let sql = format!(
            "SELECT {DB_USER_COLUMNS}
             FROM users u
             LEFT JOIN sso_users su ON su.user_id = u.id
             WHERE u.email_id = $1 AND u.deleted_at IS NULL
             GROUP BY u.id"
        );
        let row = sqlx::query(&sql)
            .bind(email_id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| map_db_user(&r)).transpose().map_err(StoreError::from)
    }

    /// Resolve the account linked to a federated subject id.
    pub async fn get_user_by_sso_id(&self, sso_id: &str) -> Result<Option<DbUser>, StoreError> {
        let sql = format!(
            "SELECT {DB_USER_COLUMNS}
             FROM users u
             LEFT JOIN sso_users su ON su.user_id = u.id
             WHERE u.id = (SELECT user_id FROM sso_users WHERE id = $1)
               AND u.deleted_at IS NULL
             GROUP BY u.id"
        );
        let row = sqlx::query(&sql)
            .bind(sso_id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| map_db_user(&r)).transpose().map_err(StoreError::from)
    }

    pub async fn get_user_by_refresh_token(
        &self,
        refresh_token: &str,
    ) -> Result<Option<DbUser>, StoreError> {
        let sql = format!(
            "SELECT {DB_USER_COLUMNS}
             FROM users u
             INNER JOIN user_tokens ut ON ut.user_id = u.id
             LEFT JOIN sso_users su ON su.user_id = u.id
             WHERE ut.refresh_token = $1 AND u.deleted_at IS NULL
             GROUP BY u.id"
        );
        let row = sqlx::query(&sql)
            .bind(refresh_token)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| map_db_user(&r)).transpose().map_err(StoreError::from)
    }

    // ── Mutation ─────────────────────────────────────────────────────────

    /// Insert a new account. Emails are case-folded; a duplicate surfaces
    /// as a unique violation for the caller to map to a conflict.
    pub async fn insert_user(&self, new: &NewUser) -> Result<UserId, StoreError> {
        let id = UserId::new();
        let now = Utc::now();
        let roles: Vec<String> = new.roles.iter().map(|r| r.as_str().to_string()).collect();

        sqlx::query(
            r#"
            INSERT INTO users
                (id, email, name, roles, is_verified, password_hash,
                 created_at, updated_at, restricted)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $7, false)
            "#,
        )
        .bind(id.as_uuid())
        .bind(new.email.to_lowercase())
        .bind(&new.name)
        .bind(&roles)
        .bind(new.is_verified)
        .bind(&new.password_hash)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(id)
    }

    /// Self-service profile update (name only).
    pub async fn update_user_from_app(&self, user_id: UserId, name: &str) -> Result<(), StoreError> {
        sqlx::query("UPDATE users SET name = $1, updated_at = $2 WHERE id = $3")
            .bind(name)
            .bind(Utc::now())
            .bind(user_id.as_uuid())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Admin update: roles and verified flag.
    pub async fn update_user(
        &self,
        user_id: UserId,
        roles: &[UserRole],
        is_verified: bool,
    ) -> Result<Option<User>, StoreError> {
        let roles: Vec<String> = roles.iter().map(|r| r.as_str().to_string()).collect();

        sqlx::query(
            "UPDATE users SET roles = $1, is_verified = $2, updated_at = $3 WHERE id = $4",
        )
        .bind(&roles)
        .bind(is_verified)
        .bind(Utc::now())
        .bind(user_id.as_uuid())
        .execute(&self.pool)
        .await?;

        self.get_user(user_id).await
    }

    pub async fn update_password(
        &self,
        user_id: UserId,
        password_hash: &str,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE users SET password_hash = $1, updated_at = $2
             WHERE id = $3 AND deleted_at IS NULL",
        )
        .bind(password_hash)
        .bind(Utc::now())
        .bind(user_id.as_uuid())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn reset_password(&self, email: &str, password_hash: &str) -> Result<(), StoreError> {
        sqlx::query("UPDATE users SET password_hash = $1, updated_at = $2 WHERE email = $3")
            .bind(password_hash)
            .bind(Utc::now())
            .bind(email.to_lowercase())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Soft-delete: dependent rows go away, identifying fields are
    /// scrubbed with random filler so the row keeps satisfying the unique
    /// constraints without retaining personal data.
    pub async fn delete_user(&self, user_id: UserId) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        for table in ["verification", "password_reset", "user_tokens", "sso_users"] {
            let sql = format!("DELETE FROM {table} WHERE user_id = $1");
            sqlx::query(&sql)
                .bind(user_id.as_uuid())
                .execute(&mut *tx)
                .await?;
        }

        sqlx::query(
            r#"
            UPDATE users
            SET email = $1, name = $1, password_hash = '',
                roles = '{}', is_verified = false, deleted_at = $2
            WHERE id = $3
            "#,
        )
        .bind(random_scrub_string(32))
        .bind(Utc::now())
        .bind(user_id.as_uuid())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    pub async fn restrict_user(&self, user_id: UserId) -> Result<(), StoreError> {
        sqlx::query("UPDATE users SET restricted = true WHERE id = $1")
            .bind(user_id.as_uuid())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn un_restrict_user(&self, user_id: UserId) -> Result<(), StoreError> {
        sqlx::query("UPDATE users SET restricted = false WHERE id = $1")
            .bind(user_id.as_uuid())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn is_restricted(&self, user_id: UserId) -> Result<bool, StoreError> {
        let row = sqlx::query("SELECT restricted FROM users WHERE id = $1")
            .bind(user_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        Ok(row
            .map(|r| r.try_get::<bool, _>("restricted"))
            .transpose()?
            .unwrap_or(false))
    }

    /// Verify credentials. Restricted accounts and unparseable stored
    /// hashes both reject.
    pub async fn authenticate_user(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Option<DbUser>, StoreError> {
        let Some(user) = self.get_user_by_email(email).await? else {
            return Ok(None);
        };
        if !verify_password(password, &user.password_hash) {
            return Ok(None);
        }
        if user.restricted {
            return Ok(None);
        }
        Ok(Some(user))
    }

    // ── Federated identities ─────────────────────────────────────────────

    pub async fn insert_sso_identity(&self, identity: &SsoIdentity) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO sso_users (id, provider, user_id) VALUES ($1, $2, $3)")
            .bind(&identity.id)
            .bind(&identity.provider)
            .bind(identity.user_id.as_uuid())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn get_sso_identities(&self, user_id: UserId) -> Result<Vec<SsoIdentity>, StoreError> {
        let rows = sqlx::query("SELECT id, provider, user_id FROM sso_users WHERE user_id = $1")
            .bind(user_id.as_uuid())
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|r| {
                Ok(SsoIdentity {
                    id: r.try_get("id")?,
                    provider: r.try_get("provider")?,
                    user_id: UserId::from_uuid(r.try_get("user_id")?),
                })
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()
            .map_err(StoreError::from)
    }

    // ── Email verification ───────────────────────────────────────────────

    /// Create or refresh the verification code for a user; returns the
    /// new code.
    pub async fn generate_email_verification_code(
        &self,
        user_id: UserId,
    ) -> Result<String, StoreError> {
        let code = generate_otp(6);
        let expires_at = Utc::now() + Duration::minutes(VERIFICATION_CODE_TTL_MINUTES);

        sqlx::query(
            r#"
            INSERT INTO verification (user_id, code, expires_at, status)
            VALUES ($1, $2, $3, false)
            ON CONFLICT (user_id)
            DO UPDATE SET code = EXCLUDED.code, expires_at = EXCLUDED.expires_at, status = false
            "#,
        )
        .bind(user_id.as_uuid())
        .bind(&code)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;

        Ok(code)
    }

    pub async fn get_unverified_user_by_id(
        &self,
        user_id: UserId,
    ) -> Result<Option<UnverifiedUser>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT u.id, u.email, u.name, u.is_verified, v.code,
                   v.expires_at AS code_expires_at
            FROM users u
            LEFT JOIN verification v ON v.user_id = u.id
            WHERE u.id = $1 AND u.deleted_at IS NULL
            "#,
        )
        .bind(user_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| {
            Ok(UnverifiedUser {
                id: UserId::from_uuid(r.try_get("id")?),
                name: r.try_get("name")?,
                email: r.try_get("email")?,
                is_verified: r.try_get::<Option<bool>, _>("is_verified")?.unwrap_or(false),
                code: r.try_get("code")?,
                code_expires_at: r.try_get::<Option<DateTime<Utc>>, _>("code_expires_at")?,
            })
        })
        .transpose()
        .map_err(|e: sqlx::Error| StoreError::from(e))
    }

    pub async fn mark_verified(&self, user_id: UserId) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "UPDATE verification SET code = NULL, expires_at = NULL, status = true
             WHERE user_id = $1",
        )
        .bind(user_id.as_uuid())
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE users SET is_verified = true WHERE id = $1")
            .bind(user_id.as_uuid())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    // ── Password reset ───────────────────────────────────────────────────

    pub async fn generate_password_reset(&self, user_id: UserId) -> Result<String, StoreError> {
        let code = generate_otp(6);
        let expires_at = Utc::now() + Duration::minutes(PASSWORD_RESET_TTL_MINUTES);

        sqlx::query(
            "INSERT INTO password_reset (id, expires_at, code, user_id) VALUES ($1, $2, $3, $4)",
        )
        .bind(Uuid::now_v7())
        .bind(expires_at)
        .bind(&code)
        .bind(user_id.as_uuid())
        .execute(&self.pool)
        .await?;

        Ok(code)
    }

    pub async fn check_password_reset(&self, email: &str, code: &str) -> Result<bool, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT 1 FROM password_reset pr
            INNER JOIN users u ON u.id = pr.user_id
            WHERE u.email = $1 AND pr.code = $2 AND pr.expires_at > $3
            "#,
        )
        .bind(email.to_lowercase())
        .bind(code)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.is_some())
    }

    // ── Email subscriptions ──────────────────────────────────────────────

    pub async fn subscribe_user(
        &self,
        user_id: UserId,
        email_type: EmailType,
    ) -> Result<(), StoreError> {
        let existing = sqlx::query(
            "SELECT id FROM user_subscriptions WHERE user_id = $1 AND email_type = $2",
        )
        .bind(user_id.as_uuid())
        .bind(email_type.as_str())
        .fetch_optional(&self.pool)
        .await?;

        // A row already there means the user made an explicit choice at
        // some point; never flip an unsubscribe back implicitly.
        if existing.is_some() {
            return Ok(());
        }

        sqlx::query(
            "INSERT INTO user_subscriptions (user_id, email_type, subscribed_at)
             VALUES ($1, $2, EXTRACT(EPOCH FROM NOW()))",
        )
        .bind(user_id.as_uuid())
        .bind(email_type.as_str())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn resubscribe_user(&self, subscription_id: i64) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE user_subscriptions SET subscribed_at = EXTRACT(EPOCH FROM NOW())
             WHERE id = $1",
        )
        .bind(subscription_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn unsubscribe_user(
        &self,
        user_id: UserId,
        email_type: Option<EmailType>,
    ) -> Result<(), StoreError> {
        match email_type {
            Some(email_type) => {
                sqlx::query(
                    "UPDATE user_subscriptions
                     SET unsubscribed_at = EXTRACT(EPOCH FROM NOW())
                     WHERE user_id = $1 AND email_type = $2",
                )
                .bind(user_id.as_uuid())
                .bind(email_type.as_str())
                .execute(&self.pool)
                .await?;
            }
            None => {
                sqlx::query(
                    "UPDATE user_subscriptions
                     SET unsubscribed_at = EXTRACT(EPOCH FROM NOW())
                     WHERE user_id = $1",
                )
                .bind(user_id.as_uuid())
                .execute(&self.pool)
                .await?;
            }
        }
        Ok(())
    }

    pub async fn is_user_subscribed(
        &self,
        user_id: UserId,
        email_type: EmailType,
    ) -> Result<bool, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT 1 FROM user_subscriptions us
            INNER JOIN users u ON u.id = us.user_id
            WHERE us.user_id = $1 AND us.email_type = $2
              AND u.deleted_at IS NULL AND u.is_verified = true
              AND (us.unsubscribed_at IS NULL OR us.subscribed_at > us.unsubscribed_at)
            "#,
        )
        .bind(user_id.as_uuid())
        .bind(email_type.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.is_some())
    }

    pub async fn get_subscribed_users(
        &self,
        email_type: EmailType,
    ) -> Result<Vec<User>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT u.id, u.email, u.email_id, u.name, u.roles, u.is_verified,
                   u.restricted, u.created_at
            FROM users u
            JOIN user_subscriptions us ON us.user_id = u.id
            WHERE us.email_type = $1 AND u.deleted_at IS NULL
              AND u.is_verified = true
              AND (us.unsubscribed_at IS NULL OR us.subscribed_at > us.unsubscribed_at)
            "#,
        )
        .bind(email_type.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(map_user_summary)
            .collect::<Result<Vec<_>, _>>()
            .map_err(StoreError::from)
    }
}

// ── Row mappers ──────────────────────────────────────────────────────────────

fn parse_roles(raw: Vec<String>) -> Vec<UserRole> {
    raw.iter().filter_map(|r| UserRole::parse(r)).collect()
}

/// Listing shape: no SSO join, no password-presence bit.
fn map_user_summary(row: &PgRow) -> Result<User, sqlx::Error> {
    Ok(User {
        id: UserId::from_uuid(row.try_get("id")?),
        email: row.try_get("email")?,
        email_id: row.try_get("email_id")?,
        name: row.try_get("name")?,
        is_verified: row.try_get::<Option<bool>, _>("is_verified")?.unwrap_or(false),
        restricted: row.try_get("restricted")?,
        roles: parse_roles(row.try_get("roles")?),
        created_at: row.try_get("created_at")?,
        sso_connections: Vec::new(),
        has_password: false,
    })
}

fn map_user(row: &PgRow) -> Result<User, sqlx::Error> {
    Ok(User {
        id: UserId::from_uuid(row.try_get("id")?),
        email: row.try_get("email")?,
        email_id: row.try_get("email_id")?,
        name: row.try_get("name")?,
        is_verified: row.try_get::<Option<bool>, _>("is_verified")?.unwrap_or(false),
        restricted: row.try_get("restricted")?,
        roles: parse_roles(row.try_get("roles")?),
        created_at: row.try_get("created_at")?,
        sso_connections: row
            .try_get::<Option<Vec<String>>, _>("sso_connections")?
            .unwrap_or_default(),
        has_password: row.try_get("has_password")?,
    })
}

fn map_db_user(row: &PgRow) -> Result<DbUser, sqlx::Error> {
    Ok(DbUser {
        id: UserId::from_uuid(row.try_get("id")?),
        email: row.try_get("email")?,
        email_id: row.try_get("email_id")?,
        name: row.try_get("name")?,
        roles: parse_roles(row.try_get("roles")?),
        is_verified: row.try_get::<Option<bool>, _>("is_verified")?.unwrap_or(false),
        restricted: row.try_get("restricted")?,
        password_hash: row
            .try_get::<Option<String>, _>("password_hash")?
            .unwrap_or_default(),
        sso_connections: row
            .try_get::<Option<Vec<String>>, _>("sso_connections")?
            .unwrap_or_default(),
    })
}

fn random_scrub_string(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

fn generate_otp(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| char::from(b'0' + rng.gen_range(0..10)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn otp_is_numeric_and_sized() {
        for _ in 0..50 {
            let code = generate_otp(6);
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn scrub_string_is_random_filler() {
        let a = random_scrub_string(32);
        let b = random_scrub_string(32);
        assert_eq!(a.len(), 32);
        assert_ne!(a, b);
    }

    #[test]
    fn unknown_roles_are_dropped_instead_of_failing() {
        let roles = parse_roles(vec![
            "admin".to_string(),
            "definitely-not-a-role".to_string(),
            "consumer".to_string(),
        ]);
        assert_eq!(roles, vec![UserRole::Admin, UserRole::Consumer]);
    }
}
