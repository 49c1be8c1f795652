//! Scheduled email persistence.

use serde::{Deserialize, Serialize};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

use coffer_core::{UnixTime, UserId};

use crate::db::StoreError;

/// Subscription category of an outbound email.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmailType {
    Promotional,
    Transactional,
}

impl EmailType {
    pub fn as_str(self) -> &'static str {
        match self {
            EmailType::Promotional => "promotional",
            EmailType::Transactional => "transactional",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "promotional" => Some(EmailType::Promotional),
            "transactional" => Some(EmailType::Transactional),
            _ => None,
        }
    }
}

/// A scheduled email row, joined with recipient data when read for
/// delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutomatedEmail {
    pub id: Option<i64>,
    pub user_id: UserId,
    pub user_email: Option<String>,
    pub user_roles: Vec<String>,
    pub email_type: EmailType,
    pub subject: String,
    pub template: String,
    pub variables: Option<serde_json::Value>,
    pub scheduled_at: UnixTime,
    pub sent_at: Option<UnixTime>,
}

#[derive(Clone)]
pub struct AutomatedEmailsRepository {
    pool: PgPool,
    environment: String,
}

impl AutomatedEmailsRepository {
    pub fn new(pool: PgPool, environment: String) -> Self {
        Self { pool, environment }
    }

    pub async fn schedule(&self, email: &AutomatedEmail) -> Result<i64, StoreError> {
        let row = sqlx::query(
            r#"
            INSERT INTO automated_emails
                (user_id, email_type, subject, variables, scheduled_at, template)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id
            "#,
        )
        .bind(email.user_id.as_uuid())
        .bind(email.email_type.as_str())
        .bind(&email.subject)
        .bind(&email.variables)
        .bind(email.scheduled_at)
        .bind(&email.template)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.try_get("id")?)
    }

    /// Drop a still-unsent scheduled email.
    pub async fn cancel(
        &self,
        user_id: UserId,
        email_type: EmailType,
        template: &str,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            DELETE FROM automated_emails
            WHERE user_id = $1 AND email_type = $2 AND template = $3
              AND sent_at IS NULL
            "#,
        )
        .bind(user_id.as_uuid())
        .bind(email_type.as_str())
        .bind(template)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Unsent emails whose schedule fell within the last hour. Outside
    /// production, only admin recipients are returned so a staging run
    /// never mails real users.
    pub async fn due_emails(&self) -> Result<Vec<AutomatedEmail>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT e.id, e.user_id, u.email AS user_email, u.roles,
                   e.email_type, e.subject, e.variables, e.scheduled_at,
                   e.sent_at, e.template
            FROM automated_emails e
            JOIN users u ON u.id = e.user_id
            WHERE e.sent_at IS NULL
              AND e.scheduled_at < EXTRACT(EPOCH FROM NOW())
              AND e.scheduled_at > EXTRACT(EPOCH FROM NOW() - INTERVAL '1 hour')
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut emails = rows
            .iter()
            .map(map_automated_email)
            .collect::<Result<Vec<_>, _>>()?;

        if self.environment != "production" {
            emails.retain(|e| e.user_roles.iter().any(|r| r == "admin"));
        }

        Ok(emails)
    }

    pub async fn mark_sent(&self, email_id: i64) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE automated_emails SET sent_at = EXTRACT(EPOCH FROM NOW()) WHERE id = $1",
        )
        .bind(email_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

fn map_automated_email(row: &PgRow) -> Result<AutomatedEmail, sqlx::Error> {
    let email_type: String = row.try_get("email_type")?;

    Ok(AutomatedEmail {
        id: row.try_get("id")?,
        user_id: UserId::from_uuid(row.try_get("user_id")?),
        user_email: row.try_get("user_email")?,
        user_roles: row.try_get("roles")?,
        email_type: EmailType::parse(&email_type).unwrap_or(EmailType::Transactional),
        subject: row.try_get("subject")?,
        template: row.try_get("template")?,
        variables: row.try_get("variables")?,
        scheduled_at: row.try_get("scheduled_at")?,
        sent_at: row.try_get("sent_at")?,
    })
}
