//! Best-effort audit logging of user-facing errors.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use coffer_core::UserId;

#[derive(Debug, Clone)]
struct AuditEntry {
    user_id: Option<UserId>,
    severity: i32,
    kind: String,
    endpoint: Option<String>,
    status_code: Option<i32>,
    details: serde_json::Value,
    created_at: DateTime<Utc>,
}

const SEVERITY_ERROR: i32 = 40;

/// Buffers audit entries during a request and writes them at the end.
///
/// Submission is best-effort: a failed write logs every buffered entry
/// and returns, so audit problems never fail the primary request.
pub struct AuditLog {
    pool: PgPool,
    entries: Mutex<Vec<AuditEntry>>,
}

impl AuditLog {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            entries: Mutex::new(Vec::new()),
        }
    }

    pub fn error(
        &self,
        kind: &str,
        user_id: Option<UserId>,
        endpoint: Option<&str>,
        status_code: Option<i32>,
        details: serde_json::Value,
    ) {
        let entry = AuditEntry {
            user_id,
            severity: SEVERITY_ERROR,
            kind: kind.to_string(),
            endpoint: endpoint.map(str::to_string),
            status_code,
            details,
            created_at: Utc::now(),
        };

        if let Ok(mut entries) = self.entries.lock() {
            entries.push(entry);
        }
    }

    pub async fn submit_all(&self) {
        let drained: Vec<AuditEntry> = match self.entries.lock() {
            Ok(mut entries) => entries.drain(..).collect(),
            Err(_) => return,
        };

        if drained.is_empty() {
            return;
        }

        for entry in &drained {
            let result = sqlx::query(
                r#"
                INSERT INTO error_log
                    (user_id, severity, type, created_at, endpoint, status_code, details)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(entry.user_id.map(uuid::Uuid::from))
            .bind(entry.severity)
            .bind(&entry.kind)
            .bind(entry.created_at)
            .bind(&entry.endpoint)
            .bind(entry.status_code)
            .bind(&entry.details)
            .execute(&self.pool)
            .await;

            if let Err(e) = result {
                tracing::error!(
                    kind = %entry.kind,
                    details = %entry.details,
                    "failed to persist audit entry: {e}"
                );
            }
        }
    }
}
