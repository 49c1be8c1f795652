//! Periodic delivery of scheduled emails.

use std::sync::Arc;
use std::time::Duration;

use coffer_mail::{EmailGenerator, Mailer};

use crate::repositories::automated_emails::AutomatedEmailsRepository;

const TICK_INTERVAL: Duration = Duration::from_secs(60);

pub struct EmailWorker {
    repo: AutomatedEmailsRepository,
    mailer: Arc<dyn Mailer>,
    templates: Arc<EmailGenerator>,
}

impl EmailWorker {
    pub fn new(
        repo: AutomatedEmailsRepository,
        mailer: Arc<dyn Mailer>,
        templates: Arc<EmailGenerator>,
    ) -> Self {
        Self {
            repo,
            mailer,
            templates,
        }
    }

    /// Tick forever; each tick drains the currently due emails.
    pub async fn run(self) {
        let mut interval = tokio::time::interval(TICK_INTERVAL);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            interval.tick().await;
            if let Err(e) = self.send_due().await {
                tracing::error!("email worker tick failed: {e}");
            }
        }
    }

    async fn send_due(&self) -> Result<(), crate::db::StoreError> {
        let emails = self.repo.due_emails().await?;
        if emails.is_empty() {
            return Ok(());
        }

        let started = std::time::Instant::now();
        let mut sent = 0u64;

        for email in emails {
            let Some(id) = email.id else { continue };

            let rendered = match self.templates.generate_email(
                &email.subject,
                &email.template,
                &template_vars(email.variables.as_ref()),
            ) {
                Ok(r) => r,
                Err(e) => {
                    tracing::error!(email_id = id, template = %email.template, "render failed: {e}");
                    continue;
                }
            };

            if let Some(to) = &email.user_email {
                if let Err(e) = self
                    .mailer
                    .sendmail(to, &rendered.subject, &rendered.text, Some(&rendered.html))
                    .await
                {
                    tracing::error!(email_id = id, "send failed: {e}");
                    continue;
                }
            }

            self.repo.mark_sent(id).await?;
            sent += 1;
        }

        let elapsed = started.elapsed().as_secs_f64().max(f64::EPSILON);
        tracing::info!(
            sent,
            elapsed_secs = elapsed,
            per_second = sent as f64 / elapsed,
            "scheduled emails delivered"
        );

        Ok(())
    }
}

/// Flatten the stored JSON variables into template substitutions;
/// non-string values are rendered as their JSON form.
fn template_vars(variables: Option<&serde_json::Value>) -> Vec<(String, String)> {
    let Some(serde_json::Value::Object(map)) = variables else {
        return Vec::new();
    };

    map.iter()
        .map(|(k, v)| {
            let rendered = match v {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (k.clone(), rendered)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn object_variables_flatten_to_pairs() {
        let vars = json!({"code": "123456", "count": 3});
        let mut pairs = template_vars(Some(&vars));
        pairs.sort();

        assert_eq!(
            pairs,
            vec![
                ("code".to_string(), "123456".to_string()),
                ("count".to_string(), "3".to_string()),
            ]
        );
    }

    #[test]
    fn missing_or_non_object_variables_yield_nothing() {
        assert!(template_vars(None).is_empty());
        assert!(template_vars(Some(&json!("just a string"))).is_empty());
        assert!(template_vars(Some(&json!(null))).is_empty());
    }
}
