//! Transactional email templates.
//!
//! Each template is a pair of files, `{name}.txt` and `{name}.html`, with
//! `{{ var }}` placeholders. `tagline` and `app_url` are always available.

use std::path::PathBuf;

use crate::MailError;

#[derive(Debug, Clone, PartialEq)]
pub struct RenderedEmail {
    pub subject: String,
    pub text: String,
    pub html: String,
}

pub struct EmailGenerator {
    dir: PathBuf,
    globals: Vec<(String, String)>,
}

impl EmailGenerator {
    pub fn new(template_dir: impl Into<PathBuf>, tagline: &str, app_url: &str) -> Self {
        Self {
            dir: template_dir.into(),
            globals: vec![
                ("tagline".to_string(), tagline.to_string()),
                ("app_url".to_string(), app_url.to_string()),
            ],
        }
    }

    pub fn generate_email(
        &self,
        subject: &str,
        template: &str,
        vars: &[(String, String)],
    ) -> Result<RenderedEmail, MailError> {
        let text = self.load(template, "txt")?;
        let html = self.load(template, "html")?;

        Ok(RenderedEmail {
            subject: subject.to_string(),
            text: self.render(&text, vars),
            html: self.render(&html, vars),
        })
    }

    pub fn generate_password_reset(&self, reset_code: &str) -> Result<RenderedEmail, MailError> {
        self.generate_email(
            "Password Reset",
            "password_reset",
            &[("reset_code".to_string(), reset_code.to_string())],
        )
    }

    fn load(&self, template: &str, ext: &str) -> Result<String, MailError> {
        let path = self.dir.join(format!("{template}.{ext}"));
        std::fs::read_to_string(&path)
            .map_err(|_| MailError::Template(path.display().to_string()))
    }

    fn render(&self, source: &str, vars: &[(String, String)]) -> String {
        let mut out = source.to_string();
        for (key, value) in self.globals.iter().chain(vars.iter()) {
            out = out.replace(&format!("{{{{ {key} }}}}"), value);
            out = out.replace(&format!("{{{{{key}}}}}"), value);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn generator_with(template: &str, txt: &str, html: &str) -> EmailGenerator {
        let dir = std::env::temp_dir().join(format!("coffer-mail-test-{template}"));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(format!("{template}.txt")), txt).unwrap();
        std::fs::write(dir.join(format!("{template}.html")), html).unwrap();
        EmailGenerator::new(dir, "Coffer", "https://coffer.app")
    }

    #[test]
    fn variables_and_globals_are_substituted() {
        let r#gen = generator_with(
            "verification",
            "Your {{ tagline }} code is {{ code }}.",
            "<p>{{code}} — {{ app_url }}</p>",
        );

        let mail = r#gen
            .generate_email(
                "Verify",
                "verification",
                &[("code".to_string(), "123456".to_string())],
            )
            .unwrap();

        assert_eq!(mail.subject, "Verify");
        assert_eq!(mail.text, "Your Coffer code is 123456.");
        assert_eq!(mail.html, "<p>123456 — https://coffer.app</p>");
    }

    #[test]
    fn missing_template_is_an_error() {
        let r#gen = EmailGenerator::new("/nonexistent-templates", "Coffer", "https://coffer.app");
        let err = r#gen.generate_email("x", "nope", &[]).unwrap_err();
        assert!(matches!(err, MailError::Template(_)));
    }

    #[test]
    fn password_reset_uses_the_reset_code_variable() {
        let r#gen = generator_with("password_reset", "Code: {{ reset_code }}", "{{ reset_code }}");
        let mail = r#gen.generate_password_reset("987654").unwrap();
        assert_eq!(mail.subject, "Password Reset");
        assert_eq!(mail.text, "Code: 987654");
    }
}
