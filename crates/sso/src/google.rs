//! Google Sign-In verification.

use jsonwebtoken::jwk::Jwk;

use crate::verifier::IdTokenVerifier;

pub const GOOGLE_ISSUERS: [&str; 2] = ["https://accounts.google.com", "accounts.google.com"];

/// Accepted Google OAuth client ids: the primary id plus an optional
/// allow-list file (one id per line), loaded once at startup.
#[derive(Debug, Clone)]
pub struct GoogleClientIds {
    ids: Vec<String>,
}

impl GoogleClientIds {
    pub fn load(primary: &str, extra_ids_path: &str) -> Self {
        let mut ids = vec![primary.to_string()];

        match std::fs::read_to_string(extra_ids_path) {
            Ok(content) => {
                ids.extend(
                    content
                        .lines()
                        .map(str::trim)
                        .filter(|l| !l.is_empty())
                        .map(str::to_string),
                );
            }
            Err(e) => {
                tracing::debug!(path = extra_ids_path, "no extra google client ids: {e}");
            }
        }

        Self { ids }
    }

    pub fn as_slice(&self) -> &[String] {
        &self.ids
    }
}

/// Build a verifier over the cached Google JWKS.
pub fn google_verifier(keys: Vec<Jwk>, client_ids: &GoogleClientIds) -> IdTokenVerifier {
    IdTokenVerifier::new(
        keys,
        client_ids.as_slice().to_vec(),
        GOOGLE_ISSUERS.iter().map(|s| s.to_string()).collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_allow_list_file_leaves_only_the_primary_id() {
        let ids = GoogleClientIds::load("primary.apps.example", "/nonexistent/ids.txt");
        assert_eq!(ids.as_slice(), ["primary.apps.example".to_string()]);
    }

    #[test]
    fn allow_list_lines_are_trimmed_and_appended() {
        let path = std::env::temp_dir().join("coffer-google-ids-test.txt");
        std::fs::write(&path, "one.apps.example\n  two.apps.example \n\n").unwrap();

        let ids = GoogleClientIds::load("primary.apps.example", path.to_str().unwrap());
        assert_eq!(
            ids.as_slice(),
            [
                "primary.apps.example".to_string(),
                "one.apps.example".to_string(),
                "two.apps.example".to_string(),
            ]
        );

        let _ = std::fs::remove_file(path);
    }
}
