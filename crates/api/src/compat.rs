//! Client build compatibility.
//!
//! Older app builds occasionally need a response reshaped. The hook is an
//! explicit capability trait with a no-op default; response types opt in
//! by overriding `adapt`.

use axum::http::HeaderMap;

use coffer_auth::User;

/// Platform and build number reported by the app via headers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientInfo {
    pub platform: Option<String>,
    pub build: Option<i64>,
}

impl ClientInfo {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        Self {
            platform: headers
                .get("x-app-platform")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string),
            build: headers
                .get("x-app-build")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok()),
        }
    }
}

/// Capability to reshape a response for an older client build.
pub trait ClientCompat: Sized {
    fn adapt(self, _client: &ClientInfo) -> Self {
        self
    }
}

// Current builds need no user reshaping; the impl pins the seam so the
// next migration only overrides `adapt`.
impl ClientCompat for User {}

/// True when a compatibility transform applies: the reported build is at
/// or below the cutoff for its platform.
pub fn needs_compatibility(
    client: &ClientInfo,
    apple_cutoff: i64,
    google_cutoff: Option<i64>,
) -> bool {
    let Some(build) = client.build else {
        return false;
    };

    match client.platform.as_deref() {
        Some("Apple") => build <= apple_cutoff,
        Some("Android") => google_cutoff.is_some_and(|cutoff| build <= cutoff),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(platform: &str, build: i64) -> ClientInfo {
        ClientInfo {
            platform: Some(platform.to_string()),
            build: Some(build),
        }
    }

    #[test]
    fn apple_builds_at_or_below_the_cutoff_need_compat() {
        assert!(needs_compatibility(&client("Apple", 120), 120, None));
        assert!(needs_compatibility(&client("Apple", 100), 120, None));
        assert!(!needs_compatibility(&client("Apple", 121), 120, None));
    }

    #[test]
    fn android_needs_its_own_cutoff() {
        assert!(!needs_compatibility(&client("Android", 50), 120, None));
        assert!(needs_compatibility(&client("Android", 50), 120, Some(50)));
        assert!(!needs_compatibility(&client("Android", 51), 120, Some(50)));
    }

    #[test]
    fn unknown_platforms_or_missing_builds_never_need_compat() {
        assert!(!needs_compatibility(&client("Web", 1), 120, Some(120)));
        assert!(!needs_compatibility(&ClientInfo::default(), 120, Some(120)));
    }

    #[test]
    fn header_parsing_tolerates_garbage_builds() {
        let mut headers = HeaderMap::new();
        headers.insert("x-app-platform", "Apple".parse().unwrap());
        headers.insert("x-app-build", "not-a-number".parse().unwrap());

        let info = ClientInfo::from_headers(&headers);
        assert_eq!(info.platform.as_deref(), Some("Apple"));
        assert_eq!(info.build, None);
    }
}
