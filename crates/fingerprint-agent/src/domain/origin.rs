//! Origin allow-list: the connection gate.
//!
//! Browsers attach an `Origin` header to every WebSocket handshake.  The
//! agent only serves pages whose origin is listed here.  Matching is an exact
//! string comparison: no wildcards, no case folding, no trailing-slash
//! normalisation.  `https://app.example` and `https://app.example/` are
//! different origins.

use std::collections::BTreeSet;

/// The set of origins allowed to talk to the agent.
///
/// Built once at startup and shared read-only by every connection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllowedOrigins {
    origins: BTreeSet<String>,
}

impl AllowedOrigins {
    /// Builds an allow-list from any collection of origin strings.
    pub fn new<I, S>(origins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            origins: origins.into_iter().map(Into::into).collect(),
        }
    }

    /// Returns `true` iff `declared` is present and exactly matches an entry.
    ///
    /// A missing `Origin` header is never authorised.
    pub fn authorize(&self, declared: Option<&str>) -> bool {
        declared.is_some_and(|origin| self.origins.contains(origin))
    }

    /// Number of allowed origins.
    pub fn len(&self) -> usize {
        self.origins.len()
    }

    /// `true` when no origin is allowed (every connection will be refused).
    pub fn is_empty(&self) -> bool {
        self.origins.is_empty()
    }

    /// Allowed origins in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.origins.iter().map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<S> for AllowedOrigins {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self::new(iter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn allow_list() -> AllowedOrigins {
        AllowedOrigins::new(["http://localhost:4200", "https://app.example.com"])
    }

    #[test]
    fn test_listed_origin_is_authorized() {
        assert!(allow_list().authorize(Some("https://app.example.com")));
    }

    #[test]
    fn test_unlisted_origin_is_rejected() {
        assert!(!allow_list().authorize(Some("https://evil.example.com")));
    }

    #[test]
    fn test_missing_origin_is_rejected() {
        assert!(!allow_list().authorize(None));
    }

    #[test]
    fn test_matching_is_exact() {
        // Arrange
        let origins = allow_list();

        // Assert: no prefix, suffix, case or trailing-slash leniency
        assert!(!origins.authorize(Some("https://app.example.com/")));
        assert!(!origins.authorize(Some("HTTPS://APP.EXAMPLE.COM")));
        assert!(!origins.authorize(Some("https://app.example.com.evil.io")));
        assert!(!origins.authorize(Some("http://localhost")));
        assert!(!origins.authorize(Some("")));
    }

    #[test]
    fn test_wildcard_entries_are_literal() {
        let origins = AllowedOrigins::new(["*"]);
        assert!(!origins.authorize(Some("http://localhost:4200")));
        assert!(origins.authorize(Some("*")));
    }

    #[test]
    fn test_empty_allow_list_rejects_everything() {
        let origins = AllowedOrigins::default();
        assert!(origins.is_empty());
        assert!(!origins.authorize(Some("http://localhost:4200")));
    }

    #[test]
    fn test_duplicates_collapse_and_iteration_is_sorted() {
        let origins: AllowedOrigins = ["https://b.example", "https://a.example", "https://b.example"]
            .into_iter()
            .collect();
        assert_eq!(origins.len(), 2);
        assert_eq!(
            origins.iter().collect::<Vec<_>>(),
            vec!["https://a.example", "https://b.example"]
        );
    }
}
