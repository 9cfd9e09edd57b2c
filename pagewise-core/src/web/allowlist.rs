use super::{Result, WebError};

/// Hosts a [`WebScraper`](super::WebScraper) is permitted to fetch.
///
/// A host is permitted when it equals an allowed domain or is a subdomain of
/// one, compared case-insensitively: `example.com` permits `example.com` and
/// `docs.example.com`, but not `notexample.com`. An empty allowlist permits
/// every host.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DomainAllowlist {
    domains: Vec<String>,
}

impl DomainAllowlist {
    pub fn new<I, S>(domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let domains = domains
            .into_iter()
            .map(|d| d.as_ref().trim().trim_end_matches('.').to_ascii_lowercase())
            .filter(|d| !d.is_empty())
            .collect();
        Self { domains }
    }

    /// True when no restriction applies.
    pub fn is_unrestricted(&self) -> bool {
        self.domains.is_empty()
    }

    pub fn domains(&self) -> &[String] {
        &self.domains
    }

    pub fn permits(&self, host: &str) -> bool {
        if self.domains.is_empty() {
            return true;
        }
        let host = host.trim_end_matches('.').to_ascii_lowercase();
        self.domains.iter().any(|allowed| {
            host == *allowed
                || host
                    .strip_suffix(allowed.as_str())
                    .is_some_and(|prefix| prefix.ends_with('.'))
        })
    }

    /// Fails with [`WebError::DomainNotAllowed`] unless `host` is permitted.
    pub fn check(&self, host: &str) -> Result<()> {
        if self.permits(host) {
            Ok(())
        } else {
            Err(WebError::DomainNotAllowed {
                domain: host.to_ascii_lowercase(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_and_subdomain_match() {
        let allowlist = DomainAllowlist::new(["example.com"]);
        assert!(allowlist.permits("example.com"));
        assert!(allowlist.permits("docs.example.com"));
        assert!(allowlist.permits("a.b.example.com"));
        assert!(!allowlist.permits("notexample.com"));
        assert!(!allowlist.permits("example.com.evil.test"));
    }

    #[test]
    fn test_case_insensitive() {
        let allowlist = DomainAllowlist::new(["Example.COM"]);
        assert!(allowlist.permits("EXAMPLE.com"));
        assert!(allowlist.permits("Docs.Example.Com."));
    }

    #[test]
    fn test_empty_allows_everything() {
        let allowlist = DomainAllowlist::default();
        assert!(allowlist.is_unrestricted());
        assert!(allowlist.permits("anything.test"));

        let blank = DomainAllowlist::new(["", "  "]);
        assert!(blank.is_unrestricted());
    }

    #[test]
    fn test_check_reports_domain() {
        let allowlist = DomainAllowlist::new(["good.test"]);
        let err = allowlist.check("Evil.test").unwrap_err();
        assert!(matches!(err, WebError::DomainNotAllowed { domain } if domain == "evil.test"));
    }
}
