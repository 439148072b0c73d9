//! Origin allow-list matching for HTTP and WebSocket clients.
//!
//! Patterns are compared against the `Origin` header with its scheme
//! stripped. Matching is case-insensitive and anchored at both ends.
//!
//! | Pattern          | Accepts                                      |
//! |------------------|----------------------------------------------|
//! | `*`              | anything, including a missing header         |
//! | `*.example.com`  | `example.com` and any subdomain of it         |
//! | `api-*.test`     | one label in place of `*` (`api-eu.test`)    |
//! | `example.com`    | exactly `example.com`                        |
//!
//! An origin carrying a port is retried without it.

/// Compiled origin pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OriginPolicy {
    Any,
    Exact(String),
    /// Suffix after `*.`, lowercased.
    Subdomain(String),
    /// Lowercased text around the first `*`.
    Glob { prefix: String, suffix: String },
}

impl OriginPolicy {
    pub fn from_pattern(pattern: &str) -> Self {
        let pattern = strip_scheme(pattern.trim()).to_ascii_lowercase();
        if pattern == "*" {
            return OriginPolicy::Any;
        }
        if let Some(rest) = pattern.strip_prefix("*.") {
            return OriginPolicy::Subdomain(rest.to_string());
        }
        match pattern.split_once('*') {
            Some((prefix, suffix)) => OriginPolicy::Glob {
                prefix: prefix.to_string(),
                suffix: suffix.to_string(),
            },
            None => OriginPolicy::Exact(pattern),
        }
    }

    /// Check a request's `Origin`. A missing header is matched as empty.
    pub fn allows(&self, origin: Option<&str>) -> bool {
        if *self == OriginPolicy::Any {
            return true;
        }
        let host = strip_scheme(origin.unwrap_or("")).to_ascii_lowercase();
        if self.matches(&host) {
            return true;
        }
        match strip_port(&host) {
            Some(bare) => self.matches(bare),
            None => false,
        }
    }

    fn matches(&self, host: &str) -> bool {
        match self {
            OriginPolicy::Any => true,
            OriginPolicy::Exact(exact) => host == exact,
            OriginPolicy::Subdomain(base) => {
                if host == base {
                    return true;
                }
                host.strip_suffix(base.as_str())
                    .and_then(|head| head.strip_suffix('.'))
                    .is_some_and(|labels| labels.split('.').all(is_label))
            }
            OriginPolicy::Glob { prefix, suffix } => {
                host.len() > prefix.len() + suffix.len()
                    && host.starts_with(prefix.as_str())
                    && host.ends_with(suffix.as_str())
                    && is_label(&host[prefix.len()..host.len() - suffix.len()])
            }
        }
    }
}

fn is_label(s: &str) -> bool {
    !s.is_empty()
        && s
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}

/// Drop a leading `scheme://`.
pub fn strip_scheme(origin: &str) -> &str {
    match origin.find("://") {
        Some(idx) => &origin[idx + 3..],
        None => origin,
    }
}

fn strip_port(host: &str) -> Option<&str> {
    let (bare, port) = host.rsplit_once(':')?;
    if !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit()) {
        Some(bare)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subdomain_wildcard() {
        let policy = OriginPolicy::from_pattern("*.example.com");
        assert!(policy.allows(Some("http://test.example.com")));
        assert!(policy.allows(Some("https://example.com")));
        assert!(policy.allows(Some("a.b.example.com")));
        assert!(policy.allows(Some("HTTP://Test.Example.COM")));
        assert!(!policy.allows(Some("http://fail.com")));
        assert!(!policy.allows(Some("http://evilexample.com")));
        assert!(!policy.allows(None));
    }

    #[test]
    fn exact_is_case_insensitive_and_strict() {
        let policy = OriginPolicy::from_pattern("example.com");
        assert!(policy.allows(Some("http://EXAMPLE.com")));
        assert!(!policy.allows(Some("http://www.example.com")));
        assert!(!policy.allows(Some("")));
    }

    #[test]
    fn glob_replaces_one_label() {
        let policy = OriginPolicy::from_pattern("api-*.example.com");
        assert!(policy.allows(Some("https://api-eu.example.com")));
        assert!(!policy.allows(Some("https://api-.example.com")));
        assert!(!policy.allows(Some("https://api-eu.west.example.com")));
    }

    #[test]
    fn star_allows_everything() {
        let policy = OriginPolicy::from_pattern("*");
        assert_eq!(policy, OriginPolicy::Any);
        assert!(policy.allows(None));
        assert!(policy.allows(Some("anything")));
    }

    #[test]
    fn port_is_ignored_on_retry() {
        let policy = OriginPolicy::from_pattern("localhost");
        assert!(policy.allows(Some("http://localhost:3000")));
        assert!(!policy.allows(Some("http://localhost:abc")));
    }

    #[test]
    fn scheme_in_pattern_is_dropped() {
        let policy = OriginPolicy::from_pattern("https://example.com");
        assert_eq!(policy, OriginPolicy::Exact("example.com".into()));
    }
}
