//! Route model: a hostname, optionally followed by a path, through which
//! an application is reachable.
//!
//! Routes are normalised when parsed: surrounding whitespace, an `http://`
//! or `https://` scheme, and trailing slashes are stripped, and the host is
//! lower-cased. Equality is equality of the normalised string form, so
//! `Example.org/` and `example.org` are the same route.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Kubernetes-style object names are capped at 63 characters.
const MAX_OBJECT_NAME: usize = 63;

/// Longest hostname accepted (RFC 1035).
const MAX_HOST_LEN: usize = 253;

static HOSTNAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?(\.[a-z0-9]([-a-z0-9]*[a-z0-9])?)*$")
        .expect("hostname pattern compiles")
});

static DNS_LABEL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?$").expect("label pattern compiles"));

/// Whether `name` can name a namespace, application, or service: a
/// lower-case DNS label of at most 63 characters.
pub fn is_dns_label(name: &str) -> bool {
    name.len() <= MAX_OBJECT_NAME && DNS_LABEL.is_match(name)
}

/// Errors produced when parsing a route string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouteError {
    #[error("route is empty")]
    Empty,

    #[error("invalid route host: {0}")]
    InvalidHost(String),

    #[error("invalid route path: {0}")]
    InvalidPath(String),
}

/// A normalised route.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Route {
    host: String,
    /// Empty, or a path starting with `/` and never ending with one.
    path: String,
}

impl Route {
    /// The hostname part of the route.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// The path part as an ingress rule expects it (`/` when absent).
    pub fn path(&self) -> &str {
        if self.path.is_empty() { "/" } else { &self.path }
    }

    /// The default route of an application: `<app>.<domain>`.
    pub fn default_for(app: &str, domain: &str) -> Result<Self, RouteError> {
        format!("{app}.{domain}").parse()
    }

    /// Name of the ingress object carrying this route for `app`.
    ///
    /// Always suffixed with a digest of the full route so that routes that
    /// sanitise to the same characters (`a-b.org` vs `a.b.org`) never share
    /// an object name.
    pub fn ingress_name(&self, app: &str) -> String {
        let raw = format!("{app}-{self}");
        let digest = hex::encode(Sha256::digest(raw.as_bytes()));
        let mut name: String = raw
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
            .collect();
        name.truncate(MAX_OBJECT_NAME - 9);
        format!("{}-{}", name.trim_end_matches('-'), &digest[..8])
    }
}

impl FromStr for Route {
    type Err = RouteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let trimmed = trimmed
            .strip_prefix("https://")
            .or_else(|| trimmed.strip_prefix("http://"))
            .unwrap_or(trimmed)
            .trim_end_matches('/');

        if trimmed.is_empty() {
            return Err(RouteError::Empty);
        }

        let (host, path) = match trimmed.split_once('/') {
            Some((host, path)) => (host, format!("/{path}")),
            None => (trimmed, String::new()),
        };

        let host = host.to_ascii_lowercase();
        if host.len() > MAX_HOST_LEN || !HOSTNAME.is_match(&host) {
            return Err(RouteError::InvalidHost(host));
        }
        if path.contains("//") || path.chars().any(|c| c.is_whitespace() || c == '?' || c == '#') {
            return Err(RouteError::InvalidPath(path));
        }

        Ok(Self { host, path })
    }
}

impl TryFrom<String> for Route {
    type Error = RouteError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Route> for String {
    fn from(route: Route) -> Self {
        route.to_string()
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.host, self.path)
    }
}

/// Parse a list of route strings into a set. Duplicates after
/// normalisation collapse into one entry.
pub fn parse_routes<S: AsRef<str>>(raw: &[S]) -> Result<BTreeSet<Route>, RouteError> {
    raw.iter().map(|r| r.as_ref().parse()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_host() {
        let route: Route = "example.org".parse().unwrap();
        assert_eq!(route.host(), "example.org");
        assert_eq!(route.path(), "/");
        assert_eq!(route.to_string(), "example.org");
    }

    #[test]
    fn strips_trailing_slash_and_scheme() {
        let a: Route = "https://Example.org/".parse().unwrap();
        let b: Route = "example.org".parse().unwrap();
        assert_eq!(a, b);

        let c: Route = "example.org/api/v1/".parse().unwrap();
        assert_eq!(c.path(), "/api/v1");
        assert_eq!(c.to_string(), "example.org/api/v1");
    }

    #[test]
    fn rejects_empty_and_bad_hosts() {
        assert_eq!("".parse::<Route>(), Err(RouteError::Empty));
        assert_eq!("  / ".parse::<Route>(), Err(RouteError::Empty));
        assert!(matches!("bad_host.org".parse::<Route>(), Err(RouteError::InvalidHost(_))));
        assert!(matches!("-lead.org".parse::<Route>(), Err(RouteError::InvalidHost(_))));
        assert!(matches!("a.org//x".parse::<Route>(), Err(RouteError::InvalidPath(_))));
    }

    #[test]
    fn dns_labels() {
        assert!(is_dns_label("foo-bar1"));
        assert!(!is_dns_label(""));
        assert!(!is_dns_label("Foo"));
        assert!(!is_dns_label("foo_bar"));
        assert!(!is_dns_label("foo-"));
        assert!(!is_dns_label(&"a".repeat(64)));
    }

    #[test]
    fn default_route_uses_domain() {
        let route = Route::default_for("foo", "apps.example.com").unwrap();
        assert_eq!(route.to_string(), "foo.apps.example.com");
    }

    #[test]
    fn route_set_ignores_order_and_duplicates() {
        let a = parse_routes(&["b.org", "a.org", "a.org/"]).unwrap();
        let b = parse_routes(&["a.org", "b.org"]).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 2);
    }

    #[test]
    fn ingress_names_are_bounded_and_distinct() {
        let a: Route = "a-b.org".parse().unwrap();
        let b: Route = "a.b.org".parse().unwrap();
        assert_ne!(a.ingress_name("foo"), b.ingress_name("foo"));

        let long: Route = format!("{}.org", "x".repeat(120)).parse().unwrap();
        let name = long.ingress_name("some-application");
        assert!(name.len() <= MAX_OBJECT_NAME);
        assert!(name.starts_with("some-application-xxx"));
    }

    #[test]
    fn serde_uses_string_form() {
        let route: Route = "a.org/x".parse().unwrap();
        let json = serde_json::to_string(&route).unwrap();
        assert_eq!(json, "\"a.org/x\"");
        let back: Route = serde_json::from_str("\"A.ORG/x/\"").unwrap();
        assert_eq!(back, route);
        assert!(serde_json::from_str::<Route>("\"\"").is_err());
    }
}
