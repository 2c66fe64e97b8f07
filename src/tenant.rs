//! Tenant context.
//!
//! A tenant is an isolated account and data partition. The core only needs
//! three things from it: the storage partition key, the domain it is served
//! on, and the secret used to authenticate its session cookies.

use std::fmt;
use zeroize::Zeroizing;

/// Per-tenant identity consumed by the authorization core.
#[derive(Clone)]
pub struct Tenant {
    domain: String,
    prefix: String,
    session_secret: Zeroizing<Vec<u8>>,
}

impl Tenant {
    pub fn new(domain: impl Into<String>, prefix: impl Into<String>, session_secret: Vec<u8>) -> Self {
        Self {
            domain: domain.into(),
            prefix: prefix.into(),
            session_secret: Zeroizing::new(session_secret),
        }
    }

    /// Tenant whose storage prefix is derived from its domain.
    pub fn from_domain(domain: &str, session_secret: Vec<u8>) -> Self {
        let prefix: String = domain
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
            .collect();
        Self::new(domain, prefix, session_secret)
    }

    /// Domain the tenant is served on, possibly with a port.
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Storage partition key. Also names the cookie under flat subdomains.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Secret for session cookie MACs.
    pub fn session_secret(&self) -> &[u8] {
        &self.session_secret
    }
}

impl fmt::Debug for Tenant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tenant")
            .field("domain", &self.domain)
            .field("prefix", &self.prefix)
            .field("session_secret", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_hides_secret() {
        let tenant = Tenant::new("alice.example.net", "alice-example-net", b"hunter2".to_vec());
        let debug = format!("{tenant:?}");
        assert!(debug.contains("alice.example.net"));
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn prefix_from_domain() {
        let tenant = Tenant::from_domain("Alice.example.net:8080", Vec::new());
        assert_eq!(tenant.prefix(), "alice-example-net-8080");
        assert_eq!(tenant.domain(), "Alice.example.net:8080");
    }
}
