//! Doctype writability.
//!
//! Delegated permission sets may not grant access to doctypes that hold the
//! server's own bookkeeping. The check is a trait so deployments can extend
//! the block list.

use crate::error::PermissionError;
use crate::store::doctypes;

/// Decides whether a delegated rule may target a doctype.
pub trait DoctypePolicy: Send + Sync {
    fn check_writable(&self, doctype: &str) -> Result<(), PermissionError>;
}

/// Blocks the server's own doctypes.
#[derive(Debug, Clone)]
pub struct DefaultDoctypePolicy {
    blocked: Vec<String>,
}

impl DefaultDoctypePolicy {
    pub const BLOCKED: [&'static str; 9] = [
        doctypes::PERMISSIONS,
        doctypes::SESSIONS,
        doctypes::APPS,
        doctypes::KONNECTORS,
        doctypes::SHARINGS,
        doctypes::SETTINGS,
        doctypes::OAUTH_CLIENTS,
        doctypes::JOBS,
        doctypes::TRIGGERS,
    ];

    /// Also block `extra` doctypes.
    pub fn with_blocked<I, S>(mut self, extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.blocked.extend(extra.into_iter().map(Into::into));
        self
    }
}

impl Default for DefaultDoctypePolicy {
    fn default() -> Self {
        Self {
            blocked: Self::BLOCKED.iter().map(|d| d.to_string()).collect(),
        }
    }
}

impl DoctypePolicy for DefaultDoctypePolicy {
    fn check_writable(&self, doctype: &str) -> Result<(), PermissionError> {
        if doctype.is_empty() || self.blocked.iter().any(|d| d == doctype) {
            return Err(PermissionError::NotWritable(doctype.to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blocks_server_doctypes() {
        let policy = DefaultDoctypePolicy::default();
        assert!(policy.check_writable("io.cozy.contacts").is_ok());
        assert!(matches!(
            policy.check_writable(doctypes::PERMISSIONS),
            Err(PermissionError::NotWritable(d)) if d == doctypes::PERMISSIONS
        ));
        assert!(policy.check_writable("").is_err());
    }

    #[test]
    fn test_extra_blocked_doctypes() {
        let policy = DefaultDoctypePolicy::default().with_blocked(["io.cozy.bank.accounts"]);
        assert!(policy.check_writable("io.cozy.bank.accounts").is_err());
    }
}
