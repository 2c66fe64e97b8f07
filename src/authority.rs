//! Authority - the request-facing entry point.
//!
//! [`Authority`] bundles the session and permission repositories and exposes
//! the operations the transport layer needs: who is acting, what they may
//! do, issuing share tokens and bulk logout. Every authorization decision is
//! logged, grants at debug and denials at trace.

use crate::config::Config;
use crate::error::{PermissionError, SessionError};
use crate::lock::AdvisoryLock;
use crate::permission::{Permission, PermissionRepository, ShareRequest};
use crate::security::tokens::{generate_code, generate_shortcode};
use crate::session::{CookiePolicy, Session, SessionRepository};
use crate::store::{DocumentStore, Documents};
use crate::tenant::Tenant;
use docgate_rules::Rule;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, trace};

/// Sessions and permissions behind one handle.
#[derive(Clone)]
pub struct Authority {
    sessions: SessionRepository,
    permissions: PermissionRepository,
}

impl Authority {
    pub fn new(sessions: SessionRepository, permissions: PermissionRepository) -> Self {
        Self { sessions, permissions }
    }

    /// Wire both repositories to one store and lock service.
    pub fn from_config(config: &Config, store: Arc<dyn DocumentStore>, locks: Arc<dyn AdvisoryLock>) -> Self {
        let docs = Documents::new(store);
        let sessions = SessionRepository::new(
            docs.clone(),
            locks,
            config.sessions.clone(),
            CookiePolicy::from_config(config),
        );
        let permissions = PermissionRepository::new(docs, &config.permissions, config.security.dev_mode);
        Self::new(sessions, permissions)
    }

    pub fn sessions(&self) -> &SessionRepository {
        &self.sessions
    }

    pub fn permissions(&self) -> &PermissionRepository {
        &self.permissions
    }

    /// The session named by the request's cookie.
    pub async fn resolve_request_principal(
        &self,
        tenant: &Tenant,
        cookie_value: Option<&str>,
    ) -> Result<Session, SessionError> {
        self.sessions.from_cookie(tenant, cookie_value).await
    }

    /// True when `permission` grants `requested`. Expired documents grant nothing.
    pub fn check_authorized(&self, permission: &Permission, requested: &Rule) -> bool {
        if !permission.expired() && permission.allows(requested) {
            self.log_grant(permission, requested);
            true
        } else {
            self.log_denial(permission, requested);
            false
        }
    }

    /// Create a share-by-link document under `parent`, with one code and one
    /// shortcode per recipient.
    pub async fn issue_share_token(
        &self,
        tenant: &Tenant,
        parent: &Permission,
        source_id: &str,
        recipients: &[&str],
        request: ShareRequest,
    ) -> Result<Permission, PermissionError> {
        let mut codes = BTreeMap::new();
        let mut shortcodes = BTreeMap::new();
        for recipient in recipients {
            codes.insert(recipient.to_string(), generate_code());
            shortcodes.insert(recipient.to_string(), generate_shortcode());
        }
        self.permissions
            .create_share_set(tenant, parent, source_id, codes, shortcodes, request)
            .await
    }

    /// Log out every other browser of the user. Returns how many sessions were deleted.
    pub async fn revoke_all_sessions_except_current(
        &self,
        tenant: &Tenant,
        current: &Session,
    ) -> Result<usize, SessionError> {
        self.sessions.revoke_others(tenant, &current.id).await
    }

    fn log_grant(&self, permission: &Permission, requested: &Rule) {
        debug!(
            perm_type = %permission.perm_type,
            source_id = %permission.source_id,
            doctype = %requested.doctype,
            verbs = %requested.verbs,
            "Permission granted"
        );
    }

    fn log_denial(&self, permission: &Permission, requested: &Rule) {
        trace!(
            perm_type = %permission.perm_type,
            source_id = %permission.source_id,
            doctype = %requested.doctype,
            verbs = %requested.verbs,
            "Permission denied"
        );
    }
}
