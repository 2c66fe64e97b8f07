//! Session repository.
//!
//! Expiry and `last_seen` refresh are side effects of resolving a session;
//! both run under the advisory lock `sessions/<id>` and neither can fail the
//! request: write errors are logged under the `loginaudit` target.

use super::cookie::{CookiePolicy, SessionCookie};
use super::{Session, SessionDuration};
use crate::config::SessionsConfig;
use crate::error::SessionError;
use crate::lock::AdvisoryLock;
use crate::store::Documents;
use crate::telemetry::spans;
use crate::tenant::Tenant;
use chrono::Utc;
use std::sync::Arc;
use tracing::{Instrument, debug, error, info, warn};

type Result<T, E = SessionError> = std::result::Result<T, E>;

/// Page size when walking every session of a tenant.
const SCAN_PAGE: usize = 1000;

fn lock_resource(session_id: &str) -> String {
    format!("sessions/{session_id}")
}

/// Session operations for all tenants.
#[derive(Clone)]
pub struct SessionRepository {
    docs: Documents,
    locks: Arc<dyn AdvisoryLock>,
    config: SessionsConfig,
    cookies: CookiePolicy,
}

impl SessionRepository {
    pub fn new(docs: Documents, locks: Arc<dyn AdvisoryLock>, config: SessionsConfig, cookies: CookiePolicy) -> Self {
        Self {
            docs,
            locks,
            config,
            cookies,
        }
    }

    pub fn cookie_policy(&self) -> &CookiePolicy {
        &self.cookies
    }

    /// Persist a new session seen now.
    pub async fn create(&self, tenant: &Tenant, duration: SessionDuration, sid: Option<&str>) -> Result<Session> {
        let mut session = Session::new(duration, sid.map(str::to_string));
        self.docs.create(tenant.prefix(), &mut session).await?;
        info!(target: "loginaudit", tenant = %tenant.domain(), session_id = %session.id, "session created");
        Ok(session)
    }

    /// Fetch a session, deleting it if expired and refreshing `last_seen`
    /// once per refresh window.
    pub async fn get(&self, tenant: &Tenant, session_id: &str) -> Result<Session> {
        let span = spans::session(tenant.prefix(), "get", Some(session_id));
        self.resolve(tenant, session_id).instrument(span).await
    }

    async fn resolve(&self, tenant: &Tenant, session_id: &str) -> Result<Session> {
        let mut session: Session = self.docs.get(tenant.prefix(), session_id).await?;
        let now = Utc::now();

        if session.older_than_at(self.config.max_age(), now) {
            let _guard = self
                .locks
                .acquire(tenant.prefix(), &lock_resource(session_id))
                .await;
            match self.docs.delete(tenant.prefix(), &session).await {
                Ok(()) => info!(target: "loginaudit", session_id = %session_id, "expired session deleted"),
                Err(e) => warn!(target: "loginaudit", session_id = %session_id, error = %e, "failed to delete expired session"),
            }
            return Err(SessionError::Expired);
        }

        if session.older_than_at(self.config.refresh_window(), now) {
            let _guard = self
                .locks
                .acquire(tenant.prefix(), &lock_resource(session_id))
                .await;
            let previous = session.last_seen;
            session.last_seen = now;
            if let Err(e) = self.docs.update(tenant.prefix(), &mut session).await {
                session.last_seen = previous;
                debug!(target: "loginaudit", session_id = %session_id, error = %e, "failed to refresh last_seen");
            }
        }

        Ok(session)
    }

    /// Resolve the session named by a cookie value.
    pub async fn from_cookie(&self, tenant: &Tenant, cookie_value: Option<&str>) -> Result<Session> {
        let value = cookie_value.ok_or(SessionError::NoCookie)?;
        let session_id = self.cookies.session_id_from_cookie(value, tenant)?;
        self.get(tenant, &session_id).await
    }

    /// Signed cookie for `session`.
    pub fn to_cookie(&self, session: &Session, tenant: &Tenant) -> Result<SessionCookie> {
        self.cookies.to_cookie(session, tenant)
    }

    /// Active sessions. Expired ones found on the way are bulk deleted,
    /// best effort.
    pub async fn list_active(&self, tenant: &Tenant) -> Result<Vec<Session>> {
        let sessions: Vec<Session> = self.docs.all(tenant.prefix(), 0, self.config.list_limit).await?;
        let now = Utc::now();
        let max_age = self.config.max_age();
        let (expired, kept): (Vec<Session>, Vec<Session>) =
            sessions.into_iter().partition(|s| s.older_than_at(max_age, now));

        if !expired.is_empty() {
            match self.docs.bulk_delete(tenant.prefix(), &expired).await {
                Ok(()) => debug!(target: "sessions", count = expired.len(), "expired sessions deleted"),
                Err(e) => info!(target: "sessions", error = %e, "error while deleting expired sessions"),
            }
        }
        Ok(kept)
    }

    /// Delete a session and return the cookie that clears it in the browser.
    /// A failed delete is logged only.
    pub async fn delete(&self, tenant: &Tenant, session: &Session) -> SessionCookie {
        self.delete_logged(tenant, session).await;
        self.cookies.clearing_cookie(tenant)
    }

    async fn delete_logged(&self, tenant: &Tenant, session: &Session) -> bool {
        match self.docs.delete(tenant.prefix(), session).await {
            Ok(()) => {
                info!(target: "loginaudit", session_id = %session.id, "session deleted");
                true
            }
            Err(e) => {
                error!(target: "loginaudit", session_id = %session.id, error = %e, "failed to delete session");
                false
            }
        }
    }

    /// Every session of the tenant, expired or not.
    async fn all_sessions(&self, tenant: &Tenant) -> Result<Vec<Session>> {
        let mut all = Vec::new();
        loop {
            let page: Vec<Session> = self.docs.all(tenant.prefix(), all.len(), SCAN_PAGE).await?;
            let done = page.len() < SCAN_PAGE;
            all.extend(page);
            if done {
                return Ok(all);
            }
        }
    }

    /// Delete every session except `keep_id`. Returns how many were deleted.
    pub async fn revoke_others(&self, tenant: &Tenant, keep_id: &str) -> Result<usize> {
        let mut deleted = 0;
        for session in self.all_sessions(tenant).await? {
            if session.id != keep_id && self.delete_logged(tenant, &session).await {
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    /// Delete every session opened through the identity provider session
    /// `sid`. A user may have several, one per device.
    pub async fn revoke_by_sid(&self, tenant: &Tenant, sid: &str) -> Result<usize> {
        let mut deleted = 0;
        for session in self.all_sessions(tenant).await? {
            if session.sid.as_deref() == Some(sid) && self.delete_logged(tenant, &session).await {
                deleted += 1;
            }
        }
        Ok(deleted)
    }
}
