//! Browser sessions.
//!
//! A [`Session`] is created on successful login and resolved on every
//! request from the signed cookie carrying its ID.
//!
//! ```text
//! Created ──▶ Active (last_seen refreshed at most once per window)
//!                │
//!                ├──▶ Expired  (unseen for longer than the max age)
//!                └──▶ Revoked  (logout, logout-others, back-channel logout)
//! ```
//!
//! Both terminal states delete the document; nothing soft-deleted is kept.

pub mod cookie;
pub mod store;

pub use cookie::{CookiePolicy, SessionCookie};
pub use store::SessionRepository;

use crate::store::Document;
use crate::store::doctypes::SESSIONS;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Lifetime of the session cookie.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionDuration {
    /// Five minutes, for OAuth dances.
    Short,
    /// Until the browser is closed.
    Normal,
    /// As long as possible.
    Long,
}

/// A tenant opened in a browser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    #[serde(rename = "_id", default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(rename = "_rev", default, skip_serializing_if = "String::is_empty")]
    pub rev: String,
    pub created_at: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    #[serde(default)]
    pub long_run: bool,
    #[serde(default)]
    pub short_run: bool,
    /// Identity provider session ID, for back-channel logout.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sid: Option<String>,
}

impl Session {
    /// A new, not yet persisted session seen now.
    pub fn new(duration: SessionDuration, sid: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: String::new(),
            rev: String::new(),
            created_at: now,
            last_seen: now,
            long_run: duration == SessionDuration::Long,
            short_run: duration == SessionDuration::Short,
            sid,
        }
    }

    pub fn duration(&self) -> SessionDuration {
        if self.long_run {
            SessionDuration::Long
        } else if self.short_run {
            SessionDuration::Short
        } else {
            SessionDuration::Normal
        }
    }

    /// True when the session was last seen more than `age` ago.
    pub fn older_than(&self, age: Duration) -> bool {
        self.older_than_at(age, Utc::now())
    }

    pub fn older_than_at(&self, age: Duration, now: DateTime<Utc>) -> bool {
        match now.signed_duration_since(self.last_seen).to_std() {
            Ok(elapsed) => elapsed > age,
            // last seen in the future
            Err(_) => false,
        }
    }
}

impl Document for Session {
    const DOCTYPE: &'static str = SESSIONS;

    fn id(&self) -> &str {
        &self.id
    }

    fn rev(&self) -> &str {
        &self.rev
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }

    fn set_rev(&mut self, rev: String) {
        self.rev = rev;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_duration_flags_are_exclusive() {
        for duration in [SessionDuration::Short, SessionDuration::Normal, SessionDuration::Long] {
            let session = Session::new(duration, None);
            assert!(!(session.long_run && session.short_run));
            assert_eq!(session.duration(), duration);
        }
    }

    #[test]
    fn test_older_than() {
        let mut session = Session::new(SessionDuration::Normal, None);
        let now = session.last_seen;
        assert!(!session.older_than_at(Duration::from_secs(60), now));

        session.last_seen = now - chrono::Duration::minutes(2);
        assert!(session.older_than_at(Duration::from_secs(60), now));

        session.last_seen = now + chrono::Duration::minutes(2);
        assert!(!session.older_than_at(Duration::from_secs(60), now));
    }

    #[test]
    fn test_document_shape() {
        let session = Session::new(SessionDuration::Long, Some("idp-sid".into()));
        let value = serde_json::to_value(&session).unwrap();
        assert_eq!(value["long_run"], json!(true));
        assert_eq!(value["short_run"], json!(false));
        assert_eq!(value["sid"], json!("idp-sid"));
        assert!(value.get("created_at").is_some());
        assert!(value.get("last_seen").is_some());
        assert!(value.get("_id").is_none());

        let plain = Session::new(SessionDuration::Normal, None);
        assert!(serde_json::to_value(&plain).unwrap().get("sid").is_none());
    }
}
