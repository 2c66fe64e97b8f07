//! In-memory docgate stack.

use super::FlakyStore;
use docgate::Authority;
use docgate::config::Config;
use docgate::db::Database;
use docgate::lock::MemoryLocks;
use docgate::session::{Session, SessionDuration};
use docgate::store::Documents;
use docgate::tenant::Tenant;
use docgate_rules::{Rule, Verb, VerbSet};
use std::sync::Arc;

/// Config with a short index retry delay.
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.permissions.index_retry_delay_ms = 10;
    config
}

pub fn rule(title: &str, doctype: &str, verbs: &[Verb]) -> Rule {
    Rule::new(title, doctype, VerbSet::from_verbs(verbs.iter().copied()))
}

pub struct Harness {
    pub store: Arc<FlakyStore>,
    pub docs: Documents,
    pub locks: MemoryLocks,
    pub authority: Authority,
    pub tenant: Tenant,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_config(test_config()).await
    }

    pub async fn with_config(config: Config) -> Self {
        let db = Database::new(":memory:").await.expect("in-memory database");
        let store = Arc::new(FlakyStore::new(db.store()));
        let locks = MemoryLocks::new();
        let authority = Authority::from_config(&config, store.clone(), Arc::new(locks.clone()));
        Self {
            docs: Documents::new(store.clone()),
            store,
            locks,
            authority,
            tenant: Tenant::new(
                "alice.example.net",
                "alice-example-net",
                b"a session secret of decent length".to_vec(),
            ),
        }
    }

    /// Persist a session last seen `ago` in the past.
    pub async fn session_seen(&self, ago: chrono::Duration, sid: Option<&str>) -> Session {
        let mut session = Session::new(SessionDuration::Normal, sid.map(str::to_string));
        session.last_seen = session.last_seen - ago;
        session.created_at = session.last_seen;
        self.docs
            .create(self.tenant.prefix(), &mut session)
            .await
            .expect("create session");
        session
    }
}
