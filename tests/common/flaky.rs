//! Document store wrapper with injectable faults.

use async_trait::async_trait;
use docgate::db::SqliteStore;
use docgate::store::{DocumentStore, FindRequest, RawDoc, StoreError, View, ViewRequest, ViewRow};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Delegates to a [`SqliteStore`], failing on demand.
pub struct FlakyStore {
    inner: SqliteStore,
    /// Number of upcoming `find` calls that report a stale index.
    pub stale_finds: AtomicUsize,
    /// Total `find` calls seen.
    pub finds: AtomicUsize,
    /// Fail every `update`.
    pub fail_updates: AtomicBool,
}

impl FlakyStore {
    pub fn new(inner: SqliteStore) -> Self {
        Self {
            inner,
            stale_finds: AtomicUsize::new(0),
            finds: AtomicUsize::new(0),
            fail_updates: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl DocumentStore for FlakyStore {
    async fn create(&self, tenant: &str, doctype: &str, id: Option<&str>, body: Value) -> Result<RawDoc, StoreError> {
        self.inner.create(tenant, doctype, id, body).await
    }

    async fn get(&self, tenant: &str, doctype: &str, id: &str) -> Result<RawDoc, StoreError> {
        self.inner.get(tenant, doctype, id).await
    }

    async fn update(
        &self,
        tenant: &str,
        doctype: &str,
        id: &str,
        rev: &str,
        body: Value,
    ) -> Result<String, StoreError> {
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("injected update failure".into()));
        }
        self.inner.update(tenant, doctype, id, rev, body).await
    }

    async fn delete(&self, tenant: &str, doctype: &str, id: &str, rev: &str) -> Result<(), StoreError> {
        self.inner.delete(tenant, doctype, id, rev).await
    }

    async fn find(&self, tenant: &str, doctype: &str, req: &FindRequest) -> Result<Vec<RawDoc>, StoreError> {
        self.finds.fetch_add(1, Ordering::SeqCst);
        let stale = self
            .stale_finds
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if stale {
            return Err(StoreError::IndexNotReady(req.index.to_string()));
        }
        self.inner.find(tenant, doctype, req).await
    }

    async fn exec_view(&self, tenant: &str, view: View, req: &ViewRequest) -> Result<Vec<ViewRow>, StoreError> {
        self.inner.exec_view(tenant, view, req).await
    }

    async fn all_docs(
        &self,
        tenant: &str,
        doctype: &str,
        skip: usize,
        limit: usize,
    ) -> Result<Vec<RawDoc>, StoreError> {
        self.inner.all_docs(tenant, doctype, skip, limit).await
    }

    async fn bulk_delete(&self, tenant: &str, doctype: &str, docs: &[(String, String)]) -> Result<(), StoreError> {
        self.inner.bulk_delete(tenant, doctype, docs).await
    }
}
