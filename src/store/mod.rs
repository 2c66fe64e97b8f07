//! Document store seam.
//!
//! The authorization core talks to a remote, per-tenant document store with
//! no cross-document transactions. [`DocumentStore`] is the raw, object-safe
//! interface; [`Documents`] layers serde-typed access on top of it.
//!
//! Secondary indexes may lag behind writes: a store reports that as
//! [`StoreError::IndexNotReady`] and callers decide whether to retry.

pub mod doctypes;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::sync::Arc;
use thiserror::Error;

/// Store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("document not found: {doctype}/{id}")]
    NotFound { doctype: String, id: String },
    #[error("document update conflict: {doctype}/{id}")]
    Conflict { doctype: String, id: String },
    #[error("index not ready: {0}")]
    IndexNotReady(String),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("storage backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// True for a missing document.
    #[inline]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Get a static error code string for log labeling.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::Conflict { .. } => "conflict",
            Self::IndexNotReady(_) => "index_not_ready",
            Self::Serialization(_) => "serialization",
            Self::Backend(_) => "backend",
        }
    }

    pub(crate) fn not_found(doctype: &str, id: &str) -> Self {
        Self::NotFound {
            doctype: doctype.to_string(),
            id: id.to_string(),
        }
    }

    pub(crate) fn conflict(doctype: &str, id: &str) -> Self {
        Self::Conflict {
            doctype: doctype.to_string(),
            id: id.to_string(),
        }
    }
}

/// A stored document. `body` never carries `_id` or `_rev`.
#[derive(Debug, Clone, PartialEq)]
pub struct RawDoc {
    pub id: String,
    pub rev: String,
    pub body: Value,
}

/// Equality query over top-level fields, served by a named index.
#[derive(Debug, Clone)]
pub struct FindRequest {
    pub index: &'static str,
    pub selector: Vec<(&'static str, String)>,
    pub limit: usize,
}

/// Pre-built views over the permissions doctype.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    /// key: issued token, value: recipient email.
    PermissionsByCode,
    /// key: shortcode, value: recipient email.
    PermissionsByShortcode,
    /// key: `[doctype, selector, value]`, value: verbs. Share documents only.
    PermissionsByDoc,
    /// key: `[doctype, permission type]`, value: null.
    PermissionsByDoctype,
}

impl View {
    pub fn name(self) -> &'static str {
        match self {
            View::PermissionsByCode => "permissions-by-code",
            View::PermissionsByShortcode => "permissions-by-shortcode",
            View::PermissionsByDoc => "permissions-by-doc",
            View::PermissionsByDoctype => "permissions-by-doctype",
        }
    }
}

/// View query: rows matching any of `keys`, in key order.
#[derive(Debug, Clone, Default)]
pub struct ViewRequest {
    pub keys: Vec<Value>,
    pub include_docs: bool,
    pub skip: usize,
    pub limit: Option<usize>,
}

impl ViewRequest {
    pub fn key(key: impl Into<Value>) -> Self {
        Self {
            keys: vec![key.into()],
            ..Self::default()
        }
    }

    pub fn keys<I, K>(keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<Value>,
    {
        Self {
            keys: keys.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn include_docs(mut self) -> Self {
        self.include_docs = true;
        self
    }

    pub fn page(mut self, skip: usize, limit: usize) -> Self {
        self.skip = skip;
        self.limit = Some(limit);
        self
    }
}

/// One emitted view row.
#[derive(Debug, Clone)]
pub struct ViewRow {
    pub id: String,
    pub key: Value,
    pub value: Value,
    pub doc: Option<RawDoc>,
}

/// Raw document store operations, partitioned by tenant.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Create a document. The store generates an ID when `id` is `None`.
    async fn create(&self, tenant: &str, doctype: &str, id: Option<&str>, body: Value) -> Result<RawDoc, StoreError>;

    async fn get(&self, tenant: &str, doctype: &str, id: &str) -> Result<RawDoc, StoreError>;

    /// Replace a document at revision `rev`; returns the new revision.
    async fn update(
        &self,
        tenant: &str,
        doctype: &str,
        id: &str,
        rev: &str,
        body: Value,
    ) -> Result<String, StoreError>;

    async fn delete(&self, tenant: &str, doctype: &str, id: &str, rev: &str) -> Result<(), StoreError>;

    async fn find(&self, tenant: &str, doctype: &str, req: &FindRequest) -> Result<Vec<RawDoc>, StoreError>;

    async fn exec_view(&self, tenant: &str, view: View, req: &ViewRequest) -> Result<Vec<ViewRow>, StoreError>;

    /// Documents ordered by ID.
    async fn all_docs(
        &self,
        tenant: &str,
        doctype: &str,
        skip: usize,
        limit: usize,
    ) -> Result<Vec<RawDoc>, StoreError>;

    /// Delete `(id, rev)` pairs. Documents that could not be deleted are
    /// reported as a single error after the others are gone.
    async fn bulk_delete(&self, tenant: &str, doctype: &str, docs: &[(String, String)]) -> Result<(), StoreError>;
}

/// A persisted, serde-typed document.
pub trait Document: Serialize + DeserializeOwned + Send + Sync {
    const DOCTYPE: &'static str;

    fn id(&self) -> &str;
    fn rev(&self) -> &str;
    fn set_id(&mut self, id: String);
    fn set_rev(&mut self, rev: String);
}

/// Typed access to a [`DocumentStore`].
#[derive(Clone)]
pub struct Documents {
    inner: Arc<dyn DocumentStore>,
}

impl Documents {
    pub fn new(inner: Arc<dyn DocumentStore>) -> Self {
        Self { inner }
    }

    /// Underlying raw store.
    pub fn raw(&self) -> &dyn DocumentStore {
        self.inner.as_ref()
    }

    /// Decode a raw document into `D`, restoring `_id` and `_rev`.
    pub fn decode<D: Document>(raw: RawDoc) -> Result<D, StoreError> {
        let mut body = match raw.body {
            Value::Object(map) => map,
            other => {
                return Err(StoreError::Backend(format!(
                    "document {} is not an object: {other}",
                    raw.id
                )));
            }
        };
        body.insert("_id".to_string(), Value::String(raw.id));
        body.insert("_rev".to_string(), Value::String(raw.rev));
        Ok(serde_json::from_value(Value::Object(body))?)
    }

    fn encode<D: Document>(doc: &D) -> Result<Value, StoreError> {
        let mut body = match serde_json::to_value(doc)? {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        body.remove("_id");
        body.remove("_rev");
        Ok(Value::Object(body))
    }

    /// Persist a new document, keeping its ID if it has one.
    pub async fn create<D: Document>(&self, tenant: &str, doc: &mut D) -> Result<(), StoreError> {
        let id = Some(doc.id()).filter(|id| !id.is_empty());
        let stored = self.inner.create(tenant, D::DOCTYPE, id, Self::encode(doc)?).await?;
        doc.set_id(stored.id);
        doc.set_rev(stored.rev);
        Ok(())
    }

    pub async fn get<D: Document>(&self, tenant: &str, id: &str) -> Result<D, StoreError> {
        let raw = self.inner.get(tenant, D::DOCTYPE, id).await?;
        Self::decode(raw)
    }

    pub async fn update<D: Document>(&self, tenant: &str, doc: &mut D) -> Result<(), StoreError> {
        let body = Self::encode(doc)?;
        let rev = self
            .inner
            .update(tenant, D::DOCTYPE, doc.id(), doc.rev(), body)
            .await?;
        doc.set_rev(rev);
        Ok(())
    }

    pub async fn delete<D: Document>(&self, tenant: &str, doc: &D) -> Result<(), StoreError> {
        self.inner.delete(tenant, D::DOCTYPE, doc.id(), doc.rev()).await
    }

    pub async fn find<D: Document>(&self, tenant: &str, req: &FindRequest) -> Result<Vec<D>, StoreError> {
        self.inner
            .find(tenant, D::DOCTYPE, req)
            .await?
            .into_iter()
            .map(Self::decode)
            .collect()
    }

    pub async fn all<D: Document>(&self, tenant: &str, skip: usize, limit: usize) -> Result<Vec<D>, StoreError> {
        self.inner
            .all_docs(tenant, D::DOCTYPE, skip, limit)
            .await?
            .into_iter()
            .map(Self::decode)
            .collect()
    }

    pub async fn bulk_delete<D: Document>(&self, tenant: &str, docs: &[D]) -> Result<(), StoreError> {
        let pairs: Vec<(String, String)> = docs
            .iter()
            .map(|d| (d.id().to_string(), d.rev().to_string()))
            .collect();
        self.inner.bulk_delete(tenant, D::DOCTYPE, &pairs).await
    }

    pub async fn exec_view(&self, tenant: &str, view: View, req: &ViewRequest) -> Result<Vec<ViewRow>, StoreError> {
        self.inner.exec_view(tenant, view, req).await
    }
}
