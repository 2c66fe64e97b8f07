//! Permission repository.
//!
//! Lookups, creation, update and revocation of [`Permission`] documents.
//! Permission documents carry no lock: the "one document per source"
//! invariant for apps and konnectors is check-then-create, and a lost race
//! surfaces as [`PermissionError::AlreadyExists`] on the next attempt.

use super::{DOCTYPE_VERSION, Expiry, Metadata, Permission, PermissionType};
use crate::config::PermissionsConfig;
use crate::error::PermissionError;
use crate::permission::policy::{DefaultDoctypePolicy, DoctypePolicy};
use crate::security::password::hash_password;
use crate::store::doctypes::{APPS, KONNECTORS, SHARINGS};
use crate::store::{Documents, FindRequest, StoreError, View, ViewRequest, ViewRow};
use crate::telemetry::spans;
use crate::tenant::Tenant;
use docgate_rules::{FileRuleMatcher, FlatFileMatcher, ID_SELECTOR, Set, VerbSet};
use serde_json::{Value, json};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tracing::{Instrument, debug, info, warn};

/// Name of the secondary index on `(type, source_id)`.
pub const BY_SOURCE_AND_TYPE: &str = "by-source-and-type";

/// Maximum number of documents removed when destroying an app's permissions.
const DESTROY_LIMIT: usize = 1000;

type Result<T, E = PermissionError> = std::result::Result<T, E>;

/// Rules and options of a new share document.
#[derive(Debug, Clone, Default)]
pub struct ShareRequest {
    pub permissions: Set,
    pub expires_at: Expiry,
    /// Plain text password; hashed before storage.
    pub password: Option<String>,
    pub metadata: Option<Metadata>,
}

impl ShareRequest {
    pub fn new(permissions: Set) -> Self {
        Self {
            permissions,
            ..Self::default()
        }
    }
}

/// Skip-based pagination over a view.
#[derive(Debug, Clone)]
pub struct Cursor {
    limit: usize,
    skip: usize,
    has_more: bool,
}

impl Cursor {
    pub fn new(limit: usize) -> Self {
        Self {
            limit: limit.max(1),
            skip: 0,
            has_more: true,
        }
    }

    pub fn skip(&self) -> usize {
        self.skip
    }

    /// False once a page came back short.
    pub fn has_more(&self) -> bool {
        self.has_more
    }

    // one extra row tells whether another page exists
    fn apply_to(&self, req: ViewRequest) -> ViewRequest {
        req.page(self.skip, self.limit + 1)
    }

    fn update_from(&mut self, rows: &mut Vec<ViewRow>) {
        if rows.len() > self.limit {
            rows.truncate(self.limit);
            self.skip += self.limit;
            self.has_more = true;
        } else {
            self.has_more = false;
        }
    }
}

/// Merge `extra` into `perms`: same-titled rules get the union of their verbs
/// and values, new rules are appended.
pub fn merge_extra_permissions(perms: &Set, extra: &Set) -> Set {
    perms.merged(extra)
}

fn source_id(doctype: &str, slug: &str) -> String {
    format!("{doctype}/{slug}")
}

fn single_row(rows: &[ViewRow], what: &str) -> Result<()> {
    match rows.len() {
        0 => Err(PermissionError::TokenNotFound),
        1 => Ok(()),
        n => Err(PermissionError::BadState(format!("{n} permission docs for one {what}"))),
    }
}

/// Permission operations for all tenants.
#[derive(Clone)]
pub struct PermissionRepository {
    docs: Documents,
    policy: Arc<dyn DoctypePolicy>,
    files: Arc<dyn FileRuleMatcher + Send + Sync>,
    retry_delay: Duration,
    dev_mode: bool,
}

impl PermissionRepository {
    pub fn new(docs: Documents, config: &PermissionsConfig, dev_mode: bool) -> Self {
        Self {
            docs,
            policy: Arc::new(DefaultDoctypePolicy::default()),
            files: Arc::new(FlatFileMatcher),
            retry_delay: config.index_retry_delay(),
            dev_mode,
        }
    }

    pub fn with_policy(mut self, policy: Arc<dyn DoctypePolicy>) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_file_matcher(mut self, files: Arc<dyn FileRuleMatcher + Send + Sync>) -> Self {
        self.files = files;
        self
    }

    pub fn documents(&self) -> &Documents {
        &self.docs
    }

    /// Fetch a document by ID, rejecting it once expired.
    pub async fn get_by_id(&self, tenant: &Tenant, id: &str) -> Result<Permission> {
        let perm: Permission = self.docs.get(tenant.prefix(), id).await?;
        if perm.expired() {
            return Err(PermissionError::ExpiredToken);
        }
        Ok(perm)
    }

    /// Query the `(type, source_id)` index, retrying once after a delay if
    /// the index has not caught up with a recent write.
    async fn find_by_source(
        &self,
        tenant: &Tenant,
        perm_type: PermissionType,
        source_id: &str,
        limit: usize,
    ) -> Result<Vec<Permission>> {
        let req = FindRequest {
            index: BY_SOURCE_AND_TYPE,
            selector: vec![
                ("type", perm_type.as_str().to_string()),
                ("source_id", source_id.to_string()),
            ],
            limit,
        };
        match self.docs.find(tenant.prefix(), &req).await {
            Err(StoreError::IndexNotReady(reason)) => {
                debug!(source_id = %source_id, reason = %reason, "index not ready, retrying");
                tokio::time::sleep(self.retry_delay).await;
                Ok(self.docs.find(tenant.prefix(), &req).await?)
            }
            other => Ok(other?),
        }
    }

    /// The live document of `perm_type` owned by `source_id`.
    ///
    /// Several documents for an app, konnector or CLI source is a data
    /// integrity fault and yields [`PermissionError::BadState`].
    pub async fn lookup_by_source(
        &self,
        tenant: &Tenant,
        perm_type: PermissionType,
        source_id: &str,
    ) -> Result<Permission> {
        let found = self.find_by_source(tenant, perm_type, source_id, 2).await?;
        if found.len() > 1 && perm_type.unique_per_source() {
            return Err(PermissionError::BadState(format!(
                "several {perm_type} permission docs for {source_id}"
            )));
        }
        let perm = found.into_iter().next().ok_or(PermissionError::NotFound)?;
        if perm.expired() {
            return Err(PermissionError::ExpiredToken);
        }
        Ok(perm)
    }

    pub async fn get_for_webapp(&self, tenant: &Tenant, slug: &str) -> Result<Permission> {
        self.lookup_by_source(tenant, PermissionType::Webapp, &source_id(APPS, slug))
            .await
    }

    pub async fn get_for_konnector(&self, tenant: &Tenant, slug: &str) -> Result<Permission> {
        self.lookup_by_source(tenant, PermissionType::Konnector, &source_id(KONNECTORS, slug))
            .await
    }

    pub async fn get_for_share_preview(&self, tenant: &Tenant, sharing_id: &str) -> Result<Permission> {
        self.lookup_by_source(tenant, PermissionType::SharePreview, &source_id(SHARINGS, sharing_id))
            .await
    }

    pub async fn get_for_share_interact(&self, tenant: &Tenant, sharing_id: &str) -> Result<Permission> {
        self.lookup_by_source(tenant, PermissionType::ShareInteract, &source_id(SHARINGS, sharing_id))
            .await
    }

    /// Resolve a share token to its document.
    ///
    /// Outside dev mode the document's source (app, konnector or sharing)
    /// must still exist; a share made by an uninstalled app is expired.
    pub async fn get_for_share_code(&self, tenant: &Tenant, code: &str) -> Result<Permission> {
        let rows = self
            .docs
            .exec_view(tenant.prefix(), View::PermissionsByCode, &ViewRequest::key(code).include_docs())
            .await?;
        single_row(&rows, "token")?;
        let perm = self.decode_row(rows)?;

        if perm.expired() {
            return Err(PermissionError::ExpiredToken);
        }

        if !self.dev_mode
            && let Some((doctype, rest)) = perm.source_parts()
        {
            let doc_id = if doctype == SHARINGS { rest } else { perm.source_id.as_str() };
            match self.docs.raw().get(tenant.prefix(), doctype, doc_id).await {
                Ok(_) => {}
                Err(e) if e.is_not_found() => {
                    debug!(source_id = %perm.source_id, "share source is gone");
                    return Err(PermissionError::ExpiredToken);
                }
                Err(e) => return Err(PermissionError::Store(e)),
            }
        }
        Ok(perm)
    }

    pub async fn token_from_shortcode(&self, tenant: &Tenant, shortcode: &str) -> Result<String> {
        let (token, _) = self.token_and_permission_from_shortcode(tenant, shortcode).await?;
        Ok(token)
    }

    /// Resolve a shortcode to the recipient's long token and the document.
    pub async fn token_and_permission_from_shortcode(
        &self,
        tenant: &Tenant,
        shortcode: &str,
    ) -> Result<(String, Permission)> {
        let rows = self
            .docs
            .exec_view(
                tenant.prefix(),
                View::PermissionsByShortcode,
                &ViewRequest::key(shortcode).include_docs(),
            )
            .await?;
        single_row(&rows, "shortcode")?;
        let email = rows[0].value.as_str().unwrap_or_default().to_string();
        let perm = self.decode_row(rows)?;

        if perm.expired() {
            return Err(PermissionError::ExpiredToken);
        }

        let token = perm
            .codes
            .get(&email)
            .cloned()
            .ok_or_else(|| PermissionError::BadState("no token for shortcode recipient".to_string()))?;
        Ok((token, perm))
    }

    fn decode_row(&self, rows: Vec<ViewRow>) -> Result<Permission> {
        let doc = rows
            .into_iter()
            .next()
            .and_then(|row| row.doc)
            .ok_or_else(|| PermissionError::BadState("view row without document".to_string()))?;
        Ok(Documents::decode(doc)?)
    }

    pub async fn create_webapp_set(
        &self,
        tenant: &Tenant,
        slug: &str,
        set: Set,
        version: Option<&str>,
    ) -> Result<Permission> {
        self.create_app_set(tenant, PermissionType::Webapp, APPS, slug, set, version)
            .await
    }

    pub async fn create_konnector_set(
        &self,
        tenant: &Tenant,
        slug: &str,
        set: Set,
        version: Option<&str>,
    ) -> Result<Permission> {
        self.create_app_set(tenant, PermissionType::Konnector, KONNECTORS, slug, set, version)
            .await
    }

    async fn create_app_set(
        &self,
        tenant: &Tenant,
        perm_type: PermissionType,
        doctype: &str,
        slug: &str,
        set: Set,
        version: Option<&str>,
    ) -> Result<Permission> {
        let source = source_id(doctype, slug);
        let span = spans::permission(tenant.prefix(), "create", Some(source.as_str()));
        async {
            let existing = self.find_by_source(tenant, perm_type, &source, 2).await?;
            if existing.iter().any(|p| !p.expired()) {
                return Err(PermissionError::AlreadyExists(source));
            }

            let mut doc = Permission::new(perm_type, source, set);
            doc.metadata = Some(Metadata::new_with_app(slug, version, DOCTYPE_VERSION));

            // Expired documents are overwritten in place so the source keeps a single row.
            let mut expired = existing.into_iter();
            match expired.next() {
                Some(old) => {
                    doc.id = old.id;
                    doc.rev = old.rev;
                    self.docs.update(tenant.prefix(), &mut doc).await?;
                    for stale in expired {
                        self.docs.delete(tenant.prefix(), &stale).await?;
                    }
                    info!(id = %doc.id, "expired permission replaced");
                }
                None => {
                    self.docs.create(tenant.prefix(), &mut doc).await?;
                    info!(id = %doc.id, "permission created");
                }
            }
            Ok(doc)
        }
        .instrument(span)
        .await
    }

    pub async fn update_webapp_set(&self, tenant: &Tenant, slug: &str, set: Set) -> Result<Permission> {
        let doc = self.get_for_webapp(tenant, slug).await?;
        self.update_app_set(tenant, doc, slug, set).await
    }

    pub async fn update_konnector_set(&self, tenant: &Tenant, slug: &str, set: Set) -> Result<Permission> {
        let doc = self.get_for_konnector(tenant, slug).await?;
        self.update_app_set(tenant, doc, slug, set).await
    }

    async fn update_app_set(&self, tenant: &Tenant, mut doc: Permission, slug: &str, set: Set) -> Result<Permission> {
        doc.permissions = set;
        match doc.metadata.as_mut() {
            Some(md) => md.touch(),
            None => doc.metadata = Some(Metadata::new_with_app(slug, None, DOCTYPE_VERSION)),
        }
        self.docs.update(tenant.prefix(), &mut doc).await?;
        debug!(source_id = %doc.source_id, rev = %doc.rev, "permission updated");
        Ok(doc)
    }

    /// Create or replace the document of a webapp.
    pub async fn force_webapp(&self, tenant: &Tenant, slug: &str, set: Set) -> Result<Permission> {
        self.force_app(tenant, PermissionType::Webapp, APPS, slug, set).await
    }

    /// Create or replace the document of a konnector.
    pub async fn force_konnector(&self, tenant: &Tenant, slug: &str, set: Set) -> Result<Permission> {
        self.force_app(tenant, PermissionType::Konnector, KONNECTORS, slug, set)
            .await
    }

    async fn force_app(
        &self,
        tenant: &Tenant,
        perm_type: PermissionType,
        doctype: &str,
        slug: &str,
        set: Set,
    ) -> Result<Permission> {
        let source = source_id(doctype, slug);
        let existing = self.find_by_source(tenant, perm_type, &source, 1).await?;
        let mut doc = Permission::new(perm_type, source, set);
        match existing.into_iter().next() {
            Some(old) => {
                doc.id = old.id;
                doc.rev = old.rev;
                doc.metadata = old.metadata;
                if let Some(md) = doc.metadata.as_mut() {
                    md.touch();
                }
                self.docs.update(tenant.prefix(), &mut doc).await?;
            }
            None => self.docs.create(tenant.prefix(), &mut doc).await?,
        }
        Ok(doc)
    }

    /// Remove every document owned by a webapp.
    pub async fn destroy_webapp(&self, tenant: &Tenant, slug: &str) -> Result<()> {
        self.destroy_app(tenant, PermissionType::Webapp, APPS, slug).await
    }

    /// Remove every document owned by a konnector.
    pub async fn destroy_konnector(&self, tenant: &Tenant, slug: &str) -> Result<()> {
        self.destroy_app(tenant, PermissionType::Konnector, KONNECTORS, slug)
            .await
    }

    async fn destroy_app(&self, tenant: &Tenant, perm_type: PermissionType, doctype: &str, slug: &str) -> Result<()> {
        let source = source_id(doctype, slug);
        let req = FindRequest {
            index: BY_SOURCE_AND_TYPE,
            selector: vec![("source_id", source.clone()), ("type", perm_type.as_str().to_string())],
            limit: DESTROY_LIMIT,
        };
        let docs: Vec<Permission> = self.docs.find(tenant.prefix(), &req).await?;
        for doc in &docs {
            self.docs.delete(tenant.prefix(), doc).await?;
        }
        info!(source_id = %source, count = docs.len(), "permissions destroyed");
        Ok(())
    }

    /// Validate a delegated set against the permissions of its parent.
    ///
    /// Only apps, konnectors, OAuth clients and CLI tokens can delegate; the
    /// set must be within the parent's; and every non-file doctype must be
    /// writable. The error never says which rule failed.
    pub fn check_set_permissions(&self, set: &Set, parent: &Permission) -> Result<()> {
        if !parent.perm_type.can_delegate() {
            return Err(PermissionError::OnlyAppCanCreateSubSet);
        }
        if !set.is_subset_of_with(&parent.permissions, self.files.as_ref()) {
            return Err(PermissionError::NotSubset);
        }
        for rule in set.iter().filter(|r| !r.is_file_rule()) {
            self.policy.check_writable(&rule.doctype)?;
        }
        Ok(())
    }

    /// Create a share-by-link document scoped under `parent`.
    ///
    /// Nothing is written unless the whole set passes
    /// [`check_set_permissions`](Self::check_set_permissions).
    pub async fn create_share_set(
        &self,
        tenant: &Tenant,
        parent: &Permission,
        source_id: &str,
        codes: BTreeMap<String, String>,
        shortcodes: BTreeMap<String, String>,
        request: ShareRequest,
    ) -> Result<Permission> {
        self.check_set_permissions(&request.permissions, parent)?;

        // the source stays the parent's so destroying it reaches every child
        let mut doc = Permission::new(PermissionType::ShareByLink, source_id, request.permissions);
        doc.short_codes = shortcodes;
        doc.patch_codes(codes);
        doc.expires_at = request.expires_at;
        doc.metadata = request.metadata;
        if let Some(pass) = request.password.filter(|p| !p.is_empty()) {
            let hash = hash_password(&pass).map_err(|e| PermissionError::Password(e.to_string()))?;
            doc.password = Some(hash);
        }

        self.docs.create(tenant.prefix(), &mut doc).await?;
        debug!(id = %doc.id, source_id = %doc.source_id, recipients = doc.codes.len(), "share created");
        Ok(doc)
    }

    /// Create the document used to preview a sharing before accepting it.
    pub async fn create_share_preview_set(
        &self,
        tenant: &Tenant,
        sharing_id: &str,
        codes: BTreeMap<String, String>,
        shortcodes: BTreeMap<String, String>,
        request: ShareRequest,
    ) -> Result<Permission> {
        let mut doc = Permission::new(
            PermissionType::SharePreview,
            source_id(SHARINGS, sharing_id),
            request.permissions,
        );
        doc.short_codes = shortcodes;
        doc.patch_codes(codes);
        doc.metadata = request.metadata;
        self.docs.create(tenant.prefix(), &mut doc).await?;
        Ok(doc)
    }

    /// Create the document granting read/write on a note inside a sharing.
    pub async fn create_share_interact_set(
        &self,
        tenant: &Tenant,
        sharing_id: &str,
        codes: BTreeMap<String, String>,
        request: ShareRequest,
    ) -> Result<Permission> {
        let mut doc = Permission::new(
            PermissionType::ShareInteract,
            source_id(SHARINGS, sharing_id),
            request.permissions,
        );
        doc.codes = codes;
        doc.metadata = request.metadata;
        self.docs.create(tenant.prefix(), &mut doc).await?;
        Ok(doc)
    }

    /// Persist changes made to a loaded document.
    pub async fn update(&self, tenant: &Tenant, doc: &mut Permission) -> Result<()> {
        if let Some(md) = doc.metadata.as_mut() {
            md.touch();
        }
        self.docs.update(tenant.prefix(), doc).await?;
        Ok(())
    }

    /// Delete a document. Revoking a document that is already gone is
    /// reported as [`PermissionError::NotFound`].
    pub async fn revoke(&self, tenant: &Tenant, doc: &Permission) -> Result<()> {
        self.docs.delete(tenant.prefix(), doc).await?;
        info!(id = %doc.id, source_id = %doc.source_id, "permission revoked");
        Ok(())
    }

    /// For each document ID, the union of the verbs granted on it by share documents.
    pub async fn permissions_for_ids(
        &self,
        tenant: &Tenant,
        doctype: &str,
        ids: &[&str],
    ) -> Result<HashMap<String, VerbSet>> {
        let keys = ids.iter().map(|id| json!([doctype, ID_SELECTOR, id]));
        let rows = self
            .docs
            .exec_view(tenant.prefix(), View::PermissionsByDoc, &ViewRequest::keys(keys))
            .await?;

        let mut result: HashMap<String, VerbSet> = HashMap::new();
        for row in rows {
            let Some(id) = row.key.get(2).and_then(Value::as_str) else {
                continue;
            };
            let verbs: VerbSet = match serde_json::from_value(row.value) {
                Ok(verbs) => verbs,
                Err(e) => {
                    warn!(id = %row.id, error = %e, "unreadable verbs in permission doc");
                    continue;
                }
            };
            result
                .entry(id.to_string())
                .and_modify(|acc| acc.merge(&verbs))
                .or_insert(verbs);
        }
        Ok(result)
    }

    /// Documents of `perm_type` with at least one rule on `doctype`, one page
    /// at a time. The cursor advances in place.
    pub async fn permissions_by_doctype(
        &self,
        tenant: &Tenant,
        perm_type: PermissionType,
        doctype: &str,
        cursor: &mut Cursor,
    ) -> Result<Vec<Permission>> {
        let req = cursor.apply_to(ViewRequest::key(json!([doctype, perm_type.as_str()])).include_docs());
        let mut rows = self
            .docs
            .exec_view(tenant.prefix(), View::PermissionsByDoctype, &req)
            .await?;
        cursor.update_from(&mut rows);

        rows.into_iter()
            .map(|row| {
                let doc = row
                    .doc
                    .ok_or_else(|| PermissionError::BadState("view row without document".to_string()))?;
                Ok(Documents::decode(doc)?)
            })
            .collect()
    }
}
