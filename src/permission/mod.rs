//! Permission documents.
//!
//! A [`Permission`] is a persisted capability record: a rule [`Set`] owned by
//! an app, a konnector, an OAuth client, a CLI token or a sharing grant,
//! optionally reachable through per-recipient codes and shortcodes.
//!
//! - [`policy`]: pluggable doctype writability check
//! - [`store`]: lookups, creation and revocation against the document store

pub mod policy;
pub mod store;

pub use policy::{DefaultDoctypePolicy, DoctypePolicy};
pub use store::{Cursor, PermissionRepository, ShareRequest, merge_extra_permissions};

use crate::store::Document;
use crate::store::doctypes::{INSTANCE_SETTINGS_ID, PERMISSIONS, SETTINGS};
use chrono::{DateTime, SecondsFormat, Utc};
use docgate_rules::{Rule, RuleError, Set, Verb, VerbSet};
use serde::de::Deserializer;
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::ops::Deref;
use std::str::FromStr;

/// Version of the permission document layout, recorded in its metadata.
pub const DOCTYPE_VERSION: &str = "1";

/// Kind of actor owning a permission document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PermissionType {
    /// Temporary permissions granted by a registration token.
    #[serde(rename = "register")]
    Register,
    #[serde(rename = "app")]
    Webapp,
    #[serde(rename = "konnector")]
    Konnector,
    #[serde(rename = "oauth")]
    Oauth,
    #[serde(rename = "cli")]
    Cli,
    /// Share by link.
    #[serde(rename = "share")]
    ShareByLink,
    /// Preview of a tenant-to-tenant sharing.
    #[serde(rename = "share-preview")]
    SharePreview,
    /// Read and write access to a note inside a shared folder.
    #[serde(rename = "share-interact")]
    ShareInteract,
}

impl PermissionType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Register => "register",
            Self::Webapp => "app",
            Self::Konnector => "konnector",
            Self::Oauth => "oauth",
            Self::Cli => "cli",
            Self::ShareByLink => "share",
            Self::SharePreview => "share-preview",
            Self::ShareInteract => "share-interact",
        }
    }

    /// Types allowed to delegate a subset of their rules.
    pub fn can_delegate(self) -> bool {
        matches!(self, Self::Webapp | Self::Konnector | Self::Oauth | Self::Cli)
    }

    /// Types with at most one live document per source.
    pub fn unique_per_source(self) -> bool {
        matches!(self, Self::Webapp | Self::Konnector | Self::Cli)
    }
}

impl fmt::Display for PermissionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PermissionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "register" => Self::Register,
            "app" => Self::Webapp,
            "konnector" => Self::Konnector,
            "oauth" => Self::Oauth,
            "cli" => Self::Cli,
            "share" => Self::ShareByLink,
            "share-preview" => Self::SharePreview,
            "share-interact" => Self::ShareInteract,
            other => return Err(format!("unknown permission type: {other}")),
        })
    }
}

/// Expiry of a permission document.
///
/// Stored values that are not RFC 3339 timestamps are kept as
/// [`Expiry::Invalid`] and count as already expired.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Expiry {
    #[default]
    Never,
    At(DateTime<Utc>),
    Invalid(String),
}

impl Expiry {
    pub fn is_never(&self) -> bool {
        matches!(self, Self::Never)
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        match self {
            Self::Never => false,
            Self::At(at) => *at < now,
            Self::Invalid(_) => true,
        }
    }
}

impl From<DateTime<Utc>> for Expiry {
    fn from(at: DateTime<Utc>) -> Self {
        Self::At(at)
    }
}

impl From<Option<DateTime<Utc>>> for Expiry {
    fn from(at: Option<DateTime<Utc>>) -> Self {
        at.map_or(Self::Never, Self::At)
    }
}

impl Serialize for Expiry {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Never => serializer.serialize_none(),
            Self::At(at) => serializer.serialize_str(&at.to_rfc3339_opts(SecondsFormat::Secs, true)),
            Self::Invalid(raw) => serializer.serialize_str(raw),
        }
    }
}

impl<'de> Deserialize<'de> for Expiry {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match Option::<Value>::deserialize(deserializer)? {
            None | Some(Value::Null) => Self::Never,
            Some(Value::String(raw)) => match DateTime::parse_from_rfc3339(&raw) {
                Ok(at) => Self::At(at.with_timezone(&Utc)),
                Err(_) => Self::Invalid(raw),
            },
            Some(other) => Self::Invalid(other.to_string()),
        })
    }
}

/// An app that updated a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdatedByApp {
    pub slug: String,
    pub date: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// Provenance record attached to a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    pub doctype_version: String,
    pub metadata_version: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by_app: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by_app_version: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub updated_by_apps: Vec<UpdatedByApp>,
}

impl Metadata {
    pub const VERSION: u32 = 1;

    pub fn new(doctype_version: &str) -> Self {
        let now = Utc::now();
        Self {
            doctype_version: doctype_version.to_string(),
            metadata_version: Self::VERSION,
            created_at: now,
            updated_at: now,
            created_by_app: None,
            created_by_app_version: None,
            updated_by_apps: Vec::new(),
        }
    }

    /// Metadata for a document created by the app `slug`.
    pub fn new_with_app(slug: &str, version: Option<&str>, doctype_version: &str) -> Self {
        let mut md = Self::new(doctype_version);
        md.created_by_app = Some(slug.to_string());
        md.created_by_app_version = version.map(str::to_string);
        md.updated_by_apps.push(UpdatedByApp {
            slug: slug.to_string(),
            date: md.created_at,
            version: md.created_by_app_version.clone(),
        });
        md
    }

    /// Bump `updated_at`.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// A persisted capability record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Permission {
    #[serde(rename = "_id", default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(rename = "_rev", default, skip_serializing_if = "String::is_empty")]
    pub rev: String,
    #[serde(rename = "type")]
    pub perm_type: PermissionType,
    /// `<doctype>/<id>` of the owner: an app, konnector, OAuth client or sharing.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub source_id: String,
    #[serde(default)]
    pub permissions: Set,
    #[serde(default, skip_serializing_if = "Expiry::is_never")]
    pub expires_at: Expiry,
    /// Recipient email to token.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub codes: BTreeMap<String, String>,
    /// Recipient email to shortcode. Keys are always a subset of `codes` keys.
    #[serde(rename = "shortcodes", default, skip_serializing_if = "BTreeMap::is_empty")]
    pub short_codes: BTreeMap<String, String>,
    /// Argon2 hash protecting a share link.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(rename = "cozyMetadata", default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

impl Permission {
    /// A new, not yet persisted document.
    pub fn new(perm_type: PermissionType, source_id: impl Into<String>, permissions: Set) -> Self {
        Self {
            id: String::new(),
            rev: String::new(),
            perm_type,
            source_id: source_id.into(),
            permissions,
            expires_at: Expiry::Never,
            codes: BTreeMap::new(),
            short_codes: BTreeMap::new(),
            password: None,
            metadata: None,
        }
    }

    /// Non-persisted permissions of a registration token: read the instance settings.
    pub fn for_register_token() -> Self {
        let rule = Rule::new("", SETTINGS, VerbSet::from_verbs([Verb::Get])).with_values([INSTANCE_SETTINGS_ID]);
        Self::new(PermissionType::Register, "", Set::from(vec![rule]))
    }

    /// Non-persisted permissions of a command-line token, from its scope string.
    pub fn for_cli(scope: &str) -> Result<Self, RuleError> {
        let set = Set::from_scope_string(scope)?;
        Ok(Self::new(PermissionType::Cli, "", set))
    }

    pub fn expired(&self) -> bool {
        self.expires_at.is_expired_at(Utc::now())
    }

    pub fn add_rules<I: IntoIterator<Item = Rule>>(&mut self, rules: I) {
        self.permissions.add_rules(rules);
    }

    pub fn remove_rule(&mut self, title: &str) {
        self.permissions.remove_rule(title);
    }

    /// Replace the codes and drop shortcodes whose recipient lost its code.
    pub fn patch_codes(&mut self, codes: BTreeMap<String, String>) {
        self.codes = codes;
        let codes = &self.codes;
        self.short_codes.retain(|email, _| codes.contains_key(email));
    }

    /// True when `self` may update the share-by-link document `child`: the
    /// owner must be an app or an OAuth client, and either share the child's
    /// source or hold a superset of its rules.
    pub fn can_update_share_by_link(&self, child: &Permission) -> bool {
        if child.perm_type != PermissionType::ShareByLink {
            return false;
        }
        if !matches!(self.perm_type, PermissionType::Webapp | PermissionType::Oauth) {
            return false;
        }
        child.source_id == self.source_id || child.permissions.is_subset_of(&self.permissions)
    }

    /// Split `source_id` into its doctype and the rest.
    pub fn source_parts(&self) -> Option<(&str, &str)> {
        self.source_id.split_once('/')
    }

    /// True when some rule grants `requested`.
    pub fn allows(&self, requested: &Rule) -> bool {
        self.permissions.allows(requested)
    }

    /// Check a share link password. Documents without a password accept anything.
    pub fn check_password(&self, candidate: &str) -> bool {
        match &self.password {
            Some(hash) => crate::security::password::verify_password(candidate, hash),
            None => true,
        }
    }

    /// Attach a process-local client handle.
    pub fn with_client<C>(self, client: C) -> WithClient<C> {
        WithClient {
            permission: self,
            client,
        }
    }
}

impl Document for Permission {
    const DOCTYPE: &'static str = PERMISSIONS;

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

/// A permission document with a process-local client handle attached after
/// loading, such as the OAuth client of an `oauth` permission. The handle is
/// never persisted.
#[derive(Debug, Clone)]
pub struct WithClient<C> {
    pub permission: Permission,
    pub client: C,
}

impl<C> WithClient<C> {
    pub fn into_parts(self) -> (Permission, C) {
        (self.permission, self.client)
    }
}

impl<C> Deref for WithClient<C> {
    type Target = Permission;

    fn deref(&self) -> &Permission {
        &self.permission
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    fn rule(title: &str, doctype: &str, verbs: &[Verb]) -> Rule {
        Rule::new(title, doctype, VerbSet::from_verbs(verbs.iter().copied()))
    }

    #[test]
    fn test_expiry_parsing_fails_closed() {
        let parse = |v: Value| -> Expiry { serde_json::from_value(v).unwrap() };
        assert_eq!(parse(Value::Null), Expiry::Never);
        assert!(matches!(parse(json!("2099-01-01T00:00:00Z")), Expiry::At(_)));
        assert_eq!(parse(json!("tomorrow")), Expiry::Invalid("tomorrow".into()));
        assert_eq!(parse(json!("")), Expiry::Invalid(String::new()));
        assert_eq!(parse(json!(42)), Expiry::Invalid("42".into()));

        let now = Utc::now();
        assert!(!Expiry::Never.is_expired_at(now));
        assert!(Expiry::Invalid(String::new()).is_expired_at(now));
        assert!(Expiry::At(now - Duration::seconds(1)).is_expired_at(now));
        assert!(!Expiry::At(now + Duration::hours(1)).is_expired_at(now));
    }

    #[test]
    fn test_document_shape() {
        let mut perm = Permission::new(
            PermissionType::ShareByLink,
            "io.cozy.apps/drive",
            Set::from(vec![rule("files", "io.cozy.files", &[Verb::Get])]),
        );
        perm.codes.insert("bob@example.net".into(), "secret".into());
        perm.expires_at = Expiry::At("2030-05-01T10:00:00Z".parse().unwrap());

        let value = serde_json::to_value(&perm).unwrap();
        assert_eq!(value["type"], "share");
        assert_eq!(value["source_id"], "io.cozy.apps/drive");
        assert_eq!(value["expires_at"], "2030-05-01T10:00:00Z");
        assert_eq!(value["codes"]["bob@example.net"], "secret");
        assert!(value.get("_id").is_none());
        assert!(value.get("shortcodes").is_none());
        assert!(value.get("password").is_none());

        let back: Permission = serde_json::from_value(value).unwrap();
        assert_eq!(back, perm);
    }

    #[test]
    fn test_missing_expiry_is_never() {
        let perm: Permission = serde_json::from_value(json!({
            "type": "app",
            "source_id": "io.cozy.apps/notes",
            "permissions": [{"title": "notes", "type": "io.cozy.notes", "verbs": ["ALL"]}],
        }))
        .unwrap();
        assert_eq!(perm.expires_at, Expiry::Never);
        assert!(!perm.expired());
        assert_eq!(perm.source_parts(), Some(("io.cozy.apps", "notes")));
    }

    #[test]
    fn test_patch_codes_keeps_shortcodes_within_codes() {
        let mut perm = Permission::new(PermissionType::ShareByLink, "io.cozy.apps/drive", Set::new());
        perm.codes = BTreeMap::from([("a".into(), "ta".into()), ("b".into(), "tb".into())]);
        perm.short_codes = BTreeMap::from([("a".into(), "sa".into()), ("b".into(), "sb".into())]);

        perm.patch_codes(BTreeMap::from([("b".into(), "tb2".into()), ("c".into(), "tc".into())]));

        assert_eq!(perm.codes.len(), 2);
        assert_eq!(perm.short_codes, BTreeMap::from([("b".into(), "sb".into())]));
        assert!(perm.short_codes.keys().all(|k| perm.codes.contains_key(k)));
    }

    #[test]
    fn test_add_and_remove_rules() {
        let mut perm = Permission::new(PermissionType::Webapp, "io.cozy.apps/notes", Set::new());
        perm.add_rules([rule("a", "io.cozy.notes", &[]), rule("b", "io.cozy.files", &[])]);
        perm.remove_rule("a");
        perm.remove_rule("missing");
        assert_eq!(perm.permissions.len(), 1);
        assert!(perm.permissions.get("b").is_some());
    }

    #[test]
    fn test_can_update_share_by_link() {
        let notes = Set::from(vec![rule("notes", "io.cozy.notes", &[Verb::Get, Verb::Put])]);
        let app = Permission::new(PermissionType::Webapp, "io.cozy.apps/notes", notes.clone());

        let same_source = Permission::new(PermissionType::ShareByLink, "io.cozy.apps/notes", Set::new());
        assert!(app.can_update_share_by_link(&same_source));

        let subset = Permission::new(
            PermissionType::ShareByLink,
            "io.cozy.apps/other",
            Set::from(vec![rule("notes", "io.cozy.notes", &[Verb::Get])]),
        );
        assert!(app.can_update_share_by_link(&subset));

        let not_share = Permission::new(PermissionType::SharePreview, "io.cozy.apps/notes", Set::new());
        assert!(!app.can_update_share_by_link(&not_share));

        let konnector = Permission::new(PermissionType::Konnector, "io.cozy.apps/notes", notes);
        assert!(!konnector.can_update_share_by_link(&same_source));
    }

    #[test]
    fn test_register_token_permissions() {
        let perm = Permission::for_register_token();
        assert_eq!(perm.perm_type, PermissionType::Register);
        assert!(perm.permissions.allows_id(Verb::Get, SETTINGS, INSTANCE_SETTINGS_ID));
        assert!(!perm.permissions.allows_id(Verb::Put, SETTINGS, INSTANCE_SETTINGS_ID));
    }

    #[test]
    fn test_cli_permissions_from_scope() {
        let perm = Permission::for_cli("io.cozy.files io.cozy.contacts:GET").unwrap();
        assert_eq!(perm.perm_type, PermissionType::Cli);
        assert_eq!(perm.permissions.len(), 2);
        assert!(Permission::for_cli("").is_err());
    }

    #[test]
    fn test_with_client_derefs_to_permission() {
        let perm = Permission::new(PermissionType::Oauth, "io.cozy.oauth.clients/abc", Set::new());
        let enriched = perm.with_client("client-handle");
        assert_eq!(enriched.perm_type, PermissionType::Oauth);
        let (perm, client) = enriched.into_parts();
        assert_eq!(perm.source_id, "io.cozy.oauth.clients/abc");
        assert_eq!(client, "client-handle");
    }

    #[test]
    fn test_permission_type_strings() {
        for t in [
            PermissionType::Register,
            PermissionType::Webapp,
            PermissionType::Konnector,
            PermissionType::Oauth,
            PermissionType::Cli,
            PermissionType::ShareByLink,
            PermissionType::SharePreview,
            PermissionType::ShareInteract,
        ] {
            assert_eq!(t.as_str().parse::<PermissionType>().unwrap(), t);
            assert_eq!(serde_json::to_value(t).unwrap(), json!(t.as_str()));
        }
    }
}
