//! A single capability grant.

use crate::error::{Result, RuleError};
use crate::verb::{Verb, VerbSet};
use serde::{Deserialize, Serialize};

/// Doctype of file and directory documents.
///
/// Rules on this doctype get a relaxed subset check, see [`FileRuleMatcher`].
pub const FILES_DOCTYPE: &str = "io.cozy.files";

/// Selector name meaning "match on document ID".
pub const ID_SELECTOR: &str = "_id";

/// A capability grant: `verbs` on documents of `doctype` whose `selector`
/// field (document ID when absent) is one of `values`. Empty `values` means
/// every document of the doctype.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    /// Key of the rule inside its set.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub title: String,
    /// Doctype the rule applies to.
    #[serde(rename = "type")]
    pub doctype: String,
    /// Granted verbs.
    #[serde(default)]
    pub verbs: VerbSet,
    /// Field matched against `values`; the document ID when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
    /// Accepted field values; empty means all documents.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<String>,
}

impl Rule {
    /// Rule over every document of `doctype`.
    pub fn new(title: impl Into<String>, doctype: impl Into<String>, verbs: VerbSet) -> Self {
        Self {
            title: title.into(),
            doctype: doctype.into(),
            verbs,
            selector: None,
            values: Vec::new(),
        }
    }

    /// Restrict the rule to the given values.
    pub fn with_values<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.values = values.into_iter().map(Into::into).collect();
        self
    }

    /// Match values against `selector` instead of the document ID.
    pub fn with_selector(mut self, selector: impl Into<String>) -> Self {
        self.selector = Some(selector.into());
        self
    }

    /// True for rules on [`FILES_DOCTYPE`].
    #[inline]
    pub fn is_file_rule(&self) -> bool {
        self.doctype == FILES_DOCTYPE
    }

    /// Field name the values are matched against.
    #[inline]
    pub fn selector_or_id(&self) -> &str {
        self.selector.as_deref().unwrap_or(ID_SELECTOR)
    }

    /// True when `value` is listed (or the rule has no value restriction).
    pub fn values_contain(&self, value: &str) -> bool {
        self.values.is_empty() || self.values.iter().any(|v| v == value)
    }

    /// Subset check used for delegation.
    ///
    /// A file rule is checked against `parent` regardless of the parent's
    /// doctype. This makes the relation asymmetric across doctypes: a files
    /// rule can be within a contacts rule but never the reverse.
    pub fn is_subset_of(&self, parent: &Rule) -> bool {
        if self.is_file_rule() {
            FlatFileMatcher.file_rule_within(self, parent)
        } else {
            self.contained_in(parent, true)
        }
    }

    /// Strict coverage: same doctype, verbs, selector and values all within `self`.
    ///
    /// This is the check used when authorizing a request; it has no file exception.
    pub fn covers(&self, requested: &Rule) -> bool {
        requested.contained_in(self, true)
    }

    /// True when this rule grants `verb` on the document whose selected field is `value`.
    pub fn allows(&self, verb: Verb, doctype: &str, value: &str) -> bool {
        self.doctype == doctype && self.verbs.contains(verb) && self.values_contain(value)
    }

    pub(crate) fn contained_in(&self, parent: &Rule, check_doctype: bool) -> bool {
        if check_doctype && self.doctype != parent.doctype {
            return false;
        }
        if !self.verbs.is_subset_of(&parent.verbs) {
            return false;
        }
        if parent.selector.is_some() && parent.selector != self.selector {
            return false;
        }
        if parent.values.is_empty() {
            return true;
        }
        // "all documents" is never within a restricted parent
        if self.values.is_empty() {
            return false;
        }
        self.values.iter().all(|v| parent.values.contains(v))
    }

    /// Union verbs and values of a same-titled rule into this one.
    pub fn merge(&mut self, other: &Rule) -> Result<()> {
        if self.doctype != other.doctype || self.selector != other.selector {
            return Err(RuleError::IncompatibleMerge {
                title: self.title.clone(),
            });
        }
        self.verbs.merge(&other.verbs);
        if self.values.is_empty() || other.values.is_empty() {
            self.values.clear();
        } else {
            for value in &other.values {
                if !self.values.contains(value) {
                    self.values.push(value.clone());
                }
            }
        }
        Ok(())
    }
}

/// Decides whether a file rule fits under a parent rule.
///
/// File authorization (folder hierarchy, referenced-by relations) lives
/// outside this crate; callers plug their own matcher in through
/// [`Set::is_subset_of_with`](crate::Set::is_subset_of_with).
pub trait FileRuleMatcher {
    /// True when `rule` (a file rule) is within `parent`.
    fn file_rule_within(&self, rule: &Rule, parent: &Rule) -> bool;
}

/// Default matcher: the plain subset check without the doctype comparison.
#[derive(Debug, Clone, Copy, Default)]
pub struct FlatFileMatcher;

impl FileRuleMatcher for FlatFileMatcher {
    fn file_rule_within(&self, rule: &Rule, parent: &Rule) -> bool {
        rule.contained_in(parent, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contacts(verbs: &[Verb]) -> Rule {
        Rule::new("contacts", "io.cozy.contacts", VerbSet::from_verbs(verbs.iter().copied()))
    }

    #[test]
    fn rule_is_subset_of_itself() {
        let rule = contacts(&[Verb::Get]).with_values(["a", "b"]);
        assert!(rule.is_subset_of(&rule));
    }

    #[test]
    fn values_must_be_listed_by_parent() {
        let parent = contacts(&[Verb::Get]).with_values(["a", "b"]);
        assert!(contacts(&[Verb::Get]).with_values(["a"]).is_subset_of(&parent));
        assert!(!contacts(&[Verb::Get]).with_values(["c"]).is_subset_of(&parent));
        // unrestricted child under restricted parent
        assert!(!contacts(&[Verb::Get]).is_subset_of(&parent));
        // restricted child under unrestricted parent
        assert!(contacts(&[Verb::Get]).with_values(["z"]).is_subset_of(&contacts(&[Verb::Get])));
    }

    #[test]
    fn verbs_must_be_granted_by_parent() {
        let parent = contacts(&[Verb::Get]);
        assert!(!contacts(&[Verb::Get, Verb::Delete]).is_subset_of(&parent));
        assert!(contacts(&[Verb::Get, Verb::Delete]).is_subset_of(&contacts(&[])));
    }

    #[test]
    fn selector_compatibility() {
        let by_id = contacts(&[Verb::Get]);
        let by_group = contacts(&[Verb::Get]).with_selector("groups").with_values(["g1"]);
        assert!(by_group.is_subset_of(&by_id));
        assert!(!by_id.with_values(["g1"]).is_subset_of(&by_group));
    }

    #[test]
    fn doctype_must_match_except_for_files() {
        let parent = contacts(&[Verb::Get]);
        let photos = Rule::new("photos", "io.cozy.photos", VerbSet::from_verbs([Verb::Get]));
        assert!(!photos.is_subset_of(&parent));

        let files = Rule::new("files", FILES_DOCTYPE, VerbSet::from_verbs([Verb::Get]))
            .with_values(["file-1"]);
        assert!(files.is_subset_of(&parent));
        // the reverse direction keeps the doctype check
        let file_parent = Rule::new("files", FILES_DOCTYPE, VerbSet::all());
        assert!(!parent.is_subset_of(&file_parent));
    }

    #[test]
    fn covers_has_no_file_exception() {
        let grant = contacts(&[Verb::Get]);
        let files = Rule::new("files", FILES_DOCTYPE, VerbSet::from_verbs([Verb::Get]));
        assert!(!grant.covers(&files));
        assert!(grant.covers(&contacts(&[Verb::Get]).with_values(["x"])));
    }

    #[test]
    fn allows_single_document() {
        let rule = contacts(&[Verb::Get]).with_values(["a"]);
        assert!(rule.allows(Verb::Get, "io.cozy.contacts", "a"));
        assert!(!rule.allows(Verb::Put, "io.cozy.contacts", "a"));
        assert!(!rule.allows(Verb::Get, "io.cozy.contacts", "b"));
        assert!(!rule.allows(Verb::Get, "io.cozy.files", "a"));
    }

    #[test]
    fn merge_unions_verbs_and_values() {
        let mut rule = contacts(&[Verb::Get]).with_values(["a"]);
        rule.merge(&contacts(&[Verb::Post]).with_values(["b", "a"])).unwrap();
        assert_eq!(rule.values, vec!["a", "b"]);
        assert_eq!(rule.verbs, VerbSet::from_verbs([Verb::Get, Verb::Post]));

        rule.merge(&contacts(&[Verb::Get])).unwrap();
        assert!(rule.values.is_empty());
    }

    #[test]
    fn merge_rejects_other_doctype() {
        let mut rule = contacts(&[Verb::Get]);
        let other = Rule::new("contacts", "io.cozy.photos", VerbSet::all());
        assert!(matches!(rule.merge(&other), Err(RuleError::IncompatibleMerge { .. })));
    }

    #[test]
    fn json_shape() {
        let rule = contacts(&[Verb::Get]).with_values(["a"]);
        let json = serde_json::to_value(&rule).unwrap();
        assert_eq!(json["type"], "io.cozy.contacts");
        assert_eq!(json["verbs"], serde_json::json!(["GET"]));
        assert!(json.get("selector").is_none());

        let legacy: Rule = serde_json::from_str(r#"{"type":"io.cozy.contacts"}"#).unwrap();
        assert!(legacy.verbs.is_all());
        assert!(legacy.values.is_empty());
    }
}
