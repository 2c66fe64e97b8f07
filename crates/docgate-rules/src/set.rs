//! Ordered rule collections.

use crate::rule::{FileRuleMatcher, FlatFileMatcher, Rule};
use crate::verb::Verb;
use serde::{Deserialize, Serialize};

/// An ordered sequence of rules. Titles are unique by convention only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Set(Vec<Rule>);

impl Set {
    /// Empty set.
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Number of rules.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when the set holds no rule.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over rules in order.
    pub fn iter(&self) -> std::slice::Iter<'_, Rule> {
        self.0.iter()
    }

    /// First rule with the given title.
    pub fn get(&self, title: &str) -> Option<&Rule> {
        self.0.iter().find(|r| r.title == title)
    }

    /// Append rules at the end of the set.
    pub fn add_rules<I: IntoIterator<Item = Rule>>(&mut self, rules: I) {
        self.0.extend(rules);
    }

    /// Remove every rule with the given title. No-op when absent.
    pub fn remove_rule(&mut self, title: &str) {
        self.0.retain(|r| r.title != title);
    }

    /// True when every rule is within a same-titled rule of `parent`, or,
    /// for file rules, within any rule of `parent`.
    pub fn is_subset_of(&self, parent: &Set) -> bool {
        self.is_subset_of_with(parent, &FlatFileMatcher)
    }

    /// [`Set::is_subset_of`] with a caller-provided file rule matcher.
    pub fn is_subset_of_with<M: FileRuleMatcher + ?Sized>(&self, parent: &Set, matcher: &M) -> bool {
        self.0.iter().all(|rule| {
            if rule.is_file_rule() {
                parent.iter().any(|p| matcher.file_rule_within(rule, p))
            } else {
                parent
                    .iter()
                    .filter(|p| p.title == rule.title)
                    .any(|p| rule.contained_in(p, true))
            }
        })
    }

    /// Merge `extra` into this set.
    ///
    /// A same-titled rule gets the union of verbs and values; other rules are
    /// appended in `extra` order. Rules that cannot be merged (different
    /// doctype or selector) keep the receiver's version.
    pub fn merge(&mut self, extra: &Set) {
        for rule in extra.iter() {
            match self.0.iter_mut().find(|r| r.title == rule.title) {
                Some(existing) => {
                    // an incompatible extra rule is dropped
                    existing.merge(rule).ok();
                }
                None => self.0.push(rule.clone()),
            }
        }
    }

    /// Non-mutating [`Set::merge`].
    pub fn merged(&self, extra: &Set) -> Set {
        let mut out = self.clone();
        out.merge(extra);
        out
    }

    /// True when some rule strictly covers `requested`.
    pub fn allows(&self, requested: &Rule) -> bool {
        self.0.iter().any(|r| r.covers(requested))
    }

    /// True when some rule grants `verb` on document `id` of `doctype`.
    ///
    /// Only rules selecting by document ID are considered.
    pub fn allows_id(&self, verb: Verb, doctype: &str, id: &str) -> bool {
        self.0
            .iter()
            .filter(|r| r.selector.is_none())
            .any(|r| r.allows(verb, doctype, id))
    }
}

impl From<Vec<Rule>> for Set {
    fn from(rules: Vec<Rule>) -> Self {
        Self(rules)
    }
}

impl FromIterator<Rule> for Set {
    fn from_iter<I: IntoIterator<Item = Rule>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for Set {
    type Item = Rule;
    type IntoIter = std::vec::IntoIter<Rule>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a Set {
    type Item = &'a Rule;
    type IntoIter = std::slice::Iter<'a, Rule>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::FILES_DOCTYPE;
    use crate::verb::VerbSet;

    fn rule(title: &str, doctype: &str, verbs: &[Verb], values: &[&str]) -> Rule {
        Rule::new(title, doctype, VerbSet::from_verbs(verbs.iter().copied()))
            .with_values(values.iter().copied())
    }

    #[test]
    fn subset_needs_matching_title() {
        let parent: Set = vec![rule("contacts", "io.cozy.contacts", &[], &[])].into();
        let same: Set = vec![rule("contacts", "io.cozy.contacts", &[Verb::Get], &["a"])].into();
        let renamed: Set = vec![rule("other", "io.cozy.contacts", &[Verb::Get], &["a"])].into();
        assert!(same.is_subset_of(&parent));
        assert!(!renamed.is_subset_of(&parent));
    }

    #[test]
    fn file_rules_match_any_parent_rule() {
        let parent: Set = vec![rule("photos", "io.cozy.photos.albums", &[Verb::Get], &[])].into();
        let child: Set = vec![rule("shared", FILES_DOCTYPE, &[Verb::Get], &["dir-1"])].into();
        assert!(child.is_subset_of(&parent));

        let writing: Set = vec![rule("shared", FILES_DOCTYPE, &[Verb::Put], &["dir-1"])].into();
        assert!(!writing.is_subset_of(&parent));
    }

    #[test]
    fn custom_file_matcher_is_used() {
        struct Deny;
        impl FileRuleMatcher for Deny {
            fn file_rule_within(&self, _: &Rule, _: &Rule) -> bool {
                false
            }
        }
        let parent: Set = vec![rule("files", FILES_DOCTYPE, &[], &[])].into();
        let child: Set = vec![rule("files", FILES_DOCTYPE, &[Verb::Get], &["f"])].into();
        assert!(child.is_subset_of(&parent));
        assert!(!child.is_subset_of_with(&parent, &Deny));
    }

    #[test]
    fn merge_keeps_receiver_order_and_appends_new_rules() {
        let mut set: Set = vec![
            rule("b", "io.cozy.b", &[Verb::Get], &["1"]),
            rule("a", "io.cozy.a", &[Verb::Get], &[]),
        ]
        .into();
        let extra: Set = vec![
            rule("z", "io.cozy.z", &[Verb::Get], &[]),
            rule("b", "io.cozy.b", &[Verb::Post], &["2"]),
            rule("c", "io.cozy.c", &[Verb::Get], &[]),
        ]
        .into();
        set.merge(&extra);

        let titles: Vec<&str> = set.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, vec!["b", "a", "z", "c"]);
        let b = set.get("b").unwrap();
        assert_eq!(b.values, vec!["1", "2"]);
        assert_eq!(b.verbs, VerbSet::from_verbs([Verb::Get, Verb::Post]));
    }

    #[test]
    fn merge_drops_incompatible_extra() {
        let mut set: Set = vec![rule("x", "io.cozy.a", &[Verb::Get], &[])].into();
        let extra: Set = vec![rule("x", "io.cozy.b", &[Verb::Delete], &[])].into();
        set.merge(&extra);
        assert_eq!(set.len(), 1);
        assert_eq!(set.get("x").unwrap().doctype, "io.cozy.a");
        assert!(!set.get("x").unwrap().verbs.contains(Verb::Delete));
    }

    #[test]
    fn add_and_remove_rules() {
        let mut set = Set::new();
        set.add_rules([rule("a", "io.cozy.a", &[], &[]), rule("b", "io.cozy.b", &[], &[])]);
        set.remove_rule("a");
        set.remove_rule("missing");
        assert_eq!(set.len(), 1);
        assert!(set.get("b").is_some());
    }

    #[test]
    fn allows_checks_strictly() {
        let set: Set = vec![rule("contacts", "io.cozy.contacts", &[Verb::Get], &["a"])].into();
        assert!(set.allows(&rule("any-title", "io.cozy.contacts", &[Verb::Get], &["a"])));
        assert!(!set.allows(&rule("f", FILES_DOCTYPE, &[Verb::Get], &["a"])));
        assert!(set.allows_id(Verb::Get, "io.cozy.contacts", "a"));
        assert!(!set.allows_id(Verb::Get, "io.cozy.contacts", "b"));
    }
}
