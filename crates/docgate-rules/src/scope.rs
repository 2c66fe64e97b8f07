//! Scope strings: a compact text form of a [`Set`].
//!
//! Rules are separated by spaces; each rule is
//! `doctype[:VERBS[:value,value[:selector]]]` where `VERBS` is `ALL` or a
//! comma separated verb list.

use crate::error::{Result, RuleError};
use crate::rule::Rule;
use crate::set::Set;
use crate::verb::VerbSet;

impl Rule {
    /// Parse one rule from its scope form. The title is left empty.
    pub fn from_scope_string(scope: &str) -> Result<Rule> {
        let mut parts = scope.splitn(4, ':');
        let doctype = parts
            .next()
            .filter(|d| !d.is_empty())
            .ok_or_else(|| RuleError::InvalidScope(scope.to_string()))?;
        let verbs = match parts.next() {
            Some(verbs) => verbs.parse::<VerbSet>()?,
            None => VerbSet::all(),
        };
        let values: Vec<String> = parts
            .next()
            .map(|v| v.split(',').filter(|s| !s.is_empty()).map(String::from).collect())
            .unwrap_or_default();
        let selector = parts.next().filter(|s| !s.is_empty()).map(String::from);
        if selector.is_some() && values.is_empty() {
            return Err(RuleError::InvalidScope(scope.to_string()));
        }
        Ok(Rule {
            title: String::new(),
            doctype: doctype.to_string(),
            verbs,
            selector,
            values,
        })
    }

    /// Scope form of this rule.
    pub fn to_scope_string(&self) -> String {
        let mut out = self.doctype.clone();
        if self.verbs.is_all() && self.values.is_empty() {
            return out;
        }
        out.push(':');
        out.push_str(&self.verbs.to_string());
        if !self.values.is_empty() {
            out.push(':');
            out.push_str(&self.values.join(","));
            if let Some(selector) = &self.selector {
                out.push(':');
                out.push_str(selector);
            }
        }
        out
    }
}

impl Set {
    /// Parse a space separated scope. Rules are titled `rule0`, `rule1`, ...
    pub fn from_scope_string(scope: &str) -> Result<Set> {
        let mut set = Set::new();
        for (i, part) in scope.split_whitespace().enumerate() {
            let mut rule = Rule::from_scope_string(part)?;
            rule.title = format!("rule{i}");
            set.add_rules([rule]);
        }
        if set.is_empty() {
            return Err(RuleError::InvalidScope(scope.to_string()));
        }
        Ok(set)
    }

    /// Space separated scope form of the set. Titles are not kept.
    pub fn to_scope_string(&self) -> String {
        self.iter()
            .map(Rule::to_scope_string)
            .collect::<Vec<_>>()
            .join(" ")
    }
}
