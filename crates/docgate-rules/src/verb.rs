//! HTTP-like verbs and verb sets.
//!
//! A [`VerbSet`] stored without any verb is a legacy encoding of "every
//! verb". It is never read as "no access".

use crate::error::RuleError;
use serde::de::{self, SeqAccess, Visitor};
use serde::ser::SerializeSeq;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// A single verb a rule can grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Verb {
    /// Read documents.
    Get,
    /// Create documents.
    Post,
    /// Replace documents.
    Put,
    /// Partially update documents.
    Patch,
    /// Delete documents.
    Delete,
}

impl Verb {
    /// Every verb, in canonical order.
    pub const ALL: [Verb; 5] = [Verb::Get, Verb::Post, Verb::Put, Verb::Patch, Verb::Delete];

    /// Wire name of the verb.
    pub fn as_str(self) -> &'static str {
        match self {
            Verb::Get => "GET",
            Verb::Post => "POST",
            Verb::Put => "PUT",
            Verb::Patch => "PATCH",
            Verb::Delete => "DELETE",
        }
    }

    #[inline]
    const fn bit(self) -> u8 {
        match self {
            Verb::Get => 1,
            Verb::Post => 1 << 1,
            Verb::Put => 1 << 2,
            Verb::Patch => 1 << 3,
            Verb::Delete => 1 << 4,
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Verb {
    type Err = RuleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(Verb::Get),
            "POST" => Ok(Verb::Post),
            "PUT" => Ok(Verb::Put),
            "PATCH" => Ok(Verb::Patch),
            "DELETE" => Ok(Verb::Delete),
            _ => Err(RuleError::UnknownVerb(s.to_string())),
        }
    }
}

const FULL: u8 = 0b1_1111;

/// A set of verbs.
///
/// The empty bitset and the full bitset both mean "every verb"; use
/// [`VerbSet::is_all`] rather than comparing bits.
#[derive(Clone, Copy, Default, Eq)]
pub struct VerbSet(u8);

impl VerbSet {
    /// The set granting every verb.
    #[inline]
    pub const fn all() -> Self {
        VerbSet(0)
    }

    /// Build a set from explicit verbs. An empty iterator yields [`VerbSet::all`].
    pub fn from_verbs<I: IntoIterator<Item = Verb>>(verbs: I) -> Self {
        VerbSet(verbs.into_iter().fold(0, |acc, v| acc | v.bit()))
    }

    /// True when the set grants every verb.
    #[inline]
    pub fn is_all(&self) -> bool {
        self.0 == 0 || self.0 == FULL
    }

    /// True when the set grants `verb`.
    #[inline]
    pub fn contains(&self, verb: Verb) -> bool {
        self.is_all() || self.0 & verb.bit() != 0
    }

    /// Union `other` into this set.
    pub fn merge(&mut self, other: &VerbSet) {
        if self.is_all() || other.is_all() {
            *self = VerbSet::all();
        } else {
            self.0 |= other.0;
        }
    }

    /// True when every verb granted by `self` is granted by `parent`.
    pub fn is_subset_of(&self, parent: &VerbSet) -> bool {
        if parent.is_all() {
            return true;
        }
        if self.is_all() {
            return false;
        }
        self.0 & !parent.0 == 0
    }

    /// Iterate over the granted verbs (all five for an "every verb" set).
    pub fn iter(&self) -> impl Iterator<Item = Verb> + '_ {
        Verb::ALL.into_iter().filter(move |v| self.contains(*v))
    }
}

impl PartialEq for VerbSet {
    fn eq(&self, other: &Self) -> bool {
        (self.is_all() && other.is_all()) || self.0 == other.0
    }
}

impl std::hash::Hash for VerbSet {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        let bits = if self.is_all() { FULL } else { self.0 };
        bits.hash(state);
    }
}

impl FromIterator<Verb> for VerbSet {
    fn from_iter<I: IntoIterator<Item = Verb>>(iter: I) -> Self {
        VerbSet::from_verbs(iter)
    }
}

impl fmt::Debug for VerbSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VerbSet({self})")
    }
}

impl fmt::Display for VerbSet {
    /// `ALL` or a comma separated list such as `GET,POST`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_all() {
            return f.write_str("ALL");
        }
        let mut first = true;
        for verb in self.iter() {
            if !first {
                f.write_str(",")?;
            }
            f.write_str(verb.as_str())?;
            first = false;
        }
        Ok(())
    }
}

impl FromStr for VerbSet {
    type Err = RuleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() || s.eq_ignore_ascii_case("ALL") {
            return Ok(VerbSet::all());
        }
        s.split(',')
            .map(|v| v.trim().parse::<Verb>())
            .collect::<Result<VerbSet, _>>()
    }
}

impl Serialize for VerbSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if self.is_all() {
            let mut seq = serializer.serialize_seq(Some(1))?;
            seq.serialize_element("ALL")?;
            return seq.end();
        }
        let verbs: Vec<Verb> = self.iter().collect();
        let mut seq = serializer.serialize_seq(Some(verbs.len()))?;
        for verb in verbs {
            seq.serialize_element(verb.as_str())?;
        }
        seq.end()
    }
}

impl<'de> Deserialize<'de> for VerbSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct VerbSetVisitor;

        impl<'de> Visitor<'de> for VerbSetVisitor {
            type Value = VerbSet;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a list of verbs, \"ALL\", or null")
            }

            fn visit_unit<E: de::Error>(self) -> Result<VerbSet, E> {
                Ok(VerbSet::all())
            }

            fn visit_none<E: de::Error>(self) -> Result<VerbSet, E> {
                Ok(VerbSet::all())
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<VerbSet, E> {
                v.parse().map_err(E::custom)
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<VerbSet, A::Error> {
                let mut bits = 0u8;
                let mut all = false;
                while let Some(name) = seq.next_element::<String>()? {
                    if name.eq_ignore_ascii_case("ALL") {
                        all = true;
                        continue;
                    }
                    let verb: Verb = name.parse().map_err(de::Error::custom)?;
                    bits |= verb.bit();
                }
                Ok(if all { VerbSet::all() } else { VerbSet(bits) })
            }
        }

        deserializer.deserialize_any(VerbSetVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_set_means_every_verb() {
        let legacy = VerbSet::from_verbs([]);
        assert!(legacy.is_all());
        for verb in Verb::ALL {
            assert!(legacy.contains(verb));
        }
    }

    #[test]
    fn explicit_set_only_grants_listed_verbs() {
        let set = VerbSet::from_verbs([Verb::Get, Verb::Post]);
        assert!(set.contains(Verb::Get));
        assert!(!set.contains(Verb::Delete));
        assert_eq!(set.to_string(), "GET,POST");
    }

    #[test]
    fn subset_against_all_and_explicit() {
        let get = VerbSet::from_verbs([Verb::Get]);
        let rw = VerbSet::from_verbs([Verb::Get, Verb::Put]);
        assert!(get.is_subset_of(&rw));
        assert!(!rw.is_subset_of(&get));
        assert!(rw.is_subset_of(&VerbSet::all()));
        assert!(!VerbSet::all().is_subset_of(&rw));
        assert!(VerbSet::from_verbs(Verb::ALL).is_subset_of(&VerbSet::all()));
    }

    #[test]
    fn merge_with_all_is_all() {
        let mut set = VerbSet::from_verbs([Verb::Get]);
        set.merge(&VerbSet::all());
        assert!(set.is_all());

        let mut set = VerbSet::from_verbs([Verb::Get]);
        set.merge(&VerbSet::from_verbs([Verb::Delete]));
        assert_eq!(set, VerbSet::from_verbs([Verb::Get, Verb::Delete]));
    }

    #[test]
    fn parse_verb_lists() {
        assert_eq!("ALL".parse::<VerbSet>().unwrap(), VerbSet::all());
        assert_eq!(
            "get, patch".parse::<VerbSet>().unwrap(),
            VerbSet::from_verbs([Verb::Get, Verb::Patch])
        );
        assert!(matches!("GET,FETCH".parse::<VerbSet>(), Err(RuleError::UnknownVerb(v)) if v == "FETCH"));
    }

    #[test]
    fn json_encoding() {
        let set = VerbSet::from_verbs([Verb::Get, Verb::Delete]);
        assert_eq!(serde_json::to_string(&set).unwrap(), r#"["GET","DELETE"]"#);
        assert_eq!(serde_json::to_string(&VerbSet::all()).unwrap(), r#"["ALL"]"#);

        let legacy: VerbSet = serde_json::from_str("[]").unwrap();
        assert!(legacy.is_all());
        let null: VerbSet = serde_json::from_str("null").unwrap();
        assert!(null.is_all());
        let parsed: VerbSet = serde_json::from_str(r#"["GET","DELETE"]"#).unwrap();
        assert_eq!(parsed, set);
    }
}
