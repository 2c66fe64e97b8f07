//! # docgate-rules
//!
//! Capability rule algebra for the docgate authorization core.
//!
//! - [`Verb`] and [`VerbSet`]: what a rule lets its holder do
//! - [`Rule`]: verbs on a doctype, optionally restricted to some values
//! - [`Set`]: ordered rules with subset checks and merging
//! - scope strings: compact text encoding used by command-line tokens
//!
//! ```rust
//! use docgate_rules::{Rule, Set, Verb, VerbSet};
//!
//! let parent: Set = vec![Rule::new("contacts", "io.cozy.contacts", VerbSet::all())].into();
//! let child: Set = vec![
//!     Rule::new("contacts", "io.cozy.contacts", VerbSet::from_verbs([Verb::Get]))
//!         .with_values(["contact-1"]),
//! ]
//! .into();
//! assert!(child.is_subset_of(&parent));
//! ```

#![deny(clippy::all)]
#![warn(missing_docs)]

pub mod error;
pub mod rule;
mod scope;
pub mod set;
pub mod verb;

pub use self::error::{Result, RuleError};
pub use self::rule::{FileRuleMatcher, FlatFileMatcher, Rule, FILES_DOCTYPE, ID_SELECTOR};
pub use self::set::Set;
pub use self::verb::{Verb, VerbSet};
