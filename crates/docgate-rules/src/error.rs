//! Error types for the rule algebra.

use thiserror::Error;

/// Convenience type alias for Results using [`RuleError`].
pub type Result<T, E = RuleError> = std::result::Result<T, E>;

/// Errors raised while parsing or combining rules.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum RuleError {
    /// A verb name that is not part of the verb enumeration.
    #[error("unknown verb: {0}")]
    UnknownVerb(String),

    /// A scope string that cannot be turned into a rule.
    #[error("invalid scope: {0}")]
    InvalidScope(String),

    /// Two same-titled rules that cannot be merged (different doctype or selector).
    #[error("cannot merge rule {title}: doctype or selector differ")]
    IncompatibleMerge {
        /// Title shared by both rules.
        title: String,
    },
}
