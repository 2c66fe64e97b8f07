//! docgate - authorization and session core for a multi-tenant personal data server.
//!
//! For every request the core answers two questions: who is acting
//! ([`session`], resolved from a signed cookie) and what they may do
//! ([`permission`], rule sets checked with the algebra from
//! [`docgate_rules`]). Both read and write a per-tenant document store
//! through the [`store::DocumentStore`] seam; [`db::SqliteStore`] is the
//! bundled implementation.

pub mod authority;
pub mod config;
pub mod db;
pub mod error;
pub mod lock;
pub mod permission;
pub mod security;
pub mod session;
pub mod store;
pub mod telemetry;
pub mod tenant;

pub use authority::Authority;
pub use error::{PermissionError, SessionError};
pub use tenant::Tenant;
