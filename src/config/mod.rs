//! Configuration loading and management.
//!
//! - [`types`]: the top-level [`Config`] and its sections
//! - [`defaults`]: default values referenced by serde attributes

mod defaults;
mod types;

pub use types::{
    Config, ConfigError, DatabaseConfig, PermissionsConfig, SecurityConfig, SessionsConfig, Subdomains,
    TenancyConfig,
};
