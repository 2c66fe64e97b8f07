//! Doctype names used by the core.

pub const PERMISSIONS: &str = "io.cozy.permissions";
pub const SESSIONS: &str = "io.cozy.sessions";
pub const APPS: &str = "io.cozy.apps";
pub const KONNECTORS: &str = "io.cozy.konnectors";
pub const SHARINGS: &str = "io.cozy.sharings";
pub const SETTINGS: &str = "io.cozy.settings";
pub const OAUTH_CLIENTS: &str = "io.cozy.oauth.clients";
pub const JOBS: &str = "io.cozy.jobs";
pub const TRIGGERS: &str = "io.cozy.triggers";
pub const FILES: &str = docgate_rules::FILES_DOCTYPE;

/// ID of the tenant's settings document.
pub const INSTANCE_SETTINGS_ID: &str = "io.cozy.settings.instance";
