//! Default value functions for serde.

/// 30 days.
pub fn default_session_max_age() -> u64 {
    30 * 24 * 3600
}

/// 24 hours.
pub fn default_session_refresh_window() -> u64 {
    24 * 3600
}

pub fn default_session_list_limit() -> usize {
    50_000
}

pub fn default_index_retry_delay_ms() -> u64 {
    1000
}

pub fn default_database_path() -> String {
    "docgate.db".to_string()
}
