//! Telemetry utilities.

/// Standardized span constructors for request observability.
pub mod spans {
    use tracing::{Span, info_span};

    /// Span for work scoped to one tenant.
    pub fn tenant(domain: &str) -> Span {
        info_span!("tenant", domain = %domain)
    }

    /// Span for a session operation.
    pub fn session(tenant: &str, op: &'static str, session_id: Option<&str>) -> Span {
        if let Some(session_id) = session_id {
            info_span!("session", tenant = %tenant, op = op, session_id = %session_id)
        } else {
            info_span!("session", tenant = %tenant, op = op)
        }
    }

    /// Span for a permission operation.
    pub fn permission(tenant: &str, op: &'static str, source_id: Option<&str>) -> Span {
        if let Some(source_id) = source_id {
            info_span!("permission", tenant = %tenant, op = op, source_id = %source_id)
        } else {
            info_span!("permission", tenant = %tenant, op = op)
        }
    }
}
