//! Unified error handling for docgate.
//!
//! Each layer has its own error enum. Domain errors carry a static
//! `error_code()` for log labeling and a `status()` that the transport layer
//! uses to pick the client-facing status code.

use crate::security::MacError;
use crate::store::StoreError;
use docgate_rules::RuleError;
use http::StatusCode;
use thiserror::Error;

// ============================================================================
// Permission Errors
// ============================================================================

/// Errors from permission lookup, creation and delegation.
#[derive(Debug, Error)]
pub enum PermissionError {
    #[error("token not found")]
    TokenNotFound,

    #[error("token expired")]
    ExpiredToken,

    #[error("requested permissions are not a subset of the parent's")]
    NotSubset,

    #[error("only apps and clients can create a permission subset")]
    OnlyAppCanCreateSubSet,

    #[error("doctype {0} is not writable")]
    NotWritable(String),

    #[error("permission already exists for {0}")]
    AlreadyExists(String),

    #[error("permission not found")]
    NotFound,

    /// Data integrity fault in the store, such as one token matching several documents.
    #[error("bad state: {0}")]
    BadState(String),

    #[error("invalid scope: {0}")]
    InvalidScope(#[from] RuleError),

    #[error("password hashing failed: {0}")]
    Password(String),

    #[error("store error: {0}")]
    Store(StoreError),
}

impl From<StoreError> for PermissionError {
    fn from(err: StoreError) -> Self {
        if err.is_not_found() {
            Self::NotFound
        } else {
            Self::Store(err)
        }
    }
}

impl PermissionError {
    /// Get a static error code string for log labeling.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::TokenNotFound => "token_not_found",
            Self::ExpiredToken => "expired_token",
            Self::NotSubset => "not_subset",
            Self::OnlyAppCanCreateSubSet => "only_app_can_create_subset",
            Self::NotWritable(_) => "not_writable",
            Self::AlreadyExists(_) => "already_exists",
            Self::NotFound => "not_found",
            Self::BadState(_) => "bad_state",
            Self::InvalidScope(_) => "invalid_scope",
            Self::Password(_) => "password",
            Self::Store(e) => e.error_code(),
        }
    }

    /// Status code the transport layer reports for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::TokenNotFound
            | Self::ExpiredToken
            | Self::NotSubset
            | Self::OnlyAppCanCreateSubSet
            | Self::NotWritable(_) => StatusCode::FORBIDDEN,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::AlreadyExists(_) => StatusCode::CONFLICT,
            Self::InvalidScope(_) => StatusCode::BAD_REQUEST,
            Self::BadState(_) | Self::Password(_) | Self::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

// ============================================================================
// Session Errors
// ============================================================================

/// Errors from session resolution and the cookie protocol.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("no session cookie")]
    NoCookie,

    #[error("invalid session id")]
    InvalidId,

    #[error("session expired")]
    Expired,

    #[error("invalid session cookie: {0}")]
    BadCookie(#[from] MacError),

    #[error("session cookie encoding failed: {0}")]
    Encode(MacError),

    #[error("store error: {0}")]
    Store(StoreError),
}

impl From<StoreError> for SessionError {
    fn from(err: StoreError) -> Self {
        if err.is_not_found() {
            Self::InvalidId
        } else {
            Self::Store(err)
        }
    }
}

impl SessionError {
    /// Get a static error code string for log labeling.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::NoCookie => "no_cookie",
            Self::InvalidId => "invalid_session_id",
            Self::Expired => "session_expired",
            Self::BadCookie(_) => "bad_cookie",
            Self::Encode(_) => "cookie_encode",
            Self::Store(e) => e.error_code(),
        }
    }

    /// Status code the transport layer reports for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::NoCookie | Self::InvalidId | Self::Expired | Self::BadCookie(_) => StatusCode::UNAUTHORIZED,
            Self::Encode(_) | Self::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The caller must log in again.
    pub fn requires_login(&self) -> bool {
        self.status() == StatusCode::UNAUTHORIZED
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permission_status_codes() {
        assert_eq!(PermissionError::TokenNotFound.status(), StatusCode::FORBIDDEN);
        assert_eq!(PermissionError::ExpiredToken.status(), StatusCode::FORBIDDEN);
        assert_eq!(PermissionError::NotSubset.status(), StatusCode::FORBIDDEN);
        assert_eq!(
            PermissionError::BadState("two documents for one token".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            PermissionError::AlreadyExists("io.cozy.apps/notes".into()).status(),
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn test_store_not_found_maps_per_layer() {
        let perm: PermissionError = StoreError::not_found("io.cozy.permissions", "x").into();
        assert!(matches!(perm, PermissionError::NotFound));

        let session: SessionError = StoreError::not_found("io.cozy.sessions", "x").into();
        assert!(matches!(session, SessionError::InvalidId));

        let session: SessionError = StoreError::Backend("down".into()).into();
        assert_eq!(session.error_code(), "backend");
        assert!(!session.requires_login());
    }

    #[test]
    fn test_session_errors_require_login() {
        assert!(SessionError::NoCookie.requires_login());
        assert!(SessionError::Expired.requires_login());
        assert!(SessionError::BadCookie(MacError::InvalidMac).requires_login());
    }
}
