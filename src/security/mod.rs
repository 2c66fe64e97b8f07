//! Security primitives for docgate.
//!
//! - **MAC codec**: HMAC-SHA256 authenticated (not encrypted) messages for session cookies
//! - **Passwords**: Argon2 hashing for password-protected share links
//! - **Tokens**: random share codes and human-enterable shortcodes

pub mod mac;
pub mod password;
pub mod tokens;

pub use mac::{MacConfig, MacError};
