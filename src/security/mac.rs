//! Authenticated messages.
//!
//! An encoded message is `base64url(payload ‖ timestamp ‖ tag)` where the
//! timestamp is the creation time in seconds (8 bytes, big endian) and the tag
//! is HMAC-SHA256 over the config name, the caller's additional data, the
//! payload and the timestamp. The payload is readable by anyone holding the
//! message; only its integrity is protected.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::time::Duration;
use subtle::ConstantTimeEq;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

const TIMESTAMP_LEN: usize = 8;
const TAG_LEN: usize = 32;

/// Context binding a message to one use.
#[derive(Debug, Clone, Copy)]
pub struct MacConfig<'a> {
    /// Logical name of the message (e.g. the cookie name).
    pub name: &'a str,
    /// Upper bound on the encoded length; `0` disables the check.
    pub max_len: usize,
    /// Maximum age accepted on decode.
    pub max_age: Option<Duration>,
}

/// MAC codec errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MacError {
    #[error("message exceeds maximum length")]
    TooLong,
    #[error("message is not valid base64")]
    Encoding,
    #[error("message too short")]
    TooShort,
    #[error("invalid message authentication code")]
    InvalidMac,
    #[error("message expired")]
    Expired,
    #[error("invalid key")]
    InvalidKey,
}

fn tag(config: &MacConfig<'_>, key: &[u8], additional: &[u8], body: &[u8]) -> Result<[u8; TAG_LEN], MacError> {
    let mut mac = HmacSha256::new_from_slice(key).map_err(|_| MacError::InvalidKey)?;
    // length prefixes keep name and additional data from bleeding into each other
    mac.update(&(config.name.len() as u64).to_be_bytes());
    mac.update(config.name.as_bytes());
    mac.update(&(additional.len() as u64).to_be_bytes());
    mac.update(additional);
    mac.update(body);
    Ok(mac.finalize().into_bytes().into())
}

/// Encode `value` at the current time.
pub fn encode(config: &MacConfig<'_>, key: &[u8], value: &[u8], additional: &[u8]) -> Result<String, MacError> {
    encode_at(config, key, value, additional, chrono::Utc::now().timestamp())
}

/// Encode `value` with an explicit creation time (seconds since the epoch).
pub fn encode_at(
    config: &MacConfig<'_>,
    key: &[u8],
    value: &[u8],
    additional: &[u8],
    now: i64,
) -> Result<String, MacError> {
    let mut raw = Vec::with_capacity(value.len() + TIMESTAMP_LEN + TAG_LEN);
    raw.extend_from_slice(value);
    raw.extend_from_slice(&now.to_be_bytes());
    let tag = tag(config, key, additional, &raw)?;
    raw.extend_from_slice(&tag);

    let encoded = URL_SAFE_NO_PAD.encode(&raw);
    if config.max_len > 0 && encoded.len() > config.max_len {
        return Err(MacError::TooLong);
    }
    Ok(encoded)
}

/// Verify and decode a message at the current time.
pub fn decode(config: &MacConfig<'_>, key: &[u8], encoded: &[u8], additional: &[u8]) -> Result<Vec<u8>, MacError> {
    decode_at(config, key, encoded, additional, chrono::Utc::now().timestamp())
}

/// Verify and decode a message as of `now` (seconds since the epoch).
pub fn decode_at(
    config: &MacConfig<'_>,
    key: &[u8],
    encoded: &[u8],
    additional: &[u8],
    now: i64,
) -> Result<Vec<u8>, MacError> {
    if config.max_len > 0 && encoded.len() > config.max_len {
        return Err(MacError::TooLong);
    }
    let raw = URL_SAFE_NO_PAD.decode(encoded).map_err(|_| MacError::Encoding)?;
    if raw.len() < TIMESTAMP_LEN + TAG_LEN {
        return Err(MacError::TooShort);
    }

    let (body, received) = raw.split_at(raw.len() - TAG_LEN);
    let expected = tag(config, key, additional, body)?;
    if !bool::from(expected.ct_eq(received)) {
        return Err(MacError::InvalidMac);
    }

    let (value, ts) = body.split_at(body.len() - TIMESTAMP_LEN);
    let mut ts_bytes = [0u8; TIMESTAMP_LEN];
    ts_bytes.copy_from_slice(ts);
    let created = i64::from_be_bytes(ts_bytes);

    if let Some(max_age) = config.max_age {
        let max_age = i64::try_from(max_age.as_secs()).unwrap_or(i64::MAX);
        if created.saturating_add(max_age) < now {
            return Err(MacError::Expired);
        }
    }

    Ok(value.to_vec())
}
