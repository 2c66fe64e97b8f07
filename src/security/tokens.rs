//! Random share codes.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::distributions::Alphanumeric;
use rand::rngs::OsRng;
use rand::{Rng, RngCore};

/// Entropy of a share code, in bytes.
pub const CODE_BYTES: usize = 32;

/// Length of a shortcode, in characters.
pub const SHORTCODE_LEN: usize = 12;

/// Long opaque token handed to a share recipient.
pub fn generate_code() -> String {
    let mut bytes = [0u8; CODE_BYTES];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Short alphanumeric alias of a code, easy to type.
pub fn generate_shortcode() -> String {
    OsRng
        .sample_iter(&Alphanumeric)
        .take(SHORTCODE_LEN)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_distinct_and_url_safe() {
        let a = generate_code();
        let b = generate_code();
        assert_ne!(a, b);
        assert_eq!(a.len(), 43);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn shortcodes_are_alphanumeric() {
        let code = generate_shortcode();
        assert_eq!(code.len(), SHORTCODE_LEN);
        assert!(code.chars().all(|c| c.is_ascii_alphanumeric()));
    }
}
