//! Session cookie protocol.
//!
//! The cookie value is the session ID authenticated with the tenant's
//! session secret (see [`crate::security::mac`]). It is signed, not
//! encrypted: the ID is not secret, only unforgeable.

use super::{Session, SessionDuration};
use crate::config::{Config, Subdomains};
use crate::error::SessionError;
use crate::security::mac::{self, MacConfig, MacError};
use crate::tenant::Tenant;
use http::HeaderValue;
use http::header::InvalidHeaderValue;
use std::fmt;

/// Cookie name under nested subdomains.
pub const DEFAULT_COOKIE_NAME: &str = "cozysessid";

/// Bound on the encoded cookie value. A 100-byte ID takes 8 bytes of
/// timestamp and 32 of HMAC, under 200 bytes once base64 encoded.
pub const MAX_LEN: usize = 256;

/// Ten years.
pub const LONG_RUN_MAX_AGE: i64 = 10 * 365 * 24 * 3600;

/// Five minutes.
pub const SHORT_RUN_MAX_AGE: i64 = 5 * 60;

/// Deployment-wide cookie settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CookiePolicy {
    pub subdomains: Subdomains,
    /// Set the `Secure` flag. Off in dev mode only.
    pub secure: bool,
}

impl CookiePolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            subdomains: config.tenancy.subdomains,
            secure: !config.security.dev_mode,
        }
    }

    /// Name of the session cookie for `tenant`.
    pub fn cookie_name(&self, tenant: &Tenant) -> String {
        match self.subdomains {
            Subdomains::Flat => format!("sess-{}", tenant.prefix()),
            Subdomains::Nested => DEFAULT_COOKIE_NAME.to_string(),
        }
    }

    /// Domain of the session cookie for `tenant`, with a leading dot and no port.
    ///
    /// Under flat subdomains apps live on siblings of the tenant host, so the
    /// cookie goes one label up.
    pub fn cookie_domain(&self, tenant: &Tenant) -> String {
        let mut domain = tenant.domain();
        if self.subdomains == Subdomains::Flat
            && let Some((_, parent)) = domain.split_once('.')
        {
            domain = parent;
        }
        let host = domain.split_once(':').map_or(domain, |(host, _)| host);
        format!(".{host}")
    }

    fn mac_config(name: &str) -> MacConfig<'_> {
        MacConfig {
            name,
            max_len: MAX_LEN,
            max_age: None,
        }
    }

    /// Signed cookie carrying `session`'s ID.
    pub fn to_cookie(&self, session: &Session, tenant: &Tenant) -> Result<SessionCookie, SessionError> {
        let name = self.cookie_name(tenant);
        let value = mac::encode(&Self::mac_config(&name), tenant.session_secret(), session.id.as_bytes(), b"")
            .map_err(SessionError::Encode)?;

        let max_age = match session.duration() {
            SessionDuration::Long => LONG_RUN_MAX_AGE,
            SessionDuration::Short => SHORT_RUN_MAX_AGE,
            SessionDuration::Normal => 0,
        };

        Ok(SessionCookie {
            name,
            value,
            max_age,
            domain: self.cookie_domain(tenant),
            secure: self.secure,
            http_only: true,
            same_site_lax: true,
        })
    }

    /// Verify a cookie value and recover the session ID.
    pub fn session_id_from_cookie(&self, value: &str, tenant: &Tenant) -> Result<String, SessionError> {
        if value.is_empty() {
            return Err(SessionError::NoCookie);
        }
        let name = self.cookie_name(tenant);
        let id = mac::decode(&Self::mac_config(&name), tenant.session_secret(), value.as_bytes(), b"")?;
        String::from_utf8(id).map_err(|_| SessionError::BadCookie(MacError::Encoding))
    }

    /// Cookie telling the browser to drop the session cookie.
    pub fn clearing_cookie(&self, tenant: &Tenant) -> SessionCookie {
        SessionCookie {
            name: self.cookie_name(tenant),
            value: String::new(),
            max_age: -1,
            domain: self.cookie_domain(tenant),
            secure: false,
            http_only: false,
            same_site_lax: false,
        }
    }
}

/// A session cookie ready to be sent. Its path is always `/`.
///
/// `max_age` is in seconds: positive values are sent as is, `0` means a
/// browser-session cookie (no `Max-Age`), negative values delete the cookie.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionCookie {
    pub name: String,
    pub value: String,
    pub max_age: i64,
    pub domain: String,
    pub secure: bool,
    pub http_only: bool,
    pub same_site_lax: bool,
}

impl SessionCookie {
    /// Value of a `Set-Cookie` header.
    pub fn to_header_value(&self) -> Result<HeaderValue, InvalidHeaderValue> {
        HeaderValue::from_str(&self.to_string())
    }
}

impl fmt::Display for SessionCookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}; Path=/; Domain={}", self.name, self.value, self.domain)?;
        if self.max_age > 0 {
            write!(f, "; Max-Age={}", self.max_age)?;
        } else if self.max_age < 0 {
            f.write_str("; Max-Age=0")?;
        }
        if self.http_only {
            f.write_str("; HttpOnly")?;
        }
        if self.secure {
            f.write_str("; Secure")?;
        }
        if self.same_site_lax {
            f.write_str("; SameSite=Lax")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tenant() -> Tenant {
        Tenant::new("alice.example.net:8080", "alice-example-net", b"0123456789abcdef".to_vec())
    }

    fn policy(subdomains: Subdomains) -> CookiePolicy {
        CookiePolicy {
            subdomains,
            secure: true,
        }
    }

    #[test]
    fn test_cookie_name_and_domain() {
        let nested = policy(Subdomains::Nested);
        assert_eq!(nested.cookie_name(&tenant()), "cozysessid");
        assert_eq!(nested.cookie_domain(&tenant()), ".alice.example.net");

        let flat = policy(Subdomains::Flat);
        assert_eq!(flat.cookie_name(&tenant()), "sess-alice-example-net");
        assert_eq!(flat.cookie_domain(&tenant()), ".example.net");
    }

    #[test]
    fn test_max_age_per_duration() {
        let policy = policy(Subdomains::Nested);
        let cases = [
            (SessionDuration::Short, 300),
            (SessionDuration::Normal, 0),
            (SessionDuration::Long, 315_360_000),
        ];
        for (duration, max_age) in cases {
            let mut session = Session::new(duration, None);
            session.id = "abc".into();
            let cookie = policy.to_cookie(&session, &tenant()).unwrap();
            assert_eq!(cookie.max_age, max_age);
            assert!(cookie.http_only);
            assert!(cookie.secure);
        }
    }

    #[test]
    fn test_round_trip_and_tamper() {
        let policy = policy(Subdomains::Nested);
        let mut session = Session::new(SessionDuration::Normal, None);
        session.id = "0123456789abcdef0123456789abcdef".into();
        let cookie = policy.to_cookie(&session, &tenant()).unwrap();
        assert!(cookie.value.len() <= MAX_LEN);

        let id = policy.session_id_from_cookie(&cookie.value, &tenant()).unwrap();
        assert_eq!(id, session.id);

        let mut tampered = cookie.value.clone().into_bytes();
        tampered[3] = if tampered[3] == b'x' { b'y' } else { b'x' };
        let tampered = String::from_utf8(tampered).unwrap();
        assert!(policy.session_id_from_cookie(&tampered, &tenant()).is_err());

        // a cookie minted for another cookie name does not verify
        let flat = CookiePolicy {
            subdomains: Subdomains::Flat,
            ..policy
        };
        assert!(flat.session_id_from_cookie(&cookie.value, &tenant()).is_err());
    }

    #[test]
    fn test_empty_cookie_is_no_cookie() {
        let err = policy(Subdomains::Nested)
            .session_id_from_cookie("", &tenant())
            .unwrap_err();
        assert!(matches!(err, SessionError::NoCookie));
    }

    #[test]
    fn test_header_value() {
        let cookie = SessionCookie {
            name: "cozysessid".into(),
            value: "v".into(),
            max_age: 300,
            domain: ".alice.example.net".into(),
            secure: true,
            http_only: true,
            same_site_lax: true,
        };
        assert_eq!(
            cookie.to_string(),
            "cozysessid=v; Path=/; Domain=.alice.example.net; Max-Age=300; HttpOnly; Secure; SameSite=Lax"
        );
        assert!(cookie.to_header_value().is_ok());

        let clearing = policy(Subdomains::Nested).clearing_cookie(&tenant());
        assert_eq!(clearing.max_age, -1);
        assert_eq!(clearing.to_string(), "cozysessid=; Path=/; Domain=.alice.example.net; Max-Age=0");
    }

    #[test]
    fn test_dev_mode_drops_secure() {
        let mut config = Config::default();
        config.security.dev_mode = true;
        let policy = CookiePolicy::from_config(&config);
        let mut session = Session::new(SessionDuration::Normal, None);
        session.id = "abc".into();
        assert!(!policy.to_cookie(&session, &tenant()).unwrap().secure);
    }
}
