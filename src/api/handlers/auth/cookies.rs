//! Credential cookies.
//!
//! Each credential has its own cookie so that ending one never clears the
//! other. Values are opaque; attributes are `HttpOnly; SameSite=Lax; Path=/`,
//! plus `Secure` when the frontend is served over HTTPS.

use axum::http::{
    header::{InvalidHeaderValue, COOKIE},
    HeaderMap, HeaderValue,
};

use crate::auth::{CredentialJar, CredentialKind};

pub const REFRESH_COOKIE: &str = "fitq_refresh";
pub const IMPERSONATE_COOKIE: &str = "fitq_impersonate";
pub const OAUTH_VERIFIER_COOKIE: &str = "fitq_oauth_cv";

#[must_use]
pub fn cookie_name(kind: CredentialKind) -> &'static str {
    match kind {
        CredentialKind::Regular => REFRESH_COOKIE,
        CredentialKind::Impersonation => IMPERSONATE_COOKIE,
    }
}

/// Build a `Set-Cookie` value.
///
/// # Errors
/// Returns an error if the value contains bytes not allowed in a header.
pub fn set_cookie(
    name: &str,
    value: &str,
    max_age_seconds: i64,
    secure: bool,
) -> Result<HeaderValue, InvalidHeaderValue> {
    let mut cookie =
        format!("{name}={value}; Path=/; HttpOnly; SameSite=Lax; Max-Age={max_age_seconds}");
    if secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

/// Build a `Set-Cookie` value that removes the cookie.
///
/// # Errors
/// Returns an error if `name` is not a valid header value.
pub fn clear_cookie(name: &str, secure: bool) -> Result<HeaderValue, InvalidHeaderValue> {
    set_cookie(name, "", 0, secure)
}

#[must_use]
pub fn read_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    for header in headers.get_all(COOKIE) {
        let Ok(value) = header.to_str() else {
            continue;
        };
        for pair in value.split(';') {
            let mut parts = pair.trim().splitn(2, '=');
            let (Some(key), Some(val)) = (parts.next(), parts.next()) else {
                continue;
            };
            if key.trim() == name && !val.trim().is_empty() {
                return Some(val.trim().to_string());
            }
        }
    }
    None
}

/// Both credential cookies, as presented.
#[must_use]
pub fn credential_jar(headers: &HeaderMap) -> CredentialJar {
    CredentialJar {
        refresh: read_cookie(headers, REFRESH_COOKIE),
        impersonation: read_cookie(headers, IMPERSONATE_COOKIE),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_cookie_marks_secure_only_for_https() -> anyhow::Result<()> {
        let cookie = set_cookie(REFRESH_COOKIE, "abc", 31_536_000, true)?;
        assert_eq!(
            cookie.to_str()?,
            "fitq_refresh=abc; Path=/; HttpOnly; SameSite=Lax; Max-Age=31536000; Secure"
        );
        let cookie = clear_cookie(IMPERSONATE_COOKIE, false)?;
        assert_eq!(
            cookie.to_str()?,
            "fitq_impersonate=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0"
        );
        Ok(())
    }

    #[test]
    fn jar_reads_both_channels() {
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_static("theme=dark; fitq_refresh=r1; fitq_impersonate=i1"),
        );
        let jar = credential_jar(&headers);
        assert_eq!(jar.refresh.as_deref(), Some("r1"));
        assert_eq!(jar.impersonation.as_deref(), Some("i1"));
    }

    #[test]
    fn empty_cookie_values_are_absent() {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("fitq_impersonate=; fitq_refresh=r1"));
        let jar = credential_jar(&headers);
        assert_eq!(jar.impersonation, None);
        assert_eq!(jar.refresh.as_deref(), Some("r1"));
    }
}
