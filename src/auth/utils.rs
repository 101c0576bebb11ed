//! Small helpers shared by the login paths: email normalization, opaque token
//! generation and hashing, login code generation, and device labels.

use anyhow::{Context, Result};
use base64ct::{Base64UrlUnpadded, Encoding};
use rand::{rngs::OsRng, Rng, RngCore};
use regex::Regex;
use sha2::{Digest, Sha256};

const DEFAULT_NEXT_PATH: &str = "/dashboard";

/// Normalize an email for lookup/uniqueness checks.
#[must_use]
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Basic email format check on already-normalized input.
#[must_use]
pub fn valid_email(email_normalized: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|regex| regex.is_match(email_normalized))
}

/// Create a new opaque token (refresh, impersonation).
///
/// The raw value is only handed to the client; storage keeps `hash_token` of it.
pub fn generate_token() -> Result<String> {
    let mut bytes = [0u8; 32];
    OsRng
        .try_fill_bytes(&mut bytes)
        .context("failed to generate token")?;
    Ok(Base64UrlUnpadded::encode_string(&bytes))
}

/// Hash an opaque token or login code so raw values never touch storage.
#[must_use]
pub fn hash_token(token: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hasher.finalize().to_vec()
}

/// Six digits, uniform over `100000..=999999`.
#[must_use]
pub fn generate_login_code() -> String {
    OsRng.gen_range(100_000u32..=999_999).to_string()
}

/// Best-effort device label from the user agent.
#[must_use]
pub fn device_label(user_agent: Option<&str>) -> String {
    let user_agent = user_agent.unwrap_or_default();
    if user_agent.contains("Mobile") {
        "Mobile Browser".to_string()
    } else if user_agent.contains("Tablet") {
        "Tablet Browser".to_string()
    } else {
        "Web Browser".to_string()
    }
}

/// Only same-site absolute paths are accepted as post-login redirects.
#[must_use]
pub fn sanitize_next_path(next: Option<&str>) -> String {
    match next.map(str::trim) {
        Some(path) if path.starts_with('/') && !path.starts_with("//") && !path.contains('\\') => {
            path.to_string()
        }
        _ => DEFAULT_NEXT_PATH.to_string(),
    }
}

/// Name shown when the user never set one.
#[must_use]
pub fn display_name_fallback(email: &str) -> String {
    email.split('@').next().unwrap_or(email).to_string()
}
