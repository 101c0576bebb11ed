//! # Fitq (Session & Credential Authority)
//!
//! `fitq` turns verified identities into live credentials and tears them down
//! again. Every login path ends in the same place: a device session, a rotating
//! refresh token, and a short-lived bearer token.
//!
//! ## Credentials
//!
//! - **Access tokens** are HS256 JWTs (15 minutes). They are never persisted and
//!   cannot be revoked mid-lifetime; the short TTL is the compensating control.
//! - **Refresh tokens** are 32 random bytes handed to the client once. Only the
//!   SHA-256 hash is stored. Every refresh rotates the token; the old hash is
//!   revoked with a compare-and-set so a raced replay yields one winner.
//! - **Login codes** are six-digit, single-use, hashed at rest and rate limited
//!   per `(email, ip)`.
//! - **Impersonation tokens** let an admin open a four-hour session as a
//!   non-admin user. They travel on their own cookie so ending an impersonation
//!   never touches the admin's own session.
//!
//! ## Failure Reporting
//!
//! Untrusted callers only ever see generic kinds (`not authenticated`,
//! `invalid code`, `forbidden`). Precise reasons are reserved for admins on the
//! impersonation paths.

pub mod api;
pub mod auth;
pub mod cli;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);
