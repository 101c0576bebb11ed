//! Error kinds surfaced by the credential core.
//!
//! Storage and infrastructure failures travel as `anyhow::Error` and end up in
//! `AuthError::Internal`. Everything else is a declared kind; a missing or
//! malformed id is never an internal error.

use thiserror::Error;

pub type AuthResult<T> = Result<T, AuthError>;

#[derive(Debug, Error)]
pub enum AuthError {
    /// Missing, invalid, expired, or revoked credential.
    #[error("not authenticated")]
    Unauthenticated,
    /// Unknown challenge, wrong code, consumed code, or expired code.
    #[error("invalid or expired code")]
    InvalidCode,
    #[error("invalid email address")]
    InvalidEmail,
    #[error("too many requests, try again later")]
    RateLimited,
    #[error("forbidden")]
    Forbidden,
    #[error("not found")]
    NotFound,
    #[error("oauth exchange failed")]
    OAuthExchangeFailed,
    #[error("identity provider did not return an email")]
    MissingEmail,
    /// Account creation refused by the enrollment policy.
    #[error("access denied")]
    AccessDenied,
    // Precise impersonation outcomes, only ever produced for admin callers.
    #[error("invalid impersonation token")]
    InvalidToken,
    #[error("impersonation token expired")]
    Expired,
    #[error("impersonation token already used")]
    AlreadyUsed,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Failures of the impersonation state machine.
///
/// These are precise on purpose; convert with [`ImpersonationError::for_caller`]
/// before they reach anyone.
#[derive(Debug, Error)]
pub enum ImpersonationError {
    #[error("impersonation token not found")]
    InvalidToken,
    #[error("impersonation token expired")]
    Expired,
    #[error("impersonation token already used")]
    AlreadyUsed,
    #[error("impersonation not permitted")]
    Forbidden,
    #[error("user not found")]
    NotFound,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ImpersonationError {
    /// Collapse to what the caller may learn: admins see the precise reason,
    /// everybody else gets `Forbidden`.
    #[must_use]
    pub fn for_caller(self, caller_is_admin: bool) -> AuthError {
        match (self, caller_is_admin) {
            (Self::Internal(err), _) => AuthError::Internal(err),
            (_, false) => AuthError::Forbidden,
            (Self::InvalidToken, true) => AuthError::InvalidToken,
            (Self::Expired, true) => AuthError::Expired,
            (Self::AlreadyUsed, true) => AuthError::AlreadyUsed,
            (Self::Forbidden, true) => AuthError::Forbidden,
            (Self::NotFound, true) => AuthError::NotFound,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_admin_callers_only_see_forbidden() {
        for err in [
            ImpersonationError::InvalidToken,
            ImpersonationError::Expired,
            ImpersonationError::AlreadyUsed,
            ImpersonationError::Forbidden,
            ImpersonationError::NotFound,
        ] {
            assert!(matches!(err.for_caller(false), AuthError::Forbidden));
        }
    }

    #[test]
    fn admin_callers_see_precise_reason() {
        assert!(matches!(
            ImpersonationError::InvalidToken.for_caller(true),
            AuthError::InvalidToken
        ));
        assert!(matches!(
            ImpersonationError::Expired.for_caller(true),
            AuthError::Expired
        ));
        assert!(matches!(
            ImpersonationError::AlreadyUsed.for_caller(true),
            AuthError::AlreadyUsed
        ));
        assert!(matches!(
            ImpersonationError::NotFound.for_caller(true),
            AuthError::NotFound
        ));
    }

    #[test]
    fn internal_errors_pass_through() {
        let err = ImpersonationError::Internal(anyhow::anyhow!("db down"));
        assert!(matches!(err.for_caller(false), AuthError::Internal(_)));
    }
}
