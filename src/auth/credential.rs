//! Active credential resolution.
//!
//! A browser may carry two refresh credentials at once: its own (regular) and
//! one obtained through impersonation. Every authenticated entry point asks
//! this module which one is in charge; the impersonation credential wins when
//! present, and logout clears only the channel it came from.

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CredentialKind {
    Regular,
    Impersonation,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ActiveCredential {
    pub kind: CredentialKind,
    pub plaintext: String,
}

/// Raw credential values as presented by the client.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CredentialJar {
    pub refresh: Option<String>,
    pub impersonation: Option<String>,
}

impl CredentialJar {
    #[must_use]
    pub fn regular(plaintext: impl Into<String>) -> Self {
        Self {
            refresh: Some(plaintext.into()),
            impersonation: None,
        }
    }

    #[must_use]
    pub fn with_impersonation(mut self, plaintext: impl Into<String>) -> Self {
        self.impersonation = Some(plaintext.into());
        self
    }

    /// The caller's own credential, ignoring any impersonation.
    #[must_use]
    pub fn regular_credential(&self) -> Option<ActiveCredential> {
        non_empty(self.refresh.as_deref()).map(|plaintext| ActiveCredential {
            kind: CredentialKind::Regular,
            plaintext,
        })
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

/// Pick the credential that speaks for the client.
#[must_use]
pub fn resolve_active_credential(jar: &CredentialJar) -> Option<ActiveCredential> {
    if let Some(plaintext) = non_empty(jar.impersonation.as_deref()) {
        return Some(ActiveCredential {
            kind: CredentialKind::Impersonation,
            plaintext,
        });
    }
    jar.regular_credential()
}
