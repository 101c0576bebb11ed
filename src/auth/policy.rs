//! Gate on creating new accounts.
//!
//! Consulted only when a verified email has no live user yet. A refusal
//! surfaces as `AccessDenied` and nothing is written.

pub trait EnrollmentPolicy: Send + Sync {
    fn may_enroll(&self, email: &str) -> bool;
}

#[derive(Clone, Debug)]
pub struct OpenEnrollment;

impl EnrollmentPolicy for OpenEnrollment {
    fn may_enroll(&self, _email: &str) -> bool {
        true
    }
}

/// Only addresses under the listed domains may create accounts.
#[derive(Clone, Debug)]
pub struct DomainAllowlist {
    domains: Vec<String>,
}

impl DomainAllowlist {
    #[must_use]
    pub fn new<I, S>(domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            domains: domains
                .into_iter()
                .map(|domain| domain.as_ref().trim().trim_start_matches('@').to_lowercase())
                .filter(|domain| !domain.is_empty())
                .collect(),
        }
    }
}

impl EnrollmentPolicy for DomainAllowlist {
    fn may_enroll(&self, email: &str) -> bool {
        let Some((_, domain)) = email.rsplit_once('@') else {
            return false;
        };
        let domain = domain.to_lowercase();
        self.domains.iter().any(|allowed| *allowed == domain)
    }
}
