//! Lifetimes and limits for every credential the core issues.

const DEFAULT_ACCESS_TTL_SECONDS: i64 = 15 * 60;
const DEFAULT_REFRESH_TTL_SECONDS: i64 = 365 * 24 * 60 * 60;
const DEFAULT_IMPERSONATION_TTL_SECONDS: i64 = 4 * 60 * 60;
const DEFAULT_LOGIN_CODE_TTL_SECONDS: i64 = 10 * 60;
const DEFAULT_LOGIN_CODE_MAX_ATTEMPTS: i32 = 5;
const DEFAULT_LOGIN_CODE_RATE_LIMIT: usize = 5;
const DEFAULT_LOGIN_CODE_RATE_WINDOW_SECONDS: i64 = 60;
const DEFAULT_OAUTH_STATE_TTL_SECONDS: i64 = 10 * 60;
const DEFAULT_SESSION_LIST_LIMIT: i64 = 50;

#[derive(Clone, Debug)]
pub struct AuthConfig {
    frontend_base_url: String,
    access_ttl_seconds: i64,
    refresh_ttl_seconds: i64,
    impersonation_ttl_seconds: i64,
    login_code_ttl_seconds: i64,
    login_code_max_attempts: i32,
    login_code_rate_limit: usize,
    login_code_rate_window_seconds: i64,
    oauth_state_ttl_seconds: i64,
    session_list_limit: i64,
}

impl AuthConfig {
    #[must_use]
    pub fn new(frontend_base_url: String) -> Self {
        Self {
            frontend_base_url: frontend_base_url.trim_end_matches('/').to_string(),
            access_ttl_seconds: DEFAULT_ACCESS_TTL_SECONDS,
            refresh_ttl_seconds: DEFAULT_REFRESH_TTL_SECONDS,
            impersonation_ttl_seconds: DEFAULT_IMPERSONATION_TTL_SECONDS,
            login_code_ttl_seconds: DEFAULT_LOGIN_CODE_TTL_SECONDS,
            login_code_max_attempts: DEFAULT_LOGIN_CODE_MAX_ATTEMPTS,
            login_code_rate_limit: DEFAULT_LOGIN_CODE_RATE_LIMIT,
            login_code_rate_window_seconds: DEFAULT_LOGIN_CODE_RATE_WINDOW_SECONDS,
            oauth_state_ttl_seconds: DEFAULT_OAUTH_STATE_TTL_SECONDS,
            session_list_limit: DEFAULT_SESSION_LIST_LIMIT,
        }
    }

    #[must_use]
    pub fn with_access_ttl_seconds(mut self, seconds: i64) -> Self {
        self.access_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_refresh_ttl_seconds(mut self, seconds: i64) -> Self {
        self.refresh_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_impersonation_ttl_seconds(mut self, seconds: i64) -> Self {
        self.impersonation_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_login_code_ttl_seconds(mut self, seconds: i64) -> Self {
        self.login_code_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_login_code_max_attempts(mut self, attempts: i32) -> Self {
        self.login_code_max_attempts = attempts;
        self
    }

    #[must_use]
    pub fn with_login_code_rate_limit(mut self, limit: usize, window_seconds: i64) -> Self {
        self.login_code_rate_limit = limit;
        self.login_code_rate_window_seconds = window_seconds;
        self
    }

    #[must_use]
    pub fn with_oauth_state_ttl_seconds(mut self, seconds: i64) -> Self {
        self.oauth_state_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn frontend_base_url(&self) -> &str {
        &self.frontend_base_url
    }

    #[must_use]
    pub fn access_ttl_seconds(&self) -> i64 {
        self.access_ttl_seconds
    }

    #[must_use]
    pub fn refresh_ttl_seconds(&self) -> i64 {
        self.refresh_ttl_seconds
    }

    #[must_use]
    pub fn impersonation_ttl_seconds(&self) -> i64 {
        self.impersonation_ttl_seconds
    }

    #[must_use]
    pub fn login_code_ttl_seconds(&self) -> i64 {
        self.login_code_ttl_seconds
    }

    #[must_use]
    pub fn login_code_max_attempts(&self) -> i32 {
        self.login_code_max_attempts
    }

    #[must_use]
    pub fn login_code_rate_limit(&self) -> usize {
        self.login_code_rate_limit
    }

    #[must_use]
    pub fn login_code_rate_window_seconds(&self) -> i64 {
        self.login_code_rate_window_seconds
    }

    #[must_use]
    pub fn oauth_state_ttl_seconds(&self) -> i64 {
        self.oauth_state_ttl_seconds
    }

    #[must_use]
    pub fn session_list_limit(&self) -> i64 {
        self.session_list_limit
    }

    /// Cookies are only marked `Secure` when the frontend is served over HTTPS.
    #[must_use]
    pub fn cookie_secure(&self) -> bool {
        self.frontend_base_url.starts_with("https://")
    }
}
