use crate::auth::AuthConfig;
use clap::{Arg, ArgMatches, Command};
use secrecy::SecretString;

pub const ARG_JWT_SECRET: &str = "jwt-secret";
pub const ARG_FRONTEND_BASE_URL: &str = "frontend-base-url";
pub const ARG_SIGNUP_ALLOWED_DOMAINS: &str = "signup-allowed-domains";

#[derive(Debug, Clone)]
pub struct Options {
    pub jwt_secret: SecretString,
    pub frontend_base_url: String,
    pub access_ttl_seconds: i64,
    pub refresh_ttl_seconds: i64,
    pub impersonation_ttl_seconds: i64,
    pub login_code_ttl_seconds: i64,
    pub login_code_max_attempts: i32,
    pub login_code_rate_limit: usize,
    pub login_code_rate_window_seconds: i64,
    pub oauth_state_ttl_seconds: i64,
    pub signup_allowed_domains: Vec<String>,
}

impl Options {
    /// Parse credential lifetimes and limits from matches.
    ///
    /// # Errors
    /// Returns an error if the signing secret is missing or a lifetime is not positive.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        let jwt_secret = matches
            .get_one::<String>(ARG_JWT_SECRET)
            .filter(|v| !v.trim().is_empty())
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("missing required argument: --{ARG_JWT_SECRET}"))?;

        let seconds = |id: &str| -> anyhow::Result<i64> {
            match matches.get_one::<i64>(id).copied() {
                Some(value) if value > 0 => Ok(value),
                Some(value) => anyhow::bail!("--{id} must be positive, got {value}"),
                None => anyhow::bail!("missing required argument: --{id}"),
            }
        };

        let signup_allowed_domains = matches
            .get_many::<String>(ARG_SIGNUP_ALLOWED_DOMAINS)
            .map(|values| {
                values
                    .map(|domain| domain.trim().to_string())
                    .filter(|domain| !domain.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            jwt_secret: SecretString::from(jwt_secret),
            frontend_base_url: matches
                .get_one::<String>(ARG_FRONTEND_BASE_URL)
                .cloned()
                .unwrap_or_else(|| "http://localhost:3000".to_string()),
            access_ttl_seconds: seconds("access-ttl-seconds")?,
            refresh_ttl_seconds: seconds("refresh-ttl-seconds")?,
            impersonation_ttl_seconds: seconds("impersonation-ttl-seconds")?,
            login_code_ttl_seconds: seconds("login-code-ttl-seconds")?,
            login_code_max_attempts: matches
                .get_one::<i32>("login-code-max-attempts")
                .copied()
                .unwrap_or(5),
            login_code_rate_limit: matches
                .get_one::<usize>("login-code-rate-limit")
                .copied()
                .unwrap_or(5),
            login_code_rate_window_seconds: seconds("login-code-rate-window-seconds")?,
            oauth_state_ttl_seconds: seconds("oauth-state-ttl-seconds")?,
            signup_allowed_domains,
        })
    }

    #[must_use]
    pub fn config(&self) -> AuthConfig {
        AuthConfig::new(self.frontend_base_url.clone())
            .with_access_ttl_seconds(self.access_ttl_seconds)
            .with_refresh_ttl_seconds(self.refresh_ttl_seconds)
            .with_impersonation_ttl_seconds(self.impersonation_ttl_seconds)
            .with_login_code_ttl_seconds(self.login_code_ttl_seconds)
            .with_login_code_max_attempts(self.login_code_max_attempts)
            .with_login_code_rate_limit(
                self.login_code_rate_limit,
                self.login_code_rate_window_seconds,
            )
            .with_oauth_state_ttl_seconds(self.oauth_state_ttl_seconds)
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    let command = with_token_args(command);
    let command = with_login_code_args(command);
    with_enrollment_args(command)
}

fn with_token_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_JWT_SECRET)
                .long(ARG_JWT_SECRET)
                .help("HMAC secret used to sign access tokens and OAuth state")
                .env("FITQ_JWT_SECRET")
                .hide_env_values(true)
                .required(true),
        )
        .arg(
            Arg::new(ARG_FRONTEND_BASE_URL)
                .long(ARG_FRONTEND_BASE_URL)
                .help("Frontend base URL used for login links, redirects and CORS")
                .env("FITQ_FRONTEND_BASE_URL")
                .default_value("http://localhost:3000"),
        )
        .arg(
            Arg::new("access-ttl-seconds")
                .long("access-ttl-seconds")
                .help("Access token TTL in seconds")
                .env("FITQ_ACCESS_TTL_SECONDS")
                .default_value("900")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new("refresh-ttl-seconds")
                .long("refresh-ttl-seconds")
                .help("Refresh token TTL in seconds")
                .env("FITQ_REFRESH_TTL_SECONDS")
                .default_value("31536000")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new("impersonation-ttl-seconds")
                .long("impersonation-ttl-seconds")
                .help("Impersonation token and session TTL in seconds")
                .env("FITQ_IMPERSONATION_TTL_SECONDS")
                .default_value("14400")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new("oauth-state-ttl-seconds")
                .long("oauth-state-ttl-seconds")
                .help("OAuth state and PKCE verifier TTL in seconds")
                .env("FITQ_OAUTH_STATE_TTL_SECONDS")
                .default_value("600")
                .value_parser(clap::value_parser!(i64)),
        )
}

fn with_login_code_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("login-code-ttl-seconds")
                .long("login-code-ttl-seconds")
                .help("Login code TTL in seconds")
                .env("FITQ_LOGIN_CODE_TTL_SECONDS")
                .default_value("600")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new("login-code-max-attempts")
                .long("login-code-max-attempts")
                .help("Wrong guesses allowed before a login code is locked")
                .env("FITQ_LOGIN_CODE_MAX_ATTEMPTS")
                .default_value("5")
                .value_parser(clap::value_parser!(i32).range(1..)),
        )
        .arg(
            Arg::new("login-code-rate-limit")
                .long("login-code-rate-limit")
                .help("Login code requests allowed per email and IP within the window")
                .env("FITQ_LOGIN_CODE_RATE_LIMIT")
                .default_value("5")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new("login-code-rate-window-seconds")
                .long("login-code-rate-window-seconds")
                .help("Login code rate limit window in seconds")
                .env("FITQ_LOGIN_CODE_RATE_WINDOW_SECONDS")
                .default_value("60")
                .value_parser(clap::value_parser!(i64)),
        )
}

fn with_enrollment_args(command: Command) -> Command {
    command.arg(
        Arg::new(ARG_SIGNUP_ALLOWED_DOMAINS)
            .long(ARG_SIGNUP_ALLOWED_DOMAINS)
            .help("Comma separated email domains allowed to create accounts (default: any)")
            .env("FITQ_SIGNUP_ALLOWED_DOMAINS")
            .value_delimiter(','),
    )
}
