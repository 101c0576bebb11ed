use crate::{
    api,
    auth::{
        AuthConfig, AuthState, Backend, Clock, DomainAllowlist, LogMailer, MemoryCredentialStore,
        OAuthProvider, PgCredentialStore, ProviderConfig, SendGridMailer, SystemClock,
    },
    cli::telemetry,
};
use anyhow::{Context, Result};
use secrecy::SecretString;
use sqlx::postgres::PgPoolOptions;
use std::{sync::Arc, time::Duration};
use tracing::{info, warn};
use url::Url;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: Option<String>,
    pub jwt_secret: SecretString,
    pub config: AuthConfig,
    pub signup_allowed_domains: Vec<String>,
    pub oauth_providers: Vec<(OAuthProvider, ProviderConfig)>,
    pub sendgrid_api_key: Option<SecretString>,
    pub mail_from_address: String,
}

/// Execute the server action.
/// # Errors
/// Returns an error if the database is unreachable, the auth state cannot be
/// built, or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    log_startup_args(&args);

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let store = connect_store(args.dsn.as_deref(), clock.clone()).await?;

    let mut builder = AuthState::builder(Arc::new(store), args.config, args.jwt_secret)
        .with_clock(clock);

    if !args.signup_allowed_domains.is_empty() {
        builder = builder.with_policy(Arc::new(DomainAllowlist::new(
            &args.signup_allowed_domains,
        )));
    }

    builder = match args.sendgrid_api_key {
        Some(api_key) => builder.with_mailer(Arc::new(SendGridMailer::new(
            api_key,
            args.mail_from_address,
        )?)),
        None => {
            warn!("No SendGrid API key configured, login codes will only be logged");
            builder.with_mailer(Arc::new(LogMailer))
        }
    };

    for (provider, config) in args.oauth_providers {
        builder = builder.with_oauth_provider(provider, config);
    }

    let state = builder.build().context("Failed to build auth state")?;

    let result = api::new(args.port, Arc::new(state)).await;
    telemetry::shutdown_tracer();
    result
}

async fn connect_store(dsn: Option<&str>, clock: Arc<dyn Clock>) -> Result<Backend> {
    let Some(dsn) = dsn else {
        warn!("No DSN configured, using the in-memory credential store (single instance, lost on restart)");
        return Ok(Backend::Memory(Arc::new(MemoryCredentialStore::new(clock))));
    };

    let pool = PgPoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .max_lifetime(Duration::from_secs(60 * 2))
        .test_before_acquire(true)
        .connect(dsn)
        .await
        .context("Failed to connect to database")?;

    Ok(Backend::Postgres(PgCredentialStore::new(pool, clock)))
}

fn log_startup_args(args: &Args) {
    let providers = args
        .oauth_providers
        .iter()
        .map(|(provider, _)| provider.as_str())
        .collect::<Vec<_>>()
        .join(",");
    let entries = [
        ("listen", format!("tcp:{}", args.port)),
        (
            "dsn",
            args.dsn
                .as_deref()
                .map_or_else(|| "none (memory)".to_string(), redact_dsn),
        ),
        (
            "frontend_base_url",
            args.config.frontend_base_url().to_string(),
        ),
        (
            "access_ttl_seconds",
            args.config.access_ttl_seconds().to_string(),
        ),
        (
            "refresh_ttl_seconds",
            args.config.refresh_ttl_seconds().to_string(),
        ),
        (
            "impersonation_ttl_seconds",
            args.config.impersonation_ttl_seconds().to_string(),
        ),
        (
            "signup_allowed_domains",
            if args.signup_allowed_domains.is_empty() {
                "any".to_string()
            } else {
                args.signup_allowed_domains.join(",")
            },
        ),
        (
            "oauth_providers",
            if providers.is_empty() {
                "none".to_string()
            } else {
                providers
            },
        ),
        ("sendgrid_key_set", args.sendgrid_api_key.is_some().to_string()),
    ];
    log_entries("Startup configuration", &entries);
}

fn redact_dsn(dsn: &str) -> String {
    match Url::parse(dsn) {
        Ok(mut parsed) => {
            if parsed.password().is_some() {
                let _ = parsed.set_password(Some("REDACTED"));
            }
            parsed.to_string()
        }
        Err(_) => "invalid-dsn".to_string(),
    }
}

fn log_entries(title: &str, entries: &[(&str, String)]) {
    let max_key_len = entries.iter().map(|(key, _)| key.len()).max().unwrap_or(0);
    let mut message = format!(
        "fitq {} - {}\n\n{title}:",
        env!("CARGO_PKG_VERSION"),
        short_commit(crate::GIT_COMMIT_HASH)
    );
    for (key, value) in entries {
        let padding = " ".repeat(max_key_len.saturating_sub(key.len()));
        let _ =
            std::fmt::Write::write_fmt(&mut message, format_args!("\n  {key}:{padding} {value}"));
    }
    info!("{message}");
}

fn short_commit(hash: &str) -> &str {
    let trimmed = hash.trim();
    trimmed.get(..7).unwrap_or(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redact_dsn_hides_password() {
        assert_eq!(
            redact_dsn("postgres://fitq:hunter2@db:5432/fitq"),
            "postgres://fitq:REDACTED@db:5432/fitq"
        );
        assert_eq!(
            redact_dsn("postgres://fitq@db:5432/fitq"),
            "postgres://fitq@db:5432/fitq"
        );
        assert_eq!(redact_dsn("not a dsn"), "invalid-dsn");
    }

    #[test]
    fn short_commit_truncates() {
        assert_eq!(short_commit("0123456789abcdef"), "0123456");
        assert_eq!(short_commit("abc"), "abc");
    }

    #[tokio::test]
    async fn missing_dsn_falls_back_to_memory() -> Result<()> {
        let store = connect_store(None, Arc::new(SystemClock)).await?;
        assert_eq!(store.kind(), "memory");
        Ok(())
    }
}
