use crate::auth::{OAuthProvider, ProviderConfig};
use clap::{Arg, ArgMatches, Command};
use secrecy::SecretString;

/// Providers with a client id configured. The rest stay disabled and answer
/// `404` on their start route.
#[derive(Debug, Clone, Default)]
pub struct Options {
    pub providers: Vec<(OAuthProvider, ProviderConfig)>,
}

impl Options {
    /// Parse OAuth provider credentials from matches.
    ///
    /// # Errors
    /// Returns an error if a provider has a client id but is missing its
    /// secret or, for Stebby, one of its endpoints.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        let get_non_empty = |id: &str| {
            matches
                .get_one::<String>(id)
                .cloned()
                .filter(|v| !v.trim().is_empty())
        };
        let read_required = |id: &str| -> anyhow::Result<String> {
            get_non_empty(id).ok_or_else(|| anyhow::anyhow!("missing required argument: --{id}"))
        };

        let mut providers = Vec::new();

        if let Some(client_id) = get_non_empty("google-client-id") {
            let secret = SecretString::from(read_required("google-client-secret")?);
            let redirect = read_required("google-redirect-uri")?;
            providers.push((
                OAuthProvider::Google,
                ProviderConfig::google(client_id, secret, redirect),
            ));
        }

        if let Some(client_id) = get_non_empty("facebook-client-id") {
            let secret = SecretString::from(read_required("facebook-client-secret")?);
            let redirect = read_required("facebook-redirect-uri")?;
            providers.push((
                OAuthProvider::Facebook,
                ProviderConfig::facebook(client_id, secret, redirect),
            ));
        }

        if let Some(client_id) = get_non_empty("stebby-client-id") {
            let config = ProviderConfig::stebby(
                read_required("stebby-auth-url")?,
                read_required("stebby-token-url")?,
                read_required("stebby-userinfo-url")?,
                client_id,
                SecretString::from(read_required("stebby-client-secret")?),
                read_required("stebby-redirect-uri")?,
            );
            let config = match get_non_empty("stebby-scope") {
                Some(scope) => config.with_scope(scope),
                None => config,
            };
            providers.push((OAuthProvider::Stebby, config));
        }

        Ok(Self { providers })
    }
}

macro_rules! provider_args {
    ($command:expr, $provider:literal, $env:literal, $label:literal) => {
        $command
            .arg(
                Arg::new(concat!($provider, "-client-id"))
                    .long(concat!($provider, "-client-id"))
                    .help(concat!($label, " OAuth client id (provider disabled when unset)"))
                    .env(concat!("FITQ_", $env, "_CLIENT_ID")),
            )
            .arg(
                Arg::new(concat!($provider, "-client-secret"))
                    .long(concat!($provider, "-client-secret"))
                    .help(concat!($label, " OAuth client secret"))
                    .env(concat!("FITQ_", $env, "_CLIENT_SECRET"))
                    .hide_env_values(true),
            )
            .arg(
                Arg::new(concat!($provider, "-redirect-uri"))
                    .long(concat!($provider, "-redirect-uri"))
                    .help(concat!($label, " OAuth callback URL registered with the provider"))
                    .env(concat!("FITQ_", $env, "_REDIRECT_URI"))
                    .default_value(concat!(
                        "http://localhost:8080/v1/auth/oauth/",
                        $provider,
                        "/callback"
                    )),
            )
    };
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    let command = provider_args!(command, "google", "GOOGLE", "Google");
    let command = provider_args!(command, "facebook", "FACEBOOK", "Facebook");
    let command = provider_args!(command, "stebby", "STEBBY", "Stebby");
    with_stebby_endpoint_args(command)
}

fn with_stebby_endpoint_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("stebby-auth-url")
                .long("stebby-auth-url")
                .help("Stebby authorization endpoint")
                .env("FITQ_STEBBY_AUTH_URL"),
        )
        .arg(
            Arg::new("stebby-token-url")
                .long("stebby-token-url")
                .help("Stebby token endpoint")
                .env("FITQ_STEBBY_TOKEN_URL"),
        )
        .arg(
            Arg::new("stebby-userinfo-url")
                .long("stebby-userinfo-url")
                .help("Stebby userinfo endpoint")
                .env("FITQ_STEBBY_USERINFO_URL"),
        )
        .arg(
            Arg::new("stebby-scope")
                .long("stebby-scope")
                .help("Stebby OAuth scope")
                .env("FITQ_STEBBY_SCOPE"),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROVIDER_VARS: [&str; 6] = [
        "FITQ_GOOGLE_CLIENT_ID",
        "FITQ_GOOGLE_CLIENT_SECRET",
        "FITQ_FACEBOOK_CLIENT_ID",
        "FITQ_FACEBOOK_CLIENT_SECRET",
        "FITQ_STEBBY_CLIENT_ID",
        "FITQ_STEBBY_CLIENT_SECRET",
    ];

    fn parse(args: Vec<&str>) -> anyhow::Result<Options> {
        let cleared = PROVIDER_VARS.map(|name| (name, None::<&str>));
        temp_env::with_vars(cleared, || {
            let matches = with_args(Command::new("fitq")).get_matches_from(args);
            Options::parse(&matches)
        })
    }

    #[test]
    fn providers_disabled_without_client_id() -> anyhow::Result<()> {
        let options = parse(vec!["fitq"])?;
        assert!(options.providers.is_empty());
        Ok(())
    }

    #[test]
    fn google_and_facebook_from_flags() -> anyhow::Result<()> {
        let options = parse(vec![
            "fitq",
            "--google-client-id",
            "g-id",
            "--google-client-secret",
            "g-secret",
            "--facebook-client-id",
            "f-id",
            "--facebook-client-secret",
            "f-secret",
        ])?;
        let enabled: Vec<_> = options.providers.iter().map(|(p, _)| *p).collect();
        assert_eq!(enabled, vec![OAuthProvider::Google, OAuthProvider::Facebook]);
        assert!(options.providers[0].1.pkce);
        assert!(!options.providers[1].1.pkce);
        assert_eq!(
            options.providers[0].1.redirect_uri,
            "http://localhost:8080/v1/auth/oauth/google/callback"
        );
        Ok(())
    }

    #[test]
    fn client_id_without_secret_is_rejected() {
        let result = parse(vec!["fitq", "--google-client-id", "g-id"]);
        assert!(result.is_err());
        if let Err(err) = result {
            assert!(err.to_string().contains("--google-client-secret"));
        }
    }

    #[test]
    fn stebby_needs_endpoints() -> anyhow::Result<()> {
        assert!(parse(vec![
            "fitq",
            "--stebby-client-id",
            "s-id",
            "--stebby-client-secret",
            "s-secret",
        ])
        .is_err());

        let options = parse(vec![
            "fitq",
            "--stebby-client-id",
            "s-id",
            "--stebby-client-secret",
            "s-secret",
            "--stebby-auth-url",
            "https://id.stebby.test/authorize",
            "--stebby-token-url",
            "https://id.stebby.test/token",
            "--stebby-userinfo-url",
            "https://id.stebby.test/userinfo",
            "--stebby-scope",
            "openid email",
        ])?;
        let (provider, config) = &options.providers[0];
        assert_eq!(*provider, OAuthProvider::Stebby);
        assert_eq!(config.scope, "openid email");
        assert_eq!(config.token_url, "https://id.stebby.test/token");
        Ok(())
    }
}
