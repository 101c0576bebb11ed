//! Map validated CLI arguments to the action the binary runs.

use crate::cli::actions::{server::Args, Action};
use crate::cli::commands::{auth, mail, oauth};
use anyhow::Result;

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>("port").copied().unwrap_or(8080);
    let dsn = matches
        .get_one::<String>("dsn")
        .cloned()
        .filter(|v| !v.trim().is_empty());

    let auth_opts = auth::Options::parse(matches)?;
    let oauth_opts = oauth::Options::parse(matches)?;
    let mail_opts = mail::Options::parse(matches);

    Ok(Action::Server(Args {
        port,
        dsn,
        jwt_secret: auth_opts.jwt_secret.clone(),
        config: auth_opts.config(),
        signup_allowed_domains: auth_opts.signup_allowed_domains,
        oauth_providers: oauth_opts.providers,
        sendgrid_api_key: mail_opts.sendgrid_api_key,
        mail_from_address: mail_opts.from_address,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_action_without_dsn_uses_memory() {
        temp_env::with_vars(
            [
                ("FITQ_DSN", None::<&str>),
                ("FITQ_PORT", Some("9090")),
                ("FITQ_JWT_SECRET", Some("s3cret")),
                ("FITQ_GOOGLE_CLIENT_ID", None),
                ("FITQ_FACEBOOK_CLIENT_ID", None),
                ("FITQ_STEBBY_CLIENT_ID", None),
            ],
            || {
                let matches = crate::cli::commands::new().get_matches_from(vec!["fitq"]);
                let result = handler(&matches);
                assert!(result.is_ok());
                if let Ok(Action::Server(args)) = result {
                    assert_eq!(args.port, 9090);
                    assert!(args.dsn.is_none());
                    assert!(args.oauth_providers.is_empty());
                    assert_eq!(args.config.refresh_ttl_seconds(), 31_536_000);
                }
            },
        );
    }

    #[test]
    fn incomplete_provider_is_rejected() {
        temp_env::with_vars(
            [
                ("FITQ_JWT_SECRET", Some("s3cret")),
                ("FITQ_FACEBOOK_CLIENT_ID", Some("f-id")),
                ("FITQ_FACEBOOK_CLIENT_SECRET", None),
            ],
            || {
                let matches = crate::cli::commands::new().get_matches_from(vec!["fitq"]);
                let result = handler(&matches);
                assert!(result.is_err());
                if let Err(err) = result {
                    assert!(err
                        .to_string()
                        .contains("missing required argument: --facebook-client-secret"));
                }
            },
        );
    }
}
