use clap::{Arg, ArgMatches, Command};
use secrecy::SecretString;

pub const ARG_SENDGRID_API_KEY: &str = "sendgrid-api-key";
pub const ARG_MAIL_FROM_ADDRESS: &str = "mail-from-address";

#[derive(Debug, Clone)]
pub struct Options {
    /// Without a key, login codes are written to the log instead of mailed.
    pub sendgrid_api_key: Option<SecretString>,
    pub from_address: String,
}

impl Options {
    #[must_use]
    pub fn parse(matches: &ArgMatches) -> Self {
        Self {
            sendgrid_api_key: matches
                .get_one::<String>(ARG_SENDGRID_API_KEY)
                .filter(|v| !v.trim().is_empty())
                .map(|key| SecretString::from(key.clone())),
            from_address: matches
                .get_one::<String>(ARG_MAIL_FROM_ADDRESS)
                .cloned()
                .unwrap_or_else(|| "no-reply@fitq.app".to_string()),
        }
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_SENDGRID_API_KEY)
                .long(ARG_SENDGRID_API_KEY)
                .help("SendGrid API key used to deliver login codes")
                .env("FITQ_SENDGRID_API_KEY")
                .hide_env_values(true),
        )
        .arg(
            Arg::new(ARG_MAIL_FROM_ADDRESS)
                .long(ARG_MAIL_FROM_ADDRESS)
                .help("Sender address for login code mail")
                .env("FITQ_MAIL_FROM_ADDRESS")
                .default_value("no-reply@fitq.app"),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn api_key_is_optional() {
        temp_env::with_vars(
            [
                ("FITQ_SENDGRID_API_KEY", None::<&str>),
                ("FITQ_MAIL_FROM_ADDRESS", None),
            ],
            || {
                let matches = with_args(Command::new("fitq")).get_matches_from(vec!["fitq"]);
                let options = Options::parse(&matches);
                assert!(options.sendgrid_api_key.is_none());
                assert_eq!(options.from_address, "no-reply@fitq.app");
            },
        );
    }

    #[test]
    fn api_key_from_env() {
        temp_env::with_vars(
            [
                ("FITQ_SENDGRID_API_KEY", Some("SG.key")),
                ("FITQ_MAIL_FROM_ADDRESS", Some("login@fitq.app")),
            ],
            || {
                let matches = with_args(Command::new("fitq")).get_matches_from(vec!["fitq"]);
                let options = Options::parse(&matches);
                assert_eq!(
                    options
                        .sendgrid_api_key
                        .as_ref()
                        .map(|key| key.expose_secret().to_string()),
                    Some("SG.key".to_string())
                );
                assert_eq!(options.from_address, "login@fitq.app");
            },
        );
    }
}
