use clap::{builder::ValueParser, Arg, Command};

pub const ARG_VERBOSITY: &str = "verbosity";

#[must_use]
pub fn validator_log_level() -> ValueParser {
    ValueParser::from(move |level: &str| -> std::result::Result<u8, String> {
        if let Ok(parsed) = level.parse::<u8>() {
            // Successfully parsed as a number
            if parsed <= 5 {
                return Ok(parsed);
            }
        }

        match level.to_lowercase().as_str() {
            "error" => Ok(0),
            "warn" => Ok(1),
            "info" => Ok(2),
            "debug" => Ok(3),
            "trace" => Ok(4),
            _ => Err("invalid log level".to_string()),
        }
    })
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command.arg(
        Arg::new(ARG_VERBOSITY)
            .short('v')
            .long("verbose")
            .help("Verbosity level: ERROR, WARN, INFO, DEBUG, TRACE (default: ERROR)")
            .env("FITQ_LOG_LEVEL")
            .global(true)
            .action(clap::ArgAction::Count)
            .value_parser(validator_log_level()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_level_accepts_names_and_numbers() {
        temp_env::with_vars([("FITQ_LOG_LEVEL", None::<&str>)], || {
            let matches = with_args(Command::new("fitq")).get_matches_from(vec!["fitq", "-vvv"]);
            assert_eq!(matches.get_one::<u8>(ARG_VERBOSITY).copied(), Some(3));
        });

        temp_env::with_vars([("FITQ_LOG_LEVEL", Some("5"))], || {
            let matches = with_args(Command::new("fitq")).get_matches_from(vec!["fitq"]);
            assert_eq!(matches.get_one::<u8>(ARG_VERBOSITY).copied(), Some(5));
        });

        temp_env::with_vars([("FITQ_LOG_LEVEL", Some("loud"))], || {
            let result = with_args(Command::new("fitq")).try_get_matches_from(vec!["fitq"]);
            assert!(result.is_err());
        });
    }
}
