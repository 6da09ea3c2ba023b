//! Command-line interface handling for the table host.
//!
//! Uses the `clap` builder API to parse overrides for the configuration file.
//! Every option except the config path is optional; anything left unset
//! falls back to the value loaded from the TOML file.

use clap::{Arg, ArgMatches, Command};
use std::path::PathBuf;

/// Command line arguments parsed from user input.
///
/// Options here take precedence over the configuration file; see
/// `AppConfig::apply_overrides` for how each one is merged.
#[derive(Debug, Clone)]
pub struct CliArgs {
    /// Path to the configuration file
    pub config_path: PathBuf,
    /// Optional override for the table (listener) name
    pub table: Option<String>,
    /// Optional override for the number of bots
    pub bots: Option<usize>,
    /// Optional override for log level
    pub log_level: Option<String>,
    /// Whether to force JSON log output
    pub json_logs: bool,
}

impl CliArgs {
    /// Builds the `clap` command describing every supported option.
    fn command() -> Command {
        Command::new("Table Host")
            .version(env!("CARGO_PKG_VERSION"))
            .about("Hosts a game table and attaches bots through in-process connections")
            .arg(
                Arg::new("config")
                    .short('c')
                    .long("config")
                    .value_name("FILE")
                    .help("Configuration file path")
                    .default_value("table_host.toml"),
            )
            .arg(
                Arg::new("table")
                    .short('t')
                    .long("table")
                    .value_name("NAME")
                    .help("Table name bots connect to (e.g., table-1)"),
            )
            .arg(
                Arg::new("bots")
                    .short('b')
                    .long("bots")
                    .value_name("COUNT")
                    .value_parser(clap::value_parser!(usize))
                    .help("Number of bots to attach"),
            )
            .arg(
                Arg::new("log-level")
                    .short('l')
                    .long("log-level")
                    .value_name("LEVEL")
                    .help("Log level (trace, debug, info, warn, error)"),
            )
            .arg(
                Arg::new("json-logs")
                    .long("json-logs")
                    .help("Output logs in JSON format")
                    .action(clap::ArgAction::SetTrue),
            )
    }

    /// Parses the process arguments.
    ///
    /// # Returns
    ///
    /// A `CliArgs` with the config path defaulted to `table_host.toml` and
    /// every unset override left as `None`.
    ///
    /// # Panics
    ///
    /// Never for valid input. Invalid input (for example a non-numeric
    /// `--bots`) makes `clap` print usage and exit the process.
    pub fn parse() -> Self {
        Self::from_matches(&Self::command().get_matches())
    }

    fn from_matches(matches: &ArgMatches) -> Self {
        Self {
            config_path: matches
                .get_one::<String>("config")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("table_host.toml")),
            table: matches.get_one::<String>("table").cloned(),
            bots: matches.get_one::<usize>("bots").copied(),
            log_level: matches.get_one::<String>("log-level").cloned(),
            json_logs: matches.get_flag("json-logs"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_from(args: &[&str]) -> CliArgs {
        CliArgs::from_matches(&CliArgs::command().get_matches_from(args))
    }

    #[test]
    fn test_defaults() {
        let args = parse_from(&["table_host"]);
        assert_eq!(args.config_path, PathBuf::from("table_host.toml"));
        assert!(args.table.is_none());
        assert!(args.bots.is_none());
        assert!(args.log_level.is_none());
        assert!(!args.json_logs);
    }

    #[test]
    fn test_overrides() {
        let args = parse_from(&[
            "table_host",
            "--config",
            "custom.toml",
            "--table",
            "table-3",
            "--bots",
            "12",
            "-l",
            "debug",
            "--json-logs",
        ]);
        assert_eq!(args.config_path, PathBuf::from("custom.toml"));
        assert_eq!(args.table.as_deref(), Some("table-3"));
        assert_eq!(args.bots, Some(12));
        assert_eq!(args.log_level.as_deref(), Some("debug"));
        assert!(args.json_logs);
    }

    #[test]
    fn test_rejects_non_numeric_bots() {
        let result = CliArgs::command().try_get_matches_from(["table_host", "--bots", "many"]);
        assert!(result.is_err());
    }
}
