//! Command-line flags.

use std::path::PathBuf;

use clap::Parser;

/// CBF safety filter for the RexROV.
///
/// Reads pose, point-cloud and command messages as JSON lines on stdin and
/// writes one filtered command per input command as a JSON line on stdout.
#[derive(Debug, Parser)]
#[command(name = "navigator")]
#[command(version)]
pub struct Cli {
    /// Configuration file (default: ~/.navigator/config.toml)
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Print the effective configuration as TOML and exit
    #[arg(long)]
    pub print_config: bool,

    /// Write the effective configuration to the config path and exit
    #[arg(long)]
    pub write_config: bool,
}

impl Cli {
    /// `true` when the run only exports configuration.
    pub fn exports_config(&self) -> bool {
        self.print_config || self.write_config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use clap::error::ErrorKind;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn no_arguments_gives_defaults() {
        let cli = Cli::try_parse_from(["navigator"]).unwrap();
        assert_eq!(cli.config, None);
        assert!(!cli.exports_config());
    }

    #[test]
    fn config_path_forms() {
        let expected = Some(PathBuf::from("/etc/navigator.toml"));
        for argv in [
            &["navigator", "--config", "/etc/navigator.toml"][..],
            &["navigator", "-c", "/etc/navigator.toml"][..],
            &["navigator", "--config=/etc/navigator.toml"][..],
        ] {
            assert_eq!(Cli::try_parse_from(argv).unwrap().config, expected);
        }
    }

    #[test]
    fn export_flags_are_recognised() {
        let cli = Cli::try_parse_from(["navigator", "--print-config", "--write-config"]).unwrap();
        assert!(cli.print_config);
        assert!(cli.write_config);
        assert!(cli.exports_config());
    }

    #[test]
    fn help_and_version_are_generated() {
        let err = Cli::try_parse_from(["navigator", "--help"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DisplayHelp);
        assert!(err.to_string().contains("--print-config"));

        let err = Cli::try_parse_from(["navigator", "-V"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DisplayVersion);
    }

    #[test]
    fn missing_config_value_is_an_error() {
        let err = Cli::try_parse_from(["navigator", "--config"]).unwrap_err();
        assert!(err.to_string().contains("--config"));
    }

    #[test]
    fn unknown_argument_is_an_error() {
        let err = Cli::try_parse_from(["navigator", "--kappa", "3"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownArgument);
        assert!(err.to_string().contains("--kappa"));
    }
}
