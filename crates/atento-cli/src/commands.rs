//! CLI command definitions using clap

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Atento: run resilient browser end-to-end flows
#[derive(Parser, Debug)]
#[command(name = "atento")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (suppress non-error output)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Color output (auto, always, never)
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorArg,

    /// Log line format on stderr
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormatArg,

    /// Subcommand to run
    #[command(subcommand)]
    pub command: Commands,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run flows against a live browser
    Run(RunArgs),

    /// List built-in flows
    List,

    /// Show the effective run configuration as YAML
    Config(ConfigArgs),
}

/// Arguments for the run command
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Only run flows whose name contains this text
    #[arg(short, long)]
    pub filter: Option<String>,

    /// Number of concurrent workers
    #[arg(short = 'j', long)]
    pub workers: Option<usize>,

    /// Retries per failed flow
    #[arg(long)]
    pub retries: Option<u32>,

    /// YAML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Site origin flows navigate against
    #[arg(long)]
    pub base_url: Option<String>,

    /// Show the browser window
    #[arg(long)]
    pub headed: bool,

    /// Result output format
    #[arg(long, default_value = "text")]
    pub format: FormatArg,
}

/// Arguments for the config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// YAML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

/// Color argument for CLI
#[derive(ValueEnum, Clone, Debug, Default)]
pub enum ColorArg {
    /// Automatic color detection
    #[default]
    Auto,
    /// Always use colors
    Always,
    /// Never use colors
    Never,
}

impl From<ColorArg> for crate::config::ColorChoice {
    fn from(arg: ColorArg) -> Self {
        match arg {
            ColorArg::Auto => Self::Auto,
            ColorArg::Always => Self::Always,
            ColorArg::Never => Self::Never,
        }
    }
}

/// Log format argument
#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum LogFormatArg {
    /// Human-readable lines
    #[default]
    Text,
    /// One JSON object per line
    Json,
}

impl From<LogFormatArg> for crate::logging::LogFormat {
    fn from(arg: LogFormatArg) -> Self {
        match arg {
            LogFormatArg::Text => Self::Text,
            LogFormatArg::Json => Self::Json,
        }
    }
}

/// Result format argument
#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum FormatArg {
    /// Human-readable summary
    #[default]
    Text,
    /// JSON run summary on stdout
    Json,
}

impl From<FormatArg> for crate::output::OutputFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Text => Self::Text,
            FormatArg::Json => Self::Json,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    mod cli_tests {
        use super::*;

        #[test]
        fn test_parse_run_command() {
            let cli = Cli::parse_from(["atento", "run"]);
            assert!(matches!(cli.command, Commands::Run(_)));
        }

        #[test]
        fn test_parse_run_with_options() {
            let cli = Cli::parse_from([
                "atento",
                "run",
                "--filter",
                "sign-in",
                "-j",
                "2",
                "--retries",
                "3",
                "--base-url",
                "https://example.test",
                "--headed",
                "--format",
                "json",
            ]);
            if let Commands::Run(args) = cli.command {
                assert_eq!(args.filter.as_deref(), Some("sign-in"));
                assert_eq!(args.workers, Some(2));
                assert_eq!(args.retries, Some(3));
                assert_eq!(args.base_url.as_deref(), Some("https://example.test"));
                assert!(args.headed);
                assert!(matches!(args.format, FormatArg::Json));
            } else {
                panic!("expected Run command");
            }
        }

        #[test]
        fn test_run_defaults_leave_config_alone() {
            let cli = Cli::parse_from(["atento", "run"]);
            if let Commands::Run(args) = cli.command {
                assert!(args.workers.is_none());
                assert!(args.retries.is_none());
                assert!(args.config.is_none());
                assert!(!args.headed);
            } else {
                panic!("expected Run command");
            }
        }

        #[test]
        fn test_parse_list() {
            let cli = Cli::parse_from(["atento", "list"]);
            assert!(matches!(cli.command, Commands::List));
        }

        #[test]
        fn test_parse_config_with_file() {
            let cli = Cli::parse_from(["atento", "config", "--config", "atento.yaml"]);
            if let Commands::Config(args) = cli.command {
                assert_eq!(args.config, Some(PathBuf::from("atento.yaml")));
            } else {
                panic!("expected Config command");
            }
        }
    }

    mod global_flag_tests {
        use super::*;

        #[test]
        fn test_verbose_count() {
            let cli = Cli::parse_from(["atento", "-vv", "list"]);
            assert_eq!(cli.verbose, 2);
        }

        #[test]
        fn test_global_flags_after_subcommand() {
            let cli = Cli::parse_from(["atento", "list", "--quiet", "--color", "never"]);
            assert!(cli.quiet);
            assert!(matches!(cli.color, ColorArg::Never));
        }

        #[test]
        fn test_log_format() {
            let cli = Cli::parse_from(["atento", "--log-format", "json", "list"]);
            assert!(matches!(cli.log_format, LogFormatArg::Json));
        }

        #[test]
        fn test_subcommand_required() {
            assert!(Cli::try_parse_from(["atento"]).is_err());
        }
    }
}
