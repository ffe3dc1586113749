//! Atento CLI Library
//!
//! Command-line interface for running Atento flows.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::format_push_string)]
#![allow(clippy::missing_errors_doc)]

mod commands;
mod config;
mod error;
mod logging;
mod output;
mod runner;

pub use commands::{Cli, ColorArg, Commands, ConfigArgs, FormatArg, LogFormatArg, RunArgs};
pub use config::{effective_run_config, CliConfig, ColorChoice, RunOverrides, Verbosity};
pub use error::{CliError, CliResult};
pub use logging::{env_filter, init_logging, LogFormat};
pub use output::{render_flow_list, render_summary_json, OutputFormat, ProgressReporter};
pub use runner::{check_summary, run_flows};
