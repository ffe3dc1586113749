//! Atento CLI: run browser end-to-end flows
//!
//! ## Usage
//!
//! ```bash
//! atento list                          # Show built-in flows
//! atento run                           # Run every flow
//! atento run --filter sign-in -j 2     # Run the sign-in flows on two workers
//! atento config --config atento.yaml   # Print the effective configuration
//! ```

use atento_cli::{
    check_summary, effective_run_config, init_logging, render_flow_list, render_summary_json,
    run_flows, Cli, CliConfig, CliResult, ColorChoice, Commands, ConfigArgs, OutputFormat,
    ProgressReporter, RunArgs, RunOverrides, Verbosity,
};
use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> CliResult<()> {
    let cli = Cli::parse();
    let config = build_config(&cli);
    init_logging(
        config.verbosity,
        config.log_format,
        config.color.should_color(),
    );

    match cli.command {
        Commands::Run(args) => run_command(&config, &args),
        Commands::List => {
            print!("{}", render_flow_list(&atento::all_scenarios()));
            Ok(())
        }
        Commands::Config(args) => config_command(&args),
    }
}

fn build_config(cli: &Cli) -> CliConfig {
    let color: ColorChoice = cli.color.clone().into();
    CliConfig::new()
        .with_verbosity(Verbosity::from_flags(cli.quiet, cli.verbose))
        .with_color(color)
        .with_log_format(cli.log_format.into())
}

fn config_command(args: &ConfigArgs) -> CliResult<()> {
    let run_config = effective_run_config(args.config.as_deref(), &RunOverrides::default())?;
    print!("{}", run_config.to_yaml()?);
    Ok(())
}

fn run_command(config: &CliConfig, args: &RunArgs) -> CliResult<()> {
    let overrides = RunOverrides {
        base_url: args.base_url.clone(),
        workers: args.workers,
        retries: args.retries,
        headed: args.headed,
    };
    let run_config = effective_run_config(args.config.as_deref(), &overrides)?;

    let flows = atento::select_scenarios(args.filter.as_deref());
    if flows.is_empty() {
        return Err(atento_cli::CliError::invalid_argument(format!(
            "no flow matches '{}'",
            args.filter.as_deref().unwrap_or_default()
        )));
    }

    let format: OutputFormat = args.format.into();
    let quiet = config.verbosity.is_quiet() || format == OutputFormat::Json;
    let mut reporter = ProgressReporter::new(config.color.should_color(), quiet);
    reporter.header("Atento");
    reporter.start_progress(flows.len() as u64, "Running flows");
    let reporter = Arc::new(reporter);

    let runtime = tokio::runtime::Runtime::new()?;
    let summary = runtime.block_on(run_flows(run_config, flows, Arc::clone(&reporter)))?;

    reporter.finish();
    match format {
        OutputFormat::Text => reporter.summary(&summary),
        OutputFormat::Json => println!("{}", render_summary_json(&summary)?),
    }
    check_summary(&summary)
}
