//! Flow execution against a live browser

use crate::error::{CliError, CliResult};
use crate::output::ProgressReporter;
use atento::{Flow, RunConfig, RunSummary};
use std::sync::Arc;

/// Launch the browser, run `flows` and close the browser again.
///
/// Per-flow results are streamed to `reporter` as they finish.
#[cfg(feature = "browser")]
pub async fn run_flows(
    config: RunConfig,
    flows: Vec<Arc<dyn Flow>>,
    reporter: Arc<ProgressReporter>,
) -> CliResult<RunSummary> {
    use atento::{ChromiumBrowser, ChromiumFactory, FlowRunner};
    use tracing::{info, warn};

    let browser = Arc::new(ChromiumBrowser::launch(&config).await?);
    info!(
        base_url = %config.base_url,
        workers = config.workers,
        retries = config.retries,
        flows = flows.len(),
        "starting run"
    );

    let factory = Arc::new(ChromiumFactory::new(Arc::clone(&browser)));
    let runner = FlowRunner::new(Arc::new(config), factory)
        .with_observer(move |report| reporter.flow_finished(report));
    let summary = runner.run_all(flows).await;

    if let Err(e) = browser.close().await {
        warn!(error = %e, "browser did not close cleanly");
    }
    Ok(summary)
}

/// Without the `browser` feature there is nothing to drive.
#[cfg(not(feature = "browser"))]
pub async fn run_flows(
    _config: RunConfig,
    _flows: Vec<Arc<dyn Flow>>,
    _reporter: Arc<ProgressReporter>,
) -> CliResult<RunSummary> {
    Err(CliError::Unsupported(
        "atento was built without the `browser` feature; rebuild with --features browser"
            .to_string(),
    ))
}

/// Turn a summary into the process outcome: an error iff any flow failed
pub fn check_summary(summary: &RunSummary) -> CliResult<()> {
    if summary.all_passed() {
        return Ok(());
    }
    let names: Vec<&str> = summary
        .failures()
        .iter()
        .map(|r| r.name.as_str())
        .collect();
    Err(CliError::flows_failed(format!(
        "{} flow(s) failed: {}",
        names.len(),
        names.join(", ")
    )))
}
