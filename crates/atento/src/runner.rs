//! Flow runner.
//!
//! Runs independent flows on a bounded pool of concurrent workers. Every
//! attempt gets a fresh page from the [`PageFactory`], runs under the
//! per-flow test timeout, and closes its page afterwards whatever happened.
//! A failed flow is retried up to `retries` times; one that passes on a
//! retry is reported as flaky. Flows never share mutable state, so a failure
//! in one cannot affect another.

use crate::config::RunConfig;
use crate::driver::PageDriver;
use crate::flow::{Flow, FlowContext, FlowOutcome};
use crate::result::{AtentoError, AtentoResult};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{info, warn};

/// Opens one isolated page per flow attempt
#[async_trait]
pub trait PageFactory: Send + Sync {
    /// Open a fresh page configured from `config`
    async fn open(&self, config: &RunConfig) -> AtentoResult<Box<dyn PageDriver>>;
}

#[async_trait]
impl<F> PageFactory for F
where
    F: Fn(&RunConfig) -> AtentoResult<Box<dyn PageDriver>> + Send + Sync,
{
    async fn open(&self, config: &RunConfig) -> AtentoResult<Box<dyn PageDriver>> {
        self(config)
    }
}

/// Final status of a flow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowStatus {
    /// Passed on the first attempt
    Passed,
    /// Nothing to check; counts as a pass
    Neutral,
    /// Passed after at least one failed attempt
    Flaky,
    /// Every attempt failed
    Failed,
}

impl FlowStatus {
    /// Whether the flow counts as passing
    #[must_use]
    pub const fn is_pass(self) -> bool {
        !matches!(self, Self::Failed)
    }
}

impl fmt::Display for FlowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Passed => "passed",
            Self::Neutral => "neutral",
            Self::Flaky => "flaky",
            Self::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// Report for one flow
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowReport {
    /// Flow name
    pub name: String,
    /// Final status
    pub status: FlowStatus,
    /// Attempts made
    pub attempts: u32,
    /// Wall-clock time across all attempts
    pub elapsed_ms: u64,
    /// Details from the passing attempt
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<String>,
    /// Neutral-pass notice
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notice: Option<String>,
    /// Error of the last failed attempt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Results from running a set of flows
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    /// One report per flow, in the order the flows were given
    pub reports: Vec<FlowReport>,
    /// Wall-clock time of the whole run
    pub elapsed_ms: u64,
}

impl RunSummary {
    fn count(&self, status: FlowStatus) -> usize {
        self.reports.iter().filter(|r| r.status == status).count()
    }

    /// Flows passed on the first attempt
    #[must_use]
    pub fn passed_count(&self) -> usize {
        self.count(FlowStatus::Passed)
    }

    /// Neutral passes
    #[must_use]
    pub fn neutral_count(&self) -> usize {
        self.count(FlowStatus::Neutral)
    }

    /// Flows that needed a retry
    #[must_use]
    pub fn flaky_count(&self) -> usize {
        self.count(FlowStatus::Flaky)
    }

    /// Failed flows
    #[must_use]
    pub fn failed_count(&self) -> usize {
        self.count(FlowStatus::Failed)
    }

    /// Total flows
    #[must_use]
    pub fn total(&self) -> usize {
        self.reports.len()
    }

    /// Check if nothing failed
    #[must_use]
    pub fn all_passed(&self) -> bool {
        self.reports.iter().all(|r| r.status.is_pass())
    }

    /// Failed reports
    #[must_use]
    pub fn failures(&self) -> Vec<&FlowReport> {
        self.reports
            .iter()
            .filter(|r| r.status == FlowStatus::Failed)
            .collect()
    }
}

type Observer = Arc<dyn Fn(&FlowReport) + Send + Sync>;

/// Runs flows concurrently with bounded workers and retries
#[derive(Clone)]
pub struct FlowRunner {
    config: Arc<RunConfig>,
    factory: Arc<dyn PageFactory>,
    observer: Option<Observer>,
}

impl fmt::Debug for FlowRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlowRunner")
            .field("config", &self.config)
            .field("observer", &self.observer.is_some())
            .finish_non_exhaustive()
    }
}

impl FlowRunner {
    /// Create a runner
    #[must_use]
    pub fn new(config: Arc<RunConfig>, factory: Arc<dyn PageFactory>) -> Self {
        Self {
            config,
            factory,
            observer: None,
        }
    }

    /// Call `observer` as each flow finishes
    #[must_use]
    pub fn with_observer(mut self, observer: impl Fn(&FlowReport) + Send + Sync + 'static) -> Self {
        self.observer = Some(Arc::new(observer));
        self
    }

    /// The shared configuration
    #[must_use]
    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Run every flow, at most `workers` at a time
    pub async fn run_all(&self, flows: Vec<Arc<dyn Flow>>) -> RunSummary {
        let start = Instant::now();
        let workers = self.config.workers.max(1);
        info!(flows = flows.len(), workers, "starting run");

        let mut indexed: Vec<(usize, FlowReport)> = stream::iter(flows.into_iter().enumerate())
            .map(|(index, flow)| async move {
                let report = self.run_flow(flow.as_ref()).await;
                if let Some(observer) = &self.observer {
                    observer(&report);
                }
                (index, report)
            })
            .buffer_unordered(workers)
            .collect()
            .await;
        indexed.sort_by_key(|(index, _)| *index);

        let summary = RunSummary {
            reports: indexed.into_iter().map(|(_, report)| report).collect(),
            elapsed_ms: start.elapsed().as_millis() as u64,
        };
        info!(
            passed = summary.passed_count(),
            neutral = summary.neutral_count(),
            flaky = summary.flaky_count(),
            failed = summary.failed_count(),
            "run finished"
        );
        summary
    }

    /// Run one flow with retries
    pub async fn run_flow(&self, flow: &dyn Flow) -> FlowReport {
        let start = Instant::now();
        let max_attempts = self.config.retries.saturating_add(1);
        let mut last_error = None;

        for attempt in 1..=max_attempts {
            match self.attempt(flow).await {
                Ok(outcome) => {
                    let status = match (&outcome, attempt) {
                        (_, n) if n > 1 => FlowStatus::Flaky,
                        (FlowOutcome::Neutral { .. }, _) => FlowStatus::Neutral,
                        (FlowOutcome::Passed { .. }, _) => FlowStatus::Passed,
                    };
                    let (details, notice) = match outcome {
                        FlowOutcome::Passed { details } => (details, None),
                        FlowOutcome::Neutral { notice } => {
                            info!(flow = flow.name(), %notice, "neutral pass");
                            (Vec::new(), Some(notice))
                        }
                    };
                    return FlowReport {
                        name: flow.name().to_string(),
                        status,
                        attempts: attempt,
                        elapsed_ms: start.elapsed().as_millis() as u64,
                        details,
                        notice,
                        error: None,
                    };
                }
                Err(e) => {
                    warn!(flow = flow.name(), attempt, max_attempts, error = %e, "flow attempt failed");
                    last_error = Some(e.to_string());
                }
            }
        }

        FlowReport {
            name: flow.name().to_string(),
            status: FlowStatus::Failed,
            attempts: max_attempts,
            elapsed_ms: start.elapsed().as_millis() as u64,
            details: Vec::new(),
            notice: None,
            error: last_error,
        }
    }

    async fn attempt(&self, flow: &dyn Flow) -> AtentoResult<FlowOutcome> {
        let page = self.factory.open(&self.config).await?;
        let ctx = FlowContext::new(page.as_ref(), &self.config);
        let budget = self.config.test_timeout();
        let result = match tokio::time::timeout(budget, flow.run(&ctx)).await {
            Ok(result) => result,
            Err(_) => Err(AtentoError::FlowTimeout {
                flow: flow.name().to_string(),
                ms: budget.as_millis() as u64,
            }),
        };
        if let Err(e) = page.close().await {
            warn!(flow = flow.name(), error = %e, "failed to close page");
        }
        result
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::mock::MockPage;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    struct Scripted {
        name: &'static str,
        fail_first: usize,
        calls: AtomicUsize,
        outcome: FlowOutcome,
        sleep: Duration,
    }

    impl Scripted {
        fn new(name: &'static str, fail_first: usize) -> Self {
            Self {
                name,
                fail_first,
                calls: AtomicUsize::new(0),
                outcome: FlowOutcome::passed(),
                sleep: Duration::ZERO,
            }
        }
    }

    #[async_trait]
    impl Flow for Scripted {
        fn name(&self) -> &str {
            self.name
        }

        async fn run(&self, _ctx: &FlowContext<'_>) -> AtentoResult<FlowOutcome> {
            tokio::time::sleep(self.sleep).await;
            if self.calls.fetch_add(1, Ordering::SeqCst) < self.fail_first {
                return Err(AtentoError::mismatch("scripted", "pass", "fail"));
            }
            Ok(self.outcome.clone())
        }
    }

    fn runner(retries: u32, workers: usize) -> FlowRunner {
        let config = RunConfig {
            retries,
            workers,
            test_timeout_ms: 1000,
            ..RunConfig::default()
        };
        let factory = |_: &RunConfig| -> AtentoResult<Box<dyn PageDriver>> {
            Ok(Box::new(MockPage::new()))
        };
        FlowRunner::new(Arc::new(config), Arc::new(factory))
    }

    mod retry_tests {
        use super::*;

        #[tokio::test]
        async fn test_passes_first_time() {
            let report = runner(1, 1).run_flow(&Scripted::new("ok", 0)).await;
            assert_eq!(report.status, FlowStatus::Passed);
            assert_eq!(report.attempts, 1);
        }

        #[tokio::test]
        async fn test_pass_after_retry_is_flaky() {
            let report = runner(1, 1).run_flow(&Scripted::new("flaky", 1)).await;
            assert_eq!(report.status, FlowStatus::Flaky);
            assert_eq!(report.attempts, 2);
            assert!(report.status.is_pass());
        }

        #[tokio::test]
        async fn test_retries_are_bounded() {
            let flow = Scripted::new("broken", usize::MAX);
            let report = runner(2, 1).run_flow(&flow).await;
            assert_eq!(report.status, FlowStatus::Failed);
            assert_eq!(report.attempts, 3);
            assert_eq!(flow.calls.load(Ordering::SeqCst), 3);
            assert!(report.error.unwrap().contains("scripted"));
        }

        #[tokio::test]
        async fn test_neutral_outcome() {
            let mut flow = Scripted::new("empty", 0);
            flow.outcome = FlowOutcome::neutral("no fixtures today");
            let report = runner(0, 1).run_flow(&flow).await;
            assert_eq!(report.status, FlowStatus::Neutral);
            assert_eq!(report.notice.as_deref(), Some("no fixtures today"));
        }

        #[tokio::test(start_paused = true)]
        async fn test_timeout_fails_the_attempt() {
            let mut flow = Scripted::new("slow", 0);
            flow.sleep = Duration::from_secs(5);
            let report = runner(0, 1).run_flow(&flow).await;
            assert_eq!(report.status, FlowStatus::Failed);
            assert!(report.error.unwrap().contains("slow"));
        }

        #[tokio::test]
        async fn test_factory_error_fails_the_attempt() {
            let factory = |_: &RunConfig| -> AtentoResult<Box<dyn PageDriver>> {
                Err(AtentoError::BrowserLaunch {
                    message: "no chromium".to_string(),
                })
            };
            let runner = FlowRunner::new(Arc::new(RunConfig::default()), Arc::new(factory));
            let report = runner.run_flow(&Scripted::new("x", 0)).await;
            assert_eq!(report.status, FlowStatus::Failed);
            assert_eq!(report.attempts, 2);
        }
    }

    mod summary_tests {
        use super::*;

        #[tokio::test]
        async fn test_failure_isolated_and_order_kept() {
            let flows: Vec<Arc<dyn Flow>> = vec![
                Arc::new(Scripted::new("a", 0)),
                Arc::new(Scripted::new("b", usize::MAX)),
                Arc::new(Scripted::new("c", 0)),
            ];
            let summary = runner(0, 3).run_all(flows).await;
            let names: Vec<&str> = summary.reports.iter().map(|r| r.name.as_str()).collect();
            assert_eq!(names, vec!["a", "b", "c"]);
            assert_eq!(summary.passed_count(), 2);
            assert_eq!(summary.failed_count(), 1);
            assert!(!summary.all_passed());
            assert_eq!(summary.failures()[0].name, "b");
        }

        #[tokio::test]
        async fn test_observer_sees_every_report() {
            let seen = Arc::new(Mutex::new(Vec::new()));
            let sink = Arc::clone(&seen);
            let runner = runner(0, 2).with_observer(move |r| {
                sink.lock().unwrap().push(r.name.clone());
            });
            let flows: Vec<Arc<dyn Flow>> = vec![
                Arc::new(Scripted::new("a", 0)),
                Arc::new(Scripted::new("b", 0)),
            ];
            let summary = runner.run_all(flows).await;
            assert!(summary.all_passed());
            let mut seen = seen.lock().unwrap().clone();
            seen.sort();
            assert_eq!(seen, vec!["a", "b"]);
        }

        #[test]
        fn test_summary_serializes() {
            let summary = RunSummary {
                reports: vec![FlowReport {
                    name: "fixtures-today".to_string(),
                    status: FlowStatus::Neutral,
                    attempts: 1,
                    elapsed_ms: 10,
                    details: Vec::new(),
                    notice: Some("no fixtures".to_string()),
                    error: None,
                }],
                elapsed_ms: 12,
            };
            let json = serde_json::to_value(&summary).unwrap();
            assert_eq!(json["reports"][0]["status"], "neutral");
            assert!(json["reports"][0].get("error").is_none());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_workers_bound_concurrency() {
        struct Gauge {
            name: String,
            active: Arc<AtomicUsize>,
            peak: Arc<AtomicUsize>,
        }

        #[async_trait]
        impl Flow for Gauge {
            fn name(&self) -> &str {
                &self.name
            }

            async fn run(&self, _ctx: &FlowContext<'_>) -> AtentoResult<FlowOutcome> {
                let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
                self.peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(50)).await;
                self.active.fetch_sub(1, Ordering::SeqCst);
                Ok(FlowOutcome::passed())
            }
        }

        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let flows: Vec<Arc<dyn Flow>> = (0..6)
            .map(|i| {
                Arc::new(Gauge {
                    name: format!("g{i}"),
                    active: Arc::clone(&active),
                    peak: Arc::clone(&peak),
                }) as Arc<dyn Flow>
            })
            .collect();
        let summary = runner(0, 2).run_all(flows).await;
        assert_eq!(summary.total(), 6);
        assert_eq!(peak.load(Ordering::SeqCst), 2);
    }
}
