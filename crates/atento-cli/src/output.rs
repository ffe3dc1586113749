//! Output formatting and progress reporting

use crate::error::CliResult;
use atento::{Flow, FlowReport, FlowStatus, RunSummary};
use console::{style, Style, Term};
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Output format for run results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OutputFormat {
    /// Human-readable text
    #[default]
    Text,
    /// JSON output
    Json,
}

/// Progress reporter for flow execution
#[derive(Debug)]
pub struct ProgressReporter {
    term: Term,
    progress_bar: Option<ProgressBar>,
    /// Whether to use colors
    pub use_color: bool,
    /// Quiet mode
    pub quiet: bool,
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new(true, false)
    }
}

impl ProgressReporter {
    /// Create a new progress reporter
    #[must_use]
    pub fn new(use_color: bool, quiet: bool) -> Self {
        Self {
            term: Term::stderr(),
            progress_bar: None,
            use_color,
            quiet,
        }
    }

    /// Start a progress bar for `total` flows
    pub fn start_progress(&mut self, total: u64, message: &str) {
        if self.quiet {
            return;
        }

        let pb = ProgressBar::new(total);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=>-"),
        );
        pb.set_message(message.to_string());
        self.progress_bar = Some(pb);
    }

    /// Finish progress bar
    pub fn finish(&self) {
        if let Some(ref pb) = self.progress_bar {
            pb.finish_and_clear();
        }
    }

    fn line(&self, text: &str) {
        match self.progress_bar {
            Some(ref pb) => pb.suspend(|| {
                let _ = self.term.write_line(text);
            }),
            None => {
                let _ = self.term.write_line(text);
            }
        }
    }

    fn prefix(&self, symbol: &str, plain: &str, paint: fn(&str) -> String) -> String {
        if self.use_color {
            paint(symbol)
        } else {
            plain.to_string()
        }
    }

    /// Report one finished flow and advance the bar
    pub fn flow_finished(&self, report: &FlowReport) {
        if let Some(ref pb) = self.progress_bar {
            pb.inc(1);
            pb.set_message(report.name.clone());
        }

        let prefix = match report.status {
            FlowStatus::Passed => {
                self.prefix("✓", "PASS", |s| style(s).green().bold().to_string())
            }
            FlowStatus::Neutral => {
                self.prefix("○", "SKIP", |s| style(s).cyan().bold().to_string())
            }
            FlowStatus::Flaky => {
                self.prefix("⚠", "FLAKY", |s| style(s).yellow().bold().to_string())
            }
            FlowStatus::Failed => {
                self.prefix("✗", "FAIL", |s| style(s).red().bold().to_string())
            }
        };
        // Failures are always printed, even in quiet mode.
        if self.quiet && report.status != FlowStatus::Failed {
            return;
        }
        self.line(&format!(
            "{prefix} {} ({} ms, {} attempt{})",
            report.name,
            report.elapsed_ms,
            report.attempts,
            if report.attempts == 1 { "" } else { "s" }
        ));
        if let Some(ref notice) = report.notice {
            self.line(&format!("    {notice}"));
        }
        for detail in &report.details {
            self.line(&format!("    {detail}"));
        }
        if let Some(ref error) = report.error {
            self.line(&format!("    {error}"));
        }
    }

    /// Print a section header
    pub fn header(&self, title: &str) {
        if self.quiet {
            return;
        }

        let styled = if self.use_color {
            style(title).bold().underlined().to_string()
        } else {
            format!("=== {title} ===")
        };

        let _ = self.term.write_line("");
        let _ = self.term.write_line(&styled);
    }

    /// Print run summary
    pub fn summary(&self, summary: &RunSummary) {
        let failed = summary.failed_count();
        if self.quiet && failed == 0 {
            return;
        }

        let _ = self.term.write_line("");
        let duration_secs = summary.elapsed_ms as f64 / 1000.0;
        let passed = summary.passed_count();
        let neutral = summary.neutral_count();
        let flaky = summary.flaky_count();
        let total = summary.total();

        if self.use_color {
            let passed_style = Style::new().green().bold();
            let failed_style = Style::new().red().bold();
            let flaky_style = Style::new().yellow();

            let status = if failed > 0 {
                failed_style.apply_to("FAILED")
            } else {
                passed_style.apply_to("PASSED")
            };

            let _ = self.term.write_line(&format!(
                "{} {} flows in {:.2}s ({} passed, {} neutral, {} flaky, {} failed)",
                status,
                total,
                duration_secs,
                passed_style.apply_to(passed),
                neutral,
                flaky_style.apply_to(flaky),
                if failed > 0 {
                    failed_style.apply_to(failed).to_string()
                } else {
                    failed.to_string()
                },
            ));
        } else {
            let status = if failed > 0 { "FAILED" } else { "PASSED" };
            let _ = self.term.write_line(&format!(
                "{status} {total} flows in {duration_secs:.2}s ({passed} passed, {neutral} neutral, {flaky} flaky, {failed} failed)"
            ));
        }
    }
}

/// Render the run summary as pretty JSON
pub fn render_summary_json(summary: &RunSummary) -> CliResult<String> {
    Ok(serde_json::to_string_pretty(summary)?)
}

/// Render the flow list, one `name  description` line each
#[must_use]
pub fn render_flow_list(flows: &[Arc<dyn Flow>]) -> String {
    let width = flows.iter().map(|f| f.name().len()).max().unwrap_or(0);
    let mut out = String::new();
    for flow in flows {
        out.push_str(&format!("{:<width$}  {}\n", flow.name(), flow.description()));
    }
    out
}
