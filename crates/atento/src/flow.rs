//! Flows: independent, sequential scenarios run against their own page.

use crate::config::RunConfig;
use crate::descriptor::TargetDescriptor;
use crate::driver::{PageDriver, Scope};
use crate::readiness::{await_settled, ReadinessReport};
use crate::resolver::{resolve, ElementHandle};
use crate::result::AtentoResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// How a flow ended, when it did not fail
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FlowOutcome {
    /// Every check held
    Passed {
        /// Lines worth reporting (collected values, first/last headline)
        details: Vec<String>,
    },
    /// Nothing to check, and that is acceptable (no fixtures today)
    Neutral {
        /// Why the flow had nothing to check
        notice: String,
    },
}

impl FlowOutcome {
    /// Passed with no details
    #[must_use]
    pub const fn passed() -> Self {
        Self::Passed {
            details: Vec::new(),
        }
    }

    /// Passed with details
    #[must_use]
    pub const fn passed_with(details: Vec<String>) -> Self {
        Self::Passed { details }
    }

    /// Neutral pass
    #[must_use]
    pub fn neutral(notice: impl Into<String>) -> Self {
        Self::Neutral {
            notice: notice.into(),
        }
    }

    /// Check if neutral
    #[must_use]
    pub const fn is_neutral(&self) -> bool {
        matches!(self, Self::Neutral { .. })
    }
}

/// Everything a flow may touch: its exclusive page and the shared,
/// read-only configuration.
#[derive(Clone, Copy)]
pub struct FlowContext<'a> {
    page: &'a dyn PageDriver,
    config: &'a RunConfig,
}

impl std::fmt::Debug for FlowContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlowContext")
            .field("base_url", &self.config.base_url)
            .finish_non_exhaustive()
    }
}

impl<'a> FlowContext<'a> {
    /// Create a context
    #[must_use]
    pub const fn new(page: &'a dyn PageDriver, config: &'a RunConfig) -> Self {
        Self { page, config }
    }

    /// The flow's page
    #[must_use]
    pub const fn page(&self) -> &'a dyn PageDriver {
        self.page
    }

    /// The run configuration
    #[must_use]
    pub const fn config(&self) -> &'a RunConfig {
        self.config
    }

    /// Resolve a descriptor over the whole page with the configured action
    /// timeout
    #[must_use]
    pub fn locate(&self, descriptor: &'a TargetDescriptor) -> ElementHandle<'a> {
        self.locate_in(Scope::Page, descriptor)
    }

    /// Resolve a descriptor within `scope`
    #[must_use]
    pub fn locate_in(&self, scope: Scope, descriptor: &'a TargetDescriptor) -> ElementHandle<'a> {
        resolve(self.page, scope, descriptor).with_timeout(self.config.action_timeout())
    }

    /// Navigate to `path`, relative to the base URL
    pub async fn goto(&self, path: &str) -> AtentoResult<()> {
        let url = self.config.resolve_url(path);
        debug!(%url, "navigating");
        self.page
            .navigate(&url, self.config.navigation_timeout())
            .await
    }

    /// Wait for the page to settle with the configured readiness options
    pub async fn settle(&self) -> ReadinessReport {
        let report = await_settled(self.page, &self.config.readiness_options()).await;
        if !report.is_settled() {
            info!(readiness = %report.readiness, "continuing without a settled page");
        }
        report
    }
}

/// One independent scenario
#[async_trait]
pub trait Flow: Send + Sync {
    /// Stable identifier, used for filtering and reporting
    fn name(&self) -> &str;

    /// One-line description
    fn description(&self) -> &str {
        ""
    }

    /// Execute against the context's page
    async fn run(&self, ctx: &FlowContext<'_>) -> AtentoResult<FlowOutcome>;
}
