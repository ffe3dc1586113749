//! Readiness detection: "is this page settled enough to query?"
//!
//! [`await_settled`] runs three waits in order, each on its own timer and
//! each allowed to fail quietly:
//!
//! 1. `DOMContentLoaded`, bounded by the navigation grace period
//! 2. network idle, bounded by `max_wait`
//! 3. an unconditional pause of `idle_window` for trailing script mutations
//!
//! It never returns an error. A page that never goes quiet yields
//! [`Readiness::TimedOut`]; a page whose URL changed underneath the waits
//! yields [`Readiness::NavigatedAway`]. Total wall-clock time is bounded by
//! `navigation_grace + max_wait + idle_window`.

use crate::driver::{LoadState, PageDriver};
use crate::wait::{best_effort, WaitOutcome};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

/// Default quiescence window (800ms)
pub const DEFAULT_IDLE_WINDOW: Duration = Duration::from_millis(800);

/// Default network-idle budget (10s)
pub const DEFAULT_MAX_WAIT: Duration = Duration::from_millis(10_000);

/// Default budget for the structural-load phase (30s)
pub const DEFAULT_NAVIGATION_GRACE: Duration = Duration::from_millis(30_000);

/// Budgets for [`await_settled`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadinessOptions {
    /// Pause after network idle
    pub idle_window: Duration,
    /// Budget for reaching network idle
    pub max_wait: Duration,
    /// Budget for `DOMContentLoaded`
    pub navigation_grace: Duration,
}

impl Default for ReadinessOptions {
    fn default() -> Self {
        Self {
            idle_window: DEFAULT_IDLE_WINDOW,
            max_wait: DEFAULT_MAX_WAIT,
            navigation_grace: DEFAULT_NAVIGATION_GRACE,
        }
    }
}

impl ReadinessOptions {
    /// Create options with defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the idle window
    #[must_use]
    pub const fn with_idle_window(mut self, idle_window: Duration) -> Self {
        self.idle_window = idle_window;
        self
    }

    /// Set the network-idle budget
    #[must_use]
    pub const fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = max_wait;
        self
    }

    /// Set the structural-load budget
    #[must_use]
    pub const fn with_navigation_grace(mut self, grace: Duration) -> Self {
        self.navigation_grace = grace;
        self
    }

    /// Upper bound on how long [`await_settled`] can take
    #[must_use]
    pub fn wall_clock_bound(&self) -> Duration {
        self.navigation_grace + self.max_wait + self.idle_window
    }
}

/// Readiness signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Readiness {
    /// Every wait was satisfied
    Settled,
    /// At least one wait ran out of budget; proceed with less confidence
    TimedOut,
    /// The page URL changed while waiting
    NavigatedAway,
}

impl fmt::Display for Readiness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Settled => "settled",
            Self::TimedOut => "timed-out",
            Self::NavigatedAway => "navigated-away",
        };
        f.write_str(s)
    }
}

/// What [`await_settled`] observed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadinessReport {
    /// Signal for the caller
    pub readiness: Readiness,
    /// Total time spent
    pub elapsed: Duration,
    /// Structural-load phase
    pub dom_content_loaded: WaitOutcome,
    /// Network-idle phase
    pub network_idle: WaitOutcome,
}

impl ReadinessReport {
    /// Whether every phase was satisfied
    #[must_use]
    pub const fn is_settled(&self) -> bool {
        matches!(self.readiness, Readiness::Settled)
    }
}

/// Wait until the page is settled enough to query. Never fails.
pub async fn await_settled(page: &dyn PageDriver, options: &ReadinessOptions) -> ReadinessReport {
    let start = Instant::now();

    // The starting URL is read inside the structural-load budget so the probe
    // itself cannot push the total past the bound.
    let mut url_before = None;
    let dom_content_loaded = best_effort(
        LoadState::DomContentLoaded.event_name(),
        options.navigation_grace,
        async {
            url_before = page.current_url().await.ok();
            page.wait_for_load_state(LoadState::DomContentLoaded, options.navigation_grace)
                .await
        },
    )
    .await;
    debug!(outcome = %dom_content_loaded, "readiness: structural load");

    let network_idle = best_effort(
        LoadState::NetworkIdle.event_name(),
        options.max_wait,
        page.wait_for_load_state(LoadState::NetworkIdle, options.max_wait),
    )
    .await;
    debug!(outcome = %network_idle, "readiness: network idle");

    // The trailing pause always runs to completion; the URL probe shares its
    // window.
    let (_, url_after) = tokio::join!(
        tokio::time::sleep(options.idle_window),
        tokio::time::timeout(options.idle_window, page.current_url()),
    );
    let url_after = url_after.ok().and_then(Result::ok);

    let navigated = matches!((&url_before, &url_after), (Some(a), Some(b)) if a != b);
    let readiness = if navigated {
        Readiness::NavigatedAway
    } else if dom_content_loaded.is_satisfied() && network_idle.is_satisfied() {
        Readiness::Settled
    } else {
        Readiness::TimedOut
    };

    let elapsed = start.elapsed();
    if readiness == Readiness::Settled {
        debug!(elapsed_ms = elapsed.as_millis() as u64, "page settled");
    } else {
        info!(
            %readiness,
            elapsed_ms = elapsed.as_millis() as u64,
            from = url_before.as_deref().unwrap_or("?"),
            to = url_after.as_deref().unwrap_or("?"),
            "page did not fully settle, continuing"
        );
    }

    ReadinessReport {
        readiness,
        elapsed,
        dom_content_loaded,
        network_idle,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::driver::{NodeRef, RoleMatch, Scope, TextCandidate};
    use crate::mock::{LoadTiming, MockPage};
    use crate::result::{AtentoError, AtentoResult};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const HOME: &str = "https://mock.test/";

    fn quick() -> ReadinessOptions {
        ReadinessOptions::new()
            .with_idle_window(Duration::from_millis(800))
            .with_max_wait(Duration::from_millis(10_000))
            .with_navigation_grace(Duration::from_millis(2_000))
    }

    mod option_tests {
        use super::*;

        #[test]
        fn test_defaults() {
            let o = ReadinessOptions::default();
            assert_eq!(o.idle_window, Duration::from_millis(800));
            assert_eq!(o.max_wait, Duration::from_millis(10_000));
            assert_eq!(o.wall_clock_bound(), Duration::from_millis(40_800));
        }

        #[test]
        fn test_display() {
            assert_eq!(Readiness::NavigatedAway.to_string(), "navigated-away");
        }
    }

    mod settle_tests {
        use super::*;

        #[tokio::test(start_paused = true)]
        async fn test_quiet_page_settles() {
            let page = MockPage::new().with_route(HOME, "<p>hi</p>");
            page.navigate(HOME, Duration::from_secs(1)).await.unwrap();
            let report = await_settled(&page, &quick()).await;
            assert_eq!(report.readiness, Readiness::Settled);
            assert!(report.elapsed >= Duration::from_millis(800));
        }

        #[tokio::test(start_paused = true)]
        async fn test_never_idle_degrades_to_timed_out() {
            let page = MockPage::new()
                .with_route(HOME, "<p>busy</p>")
                .with_timing(LoadTiming::never_idle());
            page.navigate(HOME, Duration::from_secs(1)).await.unwrap();
            let options = quick();
            let report = await_settled(&page, &options).await;
            assert_eq!(report.readiness, Readiness::TimedOut);
            assert!(report.elapsed <= options.wall_clock_bound());
            assert!(report.elapsed >= options.max_wait + options.idle_window);
        }
    }

    /// A driver that never answers anything.
    struct HangingPage;

    #[async_trait]
    impl PageDriver for HangingPage {
        async fn navigate(&self, _: &str, _: Duration) -> AtentoResult<()> {
            std::future::pending().await
        }
        async fn current_url(&self) -> AtentoResult<String> {
            std::future::pending().await
        }
        async fn query_role(&self, _: Scope, _: &str) -> AtentoResult<Vec<RoleMatch>> {
            std::future::pending().await
        }
        async fn query_css(&self, _: Scope, _: &str) -> AtentoResult<Vec<NodeRef>> {
            std::future::pending().await
        }
        async fn text_candidates(&self, _: Scope) -> AtentoResult<Vec<TextCandidate>> {
            std::future::pending().await
        }
        async fn text_content(&self, _: NodeRef) -> AtentoResult<String> {
            std::future::pending().await
        }
        async fn attribute(&self, _: NodeRef, _: &str) -> AtentoResult<Option<String>> {
            std::future::pending().await
        }
        async fn is_visible(&self, _: NodeRef) -> AtentoResult<bool> {
            std::future::pending().await
        }
        async fn fill(&self, _: NodeRef, _: &str) -> AtentoResult<()> {
            std::future::pending().await
        }
        async fn click(&self, _: NodeRef) -> AtentoResult<()> {
            std::future::pending().await
        }
        async fn press(&self, _: NodeRef, _: &str) -> AtentoResult<()> {
            std::future::pending().await
        }
        async fn wait_for_load_state(&self, _: LoadState, _: Duration) -> AtentoResult<()> {
            std::future::pending().await
        }
        async fn wait_for_selector(&self, _: &str, _: Duration) -> AtentoResult<NodeRef> {
            std::future::pending().await
        }
        async fn wait_for_navigation(&self, _: Duration) -> AtentoResult<()> {
            std::future::pending().await
        }
    }

    /// A driver whose every call fails, with the URL changing between reads.
    struct FlakyPage {
        url_reads: AtomicUsize,
    }

    #[async_trait]
    impl PageDriver for FlakyPage {
        async fn navigate(&self, _: &str, _: Duration) -> AtentoResult<()> {
            Err(AtentoError::page("crashed"))
        }
        async fn current_url(&self) -> AtentoResult<String> {
            let n = self.url_reads.fetch_add(1, Ordering::SeqCst);
            Ok(format!("https://mock.test/{n}"))
        }
        async fn query_role(&self, _: Scope, _: &str) -> AtentoResult<Vec<RoleMatch>> {
            Err(AtentoError::page("crashed"))
        }
        async fn query_css(&self, _: Scope, _: &str) -> AtentoResult<Vec<NodeRef>> {
            Err(AtentoError::page("crashed"))
        }
        async fn text_candidates(&self, _: Scope) -> AtentoResult<Vec<TextCandidate>> {
            Err(AtentoError::page("crashed"))
        }
        async fn text_content(&self, _: NodeRef) -> AtentoResult<String> {
            Err(AtentoError::page("crashed"))
        }
        async fn attribute(&self, _: NodeRef, _: &str) -> AtentoResult<Option<String>> {
            Err(AtentoError::page("crashed"))
        }
        async fn is_visible(&self, _: NodeRef) -> AtentoResult<bool> {
            Err(AtentoError::page("crashed"))
        }
        async fn fill(&self, _: NodeRef, _: &str) -> AtentoResult<()> {
            Err(AtentoError::page("crashed"))
        }
        async fn click(&self, _: NodeRef) -> AtentoResult<()> {
            Err(AtentoError::page("crashed"))
        }
        async fn press(&self, _: NodeRef, _: &str) -> AtentoResult<()> {
            Err(AtentoError::page("crashed"))
        }
        async fn wait_for_load_state(&self, _: LoadState, _: Duration) -> AtentoResult<()> {
            Err(AtentoError::page("crashed"))
        }
        async fn wait_for_selector(&self, _: &str, _: Duration) -> AtentoResult<NodeRef> {
            Err(AtentoError::page("crashed"))
        }
        async fn wait_for_navigation(&self, _: Duration) -> AtentoResult<()> {
            Err(AtentoError::page("crashed"))
        }
    }

    mod fault_tests {
        use super::*;

        #[tokio::test(start_paused = true)]
        async fn test_hanging_driver_is_bounded() {
            let options = quick();
            let report = await_settled(&HangingPage, &options).await;
            assert_eq!(report.readiness, Readiness::TimedOut);
            assert!(report.elapsed <= options.wall_clock_bound());
        }

        #[tokio::test(start_paused = true)]
        async fn test_failing_driver_never_raises() {
            let page = FlakyPage {
                url_reads: AtomicUsize::new(0),
            };
            let report = await_settled(&page, &quick()).await;
            assert_eq!(report.readiness, Readiness::NavigatedAway);
            assert!(!report.dom_content_loaded.is_satisfied());
        }
    }
}
