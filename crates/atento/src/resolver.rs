//! Resilient locator resolution.
//!
//! [`resolve`] turns a [`TargetDescriptor`] into a lazy [`ElementHandle`].
//! Nothing touches the page until the handle is asked a question; every
//! question re-runs the fallback chain against the live DOM:
//!
//! ```text
//! strategies[0] ──0 matches──► strategies[1] ──0 matches──► strategies[2] ──► ...
//!      │                             │                           │
//!   ≥1 match                      ≥1 match                    ≥1 match
//!      ▼                             ▼                           ▼
//!   winner (later strategies are never consulted)
//! ```
//!
//! Textual predicates (accessible names, `has-text`, placeholders, the
//! descriptor filter) are applied to extracted strings after the structural
//! query returns. They never become part of a selector.

use crate::descriptor::{test_hook_selector, EmptyPolicy, Extraction, Strategy, TargetDescriptor};
use crate::driver::{query_text, NodeRef, PageDriver, Scope};
use crate::result::{AtentoError, AtentoResult};
use crate::text::{dedupe_normalized, normalize_whitespace};
use crate::wait::{best_effort, poll_until, PollConfig, Polled, WaitOutcome};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::time::Duration;
use tracing::{debug, info};

/// Default auto-wait budget for actions (15s)
pub const DEFAULT_ACTION_TIMEOUT: Duration = Duration::from_millis(15_000);

// =============================================================================
// STRATEGY EVALUATION
// =============================================================================

impl Strategy {
    /// Evaluate this strategy alone against `scope`, in document order.
    pub async fn try_match(
        &self,
        page: &dyn PageDriver,
        scope: Scope,
    ) -> AtentoResult<Vec<NodeRef>> {
        match self {
            Self::Role { role, name } => {
                let matches = page.query_role(scope, role).await?;
                Ok(matches
                    .into_iter()
                    .filter(|m| name.as_ref().map_or(true, |p| p.is_match(&m.name)))
                    .map(|m| m.node)
                    .collect())
            }
            Self::TestHook { needle } => page.query_css(scope, &test_hook_selector(needle)).await,
            Self::Css(css) => page.query_css(scope, &css.join(", ")).await,
            Self::CssWithText { css, text } => {
                let nodes = page.query_css(scope, &css.join(", ")).await?;
                let mut kept = Vec::with_capacity(nodes.len());
                for node in nodes {
                    if text.is_match(&page.text_content(node).await?) {
                        kept.push(node);
                    }
                }
                Ok(kept)
            }
            Self::Placeholder(pattern) => {
                let nodes = page.query_css(scope, "[placeholder]").await?;
                let mut kept = Vec::with_capacity(nodes.len());
                for node in nodes {
                    let placeholder = page.attribute(node, "placeholder").await?;
                    if placeholder.is_some_and(|p| pattern.is_match(&p)) {
                        kept.push(node);
                    }
                }
                Ok(kept)
            }
            Self::TestId(id) => {
                let escaped = id.replace('\\', "\\\\").replace('"', "\\\"");
                page.query_css(scope, &format!("[data-testid=\"{escaped}\"]"))
                    .await
            }
            Self::Text(pattern) => query_text(page, scope, pattern).await,
        }
    }
}

/// Which strategy won, and what it matched
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// Index of the winning strategy, `None` when nothing matched
    pub strategy: Option<usize>,
    /// Matches after filtering, in document order
    pub nodes: Vec<NodeRef>,
}

impl Resolution {
    fn empty() -> Self {
        Self {
            strategy: None,
            nodes: Vec::new(),
        }
    }
}

/// Run the fallback chain of `descriptor` once.
///
/// Boxed because a descriptor's parent is resolved through the same path.
pub fn evaluate<'a>(
    page: &'a dyn PageDriver,
    scope: Scope,
    descriptor: &'a TargetDescriptor,
) -> BoxFuture<'a, AtentoResult<Resolution>> {
    async move {
        let scopes = match descriptor.parent() {
            Some(parent) => {
                let parents = evaluate(page, scope, parent).await?;
                if parents.nodes.is_empty() {
                    debug!(descriptor = descriptor.name(), parent = parent.name(), "parent unmatched");
                    return Ok(Resolution::empty());
                }
                parents.nodes.into_iter().map(Scope::Within).collect()
            }
            None => vec![scope],
        };

        for (index, strategy) in descriptor.strategies().iter().enumerate() {
            let mut nodes: Vec<NodeRef> = Vec::new();
            for scope in &scopes {
                for node in strategy.try_match(page, *scope).await? {
                    if !nodes.contains(&node) {
                        nodes.push(node);
                    }
                }
            }
            debug!(
                descriptor = descriptor.name(),
                strategy = %strategy,
                matches = nodes.len(),
                "strategy evaluated"
            );
            if nodes.is_empty() {
                continue;
            }

            if let Some(filter) = descriptor.filter() {
                let mut kept = Vec::with_capacity(nodes.len());
                for node in nodes {
                    if filter.is_match(&page.text_content(node).await?) {
                        kept.push(node);
                    }
                }
                nodes = kept;
            }
            return Ok(Resolution {
                strategy: Some(index),
                nodes,
            });
        }
        Ok(Resolution::empty())
    }
    .boxed()
}

/// Read one value from a node
pub async fn extract(
    page: &dyn PageDriver,
    node: NodeRef,
    extraction: Extraction,
) -> AtentoResult<String> {
    if extraction == Extraction::AriaLabelOrText {
        if let Some(label) = page.attribute(node, "aria-label").await? {
            let label = normalize_whitespace(&label);
            if !label.is_empty() {
                return Ok(label);
            }
        }
    }
    Ok(normalize_whitespace(&page.text_content(node).await?))
}

// =============================================================================
// ELEMENT HANDLE
// =============================================================================

/// Resolve `descriptor` within `scope`. Lazy: no query runs until the handle
/// is used.
#[must_use]
pub fn resolve<'a>(
    page: &'a dyn PageDriver,
    scope: Scope,
    descriptor: &'a TargetDescriptor,
) -> ElementHandle<'a> {
    ElementHandle {
        page,
        scope,
        descriptor,
        timeout: DEFAULT_ACTION_TIMEOUT,
        poll_interval: crate::wait::DEFAULT_POLL_INTERVAL,
    }
}

/// Deduplicated values read from every match of a descriptor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Collected {
    /// Descriptor name
    pub descriptor: String,
    /// Normalized, deduplicated values in first-seen order
    pub values: Vec<String>,
}

impl Collected {
    /// Whether nothing was found
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// First value
    #[must_use]
    pub fn first(&self) -> Option<&str> {
        self.values.first().map(String::as_str)
    }

    /// Last value
    #[must_use]
    pub fn last(&self) -> Option<&str> {
        self.values.last().map(String::as_str)
    }
}

/// Lazy reference to the matches of a descriptor.
///
/// Holds no node references between calls. Actions wait for the first match
/// to be present and visible, up to the handle's timeout.
#[derive(Clone, Copy)]
pub struct ElementHandle<'a> {
    page: &'a dyn PageDriver,
    scope: Scope,
    descriptor: &'a TargetDescriptor,
    timeout: Duration,
    poll_interval: Duration,
}

impl std::fmt::Debug for ElementHandle<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ElementHandle")
            .field("descriptor", &self.descriptor.name())
            .field("scope", &self.scope)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl<'a> ElementHandle<'a> {
    /// Set the auto-wait budget
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the polling interval used while waiting
    #[must_use]
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// The descriptor being resolved
    #[must_use]
    pub const fn descriptor(&self) -> &'a TargetDescriptor {
        self.descriptor
    }

    /// The page being queried
    #[must_use]
    pub const fn page(&self) -> &'a dyn PageDriver {
        self.page
    }

    /// Auto-wait budget
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Polling budget for this handle
    #[must_use]
    pub const fn poll_config(&self) -> PollConfig {
        PollConfig::new(self.timeout).with_interval(self.poll_interval)
    }

    /// Run the fallback chain now
    pub async fn resolution(&self) -> AtentoResult<Resolution> {
        evaluate(self.page, self.scope, self.descriptor).await
    }

    /// Current matches
    pub async fn matches(&self) -> AtentoResult<Vec<NodeRef>> {
        Ok(self.resolution().await?.nodes)
    }

    /// Number of current matches
    pub async fn count(&self) -> AtentoResult<usize> {
        Ok(self.matches().await?.len())
    }

    /// Whether anything matches, visible or not
    pub async fn is_present(&self) -> AtentoResult<bool> {
        Ok(!self.matches().await?.is_empty())
    }

    /// Whether the first match is visible; `false` when nothing matches
    pub async fn is_visible(&self) -> AtentoResult<bool> {
        match self.matches().await?.first() {
            Some(node) => self.page.is_visible(*node).await,
            None => Ok(false),
        }
    }

    /// Normalized text of the first match
    pub async fn text(&self) -> AtentoResult<Option<String>> {
        match self.matches().await?.first() {
            Some(node) => Ok(Some(extract(self.page, *node, Extraction::Text).await?)),
            None => Ok(None),
        }
    }

    /// Normalized, non-blank values of every match, in document order
    pub async fn all_texts(&self, extraction: Extraction) -> AtentoResult<Vec<String>> {
        let mut out = Vec::new();
        for node in self.matches().await? {
            let value = extract(self.page, node, extraction).await?;
            if !value.is_empty() {
                out.push(value);
            }
        }
        Ok(out)
    }

    /// Deduplicated values using the descriptor's extraction, with its
    /// empty policy applied.
    ///
    /// An empty result is an [`AtentoError::EmptyResult`] for
    /// [`EmptyPolicy::EmptyIsFailure`] and an empty [`Collected`] otherwise.
    pub async fn collect(&self) -> AtentoResult<Collected> {
        let values = dedupe_normalized(self.all_texts(self.descriptor.extraction()).await?);
        if values.is_empty() {
            match self.descriptor.empty_policy() {
                EmptyPolicy::EmptyIsFailure => {
                    return Err(AtentoError::EmptyResult {
                        descriptor: self.descriptor.name().to_string(),
                    })
                }
                EmptyPolicy::EmptyIsValid => {
                    info!(descriptor = self.descriptor.name(), "no matches; treated as a valid empty state");
                }
            }
        }
        Ok(Collected {
            descriptor: self.descriptor.name().to_string(),
            values,
        })
    }

    /// Best effort: wait for the first match to be visible within `timeout`
    pub async fn wait_visible_for(&self, timeout: Duration) -> WaitOutcome {
        let handle = self.with_timeout(timeout);
        best_effort(self.descriptor.name(), timeout, async move {
            handle.wait_visible().await.map(|_| ())
        })
        .await
    }

    /// Wait for the first match to be visible; required-element timeout when
    /// it never is.
    pub async fn wait_visible(&self) -> AtentoResult<NodeRef> {
        let this = *self;
        let polled = poll_until(self.poll_config(), || async move {
            let Some(node) = this.matches().await?.first().copied() else {
                return Ok(None);
            };
            Ok(this.page.is_visible(node).await?.then_some(node))
        })
        .await?;
        match polled {
            Polled::Ready { value, .. } => Ok(value),
            Polled::Expired { elapsed } => Err(AtentoError::RequiredElementTimeout {
                descriptor: self.descriptor.name().to_string(),
                elapsed_ms: elapsed.as_millis() as u64,
            }),
        }
    }

    /// Fill the first match after it becomes visible
    pub async fn fill(&self, text: &str) -> AtentoResult<()> {
        debug!(descriptor = self.descriptor.name(), "fill");
        self.act(|page, node| {
            let text = text.to_string();
            async move { page.fill(node, &text).await }.boxed()
        })
        .await
    }

    /// Click the first match after it becomes visible
    pub async fn click(&self) -> AtentoResult<()> {
        debug!(descriptor = self.descriptor.name(), "click");
        self.act(|page, node| async move { page.click(node).await }.boxed())
            .await
    }

    /// Press a key on the first match after it becomes visible
    pub async fn press(&self, key: &str) -> AtentoResult<()> {
        debug!(descriptor = self.descriptor.name(), key, "press");
        self.act(|page, node| {
            let key = key.to_string();
            async move { page.press(node, &key).await }.boxed()
        })
        .await
    }

    /// Wait for the target, then perform `action`, re-resolving if the node
    /// goes stale in between.
    async fn act<F>(&self, action: F) -> AtentoResult<()>
    where
        F: Fn(&'a dyn PageDriver, NodeRef) -> BoxFuture<'a, AtentoResult<()>>,
    {
        let start = tokio::time::Instant::now();
        loop {
            let remaining = self.timeout.saturating_sub(start.elapsed());
            let node = self.with_timeout(remaining).wait_visible().await.map_err(|e| match e {
                AtentoError::RequiredElementTimeout { descriptor, .. } => {
                    AtentoError::RequiredElementTimeout {
                        descriptor,
                        elapsed_ms: start.elapsed().as_millis() as u64,
                    }
                }
                other => other,
            })?;
            match action(self.page, node).await {
                Err(e) if e.is_stale() && start.elapsed() < self.timeout => {
                    debug!(descriptor = self.descriptor.name(), "node went stale before action, retrying");
                }
                other => return other,
            }
        }
    }
}
