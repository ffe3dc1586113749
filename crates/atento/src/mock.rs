//! MockPage - an in-memory [`PageDriver`] backed by an HTML string.
//!
//! The document is re-parsed with `scraper` on every query, so there is no
//! cached DOM to go stale: what a query sees is exactly the current markup.
//! Navigation, load-state timing and simple page behaviour (clicking a
//! button shows an error, pressing Enter loads a results page) are scripted
//! with routes and [`Reaction`]s.

use crate::aria;
use crate::driver::{
    LoadState, NodeRef, PageDriver, RoleMatch, Scope, TextCandidate, NETWORK_IDLE_THRESHOLD,
};
use crate::result::{AtentoError, AtentoResult};
use crate::text::normalize_whitespace;
use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;

const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Values typed into form fields, keyed by the field's `id` (or `name`).
pub type FormValues = BTreeMap<String, String>;

type ComputeFn = dyn Fn(&FormValues) -> Reaction + Send + Sync;

/// What the page does in response to a click or an Enter key press.
#[derive(Clone)]
pub enum Reaction {
    /// Load a registered route, as a navigation
    Navigate(String),
    /// Swap the document in place without navigating
    Replace(String),
    /// Decide from the current form values
    Compute(Arc<ComputeFn>),
}

impl Reaction {
    /// Build a reaction that inspects form values
    pub fn compute(f: impl Fn(&FormValues) -> Reaction + Send + Sync + 'static) -> Self {
        Self::Compute(Arc::new(f))
    }
}

impl fmt::Debug for Reaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Navigate(url) => f.debug_tuple("Navigate").field(url).finish(),
            Self::Replace(html) => f.debug_tuple("Replace").field(&html.len()).finish(),
            Self::Compute(_) => f.write_str("Compute(..)"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Trigger {
    Click,
    Enter,
}

/// Simulated load timing, measured from the start of each navigation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadTiming {
    /// Delay until `DOMContentLoaded`
    pub dom_ready_after: Duration,
    /// Delay until `load`
    pub load_after: Duration,
    /// Delay until the network goes quiet; `None` means it never does
    pub network_idle_after: Option<Duration>,
}

impl Default for LoadTiming {
    fn default() -> Self {
        Self {
            dom_ready_after: Duration::ZERO,
            load_after: Duration::ZERO,
            network_idle_after: Some(NETWORK_IDLE_THRESHOLD),
        }
    }
}

impl LoadTiming {
    /// A page that keeps polling in the background forever
    #[must_use]
    pub fn never_idle() -> Self {
        Self {
            network_idle_after: None,
            ..Self::default()
        }
    }

    fn reached(&self, state: LoadState, elapsed: Duration) -> bool {
        match state {
            LoadState::DomContentLoaded => elapsed >= self.dom_ready_after,
            LoadState::Load => elapsed >= self.load_after,
            LoadState::NetworkIdle => self.network_idle_after.is_some_and(|d| elapsed >= d),
        }
    }
}

#[derive(Debug)]
struct MockState {
    url: String,
    html: String,
    document: u64,
    navigations: u64,
    loaded_at: Instant,
    timing: LoadTiming,
    routes: HashMap<String, String>,
    reactions: Vec<(Trigger, String, Reaction)>,
    form: FormValues,
    history: Vec<String>,
    closed: bool,
}

/// In-memory page for tests.
#[derive(Debug)]
pub struct MockPage {
    state: Mutex<MockState>,
}

impl Default for MockPage {
    fn default() -> Self {
        Self::new()
    }
}

impl MockPage {
    /// Blank page at `about:blank`
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState {
                url: "about:blank".to_string(),
                html: "<html><head></head><body></body></html>".to_string(),
                document: 1,
                navigations: 0,
                loaded_at: Instant::now(),
                timing: LoadTiming::default(),
                routes: HashMap::new(),
                reactions: Vec::new(),
                form: FormValues::new(),
                history: Vec::new(),
                closed: false,
            }),
        }
    }

    /// Page showing `html`
    #[must_use]
    pub fn with_html(html: impl Into<String>) -> Self {
        let page = Self::new();
        if let Ok(mut state) = page.state.lock() {
            state.html = html.into();
        }
        page
    }

    /// Register a URL that [`PageDriver::navigate`] and links can load
    #[must_use]
    pub fn with_route(self, url: impl Into<String>, html: impl Into<String>) -> Self {
        if let Ok(mut state) = self.state.lock() {
            state.routes.insert(url.into(), html.into());
        }
        self
    }

    /// Set simulated load timing for every navigation
    #[must_use]
    pub fn with_timing(self, timing: LoadTiming) -> Self {
        if let Ok(mut state) = self.state.lock() {
            state.timing = timing;
            state.loaded_at = Instant::now();
        }
        self
    }

    /// React to clicks on nodes matching `css`
    #[must_use]
    pub fn on_click(self, css: impl Into<String>, reaction: Reaction) -> Self {
        self.push_reaction(Trigger::Click, css.into(), reaction)
    }

    /// React to Enter pressed on nodes matching `css`
    #[must_use]
    pub fn on_enter(self, css: impl Into<String>, reaction: Reaction) -> Self {
        self.push_reaction(Trigger::Enter, css.into(), reaction)
    }

    fn push_reaction(self, trigger: Trigger, css: String, reaction: Reaction) -> Self {
        if let Ok(mut state) = self.state.lock() {
            state.reactions.push((trigger, css, reaction));
        }
        self
    }

    /// Swap the current document, invalidating outstanding node references
    pub fn set_html(&self, html: impl Into<String>) -> AtentoResult<()> {
        let mut state = self.lock()?;
        state.html = html.into();
        state.document += 1;
        Ok(())
    }

    /// Value last typed into the field with this `id` or `name`
    #[must_use]
    pub fn form_value(&self, key: &str) -> Option<String> {
        self.state.lock().ok()?.form.get(key).cloned()
    }

    /// Call history
    #[must_use]
    pub fn history(&self) -> Vec<String> {
        self.state
            .lock()
            .map(|s| s.history.clone())
            .unwrap_or_default()
    }

    /// Check if a call with this prefix was recorded
    #[must_use]
    pub fn was_called(&self, prefix: &str) -> bool {
        self.history().iter().any(|c| c.starts_with(prefix))
    }

    /// Number of committed navigations
    #[must_use]
    pub fn navigation_count(&self) -> u64 {
        self.state.lock().map(|s| s.navigations).unwrap_or(0)
    }

    fn lock(&self) -> AtentoResult<MutexGuard<'_, MockState>> {
        self.state
            .lock()
            .map_err(|_| AtentoError::page("mock page state poisoned"))
    }

    fn record(&self, call: String) -> AtentoResult<MutexGuard<'_, MockState>> {
        let mut state = self.lock()?;
        if state.closed {
            return Err(AtentoError::page("page is closed"));
        }
        state.history.push(call);
        Ok(state)
    }
}

// =============================================================================
// DOCUMENT ACCESS
// =============================================================================

fn elements(doc: &Html) -> Vec<ElementRef<'_>> {
    doc.tree.root().descendants().filter_map(ElementRef::wrap).collect()
}

fn index_of(all: &[ElementRef<'_>], el: &ElementRef<'_>) -> Option<usize> {
    all.iter().position(|e| e.id() == el.id())
}

fn element_at<'a>(
    state: &MockState,
    all: &[ElementRef<'a>],
    node: NodeRef,
) -> AtentoResult<ElementRef<'a>> {
    if node.document != state.document {
        return Err(AtentoError::StaleElement {
            document: node.document,
            index: node.index,
        });
    }
    all.get(node.index)
        .copied()
        .ok_or(AtentoError::StaleElement {
            document: node.document,
            index: node.index,
        })
}

fn in_scope(
    state: &MockState,
    all: &[ElementRef<'_>],
    scope: Scope,
    el: &ElementRef<'_>,
) -> AtentoResult<bool> {
    match scope {
        Scope::Page => Ok(true),
        Scope::Within(root) => {
            let root = element_at(state, all, root)?;
            Ok(el.ancestors().any(|a| a.id() == root.id()))
        }
    }
}

fn parse_selector(css: &str) -> AtentoResult<Selector> {
    Selector::parse(css).map_err(|e| AtentoError::InvalidSelector {
        selector: css.to_string(),
        message: format!("{e:?}"),
    })
}

fn select(state: &MockState, doc: &Html, scope: Scope, css: &str) -> AtentoResult<Vec<NodeRef>> {
    let selector = parse_selector(css)?;
    let all = elements(doc);
    let mut out = Vec::new();
    for el in doc.select(&selector) {
        if !in_scope(state, &all, scope, &el)? {
            continue;
        }
        if let Some(index) = index_of(&all, &el) {
            out.push(NodeRef::new(state.document, index));
        }
    }
    Ok(out)
}

fn rendered(el: &ElementRef<'_>) -> bool {
    let self_hidden = el.value().name() == "input"
        && el
            .value()
            .attr("type")
            .is_some_and(|t| t.eq_ignore_ascii_case("hidden"));
    !self_hidden
        && std::iter::once(*el)
            .chain(el.ancestors().filter_map(ElementRef::wrap))
            .all(|e| {
                let v = e.value();
                v.attr("hidden").is_none()
                    && !aria::style_hides(v.attr("style"))
                    && !matches!(
                        v.name(),
                        "head" | "script" | "style" | "template" | "title" | "meta"
                    )
            })
}

fn field_key(el: &ElementRef<'_>, index: usize) -> String {
    el.value()
        .attr("id")
        .or_else(|| el.value().attr("name"))
        .map_or_else(|| format!("#{index}"), str::to_string)
}

fn describe(el: &ElementRef<'_>) -> String {
    let v = el.value();
    match (v.attr("id"), v.attr("name")) {
        (Some(id), _) => format!("{}#{id}", v.name()),
        (None, Some(name)) => format!("{}[name={name}]", v.name()),
        _ => v.name().to_string(),
    }
}

fn origin_of(url: &str) -> &str {
    let after_scheme = url.find("://").map_or(0, |i| i + 3);
    url[after_scheme..]
        .find('/')
        .map_or(url, |slash| &url[..after_scheme + slash])
}

impl MockState {
    fn load(&mut self, url: &str) -> AtentoResult<()> {
        let html = self
            .routes
            .get(url)
            .cloned()
            .ok_or_else(|| AtentoError::Navigation {
                url: url.to_string(),
                message: "no route registered".to_string(),
            })?;
        self.url = url.to_string();
        self.html = html;
        self.document += 1;
        self.navigations += 1;
        self.loaded_at = Instant::now();
        self.form.clear();
        Ok(())
    }

    fn apply(&mut self, reaction: Reaction) -> AtentoResult<()> {
        match reaction {
            Reaction::Navigate(url) => self.load(&url),
            Reaction::Replace(html) => {
                self.html = html;
                self.document += 1;
                Ok(())
            }
            Reaction::Compute(f) => {
                let next = f(&self.form);
                self.apply(next)
            }
        }
    }

    /// First reaction registered for `trigger` whose selector matches `node`,
    /// or the link target for a click on an `a[href]`.
    fn reaction_for(&self, trigger: Trigger, node: NodeRef) -> AtentoResult<Option<Reaction>> {
        let doc = Html::parse_document(&self.html);
        let all = elements(&doc);
        let el = element_at(self, &all, node)?;
        for (t, css, reaction) in &self.reactions {
            if *t == trigger && select(self, &doc, Scope::Page, css)?.contains(&node) {
                return Ok(Some(reaction.clone()));
            }
        }
        if trigger == Trigger::Click {
            let link = std::iter::once(el)
                .chain(el.ancestors().filter_map(ElementRef::wrap))
                .find(|e| e.value().name() == "a");
            if let Some(href) = link.and_then(|a| a.value().attr("href")) {
                let target = if href.starts_with("http") {
                    href.to_string()
                } else if href.starts_with('/') {
                    format!("{}{href}", origin_of(&self.url))
                } else {
                    return Ok(None);
                };
                if self.routes.contains_key(&target) {
                    return Ok(Some(Reaction::Navigate(target)));
                }
            }
        }
        Ok(None)
    }

    fn load_state_reached(&self, state: LoadState) -> bool {
        self.timing.reached(state, self.loaded_at.elapsed())
    }
}

// =============================================================================
// DRIVER
// =============================================================================

#[async_trait]
impl PageDriver for MockPage {
    async fn navigate(&self, url: &str, timeout: Duration) -> AtentoResult<()> {
        {
            let mut state = self.record(format!("navigate:{url}"))?;
            state.load(url)?;
        }
        self.wait_for_load_state(LoadState::Load, timeout).await
    }

    async fn current_url(&self) -> AtentoResult<String> {
        Ok(self.lock()?.url.clone())
    }

    async fn query_role(&self, scope: Scope, role: &str) -> AtentoResult<Vec<RoleMatch>> {
        let state = self.record(format!("query_role:{role}"))?;
        let doc = Html::parse_document(&state.html);
        let all = elements(&doc);
        let mut out = Vec::new();
        for (index, el) in all.iter().enumerate() {
            if aria::role_of(el).as_deref() != Some(role) || aria::is_hidden_from_a11y(el) {
                continue;
            }
            if !in_scope(&state, &all, scope, el)? {
                continue;
            }
            out.push(RoleMatch {
                node: NodeRef::new(state.document, index),
                name: aria::accessible_name(&doc, el),
            });
        }
        Ok(out)
    }

    async fn query_css(&self, scope: Scope, css: &str) -> AtentoResult<Vec<NodeRef>> {
        let state = self.record(format!("query_css:{css}"))?;
        let doc = Html::parse_document(&state.html);
        select(&state, &doc, scope, css)
    }

    async fn text_candidates(&self, scope: Scope) -> AtentoResult<Vec<TextCandidate>> {
        let state = self.record("text_candidates".to_string())?;
        let doc = Html::parse_document(&state.html);
        let all = elements(&doc);
        let positions: HashMap<_, usize> =
            all.iter().enumerate().map(|(i, el)| (el.id(), i)).collect();
        let texts: Vec<Option<String>> = all
            .iter()
            .map(|el| {
                if matches!(
                    el.value().name(),
                    "head" | "script" | "style" | "template" | "title"
                ) {
                    return None;
                }
                let text = aria::text_of(el);
                (!text.is_empty()).then_some(text)
            })
            .collect();

        let mut out = Vec::new();
        for (index, el) in all.iter().enumerate() {
            let Some(text) = &texts[index] else {
                continue;
            };
            if !in_scope(&state, &all, scope, el)? {
                continue;
            }
            // A wrapper whose text is exactly one child's.
            let repeats_child = el
                .children()
                .filter_map(ElementRef::wrap)
                .any(|child| positions.get(&child.id()).and_then(|&i| texts[i].as_ref()) == Some(text));
            if repeats_child {
                continue;
            }
            let ancestors = el
                .ancestors()
                .filter_map(ElementRef::wrap)
                .filter_map(|a| positions.get(&a.id()).copied())
                .map(|i| NodeRef::new(state.document, i))
                .collect();
            out.push(TextCandidate {
                node: NodeRef::new(state.document, index),
                text: text.clone(),
                ancestors,
            });
        }
        Ok(out)
    }

    async fn text_content(&self, node: NodeRef) -> AtentoResult<String> {
        let state = self.lock()?;
        let doc = Html::parse_document(&state.html);
        let all = elements(&doc);
        let el = element_at(&state, &all, node)?;
        Ok(aria::text_of(&el))
    }

    async fn attribute(&self, node: NodeRef, name: &str) -> AtentoResult<Option<String>> {
        let state = self.lock()?;
        let doc = Html::parse_document(&state.html);
        let all = elements(&doc);
        let el = element_at(&state, &all, node)?;
        Ok(el.value().attr(name).map(str::to_string))
    }

    async fn is_visible(&self, node: NodeRef) -> AtentoResult<bool> {
        let state = self.lock()?;
        let doc = Html::parse_document(&state.html);
        let all = elements(&doc);
        let el = element_at(&state, &all, node)?;
        Ok(rendered(&el))
    }

    async fn fill(&self, node: NodeRef, text: &str) -> AtentoResult<()> {
        let mut state = self.lock()?;
        let key = {
            let doc = Html::parse_document(&state.html);
            let all = elements(&doc);
            let el = element_at(&state, &all, node)?;
            let v = el.value();
            let editable = match v.name() {
                "textarea" => true,
                "input" => !v.attr("type").is_some_and(|t| {
                    matches!(
                        t.to_ascii_lowercase().as_str(),
                        "submit" | "button" | "reset" | "image" | "checkbox" | "radio" | "hidden"
                    )
                }),
                _ => v.attr("contenteditable").is_some(),
            };
            if !editable {
                return Err(AtentoError::Interaction {
                    action: "fill".to_string(),
                    message: format!("{} is not an editable field", describe(&el)),
                });
            }
            field_key(&el, node.index)
        };
        state.history.push(format!("fill:{key}={text}"));
        state.form.insert(key, text.to_string());
        Ok(())
    }

    async fn click(&self, node: NodeRef) -> AtentoResult<()> {
        let mut state = self.lock()?;
        let label = {
            let doc = Html::parse_document(&state.html);
            let all = elements(&doc);
            let el = element_at(&state, &all, node)?;
            let text = normalize_whitespace(&aria::text_of(&el));
            if text.is_empty() {
                describe(&el)
            } else {
                format!("{}:{text}", describe(&el))
            }
        };
        state.history.push(format!("click:{label}"));
        if let Some(reaction) = state.reaction_for(Trigger::Click, node)? {
            state.apply(reaction)?;
        }
        Ok(())
    }

    async fn press(&self, node: NodeRef, key: &str) -> AtentoResult<()> {
        let mut state = self.lock()?;
        {
            let doc = Html::parse_document(&state.html);
            let all = elements(&doc);
            element_at(&state, &all, node)?;
        }
        state.history.push(format!("press:{key}"));
        if key == "Enter" {
            if let Some(reaction) = state.reaction_for(Trigger::Enter, node)? {
                state.apply(reaction)?;
            }
        }
        Ok(())
    }

    async fn wait_for_load_state(&self, state: LoadState, timeout: Duration) -> AtentoResult<()> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.lock()?.load_state_reached(state) {
                return Ok(());
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(AtentoError::Timeout {
                    ms: timeout.as_millis() as u64,
                });
            }
            tokio::time::sleep(POLL_INTERVAL.min(deadline - now)).await;
        }
    }

    async fn wait_for_selector(&self, css: &str, timeout: Duration) -> AtentoResult<NodeRef> {
        let deadline = Instant::now() + timeout;
        loop {
            let found = {
                let state = self.lock()?;
                let doc = Html::parse_document(&state.html);
                let all = elements(&doc);
                let nodes = select(&state, &doc, Scope::Page, css)?;
                nodes
                    .into_iter()
                    .find(|n| all.get(n.index).is_some_and(rendered))
            };
            if let Some(node) = found {
                return Ok(node);
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(AtentoError::Timeout {
                    ms: timeout.as_millis() as u64,
                });
            }
            tokio::time::sleep(POLL_INTERVAL.min(deadline - now)).await;
        }
    }

    async fn wait_for_navigation(&self, timeout: Duration) -> AtentoResult<()> {
        let start = self.lock()?.navigations;
        let deadline = Instant::now() + timeout;
        loop {
            if self.lock()?.navigations > start {
                return Ok(());
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(AtentoError::Timeout {
                    ms: timeout.as_millis() as u64,
                });
            }
            tokio::time::sleep(POLL_INTERVAL.min(deadline - now)).await;
        }
    }

    async fn close(&self) -> AtentoResult<()> {
        let mut state = self.lock()?;
        state.history.push("close".to_string());
        state.closed = true;
        Ok(())
    }
}
