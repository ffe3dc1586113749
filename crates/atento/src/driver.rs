//! PageDriver - the browser-automation surface Atento consumes.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  PageDriver (async trait, one exclusive page per flow)        │
//! ├──────────────────────────────────────────────────────────────┤
//! │  ┌──────────────────────┐        ┌──────────────────────┐    │
//! │  │  ChromiumPage        │        │  MockPage            │    │
//! │  │  (feature "browser") │        │  (HTML in memory,    │    │
//! │  │  CDP via chromiumoxide│       │   parsed per query)  │    │
//! │  └──────────────────────┘        └──────────────────────┘    │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Drivers answer structural queries only. Accessible-name, text and
//! placeholder predicates are evaluated by the caller on the strings the
//! driver hands back, so a pattern never ends up inside a selector.

use crate::result::AtentoResult;
use crate::text::TextPattern;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::time::Duration;

/// Reference to one live DOM node.
///
/// Only valid for the document it was taken from: once the page navigates
/// or its document is replaced, drivers reject it with
/// [`crate::AtentoError::StaleElement`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeRef {
    /// Document generation the node belongs to
    pub document: u64,
    /// Driver-assigned index within that document
    pub index: usize,
}

impl NodeRef {
    /// Create a node reference
    #[must_use]
    pub const fn new(document: u64, index: usize) -> Self {
        Self { document, index }
    }
}

impl fmt::Display for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}@{}", self.index, self.document)
    }
}

/// Where a query runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Scope {
    /// The whole document
    #[default]
    Page,
    /// Descendants of one node
    Within(NodeRef),
}

/// Page lifecycle states a driver can wait for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LoadState {
    /// `DOMContentLoaded` fired
    DomContentLoaded,
    /// `load` fired
    #[default]
    Load,
    /// No network requests for [`NETWORK_IDLE_THRESHOLD`]
    NetworkIdle,
}

/// Quiet period that counts as network idle
pub const NETWORK_IDLE_THRESHOLD: Duration = Duration::from_millis(500);

impl LoadState {
    /// Event name as the browser reports it
    #[must_use]
    pub const fn event_name(&self) -> &'static str {
        match self {
            Self::DomContentLoaded => "DOMContentLoaded",
            Self::Load => "load",
            Self::NetworkIdle => "networkidle",
        }
    }
}

impl fmt::Display for LoadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.event_name())
    }
}

/// A node that matched a role query, with its computed accessible name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleMatch {
    /// Matched node
    pub node: NodeRef,
    /// Accessible name (normalized)
    pub name: String,
}

/// A node offered to text-pattern matching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextCandidate {
    /// Candidate node
    pub node: NodeRef,
    /// Normalized text content
    pub text: String,
    /// Element ancestors of the node, nearest first
    pub ancestors: Vec<NodeRef>,
}

/// Abstract page driver.
///
/// Methods take `&self`; implementations keep their mutable state behind
/// interior locks so element handles can borrow the page while acting on it.
/// Every waiting method carries its own timeout and must return within it.
#[async_trait]
pub trait PageDriver: Send + Sync {
    /// Navigate to an absolute URL and wait for the document to commit
    async fn navigate(&self, url: &str, timeout: Duration) -> AtentoResult<()>;

    /// Current page URL
    async fn current_url(&self) -> AtentoResult<String>;

    /// Nodes exposing `role` in the accessibility tree, in document order.
    /// Nodes hidden from assistive technology are excluded.
    async fn query_role(&self, scope: Scope, role: &str) -> AtentoResult<Vec<RoleMatch>>;

    /// Nodes matching a CSS selector list, in document order
    async fn query_css(&self, scope: Scope, css: &str) -> AtentoResult<Vec<NodeRef>>;

    /// Nodes with non-blank text content, in document order.
    ///
    /// Callers filter these with a [`TextPattern`]; see [`query_text`]. A
    /// driver may leave out a node whose text equals one of its children's,
    /// since that child matches whenever the node does.
    async fn text_candidates(&self, scope: Scope) -> AtentoResult<Vec<TextCandidate>>;

    /// Innermost nodes whose text matches `pattern`, evaluated inside the
    /// driver. `None` means the driver cannot evaluate this pattern with the
    /// same semantics and the caller must filter [`Self::text_candidates`].
    async fn match_text(
        &self,
        _scope: Scope,
        _pattern: &TextPattern,
    ) -> AtentoResult<Option<Vec<NodeRef>>> {
        Ok(None)
    }

    /// Normalized text content of a node
    async fn text_content(&self, node: NodeRef) -> AtentoResult<String>;

    /// Attribute value of a node
    async fn attribute(&self, node: NodeRef, name: &str) -> AtentoResult<Option<String>>;

    /// Whether the node is rendered and visible
    async fn is_visible(&self, node: NodeRef) -> AtentoResult<bool>;

    /// Replace the value of a text input
    async fn fill(&self, node: NodeRef, text: &str) -> AtentoResult<()>;

    /// Click a node
    async fn click(&self, node: NodeRef) -> AtentoResult<()>;

    /// Press a named key (`"Enter"`, `"Tab"`, ...) with the node focused
    async fn press(&self, node: NodeRef, key: &str) -> AtentoResult<()>;

    /// Wait until the page reaches `state`
    async fn wait_for_load_state(&self, state: LoadState, timeout: Duration) -> AtentoResult<()>;

    /// Wait until a CSS selector matches at least one node
    async fn wait_for_selector(&self, css: &str, timeout: Duration) -> AtentoResult<NodeRef>;

    /// Wait for the next navigation to commit
    async fn wait_for_navigation(&self, timeout: Duration) -> AtentoResult<()>;

    /// Release the page
    async fn close(&self) -> AtentoResult<()> {
        Ok(())
    }
}

/// Query by text pattern: the innermost nodes whose text matches.
///
/// A node is dropped when one of its descendants also matches, so a pattern
/// resolves to the element that actually renders the text. Drivers that can
/// match in place answer through [`PageDriver::match_text`].
pub async fn query_text(
    page: &dyn PageDriver,
    scope: Scope,
    pattern: &TextPattern,
) -> AtentoResult<Vec<NodeRef>> {
    if let Some(nodes) = page.match_text(scope, pattern).await? {
        return Ok(nodes);
    }

    let matching: Vec<TextCandidate> = page
        .text_candidates(scope)
        .await?
        .into_iter()
        .filter(|c| pattern.is_match(&c.text))
        .collect();

    let enclosing: HashSet<NodeRef> = matching
        .iter()
        .flat_map(|c| c.ancestors.iter().copied())
        .collect();
    Ok(matching
        .into_iter()
        .filter(|c| !enclosing.contains(&c.node))
        .map(|c| c.node)
        .collect())
}
