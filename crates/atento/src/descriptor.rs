//! Target descriptors: declarative, ordered definitions of how to find one
//! semantic UI element.
//!
//! A descriptor is a list of [`Strategy`] values tried in order by the
//! resolver. Authors order them from most to least semantically stable:
//! accessible role and name, then test-hook attributes, then structural CSS.
//!
//! ```
//! use atento::{Strategy, TargetDescriptor, TextPattern};
//!
//! let continue_action = TargetDescriptor::builder("continue action")
//!     .strategy(Strategy::role("button", TextPattern::compiled("(?i)^(continue|next)$")))
//!     .strategy(Strategy::test_hook("continue"))
//!     .strategy(Strategy::css(["button[type=\"submit\"]", "input[type=\"submit\"]"]))
//!     .build()
//!     .unwrap();
//! assert_eq!(continue_action.strategies().len(), 3);
//! ```

use crate::result::{AtentoError, AtentoResult};
use crate::text::TextPattern;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Attributes searched by [`Strategy::TestHook`]
pub const TEST_HOOK_ATTRIBUTES: [&str; 4] = ["data-testid", "data-test", "aria-label", "title"];

/// One way of finding an element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Strategy {
    /// Accessible role, optionally with an accessible-name pattern
    Role {
        /// ARIA role (`button`, `textbox`, ...)
        role: String,
        /// Pattern the accessible name must match
        name: Option<TextPattern>,
    },
    /// Case-insensitive substring of a test-hook attribute
    TestHook {
        /// Substring to look for
        needle: String,
    },
    /// Union of CSS selectors, in document order
    Css(Vec<String>),
    /// CSS over-selection narrowed by the elements' text
    CssWithText {
        /// Base CSS selectors
        css: Vec<String>,
        /// Pattern the element text must match
        text: TextPattern,
    },
    /// Inputs whose placeholder matches
    Placeholder(TextPattern),
    /// Exact `data-testid` value
    TestId(String),
    /// Innermost elements whose text matches
    Text(TextPattern),
}

impl Strategy {
    /// Role with a name pattern
    #[must_use]
    pub fn role(role: impl Into<String>, name: TextPattern) -> Self {
        Self::Role {
            role: role.into(),
            name: Some(name),
        }
    }

    /// Role with any name
    #[must_use]
    pub fn any_role(role: impl Into<String>) -> Self {
        Self::Role {
            role: role.into(),
            name: None,
        }
    }

    /// Test-hook attribute substring
    #[must_use]
    pub fn test_hook(needle: impl Into<String>) -> Self {
        Self::TestHook {
            needle: needle.into(),
        }
    }

    /// Union of CSS selectors
    #[must_use]
    pub fn css<I, S>(selectors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Css(selectors.into_iter().map(Into::into).collect())
    }

    /// CSS filtered by text
    #[must_use]
    pub fn css_with_text<I, S>(selectors: I, text: TextPattern) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::CssWithText {
            css: selectors.into_iter().map(Into::into).collect(),
            text,
        }
    }

    /// Exact test id
    #[must_use]
    pub fn test_id(id: impl Into<String>) -> Self {
        Self::TestId(id.into())
    }

    /// Whether the strategy works from generic page structure rather than
    /// from site-specific hooks
    #[must_use]
    pub const fn is_structural(&self) -> bool {
        matches!(
            self,
            Self::Role { .. } | Self::Css(_) | Self::CssWithText { .. }
        )
    }

    /// Short label for logs
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Role { .. } => "role",
            Self::TestHook { .. } => "test-hook",
            Self::Css(_) => "css",
            Self::CssWithText { .. } => "css+text",
            Self::Placeholder(_) => "placeholder",
            Self::TestId(_) => "test-id",
            Self::Text(_) => "text",
        }
    }

    fn validate(&self) -> Result<(), String> {
        match self {
            Self::Role { role, .. } if role.trim().is_empty() => Err("empty role".to_string()),
            Self::TestHook { needle } if needle.trim().is_empty() => {
                Err("empty test-hook needle".to_string())
            }
            Self::TestId(id) if id.trim().is_empty() => Err("empty test id".to_string()),
            Self::Css(css) | Self::CssWithText { css, .. } => {
                if css.is_empty() || css.iter().any(|s| s.trim().is_empty()) {
                    Err("empty CSS selector".to_string())
                } else {
                    Ok(())
                }
            }
            _ => Ok(()),
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Role {
                role,
                name: Some(name),
            } => write!(f, "role={role}[name={name}]"),
            Self::Role { role, name: None } => write!(f, "role={role}"),
            Self::TestHook { needle } => write!(f, "hook~={needle:?}"),
            Self::Css(css) => write!(f, "css={}", css.join(", ")),
            Self::CssWithText { css, text } => write!(f, "css={} has-text={text}", css.join(", ")),
            Self::Placeholder(p) => write!(f, "placeholder={p}"),
            Self::TestId(id) => write!(f, "testid={id:?}"),
            Self::Text(p) => write!(f, "text={p}"),
        }
    }
}

/// Selector list for a [`Strategy::TestHook`] needle
#[must_use]
pub fn test_hook_selector(needle: &str) -> String {
    let escaped = needle.replace('\\', "\\\\").replace('"', "\\\"");
    TEST_HOOK_ATTRIBUTES
        .iter()
        .map(|attr| format!("[{attr}*=\"{escaped}\" i]"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// What an empty collection means for this target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EmptyPolicy {
    /// Nothing found is a legitimate state; report it neutrally
    EmptyIsValid,
    /// Nothing found means the page or the query broke
    #[default]
    EmptyIsFailure,
}

/// How a text value is read from a matched element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Extraction {
    /// Text content
    #[default]
    Text,
    /// `aria-label` when present and non-blank, else text content
    AriaLabelOrText,
}

/// Named, ordered definition of how to locate a semantic UI element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetDescriptor {
    name: String,
    strategies: Vec<Strategy>,
    filter: Option<TextPattern>,
    parent: Option<Arc<TargetDescriptor>>,
    empty_policy: EmptyPolicy,
    extraction: Extraction,
}

impl TargetDescriptor {
    /// Start building a descriptor
    #[must_use]
    pub fn builder(name: impl Into<String>) -> DescriptorBuilder {
        DescriptorBuilder {
            name: name.into(),
            strategies: Vec::new(),
            filter: None,
            parent: None,
            empty_policy: EmptyPolicy::default(),
            extraction: Extraction::default(),
        }
    }

    /// Descriptor name, used in diagnostics and errors
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Strategies in evaluation order
    #[must_use]
    pub fn strategies(&self) -> &[Strategy] {
        &self.strategies
    }

    /// Text filter applied after structural selection
    #[must_use]
    pub const fn filter(&self) -> Option<&TextPattern> {
        self.filter.as_ref()
    }

    /// Descriptor whose matches scope this one
    #[must_use]
    pub fn parent(&self) -> Option<&TargetDescriptor> {
        self.parent.as_deref()
    }

    /// Empty-result policy
    #[must_use]
    pub const fn empty_policy(&self) -> EmptyPolicy {
        self.empty_policy
    }

    /// Default extraction for collections
    #[must_use]
    pub const fn extraction(&self) -> Extraction {
        self.extraction
    }
}

impl fmt::Display for TargetDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Builder for [`TargetDescriptor`]
#[derive(Debug, Clone)]
pub struct DescriptorBuilder {
    name: String,
    strategies: Vec<Strategy>,
    filter: Option<TextPattern>,
    parent: Option<Arc<TargetDescriptor>>,
    empty_policy: EmptyPolicy,
    extraction: Extraction,
}

impl DescriptorBuilder {
    /// Append a strategy
    #[must_use]
    pub fn strategy(mut self, strategy: Strategy) -> Self {
        self.strategies.push(strategy);
        self
    }

    /// Keep only matches whose text matches `pattern`
    #[must_use]
    pub fn filter(mut self, pattern: TextPattern) -> Self {
        self.filter = Some(pattern);
        self
    }

    /// Search inside the matches of `parent`
    #[must_use]
    pub fn within(mut self, parent: TargetDescriptor) -> Self {
        self.parent = Some(Arc::new(parent));
        self
    }

    /// Set the empty-result policy
    #[must_use]
    pub const fn empty_policy(mut self, policy: EmptyPolicy) -> Self {
        self.empty_policy = policy;
        self
    }

    /// Set the default extraction
    #[must_use]
    pub const fn extraction(mut self, extraction: Extraction) -> Self {
        self.extraction = extraction;
        self
    }

    /// Validate and build
    pub fn build(self) -> AtentoResult<TargetDescriptor> {
        let invalid = |message: String| AtentoError::InvalidDescriptor {
            descriptor: self.name.clone(),
            message,
        };
        if self.name.trim().is_empty() {
            return Err(invalid("descriptor needs a name".to_string()));
        }
        if self.strategies.is_empty() {
            return Err(invalid("descriptor needs at least one strategy".to_string()));
        }
        if !self.strategies.iter().any(Strategy::is_structural) {
            return Err(invalid(
                "descriptor needs a role or structural CSS strategy".to_string(),
            ));
        }
        for strategy in &self.strategies {
            strategy.validate().map_err(&invalid)?;
        }
        Ok(TargetDescriptor {
            name: self.name,
            strategies: self.strategies,
            filter: self.filter,
            parent: self.parent,
            empty_policy: self.empty_policy,
            extraction: self.extraction,
        })
    }
}
