//! Text normalization and pattern matching.
//!
//! Every textual comparison in Atento happens on whitespace-normalized text:
//! runs of whitespace (including non-breaking spaces) collapse to a single
//! space and the ends are trimmed. Patterns are regular expressions and are
//! only ever applied to extracted text, never spliced into a selector.

use crate::result::{AtentoError, AtentoResult};
use regex::Regex;
use std::collections::HashSet;
use std::fmt;

/// Collapse whitespace runs to one space and trim both ends.
#[must_use]
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Normalize every entry, drop blank ones and remove duplicates while
/// keeping the first occurrence of each value in place.
#[must_use]
pub fn dedupe_normalized<I, S>(values: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for value in values {
        let normalized = normalize_whitespace(value.as_ref());
        if normalized.is_empty() {
            continue;
        }
        if seen.insert(normalized.clone()) {
            out.push(normalized);
        }
    }
    out
}

/// A compiled text predicate.
#[derive(Clone)]
pub struct TextPattern {
    regex: Regex,
}

impl TextPattern {
    /// Compile a regular expression pattern
    pub fn regex(pattern: &str) -> AtentoResult<Self> {
        Regex::new(pattern)
            .map(|regex| Self { regex })
            .map_err(|e| AtentoError::InvalidSelector {
                selector: pattern.to_string(),
                message: e.to_string(),
            })
    }

    /// Case-sensitive literal substring
    #[must_use]
    pub fn literal(text: &str) -> Self {
        Self::compiled(&regex::escape(text))
    }

    /// Case-insensitive literal substring
    #[must_use]
    pub fn literal_ci(text: &str) -> Self {
        Self::compiled(&format!("(?i){}", regex::escape(text)))
    }

    /// Case-insensitive exact match of the whole normalized text
    #[must_use]
    pub fn exact_ci(text: &str) -> Self {
        Self::compiled(&format!("(?i)^{}$", regex::escape(text)))
    }

    /// Compile a pattern known to be valid at the call site.
    ///
    /// # Panics
    ///
    /// Panics if `pattern` is not a valid regular expression.
    #[must_use]
    pub fn compiled(pattern: &str) -> Self {
        Self {
            regex: Regex::new(pattern).expect("statically known pattern"),
        }
    }

    /// Test the pattern against the normalized form of `text`
    #[must_use]
    pub fn is_match(&self, text: &str) -> bool {
        self.regex.is_match(&normalize_whitespace(text))
    }

    /// Source of the underlying expression
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.regex.as_str()
    }

    /// The same predicate as a JavaScript `RegExp` source and flags.
    ///
    /// The result always carries the `u` flag, which gives JavaScript the
    /// same code-point and case-folding rules. `None` unless the expression
    /// keeps to syntax both engines read alike: no escape classes (`\d`,
    /// `\w`, `\b`, ...), no inline flags except a leading `(?i)`, and no
    /// nested or set-operation classes.
    #[must_use]
    pub fn js_regex(&self) -> Option<(String, &'static str)> {
        let source = self.regex.as_str();
        let (body, flags) = match source.strip_prefix("(?i)") {
            Some(rest) => (rest, "iu"),
            None => (source, "u"),
        };
        if body.contains("{,") {
            return None;
        }

        let mut out = String::with_capacity(body.len());
        let mut chars = body.chars().peekable();
        let mut in_class = false;
        let mut prev = None;
        while let Some(c) = chars.next() {
            match c {
                '\\' => {
                    let escaped = chars.next()?;
                    if escaped.is_ascii_alphanumeric() {
                        return None;
                    }
                    // Unicode-mode JavaScript only accepts escapes of syntax characters.
                    if JS_SYNTAX.contains(escaped) || (in_class && escaped == '-') {
                        out.push('\\');
                    }
                    out.push(escaped);
                    prev = None;
                    continue;
                }
                '[' if in_class => return None,
                '[' => {
                    in_class = true;
                    out.push('[');
                    if chars.peek() == Some(&'^') {
                        chars.next();
                        out.push('^');
                    }
                    if chars.peek() == Some(&']') {
                        return None;
                    }
                    prev = None;
                    continue;
                }
                ']' if in_class => in_class = false,
                '&' | '-' | '~' if in_class && prev == Some(c) => return None,
                '(' if !in_class && chars.peek() == Some(&'?') => {
                    chars.next();
                    if chars.next() != Some(':') {
                        return None;
                    }
                    out.push_str("(?:");
                    prev = None;
                    continue;
                }
                _ => {}
            }
            out.push(c);
            prev = Some(c);
        }
        Some((out, flags))
    }
}

const JS_SYNTAX: &str = "^$\\.*+?()[]{}|/";

impl fmt::Debug for TextPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TextPattern(/{}/)", self.regex.as_str())
    }
}

impl fmt::Display for TextPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}/", self.regex.as_str())
    }
}

impl PartialEq for TextPattern {
    fn eq(&self, other: &Self) -> bool {
        self.regex.as_str() == other.regex.as_str()
    }
}

impl Eq for TextPattern {}
