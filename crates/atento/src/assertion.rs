//! Retrying assertions over element handles.
//!
//! `expect(handle).to_contain_text(pattern).await?` polls the live DOM until
//! the condition holds or the handle's timeout runs out. On failure the error
//! carries what was expected and the last value actually observed.

use crate::resolver::ElementHandle;
use crate::result::{AtentoError, AtentoResult};
use crate::text::TextPattern;
use crate::wait::{poll_until, Polled};
use std::sync::Mutex;
use std::time::Duration;
use tracing::debug;

/// Smart assertion builder for element handles
#[derive(Debug, Clone)]
pub struct Expect<'a> {
    handle: ElementHandle<'a>,
    message: Option<String>,
}

/// Create an expectation for a handle
#[must_use]
pub fn expect(handle: ElementHandle<'_>) -> Expect<'_> {
    Expect::new(handle)
}

impl<'a> Expect<'a> {
    /// Create a new expectation
    #[must_use]
    pub const fn new(handle: ElementHandle<'a>) -> Self {
        Self {
            handle,
            message: None,
        }
    }

    /// Use `message` as the failure context
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Override the polling budget (default: the handle's action timeout)
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.handle = self.handle.with_timeout(timeout);
        self
    }

    fn context(&self, what: &str) -> String {
        self.message
            .clone()
            .unwrap_or_else(|| format!("{} {what}", self.handle.descriptor().name()))
    }

    /// Assert the first match becomes visible.
    ///
    /// On timeout the error names the `with_message` context when one is set,
    /// the descriptor otherwise.
    pub async fn to_be_visible(&self) -> AtentoResult<()> {
        match self.handle.wait_visible().await {
            Ok(_) => Ok(()),
            Err(AtentoError::RequiredElementTimeout { descriptor, elapsed_ms }) => {
                Err(AtentoError::RequiredElementTimeout {
                    descriptor: self.message.clone().unwrap_or(descriptor),
                    elapsed_ms,
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Assert the normalized text of the first match matches `pattern`
    pub async fn to_have_text(&self, pattern: &TextPattern) -> AtentoResult<()> {
        let context = self.context("text");
        self.poll_text(&context, pattern, |text| pattern.is_match(text))
            .await
    }

    /// Assert the text of the first match contains a match for `pattern`.
    ///
    /// Patterns are unanchored, so this reads the same as
    /// [`Expect::to_have_text`] unless the pattern carries `^`/`$`; it exists
    /// to make intent explicit at call sites.
    pub async fn to_contain_text(&self, pattern: &TextPattern) -> AtentoResult<()> {
        let context = self.context("contains text");
        self.poll_text(&context, pattern, |text| pattern.is_match(text))
            .await
    }

    /// Assert the text of the first match contains `literal`
    pub async fn to_contain_literal(&self, literal: &str) -> AtentoResult<()> {
        let context = self.context("contains literal");
        let pattern = TextPattern::literal(literal);
        self.poll_text(&context, &pattern, |text| text.contains(literal))
            .await
    }

    /// Assert at least `n` matches exist
    pub async fn to_have_count_at_least(&self, n: usize) -> AtentoResult<()> {
        let handle = self.handle;
        let last = Mutex::new(0_usize);
        let last_ref = &last;
        let polled = poll_until(handle.poll_config(), || async move {
            let count = handle.count().await?;
            if let Ok(mut slot) = last_ref.lock() {
                *slot = count;
            }
            Ok((count >= n).then_some(()))
        })
        .await?;
        match polled {
            Polled::Ready { .. } => Ok(()),
            Polled::Expired { .. } => {
                let actual = last.lock().map(|c| *c).unwrap_or_default();
                Err(AtentoError::mismatch(
                    self.context("count"),
                    format!("at least {n}"),
                    actual.to_string(),
                ))
            }
        }
    }

    async fn poll_text<F>(&self, context: &str, expected: &TextPattern, check: F) -> AtentoResult<()>
    where
        F: Fn(&str) -> bool + Sync,
    {
        let handle = self.handle;
        let last: Mutex<Option<String>> = Mutex::new(None);
        let last_ref = &last;
        let check_ref = &check;
        let polled = poll_until(handle.poll_config(), || async move {
            let Some(text) = handle.text().await? else {
                return Ok(None);
            };
            let ok = check_ref(&text);
            if let Ok(mut slot) = last_ref.lock() {
                *slot = Some(text);
            }
            Ok(ok.then_some(()))
        })
        .await?;
        match polled {
            Polled::Ready { elapsed, .. } => {
                debug!(context, elapsed_ms = elapsed.as_millis() as u64, "assertion passed");
                Ok(())
            }
            Polled::Expired { .. } => {
                let actual = last
                    .lock()
                    .ok()
                    .and_then(|slot| slot.clone())
                    .map_or_else(|| "<no match>".to_string(), |t| format!("'{t}'"));
                Err(AtentoError::mismatch(context, expected.to_string(), actual))
            }
        }
    }
}
