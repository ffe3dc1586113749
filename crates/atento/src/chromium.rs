//! Chromium driver over CDP (`browser` feature).
//!
//! Every page lives in its own browser context, so cookies and storage are
//! never shared between flows. DOM access goes through the injected runtime
//! in [`crate::aria::RUNTIME_JS`], which hands back `{document, index}`
//! references; accessible names and texts come back as plain strings and are
//! filtered on the Rust side.

#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::significant_drop_tightening,
    clippy::missing_errors_doc
)]

use crate::aria::RUNTIME_JS;
use crate::config::RunConfig;
use crate::driver::{
    LoadState, NodeRef, PageDriver, RoleMatch, Scope, TextCandidate, NETWORK_IDLE_THRESHOLD,
};
use crate::result::{AtentoError, AtentoResult};
use crate::runner::PageFactory;
use crate::text::TextPattern;
use async_trait::async_trait;
use chromiumoxide::browser::{Browser as CdpBrowser, BrowserConfig as CdpConfig};
use chromiumoxide::cdp::browser_protocol::emulation::{
    SetDeviceMetricsOverrideParams, SetLocaleOverrideParams, SetTimezoneOverrideParams,
};
use chromiumoxide::cdp::browser_protocol::input::{DispatchKeyEventParams, DispatchKeyEventType};
use chromiumoxide::cdp::browser_protocol::browser::BrowserContextId;
use chromiumoxide::cdp::browser_protocol::target::{
    CreateBrowserContextParams, CreateTargetParams, DisposeBrowserContextParams,
};
use chromiumoxide::layout::Point;
use chromiumoxide::page::Page as CdpPage;
use futures::StreamExt;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

fn page_err(e: impl std::fmt::Display) -> AtentoError {
    AtentoError::page(e.to_string())
}

fn js(value: &str) -> String {
    serde_json::Value::String(value.to_string()).to_string()
}

// =============================================================================
// BROWSER
// =============================================================================

/// A launched Chromium process
#[derive(Debug)]
pub struct ChromiumBrowser {
    inner: Arc<Mutex<CdpBrowser>>,
    handler: tokio::task::JoinHandle<()>,
}

impl ChromiumBrowser {
    /// Launch Chromium configured from `config`
    pub async fn launch(config: &RunConfig) -> AtentoResult<Self> {
        let mut builder = CdpConfig::builder()
            .window_size(config.viewport_width, config.viewport_height)
            .arg(format!("--lang={}", config.locale));
        if !config.headless {
            builder = builder.with_head();
        }
        if let Some(ref path) = config.chromium_path {
            builder = builder.chrome_executable(path);
        }
        let cdp_config = builder
            .build()
            .map_err(|message| AtentoError::BrowserLaunch { message })?;

        let (browser, mut handler) =
            CdpBrowser::launch(cdp_config)
                .await
                .map_err(|e| AtentoError::BrowserLaunch {
                    message: e.to_string(),
                })?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });
        debug!(headless = config.headless, "chromium launched");

        Ok(Self {
            inner: Arc::new(Mutex::new(browser)),
            handler,
        })
    }

    /// Open a page in a fresh browser context with locale, timezone and
    /// viewport emulation applied
    pub async fn new_page(&self, config: &RunConfig) -> AtentoResult<ChromiumPage> {
        let (context, page) = {
            let browser = self.inner.lock().await;
            let context = browser
                .execute(CreateBrowserContextParams::default())
                .await
                .map_err(page_err)?
                .result
                .browser_context_id;
            let target = CreateTargetParams::builder()
                .url("about:blank")
                .browser_context_id(context.clone())
                .build()
                .map_err(AtentoError::page)?;
            let page = browser.new_page(target).await.map_err(page_err)?;
            (context, page)
        };

        page.execute(SetTimezoneOverrideParams::new(config.timezone_id.clone()))
            .await
            .map_err(page_err)?;
        page.execute(SetLocaleOverrideParams {
            locale: Some(config.locale.clone()),
        })
        .await
        .map_err(page_err)?;
        page.execute(SetDeviceMetricsOverrideParams::new(
            i64::from(config.viewport_width),
            i64::from(config.viewport_height),
            1.0,
            false,
        ))
        .await
        .map_err(page_err)?;

        Ok(ChromiumPage {
            page,
            context,
            browser: Arc::clone(&self.inner),
        })
    }

    /// Shut the browser down
    pub async fn close(&self) -> AtentoResult<()> {
        let mut browser = self.inner.lock().await;
        browser.close().await.map_err(|e| AtentoError::BrowserLaunch {
            message: e.to_string(),
        })?;
        self.handler.abort();
        Ok(())
    }
}

/// [`PageFactory`] that opens every page in its own context of one browser
#[derive(Debug, Clone)]
pub struct ChromiumFactory {
    browser: Arc<ChromiumBrowser>,
}

impl ChromiumFactory {
    /// Wrap a launched browser
    #[must_use]
    pub const fn new(browser: Arc<ChromiumBrowser>) -> Self {
        Self { browser }
    }
}

#[async_trait]
impl PageFactory for ChromiumFactory {
    async fn open(&self, config: &RunConfig) -> AtentoResult<Box<dyn PageDriver>> {
        Ok(Box::new(self.browser.new_page(config).await?))
    }
}

// =============================================================================
// PAGE
// =============================================================================

#[derive(Debug, Deserialize)]
struct Reply {
    #[serde(default)]
    stale: bool,
    #[serde(default)]
    value: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct Tagged<T> {
    doc: u64,
    items: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct RoleItem {
    index: usize,
    name: String,
}

#[derive(Debug, Deserialize)]
struct TextItem {
    index: usize,
    text: String,
    ancestors: Vec<usize>,
}

#[derive(Debug, Deserialize)]
struct Center {
    x: f64,
    y: f64,
}

/// Script prefix binding `S` to the scope argument, bailing out with a stale
/// reply when the scope node is gone
fn scope_guard(scope: Scope) -> (String, NodeRef) {
    match scope {
        Scope::Page => ("const S = null;".to_string(), NodeRef::new(0, 0)),
        Scope::Within(node) => (
            format!(
                "if (!A.node({}, {})) return {{ stale: true }}; const S = {};",
                node.document, node.index, node.index
            ),
            node,
        ),
    }
}

/// A page in its own browser context
#[derive(Debug)]
pub struct ChromiumPage {
    page: CdpPage,
    context: BrowserContextId,
    browser: Arc<Mutex<CdpBrowser>>,
}

impl ChromiumPage {
    /// Evaluate `body` with the runtime bound to `A`
    async fn eval<T: DeserializeOwned>(&self, body: &str) -> AtentoResult<T> {
        let expression = format!("(() => {{ const A = {RUNTIME_JS}; {body} }})()");
        let result = self.page.evaluate(expression).await.map_err(page_err)?;
        result.into_value::<T>().map_err(page_err)
    }

    async fn reply<T: DeserializeOwned>(&self, body: &str, stale: NodeRef) -> AtentoResult<T> {
        let reply: Reply = self.eval(body).await?;
        if reply.stale {
            return Err(AtentoError::StaleElement {
                document: stale.document,
                index: stale.index,
            });
        }
        Ok(serde_json::from_value(reply.value)?)
    }

    /// Evaluate `expr` with `el` bound to the node
    async fn on_node<T: DeserializeOwned>(&self, node: NodeRef, expr: &str) -> AtentoResult<T> {
        let body = format!(
            "const el = A.node({}, {}); if (!el) return {{ stale: true }}; return {{ value: {expr} }};",
            node.document, node.index
        );
        self.reply(&body, node).await
    }

    /// Evaluate `call` (which may use `S`, the scope argument) returning
    /// indices tagged with the current document id
    async fn in_scope<T: DeserializeOwned>(
        &self,
        scope: Scope,
        call: &str,
    ) -> AtentoResult<Tagged<T>> {
        let (guard, stale) = scope_guard(scope);
        let body = format!("{guard} return {{ value: {{ doc: A.doc, items: {call} }} }};");
        self.reply(&body, stale).await
    }

    /// Re-evaluate `expr` until it is truthy
    async fn poll_js(&self, expr: &str, timeout: Duration) -> AtentoResult<()> {
        let deadline = Instant::now() + timeout;
        loop {
            // Evaluation fails while a navigation swaps the execution context.
            let ready: bool = self
                .page
                .evaluate(format!("!!({expr})"))
                .await
                .ok()
                .and_then(|r| r.into_value().ok())
                .unwrap_or(false);
            if ready {
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

    async fn wait_network_idle(&self, timeout: Duration) -> AtentoResult<()> {
        let deadline = Instant::now() + timeout;
        let mut last_count = None;
        let mut quiet_since = Instant::now();
        loop {
            let probe: Option<(String, usize)> = self
                .page
                .evaluate("[document.readyState, performance.getEntriesByType('resource').length]")
                .await
                .ok()
                .and_then(|r| r.into_value().ok());
            let now = Instant::now();
            match probe {
                Some((state, count)) => {
                    if last_count != Some(count) {
                        last_count = Some(count);
                        quiet_since = now;
                    } else if state == "complete"
                        && now.duration_since(quiet_since) >= NETWORK_IDLE_THRESHOLD
                    {
                        return Ok(());
                    }
                }
                None => {
                    last_count = None;
                    quiet_since = now;
                }
            }
            if now >= deadline {
                return Err(AtentoError::Timeout {
                    ms: timeout.as_millis() as u64,
                });
            }
            tokio::time::sleep(POLL_INTERVAL.min(deadline - now)).await;
        }
    }

    async fn time_origin(&self) -> Option<String> {
        self.page
            .evaluate("String(performance.timeOrigin)")
            .await
            .ok()
            .and_then(|r| r.into_value().ok())
    }

    async fn key(&self, kind: DispatchKeyEventType, key: &str) -> AtentoResult<()> {
        let (code, vk, text) = match key {
            "Enter" => ("Enter", 13, Some("\r")),
            "Tab" => ("Tab", 9, None),
            "Escape" => ("Escape", 27, None),
            "Backspace" => ("Backspace", 8, None),
            other => (other, 0, Some(other)),
        };
        let mut builder = DispatchKeyEventParams::builder()
            .r#type(kind.clone())
            .key(key)
            .code(code)
            .windows_virtual_key_code(vk);
        if kind == DispatchKeyEventType::KeyDown {
            if let Some(text) = text {
                builder = builder.text(text);
            }
        }
        let params = builder.build().map_err(|message| AtentoError::Interaction {
            action: "press".to_string(),
            message,
        })?;
        self.page.execute(params).await.map_err(page_err)?;
        Ok(())
    }
}

#[async_trait]
impl PageDriver for ChromiumPage {
    async fn navigate(&self, url: &str, timeout: Duration) -> AtentoResult<()> {
        debug!(url, "navigate");
        match tokio::time::timeout(timeout, self.page.goto(url)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(AtentoError::Navigation {
                url: url.to_string(),
                message: e.to_string(),
            }),
            Err(_) => Err(AtentoError::Timeout {
                ms: timeout.as_millis() as u64,
            }),
        }
    }

    async fn current_url(&self) -> AtentoResult<String> {
        Ok(self
            .page
            .url()
            .await
            .map_err(page_err)?
            .unwrap_or_else(|| "about:blank".to_string()))
    }

    async fn query_role(&self, scope: Scope, role: &str) -> AtentoResult<Vec<RoleMatch>> {
        let tagged: Tagged<RoleItem> = self
            .in_scope(scope, &format!("A.queryRole(S, {})", js(role)))
            .await?;
        Ok(tagged
            .items
            .into_iter()
            .map(|item| RoleMatch {
                node: NodeRef::new(tagged.doc, item.index),
                name: item.name,
            })
            .collect())
    }

    async fn query_css(&self, scope: Scope, css: &str) -> AtentoResult<Vec<NodeRef>> {
        let body = format!("A.queryCss(S, {})", js(css));
        // querySelectorAll throws on a bad selector; report it as such.
        let tagged: Tagged<usize> = self.in_scope(scope, &body).await.map_err(|e| match e {
            AtentoError::Page { message } if message.contains("SyntaxError") => {
                AtentoError::InvalidSelector {
                    selector: css.to_string(),
                    message,
                }
            }
            other => other,
        })?;
        Ok(tagged
            .items
            .into_iter()
            .map(|index| NodeRef::new(tagged.doc, index))
            .collect())
    }

    async fn text_candidates(&self, scope: Scope) -> AtentoResult<Vec<TextCandidate>> {
        let tagged: Tagged<TextItem> = self.in_scope(scope, "A.textCandidates(S)").await?;
        let doc = tagged.doc;
        Ok(tagged
            .items
            .into_iter()
            .map(|item| TextCandidate {
                node: NodeRef::new(doc, item.index),
                text: item.text,
                ancestors: item
                    .ancestors
                    .into_iter()
                    .map(|i| NodeRef::new(doc, i))
                    .collect(),
            })
            .collect())
    }

    async fn match_text(
        &self,
        scope: Scope,
        pattern: &TextPattern,
    ) -> AtentoResult<Option<Vec<NodeRef>>> {
        let Some((source, flags)) = pattern.js_regex() else {
            return Ok(None);
        };
        let (guard, stale) = scope_guard(scope);
        let body = format!(
            "{guard} const m = A.matchText(S, {}, {}); \
             return {{ value: m === null ? null : {{ doc: A.doc, items: m }} }};",
            js(&source),
            js(flags)
        );
        let tagged: Option<Tagged<usize>> = self.reply(&body, stale).await?;
        Ok(tagged.map(|tagged| {
            let doc = tagged.doc;
            tagged
                .items
                .into_iter()
                .map(|index| NodeRef::new(doc, index))
                .collect()
        }))
    }

    async fn text_content(&self, node: NodeRef) -> AtentoResult<String> {
        self.on_node(node, "(el.textContent || '').replace(/\\s+/g, ' ').trim()")
            .await
    }

    async fn attribute(&self, node: NodeRef, name: &str) -> AtentoResult<Option<String>> {
        self.on_node(node, &format!("el.getAttribute({})", js(name)))
            .await
    }

    async fn is_visible(&self, node: NodeRef) -> AtentoResult<bool> {
        self.on_node(node, "A.visible(el)").await
    }

    async fn fill(&self, node: NodeRef, text: &str) -> AtentoResult<()> {
        let editable: bool = self
            .on_node(
                node,
                &format!(
                    "(['INPUT', 'TEXTAREA'].includes(el.tagName) ? (A.fill(el, {}), true) : false)",
                    js(text)
                ),
            )
            .await?;
        if editable {
            Ok(())
        } else {
            Err(AtentoError::Interaction {
                action: "fill".to_string(),
                message: format!("{node} is not an editable field"),
            })
        }
    }

    async fn click(&self, node: NodeRef) -> AtentoResult<()> {
        let center: Center = self.on_node(node, "A.center(el)").await?;
        self.page
            .click(Point::new(center.x, center.y))
            .await
            .map_err(|e| AtentoError::Interaction {
                action: "click".to_string(),
                message: e.to_string(),
            })?;
        Ok(())
    }

    async fn press(&self, node: NodeRef, key: &str) -> AtentoResult<()> {
        let () = self.on_node(node, "(el.focus(), null)").await?;
        self.key(DispatchKeyEventType::KeyDown, key).await?;
        self.key(DispatchKeyEventType::KeyUp, key).await
    }

    async fn wait_for_load_state(&self, state: LoadState, timeout: Duration) -> AtentoResult<()> {
        match state {
            LoadState::DomContentLoaded => {
                self.poll_js("document.readyState !== 'loading'", timeout)
                    .await
            }
            LoadState::Load => {
                self.poll_js("document.readyState === 'complete'", timeout)
                    .await
            }
            LoadState::NetworkIdle => self.wait_network_idle(timeout).await,
        }
    }

    async fn wait_for_selector(&self, css: &str, timeout: Duration) -> AtentoResult<NodeRef> {
        let deadline = Instant::now() + timeout;
        loop {
            match self.query_css(Scope::Page, css).await {
                Ok(nodes) => {
                    for node in nodes {
                        if self.is_visible(node).await.unwrap_or(false) {
                            return Ok(node);
                        }
                    }
                }
                Err(e @ AtentoError::InvalidSelector { .. }) => return Err(e),
                Err(e) => debug!(error = %e, "selector probe failed, retrying"),
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
        let before = self.time_origin().await;
        let deadline = Instant::now() + timeout;
        loop {
            tokio::time::sleep(POLL_INTERVAL).await;
            if let Some(now_origin) = self.time_origin().await {
                if before.as_ref() != Some(&now_origin) {
                    return Ok(());
                }
            }
            if Instant::now() >= deadline {
                return Err(AtentoError::Timeout {
                    ms: timeout.as_millis() as u64,
                });
            }
        }
    }

    async fn close(&self) -> AtentoResult<()> {
        self.page.clone().close().await.map_err(page_err)?;
        let browser = self.browser.lock().await;
        if let Err(e) = browser
            .execute(DisposeBrowserContextParams::new(self.context.clone()))
            .await
        {
            warn!(error = %e, "failed to dispose browser context");
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_js_string_literal_escapes() {
        assert_eq!(js(r#"a"b"#), r#""a\"b""#);
        assert_eq!(js("it's\n"), r#""it's\n""#);
    }

    #[test]
    fn test_scope_guard() {
        let (page, stale) = scope_guard(Scope::Page);
        assert_eq!(page, "const S = null;");
        assert_eq!(stale, NodeRef::new(0, 0));

        let node = NodeRef::new(4, 9);
        let (within, stale) = scope_guard(Scope::Within(node));
        assert!(within.starts_with("if (!A.node(4, 9)) return { stale: true };"));
        assert!(within.ends_with("const S = 9;"));
        assert_eq!(stale, node);
    }

    #[test]
    fn test_untranslatable_match_reply_is_none() {
        let tagged: Option<Tagged<usize>> = serde_json::from_value(serde_json::Value::Null).unwrap();
        assert!(tagged.is_none());
    }

    #[test]
    fn test_reply_defaults() {
        let reply: Reply = serde_json::from_str("{}").unwrap();
        assert!(!reply.stale);
        assert!(reply.value.is_null());
        let tagged: Tagged<usize> =
            serde_json::from_value(serde_json::json!({"doc": 7, "items": [1, 4]})).unwrap();
        assert_eq!(tagged.doc, 7);
        assert_eq!(tagged.items, vec![1, 4]);
    }
}
