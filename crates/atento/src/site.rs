//! Reusable steps for the site's common journeys.

use crate::assertion::expect;
use crate::driver::LoadState;
use crate::flow::FlowContext;
use crate::result::AtentoResult;
use crate::targets::{
    COOKIE_ACCEPT, CONTINUE_ACTION, IDENTIFIER_INPUT, IDENTIFIER_READY_CSS, PASSWORD_INPUT,
    SEARCH_BOX, SEARCH_READY_CSS, SEARCH_TRIGGER, SIGN_IN_TRIGGER,
};
use crate::wait::{best_effort, WaitOutcome};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// How long the consent banner gets to show up
pub const COOKIE_BANNER_WAIT: Duration = Duration::from_secs(2);

/// How long the sign-in form gets after the trigger is clicked
pub const SIGN_IN_FORM_WAIT: Duration = Duration::from_secs(5);

/// Dismiss the consent banner if it shows up. Never fails.
///
/// Returns whether the accept button was clicked.
pub async fn accept_cookies_if_present(ctx: &FlowContext<'_>) -> bool {
    let accept = ctx.locate(&COOKIE_ACCEPT);
    let outcome = accept.wait_visible_for(COOKIE_BANNER_WAIT).await;
    if !outcome.is_satisfied() {
        debug!(%outcome, "no consent banner");
        return false;
    }
    match accept.with_timeout(COOKIE_BANNER_WAIT).click().await {
        Ok(()) => true,
        Err(e) => {
            warn!(error = %e, "consent banner click failed");
            false
        }
    }
}

/// Open the site root and dismiss the consent banner
pub async fn open_home(ctx: &FlowContext<'_>) -> AtentoResult<()> {
    ctx.goto("/").await?;
    accept_cookies_if_present(ctx).await;
    Ok(())
}

/// Wait for a navigation or for `css` to become visible, whichever first
async fn navigation_or_selector(ctx: &FlowContext<'_>, css: &str, label: &str) -> WaitOutcome {
    let page = ctx.page();
    let timeout = ctx.config().navigation_timeout();
    best_effort(label, timeout, async move {
        tokio::select! {
            nav = page.wait_for_navigation(timeout) => nav,
            found = page.wait_for_selector(css, timeout) => found.map(|_| ()),
        }
    })
    .await
}

/// Run `action` while `watch` looks for its effect.
///
/// The watcher is polled first so a fast navigation is not missed. An action
/// error returns at once; the watcher is only awaited once the action is done.
async fn while_watching<W, A>(watch: W, action: A) -> AtentoResult<WaitOutcome>
where
    W: Future<Output = WaitOutcome>,
    A: Future<Output = AtentoResult<()>>,
{
    tokio::pin!(watch);
    tokio::pin!(action);
    tokio::select! {
        biased;
        outcome = &mut watch => {
            action.await?;
            Ok(outcome)
        }
        acted = &mut action => {
            acted?;
            Ok(watch.await)
        }
    }
}

/// Open the home page, click the sign-in trigger and wait until the first
/// sign-in step is ready.
///
/// The form may load as a new document or in place; both are accepted.
pub async fn open_sign_in(ctx: &FlowContext<'_>) -> AtentoResult<()> {
    open_home(ctx).await?;
    let trigger = ctx.locate(&SIGN_IN_TRIGGER);

    let ready = while_watching(
        navigation_or_selector(ctx, IDENTIFIER_READY_CSS, "sign-in form"),
        trigger.click(),
    )
    .await?;
    debug!(%ready, "sign-in trigger clicked");

    accept_cookies_if_present(ctx).await;

    let page = ctx.page();
    best_effort(
        IDENTIFIER_INPUT.name(),
        SIGN_IN_FORM_WAIT,
        page.wait_for_selector(IDENTIFIER_READY_CSS, SIGN_IN_FORM_WAIT),
    )
    .await
    .required(IDENTIFIER_INPUT.name())?;
    Ok(())
}

/// Fill the identifier and continue; with a password, fill the second step
/// and continue again.
pub async fn submit_credentials(
    ctx: &FlowContext<'_>,
    username: &str,
    password: Option<&str>,
) -> AtentoResult<()> {
    ctx.locate(&IDENTIFIER_INPUT).fill(username).await?;
    ctx.locate(&CONTINUE_ACTION).click().await?;

    if let Some(password) = password {
        ctx.locate(&PASSWORD_INPUT).fill(password).await?;
        ctx.locate(&CONTINUE_ACTION).click().await?;
    }
    Ok(())
}

/// Click the header search control and wait for the search input, as an
/// overlay or a new page.
pub async fn open_search(ctx: &FlowContext<'_>) -> AtentoResult<()> {
    let trigger = ctx.locate(&SEARCH_TRIGGER);
    expect(trigger)
        .with_message("Search trigger should be visible")
        .to_be_visible()
        .await?;

    let ready = while_watching(
        navigation_or_selector(ctx, SEARCH_READY_CSS, "search input"),
        trigger.click(),
    )
    .await?;
    debug!(%ready, "search trigger clicked");
    Ok(())
}

/// Type `term` into the search box, submit with Enter and wait for results
/// to settle.
pub async fn search_for(ctx: &FlowContext<'_>, term: &str) -> AtentoResult<()> {
    let search_box = ctx.locate(&SEARCH_BOX);
    expect(search_box)
        .with_message("Search input should be visible")
        .to_be_visible()
        .await?;
    search_box.fill(term).await?;

    let page = ctx.page();
    let timeout = ctx.config().navigation_timeout();
    let navigated = while_watching(
        best_effort("results navigation", timeout, page.wait_for_navigation(timeout)),
        search_box.press("Enter"),
    )
    .await?;
    if !navigated.is_satisfied() {
        best_effort(
            "results domcontentloaded",
            timeout,
            page.wait_for_load_state(LoadState::DomContentLoaded, timeout),
        )
        .await;
    }
    ctx.settle().await;
    Ok(())
}
