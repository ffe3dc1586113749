//! Atento: resilient element locators and page-readiness waits for browser
//! end-to-end flows.
//!
//! Atento ("attentive") drives a website through a browser and checks what
//! it renders. Two pieces do the heavy lifting: a readiness detector that
//! decides when a page is settled enough to query, and a locator resolver
//! that finds UI elements by falling back through an ordered list of
//! strategies while the markup shifts underneath it.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                        ATENTO Architecture                       │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  ┌───────────┐   ┌─────────────┐   ┌──────────────┐              │
//! │  │ Scenarios │──►│ FlowContext │──►│ await_settled│              │
//! │  │ (Flow)    │   │ locate/goto │   │ resolve      │              │
//! │  └───────────┘   └─────────────┘   └──────┬───────┘              │
//! │        ▲                                  │                      │
//! │  ┌─────┴─────┐                     ┌──────▼───────┐              │
//! │  │FlowRunner │── PageFactory ─────►│  PageDriver  │              │
//! │  │ workers,  │                     │ Chromium/Mock│              │
//! │  │ retries   │                     └──────────────┘              │
//! │  └───────────┘                                                   │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use atento::{expect, resolve, MockPage, Scope, Strategy, TargetDescriptor, TextPattern};
//!
//! # tokio_test_block(async {
//! let page = MockPage::with_html(r#"<form><button type="submit"></button></form>"#);
//! let submit = TargetDescriptor::builder("continue action")
//!     .strategy(Strategy::role("button", TextPattern::compiled("(?i)^continue$")))
//!     .strategy(Strategy::css(["button[type=\"submit\"]"]))
//!     .build()
//!     .unwrap();
//!
//! let handle = resolve(&page, Scope::Page, &submit);
//! assert_eq!(handle.count().await.unwrap(), 1);
//! expect(handle).to_be_visible().await.unwrap();
//! # });
//! # fn tokio_test_block<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(f)
//! # }
//! ```

#![warn(missing_docs)]
// Lints are configured in workspace Cargo.toml [workspace.lints.clippy]

mod assertion;
mod config;
mod descriptor;
mod driver;
mod flow;
mod readiness;
mod resolver;
mod result;
mod runner;
mod text;
mod wait;

/// Implicit ARIA roles, accessible names and the injected page runtime
pub mod aria;

/// In-memory page driver for tests and demos
pub mod mock;

/// Built-in scenarios
pub mod scenarios;

/// Reusable site journeys: consent, sign-in, search
pub mod site;

/// Static descriptors for the site's UI elements
pub mod targets;

/// Chromium driver over CDP
#[cfg(feature = "browser")]
pub mod chromium;

pub use assertion::{expect, Expect};
pub use config::{RunConfig, ENV_PREFIX};
pub use descriptor::{
    test_hook_selector, DescriptorBuilder, EmptyPolicy, Extraction, Strategy, TargetDescriptor,
    TEST_HOOK_ATTRIBUTES,
};
pub use driver::{
    query_text, LoadState, NodeRef, PageDriver, RoleMatch, Scope, TextCandidate,
    NETWORK_IDLE_THRESHOLD,
};
pub use flow::{Flow, FlowContext, FlowOutcome};
pub use mock::{LoadTiming, MockPage, Reaction};
pub use readiness::{
    await_settled, Readiness, ReadinessOptions, ReadinessReport, DEFAULT_IDLE_WINDOW,
    DEFAULT_MAX_WAIT, DEFAULT_NAVIGATION_GRACE,
};
pub use resolver::{
    evaluate, extract, resolve, Collected, ElementHandle, Resolution, DEFAULT_ACTION_TIMEOUT,
};
pub use result::{AtentoError, AtentoResult};
pub use runner::{FlowReport, FlowRunner, FlowStatus, PageFactory, RunSummary};
pub use scenarios::{all_scenarios, select_scenarios};
pub use text::{dedupe_normalized, normalize_whitespace, TextPattern};
pub use wait::{
    best_effort, poll_until, PollConfig, Polled, WaitOutcome, WaitStatus, DEFAULT_POLL_INTERVAL,
};

#[cfg(feature = "browser")]
pub use chromium::{ChromiumBrowser, ChromiumFactory, ChromiumPage};
