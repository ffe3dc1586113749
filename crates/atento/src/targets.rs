//! Descriptors for the site's recurring UI elements.
//!
//! Each logical field is defined once, as a process-wide static. Strategies
//! are ordered most-stable first: accessible role and name, then test hooks,
//! then structural CSS.

use crate::descriptor::{EmptyPolicy, Extraction, Strategy, TargetDescriptor};
use crate::text::TextPattern;
use std::sync::LazyLock;

/// Fields that mean "the sign-in form is ready", as one selector list
pub const IDENTIFIER_READY_CSS: &str = "#user-identifier-input, input[name=\"username\"], \
     input[type=\"email\"], [aria-label*=\"email\" i]";

/// Fields that mean "the search overlay or page is ready"
pub const SEARCH_READY_CSS: &str =
    "input[type=\"search\"], [role=\"searchbox\"], input[placeholder*=\"Search\" i]";

/// Apostrophe variants used by the site's copy
pub const APOSTROPHE: &str = "['’ʼ]";

fn fixed(builder: crate::descriptor::DescriptorBuilder) -> TargetDescriptor {
    builder.build().expect("static descriptor is valid")
}

fn pattern(source: &str) -> TextPattern {
    TextPattern::compiled(source)
}

/// Email or username field of the first sign-in step
pub static IDENTIFIER_INPUT: LazyLock<TargetDescriptor> = LazyLock::new(|| {
    fixed(
        TargetDescriptor::builder("identifier input").strategy(Strategy::css([
            "#user-identifier-input",
            "input[name=\"username\"]",
            "input[type=\"email\"]",
            "input[autocomplete=\"username\"]",
            "input[aria-label*=\"email\" i]",
        ])),
    )
});

/// Password field of the second sign-in step
pub static PASSWORD_INPUT: LazyLock<TargetDescriptor> = LazyLock::new(|| {
    fixed(
        TargetDescriptor::builder("password input").strategy(Strategy::css([
            "#password-input",
            "input[name=\"password\"]",
            "input[type=\"password\"]",
            "input[autocomplete=\"current-password\"]",
        ])),
    )
});

/// Primary "Continue / Next / Sign in" call to action
pub static CONTINUE_ACTION: LazyLock<TargetDescriptor> = LazyLock::new(|| {
    fixed(
        TargetDescriptor::builder("continue action")
            .strategy(Strategy::role(
                "button",
                pattern("(?i)^(continue|next|sign in|log in)$"),
            ))
            .strategy(Strategy::role("link", pattern("(?i)^(continue|next)$")))
            .strategy(Strategy::test_hook("continue"))
            .strategy(Strategy::css([
                "button[type=\"submit\"]",
                "input[type=\"submit\"]",
                "#submit",
                "#submit-button",
                "input[name=\"continue\"]",
                "input[type=\"continue\"]",
            ])),
    )
});

/// Form error message region
pub static ERROR_REGION: LazyLock<TargetDescriptor> = LazyLock::new(|| {
    fixed(
        TargetDescriptor::builder("error region")
            .strategy(Strategy::any_role("alert"))
            .strategy(Strategy::css([
                "#form-message-username",
                "#form-message-password",
                "#form-message-general",
                ".form-message__text",
                ".error-text",
            ])),
    )
});

/// Danger icon shown next to form errors
pub static DANGER_ICON: LazyLock<TargetDescriptor> = LazyLock::new(|| {
    fixed(
        TargetDescriptor::builder("danger icon")
            .strategy(Strategy::test_id("message-danger-icon"))
            .strategy(Strategy::css([
                "svg[data-testid*=\"danger\" i]",
                "[class*=\"danger\" i] svg",
            ])),
    )
});

/// Header sign-in link or button
pub static SIGN_IN_TRIGGER: LazyLock<TargetDescriptor> = LazyLock::new(|| {
    fixed(
        TargetDescriptor::builder("sign-in trigger")
            .strategy(Strategy::role("link", pattern("(?i)sign in")))
            .strategy(Strategy::role("button", pattern("(?i)sign in")))
            .strategy(Strategy::css(["a[href*=\"signin\" i]"])),
    )
});

/// Header search link or button
pub static SEARCH_TRIGGER: LazyLock<TargetDescriptor> = LazyLock::new(|| {
    fixed(
        TargetDescriptor::builder("search trigger")
            .strategy(Strategy::role("link", pattern("(?i)^search bbc$")))
            .strategy(Strategy::role("button", pattern("(?i)search")))
            .strategy(Strategy::css([
                "a[href*=\"/search\"]",
                "button[aria-label*=\"search\" i]",
            ])),
    )
});

/// Search input, in the overlay or on the search page
pub static SEARCH_BOX: LazyLock<TargetDescriptor> = LazyLock::new(|| {
    fixed(
        TargetDescriptor::builder("search box")
            .strategy(Strategy::any_role("searchbox"))
            .strategy(Strategy::Placeholder(pattern("(?i)search bbc|search")))
            .strategy(Strategy::css(["input[type=\"search\"]"])),
    )
});

/// Search result promo card
pub static RESULT_PROMO: LazyLock<TargetDescriptor> = LazyLock::new(|| {
    fixed(
        TargetDescriptor::builder("result promo")
            .strategy(Strategy::test_id("default-promo"))
            .strategy(Strategy::css(["[data-testid=\"default-promo\"]"])),
    )
});

/// Headline candidates inside search result promos
pub static RESULT_HEADLINES: LazyLock<TargetDescriptor> = LazyLock::new(|| {
    fixed(
        TargetDescriptor::builder("result headline")
            .strategy(Strategy::css([
                "[class*=\"PromoHeadline\"]",
                "a[aria-label]",
                "h1",
                "h2",
                "h3",
            ]))
            .within(RESULT_PROMO.clone())
            .extraction(Extraction::AriaLabelOrText)
            .empty_policy(EmptyPolicy::EmptyIsFailure),
    )
});

/// Team names on the fixtures page. Scores and badges are filtered out by
/// requiring a letter.
pub static TEAM_NAMES: LazyLock<TargetDescriptor> = LazyLock::new(|| {
    fixed(
        TargetDescriptor::builder("team name")
            .strategy(Strategy::css([
                "[class*=\"TeamNameWrapper\"] span:not([aria-hidden=\"true\"])",
                "[class*=\"MatchProgressContainer\"] span:not([aria-hidden=\"true\"])",
            ]))
            .filter(pattern("[A-Za-z]"))
            .empty_policy(EmptyPolicy::EmptyIsValid),
    )
});

/// Consent banner "accept additional cookies" button
pub static COOKIE_ACCEPT: LazyLock<TargetDescriptor> = LazyLock::new(|| {
    fixed(
        TargetDescriptor::builder("cookie accept")
            .strategy(Strategy::css_with_text(
                ["button"],
                pattern("(?i)accept additional"),
            ))
            .strategy(Strategy::css(["[aria-label*=\"Accept\"][role=\"button\"]"])),
    )
});

/// "Today" date chip on the fixtures page
pub static TODAY_LINK: LazyLock<TargetDescriptor> = LazyLock::new(|| {
    fixed(
        TargetDescriptor::builder("today link")
            .strategy(Strategy::role("link", pattern(r"(?i)^today\b"))),
    )
});

/// Message shown when a date has no fixtures
pub static NO_FIXTURES_NOTICE: LazyLock<TargetDescriptor> = LazyLock::new(|| {
    let notice =
        pattern("(?i)there are no fixtures for this date|no (fixtures|matches) (found|scheduled)");
    fixed(
        TargetDescriptor::builder("no-fixtures notice")
            .strategy(Strategy::Text(notice.clone()))
            .strategy(Strategy::css_with_text(["p", "[role=\"status\"]"], notice)),
    )
});

/// Every static descriptor, for listing and validation
pub fn all() -> Vec<&'static TargetDescriptor> {
    vec![
        &*IDENTIFIER_INPUT,
        &*PASSWORD_INPUT,
        &*CONTINUE_ACTION,
        &*ERROR_REGION,
        &*DANGER_ICON,
        &*SIGN_IN_TRIGGER,
        &*SEARCH_TRIGGER,
        &*SEARCH_BOX,
        &*RESULT_PROMO,
        &*RESULT_HEADLINES,
        &*TEAM_NAMES,
        &*COOKIE_ACCEPT,
        &*TODAY_LINK,
        &*NO_FIXTURES_NOTICE,
    ]
}
