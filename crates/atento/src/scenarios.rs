//! Built-in scenarios.
//!
//! | name | checks |
//! |------|--------|
//! | `fixtures-today` | today's team names (neutral when there are none) |
//! | `search-sports` | search returns at least one headline |
//! | `sign-in-*` | first/second-step error copy for bad credentials |

use crate::assertion::expect;
use crate::flow::{Flow, FlowContext, FlowOutcome};
use crate::result::AtentoResult;
use crate::site::{accept_cookies_if_present, open_home, open_search, open_sign_in, search_for};
use crate::targets::{
    APOSTROPHE, CONTINUE_ACTION, DANGER_ICON, ERROR_REGION, IDENTIFIER_INPUT, NO_FIXTURES_NOTICE,
    PASSWORD_INPUT, RESULT_HEADLINES, TEAM_NAMES, TODAY_LINK,
};
use crate::text::TextPattern;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Path of the football scores and fixtures page
pub const FIXTURES_PATH: &str = "/sport/football/scores-fixtures";

/// Term used by the search scenario
pub const SEARCH_TERM: &str = "sports";

/// Allowed-characters snippet of the username policy copy
pub const ALLOWED_CHARS_LITERAL: &str = "?/|}{+=_-^~`%$#";

/// Every built-in scenario, in a stable order
#[must_use]
pub fn all_scenarios() -> Vec<Arc<dyn Flow>> {
    let mut flows: Vec<Arc<dyn Flow>> = vec![Arc::new(FixturesToday), Arc::new(SearchSports)];
    flows.extend(
        NegativeSignIn::all()
            .into_iter()
            .map(|flow| Arc::new(flow) as Arc<dyn Flow>),
    );
    flows
}

/// Scenarios whose name contains `filter` (all when `None`)
#[must_use]
pub fn select_scenarios(filter: Option<&str>) -> Vec<Arc<dyn Flow>> {
    all_scenarios()
        .into_iter()
        .filter(|flow| filter.map_or(true, |f| flow.name().contains(f)))
        .collect()
}

// =============================================================================
// FIXTURES
// =============================================================================

/// Collect the names of every team playing today
#[derive(Debug, Clone, Copy, Default)]
pub struct FixturesToday;

#[async_trait]
impl Flow for FixturesToday {
    fn name(&self) -> &str {
        "fixtures-today"
    }

    fn description(&self) -> &str {
        "collect all teams with a match today"
    }

    async fn run(&self, ctx: &FlowContext<'_>) -> AtentoResult<FlowOutcome> {
        ctx.goto(FIXTURES_PATH).await?;
        accept_cookies_if_present(ctx).await;
        ctx.settle().await;

        let today = ctx.locate(&TODAY_LINK);
        if today.is_visible().await.unwrap_or(false) {
            today.click().await?;
            ctx.settle().await;
        }

        if ctx.locate(&NO_FIXTURES_NOTICE).count().await? > 0 {
            info!("no matches today: the page shows a no-fixtures message");
            return Ok(FlowOutcome::neutral("no fixtures today"));
        }

        let teams = ctx.locate(&TEAM_NAMES).collect().await?;
        if teams.is_empty() {
            info!("no team names found; the page may use a different template");
            return Ok(FlowOutcome::neutral(
                "no team names found; the page may use a different template",
            ));
        }
        for team in &teams.values {
            info!(%team, "playing today");
        }
        Ok(FlowOutcome::passed_with(teams.values))
    }
}

// =============================================================================
// SEARCH
// =============================================================================

/// Search the site and report the first and last result headlines
#[derive(Debug, Clone, Copy, Default)]
pub struct SearchSports;

#[async_trait]
impl Flow for SearchSports {
    fn name(&self) -> &str {
        "search-sports"
    }

    fn description(&self) -> &str {
        "search \"sports\" and report first/last result headlines"
    }

    async fn run(&self, ctx: &FlowContext<'_>) -> AtentoResult<FlowOutcome> {
        open_home(ctx).await?;
        open_search(ctx).await?;
        accept_cookies_if_present(ctx).await;
        search_for(ctx, SEARCH_TERM).await?;

        let headlines = ctx.locate(&RESULT_HEADLINES);
        expect(headlines)
            .with_timeout(Duration::from_secs(10))
            .with_message("At least one result card should be visible")
            .to_be_visible()
            .await?;

        let found = headlines.collect().await?;
        let mut details = Vec::with_capacity(2);
        if let Some(first) = found.first() {
            info!(headline = first, "first heading");
            details.push(format!("first: {first}"));
        }
        if let Some(last) = found.last() {
            info!(headline = last, "last heading");
            details.push(format!("last: {last}"));
        }
        details.push(format!("{} unique headlines", found.values.len()));
        Ok(FlowOutcome::passed_with(details))
    }
}

// =============================================================================
// NEGATIVE SIGN-IN
// =============================================================================

/// A text check on the error region
#[derive(Debug, Clone)]
pub enum ErrorCopy {
    /// The whole region matches
    HasText(TextPattern),
    /// The region contains a match
    Contains(TextPattern),
    /// The region contains this exact text
    ContainsLiteral(&'static str),
}

/// Bad credentials must be rejected with the right error copy
#[derive(Debug, Clone)]
pub struct NegativeSignIn {
    name: &'static str,
    description: &'static str,
    username: String,
    password: Option<&'static str>,
    checks: Vec<ErrorCopy>,
    danger_icon: bool,
}

fn copy(source: &str) -> TextPattern {
    TextPattern::compiled(&source.replace('\'', APOSTROPHE))
}

impl NegativeSignIn {
    /// The five negative sign-in scenarios
    #[must_use]
    pub fn all() -> Vec<Self> {
        vec![
            Self {
                name: "sign-in-empty-email",
                description: "empty email shows an error on the first step",
                username: String::new(),
                password: None,
                checks: vec![ErrorCopy::HasText(copy(
                    r"(?i)Something's missing\s*\.\s*Please check and try again\.",
                ))],
                danger_icon: true,
            },
            Self {
                name: "sign-in-malformed-email",
                description: "malformed email is not recognised",
                username: "not-an-email".to_string(),
                password: None,
                checks: vec![ErrorCopy::HasText(copy(
                    r"(?i)We don't recognise that email or username\.\s*You can try again or\s*register for an account\.?",
                ))],
                danger_icon: false,
            },
            Self {
                name: "sign-in-empty-password",
                description: "valid email with empty password shows an error on the second step",
                username: "someone@example.com".to_string(),
                password: Some(""),
                checks: vec![ErrorCopy::Contains(copy(r"(?i)enter.*password"))],
                danger_icon: false,
            },
            Self {
                name: "sign-in-sql-ish-email",
                description: "SQL-like username is blocked on the first step",
                username: "' OR 1=1 --".to_string(),
                password: None,
                checks: vec![
                    ErrorCopy::Contains(copy(r"(?i)Usernames can only include")),
                    ErrorCopy::Contains(copy(r"(?i)Letters, numbers and these characters:")),
                    ErrorCopy::ContainsLiteral(ALLOWED_CHARS_LITERAL),
                ],
                danger_icon: false,
            },
            Self {
                name: "sign-in-long-email",
                description: "overlong email is rejected on the first step",
                username: format!("{}@example.com", "a".repeat(255)),
                password: None,
                checks: vec![
                    ErrorCopy::Contains(copy(r"(?i)Sorry, that email's too long")),
                    ErrorCopy::Contains(copy(r"(?i)It can't be more than\s*101\s*characters\.")),
                ],
                danger_icon: true,
            },
        ]
    }

    /// Username typed into the first step
    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Error copy checks
    #[must_use]
    pub fn checks(&self) -> &[ErrorCopy] {
        &self.checks
    }
}

#[async_trait]
impl Flow for NegativeSignIn {
    fn name(&self) -> &str {
        self.name
    }

    fn description(&self) -> &str {
        self.description
    }

    async fn run(&self, ctx: &FlowContext<'_>) -> AtentoResult<FlowOutcome> {
        open_sign_in(ctx).await?;

        let identifier = ctx.locate(&IDENTIFIER_INPUT);
        expect(identifier)
            .with_message("Email field should be visible")
            .to_be_visible()
            .await?;
        identifier.fill(&self.username).await?;
        ctx.locate(&CONTINUE_ACTION).click().await?;

        if let Some(password) = self.password {
            let password_input = ctx.locate(&PASSWORD_INPUT);
            expect(password_input)
                .with_message("Password field should be visible after step 1")
                .to_be_visible()
                .await?;
            password_input.fill(password).await?;
            ctx.locate(&CONTINUE_ACTION).click().await?;
        }

        let region = ctx.locate(&ERROR_REGION);
        expect(region)
            .with_message("Error region should be shown")
            .to_be_visible()
            .await?;
        for check in &self.checks {
            let assertion = expect(region).with_message(format!("{} error copy", self.name));
            match check {
                ErrorCopy::HasText(pattern) => assertion.to_have_text(pattern).await?,
                ErrorCopy::Contains(pattern) => assertion.to_contain_text(pattern).await?,
                ErrorCopy::ContainsLiteral(text) => assertion.to_contain_literal(text).await?,
            }
        }

        if self.danger_icon {
            expect(ctx.locate(&DANGER_ICON)).to_be_visible().await?;
        }

        let shown = region.text().await?.unwrap_or_default();
        Ok(FlowOutcome::passed_with(vec![shown]))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_names() {
        let names: Vec<String> = all_scenarios().iter().map(|f| f.name().to_string()).collect();
        assert_eq!(
            names,
            vec![
                "fixtures-today",
                "search-sports",
                "sign-in-empty-email",
                "sign-in-malformed-email",
                "sign-in-empty-password",
                "sign-in-sql-ish-email",
                "sign-in-long-email",
            ]
        );
        assert!(all_scenarios().iter().all(|f| !f.description().is_empty()));
    }

    #[test]
    fn test_select_by_substring() {
        assert_eq!(select_scenarios(Some("sign-in")).len(), 5);
        assert_eq!(select_scenarios(Some("search")).len(), 1);
        assert_eq!(select_scenarios(None).len(), 7);
        assert!(select_scenarios(Some("nope")).is_empty());
    }

    mod copy_tests {
        use super::*;

        fn case(name: &str) -> NegativeSignIn {
            NegativeSignIn::all()
                .into_iter()
                .find(|c| c.name == name)
                .unwrap()
        }

        fn matches_all(case: &NegativeSignIn, shown: &str) -> bool {
            case.checks().iter().all(|check| match check {
                ErrorCopy::HasText(p) | ErrorCopy::Contains(p) => p.is_match(shown),
                ErrorCopy::ContainsLiteral(t) => shown.contains(t),
            })
        }

        #[test]
        fn test_apostrophe_variants() {
            let empty = case("sign-in-empty-email");
            for shown in [
                "Something's missing. Please check and try again.",
                "Something’s missing. Please check and try again.",
                "Somethingʼs missing . Please check and try again.",
            ] {
                assert!(matches_all(&empty, shown), "{shown}");
            }
        }

        #[test]
        fn test_sql_copy_needs_every_part() {
            let sql = case("sign-in-sql-ish-email");
            let full = "Usernames can only include... Letters, numbers and these characters: ?/|}{+=_-^~`%$#";
            assert!(matches_all(&sql, full));
            assert!(!matches_all(&sql, "Usernames can only include letters"));
        }

        #[test]
        fn test_long_email_username() {
            let long = case("sign-in-long-email");
            assert_eq!(long.username().len(), 255 + "@example.com".len());
            assert!(matches_all(
                &long,
                "Sorry, that email’s too long. It can’t be more than 101 characters."
            ));
        }
    }
}
