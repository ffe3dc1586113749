//! Built-in scenarios against an in-memory copy of the site.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use atento::scenarios::{FixturesToday, NegativeSignIn, SearchSports};
use atento::{
    all_scenarios, AtentoError, AtentoResult, Flow, FlowContext, FlowOutcome, FlowRunner,
    FlowStatus, MockPage, PageDriver, Reaction, RunConfig,
};
use std::sync::Arc;

const ORIGIN: &str = "https://mock.test";

fn url(path: &str) -> String {
    format!("{ORIGIN}{path}")
}

fn config() -> RunConfig {
    RunConfig {
        base_url: ORIGIN.to_string(),
        action_timeout_ms: 2_000,
        navigation_timeout_ms: 3_000,
        test_timeout_ms: 60_000,
        idle_window_ms: 100,
        settle_max_wait_ms: 1_000,
        retries: 0,
        workers: 2,
        ..RunConfig::default()
    }
}

const HOME: &str = r#"<header>
  <a href="/signin">Sign in</a>
  <a href="/search">Search BBC</a>
</header>
<main><h1>Home</h1></main>"#;

const SIGN_IN: &str = r#"<form>
  <label for="user-identifier-input">Email or username</label>
  <input id="user-identifier-input" type="email">
  <button id="submit-identifier" type="submit">Continue</button>
</form>"#;

const PASSWORD: &str = r#"<form>
  <input id="password-input" type="password">
  <button id="submit-password" type="submit">Sign in</button>
</form>"#;

fn with_error(form: &str, message: &str, icon: bool) -> String {
    let icon = if icon {
        r#"<svg data-testid="message-danger-icon"></svg>"#
    } else {
        ""
    };
    format!(r#"<div role="alert">{icon}<p>{message}</p></div>{form}"#)
}

fn first_step_reaction(password_appears: bool) -> Reaction {
    Reaction::compute(move |form| {
        let id = form
            .get("user-identifier-input")
            .cloned()
            .unwrap_or_default();
        let error =
            |message: &str, icon: bool| Reaction::Replace(with_error(SIGN_IN, message, icon));
        if id.is_empty() {
            error("Something’s missing. Please check and try again.", true)
        } else if id.len() > 101 {
            error(
                "Sorry, that email’s too long. It can’t be more than 101 characters.",
                true,
            )
        } else if id.contains('\'') {
            error(
                "Usernames can only include... Letters, numbers and these characters: ?/|}{+=_-^~`%$#",
                false,
            )
        } else if !id.contains('@') {
            error(
                "We don’t recognise that email or username. You can try again or register for an account.",
                false,
            )
        } else if password_appears {
            Reaction::Navigate(url("/signin/password"))
        } else {
            Reaction::Replace(SIGN_IN.to_string())
        }
    })
}

fn site(password_appears: bool) -> MockPage {
    MockPage::new()
        .with_route(url("/"), HOME)
        .with_route(url("/signin"), SIGN_IN)
        .with_route(url("/signin/password"), PASSWORD)
        .with_route(
            url("/search"),
            r#"<input type="search" id="search-input" placeholder="Search BBC">"#,
        )
        .with_route(
            url("/search?q=sports"),
            r#"<h2>Results</h2>
               <div data-testid="default-promo"><a href="/news/1" aria-label="Sports Personality 2025">x</a></div>
               <div data-testid="default-promo"><p class="ssrcss-PromoHeadline-1">Sports news round-up</p></div>
               <div data-testid="default-promo"><h3>Sports news  round-up</h3></div>"#,
        )
        .with_route(
            url("/sport/football/scores-fixtures"),
            r#"<nav><a href="/sport/football/scores-fixtures/today">Today</a></nav>"#,
        )
        .with_route(
            url("/sport/football/scores-fixtures/today"),
            r#"<ul>
                 <li><div class="ssrcss-TeamNameWrapper-a"><span>Team A</span><span aria-hidden="true">TA</span></div>
                     <div class="ssrcss-MatchProgressContainer-b"><span>2</span></div>
                     <div class="ssrcss-TeamNameWrapper-a"><span>Team B</span></div></li>
                 <li><div class="ssrcss-TeamNameWrapper-a"><span>Team A </span></div></li>
               </ul>"#,
        )
        .on_click("#submit-identifier", first_step_reaction(password_appears))
        .on_click(
            "#submit-password",
            Reaction::compute(|form| {
                let password = form.get("password-input").cloned().unwrap_or_default();
                let message = if password.is_empty() {
                    "Please enter your password."
                } else {
                    "Sorry, that password isn’t valid."
                };
                Reaction::Replace(with_error(PASSWORD, message, false))
            }),
        )
        .on_enter(
            "#search-input",
            Reaction::compute(|form| {
                let term = form.get("search-input").cloned().unwrap_or_default();
                Reaction::Navigate(url(&format!("/search?q={term}")))
            }),
        )
}

async fn run(flow: &dyn Flow, page: &MockPage) -> AtentoResult<FlowOutcome> {
    let config = config();
    let ctx = FlowContext::new(page, &config);
    flow.run(&ctx).await
}

mod fixtures {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_team_names_deduplicated_after_today_click() {
        let page = site(true);
        let outcome = run(&FixturesToday, &page).await.unwrap();
        assert_eq!(
            outcome,
            FlowOutcome::passed_with(vec!["Team A".to_string(), "Team B".to_string()])
        );
        assert_eq!(
            page.current_url().await.unwrap(),
            url("/sport/football/scores-fixtures/today")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_fixtures_notice_is_neutral() {
        let page = MockPage::new().with_route(
            url("/sport/football/scores-fixtures"),
            "<main><section><p>There are no fixtures for this date</p></section></main>",
        );
        let outcome = run(&FixturesToday, &page).await.unwrap();
        assert!(outcome.is_neutral());
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_team_list_is_neutral() {
        let page = MockPage::new().with_route(
            url("/sport/football/scores-fixtures"),
            "<main><p>Fixtures are loading</p></main>",
        );
        let outcome = run(&FixturesToday, &page).await.unwrap();
        match outcome {
            FlowOutcome::Neutral { notice } => assert!(notice.contains("no team names")),
            other => panic!("expected neutral, got {other:?}"),
        }
    }
}

mod search {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_first_and_last_headline() {
        let page = site(true);
        let outcome = run(&SearchSports, &page).await.unwrap();
        assert_eq!(
            outcome,
            FlowOutcome::passed_with(vec![
                "first: Sports Personality 2025".to_string(),
                "last: Sports news round-up".to_string(),
                "2 unique headlines".to_string(),
            ])
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_results_fails() {
        let page = site(true).with_route(url("/search?q=sports"), "<h2>No results</h2>");
        let err = run(&SearchSports, &page).await.unwrap_err();
        assert!(matches!(
            err,
            AtentoError::RequiredElementTimeout { ref descriptor, .. } if descriptor == "result headline"
        ));
    }
}

mod sign_in {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_every_negative_case_passes() {
        for flow in NegativeSignIn::all() {
            let page = site(true);
            let outcome = run(&flow, &page).await;
            assert!(outcome.is_ok(), "{}: {:?}", flow.name(), outcome);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_password_never_appears() {
        let flow = NegativeSignIn::all()
            .into_iter()
            .find(|f| f.name() == "sign-in-empty-password")
            .unwrap();
        let page = site(false);
        let err = run(&flow, &page).await.unwrap_err();
        match err {
            AtentoError::RequiredElementTimeout {
                descriptor,
                elapsed_ms,
            } => {
                assert_eq!(descriptor, "password input");
                assert!(elapsed_ms >= 2_000);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_wrong_copy_is_a_mismatch() {
        let flow = NegativeSignIn::all()
            .into_iter()
            .find(|f| f.name() == "sign-in-malformed-email")
            .unwrap();
        let page = MockPage::new()
            .with_route(url("/"), HOME)
            .with_route(url("/signin"), SIGN_IN)
            .on_click(
                "#submit-identifier",
                Reaction::Replace(with_error(SIGN_IN, "Something went wrong.", false)),
            );
        let err = run(&flow, &page).await.unwrap_err();
        match err {
            AtentoError::AssertionMismatch { actual, .. } => {
                assert!(actual.contains("Something went wrong."));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_consent_banner_dismissed_before_sign_in() {
        let banner_home = format!(
            r#"<div id="consent"><button id="accept">Yes, I agree. Accept additional cookies</button></div>{HOME}"#
        );
        let page = MockPage::new()
            .with_route(url("/"), banner_home)
            .with_route(url("/signin"), SIGN_IN)
            .on_click("#accept", Reaction::Replace(HOME.to_string()));
        let flow = NegativeSignIn::all().remove(0);
        // The first-step button has no reaction here, so no error appears.
        let err = run(&flow, &page).await.unwrap_err();
        assert!(page.was_called("click:button#accept"));
        assert!(matches!(err, AtentoError::RequiredElementTimeout { ref descriptor, .. } if descriptor == "error region"));
    }
}

mod runner {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_all_scenarios_pass_on_a_healthy_site() {
        let factory =
            |_: &RunConfig| -> AtentoResult<Box<dyn PageDriver>> { Ok(Box::new(site(true))) };
        let runner = FlowRunner::new(Arc::new(config()), Arc::new(factory));
        let summary = runner.run_all(all_scenarios()).await;
        for report in &summary.reports {
            assert!(report.status.is_pass(), "{report:?}");
        }
        assert_eq!(summary.total(), 7);
        assert!(summary.all_passed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_broken_flow_does_not_affect_siblings() {
        let factory =
            |_: &RunConfig| -> AtentoResult<Box<dyn PageDriver>> { Ok(Box::new(site(false))) };
        let runner = FlowRunner::new(Arc::new(config()), Arc::new(factory));
        let summary = runner.run_all(all_scenarios()).await;
        let failed: Vec<&str> = summary.failures().iter().map(|r| r.name.as_str()).collect();
        assert_eq!(failed, vec!["sign-in-empty-password"]);
        assert_eq!(summary.failed_count(), 1);
        assert!(summary
            .reports
            .iter()
            .filter(|r| r.name != "sign-in-empty-password")
            .all(|r| r.status == FlowStatus::Passed));
    }
}
