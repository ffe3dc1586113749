//! Wait primitives.
//!
//! Two flavours of waiting live here:
//!
//! - **Best effort** ([`best_effort`]): the wait never fails. Its result is a
//!   [`WaitOutcome`] carrying what happened and how long it took, and the
//!   caller decides whether a timeout matters at that call site.
//! - **Polling** ([`poll_until`]): re-run a probe until it yields a value or
//!   the budget runs out. Stale node references are treated as "not yet" and
//!   retried; any other driver error ends the poll.
//!
//! Neither ever blocks without a bound.

use crate::result::{AtentoError, AtentoResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

// =============================================================================
// CONSTANTS
// =============================================================================

/// Default polling interval (100ms)
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

// =============================================================================
// BEST-EFFORT WAITS
// =============================================================================

/// How a best-effort wait ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WaitStatus {
    /// The awaited condition was reached
    Satisfied,
    /// The budget ran out first
    TimedOut,
    /// The driver reported an error, swallowed here
    Failed(String),
}

/// Result of a best-effort wait
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitOutcome {
    /// How the wait ended
    pub status: WaitStatus,
    /// Time spent waiting
    pub elapsed: Duration,
    /// Description of what was waited for
    pub waited_for: String,
}

impl WaitOutcome {
    /// Create a satisfied outcome
    #[must_use]
    pub fn satisfied(elapsed: Duration, waited_for: impl Into<String>) -> Self {
        Self {
            status: WaitStatus::Satisfied,
            elapsed,
            waited_for: waited_for.into(),
        }
    }

    /// Create a timed-out outcome
    #[must_use]
    pub fn timed_out(elapsed: Duration, waited_for: impl Into<String>) -> Self {
        Self {
            status: WaitStatus::TimedOut,
            elapsed,
            waited_for: waited_for.into(),
        }
    }

    /// Whether the condition was reached
    #[must_use]
    pub const fn is_satisfied(&self) -> bool {
        matches!(self.status, WaitStatus::Satisfied)
    }

    /// Elapsed time in whole milliseconds
    #[must_use]
    pub fn elapsed_ms(&self) -> u64 {
        self.elapsed.as_millis() as u64
    }

    /// Escalate: anything but [`WaitStatus::Satisfied`] becomes a
    /// required-element timeout naming `descriptor`.
    pub fn required(self, descriptor: &str) -> AtentoResult<Duration> {
        if self.is_satisfied() {
            Ok(self.elapsed)
        } else {
            Err(AtentoError::RequiredElementTimeout {
                descriptor: descriptor.to_string(),
                elapsed_ms: self.elapsed_ms(),
            })
        }
    }
}

impl fmt::Display for WaitOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = match &self.status {
            WaitStatus::Satisfied => "satisfied".to_string(),
            WaitStatus::TimedOut => "timed out".to_string(),
            WaitStatus::Failed(reason) => format!("failed ({reason})"),
        };
        write!(
            f,
            "{} {status} after {}ms",
            self.waited_for,
            self.elapsed_ms()
        )
    }
}

/// Run `wait` under `timeout` and report how it went. Never fails.
///
/// The timer is applied here as well as by whatever the driver does with its
/// own timeout argument, so a driver that ignores its timeout still cannot
/// stretch the wait.
pub async fn best_effort<T, F>(waited_for: &str, timeout: Duration, wait: F) -> WaitOutcome
where
    F: Future<Output = AtentoResult<T>>,
{
    let start = Instant::now();
    let result = tokio::time::timeout(timeout, wait).await;
    let elapsed = start.elapsed();
    let outcome = match result {
        Ok(Ok(_)) => WaitOutcome::satisfied(elapsed, waited_for),
        Ok(Err(e)) if e.is_timeout() => WaitOutcome::timed_out(elapsed, waited_for),
        Ok(Err(e)) => WaitOutcome {
            status: WaitStatus::Failed(e.to_string()),
            elapsed,
            waited_for: waited_for.to_string(),
        },
        Err(_) => WaitOutcome::timed_out(elapsed, waited_for),
    };
    debug!(%outcome, "best-effort wait");
    outcome
}

// =============================================================================
// POLLING
// =============================================================================

/// Polling budget
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollConfig {
    /// Total time allowed
    pub timeout: Duration,
    /// Pause between probes
    pub interval: Duration,
}

impl PollConfig {
    /// Poll for up to `timeout` at the default interval
    #[must_use]
    pub const fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Set the poll interval
    #[must_use]
    pub const fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }
}

/// Result of [`poll_until`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Polled<T> {
    /// The probe produced a value
    Ready {
        /// Produced value
        value: T,
        /// Time until it did
        elapsed: Duration,
    },
    /// The budget ran out
    Expired {
        /// Time spent polling
        elapsed: Duration,
    },
}

/// Re-run `probe` until it returns `Some`, or until the budget is spent.
///
/// The probe always runs at least once, even with a zero timeout.
pub async fn poll_until<T, F, Fut>(config: PollConfig, mut probe: F) -> AtentoResult<Polled<T>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = AtentoResult<Option<T>>>,
{
    let start = Instant::now();
    let deadline = start + config.timeout;
    loop {
        match probe().await {
            Ok(Some(value)) => {
                return Ok(Polled::Ready {
                    value,
                    elapsed: start.elapsed(),
                })
            }
            Ok(None) => {}
            Err(e) if e.is_stale() => debug!("stale node while polling, retrying"),
            Err(e) => return Err(e),
        }
        let now = Instant::now();
        if now >= deadline {
            return Ok(Polled::Expired {
                elapsed: start.elapsed(),
            });
        }
        tokio::time::sleep(config.interval.min(deadline - now)).await;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    mod outcome_tests {
        use super::*;

        #[test]
        fn test_required_passes_through_satisfied() {
            let outcome = WaitOutcome::satisfied(Duration::from_millis(40), "email input");
            assert_eq!(outcome.required("email input").unwrap(), Duration::from_millis(40));
        }

        #[test]
        fn test_required_escalates_timeout() {
            let outcome = WaitOutcome::timed_out(Duration::from_millis(5000), "password input");
            let err = outcome.required("password input").unwrap_err();
            match err {
                AtentoError::RequiredElementTimeout {
                    descriptor,
                    elapsed_ms,
                } => {
                    assert_eq!(descriptor, "password input");
                    assert_eq!(elapsed_ms, 5000);
                }
                other => panic!("unexpected error: {other}"),
            }
        }

        #[test]
        fn test_display() {
            let outcome = WaitOutcome::timed_out(Duration::from_millis(250), "networkidle");
            assert_eq!(outcome.to_string(), "networkidle timed out after 250ms");
        }
    }

    mod best_effort_tests {
        use super::*;

        #[tokio::test(start_paused = true)]
        async fn test_satisfied() {
            let outcome = best_effort("quick", Duration::from_secs(1), async {
                tokio::time::sleep(Duration::from_millis(10)).await;
                Ok::<_, AtentoError>(())
            })
            .await;
            assert!(outcome.is_satisfied());
        }

        #[tokio::test(start_paused = true)]
        async fn test_outer_timer_bounds_stuck_wait() {
            let outcome = best_effort("stuck", Duration::from_millis(300), async {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok::<_, AtentoError>(())
            })
            .await;
            assert_eq!(outcome.status, WaitStatus::TimedOut);
            assert!(outcome.elapsed <= Duration::from_millis(301));
        }

        #[tokio::test]
        async fn test_driver_timeout_maps_to_timed_out() {
            let outcome = best_effort("driver", Duration::from_secs(1), async {
                Err::<(), _>(AtentoError::Timeout { ms: 10 })
            })
            .await;
            assert_eq!(outcome.status, WaitStatus::TimedOut);
        }

        #[tokio::test]
        async fn test_driver_error_is_swallowed() {
            let outcome = best_effort("driver", Duration::from_secs(1), async {
                Err::<(), _>(AtentoError::page("target closed"))
            })
            .await;
            assert!(matches!(outcome.status, WaitStatus::Failed(ref m) if m.contains("target closed")));
        }
    }

    mod poll_tests {
        use super::*;

        #[tokio::test(start_paused = true)]
        async fn test_ready_after_a_few_probes() {
            let calls = AtomicUsize::new(0);
            let calls_ref = &calls;
            let polled = poll_until(PollConfig::new(Duration::from_secs(1)), || async move {
                let n = calls_ref.fetch_add(1, Ordering::SeqCst);
                Ok((n >= 2).then_some(n))
            })
            .await
            .unwrap();
            assert!(matches!(polled, Polled::Ready { value: 2, .. }));
        }

        #[tokio::test(start_paused = true)]
        async fn test_expires() {
            let polled = poll_until(PollConfig::new(Duration::from_millis(350)), || async {
                Ok::<Option<()>, AtentoError>(None)
            })
            .await
            .unwrap();
            match polled {
                Polled::Expired { elapsed } => assert!(elapsed >= Duration::from_millis(350)),
                Polled::Ready { .. } => panic!("should expire"),
            }
        }

        #[tokio::test]
        async fn test_zero_timeout_probes_once() {
            let polled = poll_until(PollConfig::new(Duration::ZERO), || async {
                Ok::<_, AtentoError>(Some(7))
            })
            .await
            .unwrap();
            assert!(matches!(polled, Polled::Ready { value: 7, .. }));
        }

        #[tokio::test(start_paused = true)]
        async fn test_stale_is_retried_other_errors_propagate() {
            let calls = AtomicUsize::new(0);
            let calls_ref = &calls;
            let polled = poll_until(PollConfig::new(Duration::from_secs(1)), || async move {
                if calls_ref.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(AtentoError::StaleElement {
                        document: 1,
                        index: 0,
                    })
                } else {
                    Ok(Some(()))
                }
            })
            .await
            .unwrap();
            assert!(matches!(polled, Polled::Ready { .. }));

            let err = poll_until(PollConfig::new(Duration::from_secs(1)), || async {
                Err::<Option<()>, _>(AtentoError::page("detached"))
            })
            .await
            .unwrap_err();
            assert!(matches!(err, AtentoError::Page { .. }));
        }
    }
}
