//! Run configuration.
//!
//! Built once at startup from defaults, an optional YAML file, `ATENTO_*`
//! environment variables and CLI flags (in increasing precedence), then
//! shared read-only by every flow.

use crate::readiness::ReadinessOptions;
use crate::result::{AtentoError, AtentoResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Environment variable prefix
pub const ENV_PREFIX: &str = "ATENTO_";

/// Immutable configuration for a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunConfig {
    /// Site origin; relative paths resolve against it
    pub base_url: String,
    /// Auto-wait budget for element actions and assertions
    pub action_timeout_ms: u64,
    /// Budget for navigations
    pub navigation_timeout_ms: u64,
    /// Budget for one flow attempt
    pub test_timeout_ms: u64,
    /// Browser locale
    pub locale: String,
    /// Browser timezone
    pub timezone_id: String,
    /// Extra attempts for a failed flow
    pub retries: u32,
    /// Flows run concurrently
    pub workers: usize,
    /// Viewport width in CSS pixels
    pub viewport_width: u32,
    /// Viewport height in CSS pixels
    pub viewport_height: u32,
    /// Run the browser without a window
    pub headless: bool,
    /// Explicit Chromium executable
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chromium_path: Option<String>,
    /// Quiet period after the load phases of a readiness check
    pub idle_window_ms: u64,
    /// Network-idle budget of a readiness check
    pub settle_max_wait_ms: u64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            base_url: "https://www.bbc.co.uk".to_string(),
            action_timeout_ms: 15_000,
            navigation_timeout_ms: 30_000,
            test_timeout_ms: 60_000,
            locale: "en-GB".to_string(),
            timezone_id: "Europe/London".to_string(),
            retries: 1,
            workers: 4,
            viewport_width: 1280,
            viewport_height: 800,
            headless: true,
            chromium_path: None,
            idle_window_ms: 800,
            settle_max_wait_ms: 10_000,
        }
    }
}

impl RunConfig {
    /// Parse YAML; missing keys take their defaults
    pub fn from_yaml_str(yaml: &str) -> AtentoResult<Self> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml_ng::from_str(yaml)?)
    }

    /// Load a YAML file
    pub fn load(path: impl AsRef<Path>) -> AtentoResult<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml_str(&text)
    }

    /// Render as YAML
    pub fn to_yaml(&self) -> AtentoResult<String> {
        Ok(serde_yaml_ng::to_string(self)?)
    }

    /// Apply `ATENTO_*` variables from the process environment
    pub fn with_process_env(self) -> AtentoResult<Self> {
        self.with_env_overrides(std::env::vars())
    }

    /// Apply `ATENTO_*` overrides from `vars`. Unrelated keys are ignored.
    pub fn with_env_overrides<I, K, V>(mut self, vars: I) -> AtentoResult<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        for (key, value) in vars {
            let Some(name) = key.as_ref().strip_prefix(ENV_PREFIX) else {
                continue;
            };
            let value = value.as_ref().trim();
            match name {
                "BASE_URL" => self.base_url = value.to_string(),
                "WORKERS" => self.workers = parse_env(name, value)?,
                "RETRIES" => self.retries = parse_env(name, value)?,
                "HEADLESS" => self.headless = parse_bool(name, value)?,
                "CHROMIUM_PATH" => {
                    self.chromium_path = (!value.is_empty()).then(|| value.to_string());
                }
                _ => {}
            }
        }
        Ok(self)
    }

    /// Check invariants
    pub fn validate(&self) -> AtentoResult<()> {
        if self.workers == 0 {
            return Err(AtentoError::config("workers must be at least 1"));
        }
        let base = self.base_url.trim();
        if base.is_empty() {
            return Err(AtentoError::config("base_url must not be empty"));
        }
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            return Err(AtentoError::config(format!(
                "base_url must use http or https: {base}"
            )));
        }
        for (key, value) in [
            ("action_timeout_ms", self.action_timeout_ms),
            ("navigation_timeout_ms", self.navigation_timeout_ms),
            ("test_timeout_ms", self.test_timeout_ms),
        ] {
            if value == 0 {
                return Err(AtentoError::config(format!("{key} must be non-zero")));
            }
        }
        if self.viewport_width == 0 || self.viewport_height == 0 {
            return Err(AtentoError::config("viewport dimensions must be non-zero"));
        }
        Ok(())
    }

    /// Resolve `path` against `base_url`. Absolute URLs pass through.
    #[must_use]
    pub fn resolve_url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        let base = self.base_url.trim_end_matches('/');
        if path.is_empty() {
            format!("{base}/")
        } else if path.starts_with('/') {
            format!("{base}{path}")
        } else {
            format!("{base}/{path}")
        }
    }

    /// Action auto-wait budget
    #[must_use]
    pub const fn action_timeout(&self) -> Duration {
        Duration::from_millis(self.action_timeout_ms)
    }

    /// Navigation budget
    #[must_use]
    pub const fn navigation_timeout(&self) -> Duration {
        Duration::from_millis(self.navigation_timeout_ms)
    }

    /// Per-attempt flow budget
    #[must_use]
    pub const fn test_timeout(&self) -> Duration {
        Duration::from_millis(self.test_timeout_ms)
    }

    /// Readiness options derived from this configuration
    #[must_use]
    pub fn readiness_options(&self) -> ReadinessOptions {
        ReadinessOptions::new()
            .with_idle_window(Duration::from_millis(self.idle_window_ms))
            .with_max_wait(Duration::from_millis(self.settle_max_wait_ms))
            .with_navigation_grace(self.navigation_timeout())
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, value: &str) -> AtentoResult<T> {
    value.parse().map_err(|_| {
        AtentoError::config(format!("{ENV_PREFIX}{name}: cannot parse '{value}'"))
    })
}

fn parse_bool(name: &str, value: &str) -> AtentoResult<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(AtentoError::config(format!(
            "{ENV_PREFIX}{name}: expected a boolean, got '{value}'"
        ))),
    }
}
