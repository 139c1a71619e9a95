//! Configuration management with serde serialization/deserialization
//!
//! This module provides the runner configuration: browser targets, the global
//! viewport map, comparison settings and concurrency ceilings.

use crate::{RunnerError, Viewport, ViewportMap};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration structure for the runner
///
/// # Examples
///
/// ```rust
/// use vizdiff::Config;
///
/// // Use default configuration
/// let config = Config::default();
///
/// // Create custom configuration
/// let config = Config {
///     browsers: vec!["chromium".to_string()],
///     ..Default::default()
/// };
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Root directory for the `base`, `current` and `diff` buckets
    pub screenshot_dir: PathBuf,

    /// Browser targets every discovered case is expanded across
    pub browsers: Vec<String>,

    /// Named viewports handed to test case adapters during discovery
    pub viewports: ViewportMap,

    /// Pixel comparison settings
    pub comparison: ComparisonConfig,

    /// Concurrency ceilings for the capture and compare phases
    pub runtime: RuntimeConfig,

    /// Timeout for a single capture, including navigation and interactions.
    /// Configured as plain seconds, the same unit the `--timeout` flag takes.
    #[serde(with = "duration_secs")]
    pub capture_timeout: Duration,

    /// Path to Chrome/Chromium executable (default: auto-detect)
    pub chrome_path: Option<String>,

    /// Statically configured URL cases served by the built-in test case
    /// adapter. External adapters are registered through the adapter
    /// registry instead.
    pub cases: Vec<StaticCaseConfig>,
}

impl Default for Config {
    fn default() -> Self {
        let mut viewports = ViewportMap::new();
        viewports.insert("default".to_string(), Viewport::default());

        Self {
            screenshot_dir: PathBuf::from("screenshots"),
            browsers: vec!["chromium".to_string()],
            viewports,
            comparison: ComparisonConfig::default(),
            runtime: RuntimeConfig::default(),
            capture_timeout: Duration::from_secs(30),
            chrome_path: None,
            cases: Vec::new(),
        }
    }
}

impl Config {
    /// Validate constraints the pipeline relies on before any browser is
    /// launched.
    pub fn validate(&self) -> Result<(), RunnerError> {
        if self.browsers.is_empty() {
            return Err(RunnerError::Configuration(
                "At least one browser target is required".to_string(),
            ));
        }

        if self.viewports.is_empty() {
            return Err(RunnerError::Configuration(
                "At least one named viewport is required".to_string(),
            ));
        }

        if self.capture_timeout.is_zero() {
            return Err(RunnerError::Configuration(
                "Capture timeout must be greater than 0".to_string(),
            ));
        }

        if self.runtime.max_concurrency.capture_limit() == 0
            || self.runtime.max_concurrency.compare_limit() == 0
        {
            return Err(RunnerError::Configuration(
                "Concurrency limits must be greater than 0".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.comparison.threshold) {
            return Err(RunnerError::Configuration(format!(
                "Comparison threshold must be within 0.0..=1.0, got {}",
                self.comparison.threshold
            )));
        }

        for case in &self.cases {
            for key in &case.viewports {
                if !self.viewports.contains_key(key) {
                    return Err(RunnerError::Configuration(format!(
                        "Case '{}' references unknown viewport '{}'",
                        case.id, key
                    )));
                }
            }
        }

        Ok(())
    }
}

/// Whole-second (de)serialization for timeout fields, so the config file
/// and the CLI flags share one unit.
mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(deserializer)?))
    }
}

/// Pixel comparison settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ComparisonConfig {
    /// Name of the comparison engine to look up in the registry
    pub core: String,

    /// Allowed fraction (0.0..=1.0) of differing pixels before a variant
    /// counts as a pixel diff
    pub threshold: f64,

    /// Highlight color for diff images, `#rrggbb` (default: magenta)
    pub diff_color: Option<String>,
}

impl Default for ComparisonConfig {
    fn default() -> Self {
        Self {
            core: "pixelmatch".to_string(),
            threshold: 0.0,
            diff_color: None,
        }
    }
}

/// Concurrency ceilings for the capture and compare phases
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub max_concurrency: MaxConcurrency,
}

/// A single ceiling shared by both phases, or a separate ceiling per phase
///
/// Accepts either `"max_concurrency": 8` or
/// `"max_concurrency": {"capture": 4, "compare": 16}`.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum MaxConcurrency {
    Single(usize),
    Split { capture: usize, compare: usize },
}

impl MaxConcurrency {
    pub fn capture_limit(&self) -> usize {
        match self {
            MaxConcurrency::Single(n) => *n,
            MaxConcurrency::Split { capture, .. } => *capture,
        }
    }

    pub fn compare_limit(&self) -> usize {
        match self {
            MaxConcurrency::Single(n) => *n,
            MaxConcurrency::Split { compare, .. } => *compare,
        }
    }
}

impl Default for MaxConcurrency {
    fn default() -> Self {
        MaxConcurrency::Single(num_cpus::get().max(1))
    }
}

/// A statically configured URL case for the built-in test case adapter
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct StaticCaseConfig {
    pub id: String,
    pub url: String,

    /// CSS selector to screenshot instead of the whole viewport
    #[serde(default)]
    pub screenshot_target: Option<String>,

    /// Keys into the global viewport map; empty means one `default` variant
    /// without a viewport override
    #[serde(default)]
    pub viewports: Vec<String>,

    #[serde(default)]
    pub threshold: Option<f64>,

    #[serde(default)]
    pub interactions: Vec<crate::Interaction>,

    #[serde(default)]
    pub elements_to_mask: Vec<String>,

    #[serde(default)]
    pub disable_css_injection: bool,
}
