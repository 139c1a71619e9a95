//! Core data model: test cases, variants, viewports and capture results.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Storage bucket a screenshot belongs to.
///
/// Baselines persist across runs as human-curated ground truth; `current`
/// and `diff` are regenerated on every test run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScreenshotKind {
    Base,
    Current,
    Diff,
}

impl ScreenshotKind {
    pub fn dir_name(&self) -> &'static str {
        match self {
            ScreenshotKind::Base => "base",
            ScreenshotKind::Current => "current",
            ScreenshotKind::Diff => "diff",
        }
    }
}

/// Which bucket a run writes its captures to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Capture into `current` and compare against `base`.
    Test,
    /// Capture straight into `base`, accepting the result as the new baseline.
    Update,
}

impl RunMode {
    pub fn capture_kind(&self) -> ScreenshotKind {
        match self {
            RunMode::Test => ScreenshotKind::Current,
            RunMode::Update => ScreenshotKind::Base,
        }
    }
}

/// Browser viewport used when rendering a case
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    /// Viewport width in pixels
    pub width: u32,

    /// Viewport height in pixels
    pub height: u32,

    /// Device pixel ratio for high-DPI displays (default: 1.0)
    #[serde(default = "default_scale_factor")]
    pub device_scale_factor: f64,
}

fn default_scale_factor() -> f64 {
    1.0
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
            device_scale_factor: 1.0,
        }
    }
}

/// Named viewports, handed to test case adapters during discovery.
pub type ViewportMap = BTreeMap<String, Viewport>;

/// Interaction step executed on the page before the screenshot is taken.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "kebab-case")]
pub enum Interaction {
    Click { selector: String },
    Hover { selector: String },
    Type { selector: String, text: String },
    /// Sleep for a fixed number of milliseconds.
    Wait { ms: u64 },
    /// Poll until the selector resolves to an element.
    WaitFor { selector: String },
}

/// A single renderable case variant.
///
/// Produced by the discovery engine and consumed once by the capture
/// executor. After expansion `(case_id, variant_id)` is unique across the
/// run and `browser` is always populated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestCaseInstance {
    pub case_id: String,
    pub variant_id: String,
    pub url: String,

    /// CSS selector to screenshot instead of the whole viewport.
    #[serde(default)]
    pub screenshot_target: Option<String>,

    #[serde(default)]
    pub viewport: Option<Viewport>,

    /// Name of the viewport entry this variant was expanded from, if any.
    #[serde(default)]
    pub viewport_key: Option<String>,

    /// Browser target; set during discovery expansion.
    #[serde(default)]
    pub browser: Option<String>,

    /// Per-case override of the global comparison threshold.
    #[serde(default)]
    pub threshold: Option<f64>,

    #[serde(default)]
    pub interactions: Vec<Interaction>,

    /// Selectors hidden via injected CSS before capture.
    #[serde(default)]
    pub elements_to_mask: Vec<String>,

    #[serde(default)]
    pub disable_css_injection: bool,
}

impl TestCaseInstance {
    pub fn new(
        case_id: impl Into<String>,
        variant_id: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        Self {
            case_id: case_id.into(),
            variant_id: variant_id.into(),
            url: url.into(),
            screenshot_target: None,
            viewport: None,
            viewport_key: None,
            browser: None,
            threshold: None,
            interactions: Vec::new(),
            elements_to_mask: Vec::new(),
            disable_css_injection: false,
        }
    }

    pub fn id(&self) -> String {
        format!("{}-{}", self.case_id, self.variant_id)
    }

    /// Filename convention shared by all three storage buckets.
    pub fn screenshot_filename(&self) -> String {
        format!("{}-{}.png", self.case_id, self.variant_id)
    }
}

/// Options handed to `BrowserAdapter::capture` for one variant.
#[derive(Debug, Clone)]
pub struct CaptureOptions {
    pub id: String,
    pub url: String,
    pub screenshot_target: Option<String>,
    pub viewport: Option<Viewport>,
    pub viewport_key: Option<String>,
    pub disable_css_injection: bool,
    pub interactions: Vec<Interaction>,
    pub elements_to_mask: Vec<String>,
}

impl CaptureOptions {
    pub fn for_case(case: &TestCaseInstance) -> Self {
        Self {
            id: case.id(),
            url: case.url.clone(),
            screenshot_target: case.screenshot_target.clone(),
            viewport: case.viewport.clone(),
            viewport_key: case.viewport_key.clone(),
            disable_css_injection: case.disable_css_injection,
            interactions: case.interactions.clone(),
            elements_to_mask: case.elements_to_mask.clone(),
        }
    }
}

/// Raw capture output. The buffer is owned transiently and dropped as soon
/// as the bytes have been persisted.
#[derive(Debug)]
pub struct ScreenshotResult {
    pub buffer: Vec<u8>,
    pub meta: ScreenshotMeta,
}

#[derive(Debug, Clone)]
pub struct ScreenshotMeta {
    pub id: String,
    pub elapsed: Duration,
    pub viewport_key: Option<String>,
}
