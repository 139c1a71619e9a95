//! Capability interfaces for the pluggable pieces of the pipeline, plus the
//! static adapter registry resolved once at startup.

use crate::{
    CaptureOptions, Config, RunnerError, ScreenshotKind, ScreenshotResult, StaticCaseConfig,
    TestCaseInstance, ViewportMap,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

/// An open page handed to test case adapters during discovery.
#[async_trait]
pub trait PageHandle: Send + Sync {
    fn url(&self) -> &str;

    async fn close(&self) -> Result<(), RunnerError>;
}

/// Drives one browser family. Created lazily by the browser adapter pool,
/// which owns disposal.
#[async_trait]
pub trait BrowserAdapter: Send + Sync {
    async fn init(
        &self,
        browser: &str,
        viewport: Option<&crate::Viewport>,
    ) -> Result<(), RunnerError>;

    async fn open_page(&self, url: &str) -> Result<Box<dyn PageHandle>, RunnerError>;

    async fn capture(&self, opts: &CaptureOptions) -> Result<ScreenshotResult, RunnerError>;

    async fn dispose(&self) -> Result<(), RunnerError>;
}

/// Startup information returned by a test case adapter.
#[derive(Debug, Clone, Default)]
pub struct AdapterStartup {
    pub base_url: Option<String>,
    pub initial_page_url: Option<String>,
}

impl AdapterStartup {
    /// The URL discovery opens before listing cases. `initial_page_url`
    /// takes precedence over `base_url`.
    pub fn page_url(&self) -> Option<&str> {
        self.initial_page_url
            .as_deref()
            .or(self.base_url.as_deref())
    }
}

/// Context passed to `list_cases`.
#[derive(Debug, Clone)]
pub struct DiscoveryContext {
    pub viewports: ViewportMap,
}

/// Enumerates renderable cases (stories, URLs) for discovery.
#[async_trait]
pub trait TestCaseAdapter: Send + Sync {
    fn name(&self) -> &str;

    async fn start(&self) -> Result<AdapterStartup, RunnerError> {
        Ok(AdapterStartup::default())
    }

    async fn list_cases(
        &self,
        page: Option<&dyn PageHandle>,
        ctx: &DiscoveryContext,
    ) -> Result<Vec<TestCaseInstance>, RunnerError>;

    async fn stop(&self) -> Result<(), RunnerError> {
        Ok(())
    }
}

/// Screenshot persistence keyed by `(kind, filename)`.
#[async_trait]
pub trait StorageAdapter: Send + Sync {
    async fn write(
        &self,
        kind: ScreenshotKind,
        filename: &str,
        bytes: &[u8],
    ) -> Result<(), RunnerError>;

    async fn read(&self, kind: ScreenshotKind, filename: &str) -> Result<Vec<u8>, RunnerError>;

    async fn readable_path(
        &self,
        kind: ScreenshotKind,
        filename: &str,
    ) -> Result<PathBuf, RunnerError>;

    async fn exists(&self, kind: ScreenshotKind, filename: &str) -> Result<bool, RunnerError>;

    async fn list(&self, kind: ScreenshotKind) -> Result<Vec<String>, RunnerError>;

    async fn cleanup(&self) -> Result<(), RunnerError> {
        Ok(())
    }
}

pub type BrowserAdapterFactory = Arc<dyn Fn() -> Arc<dyn BrowserAdapter> + Send + Sync>;

/// Static name→factory registry for browser adapters plus the ordered list
/// of test case adapters. Resolved once at startup; no dynamic module
/// loading.
#[derive(Default)]
pub struct AdapterRegistry {
    browsers: HashMap<String, BrowserAdapterFactory>,
    case_adapters: Vec<Arc<dyn TestCaseAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-populated with the built-in chromium adapter and, when
    /// the config carries static URL cases, the built-in case adapter.
    pub fn with_builtins(config: &Config) -> Self {
        let mut registry = Self::new();

        let options = crate::ChromiumOptions::from_config(config);
        registry.register_browser("chromium", move || {
            Arc::new(crate::ChromiumAdapter::new(options.clone())) as Arc<dyn BrowserAdapter>
        });

        if !config.cases.is_empty() {
            registry.register_case_adapter(Arc::new(StaticUrlAdapter::new(config.cases.clone())));
        }

        registry
    }

    pub fn register_browser<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn() -> Arc<dyn BrowserAdapter> + Send + Sync + 'static,
    {
        self.browsers.insert(name.into(), Arc::new(factory));
    }

    pub fn register_case_adapter(&mut self, adapter: Arc<dyn TestCaseAdapter>) {
        self.case_adapters.push(adapter);
    }

    pub fn browser_factory(&self, name: &str) -> Option<BrowserAdapterFactory> {
        self.browsers.get(name).cloned()
    }

    pub fn case_adapters(&self) -> &[Arc<dyn TestCaseAdapter>] {
        &self.case_adapters
    }
}

/// Built-in test case adapter serving URL cases straight from the config.
pub struct StaticUrlAdapter {
    cases: Vec<StaticCaseConfig>,
}

impl StaticUrlAdapter {
    pub fn new(cases: Vec<StaticCaseConfig>) -> Self {
        Self { cases }
    }
}

#[async_trait]
impl TestCaseAdapter for StaticUrlAdapter {
    fn name(&self) -> &str {
        "urls"
    }

    async fn start(&self) -> Result<AdapterStartup, RunnerError> {
        // Static cases need no in-page extraction; discovery still gets a
        // page to open.
        Ok(AdapterStartup {
            base_url: None,
            initial_page_url: Some("about:blank".to_string()),
        })
    }

    async fn list_cases(
        &self,
        _page: Option<&dyn PageHandle>,
        ctx: &DiscoveryContext,
    ) -> Result<Vec<TestCaseInstance>, RunnerError> {
        let mut instances = Vec::new();

        for case in &self.cases {
            let variants: Vec<(String, Option<crate::Viewport>)> = if case.viewports.is_empty() {
                vec![("default".to_string(), None)]
            } else {
                case.viewports
                    .iter()
                    .map(|key| {
                        let viewport = ctx.viewports.get(key).cloned().ok_or_else(|| {
                            RunnerError::Configuration(format!(
                                "Case '{}' references unknown viewport '{}'",
                                case.id, key
                            ))
                        })?;
                        Ok((key.clone(), Some(viewport)))
                    })
                    .collect::<Result<Vec<_>, RunnerError>>()?
            };

            for (key, viewport) in variants {
                let mut instance = TestCaseInstance::new(&case.id, &key, &case.url);
                instance.screenshot_target = case.screenshot_target.clone();
                instance.viewport_key = viewport.is_some().then(|| key.clone());
                instance.viewport = viewport;
                instance.threshold = case.threshold;
                instance.interactions = case.interactions.clone();
                instance.elements_to_mask = case.elements_to_mask.clone();
                instance.disable_css_injection = case.disable_css_injection;
                instances.push(instance);
            }
        }

        Ok(instances)
    }
}
