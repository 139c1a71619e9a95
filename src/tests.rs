#[cfg(test)]
mod integration_tests {
    use crate::{
        AdapterRegistry, AdapterStartup, BrowserAdapter, CaptureOptions, CaseStatus, Config,
        DiscoveryContext, EngineRegistry, FsStorage, PageHandle, RunMode, Runner, RunnerError,
        ScreenshotMeta, ScreenshotResult, StorageAdapter, TestCaseAdapter, TestCaseInstance,
    };
    use async_trait::async_trait;
    use image::{DynamicImage, Rgba, RgbaImage};
    use std::collections::HashSet;
    use std::io::Cursor;
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("vizdiff-it-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn png_bytes(color: [u8; 4]) -> Vec<u8> {
        let img = RgbaImage::from_pixel(8, 8, Rgba(color));
        let mut bytes = Vec::new();
        DynamicImage::ImageRgba8(img)
            .write_to(&mut Cursor::new(&mut bytes), image::ImageOutputFormat::Png)
            .unwrap();
        bytes
    }

    struct MockPage {
        url: String,
    }

    #[async_trait]
    impl PageHandle for MockPage {
        fn url(&self) -> &str {
            &self.url
        }

        async fn close(&self) -> Result<(), RunnerError> {
            Ok(())
        }
    }

    /// In-memory browser adapter producing solid-color PNGs.
    struct MockBrowser {
        color: Mutex<[u8; 4]>,
        fail_ids: HashSet<String>,
        capture_delay: Option<Duration>,
        disposals: AtomicUsize,
    }

    impl MockBrowser {
        fn new() -> Self {
            Self {
                color: Mutex::new([10, 20, 30, 255]),
                fail_ids: HashSet::new(),
                capture_delay: None,
                disposals: AtomicUsize::new(0),
            }
        }

        fn failing_on(mut self, id: &str) -> Self {
            self.fail_ids.insert(id.to_string());
            self
        }

        fn with_capture_delay(mut self, delay: Duration) -> Self {
            self.capture_delay = Some(delay);
            self
        }

        fn set_color(&self, color: [u8; 4]) {
            *self.color.lock().unwrap() = color;
        }

        fn disposal_count(&self) -> usize {
            self.disposals.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl BrowserAdapter for MockBrowser {
        async fn init(
            &self,
            _browser: &str,
            _viewport: Option<&crate::Viewport>,
        ) -> Result<(), RunnerError> {
            Ok(())
        }

        async fn open_page(&self, url: &str) -> Result<Box<dyn PageHandle>, RunnerError> {
            Ok(Box::new(MockPage {
                url: url.to_string(),
            }))
        }

        async fn capture(&self, opts: &CaptureOptions) -> Result<ScreenshotResult, RunnerError> {
            if let Some(delay) = self.capture_delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail_ids.contains(&opts.id) {
                return Err(RunnerError::Capture(format!(
                    "simulated render failure for {}",
                    opts.id
                )));
            }
            let color = *self.color.lock().unwrap();
            Ok(ScreenshotResult {
                buffer: png_bytes(color),
                meta: ScreenshotMeta {
                    id: opts.id.clone(),
                    elapsed: Duration::from_millis(1),
                    viewport_key: opts.viewport_key.clone(),
                },
            })
        }

        async fn dispose(&self) -> Result<(), RunnerError> {
            self.disposals.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct MockCaseAdapter {
        name: &'static str,
        cases: Vec<TestCaseInstance>,
    }

    #[async_trait]
    impl TestCaseAdapter for MockCaseAdapter {
        fn name(&self) -> &str {
            self.name
        }

        async fn start(&self) -> Result<AdapterStartup, RunnerError> {
            Ok(AdapterStartup {
                base_url: None,
                initial_page_url: Some("about:blank".to_string()),
            })
        }

        async fn list_cases(
            &self,
            _page: Option<&dyn PageHandle>,
            _ctx: &DiscoveryContext,
        ) -> Result<Vec<TestCaseInstance>, RunnerError> {
            Ok(self.cases.clone())
        }
    }

    fn test_config(dir: &Path) -> Config {
        let mut config = Config::default();
        config.screenshot_dir = dir.to_path_buf();
        config
    }

    fn build_runner(
        config: Config,
        browser: Arc<MockBrowser>,
        cases: Vec<TestCaseInstance>,
    ) -> Runner {
        let mut registry = AdapterRegistry::new();
        let shared = Arc::clone(&browser);
        registry.register_browser("chromium", move || {
            Arc::clone(&shared) as Arc<dyn BrowserAdapter>
        });
        registry.register_case_adapter(Arc::new(MockCaseAdapter {
            name: "mock",
            cases,
        }));

        let storage: Arc<dyn StorageAdapter> =
            Arc::new(FsStorage::new(config.screenshot_dir.clone()));
        Runner::with_parts(
            config,
            Arc::new(registry),
            Arc::new(EngineRegistry::with_builtins()),
            storage,
        )
    }

    #[tokio::test]
    async fn test_update_then_test_passes() {
        let dir = temp_dir();
        let browser = Arc::new(MockBrowser::new());
        let cases = vec![
            TestCaseInstance::new("button", "default", "http://localhost/button"),
            TestCaseInstance::new("card", "default", "http://localhost/card"),
        ];
        let runner = build_runner(test_config(&dir), Arc::clone(&browser), cases);

        let update = runner.run(RunMode::Update).await.unwrap();
        assert_eq!(update.total, 2);
        assert_eq!(update.capture_failures, 0);
        assert!(update.is_success());

        let outcome = runner.run(RunMode::Test).await.unwrap();
        assert_eq!(outcome.total, 2);
        assert_eq!(outcome.passed, 2);
        assert_eq!(outcome.failures(), 0);
        assert!(outcome.is_success());
        for detail in &outcome.test_cases {
            assert_eq!(detail.status, CaseStatus::Passed);
            assert_eq!(detail.browser.as_deref(), Some("chromium"));
        }

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_pixel_diff_writes_diff_and_fails_run() {
        let dir = temp_dir();
        let browser = Arc::new(MockBrowser::new());
        let cases = vec![TestCaseInstance::new(
            "hero",
            "default",
            "http://localhost/hero",
        )];
        let runner = build_runner(test_config(&dir), Arc::clone(&browser), cases);

        runner.run(RunMode::Update).await.unwrap();
        browser.set_color([200, 0, 0, 255]);
        let outcome = runner.run(RunMode::Test).await.unwrap();

        assert_eq!(outcome.failed_diffs, 1);
        assert!(!outcome.is_success());
        let detail = &outcome.test_cases[0];
        assert_eq!(detail.status, CaseStatus::FailedDiff);
        assert_eq!(detail.diff_percentage, Some(100.0));
        assert!(dir.join("diff").join("hero-default-chromium.png").exists());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_capture_failure_never_reported_as_missing_current() {
        let dir = temp_dir();
        let browser = Arc::new(MockBrowser::new().failing_on("broken-default-chromium"));
        let cases = vec![
            TestCaseInstance::new("broken", "default", "http://localhost/broken"),
            TestCaseInstance::new("fine", "default", "http://localhost/fine"),
        ];
        let runner = build_runner(test_config(&dir), Arc::clone(&browser), cases);

        runner.run(RunMode::Update).await.unwrap();
        let outcome = runner.run(RunMode::Test).await.unwrap();

        assert_eq!(outcome.total, 2);
        assert_eq!(outcome.capture_failures, 1);
        assert_eq!(outcome.failed_missing_current, 0);
        assert!(!outcome.is_success());

        let broken = outcome
            .test_cases
            .iter()
            .find(|d| d.id == "broken-default-chromium")
            .unwrap();
        assert_eq!(broken.status, CaseStatus::CaptureFailed);
        assert!(broken.reason.is_none());
        assert!(broken.error.is_some());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_missing_base_reported_without_prior_update() {
        let dir = temp_dir();
        let browser = Arc::new(MockBrowser::new());
        let cases = vec![TestCaseInstance::new(
            "fresh",
            "default",
            "http://localhost/fresh",
        )];
        let runner = build_runner(test_config(&dir), browser, cases);

        let outcome = runner.run(RunMode::Test).await.unwrap();
        assert_eq!(outcome.failed_missing_base, 1);
        assert_eq!(outcome.test_cases[0].status, CaseStatus::FailedMissingBase);
        assert!(!outcome.is_success());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_capture_timeout_becomes_failure_record() {
        let dir = temp_dir();
        let browser = Arc::new(MockBrowser::new().with_capture_delay(Duration::from_millis(500)));
        let cases = vec![TestCaseInstance::new(
            "slow",
            "default",
            "http://localhost/slow",
        )];
        let mut config = test_config(&dir);
        config.capture_timeout = Duration::from_millis(50);
        let runner = build_runner(config, browser, cases);

        let outcome = runner.run(RunMode::Test).await.unwrap();
        assert_eq!(outcome.capture_failures, 1);
        let detail = &outcome.test_cases[0];
        assert_eq!(detail.status, CaseStatus::CaptureFailed);
        assert!(detail.error.as_deref().unwrap().contains("timed out"));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_unknown_engine_aborts_but_still_disposes_browsers() {
        let dir = temp_dir();
        let browser = Arc::new(MockBrowser::new());
        let cases = vec![TestCaseInstance::new(
            "any",
            "default",
            "http://localhost/any",
        )];
        let mut config = test_config(&dir);
        config.comparison.core = "does-not-exist".to_string();
        let runner = build_runner(config, Arc::clone(&browser), cases);

        let err = runner.run(RunMode::Test).await.unwrap_err();
        assert!(matches!(err, RunnerError::UnknownEngine(_)));
        assert_eq!(browser.disposal_count(), 1);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_browser_expansion_produces_unique_suffixed_variants() {
        let dir = temp_dir();
        let browser = Arc::new(MockBrowser::new());
        let cases = vec![TestCaseInstance::new(
            "nav",
            "default",
            "http://localhost/nav",
        )];

        let mut config = test_config(&dir);
        config.browsers = vec!["chromium".to_string(), "chromium-beta".to_string()];

        let mut registry = AdapterRegistry::new();
        for name in ["chromium", "chromium-beta"] {
            let shared = Arc::clone(&browser);
            registry.register_browser(name, move || {
                Arc::clone(&shared) as Arc<dyn BrowserAdapter>
            });
        }
        registry.register_case_adapter(Arc::new(MockCaseAdapter {
            name: "mock",
            cases,
        }));
        let storage: Arc<dyn StorageAdapter> = Arc::new(FsStorage::new(dir.clone()));
        let runner = Runner::with_parts(
            config,
            Arc::new(registry),
            Arc::new(EngineRegistry::with_builtins()),
            storage,
        );

        let outcome = runner.run(RunMode::Update).await.unwrap();
        let mut ids: Vec<&str> = outcome.test_cases.iter().map(|d| d.id.as_str()).collect();
        ids.sort_unstable();
        assert_eq!(ids, vec!["nav-default-chromium", "nav-default-chromium-beta"]);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_update_overwrites_baseline_without_comparing() {
        let dir = temp_dir();
        let browser = Arc::new(MockBrowser::new());
        let cases = vec![TestCaseInstance::new(
            "logo",
            "default",
            "http://localhost/logo",
        )];
        let runner = build_runner(test_config(&dir), Arc::clone(&browser), cases);

        runner.run(RunMode::Update).await.unwrap();
        let first = std::fs::read(dir.join("base").join("logo-default-chromium.png")).unwrap();

        browser.set_color([0, 99, 0, 255]);
        let outcome = runner.run(RunMode::Update).await.unwrap();
        let second = std::fs::read(dir.join("base").join("logo-default-chromium.png")).unwrap();

        assert_ne!(first, second);
        // No comparison runs in update mode, so nothing can fail a diff.
        assert_eq!(outcome.failed_diffs, 0);
        assert!(outcome.test_cases[0].comparison_duration_ms.is_none());

        std::fs::remove_dir_all(&dir).ok();
    }

    /// Adapter that tracks its start/stop lifecycle, standing in for one
    /// that launches a dev server in `start()`.
    struct CountingCaseAdapter {
        starts: AtomicUsize,
        stops: AtomicUsize,
    }

    impl CountingCaseAdapter {
        fn new() -> Self {
            Self {
                starts: AtomicUsize::new(0),
                stops: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl TestCaseAdapter for CountingCaseAdapter {
        fn name(&self) -> &str {
            "counting"
        }

        async fn start(&self) -> Result<AdapterStartup, RunnerError> {
            self.starts.fetch_add(1, Ordering::SeqCst);
            Ok(AdapterStartup {
                base_url: None,
                initial_page_url: Some("about:blank".to_string()),
            })
        }

        async fn list_cases(
            &self,
            _page: Option<&dyn PageHandle>,
            _ctx: &DiscoveryContext,
        ) -> Result<Vec<TestCaseInstance>, RunnerError> {
            Ok(vec![TestCaseInstance::new(
                "counted",
                "default",
                "http://localhost/counted",
            )])
        }

        async fn stop(&self) -> Result<(), RunnerError> {
            self.stops.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_adapter_stopped_even_when_discovery_page_fails() {
        // No browser adapters registered: opening the discovery page fails
        // after start() has already succeeded. The adapter must still be
        // stopped or whatever start() launched leaks.
        let adapter = Arc::new(CountingCaseAdapter::new());
        let adapters: Vec<Arc<dyn TestCaseAdapter>> =
            vec![Arc::clone(&adapter) as Arc<dyn TestCaseAdapter>];

        let pool = crate::BrowserAdapterPool::new(Arc::new(AdapterRegistry::new()));
        let engine = crate::DiscoveryEngine::new(
            vec!["chromium".to_string()],
            Config::default().viewports,
        );

        let cases = engine.discover(&adapters, &pool).await;
        assert!(cases.is_empty());
        assert_eq!(adapter.starts.load(Ordering::SeqCst), 1);
        assert_eq!(adapter.stops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_multiple_adapters_prefix_colliding_case_ids() {
        let dir = temp_dir();
        let browser = Arc::new(MockBrowser::new());
        // Both adapters emit the same caseId; the adapter-name prefix keeps
        // the expanded instances distinct.
        let shared = vec![TestCaseInstance::new(
            "shared",
            "default",
            "http://localhost/shared",
        )];

        let mut registry = AdapterRegistry::new();
        let cloned = Arc::clone(&browser);
        registry.register_browser("chromium", move || {
            Arc::clone(&cloned) as Arc<dyn BrowserAdapter>
        });
        registry.register_case_adapter(Arc::new(MockCaseAdapter {
            name: "alpha",
            cases: shared.clone(),
        }));
        registry.register_case_adapter(Arc::new(MockCaseAdapter {
            name: "beta",
            cases: shared,
        }));

        let storage: Arc<dyn StorageAdapter> = Arc::new(FsStorage::new(dir.clone()));
        let runner = Runner::with_parts(
            test_config(&dir),
            Arc::new(registry),
            Arc::new(EngineRegistry::with_builtins()),
            storage,
        );

        let outcome = runner.run(RunMode::Update).await.unwrap();
        let ids: Vec<&str> = outcome.test_cases.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(
            ids,
            vec![
                "alpha-shared-default-chromium",
                "beta-shared-default-chromium"
            ]
        );

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_empty_discovery_yields_empty_success() {
        let dir = temp_dir();
        let browser = Arc::new(MockBrowser::new());
        let runner = build_runner(test_config(&dir), browser, Vec::new());

        let outcome = runner.run(RunMode::Test).await.unwrap();
        assert_eq!(outcome.total, 0);
        assert!(outcome.is_success());

        std::fs::remove_dir_all(&dir).ok();
    }
}
