//! Pipeline orchestration: discovery → capture → compare → aggregate, with
//! guaranteed browser cleanup on every exit path.

use crate::{
    aggregate, AdapterRegistry, BrowserAdapterPool, CaptureExecutor, ComparisonOrchestrator,
    Config, DiscoveryEngine, EngineRegistry, FsStorage, RunDurations, RunMode, RunOutcome,
    RunnerError, StorageAdapter,
};
use chrono::Utc;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

pub struct Runner {
    config: Config,
    adapters: Arc<AdapterRegistry>,
    engines: Arc<EngineRegistry>,
    storage: Arc<dyn StorageAdapter>,
}

impl Runner {
    /// Runner wired with the built-in adapters and engines.
    pub fn new(config: Config) -> Self {
        let adapters = Arc::new(AdapterRegistry::with_builtins(&config));
        let engines = Arc::new(EngineRegistry::with_builtins());
        let storage: Arc<dyn StorageAdapter> =
            Arc::new(FsStorage::new(config.screenshot_dir.clone()));
        Self {
            config,
            adapters,
            engines,
            storage,
        }
    }

    /// Runner with caller-supplied collaborators. The registries are passed
    /// in explicitly so tests can wire their own adapters and engines.
    pub fn with_parts(
        config: Config,
        adapters: Arc<AdapterRegistry>,
        engines: Arc<EngineRegistry>,
        storage: Arc<dyn StorageAdapter>,
    ) -> Self {
        Self {
            config,
            adapters,
            engines,
            storage,
        }
    }

    /// Execute a full run. The browser adapter pool is disposed exactly
    /// once whether the pipeline succeeds or aborts.
    pub async fn run(&self, mode: RunMode) -> Result<RunOutcome, RunnerError> {
        self.config.validate()?;

        let browsers = Arc::new(BrowserAdapterPool::new(Arc::clone(&self.adapters)));
        let result = self.run_pipeline(&browsers, mode).await;
        browsers.dispose_all().await;
        result
    }

    async fn run_pipeline(
        &self,
        browsers: &Arc<BrowserAdapterPool>,
        mode: RunMode,
    ) -> Result<RunOutcome, RunnerError> {
        let started_at = Utc::now();
        let run_started = Instant::now();

        // Phase 1: discovery, fully complete before any capture begins.
        let discovery_started = Instant::now();
        let discovery = DiscoveryEngine::new(
            self.config.browsers.clone(),
            self.config.viewports.clone(),
        );
        let cases = discovery
            .discover(self.adapters.case_adapters(), browsers)
            .await;
        let discovery_ms = discovery_started.elapsed().as_millis() as u64;

        if cases.is_empty() {
            warn!("Discovery produced no test cases");
            return Ok(aggregate(
                Vec::new(),
                Vec::new(),
                RunDurations {
                    discovery_ms,
                    capture_ms: 0,
                    compare_ms: 0,
                    total_ms: run_started.elapsed().as_millis() as u64,
                },
                started_at,
            ));
        }
        info!("Discovered {} case variant(s)", cases.len());

        // Launch one adapter per distinct browser name before the
        // concurrent phase so the pool map stays read-only afterwards.
        let browser_names: BTreeSet<String> = cases
            .iter()
            .filter_map(|case| case.browser.clone())
            .collect();
        browsers
            .warm(&browser_names.into_iter().collect::<Vec<_>>())
            .await?;

        if mode == RunMode::Test {
            self.storage.cleanup().await?;
        }

        // Phase 2: capture.
        let capture_started = Instant::now();
        let executor = CaptureExecutor::new(
            self.config.runtime.max_concurrency.capture_limit(),
            self.config.capture_timeout,
        );
        let captures = executor
            .run(
                cases,
                Arc::clone(browsers),
                Arc::clone(&self.storage),
                mode,
            )
            .await?;
        let capture_ms = capture_started.elapsed().as_millis() as u64;
        info!(
            "Captured {}/{} variant(s)",
            captures.iter().filter(|c| c.succeeded()).count(),
            captures.len()
        );

        // Phase 3: compare, test mode only.
        let compare_started = Instant::now();
        let compares = if mode == RunMode::Test {
            let orchestrator = ComparisonOrchestrator::new(
                self.config.runtime.max_concurrency.compare_limit(),
                Arc::clone(&self.engines),
                self.config.comparison.clone(),
            );
            orchestrator
                .run(&captures, Arc::clone(&self.storage))
                .await?
        } else {
            Vec::new()
        };
        let compare_ms = compare_started.elapsed().as_millis() as u64;

        let durations = RunDurations {
            discovery_ms,
            capture_ms,
            compare_ms,
            total_ms: run_started.elapsed().as_millis() as u64,
        };

        Ok(aggregate(captures, compares, durations, started_at))
    }
}
