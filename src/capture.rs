//! Capture executor: runs discovered case variants through the concurrency
//! pool, captures each screenshot with timeout protection and persists the
//! bytes immediately.

use crate::{
    BrowserAdapterPool, CaptureOptions, ConcurrencyPool, RunMode, RunnerError, ScreenshotKind,
    StorageAdapter, TestCaseInstance,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{debug, warn};

/// Per-variant capture record, consumed once by the summary aggregator.
#[derive(Debug)]
pub struct CaptureRecord {
    pub case: TestCaseInstance,
    pub capture_filename: String,
    pub capture_duration: Duration,
    pub error: Option<String>,
}

impl CaptureRecord {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

pub struct CaptureExecutor {
    pool: ConcurrencyPool,
    capture_timeout: Duration,
}

impl CaptureExecutor {
    pub fn new(concurrency: usize, capture_timeout: Duration) -> Self {
        Self {
            pool: ConcurrencyPool::new(concurrency),
            capture_timeout,
        }
    }

    /// Capture every variant, at most `concurrency` in flight. Per-item
    /// failures (adapter errors, timeouts, storage errors) become error
    /// records; the batch always runs to completion.
    pub async fn run(
        &self,
        cases: Vec<TestCaseInstance>,
        browsers: Arc<BrowserAdapterPool>,
        storage: Arc<dyn StorageAdapter>,
        mode: RunMode,
    ) -> Result<Vec<CaptureRecord>, RunnerError> {
        let kind = mode.capture_kind();
        let budget = self.capture_timeout;

        self.pool
            .run(cases, move |case| {
                let browsers = Arc::clone(&browsers);
                let storage = Arc::clone(&storage);
                async move { capture_one(case, browsers, storage, kind, budget).await }
            })
            .await
    }
}

async fn capture_one(
    case: TestCaseInstance,
    browsers: Arc<BrowserAdapterPool>,
    storage: Arc<dyn StorageAdapter>,
    kind: ScreenshotKind,
    budget: Duration,
) -> CaptureRecord {
    let filename = case.screenshot_filename();
    let started = Instant::now();

    let error = match capture_and_persist(&case, &browsers, storage.as_ref(), kind, budget, &filename)
        .await
    {
        Ok(()) => {
            debug!("Captured {}", filename);
            None
        }
        Err(e) => {
            warn!("Capture failed for {}: {e}", case.id());
            Some(e.to_string())
        }
    };

    CaptureRecord {
        capture_filename: filename,
        // Monotonic clock spanning capture and write.
        capture_duration: started.elapsed(),
        error,
        case,
    }
}

async fn capture_and_persist(
    case: &TestCaseInstance,
    browsers: &BrowserAdapterPool,
    storage: &dyn StorageAdapter,
    kind: ScreenshotKind,
    budget: Duration,
    filename: &str,
) -> Result<(), RunnerError> {
    let browser_name = case
        .browser
        .as_deref()
        .ok_or_else(|| RunnerError::Capture("Case has no browser target".to_string()))?;

    let adapter = browsers.adapter_for(browser_name).await?;
    let opts = CaptureOptions::for_case(case);

    // The timeout frees the pool slot; the underlying adapter call is not
    // forcibly cancelled if the adapter offers no cancellation primitive.
    let shot = match timeout(budget, adapter.capture(&opts)).await {
        Ok(result) => result?,
        Err(_) => return Err(RunnerError::CaptureTimeout(budget)),
    };

    storage.write(kind, filename, &shot.buffer).await?;
    // The buffer drops here, right after persisting.
    drop(shot);

    Ok(())
}
