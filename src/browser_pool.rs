//! Browser adapter pool: one cached adapter per browser name.
//!
//! The first request for a browser name creates and initializes its adapter;
//! subsequent requests reuse it, so resource use stays bounded by the number
//! of browser families rather than the number of test cases.

use crate::{AdapterRegistry, BrowserAdapter, RunnerError};
use dashmap::DashMap;
use futures::future::join_all;
use std::sync::Arc;
use tracing::{info, warn};

pub struct BrowserAdapterPool {
    registry: Arc<AdapterRegistry>,
    adapters: DashMap<String, Arc<dyn BrowserAdapter>>,
}

impl BrowserAdapterPool {
    pub fn new(registry: Arc<AdapterRegistry>) -> Self {
        Self {
            registry,
            adapters: DashMap::new(),
        }
    }

    /// Resolve the adapter for a browser name, creating and initializing it
    /// on first use.
    ///
    /// Callers pre-warm the pool serially via [`warm`](Self::warm) before
    /// the concurrent capture phase, so the name→adapter map is effectively
    /// read-only while captures are in flight.
    pub async fn adapter_for(&self, browser: &str) -> Result<Arc<dyn BrowserAdapter>, RunnerError> {
        if let Some(existing) = self.adapters.get(browser) {
            return Ok(Arc::clone(&existing));
        }

        let factory = self
            .registry
            .browser_factory(browser)
            .ok_or_else(|| RunnerError::UnknownBrowser(browser.to_string()))?;

        let adapter = factory();
        adapter.init(browser, None).await?;
        info!("Browser adapter '{browser}' initialized");

        self.adapters
            .insert(browser.to_string(), Arc::clone(&adapter));
        Ok(adapter)
    }

    /// Initialize adapters for every listed browser name, one at a time.
    pub async fn warm(&self, browsers: &[String]) -> Result<(), RunnerError> {
        for browser in browsers {
            self.adapter_for(browser).await?;
        }
        Ok(())
    }

    pub fn cached_count(&self) -> usize {
        self.adapters.len()
    }

    /// Dispose every cached adapter in parallel, logging and continuing
    /// past individual disposal errors. Runs in the guaranteed-cleanup path
    /// of a run so no browser process is leaked.
    pub async fn dispose_all(&self) {
        let adapters: Vec<(String, Arc<dyn BrowserAdapter>)> = self
            .adapters
            .iter()
            .map(|entry| (entry.key().clone(), Arc::clone(entry.value())))
            .collect();
        self.adapters.clear();

        if adapters.is_empty() {
            return;
        }

        let disposals = adapters.into_iter().map(|(name, adapter)| async move {
            if let Err(e) = adapter.dispose().await {
                warn!("Failed to dispose browser adapter '{name}': {e}");
            }
        });
        join_all(disposals).await;

        info!("All browser adapters disposed");
    }
}
