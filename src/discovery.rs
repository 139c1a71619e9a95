//! Test case discovery: drives the configured test case adapters, expands
//! the returned cases across browser targets and produces a deterministic,
//! duplicate-free list.

use crate::{
    BrowserAdapterPool, DiscoveryContext, RunnerError, TestCaseAdapter, TestCaseInstance,
    ViewportMap,
};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};

pub struct DiscoveryEngine {
    browsers: Vec<String>,
    viewports: ViewportMap,
}

impl DiscoveryEngine {
    pub fn new(browsers: Vec<String>, viewports: ViewportMap) -> Self {
        Self {
            browsers,
            viewports,
        }
    }

    /// Run every adapter in order and return the expanded, sorted case
    /// list. A single adapter's failure is logged and skipped; the other
    /// adapters still contribute.
    pub async fn discover(
        &self,
        adapters: &[Arc<dyn TestCaseAdapter>],
        browser_pool: &BrowserAdapterPool,
    ) -> Vec<TestCaseInstance> {
        let prefix_ids = adapters.len() > 1;
        let mut collected = Vec::new();

        for adapter in adapters {
            match self.discover_adapter(adapter.as_ref(), browser_pool).await {
                Ok(mut cases) => {
                    info!(
                        "Adapter '{}' contributed {} case(s)",
                        adapter.name(),
                        cases.len()
                    );
                    if prefix_ids {
                        for case in &mut cases {
                            case.case_id = format!("{}-{}", adapter.name(), case.case_id);
                        }
                    }
                    collected.append(&mut cases);
                }
                Err(e) => {
                    warn!("Skipping adapter '{}': {e}", adapter.name());
                }
            }
        }

        expand_and_sort(collected, &self.browsers)
    }

    async fn discover_adapter(
        &self,
        adapter: &dyn TestCaseAdapter,
        browser_pool: &BrowserAdapterPool,
    ) -> Result<Vec<TestCaseInstance>, RunnerError> {
        let startup = adapter.start().await?;

        // Once start() has succeeded the adapter may hold resources (a dev
        // server, a child process), so stop() runs no matter how listing
        // ends.
        let listed = self.list_cases_on_page(adapter, browser_pool, &startup).await;

        if let Err(e) = adapter.stop().await {
            warn!("Failed to stop adapter '{}': {e}", adapter.name());
        }

        listed
    }

    async fn list_cases_on_page(
        &self,
        adapter: &dyn TestCaseAdapter,
        browser_pool: &BrowserAdapterPool,
        startup: &crate::AdapterStartup,
    ) -> Result<Vec<TestCaseInstance>, RunnerError> {
        let page_url = startup
            .page_url()
            .ok_or_else(|| RunnerError::Discovery {
                adapter: adapter.name().to_string(),
                message: "Adapter provided neither initial_page_url nor base_url".to_string(),
            })?
            .to_string();

        // Discovery pages open on the first configured browser target.
        let browser_name = self.browsers.first().ok_or_else(|| {
            RunnerError::Configuration("No browser targets configured".to_string())
        })?;
        let browser = browser_pool.adapter_for(browser_name).await?;

        let page = browser.open_page(&page_url).await?;
        let ctx = DiscoveryContext {
            viewports: self.viewports.clone(),
        };
        let listed = adapter.list_cases(Some(page.as_ref()), &ctx).await;

        // The page closes whether listing succeeded or not.
        if let Err(e) = page.close().await {
            warn!("Failed to close discovery page for '{}': {e}", adapter.name());
        }

        listed
    }
}

/// Expand cases across the configured browser targets, drop duplicate
/// `(case_id, variant_id)` pairs and sort lexicographically for
/// reproducible, diffable run output.
pub(crate) fn expand_and_sort(
    cases: Vec<TestCaseInstance>,
    browsers: &[String],
) -> Vec<TestCaseInstance> {
    let mut expanded = Vec::with_capacity(cases.len() * browsers.len());

    for case in cases {
        for browser in browsers {
            let mut variant = case.clone();
            variant.variant_id = format!("{}-{}", case.variant_id, browser);
            variant.browser = Some(browser.clone());
            expanded.push(variant);
        }
    }

    let mut seen = HashSet::with_capacity(expanded.len());
    let mut unique = Vec::with_capacity(expanded.len());
    for case in expanded {
        if seen.insert((case.case_id.clone(), case.variant_id.clone())) {
            unique.push(case);
        } else {
            warn!(
                "Dropping duplicate test case {}-{}",
                case.case_id, case.variant_id
            );
        }
    }

    unique.sort_by(|a, b| {
        (a.case_id.as_str(), a.variant_id.as_str()).cmp(&(b.case_id.as_str(), b.variant_id.as_str()))
    });
    unique
}
