//! Comparison engine registry and the orchestrator that runs captured
//! variants against the configured engine.

use crate::{
    CaptureRecord, ComparisonConfig, ConcurrencyPool, RunnerError, StorageAdapter,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Why a comparison did not match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MismatchReason {
    PixelDiff,
    MissingCurrent,
    MissingBase,
    Error,
}

/// Outcome of a single comparison. `diff_percentage` is populated only for
/// pixel diffs.
#[derive(Debug, Clone, Serialize)]
pub struct Comparison {
    #[serde(rename = "match")]
    pub matched: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<MismatchReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diff_percentage: Option<f64>,
}

impl Comparison {
    pub fn matched() -> Self {
        Self {
            matched: true,
            reason: None,
            diff_percentage: None,
        }
    }

    pub fn mismatch(reason: MismatchReason) -> Self {
        Self {
            matched: false,
            reason: Some(reason),
            diff_percentage: None,
        }
    }

    pub fn pixel_diff(diff_percentage: f64) -> Self {
        Self {
            matched: false,
            reason: Some(MismatchReason::PixelDiff),
            diff_percentage: Some(diff_percentage),
        }
    }
}

/// Options passed to a comparison engine for one variant.
#[derive(Debug, Clone)]
pub struct CompareOptions {
    /// Allowed fraction (0.0..=1.0) of differing pixels.
    pub threshold: f64,
    /// Highlight color for diff images, `#rrggbb`.
    pub diff_color: Option<String>,
}

/// Pluggable pixel comparison backend.
#[async_trait]
pub trait ComparisonEngine: Send + Sync {
    fn name(&self) -> &str;

    async fn compare(
        &self,
        storage: &dyn StorageAdapter,
        filename: &str,
        opts: &CompareOptions,
    ) -> Result<Comparison, RunnerError>;
}

/// Name→engine lookup. Registering a name a second time overwrites the
/// prior registration.
#[derive(Default)]
pub struct EngineRegistry {
    engines: HashMap<String, Arc<dyn ComparisonEngine>>,
}

impl EngineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(crate::PixelmatchEngine::default()));
        registry
    }

    pub fn register(&mut self, engine: Arc<dyn ComparisonEngine>) {
        self.engines.insert(engine.name().to_string(), engine);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ComparisonEngine>> {
        self.engines.get(name).cloned()
    }

    pub fn names(&self) -> Vec<&str> {
        self.engines.keys().map(String::as_str).collect()
    }
}

/// Per-variant comparison record, reconciled with capture records by
/// `(case_id, variant_id)`.
#[derive(Debug, Clone)]
pub struct CompareRecord {
    pub case_id: String,
    pub variant_id: String,
    pub comparison: Comparison,
    pub duration: Duration,
}

pub struct ComparisonOrchestrator {
    pool: ConcurrencyPool,
    registry: Arc<EngineRegistry>,
    config: ComparisonConfig,
}

struct CompareItem {
    case_id: String,
    variant_id: String,
    filename: String,
    threshold: f64,
}

impl ComparisonOrchestrator {
    pub fn new(concurrency: usize, registry: Arc<EngineRegistry>, config: ComparisonConfig) -> Self {
        Self {
            pool: ConcurrencyPool::new(concurrency),
            registry,
            config,
        }
    }

    /// Compare every successfully captured variant against its baseline.
    /// Capture-failed variants are not compared at all; the aggregator
    /// reports them as capture failures.
    pub async fn run(
        &self,
        captures: &[CaptureRecord],
        storage: Arc<dyn StorageAdapter>,
    ) -> Result<Vec<CompareRecord>, RunnerError> {
        let engine = self
            .registry
            .get(&self.config.core)
            .ok_or_else(|| RunnerError::UnknownEngine(self.config.core.clone()))?;

        let items: Vec<CompareItem> = captures
            .iter()
            .filter(|record| record.succeeded())
            .map(|record| CompareItem {
                case_id: record.case.case_id.clone(),
                variant_id: record.case.variant_id.clone(),
                filename: record.capture_filename.clone(),
                // The case's own threshold overrides the global one.
                threshold: record.case.threshold.unwrap_or(self.config.threshold),
            })
            .collect();

        let diff_color = self.config.diff_color.clone();

        self.pool
            .run(items, move |item| {
                let engine = Arc::clone(&engine);
                let storage = Arc::clone(&storage);
                let diff_color = diff_color.clone();
                async move { compare_one(item, engine, storage, diff_color).await }
            })
            .await
    }
}

async fn compare_one(
    item: CompareItem,
    engine: Arc<dyn ComparisonEngine>,
    storage: Arc<dyn StorageAdapter>,
    diff_color: Option<String>,
) -> CompareRecord {
    let started = Instant::now();
    let opts = CompareOptions {
        threshold: item.threshold,
        diff_color,
    };

    let comparison = match engine.compare(storage.as_ref(), &item.filename, &opts).await {
        Ok(comparison) => {
            debug!(
                "Compared {}: match={}",
                item.filename, comparison.matched
            );
            comparison
        }
        Err(e) => {
            warn!("Comparison failed for {}: {e}", item.filename);
            Comparison::mismatch(MismatchReason::Error)
        }
    };

    CompareRecord {
        case_id: item.case_id,
        variant_id: item.variant_id,
        comparison,
        duration: started.elapsed(),
    }
}
