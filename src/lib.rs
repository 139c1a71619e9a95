//! # vizdiff
//!
//! A visual regression test runner built on headless Chrome. Test cases are
//! discovered from adapters, captured concurrently through a pooled browser
//! layer, and compared pixel-by-pixel against committed baseline screenshots.
//!
//! ## Pipeline
//!
//! 1. **Discovery** — case adapters enumerate test cases, which are expanded
//!    across the configured browsers into uniquely identified instances.
//! 2. **Capture** — a semaphore-bounded pool drives timeout-guarded page
//!    captures and persists each screenshot atomically.
//! 3. **Compare** — in test mode, captured screenshots are compared against
//!    baselines by a pluggable comparison engine; diff images are written for
//!    mismatches.
//! 4. **Aggregate** — capture and comparison records are reconciled into a
//!    single run outcome with per-case details and phase timings.
//!
//! ## Features
//!
//! - **Bounded Concurrency**: Semaphore-based pools for capture and compare
//! - **Browser Pooling**: One shared Chrome adapter per browser name
//! - **Atomic Persistence**: Temp-file-and-rename screenshot writes
//! - **Pluggable Comparison**: Engine registry with a built-in pixel matcher
//! - **Update Mode**: Re-baseline by capturing into the base bucket
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use vizdiff::{Config, RunMode, Runner, StaticCaseConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut config = Config::default();
//!     config.cases.push(StaticCaseConfig {
//!         id: "home".to_string(),
//!         url: "https://example.com".to_string(),
//!         ..Default::default()
//!     });
//!
//!     let runner = Runner::new(config);
//!     let outcome = runner.run(RunMode::Test).await?;
//!     println!("{} of {} cases passed", outcome.passed, outcome.total);
//!
//!     Ok(())
//! }
//! ```
//!
//! ## CLI Usage
//!
//! ```bash
//! # Compare current screenshots against baselines
//! vizdiff test --config vizdiff.json
//!
//! # Re-capture baselines
//! vizdiff update --config vizdiff.json
//! ```

/// Configuration and settings for the runner
pub mod config;

/// Error types and error handling utilities
pub mod error;

/// Test case model: instances, viewports, interactions, screenshot kinds
pub mod case;

/// Capability traits for browsers, case adapters, and storage
pub mod adapter;

/// Filesystem-backed screenshot storage with atomic writes
pub mod storage;

/// Semaphore-bounded concurrency pool
pub mod pool;

/// Shared browser adapter pool keyed by browser name
pub mod browser_pool;

/// Headless Chrome browser adapter
pub mod chromium;

/// Test case discovery and browser expansion
pub mod discovery;

/// Concurrent capture execution and persistence
pub mod capture;

/// Comparison orchestration and the engine registry
pub mod compare;

/// Built-in pixel-by-pixel comparison engine
pub mod pixelmatch;

/// Run outcome aggregation
pub mod summary;

/// Top-level run orchestration
pub mod runner;

/// Command-line interface implementation
pub mod cli;

#[cfg(test)]
mod tests;

pub use adapter::*;
pub use browser_pool::*;
pub use capture::*;
pub use case::*;
pub use chromium::*;
pub use cli::*;
pub use compare::*;
pub use config::*;
pub use discovery::*;
pub use error::*;
pub use pixelmatch::*;
pub use pool::*;
pub use runner::*;
pub use storage::*;
pub use summary::*;
