use crate::{Config, RunMode, RunOutcome, Runner, RunnerError};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;

/// Process exit codes: a run that finishes with visual failures exits
/// differently from a tool malfunction.
pub const EXIT_OK: i32 = 0;
pub const EXIT_TESTS_FAILED: i32 = 1;
pub const EXIT_TOOL_FAILURE: i32 = 2;

#[derive(Parser)]
#[command(name = "vizdiff")]
#[command(about = "Visual regression test runner")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(long, help = "Configuration file path (JSON)")]
    pub config: Option<PathBuf>,

    #[arg(long, help = "Concurrency limit for both capture and compare")]
    pub concurrency: Option<usize>,

    #[arg(long, help = "Capture timeout in seconds")]
    pub timeout: Option<u64>,

    #[arg(long, help = "Root directory for base/current/diff screenshots")]
    pub screenshot_dir: Option<PathBuf>,

    #[arg(long, help = "Chrome executable path")]
    pub chrome_path: Option<String>,

    #[arg(long, help = "Enable verbose logging")]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Capture current screenshots and compare against accepted baselines
    Test {
        #[arg(long, help = "Print the run outcome as JSON")]
        json: bool,
    },

    /// Capture screenshots and accept them as the new baselines
    Update,

    /// Validate a configuration file
    Validate {
        #[arg(short, long, help = "Configuration file to validate")]
        config: PathBuf,
    },
}

/// Load the config file (or defaults) and apply CLI overrides.
pub async fn load_config(args: &Cli) -> Result<Config, RunnerError> {
    let mut config = if let Some(config_path) = &args.config {
        let content = tokio::fs::read_to_string(config_path).await?;
        serde_json::from_str(&content)?
    } else {
        Config::default()
    };

    if let Some(concurrency) = args.concurrency {
        config.runtime.max_concurrency = crate::MaxConcurrency::Single(concurrency);
    }
    if let Some(timeout) = args.timeout {
        config.capture_timeout = std::time::Duration::from_secs(timeout);
    }
    if let Some(screenshot_dir) = &args.screenshot_dir {
        config.screenshot_dir = screenshot_dir.clone();
    }
    if let Some(chrome_path) = &args.chrome_path {
        config.chrome_path = Some(chrome_path.clone());
    }

    config.validate()?;
    Ok(config)
}

pub struct CliRunner {
    config: Config,
}

impl CliRunner {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub async fn run(&self, command: Commands) -> Result<i32, RunnerError> {
        match command {
            Commands::Test { json } => {
                let outcome = Runner::new(self.config.clone()).run(RunMode::Test).await?;
                print_summary(&outcome);
                if json {
                    println!("{}", serde_json::to_string_pretty(&outcome)?);
                }
                Ok(if outcome.is_success() {
                    EXIT_OK
                } else {
                    EXIT_TESTS_FAILED
                })
            }
            Commands::Update => {
                let outcome = Runner::new(self.config.clone())
                    .run(RunMode::Update)
                    .await?;
                info!(
                    "Accepted {} baseline(s), {} capture failure(s)",
                    outcome.passed, outcome.capture_failures
                );
                Ok(if outcome.capture_failures == 0 {
                    EXIT_OK
                } else {
                    EXIT_TESTS_FAILED
                })
            }
            Commands::Validate { config } => {
                let content = tokio::fs::read_to_string(&config).await?;
                let parsed: Config = serde_json::from_str(&content)?;
                parsed.validate()?;

                println!("Configuration is valid:");
                println!("  Browsers: {}", parsed.browsers.join(", "));
                println!("  Viewports: {}", parsed.viewports.len());
                println!("  Comparison engine: {}", parsed.comparison.core);
                println!("  Threshold: {}", parsed.comparison.threshold);
                println!(
                    "  Concurrency: capture={}, compare={}",
                    parsed.runtime.max_concurrency.capture_limit(),
                    parsed.runtime.max_concurrency.compare_limit()
                );
                println!("  Static cases: {}", parsed.cases.len());
                Ok(EXIT_OK)
            }
        }
    }
}

fn print_summary(outcome: &RunOutcome) {
    println!("Visual regression results");
    println!("=========================");
    println!("  Total:           {}", outcome.total);
    println!("  Passed:          {}", outcome.passed);
    println!("  Pixel diffs:     {}", outcome.failed_diffs);
    println!("  Missing current: {}", outcome.failed_missing_current);
    println!("  Missing base:    {}", outcome.failed_missing_base);
    println!("  Errors:          {}", outcome.failed_errors);
    println!("  Capture failed:  {}", outcome.capture_failures);
    println!(
        "  Durations: discovery={}ms capture={}ms compare={}ms total={}ms",
        outcome.durations.discovery_ms,
        outcome.durations.capture_ms,
        outcome.durations.compare_ms,
        outcome.durations.total_ms
    );

    for case in &outcome.test_cases {
        if case.status != crate::CaseStatus::Passed {
            match (case.diff_percentage, &case.error) {
                (Some(pct), _) => println!("  FAIL {} ({:?}, {pct:.2}%)", case.id, case.status),
                (None, Some(error)) => println!("  FAIL {} ({:?}: {error})", case.id, case.status),
                (None, None) => println!("  FAIL {} ({:?})", case.id, case.status),
            }
        }
    }
}

pub fn setup_logging(verbose: bool) {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .init();
}
