//! Result aggregation: merges capture and compare records into the final
//! run outcome.

use crate::{CaptureRecord, CompareRecord, MismatchReason};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;

/// Final status of one case variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CaseStatus {
    Passed,
    FailedDiff,
    FailedMissingCurrent,
    FailedMissingBase,
    FailedError,
    /// The screenshot was never produced; comparison was skipped entirely.
    CaptureFailed,
}

#[derive(Debug, Clone, Serialize)]
pub struct TestCaseDetail {
    pub id: String,
    pub capture_filename: String,
    pub capture_duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comparison_duration_ms: Option<u64>,
    pub total_duration_ms: u64,
    pub status: CaseStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<MismatchReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diff_percentage: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub browser: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub viewport: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunDurations {
    pub discovery_ms: u64,
    pub capture_ms: u64,
    pub compare_ms: u64,
    pub total_ms: u64,
}

/// One immutable report per run.
#[derive(Debug, Serialize)]
pub struct RunOutcome {
    pub started_at: DateTime<Utc>,
    pub total: usize,
    pub passed: usize,
    pub failed_diffs: usize,
    pub failed_missing_current: usize,
    pub failed_missing_base: usize,
    pub failed_errors: usize,
    pub capture_failures: usize,
    pub test_cases: Vec<TestCaseDetail>,
    pub durations: RunDurations,
}

impl RunOutcome {
    pub fn failures(&self) -> usize {
        self.failed_diffs
            + self.failed_missing_current
            + self.failed_missing_base
            + self.failed_errors
            + self.capture_failures
    }

    pub fn is_success(&self) -> bool {
        self.failures() == 0
    }
}

/// Merge capture and compare records by `(case_id, variant_id)`.
///
/// Capture failures are reported as `capture-failed` only; they carry no
/// comparison record and never surface as a missing-image reason. A
/// successful capture without a comparison record (update mode) counts as
/// passed.
pub fn aggregate(
    captures: Vec<CaptureRecord>,
    compares: Vec<CompareRecord>,
    durations: RunDurations,
    started_at: DateTime<Utc>,
) -> RunOutcome {
    let mut compare_index: HashMap<(String, String), CompareRecord> = compares
        .into_iter()
        .map(|record| {
            (
                (record.case_id.clone(), record.variant_id.clone()),
                record,
            )
        })
        .collect();

    let mut passed = 0usize;
    let mut failed_diffs = 0usize;
    let mut failed_missing_current = 0usize;
    let mut failed_missing_base = 0usize;
    let mut failed_errors = 0usize;
    let mut capture_failures = 0usize;
    let mut test_cases = Vec::with_capacity(captures.len());

    for capture in captures {
        let key = (
            capture.case.case_id.clone(),
            capture.case.variant_id.clone(),
        );
        let compare = compare_index.remove(&key);

        let capture_duration_ms = capture.capture_duration.as_millis() as u64;
        let comparison_duration_ms = compare
            .as_ref()
            .map(|record| record.duration.as_millis() as u64);

        let (status, reason, diff_percentage) = match (&capture.error, &compare) {
            (Some(_), _) => {
                capture_failures += 1;
                (CaseStatus::CaptureFailed, None, None)
            }
            (None, Some(record)) if record.comparison.matched => {
                passed += 1;
                (CaseStatus::Passed, None, None)
            }
            (None, Some(record)) => {
                let reason = record.comparison.reason.unwrap_or(MismatchReason::Error);
                let status = match reason {
                    MismatchReason::PixelDiff => {
                        failed_diffs += 1;
                        CaseStatus::FailedDiff
                    }
                    MismatchReason::MissingCurrent => {
                        failed_missing_current += 1;
                        CaseStatus::FailedMissingCurrent
                    }
                    MismatchReason::MissingBase => {
                        failed_missing_base += 1;
                        CaseStatus::FailedMissingBase
                    }
                    MismatchReason::Error => {
                        failed_errors += 1;
                        CaseStatus::FailedError
                    }
                };
                (status, Some(reason), record.comparison.diff_percentage)
            }
            (None, None) => {
                passed += 1;
                (CaseStatus::Passed, None, None)
            }
        };

        let viewport = capture.case.viewport_key.clone().or_else(|| {
            capture
                .case
                .viewport
                .as_ref()
                .map(|v| format!("{}x{}", v.width, v.height))
        });

        test_cases.push(TestCaseDetail {
            id: capture.case.id(),
            capture_filename: capture.capture_filename,
            capture_duration_ms,
            comparison_duration_ms,
            total_duration_ms: capture_duration_ms + comparison_duration_ms.unwrap_or(0),
            status,
            reason,
            diff_percentage,
            browser: capture.case.browser.clone(),
            viewport,
            error: capture.error,
        });
    }

    RunOutcome {
        started_at,
        total: test_cases.len(),
        passed,
        failed_diffs,
        failed_missing_current,
        failed_missing_base,
        failed_errors,
        capture_failures,
        test_cases,
        durations,
    }
}
