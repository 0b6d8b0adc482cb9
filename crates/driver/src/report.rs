//! Structured run results

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::error::{DriverResult, FailureKind};
use crate::scenario::StepKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Passed,
    Failed,
    Skipped,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Passed => "passed",
            StepStatus::Failed => "failed",
            StepStatus::Skipped => "skipped",
        }
    }
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    /// Position in the scenario (0-based)
    pub index: usize,
    pub label: String,
    pub kind: StepKind,
    pub status: StepStatus,
    pub critical: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureKind>,
    pub elapsed_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot_sha256: Option<String>,
}

impl StepResult {
    pub fn is_passed(&self) -> bool {
        self.status == StepStatus::Passed
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepCounts {
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// Aggregate of one scenario execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub scenario_name: String,
    pub status: StepStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub elapsed_ms: u64,
    pub steps: Vec<StepResult>,
}

impl RunReport {
    /// Open a report at run start.
    pub fn begin(scenario_name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            run_id: Uuid::new_v4(),
            scenario_name: scenario_name.into(),
            status: StepStatus::Failed,
            started_at: now,
            finished_at: now,
            elapsed_ms: 0,
            steps: Vec::new(),
        }
    }

    pub fn push(&mut self, result: StepResult) {
        self.steps.push(result);
    }

    /// Close the report: `Passed` only if every step passed.
    pub fn finish(mut self) -> Self {
        self.finished_at = Utc::now();
        self.elapsed_ms = (self.finished_at - self.started_at)
            .num_milliseconds()
            .max(0) as u64;
        self.status = if !self.steps.is_empty() && self.steps.iter().all(StepResult::is_passed) {
            StepStatus::Passed
        } else {
            StepStatus::Failed
        };
        self
    }

    pub fn passed(&self) -> bool {
        self.status == StepStatus::Passed
    }

    pub fn counts(&self) -> StepCounts {
        self.steps
            .iter()
            .fold(StepCounts::default(), |mut counts, step| {
                match step.status {
                    StepStatus::Passed => counts.passed += 1,
                    StepStatus::Failed => counts.failed += 1,
                    StepStatus::Skipped => counts.skipped += 1,
                }
                counts
            })
    }

    /// First failed step, if any
    pub fn first_failure(&self) -> Option<&StepResult> {
        self.steps.iter().find(|s| s.status == StepStatus::Failed)
    }
}

/// Results of running several scenarios
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SuiteReport {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    /// Scenarios that could not run at all, with the reason
    pub errored: Vec<ScenarioError>,
    pub elapsed_ms: u64,
    pub runs: Vec<RunReport>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioError {
    pub scenario_name: String,
    pub error: String,
}

impl SuiteReport {
    pub fn record(&mut self, report: RunReport) {
        self.total += 1;
        self.elapsed_ms += report.elapsed_ms;
        if report.passed() {
            self.passed += 1;
        } else {
            self.failed += 1;
        }
        self.runs.push(report);
    }

    pub fn record_error(&mut self, scenario_name: impl Into<String>, error: impl ToString) {
        self.total += 1;
        self.failed += 1;
        self.errored.push(ScenarioError {
            scenario_name: scenario_name.into(),
            error: error.to_string(),
        });
    }

    pub fn all_passed(&self) -> bool {
        self.total > 0 && self.failed == 0
    }

    /// Step totals across every completed run
    pub fn step_counts(&self) -> StepCounts {
        self.runs
            .iter()
            .map(RunReport::counts)
            .fold(StepCounts::default(), |total, c| StepCounts {
                passed: total.passed + c.passed,
                failed: total.failed + c.failed,
                skipped: total.skipped + c.skipped,
            })
    }

    /// Write results to `<dir>/flowcheck-results.json`
    pub fn write_json(&self, dir: &Path) -> DriverResult<PathBuf> {
        std::fs::create_dir_all(dir)?;

        let path = dir.join("flowcheck-results.json");
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, json)?;

        info!("Results written to: {}", path.display());
        Ok(path)
    }
}
