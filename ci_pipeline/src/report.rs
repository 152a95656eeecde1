//! Build report — everything one pipeline run produced.
//!
//! The report is the runner's only artifact: step-by-step outcomes with
//! captured output tails, the final verdict, and for broken builds a
//! fingerprinted failure block. It serializes to JSON for tooling and
//! renders a short text summary for humans.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::PipelineError;
use crate::pipeline::Phase;
use crate::step_executor::StepOutcome;

/// Final verdict of a build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildStatus {
    /// Every step up to and including `script` succeeded.
    Passed,
    /// A `script` step failed: the code under test is broken.
    Failed,
    /// The build never got a verdict: setup failed, a service did not
    /// come up, or the descriptor itself was unusable.
    Errored,
}

impl BuildStatus {
    /// Process exit code the runner reports for this verdict.
    pub fn exit_code(self) -> i32 {
        match self {
            BuildStatus::Passed => 0,
            BuildStatus::Failed => 1,
            BuildStatus::Errored => 2,
        }
    }
}

impl std::fmt::Display for BuildStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            BuildStatus::Passed => "passed",
            BuildStatus::Failed => "failed",
            BuildStatus::Errored => "errored",
        };
        write!(f, "{s}")
    }
}

/// Outcome of a single step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Success,
    Failure,
    /// Never ran because an earlier step failed.
    Skipped,
    TimedOut,
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            StepStatus::Success => "success",
            StepStatus::Failure => "failure",
            StepStatus::Skipped => "skipped",
            StepStatus::TimedOut => "timed_out",
        };
        write!(f, "{s}")
    }
}

/// One executed (or skipped) step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepReport {
    pub sequence: u32,
    pub phase: Phase,
    pub command: String,
    pub status: StepStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stdout: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stderr: Option<String>,
}

impl StepReport {
    pub fn from_outcome(sequence: u32, phase: Phase, command: &str, outcome: &StepOutcome) -> Self {
        let status = if outcome.timed_out {
            StepStatus::TimedOut
        } else if outcome.exit_code == 0 {
            StepStatus::Success
        } else {
            StepStatus::Failure
        };
        let finished_at = Utc::now();
        let started_at = finished_at - chrono::Duration::milliseconds(outcome.duration_ms as i64);
        StepReport {
            sequence,
            phase,
            command: command.to_string(),
            status,
            exit_code: Some(outcome.exit_code),
            started_at: Some(started_at),
            finished_at: Some(finished_at),
            duration_ms: Some(outcome.duration_ms),
            stdout: Some(outcome.stdout.clone()),
            stderr: Some(outcome.stderr.clone()),
        }
    }

    pub fn skipped(sequence: u32, phase: Phase, command: &str) -> Self {
        StepReport {
            sequence,
            phase,
            command: command.to_string(),
            status: StepStatus::Skipped,
            exit_code: None,
            started_at: None,
            finished_at: None,
            duration_ms: None,
            stdout: None,
            stderr: Some("Skipped (previous step failed)".to_string()),
        }
    }
}

/// Fingerprinted description of what broke the build.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureInfo {
    /// Phase name, or `services` / `descriptor` for failures outside any step.
    pub phase: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    pub category: String,
    pub fingerprint: String,
}

/// Complete record of one pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildReport {
    pub build_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    pub status: BuildStatus,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    pub steps: Vec<StepReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureInfo>,
}

impl BuildReport {
    /// Fresh report for a build that is about to run. The status starts
    /// at errored and only `finish` moves it, so an abandoned report can
    /// never read as a pass.
    pub fn new(language: Option<String>) -> Self {
        BuildReport {
            build_id: Uuid::new_v4(),
            language,
            status: BuildStatus::Errored,
            started_at: Utc::now(),
            finished_at: None,
            duration_ms: None,
            steps: Vec::new(),
            failure: None,
        }
    }

    pub fn record_step(&mut self, step: StepReport) {
        self.steps.push(step);
    }

    /// Seal the report with its verdict and timing.
    pub fn finish(&mut self, status: BuildStatus) {
        let now = Utc::now();
        self.duration_ms = Some((now - self.started_at).num_milliseconds().max(0) as u64);
        self.finished_at = Some(now);
        self.status = status;
    }

    /// Short human-readable account of the build.
    pub fn summary(&self) -> String {
        let mut out = String::new();
        let secs = self.duration_ms.unwrap_or(0) as f64 / 1000.0;
        let id = self.build_id.to_string();
        out.push_str(&format!(
            "build {} {} in {secs:.1}s\n",
            &id[..8],
            self.status
        ));
        for step in &self.steps {
            match step.status {
                StepStatus::Skipped => {
                    out.push_str(&format!("  [{}] {} -> skipped\n", step.phase, step.command));
                }
                _ => {
                    let step_secs = step.duration_ms.unwrap_or(0) as f64 / 1000.0;
                    out.push_str(&format!(
                        "  [{}] {} -> {} ({step_secs:.1}s)\n",
                        step.phase, step.command, step.status
                    ));
                }
            }
        }
        if let Some(failure) = &self.failure {
            out.push_str(&format!(
                "failure: {} in {} (fingerprint {})\n",
                failure.category, failure.phase, failure.fingerprint
            ));
        }
        out
    }

    /// Write the report as pretty-printed JSON.
    pub fn write_json(&self, path: &Path) -> Result<(), PipelineError> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)
            .map_err(|e| PipelineError::Io(format!("cannot write {}: {e}", path.display())))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(exit_code: i32) -> StepOutcome {
        StepOutcome {
            exit_code,
            stdout: "out".to_string(),
            stderr: String::new(),
            duration_ms: 1200,
            timed_out: false,
        }
    }

    #[test]
    fn test_step_status_mapping() {
        let step = StepReport::from_outcome(1, Phase::Script, "pytest", &outcome(0));
        assert_eq!(step.status, StepStatus::Success);

        let step = StepReport::from_outcome(1, Phase::Script, "pytest", &outcome(1));
        assert_eq!(step.status, StepStatus::Failure);

        let timed_out = StepOutcome {
            timed_out: true,
            exit_code: -1,
            ..outcome(-1)
        };
        let step = StepReport::from_outcome(1, Phase::Script, "pytest", &timed_out);
        assert_eq!(step.status, StepStatus::TimedOut);
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(BuildStatus::Passed.exit_code(), 0);
        assert_eq!(BuildStatus::Failed.exit_code(), 1);
        assert_eq!(BuildStatus::Errored.exit_code(), 2);
    }

    #[test]
    fn test_finish_seals_report() {
        let mut report = BuildReport::new(Some("python".to_string()));
        assert_eq!(report.status, BuildStatus::Errored);
        report.finish(BuildStatus::Passed);
        assert_eq!(report.status, BuildStatus::Passed);
        assert!(report.finished_at.is_some());
        assert!(report.duration_ms.is_some());
    }

    #[test]
    fn test_json_shape() {
        let mut report = BuildReport::new(None);
        report.record_step(StepReport::from_outcome(1, Phase::Script, "pytest", &outcome(1)));
        report.record_step(StepReport::skipped(2, Phase::Script, "codecov"));
        report.finish(BuildStatus::Failed);

        let value: serde_json::Value =
            serde_json::from_str(&serde_json::to_string(&report).unwrap()).unwrap();
        assert_eq!(value["status"], "failed");
        assert_eq!(value["steps"][0]["status"], "failure");
        assert_eq!(value["steps"][0]["phase"], "script");
        assert_eq!(value["steps"][1]["status"], "skipped");
        assert!(value["steps"][0].get("started_at").is_some());
        // skipped steps never ran, so they carry no exit code or timing
        assert!(value["steps"][1].get("exit_code").is_none());
        assert!(value["steps"][1].get("started_at").is_none());
    }

    #[test]
    fn test_summary_lines() {
        let mut report = BuildReport::new(Some("python".to_string()));
        report.record_step(StepReport::from_outcome(
            1,
            Phase::Install,
            "pip install -r requirements.txt",
            &outcome(0),
        ));
        report.record_step(StepReport::from_outcome(2, Phase::Script, "flake8 helo", &outcome(1)));
        report.failure = Some(FailureInfo {
            phase: "script".to_string(),
            command: Some("flake8 helo".to_string()),
            category: "lint".to_string(),
            fingerprint: "abc123".to_string(),
        });
        report.finish(BuildStatus::Failed);

        let summary = report.summary();
        assert!(summary.contains("failed"));
        assert!(summary.contains("[install] pip install -r requirements.txt -> success"));
        assert!(summary.contains("[script] flake8 helo -> failure"));
        assert!(summary.contains("failure: lint in script (fingerprint abc123)"));
    }

    #[test]
    fn test_write_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");

        let mut report = BuildReport::new(None);
        report.finish(BuildStatus::Passed);
        report.write_json(&path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["status"], "passed");
    }
}
