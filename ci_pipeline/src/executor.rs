//! Build executor — runs a parsed descriptor end to end.
//!
//! Phases run in their fixed order and every command inside a phase runs
//! in sequence. The first non-zero exit aborts the build: remaining
//! commands are recorded as skipped, never run. Where the failure landed
//! decides the verdict — a setup phase failure means the build errored
//! before reaching its tests, a `script` failure means the code is
//! broken. `after_success` runs only on a clean build and cannot change
//! the verdict, matching how coverage uploads behave on hosted CI.
//!
//! Service containers are started before the first step and removed
//! after the last, whatever the verdict.

use std::path::PathBuf;
use std::time::Duration;

use crate::config::RunnerConfig;
use crate::error::PipelineError;
use crate::failure;
use crate::pipeline::{Phase, PipelineConfig};
use crate::report::{BuildReport, BuildStatus, FailureInfo, StepReport};
use crate::services::{ServiceManager, ServiceSpec};
use crate::step_executor::{self, StepOutcome};

/// How one build should run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Directory the steps run in.
    pub source_dir: PathBuf,
    /// Skip service provisioning; the descriptor's services are assumed
    /// to be reachable already.
    pub no_services: bool,
    /// Leave provisioned services running after the build.
    pub keep_services: bool,
    /// Echo step output to the runner's own stdout/stderr as steps finish.
    pub echo_output: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        RunOptions {
            source_dir: PathBuf::from("."),
            no_services: false,
            keep_services: false,
            echo_output: false,
        }
    }
}

/// Run the whole pipeline described by `pipeline` and return its report.
///
/// Anything that prevents a verdict — an invalid descriptor, a service
/// that never came up, a setup step failing — still produces a finished
/// report, with status errored and a fingerprinted failure block. An
/// `Err` is returned only when the runner itself cannot operate, such as
/// a missing source directory.
pub async fn run_pipeline(
    pipeline: &PipelineConfig,
    config: &RunnerConfig,
    options: &RunOptions,
) -> Result<BuildReport, PipelineError> {
    let mut report = BuildReport::new(pipeline.language.clone());

    tracing::info!(
        build_id = %report.build_id,
        language = pipeline.language.as_deref().unwrap_or("unspecified"),
        source = %options.source_dir.display(),
        "Executing build"
    );

    let problems = pipeline.validate();
    if !problems.is_empty() {
        let text = problems.join("; ");
        tracing::error!(problems = %text, "Descriptor failed validation");
        report.failure = Some(FailureInfo {
            phase: "descriptor".to_string(),
            command: None,
            category: "config".to_string(),
            fingerprint: failure::fingerprint(&failure::normalize(&text)),
        });
        report.finish(BuildStatus::Errored);
        return Ok(report);
    }

    let ctx = BuildContext::new(pipeline, config, options)?;

    let manager = if options.no_services || pipeline.services.is_empty() {
        None
    } else {
        let db_url = pipeline.database_url()?;
        if let Some(url) = db_url.as_ref() {
            tracing::debug!(database_url = %url.redacted(), "Descriptor database URL");
        }
        let mut specs = Vec::new();
        for kind in &pipeline.services {
            specs.push(ServiceSpec::resolve(*kind, db_url.as_ref(), config)?);
        }
        Some(ServiceManager::new(config, specs))
    };

    if let Some(manager) = &manager {
        if let Err(e) = manager.up().await {
            tracing::error!(error = %e, "Service provisioning failed");
            manager.down().await;
            let text = e.to_string();
            report.failure = Some(FailureInfo {
                phase: "services".to_string(),
                command: None,
                category: "service".to_string(),
                fingerprint: failure::fingerprint(&failure::normalize(&text)),
            });
            report.finish(BuildStatus::Errored);
            return Ok(report);
        }
    }

    let mut sequence = 0u32;
    let mut failed: Option<Phase> = None;
    for phase in [
        Phase::BeforeInstall,
        Phase::Install,
        Phase::BeforeScript,
        Phase::Script,
    ] {
        ctx.run_phase(phase, &mut sequence, &mut failed, &mut report).await;
    }

    let status = verdict(failed);
    if status == BuildStatus::Passed {
        ctx.run_after_success(&mut sequence, &mut report).await;
    }

    if let Some(manager) = &manager {
        if options.keep_services {
            tracing::info!("Leaving service containers running");
        } else {
            manager.down().await;
        }
    }

    report.finish(status);
    tracing::info!(
        build_id = %report.build_id,
        status = %report.status,
        duration_ms = report.duration_ms.unwrap_or(0),
        "Build finished"
    );
    Ok(report)
}

/// Run exactly one phase of the descriptor, without services. The verdict
/// follows the same rules as a full run: a setup phase failure errors the
/// build, a `script` failure fails it, an `after_success` failure is
/// logged and the build still passes.
pub async fn run_single_phase(
    pipeline: &PipelineConfig,
    config: &RunnerConfig,
    phase: Phase,
    options: &RunOptions,
) -> Result<BuildReport, PipelineError> {
    let ctx = BuildContext::new(pipeline, config, options)?;
    let mut report = BuildReport::new(pipeline.language.clone());

    tracing::info!(build_id = %report.build_id, phase = %phase, "Executing single phase");

    let mut sequence = 0u32;
    let mut failed: Option<Phase> = None;
    if phase == Phase::AfterSuccess {
        ctx.run_after_success(&mut sequence, &mut report).await;
    } else {
        ctx.run_phase(phase, &mut sequence, &mut failed, &mut report).await;
    }

    report.finish(verdict(failed));
    Ok(report)
}

fn verdict(failed: Option<Phase>) -> BuildStatus {
    match failed {
        None => BuildStatus::Passed,
        Some(phase) if phase.is_setup() => BuildStatus::Errored,
        Some(_) => BuildStatus::Failed,
    }
}

/// Per-build state shared by every step.
struct BuildContext<'a> {
    config: &'a RunnerConfig,
    options: &'a RunOptions,
    pipeline: &'a PipelineConfig,
    env: Vec<(String, String)>,
    timeout: Duration,
}

impl<'a> BuildContext<'a> {
    fn new(
        pipeline: &'a PipelineConfig,
        config: &'a RunnerConfig,
        options: &'a RunOptions,
    ) -> Result<Self, PipelineError> {
        if !options.source_dir.is_dir() {
            return Err(PipelineError::Config(format!(
                "source directory {} does not exist",
                options.source_dir.display()
            )));
        }
        let env = pipeline
            .env_entries()?
            .into_iter()
            .map(|e| (e.key, e.value))
            .collect();
        let timeout =
            Duration::from_secs(pipeline.timeout_secs.unwrap_or(config.step_timeout_secs));
        Ok(BuildContext {
            config,
            options,
            pipeline,
            env,
            timeout,
        })
    }

    /// Run all commands of `phase`. Once `failed` is set, remaining
    /// commands are recorded as skipped, here and in later phases.
    async fn run_phase(
        &self,
        phase: Phase,
        sequence: &mut u32,
        failed: &mut Option<Phase>,
        report: &mut BuildReport,
    ) {
        for command in self.pipeline.commands(phase) {
            *sequence += 1;
            if failed.is_some() {
                report.record_step(StepReport::skipped(*sequence, phase, command));
                continue;
            }
            let outcome = self.run_step(phase, command, *sequence, report).await;
            if !outcome.success() {
                if report.failure.is_none() {
                    report.failure = Some(failure_info(phase, command, &outcome));
                }
                *failed = Some(phase);
            }
        }
    }

    /// Failures here are logged, never fatal.
    async fn run_after_success(&self, sequence: &mut u32, report: &mut BuildReport) {
        for command in self.pipeline.commands(Phase::AfterSuccess) {
            *sequence += 1;
            let outcome = self
                .run_step(Phase::AfterSuccess, command, *sequence, report)
                .await;
            if !outcome.success() {
                tracing::warn!(
                    command = %command,
                    exit_code = outcome.exit_code,
                    "after_success step failed; build verdict unchanged"
                );
            }
        }
    }

    async fn run_step(
        &self,
        phase: Phase,
        command: &str,
        sequence: u32,
        report: &mut BuildReport,
    ) -> StepOutcome {
        tracing::info!(phase = %phase, command = %command, "Running step");
        if self.options.echo_output {
            println!("[{phase}] $ {command}");
        }

        let outcome = step_executor::run_step(
            command,
            &self.options.source_dir,
            &self.env,
            self.timeout,
            self.config.log_tail_bytes,
        )
        .await;

        if self.options.echo_output {
            print!("{}", outcome.stdout);
            eprint!("{}", outcome.stderr);
        }

        if outcome.success() {
            tracing::info!(
                phase = %phase,
                command = %command,
                duration_ms = outcome.duration_ms,
                "Step passed"
            );
        } else {
            tracing::warn!(
                phase = %phase,
                command = %command,
                exit_code = outcome.exit_code,
                timed_out = outcome.timed_out,
                "Step failed"
            );
        }

        report.record_step(StepReport::from_outcome(sequence, phase, command, &outcome));
        outcome
    }
}

fn failure_info(phase: Phase, command: &str, outcome: &StepOutcome) -> FailureInfo {
    let text = if outcome.stderr.trim().is_empty() {
        &outcome.stdout
    } else {
        &outcome.stderr
    };
    FailureInfo {
        phase: phase.key().to_string(),
        command: Some(command.to_string()),
        category: failure::classify(phase, text, outcome.timed_out).to_string(),
        fingerprint: failure::fingerprint(&failure::normalize(text)),
    }
}
