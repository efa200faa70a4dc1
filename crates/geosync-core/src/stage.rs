//! Stage runner.
//!
//! Stages run in order and each stage runs its steps in order. The first
//! failing step aborts the run unless its stage is marked
//! `continue_on_failure`, in which case the failure is logged and the next
//! stage starts. Scratch data is cleared when the run ends either way.

use std::fmt::Debug;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use log::warn;
use thiserror::Error;

use crate::context::RunContext;
use crate::error::{Result, SyncError};
use crate::runlog::started_banner;

/// What a successful step reports back.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StepOutcome {
    /// Rows written, when the step writes a dataset
    pub rows: Option<u64>,
    /// Extra detail for the run log
    pub detail: Option<String>,
}

impl StepOutcome {
    #[must_use]
    pub fn rows(rows: u64) -> Self {
        Self {
            rows: Some(rows),
            detail: None,
        }
    }

    #[must_use]
    pub fn detail(detail: impl Into<String>) -> Self {
        Self {
            rows: None,
            detail: Some(detail.into()),
        }
    }
}

/// One unit of work inside a stage.
#[async_trait]
pub trait Step: Send + Sync + Debug {
    /// Short description used in the run log.
    fn describe(&self) -> String;

    async fn run(&self, ctx: &RunContext) -> Result<StepOutcome>;
}

/// A named, ordered group of steps.
#[derive(Debug)]
pub struct Stage {
    pub name: String,
    pub description: String,
    /// Log a failure and move to the next stage instead of aborting.
    pub continue_on_failure: bool,
    pub steps: Vec<Box<dyn Step>>,
}

impl Stage {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            continue_on_failure: false,
            steps: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    #[must_use]
    pub fn with_continue_on_failure(mut self, continue_on_failure: bool) -> Self {
        self.continue_on_failure = continue_on_failure;
        self
    }

    #[must_use]
    pub fn with_step(mut self, step: impl Step + 'static) -> Self {
        self.steps.push(Box::new(step));
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageStatus {
    Succeeded,
    /// Failed at the named step; the run continued.
    Failed { step: String, message: String },
    /// Not reached because an earlier stage aborted the run.
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageReport {
    pub name: String,
    pub status: StageStatus,
    pub steps_completed: usize,
    pub elapsed: Duration,
}

/// Per-stage results of a run.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub stages: Vec<StageReport>,
    pub elapsed: Duration,
}

impl RunSummary {
    /// Stages that failed but let the run continue.
    #[must_use]
    pub fn failed_stages(&self) -> Vec<&StageReport> {
        self.stages
            .iter()
            .filter(|s| matches!(s.status, StageStatus::Failed { .. }))
            .collect()
    }
}

/// A run stopped by a failing step.
#[derive(Debug, Error)]
#[error("Stage '{stage}' aborted at '{step}': {source}")]
pub struct RunAborted {
    pub stage: String,
    pub step: String,
    #[source]
    pub source: SyncError,
    /// What ran before the abort, with the remaining stages skipped
    pub summary: RunSummary,
}

/// Logs a line, falling back to the `log` facade if the run log is gone.
fn note(ctx: &RunContext, line: &str) {
    if let Err(e) = ctx.log.info(line) {
        warn!("Run log write failed: {e}");
    }
}

fn note_error(ctx: &RunContext, line: &str) {
    if let Err(e) = ctx.log.error(line) {
        warn!("Run log write failed: {e}");
    }
}

fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}

/// Executes stages against a run context.
#[derive(Debug, Default)]
pub struct StageRunner;

impl StageRunner {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Runs every stage in order.
    ///
    /// # Errors
    ///
    /// Returns [`RunAborted`] naming the stage and step that failed. Stages
    /// after it are reported as skipped.
    pub async fn run(
        &self,
        stages: &[Stage],
        ctx: &RunContext,
    ) -> std::result::Result<RunSummary, RunAborted> {
        let started = Instant::now();
        note(ctx, &started_banner(ctx.started_at, &ctx.pipeline));

        let mut summary = RunSummary::default();
        for (index, stage) in stages.iter().enumerate() {
            match self.run_stage(stage, ctx).await {
                Ok(report) => summary.stages.push(report),
                Err((report, step, error)) => {
                    let message = format!(
                        "Stage '{}' failed at '{step}' ({}): {}",
                        stage.name,
                        error.kind(),
                        error.user_message()
                    );
                    note_error(ctx, &message);
                    if let Some(hint) = error.recovery_suggestion() {
                        note(ctx, &format!("Suggestion: {hint}"));
                    }

                    summary.stages.push(report);
                    if stage.continue_on_failure {
                        continue;
                    }

                    summary.stages.extend(stages[index + 1..].iter().map(|s| StageReport {
                        name: s.name.clone(),
                        status: StageStatus::Skipped,
                        steps_completed: 0,
                        elapsed: Duration::ZERO,
                    }));
                    summary.elapsed = started.elapsed();
                    self.finish(ctx, &summary, false);
                    return Err(RunAborted {
                        stage: stage.name.clone(),
                        step,
                        source: error,
                        summary,
                    });
                },
            }
        }

        summary.elapsed = started.elapsed();
        self.finish(ctx, &summary, true);
        Ok(summary)
    }

    async fn run_stage(
        &self,
        stage: &Stage,
        ctx: &RunContext,
    ) -> std::result::Result<StageReport, (StageReport, String, SyncError)> {
        let started = Instant::now();
        if stage.description.is_empty() {
            note(ctx, &format!("Starting stage: {}", stage.name));
        } else {
            note(
                ctx,
                &format!("Starting stage: {} ({})", stage.name, stage.description),
            );
        }

        let mut completed = 0;
        for step in &stage.steps {
            let description = step.describe();
            note(ctx, &format!("  {description}"));
            match step.run(ctx).await {
                Ok(outcome) => {
                    completed += 1;
                    match (outcome.rows, outcome.detail) {
                        (Some(rows), Some(detail)) => {
                            note(ctx, &format!("    {rows} rows, {detail}"));
                        },
                        (Some(rows), None) => note(ctx, &format!("    {rows} rows")),
                        (None, Some(detail)) => note(ctx, &format!("    {detail}")),
                        (None, None) => {},
                    }
                },
                Err(error) => {
                    let report = StageReport {
                        name: stage.name.clone(),
                        status: StageStatus::Failed {
                            step: description.clone(),
                            message: error.to_string(),
                        },
                        steps_completed: completed,
                        elapsed: started.elapsed(),
                    };
                    return Err((report, description, error));
                },
            }
        }

        note(
            ctx,
            &format!(
                "Finished stage: {} in {}",
                stage.name,
                format_elapsed(started.elapsed())
            ),
        );
        Ok(StageReport {
            name: stage.name.clone(),
            status: StageStatus::Succeeded,
            steps_completed: completed,
            elapsed: started.elapsed(),
        })
    }

    fn finish(&self, ctx: &RunContext, summary: &RunSummary, completed: bool) {
        match ctx.clear_scratch() {
            Ok(0) => {},
            Ok(n) => note(ctx, &format!("Cleared {n} scratch datasets")),
            Err(e) => warn!("Could not clear scratch workspace: {e}"),
        }
        let failed = summary.failed_stages().len();
        let line = match (completed, failed) {
            (true, 0) => format!("Run completed in {}", format_elapsed(summary.elapsed)),
            (true, n) => format!(
                "Run completed with {n} failed stage(s) in {}",
                format_elapsed(summary.elapsed)
            ),
            (false, _) => format!("Run aborted after {}", format_elapsed(summary.elapsed)),
        };
        note(ctx, &line);
    }
}
