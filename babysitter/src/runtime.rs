//! Plan runner: strictly sequential execution of a process plan
//!
//! The runner folds over the plan's steps in declaration order. Each task
//! step mints an effect id, persists the assembled args to
//! `tasks/{effect_id}/input.json`, dispatches to the agent boundary,
//! validates the result against the declared output schema, persists it to
//! `tasks/{effect_id}/result.json`, and appends any returned artifacts to
//! the run accumulator. Breakpoint steps suspend the run on the approval
//! gate. There is no parallel fan-out, no retry, and no cancellation.

use anyhow::{Context, Result};
use babysitter_sdk::{
    AgentDispatcher, ApprovalDecision, ApprovalGate, Artifact, Clock, EffectId, Plan,
    ProcessDefinition, RunLog, RunReport, RunState, RunStatus, SdkError, Step, SystemClock,
    TaskCtx,
};
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use tokio::fs;
use uuid::Uuid;

use crate::journal::Journal;

/// How a plan's execution ended
enum RunOutcome {
    Completed(Value),
    Failed {
        error: String,
        details: Option<Value>,
    },
    Aborted {
        title: String,
        reason: Option<String>,
    },
}

/// Executes process plans against a dispatcher, an approval gate, and a clock
pub struct Runner {
    dispatcher: Arc<dyn AgentDispatcher>,
    gate: Arc<dyn ApprovalGate>,
    clock: Arc<dyn Clock>,
}

impl Runner {
    pub fn new(dispatcher: Arc<dyn AgentDispatcher>, gate: Arc<dyn ApprovalGate>) -> Self {
        Self {
            dispatcher,
            gate,
            clock: Arc::new(SystemClock),
        }
    }

    /// Replace the wall clock (tests count calls through this seam)
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Run one process to completion, failure, or abort
    ///
    /// The clock is consulted exactly twice: once before the first step and
    /// once after the last, so `duration_ms` covers the whole run.
    pub async fn run(
        &self,
        process: &dyn ProcessDefinition,
        inputs: Value,
        run_dir: &Path,
    ) -> Result<RunReport> {
        let meta = process.metadata();

        for field in process.inputs() {
            if field.required && inputs.get(&field.name).is_none() {
                return Err(SdkError::MissingInput(field.name).into());
            }
        }

        let plan = process
            .plan(&inputs)
            .with_context(|| format!("process '{}' failed to build a plan", meta.id))?;

        let run_id = Uuid::new_v4();
        let started_at = self.clock.now();

        let mut journal = Journal::create(run_dir, run_id, &meta.id).await?;
        let started = RunLog::RunStarted {
            run_id,
            process_id: meta.id.clone(),
        };
        started.emit();
        journal.append(&started).await?;

        let mut state = RunState::new(inputs);
        let outcome = self
            .execute_plan(&plan, &mut state, run_dir, run_id, &mut journal)
            .await?;

        let finished_at = self.clock.now();
        let duration_ms = (finished_at - started_at).num_milliseconds();

        let report = match outcome {
            RunOutcome::Completed(result) => {
                let done = RunLog::RunCompleted { run_id, duration_ms };
                done.emit();
                journal.append(&done).await?;
                journal.set_status(RunStatus::Completed).await?;
                RunReport {
                    run_id,
                    process_id: meta.id,
                    success: true,
                    result,
                    error: None,
                    details: None,
                    artifacts: state.artifacts,
                    started_at,
                    finished_at,
                    duration_ms,
                }
            }
            RunOutcome::Failed { error, details } => {
                let failed = RunLog::RunFailed {
                    run_id,
                    error: error.clone(),
                };
                failed.emit();
                journal.append(&failed).await?;
                journal.set_status(RunStatus::Failed).await?;
                RunReport {
                    run_id,
                    process_id: meta.id,
                    success: false,
                    result: Value::Null,
                    error: Some(error),
                    details,
                    artifacts: state.artifacts,
                    started_at,
                    finished_at,
                    duration_ms,
                }
            }
            RunOutcome::Aborted { title, reason } => {
                let error = match &reason {
                    Some(reason) => format!("breakpoint '{}' rejected: {}", title, reason),
                    None => format!("breakpoint '{}' rejected", title),
                };
                let failed = RunLog::RunFailed {
                    run_id,
                    error: error.clone(),
                };
                failed.emit();
                journal.append(&failed).await?;
                journal.set_status(RunStatus::Aborted).await?;
                RunReport {
                    run_id,
                    process_id: meta.id,
                    success: false,
                    result: Value::Null,
                    error: Some(error),
                    details: Some(json!({ "breakpoint": title })),
                    artifacts: state.artifacts,
                    started_at,
                    finished_at,
                    duration_ms,
                }
            }
        };

        Ok(report)
    }

    async fn execute_plan(
        &self,
        plan: &Plan,
        state: &mut RunState,
        run_dir: &Path,
        run_id: Uuid,
        journal: &mut Journal,
    ) -> Result<RunOutcome> {
        for (step_idx, step) in plan.steps().iter().enumerate() {
            match step {
                Step::Task {
                    name,
                    factory,
                    args,
                } => {
                    let ctx = TaskCtx {
                        run_id,
                        step: step_idx,
                        effect_id: EffectId::new(),
                    };
                    let task = factory(&ctx);
                    task.agent
                        .output_schema
                        .verify()
                        .with_context(|| format!("task '{}' declares an invalid output schema", name))?;

                    let task_args = args(state);
                    write_json(&run_dir.join(&task.io.input_path), &task_args).await?;

                    let started = RunLog::TaskStarted {
                        step: step_idx,
                        task: name.clone(),
                        effect_id: ctx.effect_id.to_string(),
                        title: task.title.clone(),
                    };
                    started.emit();
                    journal.append(&started).await?;

                    let result = match self.dispatcher.dispatch(&task, &task_args).await {
                        Ok(result) => result,
                        Err(e) => {
                            let failed = RunLog::TaskFailed {
                                task: name.clone(),
                                effect_id: ctx.effect_id.to_string(),
                                error: e.to_string(),
                            };
                            failed.emit();
                            journal.append(&failed).await?;
                            return Ok(RunOutcome::Failed {
                                error: format!("task '{}' failed: {}", name, e),
                                details: None,
                            });
                        }
                    };

                    // Schema mismatch is terminal: no retry, downstream steps
                    // never execute.
                    if let Err(e) = task.agent.output_schema.validate(&result) {
                        let failed = RunLog::TaskFailed {
                            task: name.clone(),
                            effect_id: ctx.effect_id.to_string(),
                            error: e.to_string(),
                        };
                        failed.emit();
                        journal.append(&failed).await?;
                        return Ok(RunOutcome::Failed {
                            error: format!("task '{}' failed: {}", name, e),
                            details: None,
                        });
                    }

                    write_json(&run_dir.join(&task.io.output_path), &result).await?;

                    let artifacts = collect_artifacts(&result)
                        .with_context(|| format!("task '{}' returned malformed artifacts", name))?;
                    for artifact in &artifacts {
                        let recorded = RunLog::ArtifactRecorded {
                            path: artifact.path.clone(),
                            format: artifact.format.clone(),
                        };
                        recorded.emit();
                        journal.append(&recorded).await?;
                    }
                    let artifact_count = artifacts.len();
                    state.artifacts.extend(artifacts);

                    let completed = RunLog::TaskCompleted {
                        task: name.clone(),
                        effect_id: ctx.effect_id.to_string(),
                        artifacts: artifact_count,
                    };
                    completed.emit();
                    journal.append(&completed).await?;

                    // Uniform fail-fast: a result carrying success=false is
                    // propagated as the process's own failure.
                    if result.get("success") == Some(&Value::Bool(false)) {
                        let error = result
                            .get("error")
                            .and_then(Value::as_str)
                            .unwrap_or("task reported failure")
                            .to_string();
                        let details = result
                            .get("details")
                            .or_else(|| result.get("metadata"))
                            .cloned()
                            .filter(|d| !d.is_null());
                        return Ok(RunOutcome::Failed { error, details });
                    }

                    state.outputs.insert(name.clone(), result);
                }
                Step::Breakpoint { factory } => {
                    let breakpoint = factory(state);
                    journal.set_status(RunStatus::AwaitingApproval).await?;
                    let raised = RunLog::BreakpointRaised {
                        step: step_idx,
                        title: breakpoint.title.clone(),
                        question: breakpoint.question.clone(),
                    };
                    raised.emit();
                    journal.append(&raised).await?;

                    let decision = self.gate.request(&breakpoint).await?;
                    let resolved = RunLog::BreakpointResolved {
                        title: breakpoint.title.clone(),
                        approved: decision == ApprovalDecision::Approved,
                    };
                    resolved.emit();
                    journal.append(&resolved).await?;

                    match decision {
                        ApprovalDecision::Approved => {
                            journal.set_status(RunStatus::Running).await?;
                        }
                        ApprovalDecision::Rejected { reason } => {
                            return Ok(RunOutcome::Aborted {
                                title: breakpoint.title,
                                reason,
                            });
                        }
                    }
                }
            }
        }

        Ok(RunOutcome::Completed(plan.finish(state)))
    }
}

/// Write a JSON value, creating parent directories as needed
async fn write_json(path: &Path, value: &Value) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    let mut json = serde_json::to_string_pretty(value).context("Failed to serialize JSON")?;
    json.push('\n');
    fs::write(path, json)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))
}

/// Pull `{path, format}` records out of a task result's `artifacts` field
fn collect_artifacts(result: &Value) -> Result<Vec<Artifact>> {
    match result.get("artifacts") {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(value) => serde_json::from_value(value.clone())
            .context("artifacts must be a list of {path, format} records"),
    }
}
