//! End-to-end runner tests driving whole plans through scripted dispatch

use babysitter::dispatch::ScriptedDispatcher;
use babysitter::gate::AutoApproveGate;
use babysitter::processes::{CatalogProcess, CicdProcess};
use babysitter::runtime::Runner;
use babysitter_sdk::{
    async_trait, ApprovalDecision, ApprovalGate, Breakpoint, Clock, SdkError,
};
use chrono::{DateTime, TimeZone, Utc};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};

/// Clock that counts how often it is consulted
#[derive(Default)]
struct CountingClock {
    calls: Mutex<i64>,
}

impl CountingClock {
    fn calls(&self) -> i64 {
        *self.calls.lock().unwrap()
    }
}

impl Clock for CountingClock {
    fn now(&self) -> DateTime<Utc> {
        let mut calls = self.calls.lock().unwrap();
        *calls += 1;
        Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap() + chrono::Duration::seconds(*calls)
    }
}

/// Gate that rejects every breakpoint
struct RejectGate;

#[async_trait]
impl ApprovalGate for RejectGate {
    async fn request(&self, _breakpoint: &Breakpoint) -> Result<ApprovalDecision, SdkError> {
        Ok(ApprovalDecision::Rejected {
            reason: Some("workflows too permissive".to_string()),
        })
    }
}

fn cicd_workflows() -> Value {
    json!([
        {"name": "ci", "path": ".github/workflows/ci.yml"},
        {"name": "release", "path": ".github/workflows/release.yml"},
    ])
}

fn scripted_cicd_run() -> ScriptedDispatcher {
    ScriptedDispatcher::new()
        .script(
            "ci_analysis",
            json!({
                "summary": "Rust workspace with two crates",
                "languages": ["rust"],
                "artifacts": [{"path": "reports/analysis.md", "format": "markdown"}],
            }),
        )
        .script(
            "workflow_setup",
            json!({
                "workflows": cicd_workflows(),
                "artifacts": [
                    {"path": ".github/workflows/ci.yml", "format": "yaml"},
                    {"path": ".github/workflows/release.yml", "format": "yaml"},
                ],
            }),
        )
        .script(
            "security_review",
            json!({
                "passed": true,
                "findings": [],
                "artifacts": [{"path": "reports/security.md", "format": "markdown"}],
            }),
        )
        .script(
            "pipeline_validation",
            json!({"valid": true, "checks": ["lint", "build", "test"]}),
        )
        .script(
            "docs",
            json!({
                "summary": "Pipelines configured for Demo.",
                "artifacts": [{"path": "docs/pipelines.md", "format": "markdown"}],
            }),
        )
}

#[tokio::test]
async fn test_cicd_run_succeeds_with_accumulated_artifacts() {
    let run_dir = tempfile::tempdir().unwrap();
    let dispatcher = Arc::new(scripted_cicd_run());
    let clock = Arc::new(CountingClock::default());
    let runner =
        Runner::new(dispatcher.clone(), Arc::new(AutoApproveGate)).with_clock(clock.clone());

    let report = runner
        .run(&CicdProcess, json!({"projectName": "Demo"}), run_dir.path())
        .await
        .unwrap();

    assert!(report.success);
    assert!(report.error.is_none());
    assert_eq!(report.result["projectName"], "Demo");
    assert_eq!(report.result["workflows"], cicd_workflows());
    assert_eq!(report.result["securityPassed"], true);

    // 1 + 2 + 1 + 0 + 1 artifacts, in call order
    assert_eq!(report.artifacts.len(), 5);
    assert_eq!(report.artifacts[0].path, "reports/analysis.md");
    assert_eq!(report.artifacts[1].path, ".github/workflows/ci.yml");
    assert_eq!(report.artifacts[4].path, "docs/pipelines.md");

    // All five tasks dispatched, in declaration order
    assert_eq!(
        dispatcher.dispatched(),
        vec![
            "ci_analysis",
            "workflow_setup",
            "security_review",
            "pipeline_validation",
            "docs"
        ]
    );

    // Clock consulted exactly twice; duration non-negative
    assert_eq!(clock.calls(), 2);
    assert!(report.duration_ms >= 0);
    assert!(report.finished_at >= report.started_at);

    let state: Value = serde_json::from_str(
        &std::fs::read_to_string(run_dir.path().join("state.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(state["status"], "completed");
    assert_eq!(state["processId"], "cicd-setup");
}

#[tokio::test]
async fn test_task_io_persisted_per_effect_id() {
    let run_dir = tempfile::tempdir().unwrap();
    let dispatcher = Arc::new(scripted_cicd_run());
    let runner = Runner::new(dispatcher, Arc::new(AutoApproveGate));

    runner
        .run(&CicdProcess, json!({"projectName": "Demo"}), run_dir.path())
        .await
        .unwrap();

    let tasks_dir = run_dir.path().join("tasks");
    let mut effect_dirs = 0;
    for entry in std::fs::read_dir(&tasks_dir).unwrap() {
        let dir = entry.unwrap().path();
        effect_dirs += 1;
        assert!(dir.join("input.json").is_file());
        assert!(dir.join("result.json").is_file());
    }
    assert_eq!(effect_dirs, 5);

    let journal = std::fs::read_to_string(run_dir.path().join("journal.jsonl")).unwrap();
    let events: Vec<Value> = journal
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(events.first().unwrap()["event"], "run_started");
    assert_eq!(events.last().unwrap()["event"], "run_completed");
}

#[tokio::test]
async fn test_fail_fast_short_circuits_remaining_tasks() {
    let run_dir = tempfile::tempdir().unwrap();
    let dispatcher = Arc::new(ScriptedDispatcher::new().script(
        "catalog",
        json!({
            "success": false,
            "error": "repository clone failed",
            "details": {"code": 128},
        }),
    ));
    let runner = Runner::new(dispatcher.clone(), Arc::new(AutoApproveGate));

    let report = runner
        .run(
            &CatalogProcess,
            json!({"repository": "acme/widgets"}),
            run_dir.path(),
        )
        .await
        .unwrap();

    assert!(!report.success);
    assert_eq!(report.error.as_deref(), Some("repository clone failed"));
    assert_eq!(report.details.unwrap()["code"], 128);
    // downstream tasks never dispatched
    assert_eq!(dispatcher.dispatched(), vec!["catalog"]);

    let state: Value = serde_json::from_str(
        &std::fs::read_to_string(run_dir.path().join("state.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(state["status"], "failed");
}

#[tokio::test]
async fn test_schema_mismatch_rejected_before_downstream_tasks() {
    let run_dir = tempfile::tempdir().unwrap();
    // "languages" is required by the analysis schema and missing here
    let dispatcher = Arc::new(
        ScriptedDispatcher::new().script("ci_analysis", json!({"summary": "incomplete"})),
    );
    let runner = Runner::new(dispatcher.clone(), Arc::new(AutoApproveGate));

    let report = runner
        .run(&CicdProcess, json!({"projectName": "Demo"}), run_dir.path())
        .await
        .unwrap();

    assert!(!report.success);
    assert!(report.error.unwrap().contains("output schema"));
    assert_eq!(dispatcher.dispatched(), vec!["ci_analysis"]);
}

#[tokio::test]
async fn test_breakpoint_rejection_aborts_run() {
    let run_dir = tempfile::tempdir().unwrap();
    let dispatcher = Arc::new(scripted_cicd_run());
    let clock = Arc::new(CountingClock::default());
    let runner = Runner::new(dispatcher.clone(), Arc::new(RejectGate)).with_clock(clock.clone());

    let report = runner
        .run(&CicdProcess, json!({"projectName": "Demo"}), run_dir.path())
        .await
        .unwrap();

    assert!(!report.success);
    let error = report.error.unwrap();
    assert!(error.contains("rejected"));
    assert!(error.contains("too permissive"));
    // only the tasks before the breakpoint ran
    assert_eq!(dispatcher.dispatched(), vec!["ci_analysis", "workflow_setup"]);
    // failure still reports the artifacts accumulated so far
    assert_eq!(report.artifacts.len(), 3);
    assert_eq!(clock.calls(), 2);

    let state: Value = serde_json::from_str(
        &std::fs::read_to_string(run_dir.path().join("state.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(state["status"], "aborted");
}

#[tokio::test]
async fn test_missing_required_input_fails_before_dispatch() {
    let run_dir = tempfile::tempdir().unwrap();
    let dispatcher = Arc::new(ScriptedDispatcher::new());
    let runner = Runner::new(dispatcher.clone(), Arc::new(AutoApproveGate));

    let err = runner
        .run(&CicdProcess, json!({}), run_dir.path())
        .await
        .unwrap_err();

    assert!(err.to_string().contains("projectName"));
    assert!(dispatcher.dispatched().is_empty());
}
