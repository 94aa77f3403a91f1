//! Contract crate for the babysitter orchestration runtime.
//!
//! Process definitions describe an ordered plan of agent tasks and approval
//! breakpoints; the runtime crate executes that plan. This crate holds the
//! shared pieces both sides agree on: the task/result contract, the plan
//! types, the trait seams (dispatcher, approval gate, clock), structured run
//! events, and console logging macros.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

// Re-export async trait for convenience
pub use async_trait::async_trait;

/// Errors produced at the contract boundary
#[derive(Debug, thiserror::Error)]
pub enum SdkError {
    /// A task declares a structurally invalid output schema
    #[error("output schema is invalid: {0}")]
    InvalidSchema(String),
    /// The output schema could not be compiled as JSON Schema
    #[error("output schema failed to compile: {0}")]
    SchemaCompile(String),
    /// An agent result does not conform to the declared output schema
    #[error("result does not conform to output schema: {0}")]
    SchemaMismatch(String),
    /// A required process input is absent
    #[error("missing required input '{0}'")]
    MissingInput(String),
    /// No process is registered under the requested id
    #[error("process '{0}' is not registered")]
    UnknownProcess(String),
    /// The agent boundary failed to produce a result
    #[error("agent dispatch failed: {0}")]
    Dispatch(String),
    /// The approval surface failed to produce a decision
    #[error("approval gate failed: {0}")]
    Gate(String),
}

/// Process metadata (id, name, description)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessMetadata {
    pub id: String,
    pub name: String,
    pub description: String,
}

/// A declared process input
///
/// Value shapes are deliberately unconstrained; only presence of required
/// inputs is checked before a run starts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputField {
    pub name: String,
    pub description: String,
    pub required: bool,
}

/// Unique identifier for one task invocation, used to namespace its I/O paths
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EffectId(Uuid);

impl EffectId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EffectId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EffectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Per-invocation context handed to task factories
#[derive(Debug, Clone)]
pub struct TaskCtx {
    pub run_id: Uuid,
    /// Zero-based position of this step in the plan
    pub step: usize,
    pub effect_id: EffectId,
}

/// Task I/O locations, relative to the run directory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskIo {
    pub input_path: String,
    pub output_path: String,
}

impl TaskIo {
    /// Conventional `tasks/{effect_id}/...` paths for one invocation
    pub fn for_effect(effect_id: &EffectId) -> Self {
        Self {
            input_path: format!("tasks/{}/input.json", effect_id),
            output_path: format!("tasks/{}/result.json", effect_id),
        }
    }
}

/// Kind of work a task descriptor requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Agent,
}

/// The agent half of a task: persona name, prompt, and result contract
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSpec {
    /// Persona identifier resolved by the execution environment
    pub name: String,
    pub prompt: String,
    pub output_schema: OutputSchema,
}

/// One unit of work dispatched to an external agent
///
/// Immutable once constructed; built fresh per invocation by a task factory
/// closing over the run-specific [`TaskCtx`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskDescriptor {
    pub name: String,
    pub kind: TaskKind,
    pub title: String,
    pub agent: AgentSpec,
    pub io: TaskIo,
    #[serde(default)]
    pub labels: Vec<String>,
}

/// A reference to externally produced content
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub path: String,
    pub format: String,
}

/// A human-approval request raised mid-run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Breakpoint {
    pub question: String,
    pub title: String,
    /// Snapshot of accumulated context presented to the approver
    pub context: Value,
}

/// Run status mirrored into `state.json`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    AwaitingApproval,
    Completed,
    Failed,
    Aborted,
}

/// Outcome of an approval request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum ApprovalDecision {
    Approved,
    Rejected { reason: Option<String> },
}

/// Structured result of one run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub process_id: String,
    pub success: bool,
    /// Process-shaped result value; null when the run did not complete
    pub result: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    pub artifacts: Vec<Artifact>,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub finished_at: chrono::DateTime<chrono::Utc>,
    pub duration_ms: i64,
}

fn object_type() -> String {
    "object".to_string()
}

/// JSON-Schema-shaped contract for an agent result
///
/// `required` and `properties` are modeled explicitly so the structural
/// invariant can be checked without compiling the schema; any other schema
/// keywords pass through untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputSchema {
    #[serde(rename = "type", default = "object_type")]
    pub schema_type: String,
    #[serde(default)]
    pub required: Vec<String>,
    #[serde(default)]
    pub properties: Map<String, Value>,
    #[serde(flatten)]
    pub rest: Map<String, Value>,
}

impl OutputSchema {
    /// Empty object schema to build on
    pub fn object() -> Self {
        Self {
            schema_type: object_type(),
            required: Vec::new(),
            properties: Map::new(),
            rest: Map::new(),
        }
    }

    /// Add a property and mark it required
    pub fn require(mut self, name: &str, schema: Value) -> Self {
        self.required.push(name.to_string());
        self.properties.insert(name.to_string(), schema);
        self
    }

    /// Add an optional property
    pub fn optional(mut self, name: &str, schema: Value) -> Self {
        self.properties.insert(name.to_string(), schema);
        self
    }

    /// Check the structural invariant: `required` is non-empty and every
    /// required field also appears in `properties`.
    pub fn verify(&self) -> Result<(), SdkError> {
        if self.required.is_empty() {
            return Err(SdkError::InvalidSchema(
                "required must name at least one field".to_string(),
            ));
        }
        for field in &self.required {
            if !self.properties.contains_key(field) {
                return Err(SdkError::InvalidSchema(format!(
                    "required field '{}' has no entry in properties",
                    field
                )));
            }
        }
        Ok(())
    }

    /// Validate an agent result against this schema
    ///
    /// No retry semantics: a mismatch is terminal for the invocation.
    pub fn validate(&self, instance: &Value) -> Result<(), SdkError> {
        let schema_value = serde_json::to_value(self)
            .map_err(|e| SdkError::SchemaCompile(e.to_string()))?;
        let compiled = jsonschema::JSONSchema::compile(&schema_value)
            .map_err(|e| SdkError::SchemaCompile(e.to_string()))?;
        if let Err(errors) = compiled.validate(instance) {
            let joined = errors
                .map(|e| e.to_string())
                .collect::<Vec<_>>()
                .join("; ");
            return Err(SdkError::SchemaMismatch(joined));
        }
        Ok(())
    }
}

/// Accumulated state threaded through a run
///
/// Replaces a shared mutable artifact list: the runner folds over the plan,
/// appending to this value and handing immutable views to step closures.
#[derive(Debug, Clone)]
pub struct RunState {
    pub inputs: Value,
    /// Validated task results keyed by task name, in completion order
    pub outputs: BTreeMap<String, Value>,
    /// Artifacts appended in call order, never mutated or dropped
    pub artifacts: Vec<Artifact>,
}

impl RunState {
    pub fn new(inputs: Value) -> Self {
        Self {
            inputs,
            outputs: BTreeMap::new(),
            artifacts: Vec::new(),
        }
    }

    /// Validated result of an upstream task, if it has completed
    pub fn output(&self, task: &str) -> Option<&Value> {
        self.outputs.get(task)
    }
}

/// Builds a fresh task descriptor for one invocation
pub type TaskFactory = Box<dyn Fn(&TaskCtx) -> TaskDescriptor + Send + Sync>;
/// Assembles a task's JSON input from accumulated run state
pub type ArgsFn = Box<dyn Fn(&RunState) -> Value + Send + Sync>;
/// Builds a breakpoint from accumulated run state
pub type BreakpointFn = Box<dyn Fn(&RunState) -> Breakpoint + Send + Sync>;
/// Assembles the success result from the final run state
pub type FinishFn = Box<dyn Fn(&RunState) -> Value + Send + Sync>;

/// One step in a plan
pub enum Step {
    Task {
        name: String,
        factory: TaskFactory,
        args: ArgsFn,
    },
    Breakpoint { factory: BreakpointFn },
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::Task { name, .. } => f.debug_struct("Task").field("name", name).finish(),
            Step::Breakpoint { .. } => f.debug_struct("Breakpoint").finish(),
        }
    }
}

/// An explicit ordered pipeline executed strictly sequentially
///
/// Declaration order is execution order; there is no reordering, batching,
/// or cancellation.
pub struct Plan {
    steps: Vec<Step>,
    finish: FinishFn,
}

impl fmt::Debug for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Plan").field("steps", &self.steps).finish()
    }
}

impl Plan {
    pub fn builder() -> PlanBuilder {
        PlanBuilder { steps: Vec::new() }
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn finish(&self, state: &RunState) -> Value {
        (self.finish)(state)
    }
}

/// Builder for [`Plan`]
pub struct PlanBuilder {
    steps: Vec<Step>,
}

impl PlanBuilder {
    /// Append an agent task step
    pub fn task<F, A>(mut self, name: impl Into<String>, factory: F, args: A) -> Self
    where
        F: Fn(&TaskCtx) -> TaskDescriptor + Send + Sync + 'static,
        A: Fn(&RunState) -> Value + Send + Sync + 'static,
    {
        self.steps.push(Step::Task {
            name: name.into(),
            factory: Box::new(factory),
            args: Box::new(args),
        });
        self
    }

    /// Append an approval breakpoint step
    pub fn breakpoint<F>(mut self, factory: F) -> Self
    where
        F: Fn(&RunState) -> Breakpoint + Send + Sync + 'static,
    {
        self.steps.push(Step::Breakpoint {
            factory: Box::new(factory),
        });
        self
    }

    /// Close the plan with a result assembler
    pub fn finish<F>(self, finish: F) -> Plan
    where
        F: Fn(&RunState) -> Value + Send + Sync + 'static,
    {
        Plan {
            steps: self.steps,
            finish: Box::new(finish),
        }
    }
}

/// A process: metadata, declared inputs, and a plan for one run
///
/// Plans exist only for the duration of a run; processes are not versioned
/// or persisted.
pub trait ProcessDefinition: Send + Sync {
    fn metadata(&self) -> ProcessMetadata;

    fn inputs(&self) -> Vec<InputField> {
        Vec::new()
    }

    fn plan(&self, inputs: &Value) -> Result<Plan, SdkError>;
}

/// The sole boundary to the LLM execution environment
///
/// A dispatcher is a black box with a schema contract, not a pure function;
/// results are non-deterministic and validated by the runner afterwards.
#[async_trait]
pub trait AgentDispatcher: Send + Sync {
    async fn dispatch(&self, task: &TaskDescriptor, args: &Value) -> Result<Value, SdkError>;
}

/// The human-approval surface
#[async_trait]
pub trait ApprovalGate: Send + Sync {
    async fn request(&self, breakpoint: &Breakpoint) -> Result<ApprovalDecision, SdkError>;
}

/// Time source for run timing; a trait so tests can count calls
pub trait Clock: Send + Sync {
    fn now(&self) -> chrono::DateTime<chrono::Utc>;
}

/// Wall-clock time via chrono
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> chrono::DateTime<chrono::Utc> {
        chrono::Utc::now()
    }
}

/// Structured run events, journaled and emitted to stderr for live observers
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunLog {
    RunStarted {
        run_id: Uuid,
        process_id: String,
    },
    TaskStarted {
        step: usize,
        task: String,
        effect_id: String,
        title: String,
    },
    TaskCompleted {
        task: String,
        effect_id: String,
        artifacts: usize,
    },
    TaskFailed {
        task: String,
        effect_id: String,
        error: String,
    },
    BreakpointRaised {
        step: usize,
        title: String,
        question: String,
    },
    BreakpointResolved {
        title: String,
        approved: bool,
    },
    ArtifactRecorded {
        path: String,
        format: String,
    },
    RunCompleted {
        run_id: Uuid,
        duration_ms: i64,
    },
    RunFailed {
        run_id: Uuid,
        error: String,
    },
}

impl RunLog {
    /// Journal event name for this variant
    pub fn name(&self) -> &'static str {
        match self {
            RunLog::RunStarted { .. } => "run_started",
            RunLog::TaskStarted { .. } => "task_started",
            RunLog::TaskCompleted { .. } => "task_completed",
            RunLog::TaskFailed { .. } => "task_failed",
            RunLog::BreakpointRaised { .. } => "breakpoint_raised",
            RunLog::BreakpointResolved { .. } => "breakpoint_resolved",
            RunLog::ArtifactRecorded { .. } => "artifact_recorded",
            RunLog::RunCompleted { .. } => "run_completed",
            RunLog::RunFailed { .. } => "run_failed",
        }
    }

    /// Emit this event to stderr for machine consumption
    pub fn emit(&self) {
        if let Ok(json) = serde_json::to_string(self) {
            use std::io::Write;
            eprintln!("__RUN_EVENT__:{}", json);
            // Force flush stderr in async contexts
            let _ = std::io::stderr().flush();
        }
    }
}

// ============================================================================
// Console Logging Macros
// ============================================================================
// Colored human-readable output, complementing the structured RunLog events.
// ============================================================================

/// Logs an informational message.
#[macro_export]
macro_rules! log_info {
    ($message:expr) => {
        println!("\x1b[36mℹ {}\x1b[0m", $message);
    };
    ($fmt:expr, $($arg:tt)*) => {
        println!("\x1b[36mℹ {}\x1b[0m", format!($fmt, $($arg)*));
    };
}

/// Logs a warning message.
#[macro_export]
macro_rules! log_warning {
    ($message:expr) => {
        println!("\x1b[33m⚠ Warning: {}\x1b[0m", $message);
    };
    ($fmt:expr, $($arg:tt)*) => {
        println!("\x1b[33m⚠ Warning: {}\x1b[0m", format!($fmt, $($arg)*));
    };
}

/// Logs that a file has been saved.
#[macro_export]
macro_rules! log_file_saved {
    ($path:expr) => {
        println!("\x1b[32m✓ Saved: {}\x1b[0m", $path);
    };
}

/// Logs the start of a plan step with a header.
#[macro_export]
macro_rules! log_step_start {
    ($step:expr, $title:expr) => {
        println!("\x1b[1;36m═══ STEP {}: {} ═══\x1b[0m", $step, $title);
    };
}

/// Logs the completion of a plan step.
#[macro_export]
macro_rules! log_step_complete {
    ($step:expr) => {
        println!("\x1b[32m✓ Step {} complete\x1b[0m", $step);
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_schema_verify_ok() {
        let schema = OutputSchema::object()
            .require("summary", json!({"type": "string"}))
            .optional("notes", json!({"type": "string"}));

        assert!(schema.verify().is_ok());
    }

    #[test]
    fn test_schema_verify_empty_required() {
        let schema = OutputSchema::object().optional("summary", json!({"type": "string"}));

        let err = schema.verify().unwrap_err();
        assert!(matches!(err, SdkError::InvalidSchema(_)));
    }

    #[test]
    fn test_schema_verify_required_without_property() {
        let mut schema = OutputSchema::object().require("summary", json!({"type": "string"}));
        schema.required.push("missing".to_string());

        let err = schema.verify().unwrap_err();
        assert!(err.to_string().contains("missing"));
    }

    #[test]
    fn test_schema_validate_conforming_result() {
        let schema = OutputSchema::object()
            .require("summary", json!({"type": "string"}))
            .require("count", json!({"type": "integer"}));

        let result = json!({"summary": "done", "count": 3});
        assert!(schema.validate(&result).is_ok());
    }

    #[test]
    fn test_schema_validate_missing_required_field() {
        let schema = OutputSchema::object().require("summary", json!({"type": "string"}));

        let err = schema.validate(&json!({"other": 1})).unwrap_err();
        assert!(matches!(err, SdkError::SchemaMismatch(_)));
    }

    #[test]
    fn test_schema_validate_wrong_type() {
        let schema = OutputSchema::object().require("count", json!({"type": "integer"}));

        let err = schema.validate(&json!({"count": "three"})).unwrap_err();
        assert!(matches!(err, SdkError::SchemaMismatch(_)));
    }

    #[test]
    fn test_task_io_paths_namespaced_by_effect_id() {
        let effect_id = EffectId::new();
        let io = TaskIo::for_effect(&effect_id);

        assert_eq!(io.input_path, format!("tasks/{}/input.json", effect_id));
        assert_eq!(io.output_path, format!("tasks/{}/result.json", effect_id));
    }

    #[test]
    fn test_run_log_serialization_tag() {
        let log = RunLog::TaskCompleted {
            task: "analysis".to_string(),
            effect_id: "e1".to_string(),
            artifacts: 2,
        };

        let json = serde_json::to_value(&log).unwrap();
        assert_eq!(json["type"], "task_completed");
        assert_eq!(json["artifacts"], 2);
        assert_eq!(log.name(), "task_completed");
    }

    #[test]
    fn test_plan_builder_preserves_declaration_order() {
        let descriptor = |name: &str| {
            let name = name.to_string();
            move |ctx: &TaskCtx| TaskDescriptor {
                name: name.clone(),
                kind: TaskKind::Agent,
                title: name.clone(),
                agent: AgentSpec {
                    name: "agent".to_string(),
                    prompt: "prompt".to_string(),
                    output_schema: OutputSchema::object()
                        .require("summary", json!({"type": "string"})),
                },
                io: TaskIo::for_effect(&ctx.effect_id),
                labels: Vec::new(),
            }
        };

        let plan = Plan::builder()
            .task("first", descriptor("first"), |_| json!({}))
            .breakpoint(|_| Breakpoint {
                question: "Continue?".to_string(),
                title: "Gate".to_string(),
                context: json!({}),
            })
            .task("second", descriptor("second"), |_| json!({}))
            .finish(|_| json!({"done": true}));

        let names: Vec<String> = plan
            .steps()
            .iter()
            .map(|s| match s {
                Step::Task { name, .. } => name.clone(),
                Step::Breakpoint { .. } => "<breakpoint>".to_string(),
            })
            .collect();
        assert_eq!(names, vec!["first", "<breakpoint>", "second"]);
    }

    #[test]
    fn test_run_state_accumulates_outputs() {
        let mut state = RunState::new(json!({"projectName": "Demo"}));
        state
            .outputs
            .insert("analysis".to_string(), json!({"summary": "ok"}));
        state.artifacts.push(Artifact {
            path: "reports/analysis.md".to_string(),
            format: "markdown".to_string(),
        });

        assert_eq!(state.output("analysis").unwrap()["summary"], "ok");
        assert!(state.output("later").is_none());
        assert_eq!(state.artifacts.len(), 1);
    }
}
