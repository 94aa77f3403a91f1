//! Agent dispatch implementations
//!
//! The runner talks to agents only through [`AgentDispatcher`]. The command
//! dispatcher spawns a configured agent program per task; the scripted
//! dispatcher serves canned results for tests and dry runs.

use babysitter_sdk::{async_trait, AgentDispatcher, SdkError, TaskDescriptor};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::process::Stdio;
use std::sync::Mutex;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::prompt::{extract_first_json, render_prompt};

const DEFAULT_TEMPLATE: &str = "{{task}}\n\nInput:\n{{context}}\n\nRespond with a single JSON object conforming to the declared output schema.\n";

/// Dispatches tasks by spawning an external agent command
///
/// The agent persona name is passed as the final argument, the rendered
/// prompt is piped to stdin, and the first JSON value found on stdout is
/// taken as the result.
pub struct CommandDispatcher {
    program: String,
    args: Vec<String>,
    prompt_template: Option<String>,
}

impl CommandDispatcher {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            prompt_template: None,
        }
    }

    /// Parse a full command line like `claude --print` into a dispatcher
    pub fn from_command_line(command: &str) -> Result<Self, SdkError> {
        let mut parts = command.split_whitespace().map(str::to_string);
        let program = parts
            .next()
            .ok_or_else(|| SdkError::Dispatch("agent command is empty".to_string()))?;
        Ok(Self::new(program, parts.collect()))
    }

    /// Override the default prompt template
    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.prompt_template = Some(template.into());
        self
    }
}

#[async_trait]
impl AgentDispatcher for CommandDispatcher {
    async fn dispatch(&self, task: &TaskDescriptor, args: &Value) -> Result<Value, SdkError> {
        let template = self.prompt_template.as_deref().unwrap_or(DEFAULT_TEMPLATE);
        let prompt = render_prompt(template, &task.agent.prompt, args)
            .map_err(|e| SdkError::Dispatch(e.to_string()))?;

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .arg(&task.agent.name)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = cmd.spawn().map_err(|e| {
            SdkError::Dispatch(format!("failed to spawn '{}': {}", self.program, e))
        })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(prompt.as_bytes())
                .await
                .map_err(|e| SdkError::Dispatch(format!("failed to write prompt: {}", e)))?;
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| SdkError::Dispatch(format!("agent command failed: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SdkError::Dispatch(format!(
                "agent command exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        extract_first_json(&stdout).map_err(|e| SdkError::Dispatch(e.to_string()))
    }
}

/// Serves pre-scripted results keyed by task name
///
/// Each dispatched task consumes the next queued result for its name, and
/// the dispatch order is recorded so tests can assert that downstream tasks
/// were never invoked.
#[derive(Default)]
pub struct ScriptedDispatcher {
    results: Mutex<HashMap<String, VecDeque<Value>>>,
    dispatched: Mutex<Vec<String>>,
}

impl ScriptedDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a result for the named task
    pub fn script(self, task_name: &str, result: Value) -> Self {
        self.results
            .lock()
            .unwrap()
            .entry(task_name.to_string())
            .or_default()
            .push_back(result);
        self
    }

    /// Task names in dispatch order
    pub fn dispatched(&self) -> Vec<String> {
        self.dispatched.lock().unwrap().clone()
    }
}

#[async_trait]
impl AgentDispatcher for ScriptedDispatcher {
    async fn dispatch(&self, task: &TaskDescriptor, _args: &Value) -> Result<Value, SdkError> {
        self.dispatched.lock().unwrap().push(task.name.clone());
        self.results
            .lock()
            .unwrap()
            .get_mut(&task.name)
            .and_then(|queue| queue.pop_front())
            .ok_or_else(|| {
                SdkError::Dispatch(format!("no scripted result for task '{}'", task.name))
            })
    }
}
