//! Built-in process definitions
//!
//! Each process module owns its metadata, declared inputs, and plan
//! construction. Prompts here are intentionally short: the interesting
//! contract is the output schema each task declares, not the prose.

pub mod catalog;
pub mod cicd;

pub use catalog::CatalogProcess;
pub use cicd::CicdProcess;

use babysitter_sdk::{AgentSpec, OutputSchema, TaskCtx, TaskDescriptor, TaskIo, TaskKind};
use serde_json::{json, Value};

/// Schema fragment for the optional `artifacts` list every task may return
pub(crate) fn artifact_list_schema() -> Value {
    json!({
        "type": "array",
        "items": {
            "type": "object",
            "required": ["path", "format"],
            "properties": {
                "path": {"type": "string"},
                "format": {"type": "string"},
            },
        },
    })
}

/// Build a task factory for an agent task
///
/// The returned closure mints a fresh descriptor per invocation, with I/O
/// paths namespaced by the invocation's effect id.
pub(crate) fn agent_task(
    name: &str,
    title: &str,
    agent: &str,
    prompt: &str,
    schema: OutputSchema,
    labels: &[&str],
) -> impl Fn(&TaskCtx) -> TaskDescriptor + Send + Sync + 'static {
    let name = name.to_string();
    let title = title.to_string();
    let agent = agent.to_string();
    let prompt = prompt.to_string();
    let labels: Vec<String> = labels.iter().map(|l| l.to_string()).collect();

    move |ctx| TaskDescriptor {
        name: name.clone(),
        kind: TaskKind::Agent,
        title: title.clone(),
        agent: AgentSpec {
            name: agent.clone(),
            prompt: prompt.clone(),
            output_schema: schema.clone(),
        },
        io: TaskIo::for_effect(&ctx.effect_id),
        labels: labels.clone(),
    }
}
