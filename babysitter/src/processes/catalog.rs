//! Repository cataloging process
//!
//! The cataloging task reports an explicit success flag and the run fails
//! fast on it: a repository that cannot be cataloged never reaches the
//! assessment or summary tasks.

use babysitter_sdk::{
    InputField, OutputSchema, Plan, ProcessDefinition, ProcessMetadata, SdkError,
};
use serde_json::{json, Value};

use super::{agent_task, artifact_list_schema};

pub struct CatalogProcess;

impl ProcessDefinition for CatalogProcess {
    fn metadata(&self) -> ProcessMetadata {
        ProcessMetadata {
            id: "repo-catalog".to_string(),
            name: "Repository Catalog".to_string(),
            description: "Catalog a repository and assess its community health".to_string(),
        }
    }

    fn inputs(&self) -> Vec<InputField> {
        vec![InputField {
            name: "repository".to_string(),
            description: "Repository to catalog".to_string(),
            required: true,
        }]
    }

    fn plan(&self, inputs: &Value) -> Result<Plan, SdkError> {
        let repository = inputs
            .get("repository")
            .and_then(Value::as_str)
            .ok_or_else(|| SdkError::MissingInput("repository".to_string()))?
            .to_string();

        let plan = Plan::builder()
            .task(
                "catalog",
                agent_task(
                    "catalog",
                    "Catalog repository contents",
                    "repo-cataloger",
                    "Inventory the repository: modules, entry points, and documentation coverage. Set success=false with an error if the repository cannot be cataloged.",
                    OutputSchema::object()
                        .require("success", json!({"type": "boolean"}))
                        .optional("entries", json!({"type": "array", "items": {"type": "object"}}))
                        .optional("error", json!({"type": "string"}))
                        .optional("details", json!({"type": "object"}))
                        .optional("artifacts", artifact_list_schema()),
                    &["catalog"],
                ),
                {
                    let repository = repository.clone();
                    move |_state| json!({ "repository": repository })
                },
            )
            .task(
                "community_assessment",
                agent_task(
                    "community_assessment",
                    "Assess community health",
                    "community-assessor",
                    "Score the repository's community health: contribution activity, responsiveness, and documentation.",
                    OutputSchema::object()
                        .require("score", json!({"type": "number", "minimum": 0, "maximum": 100}))
                        .require("notes", json!({"type": "array", "items": {"type": "string"}}))
                        .optional("artifacts", artifact_list_schema()),
                    &["catalog", "community"],
                ),
                |state| {
                    json!({
                        "entries": state.output("catalog").and_then(|o| o.get("entries")),
                    })
                },
            )
            .task(
                "summary",
                agent_task(
                    "summary",
                    "Summarize the catalog",
                    "summarizer",
                    "Write a one-paragraph summary of the catalog and assessment.",
                    OutputSchema::object()
                        .require("summary", json!({"type": "string"}))
                        .optional("artifacts", artifact_list_schema()),
                    &["catalog", "summary"],
                ),
                |state| {
                    json!({
                        "entries": state.output("catalog").and_then(|o| o.get("entries")),
                        "assessment": state.output("community_assessment"),
                    })
                },
            )
            .finish(move |state| {
                json!({
                    "repository": repository,
                    "entries": state.output("catalog").and_then(|o| o.get("entries")),
                    "score": state
                        .output("community_assessment")
                        .and_then(|o| o.get("score")),
                    "summary": state.output("summary").and_then(|o| o.get("summary")),
                })
            });

        Ok(plan)
    }
}
