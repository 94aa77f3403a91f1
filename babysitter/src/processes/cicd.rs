//! CI/CD pipeline setup process
//!
//! Analyzes a repository, generates workflow definitions, pauses for human
//! review before anything is applied, then runs a security review,
//! validation, and documentation pass.

use babysitter_sdk::{
    Breakpoint, InputField, OutputSchema, Plan, ProcessDefinition, ProcessMetadata, SdkError,
};
use serde_json::{json, Value};

use super::{agent_task, artifact_list_schema};

pub struct CicdProcess;

impl ProcessDefinition for CicdProcess {
    fn metadata(&self) -> ProcessMetadata {
        ProcessMetadata {
            id: "cicd-setup".to_string(),
            name: "CI/CD Setup".to_string(),
            description: "Generate and review CI/CD workflows for a project".to_string(),
        }
    }

    fn inputs(&self) -> Vec<InputField> {
        vec![
            InputField {
                name: "projectName".to_string(),
                description: "Project the workflows are generated for".to_string(),
                required: true,
            },
            InputField {
                name: "repositoryUrl".to_string(),
                description: "Repository to analyze".to_string(),
                required: false,
            },
            InputField {
                name: "targetPlatform".to_string(),
                description: "CI platform to target (defaults to github)".to_string(),
                required: false,
            },
        ]
    }

    fn plan(&self, inputs: &Value) -> Result<Plan, SdkError> {
        let project = inputs
            .get("projectName")
            .and_then(Value::as_str)
            .ok_or_else(|| SdkError::MissingInput("projectName".to_string()))?
            .to_string();
        let platform = inputs
            .get("targetPlatform")
            .and_then(Value::as_str)
            .unwrap_or("github")
            .to_string();

        let plan = Plan::builder()
            .task(
                "ci_analysis",
                agent_task(
                    "ci_analysis",
                    "Analyze build and test requirements",
                    "ci-analyst",
                    "Survey the repository and describe its build, test, and release requirements.",
                    OutputSchema::object()
                        .require("summary", json!({"type": "string"}))
                        .require("languages", json!({"type": "array", "items": {"type": "string"}}))
                        .optional("artifacts", artifact_list_schema()),
                    &["cicd", "analysis"],
                ),
                {
                    let project = project.clone();
                    move |state| {
                        json!({
                            "projectName": project,
                            "repositoryUrl": state.inputs.get("repositoryUrl"),
                        })
                    }
                },
            )
            .task(
                "workflow_setup",
                agent_task(
                    "workflow_setup",
                    "Generate workflow definitions",
                    "workflow-engineer",
                    "Generate CI/CD workflow definitions covering build, test, and release.",
                    OutputSchema::object()
                        .require(
                            "workflows",
                            json!({
                                "type": "array",
                                "items": {
                                    "type": "object",
                                    "required": ["name", "path"],
                                    "properties": {
                                        "name": {"type": "string"},
                                        "path": {"type": "string"},
                                    },
                                },
                            }),
                        )
                        .optional("artifacts", artifact_list_schema()),
                    &["cicd", "workflows"],
                ),
                {
                    let project = project.clone();
                    let platform = platform.clone();
                    move |state| {
                        json!({
                            "projectName": project,
                            "targetPlatform": platform,
                            "analysis": state.output("ci_analysis"),
                        })
                    }
                },
            )
            .breakpoint({
                let project = project.clone();
                move |state| Breakpoint {
                    question: format!("Apply the generated workflows to {}?", project),
                    title: "Workflow review".to_string(),
                    context: json!({
                        "projectName": project,
                        "workflows": state
                            .output("workflow_setup")
                            .and_then(|o| o.get("workflows")),
                    }),
                }
            })
            .task(
                "security_review",
                agent_task(
                    "security_review",
                    "Review workflows for security issues",
                    "security-reviewer",
                    "Review the workflow definitions for secret handling, permission scope, and supply-chain pinning issues.",
                    OutputSchema::object()
                        .require("passed", json!({"type": "boolean"}))
                        .require("findings", json!({"type": "array", "items": {"type": "string"}}))
                        .optional("artifacts", artifact_list_schema()),
                    &["cicd", "security"],
                ),
                |state| {
                    json!({
                        "workflows": state
                            .output("workflow_setup")
                            .and_then(|o| o.get("workflows")),
                    })
                },
            )
            .task(
                "pipeline_validation",
                agent_task(
                    "pipeline_validation",
                    "Validate the generated pipelines",
                    "pipeline-validator",
                    "Dry-run the workflow definitions and report each check performed.",
                    OutputSchema::object()
                        .require("valid", json!({"type": "boolean"}))
                        .require("checks", json!({"type": "array", "items": {"type": "string"}}))
                        .optional("artifacts", artifact_list_schema()),
                    &["cicd", "validation"],
                ),
                |state| {
                    json!({
                        "workflows": state
                            .output("workflow_setup")
                            .and_then(|o| o.get("workflows")),
                        "securityFindings": state
                            .output("security_review")
                            .and_then(|o| o.get("findings")),
                    })
                },
            )
            .task(
                "docs",
                agent_task(
                    "docs",
                    "Document the pipeline setup",
                    "docs-writer",
                    "Write a short operator-facing summary of the configured pipelines.",
                    OutputSchema::object()
                        .require("summary", json!({"type": "string"}))
                        .optional("artifacts", artifact_list_schema()),
                    &["cicd", "docs"],
                ),
                {
                    let project = project.clone();
                    move |state| {
                        json!({
                            "projectName": project,
                            "workflows": state
                                .output("workflow_setup")
                                .and_then(|o| o.get("workflows")),
                            "checks": state
                                .output("pipeline_validation")
                                .and_then(|o| o.get("checks")),
                        })
                    }
                },
            )
            .finish(move |state| {
                json!({
                    "projectName": project,
                    "workflows": state
                        .output("workflow_setup")
                        .and_then(|o| o.get("workflows")),
                    "securityPassed": state
                        .output("security_review")
                        .and_then(|o| o.get("passed")),
                    "documentation": state.output("docs").and_then(|o| o.get("summary")),
                })
            });

        Ok(plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use babysitter_sdk::Step;

    #[test]
    fn test_plan_shape() {
        let plan = CicdProcess.plan(&json!({"projectName": "Demo"})).unwrap();
        assert_eq!(plan.steps().len(), 6);

        let breakpoints = plan
            .steps()
            .iter()
            .filter(|s| matches!(s, Step::Breakpoint { .. }))
            .count();
        assert_eq!(breakpoints, 1);
    }

    #[test]
    fn test_every_task_schema_is_structurally_valid() {
        let plan = CicdProcess.plan(&json!({"projectName": "Demo"})).unwrap();
        let ctx = babysitter_sdk::TaskCtx {
            run_id: uuid::Uuid::new_v4(),
            step: 0,
            effect_id: babysitter_sdk::EffectId::new(),
        };

        for step in plan.steps() {
            if let Step::Task { factory, .. } = step {
                let task = factory(&ctx);
                task.agent.output_schema.verify().unwrap();
            }
        }
    }

    #[test]
    fn test_plan_requires_project_name() {
        let err = CicdProcess.plan(&json!({})).unwrap_err();
        assert!(err.to_string().contains("projectName"));
    }
}
