//! Approval gate implementations
//!
//! A breakpoint suspends the run until the gate answers. Rejection aborts
//! the run; there is no retained breakpoint state afterwards beyond the run
//! journal.

use anyhow::Context;
use babysitter_sdk::{async_trait, ApprovalDecision, ApprovalGate, Breakpoint, SdkError};
use tokio::io::{stdin, AsyncBufReadExt, BufReader};

/// Approves every breakpoint without asking (CI and tests)
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoApproveGate;

#[async_trait]
impl ApprovalGate for AutoApproveGate {
    async fn request(&self, _breakpoint: &Breakpoint) -> Result<ApprovalDecision, SdkError> {
        Ok(ApprovalDecision::Approved)
    }
}

/// Prompts the operator on the terminal and reads a y/n answer
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleGate;

#[async_trait]
impl ApprovalGate for ConsoleGate {
    async fn request(&self, breakpoint: &Breakpoint) -> Result<ApprovalDecision, SdkError> {
        println!("\x1b[1;33m⏸ APPROVAL REQUIRED: {}\x1b[0m", breakpoint.title);
        println!("{}", breakpoint.question);
        if !breakpoint.context.is_null() {
            if let Ok(context) = serde_json::to_string_pretty(&breakpoint.context) {
                println!("\x1b[2m{}\x1b[0m", context);
            }
        }
        println!("\x1b[1mApprove? [y/N]\x1b[0m");

        let mut answer = String::new();
        let mut reader = BufReader::new(stdin());
        reader
            .read_line(&mut answer)
            .await
            .context("Failed to read approval answer")
            .map_err(|e| SdkError::Gate(e.to_string()))?;

        let answer = answer.trim().to_ascii_lowercase();
        if answer == "y" || answer == "yes" {
            Ok(ApprovalDecision::Approved)
        } else {
            Ok(ApprovalDecision::Rejected { reason: None })
        }
    }
}
