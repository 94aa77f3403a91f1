//! Run directory persistence: `state.json` and append-only `journal.jsonl`
//!
//! Each run owns a directory holding its state snapshot, an event journal,
//! and per-task I/O under `tasks/{effect_id}/`. Journal entries carry a
//! monotonically increasing id tracked through `nextEventId` in the state
//! file, so the journal can be appended to across suspensions.

use anyhow::{Context, Result};
use babysitter_sdk::{RunLog, RunStatus};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

/// Persistent per-run state mirrored into `state.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JournalState {
    pub run_id: Uuid,
    pub process_id: String,
    pub status: RunStatus,
    pub next_event_id: u64,
    pub created_at: String,
}

/// Append-only event journal for one run
#[derive(Debug)]
pub struct Journal {
    state_path: PathBuf,
    journal_path: PathBuf,
    state: JournalState,
}

impl Journal {
    /// Initialize a run directory and write the initial state
    pub async fn create(run_dir: &Path, run_id: Uuid, process_id: &str) -> Result<Self> {
        fs::create_dir_all(run_dir)
            .await
            .with_context(|| format!("Failed to create run directory: {}", run_dir.display()))?;

        let journal = Self {
            state_path: run_dir.join("state.json"),
            journal_path: run_dir.join("journal.jsonl"),
            state: JournalState {
                run_id,
                process_id: process_id.to_string(),
                status: RunStatus::Running,
                next_event_id: 1,
                created_at: now_iso(),
            },
        };
        journal.write_state().await?;
        Ok(journal)
    }

    /// Append one event as a journal line and advance the event counter
    pub async fn append(&mut self, event: &RunLog) -> Result<()> {
        let entry = json!({
            "timestamp": now_iso(),
            "type": "event",
            "id": self.state.next_event_id.to_string(),
            "event": event.name(),
            "data": event,
        });

        let mut line = serde_json::to_string(&entry).context("Failed to serialize journal entry")?;
        line.push('\n');

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.journal_path)
            .await
            .with_context(|| {
                format!("Failed to open journal: {}", self.journal_path.display())
            })?;
        file.write_all(line.as_bytes())
            .await
            .with_context(|| format!("Failed to append to {}", self.journal_path.display()))?;

        self.state.next_event_id += 1;
        self.write_state().await
    }

    /// Update the run status in `state.json`
    pub async fn set_status(&mut self, status: RunStatus) -> Result<()> {
        self.state.status = status;
        self.write_state().await
    }

    pub fn status(&self) -> RunStatus {
        self.state.status
    }

    async fn write_state(&self) -> Result<()> {
        let mut json = serde_json::to_string_pretty(&self.state)
            .context("Failed to serialize run state")?;
        json.push('\n');
        fs::write(&self.state_path, json)
            .await
            .with_context(|| format!("Failed to write {}", self.state_path.display()))
    }
}

/// UTC timestamp in RFC 3339 with a `Z` suffix
fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[tokio::test]
    async fn test_create_writes_initial_state() {
        let dir = tempfile::tempdir().unwrap();
        let run_id = Uuid::new_v4();
        let journal = Journal::create(dir.path(), run_id, "cicd-setup").await.unwrap();

        let state: Value =
            serde_json::from_str(&std::fs::read_to_string(dir.path().join("state.json")).unwrap())
                .unwrap();
        assert_eq!(state["processId"], "cicd-setup");
        assert_eq!(state["status"], "running");
        assert_eq!(state["nextEventId"], 1);
        assert!(state["createdAt"].as_str().unwrap().ends_with('Z'));
        assert_eq!(journal.status(), RunStatus::Running);
    }

    #[tokio::test]
    async fn test_append_advances_event_ids() {
        let dir = tempfile::tempdir().unwrap();
        let run_id = Uuid::new_v4();
        let mut journal = Journal::create(dir.path(), run_id, "cicd-setup").await.unwrap();

        journal
            .append(&RunLog::RunStarted {
                run_id,
                process_id: "cicd-setup".to_string(),
            })
            .await
            .unwrap();
        journal
            .append(&RunLog::TaskStarted {
                step: 0,
                task: "ci_analysis".to_string(),
                effect_id: "e1".to_string(),
                title: "Analyze".to_string(),
            })
            .await
            .unwrap();

        let content = std::fs::read_to_string(dir.path().join("journal.jsonl")).unwrap();
        let lines: Vec<Value> = content
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["id"], "1");
        assert_eq!(lines[0]["event"], "run_started");
        assert_eq!(lines[1]["id"], "2");
        assert_eq!(lines[1]["data"]["task"], "ci_analysis");

        let state: Value =
            serde_json::from_str(&std::fs::read_to_string(dir.path().join("state.json")).unwrap())
                .unwrap();
        assert_eq!(state["nextEventId"], 3);
    }

    #[tokio::test]
    async fn test_set_status_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let mut journal = Journal::create(dir.path(), Uuid::new_v4(), "catalog")
            .await
            .unwrap();

        journal.set_status(RunStatus::Aborted).await.unwrap();

        let state: Value =
            serde_json::from_str(&std::fs::read_to_string(dir.path().join("state.json")).unwrap())
                .unwrap();
        assert_eq!(state["status"], "aborted");
    }
}
