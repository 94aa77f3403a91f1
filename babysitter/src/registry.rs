//! In-process registry of process definitions

use anyhow::Result;
use babysitter_sdk::{ProcessDefinition, ProcessMetadata, SdkError};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::processes::{catalog::CatalogProcess, cicd::CicdProcess};

/// Maps process ids to their definitions
#[derive(Default)]
pub struct ProcessRegistry {
    processes: HashMap<String, Arc<dyn ProcessDefinition>>,
}

impl ProcessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the built-in processes
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(CicdProcess));
        registry.register(Arc::new(CatalogProcess));
        registry
    }

    pub fn register(&mut self, process: Arc<dyn ProcessDefinition>) {
        self.processes.insert(process.metadata().id, process);
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn ProcessDefinition>> {
        self.processes.get(id).cloned()
    }

    /// Metadata for all registered processes, sorted by id
    pub fn list(&self) -> Vec<ProcessMetadata> {
        let mut all: Vec<ProcessMetadata> =
            self.processes.values().map(|p| p.metadata()).collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }

    /// Check that every required declared input is present
    pub fn validate_inputs(&self, id: &str, inputs: &Value) -> Result<()> {
        let process = self
            .get(id)
            .ok_or_else(|| SdkError::UnknownProcess(id.to_string()))?;

        for field in process.inputs() {
            if field.required && inputs.get(&field.name).is_none() {
                return Err(SdkError::MissingInput(field.name).into());
            }
        }

        Ok(())
    }
}
