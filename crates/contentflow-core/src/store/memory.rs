//! In-memory stores for tests and embedding.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::{MessageLog, WorkflowStore};
use crate::error::FlowError;
use crate::models::{AgentMessage, Workflow, WorkflowStatus, WorkflowStep};

#[derive(Default)]
pub struct MemoryWorkflowStore {
    workflows: RwLock<HashMap<String, Workflow>>,
}

impl MemoryWorkflowStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WorkflowStore for MemoryWorkflowStore {
    async fn create(&self, workflow: &Workflow) -> Result<(), FlowError> {
        let mut workflows = self.workflows.write().await;
        if workflows.contains_key(&workflow.id) {
            return Err(FlowError::Database(format!(
                "workflow {} already exists",
                workflow.id
            )));
        }
        workflows.insert(workflow.id.clone(), workflow.clone());
        Ok(())
    }

    async fn load(&self, id: &str) -> Result<Option<Workflow>, FlowError> {
        let workflows = self.workflows.read().await;
        Ok(workflows.get(id).cloned())
    }

    async fn update_status(
        &self,
        id: &str,
        status: WorkflowStatus,
        current_step_id: &str,
        steps: &[WorkflowStep],
    ) -> Result<(), FlowError> {
        let mut workflows = self.workflows.write().await;
        let workflow = workflows
            .get_mut(id)
            .ok_or_else(|| FlowError::WorkflowNotFound(id.to_string()))?;
        workflow.status = status;
        workflow.current_step_id = current_step_id.to_string();
        workflow.steps = steps.to_vec();
        workflow.updated_at = Utc::now();
        Ok(())
    }

    async fn list(&self, status: Option<WorkflowStatus>) -> Result<Vec<Workflow>, FlowError> {
        let workflows = self.workflows.read().await;
        let mut listed: Vec<Workflow> = workflows
            .values()
            .filter(|w| status.map_or(true, |s| w.status == s))
            .cloned()
            .collect();
        listed.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(listed)
    }
}

#[derive(Default)]
pub struct MemoryMessageLog {
    messages: RwLock<Vec<AgentMessage>>,
    processed: RwLock<HashMap<String, DateTime<Utc>>>,
}

impl MemoryMessageLog {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MessageLog for MemoryMessageLog {
    async fn record(&self, message: &AgentMessage) -> Result<(), FlowError> {
        let mut messages = self.messages.write().await;
        if !messages.iter().any(|m| m.message_id == message.message_id) {
            messages.push(message.clone());
        }
        Ok(())
    }

    async fn list_for_workflow(&self, workflow_id: &str) -> Result<Vec<AgentMessage>, FlowError> {
        let messages = self.messages.read().await;
        Ok(messages
            .iter()
            .filter(|m| m.workflow_id == workflow_id)
            .cloned()
            .collect())
    }

    async fn is_processed(&self, message_id: &str) -> Result<bool, FlowError> {
        Ok(self.processed.read().await.contains_key(message_id))
    }

    async fn mark_processed(&self, message_id: &str) -> Result<(), FlowError> {
        self.processed
            .write()
            .await
            .entry(message_id.to_string())
            .or_insert_with(Utc::now);
        Ok(())
    }

    async fn prune_processed(&self, before: DateTime<Utc>) -> Result<usize, FlowError> {
        let mut processed = self.processed.write().await;
        let len = processed.len();
        processed.retain(|_, at| *at >= before);
        Ok(len - processed.len())
    }
}
