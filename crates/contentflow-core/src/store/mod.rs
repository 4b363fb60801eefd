//! Persistence seams for the orchestrator.
//!
//! The orchestrator only talks to these traits; `Sqlite*` implementations
//! back the CLI, `Memory*` implementations back tests and embedding.

pub mod memory;
pub mod message_log;
pub mod workflow_store;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::FlowError;
use crate::models::{AgentMessage, Workflow, WorkflowStatus, WorkflowStep};

pub use memory::{MemoryMessageLog, MemoryWorkflowStore};
pub use message_log::SqliteMessageLog;
pub use workflow_store::SqliteWorkflowStore;

/// Persists and retrieves workflow aggregates. No business logic.
#[async_trait]
pub trait WorkflowStore: Send + Sync {
    async fn create(&self, workflow: &Workflow) -> Result<(), FlowError>;

    /// `Ok(None)` when no workflow has this id.
    async fn load(&self, id: &str) -> Result<Option<Workflow>, FlowError>;

    /// Replace `status`, `current_step_id` and the full `steps` sequence
    /// together. A failed update leaves the previous record intact.
    async fn update_status(
        &self,
        id: &str,
        status: WorkflowStatus,
        current_step_id: &str,
        steps: &[WorkflowStep],
    ) -> Result<(), FlowError>;

    /// Newest first, optionally filtered by status.
    async fn list(&self, status: Option<WorkflowStatus>) -> Result<Vec<Workflow>, FlowError>;
}

/// Audit log of agent messages plus the processed-id set used for dedup.
#[async_trait]
pub trait MessageLog: Send + Sync {
    /// Persist a message; recording the same message id twice is a no-op.
    async fn record(&self, message: &AgentMessage) -> Result<(), FlowError>;

    async fn list_for_workflow(&self, workflow_id: &str) -> Result<Vec<AgentMessage>, FlowError>;

    async fn is_processed(&self, message_id: &str) -> Result<bool, FlowError>;

    async fn mark_processed(&self, message_id: &str) -> Result<(), FlowError>;

    /// Forget processed ids older than `before`; returns how many were removed.
    async fn prune_processed(&self, before: DateTime<Utc>) -> Result<usize, FlowError>;
}
