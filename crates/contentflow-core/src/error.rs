//! Core error type for the ContentFlow engine.
//!
//! `FlowError` is used throughout the core domain (stores, channels, the
//! executor and the orchestrator). Infrastructure failures are never retried
//! internally; they propagate so the invoking trigger is redelivered by its
//! own delivery mechanism.

#[derive(Debug, thiserror::Error)]
pub enum FlowError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Workflow not found: {0}")]
    WorkflowNotFound(String),

    #[error("Step not found: {step_id} (workflow {workflow_id})")]
    StepNotFound { workflow_id: String, step_id: String },

    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    #[error("Invalid {step_type} payload: {reason}")]
    InvalidPayload { step_type: String, reason: String },

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Channel error: {0}")]
    Channel(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl FlowError {
    /// True for lookups that found nothing (workflow or step).
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::WorkflowNotFound(_) | Self::StepNotFound { .. })
    }

    pub(crate) fn step_not_found(workflow_id: &str, step_id: &str) -> Self {
        Self::StepNotFound {
            workflow_id: workflow_id.to_string(),
            step_id: step_id.to_string(),
        }
    }
}

impl From<serde_json::Error> for FlowError {
    fn from(e: serde_json::Error) -> Self {
        Self::Internal(format!("JSON error: {}", e))
    }
}
