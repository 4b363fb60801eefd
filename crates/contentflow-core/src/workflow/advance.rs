//! Step advancement: what runs after a step completes.

use crate::error::FlowError;
use crate::models::{Workflow, WorkflowStatus, COMPLETED_STEP_ID};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Advancement {
    /// Execute this step next.
    Next(String),
    /// No step follows; the workflow concludes.
    Exhausted,
}

/// Counts reported in the `workflow_completed` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineSummary {
    pub completed_steps: usize,
    pub total_steps: usize,
}

/// Find the step after `completed_step_id` in pipeline order.
pub fn next_step(workflow: &Workflow, completed_step_id: &str) -> Result<Advancement, FlowError> {
    let index = workflow
        .step_index(completed_step_id)
        .ok_or_else(|| FlowError::step_not_found(&workflow.id, completed_step_id))?;
    Ok(match workflow.steps.get(index + 1) {
        Some(next) => Advancement::Next(next.step_id.clone()),
        None => Advancement::Exhausted,
    })
}

/// Mark the pipeline exhausted with the given final status.
pub fn conclude(workflow: &mut Workflow, status: WorkflowStatus) -> PipelineSummary {
    workflow.status = status;
    workflow.current_step_id = COMPLETED_STEP_ID.to_string();
    PipelineSummary {
        completed_steps: workflow.completed_count(),
        total_steps: workflow.steps.len(),
    }
}
