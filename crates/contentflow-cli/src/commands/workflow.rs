//! `contentflow workflow` - Inspect workflows and submit review decisions.

use contentflow_core::models::{ReviewDecision, Workflow, WorkflowStatus};
use contentflow_core::state::AppState;

use super::{print_json, to_json};

pub async fn show(state: &AppState, id: &str) -> Result<(), String> {
    let workflow = state
        .orchestrator
        .get_workflow(id)
        .await
        .map_err(|e| e.to_string())?;
    print_json(&to_json(&workflow)?);
    Ok(())
}

pub async fn list(state: &AppState, status: Option<&str>) -> Result<(), String> {
    let status = status.map(parse_status).transpose()?;
    let workflows = state
        .orchestrator
        .list_workflows(status)
        .await
        .map_err(|e| e.to_string())?;
    let rows: Vec<_> = workflows
        .iter()
        .map(|w| {
            serde_json::json!({
                "id": w.id,
                "inputId": w.input_id,
                "userId": w.user_id,
                "status": w.status,
                "currentStepId": w.current_step_id,
                "completedSteps": w.completed_count(),
                "totalSteps": w.steps.len(),
                "updatedAt": w.updated_at,
            })
        })
        .collect();
    print_json(&serde_json::json!({ "workflows": rows }));
    Ok(())
}

pub async fn messages(state: &AppState, id: &str) -> Result<(), String> {
    let messages = state
        .orchestrator
        .messages_for(id)
        .await
        .map_err(|e| e.to_string())?;
    print_json(&serde_json::json!({ "messages": to_json(&messages)? }));
    Ok(())
}

pub async fn review(
    state: &AppState,
    id: &str,
    approved: bool,
    notes: Option<String>,
) -> Result<Workflow, String> {
    state
        .orchestrator
        .submit_review(id, ReviewDecision { approved, notes })
        .await
        .map_err(|e| e.to_string())
}

pub async fn run_review(
    state: &AppState,
    id: &str,
    approve: bool,
    reject: bool,
    notes: Option<String>,
) -> Result<(), String> {
    let approved = match (approve, reject) {
        (true, false) => true,
        (false, true) => false,
        _ => return Err("Pass exactly one of --approve or --reject".to_string()),
    };
    let workflow = review(state, id, approved, notes).await?;
    print_json(&to_json(&workflow)?);
    Ok(())
}

pub fn parse_status(value: &str) -> Result<WorkflowStatus, String> {
    WorkflowStatus::from_str(value).ok_or_else(|| format!("Unknown workflow status: {}", value))
}
