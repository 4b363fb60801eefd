//! `contentflow start` - Start a workflow for a ready input.

use contentflow_core::models::{InputReady, Workflow};
use contentflow_core::state::AppState;

use super::{print_json, to_json};

pub async fn start(state: &AppState, trigger: InputReady) -> Result<Workflow, String> {
    state
        .orchestrator
        .start_workflow(trigger)
        .await
        .map_err(|e| e.to_string())
}

pub async fn run(
    state: &AppState,
    input_id: &str,
    user_id: &str,
    transcription: Option<String>,
    file: Option<&str>,
) -> Result<(), String> {
    let transcription = match (transcription, file) {
        (Some(text), _) => text,
        (None, Some(path)) => std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read '{}': {}", path, e))?,
        (None, None) => return Err("--transcription or --file is required".to_string()),
    };

    let workflow = start(
        state,
        InputReady {
            input_id: input_id.to_string(),
            user_id: user_id.to_string(),
            transcription,
        },
    )
    .await?;
    print_json(&to_json(&workflow)?);
    Ok(())
}
