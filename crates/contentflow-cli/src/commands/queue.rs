//! `contentflow queue` - Agent-side access to the SQLite queues.
//!
//! `pull` takes requests off an agent queue; `push` puts a reply in the
//! orchestrator's inbox.

use contentflow_core::channel::InboundChannel;
use contentflow_core::models::AgentMessage;
use contentflow_core::state::AppState;

use super::{print_json, read_body, to_json};

pub async fn pull(state: &AppState, queue: &str, max: usize) -> Result<Vec<AgentMessage>, String> {
    state
        .channel
        .pull(queue, max)
        .await
        .map_err(|e| e.to_string())
}

pub async fn run_pull(state: &AppState, queue: &str, max: usize) -> Result<(), String> {
    let messages = pull(state, queue, max).await?;
    let remaining = state.channel.depth(queue).await.map_err(|e| e.to_string())?;
    print_json(&serde_json::json!({
        "queue": queue,
        "messages": to_json(&messages)?,
        "remaining": remaining,
    }));
    Ok(())
}

pub async fn push(
    state: &AppState,
    body: Option<String>,
    file: Option<&str>,
) -> Result<(), String> {
    let body = read_body(body, file)?;
    // Reject bodies the orchestrator could never parse.
    AgentMessage::from_json(&body).map_err(|e| e.to_string())?;
    let receipt = state.channel.enqueue(body).await.map_err(|e| e.to_string())?;
    print_json(&serde_json::json!({ "receipt": receipt }));
    Ok(())
}
