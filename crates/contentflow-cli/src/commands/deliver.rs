//! `contentflow deliver` - Hand an agent reply to the orchestrator.
//!
//! By default the body is handled right away. With `--enqueue` it is put
//! in the inbox instead, for a running `contentflow serve` to pick up.

use contentflow_core::channel::InboundChannel;
use contentflow_core::state::AppState;
use contentflow_core::HandleOutcome;

use super::{print_json, read_body, to_json};

pub async fn deliver(state: &AppState, body: &str) -> Result<HandleOutcome, String> {
    state
        .orchestrator
        .handle_raw(body)
        .await
        .map_err(|e| e.to_string())
}

pub async fn enqueue(state: &AppState, body: String) -> Result<String, String> {
    state.channel.enqueue(body).await.map_err(|e| e.to_string())
}

pub async fn run(
    state: &AppState,
    body: Option<String>,
    file: Option<&str>,
    enqueue_only: bool,
) -> Result<(), String> {
    let body = read_body(body, file)?;
    if enqueue_only {
        let receipt = enqueue(state, body).await?;
        print_json(&serde_json::json!({ "enqueued": true, "receipt": receipt }));
        return Ok(());
    }
    let outcome = deliver(state, &body).await?;
    print_json(&to_json(&outcome)?);
    Ok(())
}
