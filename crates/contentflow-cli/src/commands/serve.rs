//! `contentflow serve` - Consume the inbox until Ctrl-C.

use contentflow_core::state::AppState;

pub async fn run(state: &AppState) -> Result<(), String> {
    let consumer = state.consumer();
    println!("ContentFlow consumer running. Press Ctrl-C to stop.");
    consumer
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for Ctrl-C: {}", e);
            }
        })
        .await
        .map_err(|e| e.to_string())
}
