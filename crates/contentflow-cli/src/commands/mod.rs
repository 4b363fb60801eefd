//! CLI command implementations.
//!
//! Each submodule corresponds to a top-level CLI command and reuses
//! the contentflow-core orchestration through `AppState`.

pub mod config;
pub mod deliver;
pub mod queue;
pub mod serve;
pub mod start;
pub mod workflow;

use contentflow_core::events::EventBus;
use contentflow_core::state::{AppState, AppStateInner};
use contentflow_core::{Database, OrchestratorConfig};
use std::sync::Arc;

/// Load the orchestrator configuration, falling back to the built-in
/// pipeline when no file is given.
pub fn load_config(config_path: Option<&str>) -> Result<OrchestratorConfig, String> {
    match config_path {
        Some(path) => OrchestratorConfig::from_file(path).map_err(|e| e.to_string()),
        None => Ok(OrchestratorConfig::default()),
    }
}

/// Open the database and wire up an `AppState`.
pub async fn open_state(db_path: &str, config_path: Option<&str>) -> Result<AppState, String> {
    let config = load_config(config_path)?;
    let db = Database::open(db_path)
        .map_err(|e| format!("Failed to open database '{}': {}", db_path, e))?;
    let state: AppState = Arc::new(AppStateInner::new(db, config));
    log_events(&state.event_bus).await;
    Ok(state)
}

/// Like [`open_state`], but exits the process on failure.
pub async fn init_state(db_path: &str, config_path: Option<&str>) -> AppState {
    open_state(db_path, config_path).await.unwrap_or_else(|e| {
        eprintln!("{}", e);
        std::process::exit(1);
    })
}

/// Forward lifecycle events to the tracing output. Logged inline, so a
/// one-shot command prints its events before the process exits.
pub async fn log_events(bus: &EventBus) {
    bus.on_inline("cli-log", |event| {
        tracing::info!(
            "[Event] {} workflow={} step={} {}",
            event.event_type.as_str(),
            event.workflow_id,
            event.step_id.as_deref().unwrap_or("-"),
            event.data
        );
    })
    .await;
}

/// Read a message body from `--body` or `--file`.
pub fn read_body(body: Option<String>, file: Option<&str>) -> Result<String, String> {
    match (body, file) {
        (Some(body), None) => Ok(body),
        (None, Some(path)) => std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read '{}': {}", path, e)),
        (Some(_), Some(_)) => Err("Use either --body or --file, not both".to_string()),
        (None, None) => Err("A message body is required (--body or --file)".to_string()),
    }
}

/// Pretty-print a JSON value to stdout.
pub fn print_json(value: &serde_json::Value) {
    println!(
        "{}",
        serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
    );
}

pub(crate) fn to_json<T: serde::Serialize>(value: &T) -> Result<serde_json::Value, String> {
    serde_json::to_value(value).map_err(|e| e.to_string())
}
