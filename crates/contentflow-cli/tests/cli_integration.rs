//! Integration tests for the contentflow-cli commands.
//!
//! These tests verify that the CLI commands work correctly by
//! exercising the same code paths as the binary, using in-memory
//! SQLite databases for isolation.

use std::io::Write;
use std::sync::{Arc, Mutex};

use contentflow_cli::commands;
use contentflow_core::models::{AgentMessage, InputReady, MessageType, StepStatus, WorkflowStatus};
use contentflow_core::state::AppState;
use contentflow_core::HandleOutcome;

const FAST_RETRY: &str = "retry:\n  baseDelayMs: 0\n  maxDelayMs: 0\n";

/// Create an in-memory AppState with immediate retries.
async fn test_state() -> (AppState, tempfile::TempDir) {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let config = dir.path().join("contentflow.yaml");
    std::fs::write(&config, FAST_RETRY).expect("Failed to write config");
    let state = commands::open_state(":memory:", config.to_str())
        .await
        .expect("Failed to open in-memory state");
    (state, dir)
}

fn trigger() -> InputReady {
    InputReady {
        input_id: "input-42".into(),
        user_id: "user-7".into(),
        transcription: "We talked about the spring launch.".into(),
    }
}

fn reply(request: &AgentMessage, message_type: MessageType, payload: serde_json::Value) -> String {
    AgentMessage::new(
        request.workflow_id.clone(),
        request.step_id.clone(),
        request.agent_type.clone(),
        message_type,
        payload,
    )
    .to_json()
    .expect("Failed to serialize reply")
}

async fn pull_one(state: &AppState, queue: &str) -> AgentMessage {
    let mut pulled = commands::queue::pull(state, queue, 10)
        .await
        .expect("Failed to pull");
    assert_eq!(pulled.len(), 1, "expected one request on {}", queue);
    pulled.remove(0)
}

#[tokio::test]
async fn test_full_pipeline_through_review() {
    let (state, _dir) = test_state().await;

    let workflow = commands::start::start(&state, trigger()).await.unwrap();
    assert_eq!(workflow.status, WorkflowStatus::ContentGeneration);

    let request = pull_one(&state, "content_generator").await;
    assert_eq!(request.payload["input"]["transcription"], "We talked about the spring launch.");
    let outcome = commands::deliver::deliver(
        &state,
        &reply(
            &request,
            MessageType::Response,
            serde_json::json!({ "title": "Spring launch", "body": "..." }),
        ),
    )
    .await
    .unwrap();
    assert!(matches!(outcome, HandleOutcome::Advanced { .. }));

    let request = pull_one(&state, "image_generator").await;
    assert_eq!(request.payload["context"].as_array().unwrap().len(), 1);
    commands::deliver::deliver(
        &state,
        &reply(
            &request,
            MessageType::Response,
            serde_json::json!({ "images": [{ "url": "https://img.example.com/1.png" }] }),
        ),
    )
    .await
    .unwrap();

    let parked = state.orchestrator.get_workflow(&workflow.id).await.unwrap();
    assert_eq!(parked.status, WorkflowStatus::ReviewReady);
    assert_eq!(parked.current_step_id, "step-3-review");

    let reviewed = commands::workflow::review(&state, &workflow.id, true, Some("great".into()))
        .await
        .unwrap();
    assert_eq!(reviewed.status, WorkflowStatus::Completed);
    assert_eq!(reviewed.current_step_id, "completed");

    let log = state.orchestrator.messages_for(&workflow.id).await.unwrap();
    assert_eq!(log.len(), 4);
}

#[tokio::test]
async fn test_enqueued_reply_is_consumed() {
    let (state, _dir) = test_state().await;
    let workflow = commands::start::start(&state, trigger()).await.unwrap();
    let request = pull_one(&state, "content_generator").await;

    commands::deliver::enqueue(
        &state,
        reply(
            &request,
            MessageType::Response,
            serde_json::json!({ "title": "T", "body": "B" }),
        ),
    )
    .await
    .unwrap();

    let stats = state.consumer().poll_once().await.unwrap();
    assert_eq!(stats.handled, 1);

    let stored = state.orchestrator.get_workflow(&workflow.id).await.unwrap();
    assert_eq!(stored.steps[0].status, StepStatus::Completed);
    assert_eq!(stored.status, WorkflowStatus::ImageGeneration);
}

#[tokio::test]
async fn test_repeated_errors_fail_the_workflow() {
    let (state, _dir) = test_state().await;
    let workflow = commands::start::start(&state, trigger()).await.unwrap();

    for attempt in 1..=3 {
        let request = pull_one(&state, "content_generator").await;
        let outcome = commands::deliver::deliver(
            &state,
            &reply(
                &request,
                MessageType::Error,
                serde_json::json!({ "error": format!("attempt {} failed", attempt) }),
            ),
        )
        .await
        .unwrap();
        if attempt < 3 {
            assert_eq!(outcome, HandleOutcome::Retried { attempt });
        } else {
            assert_eq!(outcome, HandleOutcome::Failed);
        }
    }

    let failed = state
        .orchestrator
        .list_workflows(Some(WorkflowStatus::Failed))
        .await
        .unwrap();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].id, workflow.id);
    assert_eq!(failed[0].steps[0].error.as_deref(), Some("attempt 3 failed"));
    assert!(commands::queue::pull(&state, "content_generator", 10)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_config_file_routes_queues() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pipeline.yaml");
    std::fs::write(
        &path,
        r#"
pipeline:
  - stepType: content_generation
    agentType: content_generator
  - stepType: publishing
    agentType: publisher
queues:
  content_generator: writers
"#,
    )
    .unwrap();

    let state = commands::open_state(":memory:", path.to_str()).await.unwrap();
    let workflow = commands::start::start(&state, trigger()).await.unwrap();
    assert_eq!(workflow.steps.len(), 2);
    assert_eq!(pull_one(&state, "writers").await.step_id, "step-1-content_generation");
}

#[tokio::test]
async fn test_malformed_delivery_is_an_error() {
    let (state, _dir) = test_state().await;
    let err = commands::deliver::deliver(&state, "not json").await.unwrap_err();
    assert!(err.contains("Invalid message"), "unexpected error: {}", err);
}

#[test]
fn test_read_body_requires_exactly_one_source() {
    assert!(commands::read_body(None, None).is_err());
    assert!(commands::read_body(Some("{}".into()), Some("x.json")).is_err());
    assert_eq!(commands::read_body(Some("{}".into()), None).unwrap(), "{}");
}

#[test]
fn test_parse_status_and_missing_config() {
    assert_eq!(
        commands::workflow::parse_status("review_ready").unwrap(),
        WorkflowStatus::ReviewReady
    );
    assert!(commands::workflow::parse_status("sideways").is_err());
    assert!(commands::load_config(Some("/no/such/contentflow.yaml")).is_err());
    assert!(commands::load_config(None).unwrap().validate().is_ok());
}

/// Collects formatted log output in memory.
struct LogCapture(Arc<Mutex<Vec<u8>>>);

impl Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn test_events_are_logged_before_command_returns() {
    let logs = Arc::new(Mutex::new(Vec::new()));
    let writer = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || LogCapture(writer.clone()))
        .with_ansi(false)
        .finish();
    let _guard = tracing::subscriber::set_default(subscriber);

    let (state, _dir) = test_state().await;
    commands::start::start(&state, trigger()).await.unwrap();

    // No yield between the command and the check.
    let output = String::from_utf8(logs.lock().unwrap().clone()).unwrap();
    assert!(output.contains("[Event] input_processed"), "missing event log: {}", output);
    assert!(output.contains("[Event] step_started"), "missing event log: {}", output);
}
