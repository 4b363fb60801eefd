//! Event Bus - fire-and-forget workflow lifecycle notifications.
//!
//! Features:
//!   - Direct handlers keyed by name, each invoked on its own task
//!   - Inline handlers keyed by name, run before `emit` returns
//!   - Bounded history of recent events for inspection

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowEventType {
    InputProcessed,
    AgentResponse,
    StepStarted,
    StepCompleted,
    WorkflowCompleted,
    ErrorOccurred,
}

impl WorkflowEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InputProcessed => "input_processed",
            Self::AgentResponse => "agent_response",
            Self::StepStarted => "step_started",
            Self::StepCompleted => "step_completed",
            Self::WorkflowCompleted => "workflow_completed",
            Self::ErrorOccurred => "error_occurred",
        }
    }
}

/// An outward notification about a workflow or one of its steps.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowEvent {
    pub event_type: WorkflowEventType,
    pub workflow_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_id: Option<String>,
    pub data: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl WorkflowEvent {
    pub fn new(
        event_type: WorkflowEventType,
        workflow_id: &str,
        step_id: Option<&str>,
        data: serde_json::Value,
    ) -> Self {
        Self {
            event_type,
            workflow_id: workflow_id.to_string(),
            step_id: step_id.map(str::to_string),
            data,
            timestamp: Utc::now(),
        }
    }
}

/// Sink for lifecycle events. Publishing never fails and is never awaited
/// on by observers.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: WorkflowEvent);
}

type EventHandler = Arc<dyn Fn(WorkflowEvent) + Send + Sync>;

const DEFAULT_HISTORY: usize = 256;

struct EventBusInner {
    handlers: HashMap<String, EventHandler>,
    inline_handlers: HashMap<String, EventHandler>,
    history: VecDeque<WorkflowEvent>,
    history_limit: usize,
}

/// Thread-safe in-process event bus.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<RwLock<EventBusInner>>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_history(DEFAULT_HISTORY)
    }

    pub fn with_history(history_limit: usize) -> Self {
        Self {
            inner: Arc::new(RwLock::new(EventBusInner {
                handlers: HashMap::new(),
                inline_handlers: HashMap::new(),
                history: VecDeque::new(),
                history_limit,
            })),
        }
    }

    /// Subscribe to events with a handler function.
    pub async fn on<F>(&self, key: &str, handler: F)
    where
        F: Fn(WorkflowEvent) + Send + Sync + 'static,
    {
        let mut inner = self.inner.write().await;
        inner.handlers.insert(key.to_string(), Arc::new(handler));
    }

    /// Subscribe a handler that runs on the emitting task, before `emit`
    /// returns. It must be quick and must not call back into the bus.
    pub async fn on_inline<F>(&self, key: &str, handler: F)
    where
        F: Fn(WorkflowEvent) + Send + Sync + 'static,
    {
        let mut inner = self.inner.write().await;
        inner.inline_handlers.insert(key.to_string(), Arc::new(handler));
    }

    /// Unsubscribe a handler.
    pub async fn off(&self, key: &str) {
        let mut inner = self.inner.write().await;
        inner.handlers.remove(key);
        inner.inline_handlers.remove(key);
    }

    /// Publish an event to all handlers and append it to the history.
    pub async fn emit(&self, event: WorkflowEvent) {
        let mut inner = self.inner.write().await;

        for handler in inner.inline_handlers.values() {
            handler(event.clone());
        }
        for handler in inner.handlers.values() {
            let handler = handler.clone();
            let event = event.clone();
            tokio::spawn(async move {
                handler(event);
            });
        }

        tracing::debug!(
            "[EventBus] {} for workflow {}",
            event.event_type.as_str(),
            event.workflow_id
        );

        if inner.history_limit > 0 {
            if inner.history.len() >= inner.history_limit {
                inner.history.pop_front();
            }
            inner.history.push_back(event);
        }
    }

    /// Recent events, oldest first.
    pub async fn recent(&self) -> Vec<WorkflowEvent> {
        let inner = self.inner.read().await;
        inner.history.iter().cloned().collect()
    }

    /// Recent events for a single workflow, oldest first.
    pub async fn recent_for(&self, workflow_id: &str) -> Vec<WorkflowEvent> {
        let inner = self.inner.read().await;
        inner
            .history
            .iter()
            .filter(|e| e.workflow_id == workflow_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl EventPublisher for EventBus {
    async fn publish(&self, event: WorkflowEvent) {
        self.emit(event).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_history_is_bounded() {
        let bus = EventBus::with_history(2);
        for i in 0..3 {
            bus.emit(WorkflowEvent::new(
                WorkflowEventType::StepStarted,
                &format!("wf-{}", i),
                None,
                serde_json::json!({}),
            ))
            .await;
        }
        let recent = bus.recent().await;
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].workflow_id, "wf-1");
        assert_eq!(bus.recent_for("wf-2").await.len(), 1);
    }

    #[tokio::test]
    async fn test_handlers_receive_events() {
        let bus = EventBus::new();
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        bus.on("counter", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .await;

        bus.emit(WorkflowEvent::new(
            WorkflowEventType::InputProcessed,
            "wf",
            None,
            serde_json::json!({}),
        ))
        .await;

        for _ in 0..50 {
            if seen.load(Ordering::SeqCst) == 1 {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(seen.load(Ordering::SeqCst), 1);

        bus.off("counter").await;
        bus.emit(WorkflowEvent::new(
            WorkflowEventType::InputProcessed,
            "wf",
            None,
            serde_json::json!({}),
        ))
        .await;
        tokio::task::yield_now().await;
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_inline_handlers_run_before_emit_returns() {
        let bus = EventBus::new();
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        bus.on_inline("log", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .await;

        let event = WorkflowEvent::new(
            WorkflowEventType::StepStarted,
            "wf",
            None,
            serde_json::json!({}),
        );
        bus.emit(event.clone()).await;
        assert_eq!(seen.load(Ordering::SeqCst), 1);

        bus.off("log").await;
        bus.emit(event).await;
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_event_wire_shape() {
        let event = WorkflowEvent::new(
            WorkflowEventType::WorkflowCompleted,
            "wf-1",
            Some("step-3-review"),
            serde_json::json!({ "completedSteps": 3 }),
        );
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["eventType"], "workflow_completed");
        assert_eq!(value["stepId"], "step-3-review");
    }
}
