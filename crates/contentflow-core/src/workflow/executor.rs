//! Step Executor - dispatches a single workflow step to its agent.
//!
//! The executor:
//! 1. Marks the step `in_progress` and points the workflow at it
//! 2. Persists the workflow (status + steps together)
//! 3. Builds the request from the step input and prior completed outputs
//! 4. Records the request in the message log and sends it to the agent queue,
//!    optionally held back for a backoff delay
//! 5. Emits a `step_started` event
//!
//! Human-gated steps (no agent type) are parked instead of dispatched.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

use crate::channel::MessageChannel;
use crate::config::OrchestratorConfig;
use crate::error::FlowError;
use crate::events::{EventPublisher, WorkflowEvent, WorkflowEventType};
use crate::models::{AgentMessage, AgentRequest, MessageType, StepStatus, Workflow, WorkflowStatus};
use crate::store::{MessageLog, WorkflowStore};

/// What `execute` did with the step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    Sent { queue: String, message_id: String },
    /// Human-gated; waiting for an external decision.
    Parked,
}

pub struct StepExecutor {
    config: Arc<OrchestratorConfig>,
    store: Arc<dyn WorkflowStore>,
    messages: Arc<dyn MessageLog>,
    channel: Arc<dyn MessageChannel>,
    events: Arc<dyn EventPublisher>,
}

impl StepExecutor {
    pub fn new(
        config: Arc<OrchestratorConfig>,
        store: Arc<dyn WorkflowStore>,
        messages: Arc<dyn MessageLog>,
        channel: Arc<dyn MessageChannel>,
        events: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            config,
            store,
            messages,
            channel,
            events,
        }
    }

    /// Execute `step_id` of `workflow`, updating `workflow` in place.
    pub async fn execute(
        &self,
        workflow: &mut Workflow,
        step_id: &str,
    ) -> Result<Dispatch, FlowError> {
        self.execute_after(workflow, step_id, Duration::ZERO).await
    }

    /// Like `execute`, but the request only becomes available to the agent
    /// once `delay` has elapsed. The delayed request is handed to the
    /// channel before this returns, so nothing waits in-process.
    pub async fn execute_after(
        &self,
        workflow: &mut Workflow,
        step_id: &str,
        delay: Duration,
    ) -> Result<Dispatch, FlowError> {
        let index = workflow
            .step_index(step_id)
            .ok_or_else(|| FlowError::step_not_found(&workflow.id, step_id))?;

        let now = Utc::now();
        let (step_type, agent_type, retry_count) = {
            let step = &mut workflow.steps[index];
            step.status = StepStatus::InProgress;
            step.started_at = Some(now);
            (step.step_type, step.agent_type.clone(), step.retry_count)
        };
        workflow.current_step_id = step_id.to_string();
        workflow.status = WorkflowStatus::for_step(step_type);
        workflow.updated_at = now;

        self.store
            .update_status(
                &workflow.id,
                workflow.status,
                &workflow.current_step_id,
                &workflow.steps,
            )
            .await?;

        let Some(agent_type) = agent_type else {
            tracing::info!(
                "[StepExecutor] Workflow {} parked at {} step {}",
                workflow.id,
                step_type,
                step_id
            );
            self.events
                .publish(WorkflowEvent::new(
                    WorkflowEventType::StepStarted,
                    &workflow.id,
                    Some(step_id),
                    serde_json::json!({
                        "status": "awaiting_review",
                        "stepType": step_type,
                    }),
                ))
                .await;
            return Ok(Dispatch::Parked);
        };

        let request = AgentRequest {
            input: workflow.steps[index]
                .input
                .clone()
                .or_else(|| workflow.original_input())
                .unwrap_or_default(),
            user_id: workflow.user_id.clone(),
            context: workflow.completed_outputs(),
        };

        let mut message = AgentMessage::new(
            workflow.id.clone(),
            step_id.to_string(),
            agent_type.clone(),
            MessageType::Request,
            serde_json::to_value(&request)?,
        );
        message.retry_count = Some(retry_count);
        let message_id = message.message_id.clone();
        let queue = self.config.queue_for(&agent_type);

        self.messages.record(&message).await?;
        self.channel.send_after(&queue, message, delay).await?;

        tracing::info!(
            "[StepExecutor] Dispatched {} step {} of workflow {} to '{}' (attempt {}, delay {:?})",
            step_type,
            step_id,
            workflow.id,
            queue,
            retry_count + 1,
            delay
        );

        self.events
            .publish(WorkflowEvent::new(
                WorkflowEventType::StepStarted,
                &workflow.id,
                Some(step_id),
                serde_json::json!({
                    "status": "started",
                    "stepType": step_type,
                    "agentType": agent_type,
                    "queue": queue,
                    "messageId": message_id,
                    "retryCount": retry_count,
                    "delayMs": delay.as_millis() as u64,
                }),
            ))
            .await;

        Ok(Dispatch::Sent { queue, message_id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::MemoryChannel;
    use crate::events::EventBus;
    use crate::models::{GeneratedContent, StepInput, StepOutput, StepType, TRANSCRIPTION_KEY};
    use crate::store::{MemoryMessageLog, MemoryWorkflowStore};
    use std::collections::HashMap;

    struct Harness {
        executor: StepExecutor,
        store: Arc<MemoryWorkflowStore>,
        messages: Arc<MemoryMessageLog>,
        channel: Arc<MemoryChannel>,
        events: EventBus,
    }

    fn harness() -> Harness {
        let mut config = OrchestratorConfig::default();
        config
            .queues
            .insert("content_generator".into(), "queue://content".into());
        let store = Arc::new(MemoryWorkflowStore::new());
        let messages = Arc::new(MemoryMessageLog::new());
        let channel = Arc::new(MemoryChannel::new());
        let events = EventBus::new();
        let executor = StepExecutor::new(
            Arc::new(config),
            store.clone(),
            messages.clone(),
            channel.clone(),
            Arc::new(events.clone()),
        );
        Harness {
            executor,
            store,
            messages,
            channel,
            events,
        }
    }

    async fn seeded(h: &Harness) -> Workflow {
        let mut metadata = HashMap::new();
        metadata.insert(TRANSCRIPTION_KEY.to_string(), serde_json::json!("draft idea"));
        let wf = Workflow::new(
            "user-1".into(),
            "input-1".into(),
            OrchestratorConfig::default().build_steps(),
            metadata,
        );
        h.store.create(&wf).await.unwrap();
        wf
    }

    #[tokio::test]
    async fn test_execute_dispatches_request_with_fallback_input() {
        let h = harness();
        let mut wf = seeded(&h).await;

        let dispatch = h
            .executor
            .execute(&mut wf, "step-1-content_generation")
            .await
            .unwrap();
        assert!(matches!(dispatch, Dispatch::Sent { ref queue, .. } if queue == "queue://content"));

        let sent = h.channel.drain("queue://content").await;
        assert_eq!(sent.len(), 1);
        let request: AgentRequest = serde_json::from_value(sent[0].payload.clone()).unwrap();
        assert_eq!(request.input.transcription, "draft idea");
        assert_eq!(request.user_id, "user-1");
        assert!(request.context.is_empty());
        assert_eq!(sent[0].retry_count, Some(0));

        let stored = h.store.load(&wf.id).await.unwrap().unwrap();
        assert_eq!(stored.status, WorkflowStatus::ContentGeneration);
        assert_eq!(stored.steps[0].status, StepStatus::InProgress);
        assert!(stored.steps[0].started_at.is_some());

        assert_eq!(h.messages.list_for_workflow(&wf.id).await.unwrap().len(), 1);
        let events = h.events.recent_for(&wf.id).await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, WorkflowEventType::StepStarted);
        assert_eq!(events[0].data["status"], "started");
    }

    #[tokio::test]
    async fn test_context_carries_completed_outputs_and_step_input_wins() {
        let h = harness();
        let mut wf = seeded(&h).await;
        wf.steps[0].status = StepStatus::Completed;
        wf.steps[0].output = Some(StepOutput::ContentGeneration(GeneratedContent {
            title: "Title".into(),
            body: "Body".into(),
            summary: None,
            tags: vec![],
        }));
        wf.steps[1].input = Some(StepInput {
            transcription: "override".into(),
            instructions: Some("square images".into()),
        });

        h.executor
            .execute(&mut wf, "step-2-image_generation")
            .await
            .unwrap();

        let sent = h.channel.drain("image_generator").await;
        let request: AgentRequest = serde_json::from_value(sent[0].payload.clone()).unwrap();
        assert_eq!(request.input.transcription, "override");
        assert_eq!(request.context.len(), 1);
        assert_eq!(request.context[0].step_type, StepType::ContentGeneration);
        assert_eq!(wf.current_step_id, "step-2-image_generation");
    }

    #[tokio::test]
    async fn test_human_gated_step_is_parked() {
        let h = harness();
        let mut wf = seeded(&h).await;

        let dispatch = h.executor.execute(&mut wf, "step-3-review").await.unwrap();
        assert_eq!(dispatch, Dispatch::Parked);
        assert!(h.channel.dispatched_queues().await.is_empty());

        let stored = h.store.load(&wf.id).await.unwrap().unwrap();
        assert_eq!(stored.status, WorkflowStatus::ReviewReady);
        assert_eq!(stored.current_step_id, "step-3-review");
        let events = h.events.recent_for(&wf.id).await;
        assert_eq!(events[0].data["status"], "awaiting_review");
    }

    #[tokio::test]
    async fn test_delayed_execute_holds_request_back() {
        let h = harness();
        let mut wf = seeded(&h).await;

        h.executor
            .execute_after(&mut wf, "step-1-content_generation", Duration::from_secs(5))
            .await
            .unwrap();

        assert!(h.channel.drain("queue://content").await.is_empty());
        assert_eq!(h.channel.delayed("queue://content").await.len(), 1);
        let stored = h.store.load(&wf.id).await.unwrap().unwrap();
        assert_eq!(stored.steps[0].status, StepStatus::InProgress);
        let events = h.events.recent_for(&wf.id).await;
        assert_eq!(events[0].data["delayMs"], 5_000);
    }

    #[tokio::test]
    async fn test_unknown_step_is_fatal() {
        let h = harness();
        let mut wf = seeded(&h).await;
        let err = h.executor.execute(&mut wf, "nope").await.unwrap_err();
        assert!(matches!(err, FlowError::StepNotFound { .. }));
        assert!(h.channel.dispatched_queues().await.is_empty());
    }
}
