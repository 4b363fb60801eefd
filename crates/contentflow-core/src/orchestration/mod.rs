//! Orchestrator - the entry point for workflow triggers and agent replies.
//!
//! The orchestrator:
//!   1. Creates a workflow when an input becomes ready and dispatches step 1
//!   2. Consumes agent messages (response / error / status_update)
//!   3. Advances the pipeline on responses, applies the retry policy on errors
//!   4. Concludes the workflow as `review_ready` when the pipeline is exhausted
//!
//! Each call is an independent invocation; all state lives in the injected
//! store, so nothing is shared between invocations except the clients.
//!
//! Handling a reply takes several writes (step state, then the follow-up
//! dispatch). Each step remembers the id of the reply applied to it, so a
//! redelivery after a failure part-way through finishes the follow-up
//! instead of returning `Stale` or counting the reply twice.

pub mod consumer;


use chrono::Utc;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

use crate::channel::MessageChannel;
use crate::config::OrchestratorConfig;
use crate::error::FlowError;
use crate::events::{EventPublisher, WorkflowEvent, WorkflowEventType};
use crate::models::{
    describe_failure, AgentMessage, InputReady, MessageType, ReviewDecision, StepOutput,
    StepStatus, Workflow, WorkflowStatus, WorkflowStep, TRANSCRIPTION_KEY,
};
use crate::store::{MessageLog, WorkflowStore};
use crate::workflow::{conclude, decide, next_step, Advancement, RetryDecision, StepExecutor};

pub use consumer::{ConsumerStats, InboundConsumer};

/// Result of handling one inbound agent message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum HandleOutcome {
    /// The step completed and the next step was executed.
    Advanced {
        #[serde(rename = "nextStepId")]
        next_step_id: String,
    },
    /// The step completed and the workflow concluded: the pipeline is
    /// exhausted or a review asked for a revision.
    Concluded,
    /// The step failed and was re-dispatched, possibly with a backoff delay.
    Retried { attempt: u32 },
    /// The step ran out of retries; the workflow failed.
    Failed,
    /// A status update was recorded for audit.
    Recorded,
    /// The message id was already processed.
    Duplicate,
    /// The step is no longer in progress (or the workflow is terminal).
    Stale,
    /// Unsupported message type.
    Ignored,
}

pub struct Orchestrator {
    config: Arc<OrchestratorConfig>,
    store: Arc<dyn WorkflowStore>,
    messages: Arc<dyn MessageLog>,
    events: Arc<dyn EventPublisher>,
    executor: StepExecutor,
}

impl Orchestrator {
    pub fn new(
        config: OrchestratorConfig,
        store: Arc<dyn WorkflowStore>,
        messages: Arc<dyn MessageLog>,
        channel: Arc<dyn MessageChannel>,
        events: Arc<dyn EventPublisher>,
    ) -> Self {
        let config = Arc::new(config);
        let executor = StepExecutor::new(
            config.clone(),
            store.clone(),
            messages.clone(),
            channel,
            events.clone(),
        );
        Self {
            config,
            store,
            messages,
            events,
            executor,
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    // ─── Triggers ───────────────────────────────────────────────────────

    /// Create a workflow for a ready input and execute its first step.
    pub async fn start_workflow(&self, trigger: InputReady) -> Result<Workflow, FlowError> {
        if trigger.input_id.trim().is_empty() || trigger.user_id.trim().is_empty() {
            return Err(FlowError::InvalidMessage(
                "input notification requires inputId and userId".into(),
            ));
        }
        let steps = self.config.build_steps();
        if steps.is_empty() {
            return Err(FlowError::Config("pipeline must contain at least one step".into()));
        }

        let mut metadata = HashMap::new();
        metadata.insert(
            TRANSCRIPTION_KEY.to_string(),
            serde_json::Value::String(trigger.transcription.clone()),
        );
        metadata.insert(
            "inputId".to_string(),
            serde_json::Value::String(trigger.input_id.clone()),
        );

        let mut workflow = Workflow::new(trigger.user_id, trigger.input_id, steps, metadata);
        self.store.create(&workflow).await?;

        tracing::info!(
            "[Orchestrator] Created workflow {} for input {} ({} steps)",
            workflow.id,
            workflow.input_id,
            workflow.steps.len()
        );

        self.events
            .publish(WorkflowEvent::new(
                WorkflowEventType::InputProcessed,
                &workflow.id,
                None,
                serde_json::json!({
                    "inputId": workflow.input_id,
                    "userId": workflow.user_id,
                    "totalSteps": workflow.steps.len(),
                }),
            ))
            .await;

        let first = workflow.current_step_id.clone();
        self.executor.execute(&mut workflow, &first).await?;
        Ok(workflow)
    }

    /// Parse and handle a raw inbound body.
    ///
    /// An unparseable body is logged and returned as an error so the
    /// delivery mechanism keeps it for redelivery; it never reaches the
    /// workflow state.
    pub async fn handle_raw(&self, body: &str) -> Result<HandleOutcome, FlowError> {
        let message = AgentMessage::from_json(body).map_err(|e| {
            tracing::warn!("[Orchestrator] Rejecting malformed inbound message: {}", e);
            e
        })?;
        self.handle_message(message).await
    }

    /// Handle one agent message.
    pub async fn handle_message(&self, message: AgentMessage) -> Result<HandleOutcome, FlowError> {
        if self.messages.is_processed(&message.message_id).await? {
            tracing::info!(
                "[Orchestrator] Skipping duplicate message {} for workflow {}",
                message.message_id,
                message.workflow_id
            );
            return Ok(HandleOutcome::Duplicate);
        }

        let mut workflow = self.load(&message.workflow_id).await?;
        let index = workflow
            .step_index(&message.step_id)
            .ok_or_else(|| FlowError::step_not_found(&workflow.id, &message.step_id))?;

        let outcome = match message.message_type {
            MessageType::Response | MessageType::Error => {
                self.messages.record(&message).await?;
                if workflow.steps[index].applied_message_id.as_deref()
                    == Some(message.message_id.as_str())
                {
                    self.resume(&mut workflow, index, &message).await?
                } else if message.message_type == MessageType::Response {
                    self.on_response(&mut workflow, index, &message).await?
                } else {
                    self.on_error(&mut workflow, index, &message).await?
                }
            }
            MessageType::StatusUpdate => {
                self.messages.record(&message).await?;
                tracing::debug!(
                    "[Orchestrator] Status update for {} / {}: {}",
                    message.workflow_id,
                    message.step_id,
                    message.payload
                );
                HandleOutcome::Recorded
            }
            MessageType::Request | MessageType::Unknown => {
                tracing::warn!(
                    "[Orchestrator] Ignoring {} message {} for workflow {}",
                    message.message_type.as_str(),
                    message.message_id,
                    message.workflow_id
                );
                HandleOutcome::Ignored
            }
        };

        self.messages.mark_processed(&message.message_id).await?;
        Ok(outcome)
    }

    /// Apply a reviewer's decision to a workflow waiting on a human gate,
    /// or to a concluded `review_ready` workflow.
    pub async fn submit_review(
        &self,
        workflow_id: &str,
        decision: ReviewDecision,
    ) -> Result<Workflow, FlowError> {
        let mut workflow = self.load(workflow_id).await?;
        if workflow.status.is_terminal() {
            return Err(FlowError::InvalidState(format!(
                "workflow {} is already {}",
                workflow.id,
                workflow.status.as_str()
            )));
        }

        if workflow.is_concluded() {
            if workflow.status != WorkflowStatus::ReviewReady {
                return Err(FlowError::InvalidState(format!(
                    "workflow {} is not ready for review",
                    workflow.id
                )));
            }
            workflow.status = if decision.approved {
                WorkflowStatus::Completed
            } else {
                WorkflowStatus::RevisionRequested
            };
            self.persist(&workflow).await?;
            self.events
                .publish(WorkflowEvent::new(
                    WorkflowEventType::WorkflowCompleted,
                    &workflow.id,
                    None,
                    serde_json::json!({
                        "status": workflow.status,
                        "approved": decision.approved,
                        "notes": decision.notes,
                        "completedSteps": workflow.completed_count(),
                        "totalSteps": workflow.steps.len(),
                    }),
                ))
                .await;
            tracing::info!(
                "[Orchestrator] Review of workflow {} recorded: {}",
                workflow.id,
                workflow.status.as_str()
            );
            return Ok(workflow);
        }

        let step_id = workflow.current_step_id.clone();
        let index = workflow
            .step_index(&step_id)
            .ok_or_else(|| FlowError::step_not_found(&workflow.id, &step_id))?;
        {
            let step = &workflow.steps[index];
            if !step.is_human_gated() || step.status != StepStatus::InProgress {
                return Err(FlowError::InvalidState(format!(
                    "workflow {} is not awaiting review (step {} is {})",
                    workflow.id,
                    step.step_id,
                    step.status.as_str()
                )));
            }
        }

        self.apply_review(&mut workflow, index, decision, None)
            .await?;
        Ok(workflow)
    }

    // ─── Queries ────────────────────────────────────────────────────────

    pub async fn get_workflow(&self, id: &str) -> Result<Workflow, FlowError> {
        self.load(id).await
    }

    pub async fn list_workflows(
        &self,
        status: Option<WorkflowStatus>,
    ) -> Result<Vec<Workflow>, FlowError> {
        self.store.list(status).await
    }

    pub async fn messages_for(&self, workflow_id: &str) -> Result<Vec<AgentMessage>, FlowError> {
        self.messages.list_for_workflow(workflow_id).await
    }

    /// Drop processed-message ids older than the configured retention.
    pub async fn prune_processed(&self) -> Result<usize, FlowError> {
        let retention = self.config.dedup_retention()?;
        let cutoff = Utc::now().checked_sub_signed(retention).ok_or_else(|| {
            FlowError::Config(format!(
                "dedupRetentionSecs {} reaches before the earliest timestamp",
                self.config.dedup_retention_secs
            ))
        })?;
        self.messages.prune_processed(cutoff).await
    }

    // ─── Message handling ───────────────────────────────────────────────

    async fn on_response(
        &self,
        workflow: &mut Workflow,
        index: usize,
        message: &AgentMessage,
    ) -> Result<HandleOutcome, FlowError> {
        if self.is_stale(workflow, index, message) {
            return Ok(HandleOutcome::Stale);
        }

        let step_type = workflow.steps[index].step_type;
        let output = StepOutput::decode(step_type, &message.payload)?;

        self.events
            .publish(WorkflowEvent::new(
                WorkflowEventType::AgentResponse,
                &workflow.id,
                Some(&message.step_id),
                serde_json::json!({
                    "messageId": message.message_id,
                    "agentType": message.agent_type,
                }),
            ))
            .await;

        if let StepOutput::Review(decision) = output {
            return self
                .apply_review(workflow, index, decision, Some(&message.message_id))
                .await;
        }

        let now = Utc::now();
        let retry_count = {
            let step = &mut workflow.steps[index];
            step.status = StepStatus::Completed;
            step.output = Some(output);
            step.completed_at = Some(now);
            step.applied_message_id = Some(message.message_id.clone());
            step.retry_count
        };
        workflow.updated_at = now;
        self.persist(workflow).await?;

        tracing::info!(
            "[Orchestrator] Step {} of workflow {} completed",
            message.step_id,
            workflow.id
        );
        self.events
            .publish(WorkflowEvent::new(
                WorkflowEventType::StepCompleted,
                &workflow.id,
                Some(&message.step_id),
                serde_json::json!({
                    "stepType": step_type,
                    "retryCount": retry_count,
                }),
            ))
            .await;

        self.advance(workflow, &message.step_id, WorkflowStatus::ReviewReady)
            .await
    }

    async fn on_error(
        &self,
        workflow: &mut Workflow,
        index: usize,
        message: &AgentMessage,
    ) -> Result<HandleOutcome, FlowError> {
        if self.is_stale(workflow, index, message) {
            return Ok(HandleOutcome::Stale);
        }

        let reason = describe_failure(&message.payload);
        let decision = {
            let step = &mut workflow.steps[index];
            let decision = decide(step, &reason, Utc::now());
            step.applied_message_id = Some(message.message_id.clone());
            decision
        };
        workflow.updated_at = Utc::now();

        match decision {
            RetryDecision::Retry { attempt } => {
                let step = &workflow.steps[index];
                tracing::warn!(
                    "[Orchestrator] Step {} of workflow {} failed ({}); retry {}/{}",
                    step.step_id,
                    workflow.id,
                    reason,
                    attempt,
                    step.max_retries
                );
                // The executor persists the bumped count together with the
                // re-dispatch.
                self.redispatch(workflow, index).await
            }
            RetryDecision::PermanentFailure => {
                workflow.status = WorkflowStatus::Failed;
                self.persist(workflow).await?;
                let step = &workflow.steps[index];
                tracing::error!(
                    "[Orchestrator] Workflow {} failed at step {} after {} retries: {}",
                    workflow.id,
                    step.step_id,
                    step.retry_count,
                    reason
                );
                self.events
                    .publish(WorkflowEvent::new(
                        WorkflowEventType::ErrorOccurred,
                        &workflow.id,
                        Some(&step.step_id),
                        serde_json::json!({
                            "error": reason,
                            "stepType": step.step_type,
                            "retryCount": step.retry_count,
                            "maxRetries": step.max_retries,
                        }),
                    ))
                    .await;
                Ok(HandleOutcome::Failed)
            }
        }
    }

    /// Record a review decision on the step at `index`. Approval advances
    /// the pipeline; rejection ends the workflow as `revision_requested`.
    async fn apply_review(
        &self,
        workflow: &mut Workflow,
        index: usize,
        decision: ReviewDecision,
        message_id: Option<&str>,
    ) -> Result<HandleOutcome, FlowError> {
        let now = Utc::now();
        let (step_id, step_type) = {
            let step = &mut workflow.steps[index];
            step.status = StepStatus::Completed;
            step.output = Some(StepOutput::Review(decision.clone()));
            step.completed_at = Some(now);
            step.applied_message_id = message_id.map(str::to_string);
            (step.step_id.clone(), step.step_type)
        };
        workflow.updated_at = now;

        if !decision.approved {
            workflow.status = WorkflowStatus::RevisionRequested;
        }
        self.persist(workflow).await?;
        self.events
            .publish(WorkflowEvent::new(
                WorkflowEventType::StepCompleted,
                &workflow.id,
                Some(&step_id),
                serde_json::json!({
                    "stepType": step_type,
                    "approved": decision.approved,
                    "notes": decision.notes,
                }),
            ))
            .await;

        if decision.approved {
            let final_status = conclusion_status(&workflow.steps[index]);
            self.advance(workflow, &step_id, final_status).await
        } else {
            tracing::info!(
                "[Orchestrator] Revision requested for workflow {}",
                workflow.id
            );
            Ok(HandleOutcome::Concluded)
        }
    }

    /// Send the step at `index` again, held back by the backoff delay for
    /// its current retry count.
    async fn redispatch(
        &self,
        workflow: &mut Workflow,
        index: usize,
    ) -> Result<HandleOutcome, FlowError> {
        let (step_id, attempt) = {
            let step = &workflow.steps[index];
            (step.step_id.clone(), step.retry_count)
        };
        let delay = self.config.retry.delay_for(attempt);
        self.executor
            .execute_after(workflow, &step_id, delay)
            .await?;
        Ok(HandleOutcome::Retried { attempt })
    }

    /// Finish the follow-up of a reply that was already applied to the step
    /// at `index` by an earlier delivery.
    async fn resume(
        &self,
        workflow: &mut Workflow,
        index: usize,
        message: &AgentMessage,
    ) -> Result<HandleOutcome, FlowError> {
        tracing::info!(
            "[Orchestrator] Resuming {} message {} for step {} of workflow {}",
            message.message_type.as_str(),
            message.message_id,
            message.step_id,
            workflow.id
        );

        let step = &workflow.steps[index];
        let step_id = step.step_id.clone();
        let status = step.status;
        let final_status = conclusion_status(step);

        if message.message_type == MessageType::Error {
            let is_current = !workflow.status.is_terminal() && workflow.current_step_id == step_id;
            return match status {
                StepStatus::Failed => Ok(HandleOutcome::Failed),
                StepStatus::Pending | StepStatus::InProgress if is_current => {
                    self.redispatch(workflow, index).await
                }
                _ => Ok(HandleOutcome::Duplicate),
            };
        }

        if workflow.status.is_terminal() || workflow.is_concluded() {
            return Ok(HandleOutcome::Concluded);
        }
        match next_step(workflow, &step_id)? {
            Advancement::Next(next_step_id) => {
                let untouched = workflow.step(&next_step_id).is_some_and(|next| {
                    next.applied_message_id.is_none()
                        && matches!(next.status, StepStatus::Pending | StepStatus::InProgress)
                });
                if untouched {
                    self.advance(workflow, &step_id, final_status).await
                } else {
                    Ok(HandleOutcome::Advanced { next_step_id })
                }
            }
            Advancement::Exhausted => self.advance(workflow, &step_id, final_status).await,
        }
    }

    /// Execute the step after `completed_step_id`, or conclude the workflow
    /// with `final_status` when none is left.
    async fn advance(
        &self,
        workflow: &mut Workflow,
        completed_step_id: &str,
        final_status: WorkflowStatus,
    ) -> Result<HandleOutcome, FlowError> {
        match next_step(workflow, completed_step_id)? {
            Advancement::Next(next_step_id) => {
                workflow.current_step_id = next_step_id.clone();
                self.executor.execute(workflow, &next_step_id).await?;
                Ok(HandleOutcome::Advanced { next_step_id })
            }
            Advancement::Exhausted => {
                let summary = conclude(workflow, final_status);
                workflow.updated_at = Utc::now();
                self.persist(workflow).await?;
                tracing::info!(
                    "[Orchestrator] Workflow {} concluded as {} ({}/{} steps completed)",
                    workflow.id,
                    workflow.status.as_str(),
                    summary.completed_steps,
                    summary.total_steps
                );
                self.events
                    .publish(WorkflowEvent::new(
                        WorkflowEventType::WorkflowCompleted,
                        &workflow.id,
                        Some(completed_step_id),
                        serde_json::json!({
                            "status": workflow.status,
                            "completedSteps": summary.completed_steps,
                            "totalSteps": summary.total_steps,
                        }),
                    ))
                    .await;
                Ok(HandleOutcome::Concluded)
            }
        }
    }

    /// Replies for a step that is not in progress, or for a terminal
    /// workflow, must not mutate anything.
    fn is_stale(&self, workflow: &Workflow, index: usize, message: &AgentMessage) -> bool {
        let step = &workflow.steps[index];
        let stale = workflow.status.is_terminal() || step.status != StepStatus::InProgress;
        if stale {
            tracing::warn!(
                "[Orchestrator] Stale {} message {} for step {} ({}) of workflow {} ({})",
                message.message_type.as_str(),
                message.message_id,
                step.step_id,
                step.status.as_str(),
                workflow.id,
                workflow.status.as_str()
            );
        }
        stale
    }

    async fn load(&self, id: &str) -> Result<Workflow, FlowError> {
        self.store
            .load(id)
            .await?
            .ok_or_else(|| FlowError::WorkflowNotFound(id.to_string()))
    }

    async fn persist(&self, workflow: &Workflow) -> Result<(), FlowError> {
        self.store
            .update_status(
                &workflow.id,
                workflow.status,
                &workflow.current_step_id,
                &workflow.steps,
            )
            .await
    }
}

/// Status a workflow concludes with once `last` completes the pipeline.
/// A human reviewer's approval completes it; anything else waits for review.
fn conclusion_status(last: &WorkflowStep) -> WorkflowStatus {
    match &last.output {
        Some(StepOutput::Review(decision)) if decision.approved && last.is_human_gated() => {
            WorkflowStatus::Completed
        }
        _ => WorkflowStatus::ReviewReady,
    }
}
