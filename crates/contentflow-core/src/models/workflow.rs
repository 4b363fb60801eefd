use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::payload::{CompletedStep, StepInput, StepOutput};

/// Sentinel stored in `current_step_id` once the pipeline is exhausted.
pub const COMPLETED_STEP_ID: &str = "completed";

/// Metadata key holding the original transcription of the triggering input.
pub const TRANSCRIPTION_KEY: &str = "transcription";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum StepType {
    ContentGeneration,
    ImageGeneration,
    Review,
    Revision,
    Publishing,
}

impl StepType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ContentGeneration => "content_generation",
            Self::ImageGeneration => "image_generation",
            Self::Review => "review",
            Self::Revision => "revision",
            Self::Publishing => "publishing",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "content_generation" => Some(Self::ContentGeneration),
            "image_generation" => Some(Self::ImageGeneration),
            "review" => Some(Self::Review),
            "revision" => Some(Self::Revision),
            "publishing" => Some(Self::Publishing),
            _ => None,
        }
    }
}

impl std::fmt::Display for StepType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Skipped,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }

    /// A step never leaves `completed`, `failed` or `skipped`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Skipped)
    }
}

/// Pipeline-level status. While a step runs, the status names that step's
/// type; human-gated steps park the workflow in `review_ready`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Initiated,
    ContentGeneration,
    ImageGeneration,
    Revision,
    Publishing,
    ReviewReady,
    RevisionRequested,
    Completed,
    Failed,
}

impl WorkflowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initiated => "initiated",
            Self::ContentGeneration => "content_generation",
            Self::ImageGeneration => "image_generation",
            Self::Revision => "revision",
            Self::Publishing => "publishing",
            Self::ReviewReady => "review_ready",
            Self::RevisionRequested => "revision_requested",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "initiated" => Some(Self::Initiated),
            "content_generation" => Some(Self::ContentGeneration),
            "image_generation" => Some(Self::ImageGeneration),
            "revision" => Some(Self::Revision),
            "publishing" => Some(Self::Publishing),
            "review_ready" => Some(Self::ReviewReady),
            "revision_requested" => Some(Self::RevisionRequested),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Status shown while a step of the given type is being executed.
    pub fn for_step(step_type: StepType) -> Self {
        match step_type {
            StepType::ContentGeneration => Self::ContentGeneration,
            StepType::ImageGeneration => Self::ImageGeneration,
            StepType::Review => Self::ReviewReady,
            StepType::Revision => Self::Revision,
            StepType::Publishing => Self::Publishing,
        }
    }

    /// No further steps run from these states.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::RevisionRequested
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowStep {
    pub step_id: String,
    pub step_type: StepType,
    pub status: StepStatus,
    /// Worker queue this step targets; `None` for human-gated steps.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<StepInput>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<StepOutput>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub retry_count: u32,
    pub max_retries: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Id of the last agent reply whose effect was persisted on this step.
    /// A redelivery of that reply resumes the follow-up instead of
    /// applying it again.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub applied_message_id: Option<String>,
}

impl WorkflowStep {
    pub fn new(
        step_id: String,
        step_type: StepType,
        agent_type: Option<String>,
        max_retries: u32,
    ) -> Self {
        Self {
            step_id,
            step_type,
            status: StepStatus::Pending,
            agent_type,
            input: None,
            output: None,
            error: None,
            retry_count: 0,
            max_retries,
            started_at: None,
            completed_at: None,
            applied_message_id: None,
        }
    }

    /// Steps without a worker queue wait for an external decision.
    pub fn is_human_gated(&self) -> bool {
        self.agent_type.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Workflow {
    pub id: String,
    pub user_id: String,
    pub input_id: String,
    pub status: WorkflowStatus,
    pub current_step_id: String,
    pub steps: Vec<WorkflowStep>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Workflow {
    pub fn new(
        user_id: String,
        input_id: String,
        steps: Vec<WorkflowStep>,
        metadata: HashMap<String, serde_json::Value>,
    ) -> Self {
        let now = Utc::now();
        let current_step_id = steps
            .first()
            .map(|s| s.step_id.clone())
            .unwrap_or_else(|| COMPLETED_STEP_ID.to_string());
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id,
            input_id,
            status: WorkflowStatus::Initiated,
            current_step_id,
            steps,
            created_at: now,
            updated_at: now,
            metadata,
        }
    }

    pub fn step_index(&self, step_id: &str) -> Option<usize> {
        self.steps.iter().position(|s| s.step_id == step_id)
    }

    pub fn step(&self, step_id: &str) -> Option<&WorkflowStep> {
        self.steps.iter().find(|s| s.step_id == step_id)
    }

    pub fn current_step(&self) -> Option<&WorkflowStep> {
        self.step(&self.current_step_id)
    }

    pub fn is_concluded(&self) -> bool {
        self.current_step_id == COMPLETED_STEP_ID
    }

    /// The workflow-level input, rebuilt from `metadata`.
    pub fn original_input(&self) -> Option<StepInput> {
        self.metadata
            .get(TRANSCRIPTION_KEY)
            .and_then(|v| v.as_str())
            .map(|t| StepInput::new(t.to_string()))
    }

    /// Outputs of every completed step, in pipeline order.
    pub fn completed_outputs(&self) -> Vec<CompletedStep> {
        self.steps
            .iter()
            .filter(|s| s.status == StepStatus::Completed)
            .filter_map(|s| {
                s.output.clone().map(|output| CompletedStep {
                    step_id: s.step_id.clone(),
                    step_type: s.step_type,
                    output,
                })
            })
            .collect()
    }

    pub fn completed_count(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| s.status == StepStatus::Completed)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_steps() -> Vec<WorkflowStep> {
        vec![
            WorkflowStep::new(
                "step-1-content_generation".into(),
                StepType::ContentGeneration,
                Some("content_generator".into()),
                3,
            ),
            WorkflowStep::new("step-2-review".into(), StepType::Review, None, 1),
        ]
    }

    #[test]
    fn test_new_workflow_points_at_first_step() {
        let wf = Workflow::new("u1".into(), "in1".into(), sample_steps(), HashMap::new());
        assert_eq!(wf.status, WorkflowStatus::Initiated);
        assert_eq!(wf.current_step_id, "step-1-content_generation");
        assert!(wf.steps.iter().all(|s| s.status == StepStatus::Pending && s.retry_count == 0));
    }

    #[test]
    fn test_empty_workflow_is_concluded() {
        let wf = Workflow::new("u1".into(), "in1".into(), Vec::new(), HashMap::new());
        assert!(wf.is_concluded());
    }

    #[test]
    fn test_status_serialization() {
        assert_eq!(
            serde_json::to_value(WorkflowStatus::ReviewReady).unwrap(),
            serde_json::json!("review_ready")
        );
        assert_eq!(
            serde_json::to_value(StepStatus::InProgress).unwrap(),
            serde_json::json!("in_progress")
        );
        assert_eq!(
            WorkflowStatus::from_str("revision_requested"),
            Some(WorkflowStatus::RevisionRequested)
        );
        assert_eq!(StepType::from_str("bogus"), None);
    }

    #[test]
    fn test_original_input_reads_metadata() {
        let mut metadata = HashMap::new();
        metadata.insert(TRANSCRIPTION_KEY.to_string(), serde_json::json!("draft idea"));
        let wf = Workflow::new("u1".into(), "in1".into(), sample_steps(), metadata);
        assert_eq!(wf.original_input().unwrap().transcription, "draft idea");
    }

    #[test]
    fn test_human_gate_detection() {
        let steps = sample_steps();
        assert!(!steps[0].is_human_gated());
        assert!(steps[1].is_human_gated());
    }
}
