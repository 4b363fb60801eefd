//! Typed payloads exchanged with the worker agents.
//!
//! Each step type owns a concrete response schema. On the wire a response
//! payload is the bare schema object (e.g. `{"title": .., "body": ..}`); once
//! stored on a step it is tagged with its step type.

use serde::{Deserialize, Serialize};

use super::workflow::StepType;
use crate::error::FlowError;

/// Input handed to an agent for a single step.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StepInput {
    pub transcription: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
}

impl StepInput {
    pub fn new(transcription: String) -> Self {
        Self {
            transcription,
            instructions: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedContent {
    pub title: String,
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedImage {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alt_text: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedImages {
    pub images: Vec<GeneratedImage>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReviewDecision {
    pub approved: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PublishReceipt {
    pub platform: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Output of a completed step, tagged by the step type that produced it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "stepType", content = "data", rename_all = "snake_case")]
pub enum StepOutput {
    ContentGeneration(GeneratedContent),
    ImageGeneration(GeneratedImages),
    Review(ReviewDecision),
    Revision(GeneratedContent),
    Publishing(PublishReceipt),
}

impl StepOutput {
    pub fn step_type(&self) -> StepType {
        match self {
            Self::ContentGeneration(_) => StepType::ContentGeneration,
            Self::ImageGeneration(_) => StepType::ImageGeneration,
            Self::Review(_) => StepType::Review,
            Self::Revision(_) => StepType::Revision,
            Self::Publishing(_) => StepType::Publishing,
        }
    }

    /// Decode an agent's response payload against the schema of `step_type`.
    ///
    /// Accepts either the bare schema object or an already-tagged
    /// `{"stepType": .., "data": ..}` envelope of the same type.
    pub fn decode(step_type: StepType, payload: &serde_json::Value) -> Result<Self, FlowError> {
        let invalid = |reason: String| FlowError::InvalidPayload {
            step_type: step_type.as_str().to_string(),
            reason,
        };

        if payload.get("stepType").is_some() && payload.get("data").is_some() {
            let tagged: StepOutput =
                serde_json::from_value(payload.clone()).map_err(|e| invalid(e.to_string()))?;
            if tagged.step_type() != step_type {
                return Err(invalid(format!(
                    "payload is tagged as {}",
                    tagged.step_type()
                )));
            }
            return Ok(tagged);
        }

        let data = payload.clone();
        let output = match step_type {
            StepType::ContentGeneration => {
                serde_json::from_value(data).map(Self::ContentGeneration)
            }
            StepType::ImageGeneration => serde_json::from_value(data).map(Self::ImageGeneration),
            StepType::Review => serde_json::from_value(data).map(Self::Review),
            StepType::Revision => serde_json::from_value(data).map(Self::Revision),
            StepType::Publishing => serde_json::from_value(data).map(Self::Publishing),
        };
        output.map_err(|e| invalid(e.to_string()))
    }
}

/// A prior step's output, forwarded to later agents as context.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CompletedStep {
    pub step_id: String,
    pub step_type: StepType,
    pub output: StepOutput,
}

/// Payload of a `request` message sent to an agent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AgentRequest {
    pub input: StepInput,
    pub user_id: String,
    pub context: Vec<CompletedStep>,
}

/// Extract a human-readable reason from an `error` payload.
pub fn describe_failure(payload: &serde_json::Value) -> String {
    for key in ["error", "message"] {
        if let Some(text) = payload.get(key).and_then(|v| v.as_str()) {
            return text.to_string();
        }
    }
    match payload {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => "unknown agent error".to_string(),
        other => other.to_string(),
    }
}
