use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::FlowError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Request,
    Response,
    Error,
    StatusUpdate,
    /// Any value not defined yet; logged and ignored by the orchestrator.
    #[serde(other)]
    Unknown,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Request => "request",
            Self::Response => "response",
            Self::Error => "error",
            Self::StatusUpdate => "status_update",
            Self::Unknown => "unknown",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "request" => Self::Request,
            "response" => Self::Response,
            "error" => Self::Error,
            "status_update" => Self::StatusUpdate,
            _ => Self::Unknown,
        }
    }
}

/// The wire unit between the orchestrator and a worker agent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AgentMessage {
    pub message_id: String,
    pub workflow_id: String,
    pub step_id: String,
    pub agent_type: String,
    pub message_type: MessageType,
    #[serde(default)]
    pub payload: serde_json::Value,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_count: Option<u32>,
}

impl AgentMessage {
    pub fn new(
        workflow_id: String,
        step_id: String,
        agent_type: String,
        message_type: MessageType,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            message_id: uuid::Uuid::new_v4().to_string(),
            workflow_id,
            step_id,
            agent_type,
            message_type,
            payload,
            timestamp: Utc::now(),
            retry_count: None,
        }
    }

    /// Parse an inbound message body.
    pub fn from_json(body: &str) -> Result<Self, FlowError> {
        serde_json::from_str(body).map_err(|e| FlowError::InvalidMessage(e.to_string()))
    }

    pub fn to_json(&self) -> Result<String, FlowError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Notification from the input-acquisition service that an input is ready.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InputReady {
    pub input_id: String,
    pub user_id: String,
    pub transcription: String,
}
