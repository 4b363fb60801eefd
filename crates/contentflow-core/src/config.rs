//! YAML configuration for the orchestrator.
//!
//! ```yaml
//! pipeline:
//!   - stepType: content_generation
//!     agentType: content_generator
//!     maxRetries: 3
//!   - stepType: image_generation
//!     agentType: image_generator
//!     maxRetries: 3
//!   - stepType: review          # no agentType: human-gated
//!     maxRetries: 1
//!
//! queues:
//!   content_generator: "queue://content-generation"
//!
//! retry:
//!   baseDelayMs: 1000
//!   maxDelayMs: 60000
//! ```

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::error::FlowError;
use crate::models::{StepType, WorkflowStep};
use crate::workflow::retry::RetryPolicy;

/// One entry of the step-configuration table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StepConfig {
    pub step_type: StepType,
    /// Worker queue this step dispatches to; absent for human-gated steps.
    #[serde(default)]
    pub agent_type: Option<String>,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_max_retries() -> u32 {
    3
}

impl StepConfig {
    pub fn agent(step_type: StepType, agent_type: &str, max_retries: u32) -> Self {
        Self {
            step_type,
            agent_type: Some(agent_type.to_string()),
            max_retries,
        }
    }

    pub fn human(step_type: StepType, max_retries: u32) -> Self {
        Self {
            step_type,
            agent_type: None,
            max_retries,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConsumerConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// How long a received inbound message stays hidden before redelivery.
    #[serde(default = "default_visibility_timeout_secs")]
    pub visibility_timeout_secs: u64,
}

fn default_batch_size() -> usize {
    10
}

fn default_poll_interval_ms() -> u64 {
    1_000
}

fn default_visibility_timeout_secs() -> u64 {
    30
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            poll_interval_ms: default_poll_interval_ms(),
            visibility_timeout_secs: default_visibility_timeout_secs(),
        }
    }
}

impl ConsumerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn visibility_timeout(&self) -> Duration {
        Duration::from_secs(self.visibility_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OrchestratorConfig {
    /// Ordered pipeline; insertion order is execution order.
    #[serde(default = "default_pipeline")]
    pub pipeline: Vec<StepConfig>,

    /// Queue address per agent type. Unlisted agent types use their own name.
    #[serde(default)]
    pub queues: HashMap<String, String>,

    #[serde(default)]
    pub retry: RetryPolicy,

    /// How long processed message ids are remembered for deduplication.
    #[serde(default = "default_dedup_retention_secs")]
    pub dedup_retention_secs: u64,

    #[serde(default)]
    pub consumer: ConsumerConfig,
}

fn default_pipeline() -> Vec<StepConfig> {
    vec![
        StepConfig::agent(StepType::ContentGeneration, "content_generator", 3),
        StepConfig::agent(StepType::ImageGeneration, "image_generator", 3),
        StepConfig::human(StepType::Review, 1),
    ]
}

fn default_dedup_retention_secs() -> u64 {
    86_400
}

/// Upper bound for `dedupRetentionSecs`: ten years.
pub const MAX_DEDUP_RETENTION_SECS: u64 = 10 * 365 * 86_400;

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            pipeline: default_pipeline(),
            queues: HashMap::new(),
            retry: RetryPolicy::default(),
            dedup_retention_secs: default_dedup_retention_secs(),
            consumer: ConsumerConfig::default(),
        }
    }
}

impl OrchestratorConfig {
    /// Parse a configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, FlowError> {
        let config: Self = serde_yaml::from_str(yaml)
            .map_err(|e| FlowError::Config(format!("Failed to parse config YAML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration from a file path.
    pub fn from_file(path: &str) -> Result<Self, FlowError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            FlowError::Config(format!("Failed to read config file '{}': {}", path, e))
        })?;
        Self::from_yaml(&content)
    }

    pub fn to_yaml(&self) -> Result<String, FlowError> {
        serde_yaml::to_string(self).map_err(|e| FlowError::Config(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), FlowError> {
        if self.pipeline.is_empty() {
            return Err(FlowError::Config("pipeline must contain at least one step".into()));
        }
        for (i, step) in self.pipeline.iter().enumerate() {
            if step.max_retries == 0 {
                return Err(FlowError::Config(format!(
                    "pipeline[{}] ({}): maxRetries must be at least 1",
                    i, step.step_type
                )));
            }
            if let Some(agent) = &step.agent_type {
                if agent.trim().is_empty() {
                    return Err(FlowError::Config(format!(
                        "pipeline[{}] ({}): agentType must not be blank",
                        i, step.step_type
                    )));
                }
            }
        }
        if self.consumer.batch_size == 0 {
            return Err(FlowError::Config("consumer.batchSize must be at least 1".into()));
        }
        if self.retry.max_delay_ms < self.retry.base_delay_ms {
            return Err(FlowError::Config(
                "retry.maxDelayMs must not be lower than retry.baseDelayMs".into(),
            ));
        }
        if self.dedup_retention_secs > MAX_DEDUP_RETENTION_SECS {
            return Err(FlowError::Config(format!(
                "dedupRetentionSecs must be at most {}",
                MAX_DEDUP_RETENTION_SECS
            )));
        }
        Ok(())
    }

    /// Queue address bound to an agent type.
    pub fn queue_for(&self, agent_type: &str) -> String {
        self.queues
            .get(agent_type)
            .cloned()
            .unwrap_or_else(|| agent_type.to_string())
    }

    /// Fresh `pending` steps for a new workflow, in pipeline order.
    pub fn build_steps(&self) -> Vec<WorkflowStep> {
        self.pipeline
            .iter()
            .enumerate()
            .map(|(i, cfg)| {
                WorkflowStep::new(
                    format!("step-{}-{}", i + 1, cfg.step_type),
                    cfg.step_type,
                    cfg.agent_type.clone(),
                    cfg.max_retries,
                )
            })
            .collect()
    }

    pub fn dedup_retention(&self) -> Result<TimeDelta, FlowError> {
        i64::try_from(self.dedup_retention_secs)
            .ok()
            .and_then(TimeDelta::try_seconds)
            .ok_or_else(|| {
                FlowError::Config(format!(
                    "dedupRetentionSecs {} is out of range",
                    self.dedup_retention_secs
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_pipeline() {
        let config = OrchestratorConfig::default();
        config.validate().unwrap();
        let steps = config.build_steps();
        let ids: Vec<_> = steps.iter().map(|s| s.step_id.as_str()).collect();
        assert_eq!(
            ids,
            vec!["step-1-content_generation", "step-2-image_generation", "step-3-review"]
        );
        assert_eq!(steps[0].agent_type.as_deref(), Some("content_generator"));
        assert!(steps[2].is_human_gated());
        assert_eq!(steps[2].max_retries, 1);
    }

    #[test]
    fn test_parse_yaml_with_defaults() {
        let yaml = r#"
pipeline:
  - stepType: content_generation
    agentType: writer
  - stepType: publishing
    agentType: publisher
    maxRetries: 5
queues:
  writer: "queue://writers"
retry:
  baseDelayMs: 0
  maxDelayMs: 0
"#;
        let config = OrchestratorConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.pipeline.len(), 2);
        assert_eq!(config.pipeline[0].max_retries, 3);
        assert_eq!(config.pipeline[1].max_retries, 5);
        assert_eq!(config.queue_for("writer"), "queue://writers");
        assert_eq!(config.queue_for("publisher"), "publisher");
        assert_eq!(config.consumer.batch_size, 10);
        assert_eq!(config.dedup_retention_secs, 86_400);
    }

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = OrchestratorConfig::from_yaml("{}").unwrap();
        assert_eq!(config, OrchestratorConfig::default());
    }

    #[test]
    fn test_validation_errors() {
        assert!(OrchestratorConfig::from_yaml("pipeline: []").is_err());
        assert!(OrchestratorConfig::from_yaml(
            "pipeline:\n  - stepType: review\n    maxRetries: 0\n"
        )
        .is_err());
        assert!(OrchestratorConfig::from_yaml(
            "pipeline:\n  - stepType: review\n    agentType: \"  \"\n"
        )
        .is_err());
        assert!(OrchestratorConfig::from_yaml("pipeline:\n  - stepType: dancing\n").is_err());
    }

    #[test]
    fn test_dedup_retention_is_bounded() {
        let err = OrchestratorConfig::from_yaml("dedupRetentionSecs: 18446744073709551615\n")
            .unwrap_err();
        assert!(matches!(err, FlowError::Config(_)));
        assert!(OrchestratorConfig::from_yaml(&format!(
            "dedupRetentionSecs: {}\n",
            MAX_DEDUP_RETENTION_SECS
        ))
        .is_ok());

        let config = OrchestratorConfig {
            dedup_retention_secs: u64::MAX,
            ..OrchestratorConfig::default()
        };
        assert!(matches!(config.dedup_retention(), Err(FlowError::Config(_))));
    }

    #[test]
    fn test_yaml_round_trip() {
        let config = OrchestratorConfig::default();
        let yaml = config.to_yaml().unwrap();
        assert_eq!(OrchestratorConfig::from_yaml(&yaml).unwrap(), config);
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("contentflow.yaml");
        std::fs::write(&path, "dedupRetentionSecs: 60\n").unwrap();
        let config = OrchestratorConfig::from_file(path.to_str().unwrap()).unwrap();
        assert_eq!(config.dedup_retention().unwrap(), TimeDelta::seconds(60));
        assert!(OrchestratorConfig::from_file("/definitely/missing.yaml").is_err());
    }
}
