//! Retry Controller - decides whether a failed step is retried or fails the
//! workflow for good.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::models::{StepStatus, WorkflowStep};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// The step is `pending` again; re-dispatch it as a fresh attempt.
    Retry { attempt: u32 },
    /// The step is `failed`; the owning workflow must be failed too.
    PermanentFailure,
}

/// Apply an agent-reported error to `step`.
///
/// `retry_count` goes up by exactly one per error and never exceeds
/// `max_retries`; the step fails once the increment reaches `max_retries`.
pub fn decide(step: &mut WorkflowStep, error: &str, now: DateTime<Utc>) -> RetryDecision {
    step.error = Some(error.to_string());

    if step.retry_count >= step.max_retries {
        step.status = StepStatus::Failed;
        step.completed_at = Some(now);
        return RetryDecision::PermanentFailure;
    }

    step.retry_count += 1;
    if step.retry_count < step.max_retries {
        step.status = StepStatus::Pending;
        RetryDecision::Retry {
            attempt: step.retry_count,
        }
    } else {
        step.status = StepStatus::Failed;
        step.completed_at = Some(now);
        RetryDecision::PermanentFailure
    }
}

/// Exponential backoff applied before re-dispatching a retried step.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RetryPolicy {
    /// Delay before the first retry; 0 re-dispatches immediately.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_base_delay_ms() -> u64 {
    1_000
}

fn default_max_delay_ms() -> u64 {
    60_000
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl RetryPolicy {
    /// No delay between an error and the re-dispatch.
    pub fn immediate() -> Self {
        Self {
            base_delay_ms: 0,
            max_delay_ms: 0,
        }
    }

    /// `base * 2^(attempt-1)`, capped at `max_delay_ms`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        if self.base_delay_ms == 0 || attempt == 0 {
            return Duration::ZERO;
        }
        let factor = 2u64.saturating_pow(attempt.saturating_sub(1).min(32));
        let ms = self.base_delay_ms.saturating_mul(factor).min(self.max_delay_ms);
        Duration::from_millis(ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::StepType;

    fn step(retry_count: u32, max_retries: u32) -> WorkflowStep {
        let mut step = WorkflowStep::new(
            "step-1-content_generation".into(),
            StepType::ContentGeneration,
            Some("content_generator".into()),
            max_retries,
        );
        step.retry_count = retry_count;
        step.status = StepStatus::InProgress;
        step
    }

    #[test]
    fn test_retry_below_max() {
        let mut s = step(1, 3);
        let decision = decide(&mut s, "model overloaded", Utc::now());
        assert_eq!(decision, RetryDecision::Retry { attempt: 2 });
        assert_eq!(s.retry_count, 2);
        assert_eq!(s.status, StepStatus::Pending);
        assert_eq!(s.error.as_deref(), Some("model overloaded"));
        assert!(s.completed_at.is_none());
    }

    #[test]
    fn test_failure_when_increment_reaches_max() {
        let mut s = step(2, 3);
        let decision = decide(&mut s, "still broken", Utc::now());
        assert_eq!(decision, RetryDecision::PermanentFailure);
        assert_eq!(s.retry_count, 3);
        assert_eq!(s.status, StepStatus::Failed);
        assert!(s.completed_at.is_some());
    }

    #[test]
    fn test_count_never_exceeds_max() {
        let mut s = step(0, 3);
        let mut decisions = Vec::new();
        for i in 0..5 {
            decisions.push(decide(&mut s, &format!("error {}", i), Utc::now()));
            assert!(s.retry_count <= s.max_retries);
        }
        assert_eq!(decisions[0], RetryDecision::Retry { attempt: 1 });
        assert_eq!(decisions[1], RetryDecision::Retry { attempt: 2 });
        assert!(decisions[2..].iter().all(|d| *d == RetryDecision::PermanentFailure));
        assert_eq!(s.retry_count, 3);
    }

    #[test]
    fn test_zero_max_retries_fails_immediately() {
        let mut s = step(0, 0);
        assert_eq!(decide(&mut s, "nope", Utc::now()), RetryDecision::PermanentFailure);
        assert_eq!(s.retry_count, 0);
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            base_delay_ms: 500,
            max_delay_ms: 3_000,
        };
        assert_eq!(policy.delay_for(1), Duration::from_millis(500));
        assert_eq!(policy.delay_for(2), Duration::from_millis(1_000));
        assert_eq!(policy.delay_for(3), Duration::from_millis(2_000));
        assert_eq!(policy.delay_for(4), Duration::from_millis(3_000));
        assert_eq!(policy.delay_for(60), Duration::from_millis(3_000));
        assert_eq!(RetryPolicy::immediate().delay_for(5), Duration::ZERO);
    }
}
