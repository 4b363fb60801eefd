//! Message channel between the orchestrator and the worker agents.
//!
//! Outbound: one queue per agent type carrying `request` messages.
//! Inbound: a shared channel carrying raw response/error/status bodies back
//! to the orchestrator, with explicit acknowledgement.

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use std::time::Duration;

use crate::error::FlowError;
use crate::models::AgentMessage;

pub use memory::MemoryChannel;
pub use sqlite::SqliteMessageChannel;

/// Sends request messages to agent queues. Ownership of the message passes
/// to the channel.
#[async_trait]
pub trait MessageChannel: Send + Sync {
    /// Accept `message` now and make it available on `queue` once `delay`
    /// has elapsed. The message is durable as soon as this returns.
    async fn send_after(
        &self,
        queue: &str,
        message: AgentMessage,
        delay: Duration,
    ) -> Result<(), FlowError>;

    async fn send(&self, queue: &str, message: AgentMessage) -> Result<(), FlowError> {
        self.send_after(queue, message, Duration::ZERO).await
    }
}

/// Instant at which a message sent with `delay` becomes available.
pub(crate) fn available_at(delay: Duration) -> Result<DateTime<Utc>, FlowError> {
    TimeDelta::from_std(delay)
        .ok()
        .and_then(|d| Utc::now().checked_add_signed(d))
        .ok_or_else(|| FlowError::Channel(format!("delay {:?} is out of range", delay)))
}

/// A received inbound body, invisible to other receivers until it is
/// acknowledged or its visibility timeout elapses.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundDelivery {
    pub receipt: String,
    pub body: String,
    pub attempts: u32,
}

#[async_trait]
pub trait InboundChannel: Send + Sync {
    /// Enqueue a raw body; returns its receipt id.
    async fn enqueue(&self, body: String) -> Result<String, FlowError>;

    async fn receive(&self, max: usize) -> Result<Vec<InboundDelivery>, FlowError>;

    /// Delete a delivery for good. Unacknowledged deliveries are redelivered.
    async fn ack(&self, receipt: &str) -> Result<(), FlowError>;
}
