use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio::sync::Mutex;

use super::{available_at, MessageChannel};
use crate::error::FlowError;
use crate::models::AgentMessage;

/// In-process outbound channel keeping every sent request per queue.
#[derive(Default)]
pub struct MemoryChannel {
    queues: Mutex<HashMap<String, VecDeque<(AgentMessage, DateTime<Utc>)>>>,
    /// Every send as `(queue, message_id)`, in order.
    history: Mutex<Vec<(String, String)>>,
}

impl MemoryChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove and return everything on `queue` that is already available.
    pub async fn drain(&self, queue: &str) -> Vec<AgentMessage> {
        let now = Utc::now();
        let mut queues = self.queues.lock().await;
        let Some(q) = queues.get_mut(queue) else {
            return Vec::new();
        };
        let (ready, waiting): (VecDeque<_>, VecDeque<_>) =
            q.drain(..).partition(|(_, at)| *at <= now);
        *q = waiting;
        ready.into_iter().map(|(message, _)| message).collect()
    }

    /// Messages on `queue` that are not available yet, with their due time.
    pub async fn delayed(&self, queue: &str) -> Vec<(AgentMessage, DateTime<Utc>)> {
        let now = Utc::now();
        let queues = self.queues.lock().await;
        queues
            .get(queue)
            .map(|q| q.iter().filter(|(_, at)| *at > now).cloned().collect())
            .unwrap_or_default()
    }

    /// Queues targeted so far, one entry per send.
    pub async fn dispatched_queues(&self) -> Vec<String> {
        self.history
            .lock()
            .await
            .iter()
            .map(|(queue, _)| queue.clone())
            .collect()
    }
}

#[async_trait]
impl MessageChannel for MemoryChannel {
    async fn send_after(
        &self,
        queue: &str,
        message: AgentMessage,
        delay: Duration,
    ) -> Result<(), FlowError> {
        let due = available_at(delay)?;
        self.history
            .lock()
            .await
            .push((queue.to_string(), message.message_id.clone()));
        self.queues
            .lock()
            .await
            .entry(queue.to_string())
            .or_default()
            .push_back((message, due));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MessageType;

    fn request(step_id: &str) -> AgentMessage {
        AgentMessage::new(
            "wf-1".into(),
            step_id.into(),
            "content_generator".into(),
            MessageType::Request,
            serde_json::json!({}),
        )
    }

    #[tokio::test]
    async fn test_delayed_send_is_held_back_from_drain() {
        let channel = MemoryChannel::new();
        channel.send("content", request("now")).await.unwrap();
        channel
            .send_after("content", request("later"), Duration::from_secs(30))
            .await
            .unwrap();

        let ready = channel.drain("content").await;
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].step_id, "now");

        let delayed = channel.delayed("content").await;
        assert_eq!(delayed.len(), 1);
        assert_eq!(delayed[0].0.step_id, "later");
        assert!(delayed[0].1 > Utc::now() + chrono::Duration::seconds(25));
        assert_eq!(channel.dispatched_queues().await.len(), 2);
    }
}
