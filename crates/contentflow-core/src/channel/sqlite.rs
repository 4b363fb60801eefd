//! SQLite-backed durable queues: a per-queue outbox agents pull requests
//! from, and an inbox with visibility timeouts for agent replies.

use async_trait::async_trait;
use chrono::Utc;
use std::time::Duration;

use super::{available_at, InboundChannel, InboundDelivery, MessageChannel};
use crate::db::Database;
use crate::error::FlowError;
use crate::models::AgentMessage;

pub struct SqliteMessageChannel {
    db: Database,
    visibility_timeout: Duration,
}

impl SqliteMessageChannel {
    pub fn new(db: Database, visibility_timeout: Duration) -> Self {
        Self {
            db,
            visibility_timeout,
        }
    }

    /// Agent side: take up to `max` available requests from `queue`, oldest
    /// first. Delayed requests stay until they come due.
    pub async fn pull(&self, queue: &str, max: usize) -> Result<Vec<AgentMessage>, FlowError> {
        let queue = queue.to_string();
        let now = Utc::now().timestamp_millis();
        let bodies = self
            .db
            .with_conn_mut_async(move |conn| {
                let tx = conn
                    .transaction()
                    .map_err(|e| FlowError::Database(e.to_string()))?;
                let rows: Vec<(i64, String)> = {
                    let mut stmt = tx
                        .prepare(
                            "SELECT seq, body FROM outbound_messages
                             WHERE queue = ?1 AND available_at <= ?2
                             ORDER BY seq ASC LIMIT ?3",
                        )
                        .map_err(|e| FlowError::Database(e.to_string()))?;
                    let rows = stmt
                        .query_map(rusqlite::params![queue, now, max as i64], |row| {
                            Ok((row.get(0)?, row.get(1)?))
                        })
                        .and_then(|rows| rows.collect::<Result<Vec<_>, _>>())
                        .map_err(|e| FlowError::Database(e.to_string()))?;
                    rows
                };
                for (seq, _) in &rows {
                    tx.execute(
                        "DELETE FROM outbound_messages WHERE seq = ?1",
                        rusqlite::params![seq],
                    )
                    .map_err(|e| FlowError::Database(e.to_string()))?;
                }
                tx.commit().map_err(|e| FlowError::Database(e.to_string()))?;
                Ok(rows.into_iter().map(|(_, body)| body).collect::<Vec<_>>())
            })
            .await?;

        bodies
            .iter()
            .map(|body| AgentMessage::from_json(body))
            .collect()
    }

    /// Number of requests in `queue` that an agent could pull right now.
    pub async fn depth(&self, queue: &str) -> Result<usize, FlowError> {
        let queue = queue.to_string();
        let now = Utc::now().timestamp_millis();
        self.db
            .with_conn_async(move |conn| {
                let count: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM outbound_messages
                     WHERE queue = ?1 AND available_at <= ?2",
                    rusqlite::params![queue, now],
                    |row| row.get(0),
                )?;
                Ok(count as usize)
            })
            .await
    }
}

#[async_trait]
impl MessageChannel for SqliteMessageChannel {
    async fn send_after(
        &self,
        queue: &str,
        message: AgentMessage,
        delay: Duration,
    ) -> Result<(), FlowError> {
        let queue = queue.to_string();
        let body = message.to_json()?;
        let message_id = message.message_id;
        let now = Utc::now().timestamp_millis();
        let due = available_at(delay)?.timestamp_millis();
        self.db
            .with_conn_async(move |conn| {
                conn.execute(
                    "INSERT INTO outbound_messages (queue, message_id, body, available_at,
                     created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
                    rusqlite::params![queue, message_id, body, due, now],
                )?;
                Ok(())
            })
            .await
    }
}

#[async_trait]
impl InboundChannel for SqliteMessageChannel {
    async fn enqueue(&self, body: String) -> Result<String, FlowError> {
        let receipt = uuid::Uuid::new_v4().to_string();
        let id = receipt.clone();
        let now = Utc::now().timestamp_millis();
        self.db
            .with_conn_async(move |conn| {
                conn.execute(
                    "INSERT INTO inbound_messages (id, body, attempts, visible_at, created_at)
                     VALUES (?1, ?2, 0, ?3, ?3)",
                    rusqlite::params![id, body, now],
                )?;
                Ok(())
            })
            .await?;
        Ok(receipt)
    }

    async fn receive(&self, max: usize) -> Result<Vec<InboundDelivery>, FlowError> {
        let now = Utc::now().timestamp_millis();
        let hidden_until = now + self.visibility_timeout.as_millis() as i64;
        self.db
            .with_conn_mut_async(move |conn| {
                let tx = conn
                    .transaction()
                    .map_err(|e| FlowError::Database(e.to_string()))?;
                let rows: Vec<(String, String, u32)> = {
                    let mut stmt = tx
                        .prepare(
                            "SELECT id, body, attempts FROM inbound_messages WHERE visible_at <= ?1
                             ORDER BY created_at ASC, rowid ASC LIMIT ?2",
                        )
                        .map_err(|e| FlowError::Database(e.to_string()))?;
                    let rows = stmt
                        .query_map(rusqlite::params![now, max as i64], |row| {
                            Ok((row.get(0)?, row.get(1)?, row.get(2)?))
                        })
                        .and_then(|rows| rows.collect::<Result<Vec<_>, _>>())
                        .map_err(|e| FlowError::Database(e.to_string()))?;
                    rows
                };
                for (id, _, _) in &rows {
                    tx.execute(
                        "UPDATE inbound_messages SET attempts = attempts + 1, visible_at = ?1
                         WHERE id = ?2",
                        rusqlite::params![hidden_until, id],
                    )
                    .map_err(|e| FlowError::Database(e.to_string()))?;
                }
                tx.commit().map_err(|e| FlowError::Database(e.to_string()))?;
                Ok(rows
                    .into_iter()
                    .map(|(receipt, body, attempts)| InboundDelivery {
                        receipt,
                        body,
                        attempts: attempts + 1,
                    })
                    .collect())
            })
            .await
    }

    async fn ack(&self, receipt: &str) -> Result<(), FlowError> {
        let receipt = receipt.to_string();
        self.db
            .with_conn_async(move |conn| {
                conn.execute(
                    "DELETE FROM inbound_messages WHERE id = ?1",
                    rusqlite::params![receipt],
                )?;
                Ok(())
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MessageType;

    fn channel(visibility: Duration) -> SqliteMessageChannel {
        SqliteMessageChannel::new(Database::open_in_memory().unwrap(), visibility)
    }

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
    async fn test_outbox_is_per_queue_and_fifo() {
        let ch = channel(Duration::from_secs(30));
        ch.send("content", request("a")).await.unwrap();
        ch.send("images", request("b")).await.unwrap();
        ch.send("content", request("c")).await.unwrap();

        assert_eq!(ch.depth("content").await.unwrap(), 2);
        let pulled = ch.pull("content", 10).await.unwrap();
        let steps: Vec<_> = pulled.iter().map(|m| m.step_id.as_str()).collect();
        assert_eq!(steps, vec!["a", "c"]);
        assert_eq!(ch.depth("content").await.unwrap(), 0);
        assert_eq!(ch.depth("images").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_delayed_request_is_not_pulled_early() {
        let ch = channel(Duration::from_secs(30));
        ch.send_after("content", request("later"), Duration::from_secs(60))
            .await
            .unwrap();
        ch.send("content", request("now")).await.unwrap();

        assert_eq!(ch.depth("content").await.unwrap(), 1);
        let pulled = ch.pull("content", 10).await.unwrap();
        assert_eq!(pulled.len(), 1);
        assert_eq!(pulled[0].step_id, "now");
        assert!(ch.pull("content", 10).await.unwrap().is_empty());

        // Still stored, just not due.
        let stored: i64 = ch
            .db
            .with_conn(|conn| {
                conn.query_row("SELECT COUNT(*) FROM outbound_messages", [], |row| row.get(0))
            })
            .unwrap();
        assert_eq!(stored, 1);
    }

    #[tokio::test]
    async fn test_inbound_hidden_until_acked_or_timeout() {
        let ch = channel(Duration::from_secs(60));
        let receipt = ch.enqueue("{}".into()).await.unwrap();

        let first = ch.receive(10).await.unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].receipt, receipt);
        assert_eq!(first[0].attempts, 1);
        assert!(ch.receive(10).await.unwrap().is_empty());

        ch.ack(&receipt).await.unwrap();
        assert!(ch.receive(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unacked_delivery_reappears() {
        let ch = channel(Duration::ZERO);
        ch.enqueue("not json".into()).await.unwrap();

        let first = ch.receive(1).await.unwrap();
        let second = ch.receive(1).await.unwrap();
        assert_eq!(first[0].receipt, second[0].receipt);
        assert_eq!(second[0].attempts, 2);
    }
}
