use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::Row;

use super::MessageLog;
use crate::db::Database;
use crate::error::FlowError;
use crate::models::{AgentMessage, MessageType};

pub struct SqliteMessageLog {
    db: Database,
}

impl SqliteMessageLog {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl MessageLog for SqliteMessageLog {
    async fn record(&self, message: &AgentMessage) -> Result<(), FlowError> {
        let msg = message.clone();
        let payload = serde_json::to_string(&msg.payload)?;
        self.db
            .with_conn_async(move |conn| {
                conn.execute(
                    "INSERT OR IGNORE INTO agent_messages (message_id, workflow_id, step_id,
                     agent_type, message_type, payload, retry_count, timestamp)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    rusqlite::params![
                        msg.message_id,
                        msg.workflow_id,
                        msg.step_id,
                        msg.agent_type,
                        msg.message_type.as_str(),
                        payload,
                        msg.retry_count,
                        msg.timestamp.timestamp_millis(),
                    ],
                )?;
                Ok(())
            })
            .await
    }

    async fn list_for_workflow(&self, workflow_id: &str) -> Result<Vec<AgentMessage>, FlowError> {
        let workflow_id = workflow_id.to_string();
        self.db
            .with_conn_async(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT message_id, workflow_id, step_id, agent_type, message_type, payload,
                     retry_count, timestamp
                     FROM agent_messages WHERE workflow_id = ?1 ORDER BY timestamp ASC, rowid ASC",
                )?;
                let rows = stmt
                    .query_map(rusqlite::params![workflow_id], row_to_message)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
    }

    async fn is_processed(&self, message_id: &str) -> Result<bool, FlowError> {
        let message_id = message_id.to_string();
        self.db
            .with_conn_async(move |conn| {
                let count: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM processed_messages WHERE message_id = ?1",
                    rusqlite::params![message_id],
                    |row| row.get(0),
                )?;
                Ok(count > 0)
            })
            .await
    }

    async fn mark_processed(&self, message_id: &str) -> Result<(), FlowError> {
        let message_id = message_id.to_string();
        let now = Utc::now().timestamp_millis();
        self.db
            .with_conn_async(move |conn| {
                conn.execute(
                    "INSERT OR IGNORE INTO processed_messages (message_id, processed_at)
                     VALUES (?1, ?2)",
                    rusqlite::params![message_id, now],
                )?;
                Ok(())
            })
            .await
    }

    async fn prune_processed(&self, before: DateTime<Utc>) -> Result<usize, FlowError> {
        let cutoff = before.timestamp_millis();
        self.db
            .with_conn_async(move |conn| {
                conn.execute(
                    "DELETE FROM processed_messages WHERE processed_at < ?1",
                    rusqlite::params![cutoff],
                )
            })
            .await
    }
}

fn row_to_message(row: &Row<'_>) -> rusqlite::Result<AgentMessage> {
    let message_type: String = row.get(4)?;
    let payload: String = row.get(5)?;
    let payload = serde_json::from_str(&payload)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(5, Type::Text, Box::new(e)))?;
    let timestamp_ms: i64 = row.get(7)?;

    Ok(AgentMessage {
        message_id: row.get(0)?,
        workflow_id: row.get(1)?,
        step_id: row.get(2)?,
        agent_type: row.get(3)?,
        message_type: MessageType::from_str(&message_type),
        payload,
        retry_count: row.get(6)?,
        timestamp: DateTime::from_timestamp_millis(timestamp_ms).unwrap_or_else(Utc::now),
    })
}
