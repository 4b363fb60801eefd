use async_trait::async_trait;
use chrono::Utc;
use rusqlite::types::Type;
use rusqlite::{OptionalExtension, Row};

use super::WorkflowStore;
use crate::db::Database;
use crate::error::FlowError;
use crate::models::{Workflow, WorkflowStatus, WorkflowStep};

const SELECT_COLUMNS: &str = "SELECT id, user_id, input_id, status, current_step_id, steps,
     metadata, created_at, updated_at FROM workflows";

pub struct SqliteWorkflowStore {
    db: Database,
}

impl SqliteWorkflowStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl WorkflowStore for SqliteWorkflowStore {
    async fn create(&self, workflow: &Workflow) -> Result<(), FlowError> {
        let wf = workflow.clone();
        let steps = serde_json::to_string(&wf.steps)?;
        let metadata = serde_json::to_string(&wf.metadata)?;
        self.db
            .with_conn_async(move |conn| {
                conn.execute(
                    "INSERT INTO workflows (id, user_id, input_id, status, current_step_id, steps,
                     metadata, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                    rusqlite::params![
                        wf.id,
                        wf.user_id,
                        wf.input_id,
                        wf.status.as_str(),
                        wf.current_step_id,
                        steps,
                        metadata,
                        wf.created_at.timestamp_millis(),
                        wf.updated_at.timestamp_millis(),
                    ],
                )?;
                Ok(())
            })
            .await
    }

    async fn load(&self, id: &str) -> Result<Option<Workflow>, FlowError> {
        let id = id.to_string();
        self.db
            .with_conn_async(move |conn| {
                let mut stmt = conn.prepare(&format!("{} WHERE id = ?1", SELECT_COLUMNS))?;
                stmt.query_row(rusqlite::params![id], row_to_workflow)
                    .optional()
            })
            .await
    }

    async fn update_status(
        &self,
        id: &str,
        status: WorkflowStatus,
        current_step_id: &str,
        steps: &[WorkflowStep],
    ) -> Result<(), FlowError> {
        let id = id.to_string();
        let current_step_id = current_step_id.to_string();
        let steps = serde_json::to_string(steps)?;
        let now = Utc::now().timestamp_millis();
        self.db
            .with_conn_mut_async(move |conn| {
                let tx = conn
                    .transaction()
                    .map_err(|e| FlowError::Database(e.to_string()))?;
                let updated = tx
                    .execute(
                        "UPDATE workflows SET status = ?1, current_step_id = ?2, steps = ?3,
                         updated_at = ?4 WHERE id = ?5",
                        rusqlite::params![status.as_str(), current_step_id, steps, now, id],
                    )
                    .map_err(|e| FlowError::Database(e.to_string()))?;
                if updated == 0 {
                    // Dropping the transaction rolls it back.
                    return Err(FlowError::WorkflowNotFound(id));
                }
                tx.commit().map_err(|e| FlowError::Database(e.to_string()))
            })
            .await
    }

    async fn list(&self, status: Option<WorkflowStatus>) -> Result<Vec<Workflow>, FlowError> {
        self.db
            .with_conn_async(move |conn| match status {
                Some(status) => {
                    let mut stmt = conn.prepare(&format!(
                        "{} WHERE status = ?1 ORDER BY created_at DESC",
                        SELECT_COLUMNS
                    ))?;
                    let rows = stmt
                        .query_map(rusqlite::params![status.as_str()], row_to_workflow)?
                        .collect::<Result<Vec<_>, _>>()?;
                    Ok(rows)
                }
                None => {
                    let mut stmt =
                        conn.prepare(&format!("{} ORDER BY created_at DESC", SELECT_COLUMNS))?;
                    let rows = stmt
                        .query_map([], row_to_workflow)?
                        .collect::<Result<Vec<_>, _>>()?;
                    Ok(rows)
                }
            })
            .await
    }
}

fn json_column<T: serde::de::DeserializeOwned>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let text: String = row.get(idx)?;
    serde_json::from_str(&text)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn row_to_workflow(row: &Row<'_>) -> rusqlite::Result<Workflow> {
    let status: String = row.get(3)?;
    let status = WorkflowStatus::from_str(&status).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            3,
            Type::Text,
            format!("unknown workflow status '{}'", status).into(),
        )
    })?;
    let created_ms: i64 = row.get(7)?;
    let updated_ms: i64 = row.get(8)?;

    Ok(Workflow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        input_id: row.get(2)?,
        status,
        current_step_id: row.get(4)?,
        steps: json_column(row, 5)?,
        metadata: json_column(row, 6)?,
        created_at: chrono::DateTime::from_timestamp_millis(created_ms).unwrap_or_else(Utc::now),
        updated_at: chrono::DateTime::from_timestamp_millis(updated_ms).unwrap_or_else(Utc::now),
    })
}
