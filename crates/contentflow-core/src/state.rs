//! Shared application state for the CLI and embedding hosts.

use std::sync::Arc;

use crate::channel::SqliteMessageChannel;
use crate::config::OrchestratorConfig;
use crate::db::Database;
use crate::events::EventBus;
use crate::orchestration::{InboundConsumer, Orchestrator};
use crate::store::{SqliteMessageLog, SqliteWorkflowStore};

/// SQLite-backed wiring of the orchestrator and its collaborators.
pub struct AppStateInner {
    pub db: Database,
    pub workflow_store: Arc<SqliteWorkflowStore>,
    pub message_log: Arc<SqliteMessageLog>,
    pub channel: Arc<SqliteMessageChannel>,
    pub event_bus: EventBus,
    pub orchestrator: Arc<Orchestrator>,
}

pub type AppState = Arc<AppStateInner>;

impl AppStateInner {
    pub fn new(db: Database, config: OrchestratorConfig) -> Self {
        let workflow_store = Arc::new(SqliteWorkflowStore::new(db.clone()));
        let message_log = Arc::new(SqliteMessageLog::new(db.clone()));
        let channel = Arc::new(SqliteMessageChannel::new(
            db.clone(),
            config.consumer.visibility_timeout(),
        ));
        let event_bus = EventBus::new();
        let orchestrator = Arc::new(Orchestrator::new(
            config,
            workflow_store.clone(),
            message_log.clone(),
            channel.clone(),
            Arc::new(event_bus.clone()),
        ));
        Self {
            db,
            workflow_store,
            message_log,
            channel,
            event_bus,
            orchestrator,
        }
    }

    /// Consumer draining the SQLite inbox into the orchestrator.
    pub fn consumer(&self) -> InboundConsumer {
        InboundConsumer::new(self.orchestrator.clone(), self.channel.clone())
    }
}
