//! ContentFlow Core - workflow orchestration for content production.
//!
//! A new input (a transcription) starts a workflow: an ordered pipeline of
//! steps, each dispatched to a worker agent over a message channel. Agent
//! replies drive the pipeline forward, retry failed steps, or fail the
//! workflow. Human-gated steps park the pipeline until a review decision
//! arrives.
//!
//! The crate has no transport dependency: storage, channels and the event
//! publisher are traits, with SQLite and in-memory implementations.

pub mod channel;
pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod models;
pub mod orchestration;
pub mod state;
pub mod store;
pub mod workflow;

// Convenience re-exports
pub use config::OrchestratorConfig;
pub use db::Database;
pub use error::FlowError;
pub use orchestration::{HandleOutcome, InboundConsumer, Orchestrator};
pub use state::{AppState, AppStateInner};
