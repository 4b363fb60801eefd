//! Workflow engine building blocks.
//!
//! # Architecture
//!
//! ```text
//! InputReady ──► Orchestrator ──► StepExecutor ──► MessageChannel ──► agent
//!                     ▲                                                 │
//!                     │          ┌── advance::next_step (response)      │
//!                     └── handle ┤                                      │
//!                                └── retry::decide     (error)  ◄───────┘
//! ```

pub mod advance;
pub mod executor;
pub mod retry;

pub use advance::{conclude, next_step, Advancement, PipelineSummary};
pub use executor::{Dispatch, StepExecutor};
pub use retry::{decide, RetryDecision, RetryPolicy};
