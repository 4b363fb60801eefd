//! ContentFlow CLI library: command implementations shared by the
//! `contentflow` binary and the integration tests.

pub mod commands;
