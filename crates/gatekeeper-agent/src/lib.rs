//! gatekeeper-agent - Job orchestration for short-lived database credentials.
//!
//! This library provides the core functionality for an agent that:
//! - Decodes and validates jobs (create_session, revoke_session, cleanup)
//! - Generates session ids, login names, and passwords
//! - Dispatches to the configured database provider
//! - Emits tamper-evident audit events after each committed effect
//!
//! The transport delivering jobs (HTTP, invocation events) is out of scope;
//! the [`Orchestrator`] accepts decoded [`Job`](gatekeeper_contracts::Job)
//! values and returns [`JobResult`](gatekeeper_contracts::JobResult)s.

#[macro_use]
mod logging;

pub mod config;
pub mod error;
pub mod orchestrator;
pub mod session;

pub use config::{Config, DatabaseSettings, LoggingSettings, PoolSettings, SessionSettings};
pub use error::{AgentError, Result};
pub use orchestrator::{AgentHealth, AgentHealthStatus, Orchestrator};
pub use session::{generate_password, generate_session_id, generate_username};
