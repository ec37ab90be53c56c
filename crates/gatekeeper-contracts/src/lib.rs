//! gatekeeper-contracts - Shared contracts between the Gatekeeper agent and
//! its transports.
//!
//! This crate defines:
//! - The job envelope submitted to the orchestrator ([`Job`], [`JobKind`])
//! - The result shapes returned for each job variant ([`JobResult`])
//! - Field validators for identifiers, TTLs, and free-text fields
//! - The tamper-evident audit event envelope ([`AuditEvent`]) and the
//!   [`AuditSink`] trait implemented by storage backends

pub mod audit;
pub mod job;
pub mod result;
pub mod validate;

pub use audit::{
    AuditError, AuditEvent, AuditSink, MemoryAuditSink, NewAuditEvent, EVENT_SESSION_CREATED,
    EVENT_SESSION_REVOKED, EVENT_SESSIONS_CLEANED, EVENT_SETUP_COMPLETED,
};
pub use job::{AccessRole, Job, JobKind, Requester, SessionStatus, SslMode, Target};
pub use result::{CleanupStatus, ErrorInfo, JobResult, RevokeStatus};
pub use validate::{ValidationError, ValidationResult};
