//! Job envelope and variant payloads.
//!
//! Jobs arrive from the transport as JSON with camelCase field names and an
//! internal `type` tag. A job is immutable once decoded; the orchestrator
//! never mutates it, only maps it to a [`JobResult`](crate::result::JobResult).

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A unit of work submitted to the orchestrator.
///
/// The `id` is the caller's idempotency handle; the `correlation_id` stitches
/// logs and audit events across components for one request.
///
/// # Example
///
/// ```
/// use gatekeeper_contracts::{Job, JobKind};
///
/// let json = r#"{
///     "id": "j1",
///     "correlationId": "c07a0c9b-7f6d-4b8f-8b0c-1d8b9eb9f4f8",
///     "type": "cleanup"
/// }"#;
/// let job: Job = serde_json::from_str(json).unwrap();
/// assert!(matches!(job.kind, JobKind::Cleanup { older_than_minutes: 5 }));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    /// Caller-chosen job identifier, 1-128 characters.
    pub id: String,

    /// Correlation UUID echoed on results and audit events.
    pub correlation_id: Uuid,

    /// Variant payload, tagged by `type`.
    #[serde(flatten)]
    pub kind: JobKind,
}

/// Job variants accepted by the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobKind {
    /// Provision a fresh ephemeral login and return its DSN.
    #[serde(rename_all = "camelCase")]
    CreateSession {
        target: Target,
        role: AccessRole,
        ttl_minutes: u32,
        requester: Requester,
        #[serde(default)]
        reason: Option<String>,
    },

    /// Revoke a previously issued session by session id.
    #[serde(rename_all = "camelCase")]
    RevokeSession { session_id: String },

    /// Drop every expired login older than the grace period.
    #[serde(rename_all = "camelCase")]
    Cleanup {
        #[serde(default = "default_older_than_minutes")]
        older_than_minutes: u32,
    },
}

fn default_older_than_minutes() -> u32 {
    5
}

impl JobKind {
    /// Short variant name used in logs and audit event data.
    pub fn name(&self) -> &'static str {
        match self {
            Self::CreateSession { .. } => "create_session",
            Self::RevokeSession { .. } => "revoke_session",
            Self::Cleanup { .. } => "cleanup",
        }
    }
}

/// Target database coordinates for a create-session job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Target {
    pub host: String,
    pub port: u16,
    pub database: String,
    #[serde(default)]
    pub ssl_mode: SslMode,
}

/// SSL negotiation mode carried into the issued DSN.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SslMode {
    #[default]
    Prefer,
    Require,
    Disable,
}

impl SslMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Prefer => "prefer",
            Self::Require => "require",
            Self::Disable => "disable",
        }
    }
}

impl std::fmt::Display for SslMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of the human or machine requesting a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Requester {
    pub user_id: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// Permission tier requested for an ephemeral login.
///
/// Maps 1:1 onto the role packs installed by the bootstrap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessRole {
    Read,
    Write,
    Admin,
}

impl AccessRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::Admin => "admin",
        }
    }
}

impl std::fmt::Display for AccessRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Observable lifecycle states of a session.
///
/// `pending` is transient; every other state is terminal. Once a DSN is
/// issued (`ready`) the session stays observable as alive until revoked or
/// expired - there is no `ready` to `failed` transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Pending,
    Ready,
    Revoked,
    Expired,
    Failed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_create_session() {
        let json = r#"{
            "id": "j1",
            "correlationId": "c07a0c9b-7f6d-4b8f-8b0c-1d8b9eb9f4f8",
            "type": "create_session",
            "target": {"host": "db", "port": 5432, "database": "app"},
            "role": "read",
            "ttlMinutes": 15,
            "requester": {"userId": "u1"}
        }"#;
        let job: Job = serde_json::from_str(json).unwrap();
        assert_eq!(job.id, "j1");
        match job.kind {
            JobKind::CreateSession {
                target,
                role,
                ttl_minutes,
                requester,
                reason,
            } => {
                assert_eq!(target.host, "db");
                assert_eq!(target.port, 5432);
                assert_eq!(target.ssl_mode, SslMode::Prefer); // default
                assert_eq!(role, AccessRole::Read);
                assert_eq!(ttl_minutes, 15);
                assert_eq!(requester.user_id, "u1");
                assert!(requester.email.is_none());
                assert!(reason.is_none());
            }
            other => panic!("wrong variant: {:?}", other),
        }
    }

    #[test]
    fn test_decode_revoke_session() {
        let json = r#"{
            "id": "j2",
            "correlationId": "c07a0c9b-7f6d-4b8f-8b0c-1d8b9eb9f4f8",
            "type": "revoke_session",
            "sessionId": "ses_abcd1234"
        }"#;
        let job: Job = serde_json::from_str(json).unwrap();
        match job.kind {
            JobKind::RevokeSession { session_id } => assert_eq!(session_id, "ses_abcd1234"),
            other => panic!("wrong variant: {:?}", other),
        }
    }

    #[test]
    fn test_decode_cleanup_default_grace() {
        let json = r#"{
            "id": "j3",
            "correlationId": "c07a0c9b-7f6d-4b8f-8b0c-1d8b9eb9f4f8",
            "type": "cleanup"
        }"#;
        let job: Job = serde_json::from_str(json).unwrap();
        match job.kind {
            JobKind::Cleanup { older_than_minutes } => assert_eq!(older_than_minutes, 5),
            other => panic!("wrong variant: {:?}", other),
        }
    }

    #[test]
    fn test_decode_rejects_unknown_type() {
        let json = r#"{
            "id": "j4",
            "correlationId": "c07a0c9b-7f6d-4b8f-8b0c-1d8b9eb9f4f8",
            "type": "escalate"
        }"#;
        assert!(serde_json::from_str::<Job>(json).is_err());
    }

    #[test]
    fn test_decode_rejects_bad_correlation_id() {
        let json = r#"{
            "id": "j5",
            "correlationId": "not-a-uuid",
            "type": "cleanup"
        }"#;
        assert!(serde_json::from_str::<Job>(json).is_err());
    }

    #[test]
    fn test_ssl_mode_roundtrip() {
        let target: Target = serde_json::from_str(
            r#"{"host": "db", "port": 5432, "database": "app", "sslMode": "require"}"#,
        )
        .unwrap();
        assert_eq!(target.ssl_mode, SslMode::Require);
        assert_eq!(target.ssl_mode.to_string(), "require");
    }

    #[test]
    fn test_role_serialization() {
        assert_eq!(serde_json::to_string(&AccessRole::Admin).unwrap(), "\"admin\"");
        assert_eq!(AccessRole::Write.as_str(), "write");
    }
}
