//! Result shapes returned by the orchestrator, one per job variant.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::job::SessionStatus;

/// Machine-readable failure attached to a failed result.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorInfo {
    /// Stable error code, e.g. `VALIDATION_ERROR` or `USER_EXISTS`.
    pub code: String,
    /// Human-readable message. Never contains credentials.
    pub message: String,
    /// Whether the caller may retry with backoff.
    pub retryable: bool,
}

impl ErrorInfo {
    pub fn new(code: impl Into<String>, message: impl Into<String>, retryable: bool) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            retryable,
        }
    }
}

/// Terminal status of a revoke job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RevokeStatus {
    Revoked,
    NotFound,
    Failed,
}

/// Terminal status of a cleanup job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CleanupStatus {
    Completed,
    Failed,
}

/// Result envelope paralleling [`JobKind`](crate::job::JobKind).
///
/// A job id never maps to two different results; the orchestrator computes
/// the result once and the transport is responsible for redelivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobResult {
    #[serde(rename_all = "camelCase")]
    Create {
        session_id: String,
        status: SessionStatus,
        /// Present only on success. Carries live credentials - never log.
        #[serde(skip_serializing_if = "Option::is_none")]
        dsn: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        expires_at: Option<DateTime<Utc>>,
        #[serde(skip_serializing_if = "Option::is_none")]
        username: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<ErrorInfo>,
    },

    #[serde(rename_all = "camelCase")]
    Revoke {
        status: RevokeStatus,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<ErrorInfo>,
    },

    #[serde(rename_all = "camelCase")]
    Cleanup {
        status: CleanupStatus,
        cleaned_count: u64,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<ErrorInfo>,
    },
}

impl JobResult {
    /// Successful create result with freshly issued credentials.
    pub fn create_ready(
        session_id: impl Into<String>,
        dsn: impl Into<String>,
        expires_at: DateTime<Utc>,
        username: impl Into<String>,
    ) -> Self {
        Self::Create {
            session_id: session_id.into(),
            status: SessionStatus::Ready,
            dsn: Some(dsn.into()),
            expires_at: Some(expires_at),
            username: Some(username.into()),
            error: None,
        }
    }

    /// Failed create result. No credentials were issued.
    pub fn create_failed(session_id: impl Into<String>, error: ErrorInfo) -> Self {
        Self::Create {
            session_id: session_id.into(),
            status: SessionStatus::Failed,
            dsn: None,
            expires_at: None,
            username: None,
            error: Some(error),
        }
    }

    pub fn revoked() -> Self {
        Self::Revoke {
            status: RevokeStatus::Revoked,
            error: None,
        }
    }

    pub fn revoke_not_found() -> Self {
        Self::Revoke {
            status: RevokeStatus::NotFound,
            error: None,
        }
    }

    pub fn revoke_failed(error: ErrorInfo) -> Self {
        Self::Revoke {
            status: RevokeStatus::Failed,
            error: Some(error),
        }
    }

    pub fn cleanup_completed(cleaned_count: u64) -> Self {
        Self::Cleanup {
            status: CleanupStatus::Completed,
            cleaned_count,
            error: None,
        }
    }

    pub fn cleanup_failed(error: ErrorInfo) -> Self {
        Self::Cleanup {
            status: CleanupStatus::Failed,
            cleaned_count: 0,
            error: Some(error),
        }
    }

    /// The error attached to this result, if it failed.
    pub fn error(&self) -> Option<&ErrorInfo> {
        match self {
            Self::Create { error, .. } | Self::Revoke { error, .. } | Self::Cleanup { error, .. } => {
                error.as_ref()
            }
        }
    }
}
