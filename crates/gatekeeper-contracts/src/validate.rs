//! Field validators shared by the orchestrator and transports.
//!
//! All identifier checks are simple character-class inspections; patterns:
//!
//! - job id: 1-128 characters, no control characters
//! - session id: `ses_` + 4-60 alphanumerics
//! - target id: 1-64 of `[A-Za-z0-9_-]`
//! - ephemeral username: `gk_` + 1-60 alphanumerics, total length 4-63
//! - reason: at most 256 characters

use thiserror::Error;

/// Validation failure carrying the offending field name.
///
/// Never retryable; the orchestrator surfaces it as `VALIDATION_ERROR`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid {field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

pub type ValidationResult = Result<(), ValidationError>;

/// Job id: the caller's idempotency handle, 1-128 characters.
pub fn validate_job_id(id: &str) -> ValidationResult {
    if id.is_empty() || id.len() > 128 {
        return Err(ValidationError::new("id", "must be 1-128 characters"));
    }
    if id.chars().any(|c| c.is_control()) {
        return Err(ValidationError::new("id", "must not contain control characters"));
    }
    Ok(())
}

/// TTL must land in [1, max_minutes].
pub fn validate_ttl(ttl_minutes: u32, max_minutes: u32) -> ValidationResult {
    if ttl_minutes == 0 {
        return Err(ValidationError::new("ttlMinutes", "must be at least 1"));
    }
    if ttl_minutes > max_minutes {
        return Err(ValidationError::new(
            "ttlMinutes",
            format!("must not exceed {}", max_minutes),
        ));
    }
    Ok(())
}

/// Session id: `ses_` followed by 4-60 alphanumerics.
pub fn validate_session_id(session_id: &str) -> ValidationResult {
    let Some(suffix) = session_id.strip_prefix("ses_") else {
        return Err(ValidationError::new("sessionId", "must start with ses_"));
    };
    if suffix.len() < 4 || suffix.len() > 60 {
        return Err(ValidationError::new(
            "sessionId",
            "must have 4-60 characters after the prefix",
        ));
    }
    if !suffix.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(ValidationError::new("sessionId", "suffix must be alphanumeric"));
    }
    Ok(())
}

/// Target id: 1-64 of `[A-Za-z0-9_-]`.
pub fn validate_target_id(target_id: &str) -> ValidationResult {
    if target_id.is_empty() || target_id.len() > 64 {
        return Err(ValidationError::new("targetId", "must be 1-64 characters"));
    }
    if !target_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(ValidationError::new(
            "targetId",
            "must contain only alphanumerics, underscore, or dash",
        ));
    }
    Ok(())
}

/// Ephemeral username: `gk_` + alphanumerics, total length 4-63.
///
/// This is the same pattern the bootstrap helpers enforce server-side; the
/// client-side check exists so malformed names fail before touching the
/// database.
pub fn validate_username(username: &str) -> ValidationResult {
    if username.len() < 4 || username.len() > 63 {
        return Err(ValidationError::new("username", "must be 4-63 characters"));
    }
    let Some(suffix) = username.strip_prefix("gk_") else {
        return Err(ValidationError::new("username", "must start with gk_"));
    };
    if suffix.is_empty() || suffix.len() > 60 {
        return Err(ValidationError::new(
            "username",
            "must have 1-60 characters after the prefix",
        ));
    }
    if !suffix.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(ValidationError::new("username", "suffix must be alphanumeric"));
    }
    Ok(())
}

/// Optional free-text reason, at most 256 characters.
pub fn validate_reason(reason: Option<&str>) -> ValidationResult {
    if let Some(reason) = reason {
        if reason.len() > 256 {
            return Err(ValidationError::new("reason", "must be at most 256 characters"));
        }
    }
    Ok(())
}
