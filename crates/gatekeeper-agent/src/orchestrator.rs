//! Job orchestration: validate, dispatch to the provider, audit, result.
//!
//! The orchestrator holds no state beyond the provider handle, the audit
//! sink, and an initialized flag. Per-job ordering: the privileged-helper
//! invocation happens-before the audit event, which happens-before the
//! result. Between jobs there is no order; concurrent creates interleave
//! freely and both succeed as long as their generated names differ.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use gatekeeper_contracts::validate::{
    validate_job_id, validate_reason, validate_session_id, validate_target_id, validate_ttl,
};
use gatekeeper_contracts::{
    AccessRole, AuditSink, ErrorInfo, Job, JobKind, JobResult, NewAuditEvent, Requester, Target,
    ValidationError, EVENT_SESSIONS_CLEANED, EVENT_SESSION_CREATED, EVENT_SESSION_REVOKED,
};
use gatekeeper_providers::{CreateUserRequest, DatabaseProvider, HealthState, ProviderError};

use crate::config::Config;
use crate::session::{generate_password, generate_session_id, generate_username};

const CODE_VALIDATION_ERROR: &str = "VALIDATION_ERROR";
const CODE_REVOCATION_ERROR: &str = "REVOCATION_ERROR";
const CODE_INTERNAL_ERROR: &str = "INTERNAL_ERROR";

/// Agent-level health status, mapped from the provider tri-state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentHealthStatus {
    Ok,
    Degraded,
    Down,
}

/// Health report surfaced to the transport.
#[derive(Debug, Clone, Serialize)]
pub struct AgentHealth {
    pub status: AgentHealthStatus,
    pub message: String,
    pub details: serde_json::Value,
}

/// Validates jobs, routes them to the configured provider, and emits audit
/// events.
pub struct Orchestrator {
    config: Config,
    provider: Arc<dyn DatabaseProvider>,
    audit: Arc<dyn AuditSink>,
    initialized: AtomicBool,
    closed: AtomicBool,
}

impl Orchestrator {
    pub fn new(config: Config, provider: Arc<dyn DatabaseProvider>, audit: Arc<dyn AuditSink>) -> Self {
        Self {
            config,
            provider,
            audit,
            initialized: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }
    }

    /// Initialize the provider on first use.
    ///
    /// Concurrent first jobs may race into `initialize` more than once; the
    /// provider contract makes repeat calls idempotent, so no lock is held
    /// across the await.
    async fn ensure_initialized(&self) -> Result<(), ProviderError> {
        if self.initialized.load(Ordering::SeqCst) {
            return Ok(());
        }
        self.provider
            .initialize(&self.config.connection_config(), &self.config.admin_credentials())
            .await?;
        self.initialized.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Hook for a future durable session-to-login map.
    ///
    /// The audit trail is the only mapping today; adding a table or metadata
    /// document behind this method makes revoke O(1) without touching the
    /// provider contract.
    pub async fn record_session(&self, session_id: &str, username: &str) {
        debug!("session {} maps to login {}", session_id, username);
    }

    /// Decode a raw JSON payload and handle it.
    pub async fn handle_json(&self, payload: &str) -> Result<JobResult, ValidationError> {
        let job: Job = serde_json::from_str(payload)
            .map_err(|e| ValidationError::new("payload", e.to_string()))?;
        Ok(self.handle_job(job).await)
    }

    /// Handle one decoded job and produce its terminal result.
    pub async fn handle_job(&self, job: Job) -> JobResult {
        info!(
            "handling {} job {} (correlation {})",
            job.kind.name(),
            job.id,
            job.correlation_id
        );
        match job.kind {
            JobKind::CreateSession {
                target,
                role,
                ttl_minutes,
                requester,
                reason,
            } => {
                self.handle_create(&job.id, job.correlation_id, target, role, ttl_minutes, requester, reason)
                    .await
            }
            JobKind::RevokeSession { session_id } => {
                self.handle_revoke(&job.id, job.correlation_id, &session_id).await
            }
            JobKind::Cleanup { older_than_minutes } => {
                self.handle_cleanup(&job.id, job.correlation_id, older_than_minutes).await
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn handle_create(
        &self,
        job_id: &str,
        correlation_id: Uuid,
        target: Target,
        role: AccessRole,
        ttl_minutes: u32,
        requester: Requester,
        reason: Option<String>,
    ) -> JobResult {
        let session_id = generate_session_id();

        if let Err(e) = validate_job_id(job_id)
            .and_then(|_| validate_ttl(ttl_minutes, self.config.session.max_ttl_minutes))
            .and_then(|_| validate_target_id(&target.database))
            .and_then(|_| validate_reason(reason.as_deref()))
        {
            warn!("create job {} rejected: {}", job_id, e);
            return JobResult::create_failed(session_id, validation_error_info(&e));
        }

        if let Err(e) = self.ensure_initialized().await {
            return JobResult::create_failed(session_id, provider_error_info(&e));
        }

        let username = generate_username();
        let password = generate_password();
        self.record_session(&session_id, &username).await;

        let request = CreateUserRequest {
            username,
            password,
            role_pack: role.as_str().to_string(),
            ttl_minutes,
            connection_limit: self.config.session.connection_limit,
        };

        info!(
            "provisioning login for job {} (role {}, ttl {}m, target {}:{}/{})",
            job_id, role, ttl_minutes, target.host, target.port, target.database
        );

        let user = match self.provider.create_ephemeral_user(&request).await {
            Ok(user) => user,
            Err(e) => {
                warn!("create failed for job {}: {}", job_id, e);
                return JobResult::create_failed(session_id, provider_error_info(&e));
            }
        };

        let event = NewAuditEvent::new(EVENT_SESSION_CREATED, correlation_id)
            .with_session(&session_id)
            .with_username(&user.username)
            .with_data(serde_json::json!({
                "job_id": job_id,
                "role": role.as_str(),
                "ttl_minutes": ttl_minutes,
                "requester": requester.user_id,
                "reason": reason,
                "target": {
                    "host": target.host,
                    "port": target.port,
                    "database": target.database,
                },
                "provider": {
                    "engine": self.provider.engine().as_str(),
                    "version": self.provider.version(),
                    "role_pack_version": self.config.session.role_pack_version,
                },
            }));

        if let Err(e) = self.audit.append(event).await {
            // the login exists but is unrecorded; cleanup reclaims it at expiry
            error!("audit append failed after creating {}: {}", user.username, e);
            return JobResult::create_failed(
                session_id,
                ErrorInfo::new(CODE_INTERNAL_ERROR, format!("audit write failed: {}", e), true),
            );
        }

        JobResult::create_ready(session_id, user.dsn, user.expires_at, user.username)
    }

    async fn handle_revoke(&self, job_id: &str, correlation_id: Uuid, session_id: &str) -> JobResult {
        if let Err(e) = validate_job_id(job_id).and_then(|_| validate_session_id(session_id)) {
            warn!("revoke job {} rejected: {}", job_id, e);
            return JobResult::revoke_failed(validation_error_info(&e));
        }

        if let Err(e) = self.ensure_initialized().await {
            return JobResult::revoke_failed(provider_error_info(&e));
        }

        let username = match self.audit.find_session_username(session_id).await {
            Ok(Some(username)) => username,
            Ok(None) => {
                debug!("revoke of {} found no session mapping", session_id);
                return JobResult::revoke_not_found();
            }
            Err(e) => {
                return JobResult::revoke_failed(ErrorInfo::new(
                    CODE_REVOCATION_ERROR,
                    format!("session lookup failed: {}", e),
                    true,
                ));
            }
        };

        match self.provider.drop_user(&username).await {
            Ok(true) => {
                let event = NewAuditEvent::new(EVENT_SESSION_REVOKED, correlation_id)
                    .with_session(session_id)
                    .with_username(&username)
                    .with_data(serde_json::json!({ "job_id": job_id }));
                if let Err(e) = self.audit.append(event).await {
                    error!("audit append failed after revoking {}: {}", username, e);
                    return JobResult::revoke_failed(ErrorInfo::new(
                        CODE_REVOCATION_ERROR,
                        format!("audit write failed: {}", e),
                        true,
                    ));
                }
                info!("revoked session {} (login {})", session_id, username);
                JobResult::revoked()
            }
            Ok(false) => JobResult::revoke_not_found(),
            Err(e) => {
                warn!("revoke of {} failed: {}", session_id, e);
                JobResult::revoke_failed(ErrorInfo::new(CODE_REVOCATION_ERROR, e.message, true))
            }
        }
    }

    async fn handle_cleanup(&self, job_id: &str, correlation_id: Uuid, older_than_minutes: u32) -> JobResult {
        if let Err(e) = validate_job_id(job_id) {
            return JobResult::cleanup_failed(validation_error_info(&e));
        }

        if let Err(e) = self.ensure_initialized().await {
            return JobResult::cleanup_failed(provider_error_info(&e));
        }

        let outcomes = match self.provider.cleanup_expired_users(older_than_minutes).await {
            Ok(outcomes) => outcomes,
            Err(e) => {
                warn!("cleanup job {} failed: {}", job_id, e);
                return JobResult::cleanup_failed(provider_error_info(&e));
            }
        };

        let cleaned: Vec<String> = outcomes
            .iter()
            .filter(|o| o.dropped)
            .map(|o| o.username.clone())
            .collect();

        if !cleaned.is_empty() {
            let event = NewAuditEvent::new(EVENT_SESSIONS_CLEANED, correlation_id).with_data(
                serde_json::json!({
                    "job_id": job_id,
                    "cleanedCount": cleaned.len(),
                    "cleanedUsers": cleaned,
                }),
            );
            if let Err(e) = self.audit.append(event).await {
                error!("audit append failed after cleanup: {}", e);
                return JobResult::cleanup_failed(ErrorInfo::new(
                    CODE_INTERNAL_ERROR,
                    format!("audit write failed: {}", e),
                    true,
                ));
            }
        }

        info!(
            "cleanup job {} dropped {} of {} candidates",
            job_id,
            cleaned.len(),
            outcomes.len()
        );
        JobResult::cleanup_completed(cleaned.len() as u64)
    }

    /// Proxy the provider's health, mapped to agent terms and enriched with
    /// the provider tag and version.
    pub async fn health(&self) -> AgentHealth {
        match self.provider.health_check().await {
            Ok(report) => {
                let status = match report.state {
                    HealthState::Healthy => AgentHealthStatus::Ok,
                    HealthState::Degraded => AgentHealthStatus::Degraded,
                    HealthState::Unhealthy => AgentHealthStatus::Down,
                };
                let mut details = report.details;
                if let Some(map) = details.as_object_mut() {
                    map.insert(
                        "provider".to_string(),
                        serde_json::json!({
                            "engine": self.provider.engine().as_str(),
                            "version": self.provider.version(),
                        }),
                    );
                }
                AgentHealth {
                    status,
                    message: report.message,
                    details,
                }
            }
            Err(e) => AgentHealth {
                status: AgentHealthStatus::Down,
                message: e.to_string(),
                details: serde_json::json!({}),
            },
        }
    }

    /// Close the provider once; repeat calls are no-ops.
    pub async fn shutdown(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            debug!("shutdown called twice, ignoring");
            return;
        }
        if let Err(e) = self.provider.close().await {
            warn!("provider close failed: {}", e);
        }
    }
}

fn validation_error_info(err: &ValidationError) -> ErrorInfo {
    ErrorInfo::new(CODE_VALIDATION_ERROR, err.to_string(), false)
}

fn provider_error_info(err: &ProviderError) -> ErrorInfo {
    ErrorInfo::new(err.code.as_str(), err.message.clone(), err.retryable)
}

#[cfg(test)]
mod tests {
    use super::*;
    use gatekeeper_providers::{DatabaseEngine, ProviderErrorCode};

    #[test]
    fn test_validation_error_info_never_retryable() {
        let info = validation_error_info(&ValidationError::new("ttlMinutes", "too large"));
        assert_eq!(info.code, "VALIDATION_ERROR");
        assert!(!info.retryable);
        assert!(info.message.contains("ttlMinutes"));
    }

    #[test]
    fn test_provider_error_info_preserves_code_and_flag() {
        let err = ProviderError::new(
            DatabaseEngine::Postgres,
            ProviderErrorCode::UserCreationFailed,
            "statement timeout",
            true,
        );
        let info = provider_error_info(&err);
        assert_eq!(info.code, "USER_CREATION_FAILED");
        assert!(info.retryable);
    }
}
