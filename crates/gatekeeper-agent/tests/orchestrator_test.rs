//! End-to-end orchestrator tests against the mock provider.
//!
//! These cover the observable contract: result shapes, audit emission and
//! ordering, validation boundaries, and behaviour under provider failures.

use std::sync::Arc;

use chrono::{Duration, Utc};
use uuid::Uuid;

use gatekeeper_agent::config::load_config_from_str;
use gatekeeper_agent::{AgentHealthStatus, Orchestrator};
use gatekeeper_contracts::{
    AccessRole, CleanupStatus, Job, JobKind, JobResult, MemoryAuditSink, Requester, RevokeStatus,
    SessionStatus, SslMode, Target, EVENT_SESSIONS_CLEANED, EVENT_SESSION_CREATED,
    EVENT_SESSION_REVOKED,
};
use gatekeeper_providers::{
    DatabaseEngine, DatabaseProvider, HealthState, MockProvider, ProviderError, ProviderErrorCode,
    ProviderRegistry,
};

const CORRELATION: &str = "c07a0c9b-7f6d-4b8f-8b0c-1d8b9eb9f4f8";

struct Harness {
    orchestrator: Orchestrator,
    mock: Arc<MockProvider>,
    sink: Arc<MemoryAuditSink>,
}

fn harness_with_max_ttl(max_ttl_minutes: u32) -> Harness {
    let yaml = format!(
        "database:\n  host: db\n  database: app\n  admin_password: pw\nsession:\n  max_ttl_minutes: {}\n",
        max_ttl_minutes
    );
    let config = load_config_from_str(&yaml).unwrap();
    let mock = Arc::new(MockProvider::new(DatabaseEngine::Postgres));
    let sink = Arc::new(MemoryAuditSink::new());
    let provider: Arc<dyn DatabaseProvider> = mock.clone();
    Harness {
        orchestrator: Orchestrator::new(config, provider, sink.clone()),
        mock,
        sink,
    }
}

fn harness() -> Harness {
    harness_with_max_ttl(1440)
}

fn create_job(id: &str, ttl_minutes: u32) -> Job {
    Job {
        id: id.to_string(),
        correlation_id: Uuid::parse_str(CORRELATION).unwrap(),
        kind: JobKind::CreateSession {
            target: Target {
                host: "db".to_string(),
                port: 5432,
                database: "app".to_string(),
                ssl_mode: SslMode::Prefer,
            },
            role: AccessRole::Read,
            ttl_minutes,
            requester: Requester {
                user_id: "u1".to_string(),
                email: None,
            },
            reason: None,
        },
    }
}

fn revoke_job(id: &str, session_id: &str) -> Job {
    Job {
        id: id.to_string(),
        correlation_id: Uuid::parse_str(CORRELATION).unwrap(),
        kind: JobKind::RevokeSession {
            session_id: session_id.to_string(),
        },
    }
}

fn cleanup_job(id: &str, older_than_minutes: u32) -> Job {
    Job {
        id: id.to_string(),
        correlation_id: Uuid::parse_str(CORRELATION).unwrap(),
        kind: JobKind::Cleanup { older_than_minutes },
    }
}

fn unpack_create(result: JobResult) -> (String, SessionStatus, Option<String>, Option<String>) {
    match result {
        JobResult::Create {
            session_id,
            status,
            dsn,
            username,
            ..
        } => (session_id, status, dsn, username),
        other => panic!("expected create result, got {:?}", other),
    }
}

#[tokio::test]
async fn test_create_session_happy_path() {
    let h = harness();
    let received_at = Utc::now();
    let result = h.orchestrator.handle_job(create_job("j1", 15)).await;

    let (session_id, status, dsn, username) = match &result {
        JobResult::Create {
            session_id,
            status,
            dsn,
            username,
            expires_at,
            error,
        } => {
            assert!(error.is_none());
            let expires_at = expires_at.expect("expiry on success");
            let expected = received_at + Duration::minutes(15);
            let skew = (expires_at - expected).num_seconds().abs();
            assert!(skew < 60, "expiry off by {}s", skew);
            (
                session_id.clone(),
                *status,
                dsn.clone().unwrap(),
                username.clone().unwrap(),
            )
        }
        other => panic!("expected create result, got {:?}", other),
    };

    assert_eq!(status, SessionStatus::Ready);
    assert!(session_id.starts_with("ses_"));
    assert!(dsn.starts_with("postgresql://gk_"));

    let suffix = username.strip_prefix("gk_").unwrap();
    assert_eq!(suffix.len(), 12);
    assert!(suffix.chars().all(|c| c.is_ascii_alphanumeric()));

    // one session.created event, chained, carrying the correlation id but
    // never the DSN
    let events = h.sink.events();
    assert_eq!(events.len(), 1);
    let event = &events[0];
    assert_eq!(event.event_type, EVENT_SESSION_CREATED);
    assert_eq!(event.correlation_id.to_string(), CORRELATION);
    assert_eq!(event.session_id.as_deref(), Some(session_id.as_str()));
    assert_eq!(event.username.as_deref(), Some(username.as_str()));
    assert_eq!(event.event_data["role"], "read");
    assert_eq!(event.event_data["ttl_minutes"], 15);
    assert_eq!(event.event_data["requester"], "u1");
    let raw = serde_json::to_string(&event.event_data).unwrap();
    assert!(!raw.contains("postgresql://"));
    assert!(h.sink.verify_chain());
}

#[tokio::test]
async fn test_create_session_ttl_over_limit() {
    let h = harness();
    let result = h.orchestrator.handle_job(create_job("j2", 9999)).await;

    let (_, status, dsn, _) = unpack_create(result);
    assert_eq!(status, SessionStatus::Failed);
    assert!(dsn.is_none());

    // no database mutation, no audit event
    assert_eq!(h.mock.create_count(), 0);
    assert!(h.sink.is_empty());
}

#[tokio::test]
async fn test_create_session_ttl_boundaries() {
    let h = harness_with_max_ttl(60);

    // at the ceiling: accepted
    let result = h.orchestrator.handle_job(create_job("j-at", 60)).await;
    let (_, status, _, _) = unpack_create(result);
    assert_eq!(status, SessionStatus::Ready);

    // one over: validation error
    let result = h.orchestrator.handle_job(create_job("j-over", 61)).await;
    match result {
        JobResult::Create { status, error, .. } => {
            assert_eq!(status, SessionStatus::Failed);
            let error = error.unwrap();
            assert_eq!(error.code, "VALIDATION_ERROR");
            assert!(!error.retryable);
        }
        other => panic!("expected create result, got {:?}", other),
    }

    // zero: validation error
    let result = h.orchestrator.handle_job(create_job("j-zero", 0)).await;
    let (_, status, _, _) = unpack_create(result);
    assert_eq!(status, SessionStatus::Failed);
}

#[tokio::test]
async fn test_revoke_unknown_session() {
    let h = harness();
    let result = h.orchestrator.handle_job(revoke_job("j3", "ses_unknown")).await;
    match result {
        JobResult::Revoke { status, error } => {
            assert_eq!(status, RevokeStatus::NotFound);
            assert!(error.is_none());
        }
        other => panic!("expected revoke result, got {:?}", other),
    }
    assert!(h.sink.is_empty());
}

#[tokio::test]
async fn test_create_then_revoke() {
    let h = harness();
    let result = h.orchestrator.handle_job(create_job("j4", 15)).await;
    let (session_id, status, _, username) = unpack_create(result);
    assert_eq!(status, SessionStatus::Ready);
    let username = username.unwrap();

    let result = h.orchestrator.handle_job(revoke_job("j5", &session_id)).await;
    match result {
        JobResult::Revoke { status, .. } => assert_eq!(status, RevokeStatus::Revoked),
        other => panic!("expected revoke result, got {:?}", other),
    }

    // the login is gone and the revocation is audited
    let listed = h.mock.list_ephemeral_users().await.unwrap();
    assert!(listed.iter().all(|u| u.username != username));

    let events = h.sink.events();
    assert_eq!(events.len(), 2);
    assert_eq!(events[1].event_type, EVENT_SESSION_REVOKED);
    assert_eq!(events[1].username.as_deref(), Some(username.as_str()));
    assert!(h.sink.verify_chain());

    // a second revoke finds nothing
    let result = h.orchestrator.handle_job(revoke_job("j6", &session_id)).await;
    match result {
        JobResult::Revoke { status, .. } => assert_eq!(status, RevokeStatus::NotFound),
        other => panic!("expected revoke result, got {:?}", other),
    }
}

#[tokio::test]
async fn test_cleanup_drops_expired_and_audits() {
    let h = harness();
    // initialize the provider through a throwaway job so seeding works
    h.orchestrator.handle_job(create_job("j-seed", 15)).await;
    h.mock
        .seed_user("gk_stale001", Utc::now() - Duration::minutes(10), 2);

    let result = h.orchestrator.handle_job(cleanup_job("j7", 0)).await;
    match result {
        JobResult::Cleanup {
            status,
            cleaned_count,
            error,
        } => {
            assert_eq!(status, CleanupStatus::Completed);
            assert_eq!(cleaned_count, 1);
            assert!(error.is_none());
        }
        other => panic!("expected cleanup result, got {:?}", other),
    }

    let listed = h.mock.list_ephemeral_users().await.unwrap();
    assert!(listed.iter().all(|u| u.username != "gk_stale001"));

    let event = h.sink.events().into_iter().last().unwrap();
    assert_eq!(event.event_type, EVENT_SESSIONS_CLEANED);
    assert_eq!(event.event_data["cleanedCount"], 1);
    assert_eq!(event.event_data["cleanedUsers"][0], "gk_stale001");
}

#[tokio::test]
async fn test_cleanup_without_candidates_emits_no_event() {
    let h = harness();
    let result = h.orchestrator.handle_job(cleanup_job("j8", 5)).await;
    match result {
        JobResult::Cleanup {
            status,
            cleaned_count,
            ..
        } => {
            assert_eq!(status, CleanupStatus::Completed);
            assert_eq!(cleaned_count, 0);
        }
        other => panic!("expected cleanup result, got {:?}", other),
    }
    assert!(h.sink.is_empty());
}

#[tokio::test]
async fn test_concurrent_creates_both_succeed() {
    let h = harness();
    let (a, b) = tokio::join!(
        h.orchestrator.handle_job(create_job("j-a", 10)),
        h.orchestrator.handle_job(create_job("j-b", 10)),
    );

    let (_, status_a, _, username_a) = unpack_create(a);
    let (_, status_b, _, username_b) = unpack_create(b);
    assert_eq!(status_a, SessionStatus::Ready);
    assert_eq!(status_b, SessionStatus::Ready);
    assert_ne!(username_a, username_b);
    assert_eq!(h.sink.len(), 2);
    assert!(h.sink.verify_chain());
}

#[tokio::test]
async fn test_transient_create_failure_is_retryable() {
    let h = harness();
    h.mock.fail_next_create(ProviderError::creation_failed(
        DatabaseEngine::Postgres,
        "statement timeout",
    ));

    let result = h.orchestrator.handle_job(create_job("j9", 15)).await;
    match result {
        JobResult::Create { status, error, .. } => {
            assert_eq!(status, SessionStatus::Failed);
            let error = error.unwrap();
            assert_eq!(error.code, "USER_CREATION_FAILED");
            assert!(error.retryable);
        }
        other => panic!("expected create result, got {:?}", other),
    }
    // failed creates are not audited
    assert!(h.sink.is_empty());
}

#[tokio::test]
async fn test_name_collision_surfaces_user_exists() {
    let h = harness();
    h.mock.fail_next_create(ProviderError::user_exists(
        DatabaseEngine::Postgres,
        "gk_collision01",
    ));

    let result = h.orchestrator.handle_job(create_job("j10", 15)).await;
    match result {
        JobResult::Create { error, .. } => {
            let error = error.unwrap();
            assert_eq!(error.code, "USER_EXISTS");
            assert!(!error.retryable);
        }
        other => panic!("expected create result, got {:?}", other),
    }
}

#[tokio::test]
async fn test_revoke_provider_failure_maps_to_revocation_error() {
    let h = harness();
    let result = h.orchestrator.handle_job(create_job("j11", 15)).await;
    let (session_id, _, _, _) = unpack_create(result);

    h.mock.fail_next_drop(ProviderError::drop_failed(
        DatabaseEngine::Postgres,
        "connection lost",
    ));
    let result = h.orchestrator.handle_job(revoke_job("j12", &session_id)).await;
    match result {
        JobResult::Revoke { status, error } => {
            assert_eq!(status, RevokeStatus::Failed);
            let error = error.unwrap();
            assert_eq!(error.code, "REVOCATION_ERROR");
            assert!(error.retryable);
        }
        other => panic!("expected revoke result, got {:?}", other),
    }
}

#[tokio::test]
async fn test_handle_json_rejects_malformed_payload() {
    let h = harness();
    let err = h
        .orchestrator
        .handle_json(r#"{"id": "j13", "type": "escalate"}"#)
        .await
        .unwrap_err();
    assert_eq!(err.field, "payload");
}

#[tokio::test]
async fn test_health_mapping_and_enrichment() {
    let h = harness();
    let health = h.orchestrator.health().await;
    assert_eq!(health.status, AgentHealthStatus::Ok);
    assert_eq!(health.details["provider"]["engine"], "postgres");

    h.mock.set_health(HealthState::Degraded);
    let health = h.orchestrator.health().await;
    assert_eq!(health.status, AgentHealthStatus::Degraded);

    h.mock.set_health(HealthState::Unhealthy);
    let health = h.orchestrator.health().await;
    assert_eq!(health.status, AgentHealthStatus::Down);
}

#[tokio::test]
async fn test_shutdown_closes_provider_once() {
    let h = harness();
    h.orchestrator.shutdown().await;
    h.orchestrator.shutdown().await;
    assert_eq!(h.mock.close_count(), 1);
}

#[tokio::test]
async fn test_unregistered_engine_is_provider_not_found() {
    let registry = ProviderRegistry::new();
    registry.register(DatabaseEngine::Postgres, || {
        Arc::new(MockProvider::new(DatabaseEngine::Postgres))
    });

    let err = registry.create(DatabaseEngine::MySql).unwrap_err();
    assert_eq!(err.code, ProviderErrorCode::ProviderNotFound);
    assert!(!err.retryable);
}
