//! Tamper-evident audit event envelope and sink trait.
//!
//! Every event carries a sha256 content hash over `{event_type, event_data}`
//! and chains to the previous event's hash, so any rewrite of history breaks
//! the chain from that row forward. Events are written after the effect they
//! describe has committed; they are never updated or deleted.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use uuid::Uuid;

/// Written once by the bootstrap installer.
pub const EVENT_SETUP_COMPLETED: &str = "setup.completed";
/// One per successfully provisioned session.
pub const EVENT_SESSION_CREATED: &str = "session.created";
/// One per successfully revoked session.
pub const EVENT_SESSION_REVOKED: &str = "session.revoked";
/// One per cleanup run that dropped at least one login.
pub const EVENT_SESSIONS_CLEANED: &str = "sessions.cleaned";

/// Audit storage failure.
#[derive(Debug, Error)]
pub enum AuditError {
    #[error("audit storage error: {0}")]
    Storage(String),
}

/// An event the orchestrator wants appended; the sink assigns the chain
/// position, timestamp, and hashes.
#[derive(Debug, Clone)]
pub struct NewAuditEvent {
    pub event_type: String,
    pub session_id: Option<String>,
    pub username: Option<String>,
    pub correlation_id: Uuid,
    /// Free-form payload. Must never contain credentials.
    pub event_data: serde_json::Value,
}

impl NewAuditEvent {
    pub fn new(event_type: impl Into<String>, correlation_id: Uuid) -> Self {
        Self {
            event_type: event_type.into(),
            session_id: None,
            username: None,
            correlation_id,
            event_data: serde_json::Value::Object(serde_json::Map::new()),
        }
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn with_data(mut self, event_data: serde_json::Value) -> Self {
        self.event_data = event_data;
        self
    }

    /// Content hash over `{event_type, event_data}`, hex-encoded.
    ///
    /// serde_json's default map keeps keys sorted, so the serialization is
    /// canonical without extra work.
    pub fn content_hash(&self) -> String {
        let content = serde_json::json!({
            "event_type": self.event_type,
            "event_data": self.event_data,
        });
        let bytes = serde_json::to_vec(&content).unwrap_or_default();
        hex::encode(Sha256::digest(&bytes))
    }
}

/// A committed audit record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Monotonic position in the log.
    pub id: i64,
    pub event_type: String,
    pub session_id: Option<String>,
    pub username: Option<String>,
    pub correlation_id: Uuid,
    pub event_data: serde_json::Value,
    pub created_at: DateTime<Utc>,
    /// Hash of the previous row; None only for the first row.
    pub prev_hash: Option<String>,
    pub event_hash: String,
}

/// Append-only audit storage.
///
/// Implementations must serialise appends so the `prev_hash` chain stays
/// consistent under concurrent writers.
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Append one event, assigning its chain position.
    async fn append(&self, event: NewAuditEvent) -> Result<AuditEvent, AuditError>;

    /// Hash of the newest event, if any.
    async fn latest_hash(&self) -> Result<Option<String>, AuditError>;

    /// Resolve a session id to the username recorded at creation time.
    ///
    /// Returns None when no `session.created` event mentions the session.
    async fn find_session_username(&self, session_id: &str) -> Result<Option<String>, AuditError>;
}

/// In-memory audit sink for tests and local runs.
///
/// Keeps the full chain in a Vec behind a lock; append order is the chain
/// order.
#[derive(Default)]
pub struct MemoryAuditSink {
    events: RwLock<Vec<AuditEvent>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all recorded events, oldest first.
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.read().clone()
    }

    /// Number of recorded events.
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    /// Walk the chain and verify every link.
    pub fn verify_chain(&self) -> bool {
        let events = self.events.read();
        let mut prev: Option<&str> = None;
        for event in events.iter() {
            if event.prev_hash.as_deref() != prev {
                return false;
            }
            prev = Some(event.event_hash.as_str());
        }
        true
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn append(&self, event: NewAuditEvent) -> Result<AuditEvent, AuditError> {
        let event_hash = event.content_hash();
        let mut events = self.events.write();
        let prev_hash = events.last().map(|e| e.event_hash.clone());
        let committed = AuditEvent {
            id: events.len() as i64 + 1,
            event_type: event.event_type,
            session_id: event.session_id,
            username: event.username,
            correlation_id: event.correlation_id,
            event_data: event.event_data,
            created_at: Utc::now(),
            prev_hash,
            event_hash,
        };
        events.push(committed.clone());
        Ok(committed)
    }

    async fn latest_hash(&self) -> Result<Option<String>, AuditError> {
        Ok(self.events.read().last().map(|e| e.event_hash.clone()))
    }

    async fn find_session_username(&self, session_id: &str) -> Result<Option<String>, AuditError> {
        Ok(self
            .events
            .read()
            .iter()
            .rev()
            .find(|e| {
                e.event_type == EVENT_SESSION_CREATED
                    && e.session_id.as_deref() == Some(session_id)
            })
            .and_then(|e| e.username.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn correlation() -> Uuid {
        Uuid::parse_str("c07a0c9b-7f6d-4b8f-8b0c-1d8b9eb9f4f8").unwrap()
    }

    #[test]
    fn test_content_hash_is_deterministic() {
        let a = NewAuditEvent::new(EVENT_SESSION_CREATED, correlation())
            .with_data(serde_json::json!({"role": "read", "ttl_minutes": 15}));
        let b = NewAuditEvent::new(EVENT_SESSION_CREATED, correlation())
            .with_data(serde_json::json!({"ttl_minutes": 15, "role": "read"}));
        // key order in the payload must not change the hash
        assert_eq!(a.content_hash(), b.content_hash());
    }

    #[test]
    fn test_content_hash_depends_on_type_and_data() {
        let base = NewAuditEvent::new(EVENT_SESSION_CREATED, correlation());
        let other_type = NewAuditEvent::new(EVENT_SESSION_REVOKED, correlation());
        let other_data = NewAuditEvent::new(EVENT_SESSION_CREATED, correlation())
            .with_data(serde_json::json!({"k": 1}));
        assert_ne!(base.content_hash(), other_type.content_hash());
        assert_ne!(base.content_hash(), other_data.content_hash());
    }

    #[tokio::test]
    async fn test_memory_sink_chains_events() {
        let sink = MemoryAuditSink::new();
        let first = sink
            .append(NewAuditEvent::new(EVENT_SETUP_COMPLETED, correlation()))
            .await
            .unwrap();
        assert!(first.prev_hash.is_none());

        let second = sink
            .append(
                NewAuditEvent::new(EVENT_SESSION_CREATED, correlation())
                    .with_session("ses_abcd1234efgh")
                    .with_username("gk_abcd1234efgh"),
            )
            .await
            .unwrap();
        assert_eq!(second.prev_hash.as_deref(), Some(first.event_hash.as_str()));
        assert!(sink.verify_chain());
        assert_eq!(
            sink.latest_hash().await.unwrap().as_deref(),
            Some(second.event_hash.as_str())
        );
    }

    #[tokio::test]
    async fn test_find_session_username() {
        let sink = MemoryAuditSink::new();
        sink.append(
            NewAuditEvent::new(EVENT_SESSION_CREATED, correlation())
                .with_session("ses_abcd1234efgh")
                .with_username("gk_abcd1234efgh"),
        )
        .await
        .unwrap();

        let found = sink.find_session_username("ses_abcd1234efgh").await.unwrap();
        assert_eq!(found.as_deref(), Some("gk_abcd1234efgh"));
        assert!(sink
            .find_session_username("ses_unknown0000")
            .await
            .unwrap()
            .is_none());
    }
}
