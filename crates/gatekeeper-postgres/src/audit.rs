//! Audit sink backed by the target database's `gatekeeper.audit_log` table.
//!
//! Appends are serialised: a tokio mutex keeps one writer in flight per
//! process, and the insert transaction locks the current tail row so the
//! `prev_hash` chain stays consistent even with multiple agent processes.
//! Audit throughput is bounded by this; acceptable for a credential issuer
//! whose event rate tracks human session requests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPool;
use sqlx::Row;
use tokio::sync::Mutex;

use gatekeeper_contracts::{
    AuditError, AuditEvent, AuditSink, NewAuditEvent, EVENT_SESSION_CREATED,
};

/// Chained audit writer over `gatekeeper.audit_log`.
pub struct PgAuditSink {
    pool: PgPool,
    append_lock: Mutex<()>,
}

impl PgAuditSink {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            append_lock: Mutex::new(()),
        }
    }

    /// Walk the whole log and verify every `prev_hash` link.
    ///
    /// Returns the number of verified events, or the id of the first broken
    /// row as an error.
    pub async fn verify_chain(&self) -> Result<u64, AuditError> {
        let rows = sqlx::query(
            "SELECT id, prev_hash, event_hash FROM gatekeeper.audit_log ORDER BY id ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;

        let mut prev: Option<String> = None;
        let mut verified = 0u64;
        for row in rows {
            let id: i64 = row.try_get("id").map_err(storage)?;
            let prev_hash: Option<String> = row.try_get("prev_hash").map_err(storage)?;
            let event_hash: String = row.try_get("event_hash").map_err(storage)?;
            if prev_hash != prev {
                return Err(AuditError::Storage(format!(
                    "audit chain broken at row {}",
                    id
                )));
            }
            prev = Some(event_hash);
            verified += 1;
        }
        Ok(verified)
    }
}

fn storage(err: sqlx::Error) -> AuditError {
    AuditError::Storage(err.to_string())
}

#[async_trait]
impl AuditSink for PgAuditSink {
    async fn append(&self, event: NewAuditEvent) -> Result<AuditEvent, AuditError> {
        let _guard = self.append_lock.lock().await;

        let mut tx = self.pool.begin().await.map_err(storage)?;

        // Lock the tail so a concurrent writer from another process cannot
        // chain onto the same predecessor.
        let tail: Option<String> = sqlx::query_scalar(
            "SELECT event_hash FROM gatekeeper.audit_log ORDER BY id DESC LIMIT 1 FOR UPDATE",
        )
        .fetch_optional(&mut *tx)
        .await
        .map_err(storage)?;

        let event_hash = event.content_hash();
        let row = sqlx::query(
            r#"
            INSERT INTO gatekeeper.audit_log
                (event_type, session_id, username, correlation_id, event_data, prev_hash, event_hash)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id, created_at
            "#,
        )
        .bind(&event.event_type)
        .bind(&event.session_id)
        .bind(&event.username)
        .bind(event.correlation_id)
        .bind(&event.event_data)
        .bind(&tail)
        .bind(&event_hash)
        .fetch_one(&mut *tx)
        .await
        .map_err(storage)?;

        let id: i64 = row.try_get("id").map_err(storage)?;
        let created_at: DateTime<Utc> = row.try_get("created_at").map_err(storage)?;

        tx.commit().await.map_err(storage)?;

        Ok(AuditEvent {
            id,
            event_type: event.event_type,
            session_id: event.session_id,
            username: event.username,
            correlation_id: event.correlation_id,
            event_data: event.event_data,
            created_at,
            prev_hash: tail,
            event_hash,
        })
    }

    async fn latest_hash(&self) -> Result<Option<String>, AuditError> {
        sqlx::query_scalar("SELECT event_hash FROM gatekeeper.audit_log ORDER BY id DESC LIMIT 1")
            .fetch_optional(&self.pool)
            .await
            .map_err(storage)
    }

    async fn find_session_username(&self, session_id: &str) -> Result<Option<String>, AuditError> {
        let username: Option<Option<String>> = sqlx::query_scalar(
            r#"
            SELECT username FROM gatekeeper.audit_log
            WHERE event_type = $1 AND session_id = $2
            ORDER BY id DESC LIMIT 1
            "#,
        )
        .bind(EVENT_SESSION_CREATED)
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage)?;

        Ok(username.flatten())
    }
}
