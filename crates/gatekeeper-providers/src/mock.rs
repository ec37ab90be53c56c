//! Mock database provider for testing.
//!
//! Useful for testing the registry and the orchestrator without a live
//! database. Provisioned logins live in an in-memory map; health and failure
//! behaviour are scriptable.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;

use crate::engine::DatabaseEngine;
use crate::error::{ProviderError, Result};
use crate::provider::DatabaseProvider;
use crate::types::{
    AdminCredentials, CleanupOutcome, ConnectionConfig, CreateUserRequest, EphemeralUser,
    HealthReport, HealthState, ProvisionedUser, RolePack,
};

struct MockUser {
    expires_at: DateTime<Utc>,
    connection_limit: i32,
}

/// Scriptable in-memory provider.
pub struct MockProvider {
    engine: DatabaseEngine,
    version: &'static str,
    initialized: AtomicBool,
    closed: AtomicBool,
    connection: RwLock<Option<ConnectionConfig>>,
    users: RwLock<HashMap<String, MockUser>>,
    health: RwLock<HealthState>,
    next_create_error: RwLock<Option<ProviderError>>,
    next_drop_error: RwLock<Option<ProviderError>>,
    create_count: AtomicU64,
    drop_count: AtomicU64,
    cleanup_count: AtomicU64,
    close_count: AtomicU64,
}

impl MockProvider {
    pub fn new(engine: DatabaseEngine) -> Self {
        Self::with_version(engine, "mock-0.1.0")
    }

    pub fn with_version(engine: DatabaseEngine, version: &'static str) -> Self {
        Self {
            engine,
            version,
            initialized: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            connection: RwLock::new(None),
            users: RwLock::new(HashMap::new()),
            health: RwLock::new(HealthState::Healthy),
            next_create_error: RwLock::new(None),
            next_drop_error: RwLock::new(None),
            create_count: AtomicU64::new(0),
            drop_count: AtomicU64::new(0),
            cleanup_count: AtomicU64::new(0),
            close_count: AtomicU64::new(0),
        }
    }

    /// Set the health state the next health check reports.
    pub fn set_health(&self, state: HealthState) {
        *self.health.write() = state;
    }

    /// Make the next create call fail with the given error.
    pub fn fail_next_create(&self, error: ProviderError) {
        *self.next_create_error.write() = Some(error);
    }

    /// Make the next drop call fail with the given error.
    pub fn fail_next_drop(&self, error: ProviderError) {
        *self.next_drop_error.write() = Some(error);
    }

    /// Insert a login directly, bypassing the create flow. For tests that
    /// need a pre-existing or already-expired principal.
    pub fn seed_user(&self, username: &str, expires_at: DateTime<Utc>, connection_limit: i32) {
        self.users.write().insert(
            username.to_string(),
            MockUser {
                expires_at,
                connection_limit,
            },
        );
    }

    pub fn create_count(&self) -> u64 {
        self.create_count.load(Ordering::SeqCst)
    }

    pub fn drop_count(&self) -> u64 {
        self.drop_count.load(Ordering::SeqCst)
    }

    pub fn cleanup_count(&self) -> u64 {
        self.cleanup_count.load(Ordering::SeqCst)
    }

    pub fn close_count(&self) -> u64 {
        self.close_count.load(Ordering::SeqCst)
    }

    fn ensure_initialized(&self) -> Result<()> {
        if !self.initialized.load(Ordering::SeqCst) || self.closed.load(Ordering::SeqCst) {
            return Err(ProviderError::not_initialized(self.engine));
        }
        Ok(())
    }
}

#[async_trait]
impl DatabaseProvider for MockProvider {
    fn engine(&self) -> DatabaseEngine {
        self.engine
    }

    fn version(&self) -> &'static str {
        self.version
    }

    async fn initialize(
        &self,
        connection: &ConnectionConfig,
        _credentials: &AdminCredentials,
    ) -> Result<()> {
        *self.connection.write() = Some(connection.clone());
        self.initialized.store(true, Ordering::SeqCst);
        self.closed.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn health_check(&self) -> Result<HealthReport> {
        let state = *self.health.read();
        Ok(HealthReport::new(
            state,
            "mock provider",
            serde_json::json!({
                "pool": {"total": 1, "idle": 1, "waiting": 0},
                "checks": {"mock": "ok"},
            }),
        ))
    }

    async fn create_ephemeral_user(&self, request: &CreateUserRequest) -> Result<ProvisionedUser> {
        self.ensure_initialized()?;
        self.create_count.fetch_add(1, Ordering::SeqCst);

        if let Some(error) = self.next_create_error.write().take() {
            return Err(error);
        }

        let mut users = self.users.write();
        if users.contains_key(&request.username) {
            return Err(ProviderError::user_exists(self.engine, &request.username));
        }

        let expires_at = Utc::now() + Duration::minutes(i64::from(request.ttl_minutes));
        users.insert(
            request.username.clone(),
            MockUser {
                expires_at,
                connection_limit: request.connection_limit,
            },
        );

        let connection = self.connection.read().clone().expect("initialized above");
        let dsn = self.generate_dsn(&connection, &request.username, &request.password);

        Ok(ProvisionedUser {
            username: request.username.clone(),
            dsn,
            expires_at,
            connection_limit: request.connection_limit,
            metadata: HashMap::from([("server_version".to_string(), "mock".to_string())]),
        })
    }

    async fn drop_user(&self, username: &str) -> Result<bool> {
        self.ensure_initialized()?;
        self.drop_count.fetch_add(1, Ordering::SeqCst);

        if let Some(error) = self.next_drop_error.write().take() {
            return Err(error);
        }

        Ok(self.users.write().remove(username).is_some())
    }

    async fn list_ephemeral_users(&self) -> Result<Vec<EphemeralUser>> {
        self.ensure_initialized()?;
        let now = Utc::now();
        Ok(self
            .users
            .read()
            .iter()
            .map(|(username, user)| EphemeralUser {
                username: username.clone(),
                expires_at: Some(user.expires_at),
                is_expired: user.expires_at <= now,
                connection_limit: user.connection_limit,
                active_connections: 0,
            })
            .collect())
    }

    async fn cleanup_expired_users(&self, older_than_minutes: u32) -> Result<Vec<CleanupOutcome>> {
        self.ensure_initialized()?;
        self.cleanup_count.fetch_add(1, Ordering::SeqCst);

        let now = Utc::now();
        let cutoff = now - Duration::minutes(i64::from(older_than_minutes));
        let mut users = self.users.write();

        let expired: Vec<String> = users
            .iter()
            .filter(|(_, user)| user.expires_at <= now)
            .map(|(username, _)| username.clone())
            .collect();

        let mut outcomes = Vec::with_capacity(expired.len());
        for username in expired {
            let beyond_grace = users
                .get(&username)
                .map(|user| user.expires_at <= cutoff)
                .unwrap_or(false);
            if beyond_grace {
                users.remove(&username);
                outcomes.push(CleanupOutcome {
                    username,
                    was_expired: true,
                    dropped: true,
                    error: None,
                });
            } else {
                outcomes.push(CleanupOutcome {
                    username,
                    was_expired: false,
                    dropped: false,
                    error: None,
                });
            }
        }
        Ok(outcomes)
    }

    async fn get_available_role_packs(&self) -> Result<Vec<RolePack>> {
        Ok(vec![RolePack {
            engine: self.engine,
            name: "read".to_string(),
            version: "mock-1.0.0".to_string(),
            description: "mock read pack".to_string(),
            statements: vec![],
        }])
    }

    async fn install_role_pack(&self, role_pack: &RolePack) -> Result<()> {
        if role_pack.engine != self.engine {
            return Err(ProviderError::role_pack_error(
                self.engine,
                format!("pack {} targets engine {}", role_pack.name, role_pack.engine),
            ));
        }
        Ok(())
    }

    fn generate_dsn(
        &self,
        connection: &ConnectionConfig,
        username: &str,
        password: &str,
    ) -> String {
        format!(
            "postgresql://{}:{}@{}:{}/{}?sslmode={}",
            username,
            password,
            connection.host,
            connection.port,
            connection.database,
            connection.ssl_mode
        )
    }

    async fn test_connection(&self, dsn: &str) -> Result<bool> {
        Ok(!dsn.is_empty())
    }

    async fn close(&self) -> Result<()> {
        self.close_count.fetch_add(1, Ordering::SeqCst);
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderErrorCode;
    use zeroize::Zeroizing;

    fn connection() -> ConnectionConfig {
        ConnectionConfig {
            host: "db".to_string(),
            port: 5432,
            database: "app".to_string(),
            ssl_mode: "prefer".to_string(),
        }
    }

    fn request(username: &str) -> CreateUserRequest {
        CreateUserRequest {
            username: username.to_string(),
            password: Zeroizing::new("pw".repeat(12)),
            role_pack: "read".to_string(),
            ttl_minutes: 15,
            connection_limit: 2,
        }
    }

    async fn initialized_mock() -> MockProvider {
        let mock = MockProvider::new(DatabaseEngine::Postgres);
        mock.initialize(&connection(), &AdminCredentials::new("admin", "pw"))
            .await
            .unwrap();
        mock
    }

    #[tokio::test]
    async fn test_requires_initialize() {
        let mock = MockProvider::new(DatabaseEngine::Postgres);
        let err = mock.drop_user("gk_none").await.unwrap_err();
        assert_eq!(err.code, ProviderErrorCode::NotInitialized);
    }

    #[tokio::test]
    async fn test_create_then_drop_then_list() {
        let mock = initialized_mock().await;
        let user = mock.create_ephemeral_user(&request("gk_abc123")).await.unwrap();
        assert!(user.dsn.starts_with("postgresql://gk_abc123:"));

        assert!(mock.drop_user("gk_abc123").await.unwrap());
        assert!(!mock.drop_user("gk_abc123").await.unwrap()); // second drop: absent
        assert!(mock.list_ephemeral_users().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_create_is_user_exists() {
        let mock = initialized_mock().await;
        mock.create_ephemeral_user(&request("gk_dup")).await.unwrap();
        let err = mock.create_ephemeral_user(&request("gk_dup")).await.unwrap_err();
        assert_eq!(err.code, ProviderErrorCode::UserExists);
        assert!(!err.retryable);
    }

    #[tokio::test]
    async fn test_cleanup_respects_grace() {
        let mock = initialized_mock().await;
        mock.seed_user("gk_old", Utc::now() - Duration::minutes(10), 2);
        mock.seed_user("gk_fresh", Utc::now() - Duration::minutes(1), 2);

        let outcomes = mock.cleanup_expired_users(5).await.unwrap();
        assert_eq!(outcomes.len(), 2);
        let old = outcomes.iter().find(|o| o.username == "gk_old").unwrap();
        assert!(old.dropped && old.was_expired);
        let fresh = outcomes.iter().find(|o| o.username == "gk_fresh").unwrap();
        assert!(!fresh.dropped && !fresh.was_expired);
    }

    #[tokio::test]
    async fn test_install_role_pack_refuses_foreign_engine() {
        let mock = initialized_mock().await;
        let pack = RolePack {
            engine: DatabaseEngine::MySql,
            name: "read".to_string(),
            version: "my-1.0.0".to_string(),
            description: String::new(),
            statements: vec![],
        };
        let err = mock.install_role_pack(&pack).await.unwrap_err();
        assert_eq!(err.code, ProviderErrorCode::RolePackError);
    }
}
