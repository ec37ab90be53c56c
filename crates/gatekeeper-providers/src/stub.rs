//! Stub providers for engines without an implementation.
//!
//! The stubs keep the registry catalog and error taxonomy stable while
//! engine implementations land: constructing one succeeds, but `initialize`
//! raises `NOT_IMPLEMENTED`, and every other operation reports
//! `NOT_INITIALIZED`.

use async_trait::async_trait;

use crate::engine::DatabaseEngine;
use crate::error::{ProviderError, Result};
use crate::provider::DatabaseProvider;
use crate::types::{
    AdminCredentials, CleanupOutcome, ConnectionConfig, CreateUserRequest, EphemeralUser,
    HealthReport, HealthState, ProvisionedUser, RolePack,
};

macro_rules! stub_provider {
    ($name:ident, $engine:expr, $doc:literal) => {
        #[doc = $doc]
        #[derive(Default)]
        pub struct $name;

        impl $name {
            pub fn new() -> Self {
                Self
            }
        }

        #[async_trait]
        impl DatabaseProvider for $name {
            fn engine(&self) -> DatabaseEngine {
                $engine
            }

            fn version(&self) -> &'static str {
                "stub-0.0.0"
            }

            async fn initialize(
                &self,
                _connection: &ConnectionConfig,
                _credentials: &AdminCredentials,
            ) -> Result<()> {
                Err(ProviderError::not_implemented($engine))
            }

            async fn health_check(&self) -> Result<HealthReport> {
                Ok(HealthReport::new(
                    HealthState::Unhealthy,
                    "engine not implemented",
                    serde_json::json!({}),
                ))
            }

            async fn create_ephemeral_user(
                &self,
                _request: &CreateUserRequest,
            ) -> Result<ProvisionedUser> {
                Err(ProviderError::not_initialized($engine))
            }

            async fn drop_user(&self, _username: &str) -> Result<bool> {
                Err(ProviderError::not_initialized($engine))
            }

            async fn list_ephemeral_users(&self) -> Result<Vec<EphemeralUser>> {
                Err(ProviderError::not_initialized($engine))
            }

            async fn cleanup_expired_users(
                &self,
                _older_than_minutes: u32,
            ) -> Result<Vec<CleanupOutcome>> {
                Err(ProviderError::not_initialized($engine))
            }

            async fn get_available_role_packs(&self) -> Result<Vec<RolePack>> {
                Ok(vec![])
            }

            async fn install_role_pack(&self, _role_pack: &RolePack) -> Result<()> {
                Err(ProviderError::not_implemented($engine))
            }

            fn generate_dsn(
                &self,
                _connection: &ConnectionConfig,
                _username: &str,
                _password: &str,
            ) -> String {
                String::new()
            }

            async fn test_connection(&self, _dsn: &str) -> Result<bool> {
                Ok(false)
            }

            async fn close(&self) -> Result<()> {
                Ok(())
            }
        }
    };
}

stub_provider!(
    MySqlProvider,
    DatabaseEngine::MySql,
    "MySQL provider stub; `initialize` raises NOT_IMPLEMENTED."
);
stub_provider!(
    SqlServerProvider,
    DatabaseEngine::SqlServer,
    "SQL Server provider stub; `initialize` raises NOT_IMPLEMENTED."
);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderErrorCode;

    #[tokio::test]
    async fn test_stub_initialize_not_implemented() {
        let stub = MySqlProvider::new();
        let connection = ConnectionConfig {
            host: "db".to_string(),
            port: 3306,
            database: "app".to_string(),
            ssl_mode: "prefer".to_string(),
        };
        let err = stub
            .initialize(&connection, &AdminCredentials::new("admin", "pw"))
            .await
            .unwrap_err();
        assert_eq!(err.code, ProviderErrorCode::NotImplemented);
        assert!(!err.retryable);
        assert_eq!(err.engine, DatabaseEngine::MySql);
    }

    #[tokio::test]
    async fn test_stub_operations_report_not_initialized() {
        let stub = SqlServerProvider::new();
        let err = stub.drop_user("gk_any").await.unwrap_err();
        assert_eq!(err.code, ProviderErrorCode::NotInitialized);
    }
}
