//! Configuration types

use serde::Deserialize;

use gatekeeper_providers::{AdminCredentials, ConnectionConfig, DatabaseEngine};

/// Root configuration structure.
///
/// # Example
///
/// ```yaml
/// database:
///   host: "postgres.internal"
///   port: 5432
///   database: "app"
///   admin_user: "gatekeeper_admin"
///   admin_password: "${GATEKEEPER_DB_ADMIN_PASSWORD}"
///   ssl_mode: "require"
///
/// session:
///   max_ttl_minutes: 1440
///
/// logging:
///   level: "info"
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Target database and admin credentials
    pub database: DatabaseSettings,

    /// Admin pool bounds
    #[serde(default)]
    pub pool: PoolSettings,

    /// Session issuance policy
    #[serde(default)]
    pub session: SessionSettings,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingSettings,
}

impl Config {
    /// Validate cross-field constraints after loading.
    pub fn validate(&self) -> Result<(), String> {
        if self.database.host.is_empty() {
            return Err("database.host must not be empty".to_string());
        }
        if self.database.database.is_empty() {
            return Err("database.database must not be empty".to_string());
        }
        if self.database.admin_user.is_empty() {
            return Err("database.admin_user must not be empty".to_string());
        }
        self.database.engine.parse::<DatabaseEngine>().map_err(|e| {
            format!("database.engine: {}", e)
        })?;
        if self.session.max_ttl_minutes == 0 {
            return Err("session.max_ttl_minutes must be at least 1".to_string());
        }
        if self.session.connection_limit < 1 {
            return Err("session.connection_limit must be at least 1".to_string());
        }
        if self.pool.max_connections == 0 {
            return Err("pool.max_connections must be at least 1".to_string());
        }
        Ok(())
    }

    /// Engine the agent dispatches to.
    pub fn engine(&self) -> DatabaseEngine {
        // validated at load time
        self.database
            .engine
            .parse()
            .unwrap_or(DatabaseEngine::Postgres)
    }

    /// Connection record handed to the provider's `initialize`.
    pub fn connection_config(&self) -> ConnectionConfig {
        ConnectionConfig {
            host: self.database.host.clone(),
            port: self.database.port,
            database: self.database.database.clone(),
            ssl_mode: self.database.ssl_mode.clone(),
        }
    }

    /// Admin credentials handed to the provider's `initialize`.
    pub fn admin_credentials(&self) -> AdminCredentials {
        AdminCredentials::new(&self.database.admin_user, &self.database.admin_password)
    }
}

/// Target database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    /// Database engine, e.g. "postgres"
    #[serde(default = "default_engine")]
    pub engine: String,

    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Database name
    pub database: String,

    /// Administrative principal created by the bootstrap
    #[serde(default = "default_admin_user")]
    pub admin_user: String,

    /// Supports `${VAR}` resolution from the environment
    #[serde(default)]
    pub admin_password: String,

    #[serde(default = "default_ssl_mode")]
    pub ssl_mode: String,
}

fn default_engine() -> String {
    "postgres".to_string()
}

fn default_port() -> u16 {
    5432
}

fn default_admin_user() -> String {
    "gatekeeper_admin".to_string()
}

fn default_ssl_mode() -> String {
    "prefer".to_string()
}

/// Admin pool bounds.
#[derive(Debug, Clone, Deserialize)]
pub struct PoolSettings {
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,

    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_statement_timeout_secs")]
    pub statement_timeout_secs: u64,

    #[serde(default = "default_query_timeout_secs")]
    pub query_timeout_secs: u64,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
            idle_timeout_secs: default_idle_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            statement_timeout_secs: default_statement_timeout_secs(),
            query_timeout_secs: default_query_timeout_secs(),
        }
    }
}

fn default_max_connections() -> u32 {
    10
}

fn default_idle_timeout_secs() -> u64 {
    30
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_statement_timeout_secs() -> u64 {
    30
}

fn default_query_timeout_secs() -> u64 {
    25
}

/// Session issuance policy.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionSettings {
    /// Hard ceiling on requested TTLs
    #[serde(default = "default_max_ttl_minutes")]
    pub max_ttl_minutes: u32,

    /// Per-login connection cap passed to the provider
    #[serde(default = "default_connection_limit")]
    pub connection_limit: i32,

    /// Role pack version tag the agent expects installed
    #[serde(default = "default_role_pack_version")]
    pub role_pack_version: String,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            max_ttl_minutes: default_max_ttl_minutes(),
            connection_limit: default_connection_limit(),
            role_pack_version: default_role_pack_version(),
        }
    }
}

fn default_max_ttl_minutes() -> u32 {
    1440
}

fn default_connection_limit() -> i32 {
    2
}

fn default_role_pack_version() -> String {
    "pg-1.0.0".to_string()
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSettings {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}
