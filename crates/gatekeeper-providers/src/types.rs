//! Request and result types exchanged with providers.
//!
//! Passwords always ride in [`Zeroizing<String>`] so they are erased from
//! memory on drop, and every `Debug` implementation redacts them.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::engine::DatabaseEngine;

/// Coordinates of the target database an admin pool connects to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    /// SSL negotiation mode, e.g. "prefer", "require", "disable".
    #[serde(default = "default_ssl_mode")]
    pub ssl_mode: String,
}

fn default_ssl_mode() -> String {
    "prefer".to_string()
}

/// Administrative credentials used for the provider's pool.
///
/// # Security
///
/// The password is zeroized on drop and redacted from `Debug` output.
#[derive(Clone)]
pub struct AdminCredentials {
    pub username: String,
    pub password: Zeroizing<String>,
}

impl AdminCredentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: Zeroizing::new(password.into()),
        }
    }
}

impl std::fmt::Debug for AdminCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminCredentials")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Everything a provider needs to provision one ephemeral login.
///
/// The orchestrator owns name and password generation; the provider receives
/// them as inputs and the engine re-validates the name pattern at the
/// privileged-helper boundary.
pub struct CreateUserRequest {
    /// Generated login name matching `gk_[A-Za-z0-9]+`.
    pub username: String,
    /// Generated password; zeroized on drop.
    pub password: Zeroizing<String>,
    /// Role pack name, e.g. "read".
    pub role_pack: String,
    /// Lifetime of the login, in minutes.
    pub ttl_minutes: u32,
    /// Per-login connection cap.
    pub connection_limit: i32,
}

impl std::fmt::Debug for CreateUserRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CreateUserRequest")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("role_pack", &self.role_pack)
            .field("ttl_minutes", &self.ttl_minutes)
            .field("connection_limit", &self.connection_limit)
            .finish()
    }
}

/// A successfully provisioned login.
#[derive(Debug, Clone)]
pub struct ProvisionedUser {
    pub username: String,
    /// Full connection string with embedded credentials. Never log.
    pub dsn: String,
    pub expires_at: DateTime<Utc>,
    pub connection_limit: i32,
    /// Engine-specific extras, e.g. server version.
    pub metadata: HashMap<String, String>,
}

/// One row of `listEphemeralUsers`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EphemeralUser {
    pub username: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub is_expired: bool,
    pub connection_limit: i32,
    pub active_connections: i64,
}

/// Per-candidate outcome of a cleanup pass.
///
/// Distinguishes dropped, expired-but-drop-failed (with error text), and
/// considered-but-not-expired under the grace period.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanupOutcome {
    pub username: String,
    pub was_expired: bool,
    pub dropped: bool,
    pub error: Option<String>,
}

/// A named, versioned bundle of grants for one engine.
///
/// Never mutated in place; a new version is a new pack.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RolePack {
    pub engine: DatabaseEngine,
    pub name: String,
    pub version: String,
    pub description: String,
    /// Permission statements the pack grants, in install order.
    pub statements: Vec<String>,
}

/// Tri-state provider health.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Admin pool statistics reported in health details.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct PoolStats {
    pub total: u32,
    pub idle: usize,
    pub waiting: usize,
}

/// Health check result with a free-text message and a detail bag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub state: HealthState,
    pub message: String,
    pub checked_at: DateTime<Utc>,
    /// At least per-check status and pool statistics.
    pub details: serde_json::Value,
}

impl HealthReport {
    pub fn new(state: HealthState, message: impl Into<String>, details: serde_json::Value) -> Self {
        Self {
            state,
            message: message.into(),
            checked_at: Utc::now(),
            details,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admin_credentials_debug_redacts_password() {
        let creds = AdminCredentials::new("gatekeeper_admin", "super_secret_pw");
        let debug = format!("{:?}", creds);
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("super_secret_pw"));
    }

    #[test]
    fn test_create_request_debug_redacts_password() {
        let request = CreateUserRequest {
            username: "gk_abc123".to_string(),
            password: Zeroizing::new("p4ssw0rd_p4ssw0rd_p4ssw0rd".to_string()),
            role_pack: "read".to_string(),
            ttl_minutes: 15,
            connection_limit: 2,
        };
        let debug = format!("{:?}", request);
        assert!(debug.contains("gk_abc123"));
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("p4ssw0rd"));
    }

    #[test]
    fn test_connection_config_default_ssl_mode() {
        let config: ConnectionConfig =
            serde_json::from_str(r#"{"host": "db", "port": 5432, "database": "app"}"#).unwrap();
        assert_eq!(config.ssl_mode, "prefer");
    }
}
