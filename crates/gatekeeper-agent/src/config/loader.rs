//! Configuration loader

use std::path::Path;

use super::types::Config;
use crate::error::{AgentError, Result};

/// Load configuration from a YAML file.
///
/// Also resolves `${VAR}` references in credential fields and applies
/// `GATEKEEPER_*` env var overrides after loading.
pub fn load_config(path: &Path) -> Result<Config> {
    let contents = std::fs::read_to_string(path)?;
    load_config_from_str(&contents)
}

/// Load configuration from a YAML string (useful for testing).
///
/// Also resolves `${VAR}` references and applies `GATEKEEPER_*` env var
/// overrides after loading.
pub fn load_config_from_str(yaml: &str) -> Result<Config> {
    let mut config: Config = serde_yaml::from_str(yaml)?;
    resolve_config_env_vars(&mut config);
    apply_env_overrides(&mut config);
    config.validate().map_err(AgentError::Config)?;
    Ok(config)
}

/// Apply GATEKEEPER_* environment variable overrides to a config.
///
/// Any set env var overrides the corresponding config value.
///
/// Supported env vars:
/// - `GATEKEEPER_DB_HOST` - Override database host
/// - `GATEKEEPER_DB_PORT` - Override database port
/// - `GATEKEEPER_DB_NAME` - Override database name
/// - `GATEKEEPER_DB_ADMIN_USER` - Override admin principal
/// - `GATEKEEPER_DB_ADMIN_PASSWORD` - Override admin password
/// - `GATEKEEPER_DB_SSL_MODE` - Override SSL mode
/// - `GATEKEEPER_MAX_TTL_MINUTES` - Override session TTL ceiling
/// - `GATEKEEPER_POOL_MAX_CONNECTIONS` - Override pool size
/// - `GATEKEEPER_LOG_LEVEL` - Override log level
fn apply_env_overrides(config: &mut Config) {
    if let Ok(val) = std::env::var("GATEKEEPER_DB_HOST") {
        debug!("Overriding database host from GATEKEEPER_DB_HOST");
        config.database.host = val;
    }
    if let Ok(val) = std::env::var("GATEKEEPER_DB_PORT") {
        if let Ok(port) = val.parse::<u16>() {
            debug!("Overriding database port from GATEKEEPER_DB_PORT");
            config.database.port = port;
        }
    }
    if let Ok(val) = std::env::var("GATEKEEPER_DB_NAME") {
        debug!("Overriding database name from GATEKEEPER_DB_NAME");
        config.database.database = val;
    }
    if let Ok(val) = std::env::var("GATEKEEPER_DB_ADMIN_USER") {
        debug!("Overriding admin user from GATEKEEPER_DB_ADMIN_USER");
        config.database.admin_user = val;
    }
    if let Ok(val) = std::env::var("GATEKEEPER_DB_ADMIN_PASSWORD") {
        debug!("Overriding admin password from GATEKEEPER_DB_ADMIN_PASSWORD");
        config.database.admin_password = val;
    }
    if let Ok(val) = std::env::var("GATEKEEPER_DB_SSL_MODE") {
        debug!("Overriding ssl mode from GATEKEEPER_DB_SSL_MODE");
        config.database.ssl_mode = val;
    }
    if let Ok(val) = std::env::var("GATEKEEPER_MAX_TTL_MINUTES") {
        if let Ok(minutes) = val.parse::<u32>() {
            debug!("Overriding TTL ceiling from GATEKEEPER_MAX_TTL_MINUTES");
            config.session.max_ttl_minutes = minutes;
        }
    }
    if let Ok(val) = std::env::var("GATEKEEPER_POOL_MAX_CONNECTIONS") {
        if let Ok(max) = val.parse::<u32>() {
            debug!("Overriding pool size from GATEKEEPER_POOL_MAX_CONNECTIONS");
            config.pool.max_connections = max;
        }
    }
    if let Ok(val) = std::env::var("GATEKEEPER_LOG_LEVEL") {
        debug!("Overriding log level from GATEKEEPER_LOG_LEVEL");
        config.logging.level = val;
    }
}

/// Resolve environment variables in a string value.
///
/// Supports two syntaxes:
/// - `${VAR_NAME}` - curly brace syntax
/// - `$VAR_NAME` - simple syntax (for single variable values)
///
/// If the environment variable is not set, the original value is preserved.
fn resolve_env_var(value: &str) -> String {
    if value.starts_with("${") && value.ends_with('}') {
        let var_name = &value[2..value.len() - 1];
        return match std::env::var(var_name) {
            Ok(env_value) => {
                debug!("Resolved env var {} from config", var_name);
                env_value
            }
            Err(_) => {
                debug!("Env var {} not set, keeping original value", var_name);
                value.to_string()
            }
        };
    }

    if value.starts_with('$') && !value.contains(' ') && value.len() > 1 {
        let var_name = &value[1..];
        return match std::env::var(var_name) {
            Ok(env_value) => {
                debug!("Resolved env var {} from config", var_name);
                env_value
            }
            Err(_) => {
                debug!("Env var {} not set, keeping original value", var_name);
                value.to_string()
            }
        };
    }

    value.to_string()
}

/// Resolve environment variables in all config fields that support it.
fn resolve_config_env_vars(config: &mut Config) {
    config.database.host = resolve_env_var(&config.database.host);
    config.database.admin_user = resolve_env_var(&config.database.admin_user);
    config.database.admin_password = resolve_env_var(&config.database.admin_password);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_config_minimal() {
        let yaml = r#"
database:
  host: localhost
  database: app
  admin_password: secret
"#;
        let config = load_config_from_str(yaml).unwrap();
        assert_eq!(config.database.host, "localhost");
        assert_eq!(config.database.port, 5432); // default
        assert_eq!(config.database.admin_user, "gatekeeper_admin"); // default
        assert_eq!(config.database.ssl_mode, "prefer"); // default
        assert_eq!(config.session.max_ttl_minutes, 1440); // default
    }

    #[test]
    fn test_load_config_full() {
        let yaml = r#"
database:
  engine: postgresql
  host: db.example.com
  port: 5433
  database: payments
  admin_user: gatekeeper_admin
  admin_password: supersecret
  ssl_mode: require

pool:
  max_connections: 4
  connect_timeout_secs: 5

session:
  max_ttl_minutes: 240
  connection_limit: 1

logging:
  level: debug
"#;
        let config = load_config_from_str(yaml).unwrap();
        assert_eq!(config.database.port, 5433);
        assert_eq!(config.database.ssl_mode, "require");
        assert_eq!(config.pool.max_connections, 4);
        assert_eq!(config.pool.idle_timeout_secs, 30); // default survives partial section
        assert_eq!(config.session.max_ttl_minutes, 240);
        assert_eq!(config.session.connection_limit, 1);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_load_config_ignores_unknown_keys() {
        let yaml = r#"
database:
  host: localhost
  database: app

metrics:
  enabled: true
"#;
        assert!(load_config_from_str(yaml).is_ok());
    }

    #[test]
    fn test_load_config_rejects_missing_host() {
        let yaml = r#"
database:
  host: ""
  database: app
"#;
        let err = load_config_from_str(yaml).unwrap_err();
        assert!(err.to_string().contains("database.host"));
    }

    #[test]
    fn test_resolve_env_var_curly_brace_syntax() {
        std::env::set_var("TEST_GK_PASSWORD", "env_secret_123");

        let result = resolve_env_var("${TEST_GK_PASSWORD}");
        assert_eq!(result, "env_secret_123");

        std::env::remove_var("TEST_GK_PASSWORD");
    }

    #[test]
    fn test_resolve_env_var_not_set() {
        std::env::remove_var("NONEXISTENT_GK_VAR_12345");

        let result = resolve_env_var("${NONEXISTENT_GK_VAR_12345}");
        assert_eq!(result, "${NONEXISTENT_GK_VAR_12345}");
    }

    #[test]
    fn test_load_config_with_env_vars() {
        std::env::set_var("TEST_GK_ADMIN_PASS", "secret_from_env");

        let yaml = r#"
database:
  host: localhost
  database: app
  admin_password: "${TEST_GK_ADMIN_PASS}"
"#;
        let config = load_config_from_str(yaml).unwrap();
        assert_eq!(config.database.admin_password, "secret_from_env");

        std::env::remove_var("TEST_GK_ADMIN_PASS");
    }
}
