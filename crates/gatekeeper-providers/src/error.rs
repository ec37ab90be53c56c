//! Provider error taxonomy.
//!
//! Every failure a provider raises carries a stable machine-readable code, a
//! human message, a retryability flag, and the engine tag. Higher layers make
//! retry decisions from the code and flag alone; engine-specific error text
//! never crosses the provider boundary in structured form.

use thiserror::Error;

use crate::engine::DatabaseEngine;

/// Stable machine-readable provider error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderErrorCode {
    /// Operation attempted before `initialize` succeeded.
    NotInitialized,
    /// A login with the requested name already exists.
    UserExists,
    /// The requested role pack is not a known principal.
    RoleNotFound,
    /// Login creation failed for a transient or unexpected reason.
    UserCreationFailed,
    /// Login removal failed.
    UserDropFailed,
    /// Listing ephemeral logins failed.
    UserListFailed,
    /// Batch cleanup failed.
    CleanupFailed,
    /// Engine tag unknown to the registry.
    ProviderNotFound,
    /// Provider initialization failed.
    ProviderInitError,
    /// Role pack install or lookup failed.
    RolePackError,
    /// Engine has no implementation yet.
    NotImplemented,
    /// Uncategorised internal fault.
    InternalError,
}

impl ProviderErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotInitialized => "NOT_INITIALIZED",
            Self::UserExists => "USER_EXISTS",
            Self::RoleNotFound => "ROLE_NOT_FOUND",
            Self::UserCreationFailed => "USER_CREATION_FAILED",
            Self::UserDropFailed => "USER_DROP_FAILED",
            Self::UserListFailed => "USER_LIST_FAILED",
            Self::CleanupFailed => "CLEANUP_FAILED",
            Self::ProviderNotFound => "PROVIDER_NOT_FOUND",
            Self::ProviderInitError => "PROVIDER_INIT_ERROR",
            Self::RolePackError => "ROLE_PACK_ERROR",
            Self::NotImplemented => "NOT_IMPLEMENTED",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }
}

impl std::fmt::Display for ProviderErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed provider failure.
#[derive(Debug, Clone, Error)]
#[error("[{engine}/{code}] {message}")]
pub struct ProviderError {
    pub code: ProviderErrorCode,
    pub message: String,
    pub retryable: bool,
    pub engine: DatabaseEngine,
}

impl ProviderError {
    pub fn new(
        engine: DatabaseEngine,
        code: ProviderErrorCode,
        message: impl Into<String>,
        retryable: bool,
    ) -> Self {
        Self {
            code,
            message: message.into(),
            retryable,
            engine,
        }
    }

    pub fn not_initialized(engine: DatabaseEngine) -> Self {
        Self::new(
            engine,
            ProviderErrorCode::NotInitialized,
            "provider is not initialized",
            false,
        )
    }

    pub fn user_exists(engine: DatabaseEngine, username: &str) -> Self {
        Self::new(
            engine,
            ProviderErrorCode::UserExists,
            format!("login {} already exists", username),
            false,
        )
    }

    pub fn role_not_found(engine: DatabaseEngine, role_pack: &str) -> Self {
        Self::new(
            engine,
            ProviderErrorCode::RoleNotFound,
            format!("role pack {} is not installed", role_pack),
            false,
        )
    }

    pub fn creation_failed(engine: DatabaseEngine, message: impl Into<String>) -> Self {
        Self::new(engine, ProviderErrorCode::UserCreationFailed, message, true)
    }

    pub fn drop_failed(engine: DatabaseEngine, message: impl Into<String>) -> Self {
        Self::new(engine, ProviderErrorCode::UserDropFailed, message, true)
    }

    pub fn list_failed(engine: DatabaseEngine, message: impl Into<String>) -> Self {
        Self::new(engine, ProviderErrorCode::UserListFailed, message, true)
    }

    pub fn cleanup_failed(engine: DatabaseEngine, message: impl Into<String>) -> Self {
        Self::new(engine, ProviderErrorCode::CleanupFailed, message, true)
    }

    pub fn provider_not_found(engine: DatabaseEngine) -> Self {
        Self::new(
            engine,
            ProviderErrorCode::ProviderNotFound,
            format!("no provider registered for engine {}", engine),
            false,
        )
    }

    pub fn init_error(engine: DatabaseEngine, message: impl Into<String>) -> Self {
        Self::new(engine, ProviderErrorCode::ProviderInitError, message, true)
    }

    pub fn role_pack_error(engine: DatabaseEngine, message: impl Into<String>) -> Self {
        Self::new(engine, ProviderErrorCode::RolePackError, message, false)
    }

    pub fn not_implemented(engine: DatabaseEngine) -> Self {
        Self::new(
            engine,
            ProviderErrorCode::NotImplemented,
            format!("engine {} has no provider implementation", engine),
            false,
        )
    }

    pub fn internal(engine: DatabaseEngine, message: impl Into<String>) -> Self {
        Self::new(engine, ProviderErrorCode::InternalError, message, true)
    }
}

/// Result type alias for provider operations.
pub type Result<T> = std::result::Result<T, ProviderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_stable_strings() {
        assert_eq!(ProviderErrorCode::UserExists.as_str(), "USER_EXISTS");
        assert_eq!(ProviderErrorCode::NotInitialized.as_str(), "NOT_INITIALIZED");
        assert_eq!(ProviderErrorCode::ProviderNotFound.as_str(), "PROVIDER_NOT_FOUND");
    }

    #[test]
    fn test_retryability_per_constructor() {
        assert!(!ProviderError::user_exists(DatabaseEngine::Postgres, "gk_x").retryable);
        assert!(!ProviderError::role_not_found(DatabaseEngine::Postgres, "read").retryable);
        assert!(ProviderError::creation_failed(DatabaseEngine::Postgres, "timeout").retryable);
        assert!(ProviderError::drop_failed(DatabaseEngine::Postgres, "conn lost").retryable);
        assert!(!ProviderError::not_implemented(DatabaseEngine::MySql).retryable);
    }

    #[test]
    fn test_display_includes_engine_and_code() {
        let err = ProviderError::user_exists(DatabaseEngine::Postgres, "gk_abc");
        let text = err.to_string();
        assert!(text.contains("postgres"));
        assert!(text.contains("USER_EXISTS"));
        assert!(text.contains("gk_abc"));
    }
}
