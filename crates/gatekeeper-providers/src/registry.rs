//! Thread-safe registry mapping engine tags to provider factories.
//!
//! Uses DashMap for lock-free concurrent access. Factories are registered
//! once at startup and invoked per construction without locks. Registration
//! is idempotent: the last factory registered for an engine wins.

use std::sync::{Arc, OnceLock};

use dashmap::DashMap;

use crate::engine::DatabaseEngine;
use crate::error::{ProviderError, Result};
use crate::provider::DatabaseProvider;

/// Zero-argument constructor for a provider.
pub type ProviderFactory = Arc<dyn Fn() -> Arc<dyn DatabaseProvider> + Send + Sync>;

/// Registry of provider factories, keyed by engine.
///
/// # Example
///
/// ```
/// use gatekeeper_providers::{DatabaseEngine, MockProvider, ProviderRegistry};
///
/// let registry = ProviderRegistry::new();
/// registry.register(DatabaseEngine::Postgres, || {
///     std::sync::Arc::new(MockProvider::new(DatabaseEngine::Postgres))
/// });
///
/// let provider = registry.create(DatabaseEngine::Postgres).unwrap();
/// assert_eq!(provider.engine(), DatabaseEngine::Postgres);
/// ```
pub struct ProviderRegistry {
    factories: DashMap<DatabaseEngine, ProviderFactory>,
}

impl ProviderRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            factories: DashMap::new(),
        }
    }

    /// The process-wide registry.
    ///
    /// Populated once at startup; `clear` exists so tests can reset it.
    pub fn global() -> &'static ProviderRegistry {
        static GLOBAL: OnceLock<ProviderRegistry> = OnceLock::new();
        GLOBAL.get_or_init(ProviderRegistry::new)
    }

    /// Register a factory for an engine. Last write wins.
    pub fn register<F>(&self, engine: DatabaseEngine, factory: F)
    where
        F: Fn() -> Arc<dyn DatabaseProvider> + Send + Sync + 'static,
    {
        self.factories.insert(engine, Arc::new(factory));
    }

    /// Construct a provider for an engine.
    ///
    /// Returns `PROVIDER_NOT_FOUND` when no factory is registered.
    pub fn create(&self, engine: DatabaseEngine) -> Result<Arc<dyn DatabaseProvider>> {
        match self.factories.get(&engine) {
            Some(factory) => Ok(factory.value()()),
            None => Err(ProviderError::provider_not_found(engine)),
        }
    }

    /// Check whether a factory is registered for an engine.
    pub fn is_supported(&self, engine: DatabaseEngine) -> bool {
        self.factories.contains_key(&engine)
    }

    /// Engines with a registered factory.
    pub fn supported_engines(&self) -> Vec<DatabaseEngine> {
        self.factories.iter().map(|entry| *entry.key()).collect()
    }

    /// Number of registered factories.
    pub fn count(&self) -> usize {
        self.factories.len()
    }

    /// Remove every registered factory. Intended for tests.
    pub fn clear(&self) {
        self.factories.clear();
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderErrorCode;
    use crate::mock::MockProvider;

    #[test]
    fn test_registry_new_is_empty() {
        let registry = ProviderRegistry::new();
        assert_eq!(registry.count(), 0);
        assert!(registry.supported_engines().is_empty());
    }

    #[test]
    fn test_register_and_create() {
        let registry = ProviderRegistry::new();
        registry.register(DatabaseEngine::Postgres, || {
            Arc::new(MockProvider::new(DatabaseEngine::Postgres))
        });

        assert!(registry.is_supported(DatabaseEngine::Postgres));
        assert!(!registry.is_supported(DatabaseEngine::MySql));

        let provider = registry.create(DatabaseEngine::Postgres).unwrap();
        assert_eq!(provider.engine(), DatabaseEngine::Postgres);
    }

    #[test]
    fn test_create_unknown_engine_fails() {
        let registry = ProviderRegistry::new();
        let err = registry.create(DatabaseEngine::SqlServer).unwrap_err();
        assert_eq!(err.code, ProviderErrorCode::ProviderNotFound);
        assert!(!err.retryable);
    }

    #[test]
    fn test_registration_last_write_wins() {
        let registry = ProviderRegistry::new();
        registry.register(DatabaseEngine::Postgres, || {
            Arc::new(MockProvider::new(DatabaseEngine::Postgres))
        });
        registry.register(DatabaseEngine::Postgres, || {
            Arc::new(MockProvider::with_version(DatabaseEngine::Postgres, "2.0.0-test"))
        });
        assert_eq!(registry.count(), 1);
        let provider = registry.create(DatabaseEngine::Postgres).unwrap();
        assert_eq!(provider.version(), "2.0.0-test");
    }

    #[test]
    fn test_clear() {
        let registry = ProviderRegistry::new();
        registry.register(DatabaseEngine::Postgres, || {
            Arc::new(MockProvider::new(DatabaseEngine::Postgres))
        });
        registry.clear();
        assert_eq!(registry.count(), 0);
        assert!(!registry.is_supported(DatabaseEngine::Postgres));
    }
}
