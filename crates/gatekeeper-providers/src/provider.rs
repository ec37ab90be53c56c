//! DatabaseProvider trait definition.
//!
//! This module provides the [`DatabaseProvider`] trait which abstracts
//! ephemeral-credential management for one database engine. Implementations
//! execute exclusively through the privileged helper routines installed by
//! their engine's bootstrap; no other statement may create or drop a login.

use std::fmt;

use async_trait::async_trait;

use crate::engine::DatabaseEngine;
use crate::error::Result;
use crate::types::{
    AdminCredentials, CleanupOutcome, ConnectionConfig, CreateUserRequest, EphemeralUser,
    HealthReport, ProvisionedUser, RolePack,
};

/// Capability surface for one database engine.
///
/// The trait is object-safe so `Arc<dyn DatabaseProvider>` can be handed to
/// the orchestrator. All methods take `&self`; implementations keep mutable
/// state (the admin pool) behind interior locks so `initialize` stays
/// idempotent under concurrent first jobs.
///
/// # Thread Safety
///
/// All implementations must be `Send + Sync` to work with Tokio's
/// multi-threaded runtime.
#[async_trait]
pub trait DatabaseProvider: Send + Sync {
    /// Engine this provider serves.
    fn engine(&self) -> DatabaseEngine;

    /// Provider implementation version, for health details and audit data.
    fn version(&self) -> &'static str;

    /// Open the admin connection pool and verify the bootstrap is in place.
    ///
    /// Fails fast with `PROVIDER_INIT_ERROR` on privilege mismatch or an
    /// unreachable database. Calling `initialize` on an already initialized
    /// provider is a no-op.
    async fn initialize(
        &self,
        connection: &ConnectionConfig,
        credentials: &AdminCredentials,
    ) -> Result<()>;

    /// Current provider health with pool statistics and per-check status.
    async fn health_check(&self) -> Result<HealthReport>;

    /// Provision one ephemeral login through the privileged helper.
    ///
    /// The returned DSN carries live credentials and must never be logged.
    async fn create_ephemeral_user(&self, request: &CreateUserRequest) -> Result<ProvisionedUser>;

    /// Remove a login. Idempotent: returns `false` when no such login
    /// exists, and never fails for absence.
    async fn drop_user(&self, username: &str) -> Result<bool>;

    /// Enumerate currently provisioned ephemeral logins.
    async fn list_ephemeral_users(&self) -> Result<Vec<EphemeralUser>>;

    /// Drop every login expired for longer than the grace period.
    ///
    /// Returns one outcome row per candidate considered.
    async fn cleanup_expired_users(&self, older_than_minutes: u32) -> Result<Vec<CleanupOutcome>>;

    /// Role pack catalog for this engine.
    async fn get_available_role_packs(&self) -> Result<Vec<RolePack>>;

    /// Install a role pack. Idempotent at a fixed version; refuses packs
    /// tagged for a different engine.
    async fn install_role_pack(&self, role_pack: &RolePack) -> Result<()>;

    /// Build the engine-specific connection string for a principal.
    fn generate_dsn(&self, connection: &ConnectionConfig, username: &str, password: &str)
        -> String;

    /// Best-effort reachability check for an issued DSN.
    async fn test_connection(&self, dsn: &str) -> Result<bool>;

    /// Release the pool and any background work. Subsequent calls are no-ops.
    async fn close(&self) -> Result<()>;
}

impl fmt::Debug for dyn DatabaseProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseProvider")
            .field("engine", &self.engine())
            .field("version", &self.version())
            .finish()
    }
}
