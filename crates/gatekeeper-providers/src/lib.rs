//! gatekeeper-providers - Database provider abstraction for Gatekeeper.
//!
//! This crate defines the capability surface a database engine must satisfy
//! to issue and reclaim ephemeral logins:
//! - The [`DatabaseProvider`] trait with create/drop/list/cleanup/health
//!   operations
//! - The [`ProviderError`] taxonomy with stable machine-readable codes and a
//!   retryability flag
//! - The process-wide [`ProviderRegistry`] mapping engine tags to provider
//!   factories
//!
//! Concrete engines live in their own crates (`gatekeeper-postgres`); this
//! crate additionally ships a [`MockProvider`] for orchestrator tests and
//! stubs for not-yet-implemented engines.

pub mod engine;
pub mod error;
pub mod mock;
pub mod provider;
pub mod registry;
pub mod stub;
pub mod types;

pub use engine::DatabaseEngine;
pub use error::{ProviderError, ProviderErrorCode, Result};
pub use mock::MockProvider;
pub use provider::DatabaseProvider;
pub use registry::{ProviderFactory, ProviderRegistry};
pub use stub::{MySqlProvider, SqlServerProvider};
pub use types::{
    AdminCredentials, CleanupOutcome, ConnectionConfig, CreateUserRequest, EphemeralUser,
    HealthReport, HealthState, PoolStats, ProvisionedUser, RolePack,
};
