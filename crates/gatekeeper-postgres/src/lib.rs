//! gatekeeper-postgres - PostgreSQL provider for Gatekeeper.
//!
//! This crate implements the [`DatabaseProvider`](gatekeeper_providers::DatabaseProvider)
//! contract against PostgreSQL:
//! - [`PostgresProvider`]: admin pool, create/drop/list/cleanup/health flows
//! - [`bootstrap`]: the schema installed in the target database (role packs,
//!   SECURITY DEFINER helper routines, audit table)
//! - [`PgAuditSink`]: chained, serialised audit appends into the target
//!   database's audit table
//!
//! The provider never issues credential DDL directly; every privileged
//! statement goes through the bootstrap-installed helper routines.

#[macro_use]
mod logging;

pub mod audit;
pub mod bootstrap;
pub mod dsn;
pub mod provider;
pub mod role_packs;

pub use audit::PgAuditSink;
pub use bootstrap::{install, validate_setup, BootstrapError, SetupCheck};
pub use dsn::generate_postgres_dsn;
pub use provider::{PostgresProvider, PostgresProviderSettings, POSTGRES_PROVIDER_VERSION};
pub use role_packs::{available_role_packs, ROLE_PACK_VERSION};
