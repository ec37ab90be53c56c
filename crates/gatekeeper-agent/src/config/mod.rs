//! Agent configuration: YAML file plus `GATEKEEPER_*` environment overrides.

mod loader;
mod types;

pub use loader::{load_config, load_config_from_str};
pub use types::{Config, DatabaseSettings, LoggingSettings, PoolSettings, SessionSettings};
