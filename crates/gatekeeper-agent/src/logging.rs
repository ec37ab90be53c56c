//! Logging macros that set target to "gatekeeper_agent" for all log calls.
//!
//! Without an explicit target, tracing uses the full module path
//! (e.g., "gatekeeper_agent::orchestrator"), creating overly verbose logger
//! names for operators filtering by component. These macros pin a single
//! "gatekeeper_agent" target for the crate.

#[allow(unused_macros)]
macro_rules! trace {
    ($($arg:tt)*) => { ::tracing::trace!(target: "gatekeeper_agent", $($arg)*) };
}

macro_rules! debug {
    ($($arg:tt)*) => { ::tracing::debug!(target: "gatekeeper_agent", $($arg)*) };
}

macro_rules! info {
    ($($arg:tt)*) => { ::tracing::info!(target: "gatekeeper_agent", $($arg)*) };
}

macro_rules! warn {
    ($($arg:tt)*) => { ::tracing::warn!(target: "gatekeeper_agent", $($arg)*) };
}

macro_rules! error {
    ($($arg:tt)*) => { ::tracing::error!(target: "gatekeeper_agent", $($arg)*) };
}
