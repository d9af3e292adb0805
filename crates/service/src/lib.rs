//! Shared service infrastructure for Swift access and storage nodes.
//!
//! - Configuration (TOML with per-field defaults, node directory entries)
//! - State management (node directory + configuration shared by handlers)
//! - HTTP handlers (create, storage bounce, decode-as-JSON)

pub mod config;
pub mod http;
pub mod state;

#[cfg(test)]
pub(crate) mod test_utils;

// Re-export key types for convenience
pub use config::{Config, ConfigError};
pub use state::{State as ServiceState, StateSetupError};
