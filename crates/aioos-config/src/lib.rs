//! # aioos-config
//!
//! Configuration system for AIoOS. Reads `aioos.toml`, then applies
//! environment overrides. CLI flags override both.

pub mod loader;
pub mod schema;

pub use loader::ConfigLoader;
pub use schema::AioosConfig;
pub use schema::{
    ConfigWarning, GovernanceConfig, IdentityConfig, LoggingConfig, StorageConfig, SweepConfig,
    WarningSeverity,
};
