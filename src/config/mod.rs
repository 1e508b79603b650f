//! Configuration loading and layering.
//!
//! Handles `.prlens.toml` loading, environment variable resolution,
//! and CLI flag merging with proper priority ordering.

pub mod loader;

pub use loader::{CacheConfig, Config, ConfigError, ProviderConfig, ReviewConfig};
