//! prlens: AI code review for pull requests and merge requests (library crate).
//!
//! Re-exports public modules for integration tests and external use.

pub mod cache;
pub mod config;
pub mod constants;
pub mod diff;
pub mod env;
pub mod models;
pub mod orchestrator;
pub mod popup;
pub mod prompt;
pub mod providers;
pub mod render;
pub mod source;
