//! Taskweave - a declarative, YAML-configured build task orchestrator
//!
//! Tasks and their targets are declared in `weave.yml`. Aliases compose them
//! into ordered pipelines that run strictly in sequence, with template
//! interpolation over project data and a set of built-in file and shell
//! capabilities.

// Public modules
pub mod cli;
pub mod config;
pub mod error;
pub mod runner;
pub mod tasks;

// Re-export commonly used types
pub use error::{Result, WeaveError};

/// Current version of Taskweave
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
