//! CLI interface and argument parsing
//!
//! This module handles command-line parsing, help output and shell
//! completion scripts.

pub mod app;

// Re-export main types
pub use app::*;
