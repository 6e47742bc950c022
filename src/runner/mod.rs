//! Task execution engine
//!
//! This module handles template interpolation, the task registry and the
//! sequential execution of expanded invocations.

pub mod command;
pub mod context;
pub mod engine;
pub mod interpolate;
pub mod registry;

// Re-export main types
pub use command::*;
pub use context::*;
pub use engine::*;
pub use interpolate::*;
pub use registry::*;
