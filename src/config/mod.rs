//! Declaration parsing, validation and the Config Store
//!
//! This module handles parsing of weave.yml declaration files into an
//! immutable configuration tree and an alias table.

pub mod parse;
pub mod schema;
pub mod store;
pub mod types;

// Re-export main types
pub use parse::*;
pub use schema::*;
pub use store::*;
pub use types::*;
