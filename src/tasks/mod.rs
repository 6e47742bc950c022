//! Built-in capabilities
//!
//! Each capability receives a resolved invocation and either succeeds or
//! returns a typed failure. Capabilities must treat an empty source set as a
//! successful no-op and only write to their declared outputs.

pub mod banner;
pub mod clean;
pub mod concat;
pub mod copy;
pub mod files;
pub mod replace;
pub mod shell;
pub mod watch;

use crate::error::ExecutionResult;
use crate::runner::{Invocation, InvocationContext, TaskRegistry};

pub use banner::Banner;
pub use clean::Clean;
pub use concat::Concat;
pub use copy::CopyFiles;
pub use replace::Replace;
pub use shell::Shell;
pub use watch::{CoalescePolicy, Watch};

/// A unit of work the engine can invoke for a target
pub trait Capability: Send + Sync {
    /// One-line description shown by `list`
    fn description(&self) -> &str;

    /// Run one invocation to completion
    fn invoke(&self, invocation: &Invocation, ctx: &InvocationContext<'_>) -> ExecutionResult<()>;
}

/// Register every built-in capability under its conventional name
pub fn register_builtins(registry: &mut TaskRegistry) {
    registry.register("clean", Clean);
    registry.register("copy", CopyFiles);
    registry.register("shell", Shell);
    registry.register("concat", Concat);
    registry.register("banner", Banner);
    registry.register("replace", Replace);
    registry.register("watch", Watch);
}

/// Create the parent directory of an output path
pub(crate) fn ensure_parent(path: &std::path::Path) -> ExecutionResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}
