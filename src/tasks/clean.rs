//! `clean`: delete matched files and directories

use crate::error::{ExecutionError, ExecutionResult};
use crate::runner::{Invocation, InvocationContext};
use crate::tasks::{files, Capability};
use std::fs;
use std::io;
use std::path::Path;
use tracing::debug;

/// Deletes everything the target's patterns match
///
/// Patterns come from the usual file formats or from a `paths` list. Paths
/// that resolve outside the working directory (or to the directory itself)
/// are refused.
#[derive(Debug, Clone, Copy, Default)]
pub struct Clean;

impl Capability for Clean {
    fn description(&self) -> &str {
        "Delete files and directories"
    }

    fn invoke(&self, invocation: &Invocation, ctx: &InvocationContext<'_>) -> ExecutionResult<()> {
        let options = match invocation.options.get("paths") {
            Some(paths) => invocation.options.clone().with("src", paths.clone()),
            None => invocation.options.clone(),
        };

        let root = fs::canonicalize(ctx.working_dir())?;
        let targets = files::resolve_sources(&options, ctx.working_dir())?;

        let mut removed = 0;
        for path in targets {
            // An earlier match may have removed a parent directory
            let metadata = match fs::symlink_metadata(&path) {
                Ok(metadata) => metadata,
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };

            ensure_inside(&root, &path)?;

            if metadata.is_dir() {
                fs::remove_dir_all(&path)?;
            } else {
                fs::remove_file(&path)?;
            }
            debug!(path = %path.display(), "removed");
            removed += 1;
        }

        ctx.context()
            .print_info(&format!("Cleaned {} path{}", removed, if removed == 1 { "" } else { "s" }));
        Ok(())
    }
}

fn ensure_inside(root: &Path, path: &Path) -> ExecutionResult<()> {
    let resolved = match fs::canonicalize(path) {
        Ok(resolved) => resolved,
        // Dangling symlink: judge by its parent directory
        Err(_) => match (path.parent(), path.file_name()) {
            (Some(parent), Some(name)) => fs::canonicalize(parent)?.join(name),
            _ => path.to_path_buf(),
        },
    };

    if resolved == root || !resolved.starts_with(root) {
        return Err(ExecutionError::OutsideWorkingDir(path.to_path_buf()));
    }
    Ok(())
}
