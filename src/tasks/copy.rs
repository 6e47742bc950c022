//! `copy`: copy matched files to a destination

use crate::error::{ExecutionError, ExecutionResult};
use crate::runner::{Invocation, InvocationContext};
use crate::tasks::files::{self, FileMapping};
use crate::tasks::{ensure_parent, Capability};
use std::fs;
use std::path::Path;
use tracing::debug;

#[derive(Debug, Clone, Copy, Default)]
pub struct CopyFiles;

impl Capability for CopyFiles {
    fn description(&self) -> &str {
        "Copy files and directories"
    }

    fn invoke(&self, invocation: &Invocation, ctx: &InvocationContext<'_>) -> ExecutionResult<()> {
        let mut copied = 0;
        for mapping in files::resolve_mappings(&invocation.options, ctx.working_dir())? {
            copied += copy_mapping(&mapping)?;
        }

        ctx.context()
            .print_info(&format!("Copied {} file{}", copied, if copied == 1 { "" } else { "s" }));
        Ok(())
    }
}

fn copy_mapping(mapping: &FileMapping) -> ExecutionResult<usize> {
    if mapping.sources.is_empty() {
        return Ok(0);
    }

    let dest = mapping
        .dest
        .as_deref()
        .ok_or_else(|| ExecutionError::MissingOption("dest".to_string()))?;

    // A lone source copied to a path without a trailing slash is a rename
    let rename = mapping.sources.len() == 1
        && !mapping.dest_is_dir
        && (mapping.sources[0].path.is_dir() || !dest.is_dir());

    let mut copied = 0;
    for source in &mapping.sources {
        let target = if rename {
            dest.to_path_buf()
        } else {
            dest.join(&source.relative)
        };
        copied += copy_one(&source.path, &target)?;
    }
    Ok(copied)
}

fn copy_one(source: &Path, target: &Path) -> ExecutionResult<usize> {
    if source.is_dir() {
        fs::create_dir_all(target)?;
        return Ok(0);
    }

    ensure_parent(target)?;
    fs::copy(source, target)?;
    debug!(from = %source.display(), to = %target.display(), "copied");
    Ok(1)
}
