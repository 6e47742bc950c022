//! `concat`: join matched files into one output

use crate::error::{ExecutionError, ExecutionResult};
use crate::runner::{Invocation, InvocationContext};
use crate::tasks::{ensure_parent, files, Capability};
use std::fs;
use tracing::debug;

#[derive(Debug, Clone, Copy, Default)]
pub struct Concat;

impl Capability for Concat {
    fn description(&self) -> &str {
        "Concatenate files"
    }

    fn invoke(&self, invocation: &Invocation, ctx: &InvocationContext<'_>) -> ExecutionResult<()> {
        let separator = invocation
            .options
            .get_str("separator")?
            .unwrap_or_else(|| "\n".to_string());

        for mapping in files::resolve_mappings(&invocation.options, ctx.working_dir())? {
            let dest = mapping
                .dest
                .as_deref()
                .ok_or_else(|| ExecutionError::MissingOption("dest".to_string()))?;

            let mut parts = Vec::new();
            for source in mapping.sources.iter().filter(|s| s.path.is_file()) {
                parts.push(fs::read_to_string(&source.path)?);
            }
            if parts.is_empty() {
                debug!(dest = %dest.display(), "no sources, nothing written");
                continue;
            }

            ensure_parent(dest)?;
            fs::write(dest, parts.join(&separator))?;
            ctx.context()
                .print_info(&format!("File {} created from {} source(s)", dest.display(), parts.len()));
        }

        Ok(())
    }
}
