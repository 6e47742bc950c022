//! Declaration validation
//!
//! Structural checks that need no capability registry. Alias cycles are
//! found when the registry expands every alias.

use crate::config::parse::Project;
use crate::config::types::TaskReference;
use crate::error::{ConfigError, ConfigResult};

/// Validate a loaded project
pub fn validate_config(project: &Project) -> ConfigResult<()> {
    for (name, refs) in &project.aliases {
        validate_alias(project, name, refs)?;
    }
    Ok(())
}

/// Validate the references of a single alias
fn validate_alias(project: &Project, name: &str, refs: &[TaskReference]) -> ConfigResult<()> {
    for reference in refs {
        if reference.target.is_some() && project.aliases.contains_key(&reference.task) {
            return Err(ConfigError::InvalidReference(format!(
                "'{}' in alias '{}' qualifies alias '{}' with a target",
                reference, name, reference.task
            )));
        }
    }
    Ok(())
}
