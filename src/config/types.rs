//! Core declaration types
//!
//! This module defines the data structures that represent a weave.yml file.

use crate::error::{ConfigError, ConfigResult};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};
use std::fmt;
use std::str::FromStr;

/// Top-level declaration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Declaration {
    /// Project name (optional)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Project usage description (optional)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<String>,

    /// Interpreter used by the shell capability (e.g., ["sh", "-c"])
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interpreter: Option<Vec<String>>,

    /// Free-form data namespace available to templates
    #[serde(default, skip_serializing_if = "Mapping::is_empty")]
    pub data: Mapping,

    /// Data keys loaded from JSON or YAML files (e.g., `pkg: package.json`)
    #[serde(
        rename = "data-files",
        default,
        skip_serializing_if = "IndexMap::is_empty"
    )]
    pub data_files: IndexMap<String, String>,

    /// Task configurations and aliases, in declaration order
    #[serde(default)]
    pub tasks: IndexMap<String, TaskDeclaration>,
}

/// A single entry under `tasks`
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum TaskDeclaration {
    /// Ordered list of task references
    Alias(Vec<String>),

    /// Targets keyed by name, plus an optional `options` block
    Targets(Mapping),
}

impl TaskDeclaration {
    /// Whether this declaration is an alias
    pub fn is_alias(&self) -> bool {
        matches!(self, TaskDeclaration::Alias(_))
    }
}

/// Reserved key holding task-wide default options
pub const OPTIONS_KEY: &str = "options";

/// Normalize a target value: sequences and strings are shorthand for `src`
pub fn normalize_target(value: Value) -> Option<Mapping> {
    match value {
        Value::Mapping(map) => Some(map),
        Value::Sequence(_) | Value::String(_) => {
            let mut map = Mapping::new();
            map.insert(Value::String("src".to_string()), value);
            Some(map)
        }
        Value::Null => Some(Mapping::new()),
        _ => None,
    }
}

/// A reference to a task, optionally qualified with a target (`task:target`)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TaskReference {
    /// Task or alias name
    pub task: String,

    /// Target, when qualified
    pub target: Option<String>,
}

impl TaskReference {
    /// Unqualified reference: every target of a task, or an alias
    pub fn bare(task: impl Into<String>) -> Self {
        TaskReference {
            task: task.into(),
            target: None,
        }
    }

    /// Reference to exactly one target
    pub fn qualified(task: impl Into<String>, target: impl Into<String>) -> Self {
        TaskReference {
            task: task.into(),
            target: Some(target.into()),
        }
    }
}

impl FromStr for TaskReference {
    type Err = ConfigError;

    fn from_str(s: &str) -> ConfigResult<Self> {
        let invalid = || ConfigError::InvalidReference(format!("'{}'", s));
        let s = s.trim();

        match s.split_once(':') {
            None if !s.is_empty() => Ok(TaskReference::bare(s)),
            None => Err(invalid()),
            Some((task, target)) => {
                if task.is_empty() || target.is_empty() || target.contains(':') {
                    return Err(invalid());
                }
                Ok(TaskReference::qualified(task, target))
            }
        }
    }
}

impl fmt::Display for TaskReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.target {
            Some(target) => write!(f, "{}:{}", self.task, target),
            None => write!(f, "{}", self.task),
        }
    }
}
