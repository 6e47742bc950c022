//! Declaration file parsing and discovery

use crate::config::store::{ConfigTree, TaskConfig};
use crate::config::types::{Declaration, TaskDeclaration, TaskReference};
use crate::error::{ConfigError, ConfigResult, WeaveError};
use indexmap::IndexMap;
use serde_yaml::Value;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Default declaration file names to search for
const CONFIG_FILE_NAMES: &[&str] = &["weave.yml", "weave.yaml"];

/// A loaded declaration: configuration tree and alias table
#[derive(Debug, Clone, Default)]
pub struct Project {
    /// Project name
    pub name: Option<String>,

    /// Project usage description
    pub usage: Option<String>,

    /// Interpreter for shell commands
    pub interpreter: Option<Vec<String>>,

    /// Immutable task configuration and data namespace
    pub tree: ConfigTree,

    /// Aliases in declaration order
    pub aliases: IndexMap<String, Vec<TaskReference>>,

    /// Path of the declaration file, when loaded from disk
    pub path: Option<PathBuf>,
}

impl Project {
    /// Directory containing the declaration file
    pub fn base_dir(&self) -> PathBuf {
        parent_dir(self.path.as_deref())
    }
}

/// Directory of a declaration file, `.` when it has none
fn parent_dir(path: Option<&Path>) -> PathBuf {
    path.and_then(Path::parent)
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Find the declaration file by searching current and parent directories
pub fn find_config_file() -> ConfigResult<PathBuf> {
    find_config_file_from(env::current_dir().map_err(|e| {
        ConfigError::Invalid(format!("Failed to get current directory: {}", e))
    })?)
}

/// Find the declaration file starting from a specific directory
pub fn find_config_file_from(start_dir: PathBuf) -> ConfigResult<PathBuf> {
    let mut current_dir = start_dir;
    let mut searched_paths = Vec::new();

    loop {
        for file_name in CONFIG_FILE_NAMES {
            let config_path = current_dir.join(file_name);
            searched_paths.push(config_path.display().to_string());

            if config_path.is_file() {
                return Ok(config_path);
            }
        }

        match current_dir.parent() {
            Some(parent) => current_dir = parent.to_path_buf(),
            None => return Err(ConfigError::NotFound(searched_paths.join(", "))),
        }
    }
}

/// Parse a declaration file from a path
pub fn parse_config_file(path: &Path) -> Result<Project, WeaveError> {
    let contents = fs::read_to_string(path)
        .map_err(|e| ConfigError::Invalid(format!("Failed to read {}: {}", path.display(), e)))?;

    parse_config(&contents, Some(path))
}

/// Parse a declaration from a string
///
/// Data files are resolved relative to `config_path`; without a path they
/// are resolved relative to the current directory.
pub fn parse_config(yaml: &str, config_path: Option<&Path>) -> Result<Project, WeaveError> {
    let declaration: Declaration = serde_yaml::from_str(yaml)?;
    let base_dir = parent_dir(config_path);

    let mut project = build_project(declaration, &base_dir)?;
    project.path = config_path.map(Path::to_path_buf);
    Ok(project)
}

/// Split declarations into the config tree and alias table
fn build_project(declaration: Declaration, base_dir: &Path) -> Result<Project, WeaveError> {
    let mut data = declaration.data;
    for (key, file) in &declaration.data_files {
        let value = load_data_file(&base_dir.join(file))?;
        data.insert(Value::String(key.clone()), value);
    }

    let mut tree = ConfigTree::new(data);
    let mut aliases = IndexMap::new();

    for (name, task) in declaration.tasks {
        if name.is_empty() || name.contains(':') {
            return Err(ConfigError::Invalid(format!(
                "Task name '{}' must be non-empty and contain no ':'",
                name
            ))
            .into());
        }

        match task {
            TaskDeclaration::Alias(refs) => {
                let refs = refs
                    .iter()
                    .map(|r| r.parse::<TaskReference>())
                    .collect::<ConfigResult<Vec<_>>>()?;
                aliases.insert(name, refs);
            }
            TaskDeclaration::Targets(raw) => {
                let config = TaskConfig::from_mapping(&name, raw)?;
                tree.insert(name, config);
            }
        }
    }

    Ok(Project {
        name: declaration.name,
        usage: declaration.usage,
        interpreter: declaration.interpreter,
        tree,
        aliases,
        path: None,
    })
}

/// Load a JSON or YAML data file into a template value
fn load_data_file(path: &Path) -> ConfigResult<Value> {
    let include_error = |error: String| ConfigError::IncludeFile {
        path: path.to_path_buf(),
        error,
    };

    let contents = fs::read_to_string(path).map_err(|e| include_error(e.to_string()))?;

    let is_json = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if is_json {
        let json: serde_json::Value =
            serde_json::from_str(&contents).map_err(|e| include_error(e.to_string()))?;
        serde_yaml::to_value(json).map_err(|e| include_error(e.to_string()))
    } else {
        serde_yaml::from_str::<Value>(&contents).map_err(|e| include_error(e.to_string()))
    }
}
