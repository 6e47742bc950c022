//! Config Store
//!
//! Immutable tree of task configurations plus the template data namespace.
//! Built once at startup; every run reads from it by reference.

use crate::config::types::{normalize_target, OPTIONS_KEY};
use crate::error::{ConfigError, ConfigResult, ExecutionError, ExecutionResult};
use indexmap::IndexMap;
use serde_yaml::{Mapping, Value};

/// Task name to task configuration, plus the data namespace
#[derive(Debug, Clone, Default)]
pub struct ConfigTree {
    tasks: IndexMap<String, TaskConfig>,
    data: Value,
}

impl ConfigTree {
    /// Create an empty tree with the given data namespace
    pub fn new(data: Mapping) -> Self {
        ConfigTree {
            tasks: IndexMap::new(),
            data: Value::Mapping(data),
        }
    }

    /// Add a task configuration; a later insert for the same name replaces it
    pub fn insert(&mut self, name: impl Into<String>, config: TaskConfig) {
        self.tasks.insert(name.into(), config);
    }

    /// Configuration of a task
    pub fn get(&self, task: &str) -> ConfigResult<&TaskConfig> {
        self.tasks
            .get(task)
            .ok_or_else(|| ConfigError::TaskNotFound(task.to_string()))
    }

    /// Whether a task has any configuration
    pub fn contains(&self, task: &str) -> bool {
        self.tasks.contains_key(task)
    }

    /// Resolved options of one target
    ///
    /// Layers, lowest first: task-wide `options`, the target's own `options`
    /// block, the target's remaining keys. Each layer replaces whole values.
    pub fn get_target(&self, task: &str, target: &str) -> ConfigResult<TargetOptions> {
        let config = self.get(task)?;
        let raw = config
            .targets
            .get(target)
            .ok_or_else(|| ConfigError::TargetNotFound {
                task: task.to_string(),
                target: target.to_string(),
            })?;

        let mut merged = config.options.clone();
        if let Some(Value::Mapping(own)) = raw.get(OPTIONS_KEY) {
            for (key, value) in own {
                merged.insert(key.clone(), value.clone());
            }
        }
        for (key, value) in raw {
            if key.as_str() == Some(OPTIONS_KEY) {
                continue;
            }
            merged.insert(key.clone(), value.clone());
        }

        Ok(TargetOptions(merged))
    }

    /// Names of all configured tasks, in declaration order
    pub fn task_names(&self) -> impl Iterator<Item = &str> {
        self.tasks.keys().map(String::as_str)
    }

    /// The template data namespace
    pub fn data(&self) -> &Value {
        &self.data
    }
}

/// Targets of a single task plus its task-wide defaults
#[derive(Debug, Clone, Default)]
pub struct TaskConfig {
    options: Mapping,
    targets: IndexMap<String, Mapping>,
}

impl TaskConfig {
    /// Build from the raw mapping declared under a task name
    pub fn from_mapping(task: &str, raw: Mapping) -> ConfigResult<Self> {
        let mut config = TaskConfig::default();

        for (key, value) in raw {
            let name = key.as_str().ok_or_else(|| {
                ConfigError::Invalid(format!("Task '{}' has a non-string target name", task))
            })?;

            if name == OPTIONS_KEY {
                match value {
                    Value::Mapping(options) => config.options = options,
                    Value::Null => {}
                    _ => {
                        return Err(ConfigError::Invalid(format!(
                            "Options of task '{}' must be a mapping",
                            task
                        )))
                    }
                }
                continue;
            }

            if name.is_empty() || name.contains(':') {
                return Err(ConfigError::Invalid(format!(
                    "Target name '{}' of task '{}' must be non-empty and contain no ':'",
                    name, task
                )));
            }

            let target = normalize_target(value).ok_or_else(|| {
                ConfigError::Invalid(format!(
                    "Target '{}:{}' must be a mapping, list or string",
                    task, name
                ))
            })?;
            config.targets.insert(name.to_string(), target);
        }

        Ok(config)
    }

    /// Target names in declaration order
    pub fn target_names(&self) -> impl Iterator<Item = &str> {
        self.targets.keys().map(String::as_str)
    }

    /// Whether a target is configured
    pub fn has_target(&self, target: &str) -> bool {
        self.targets.contains_key(target)
    }

    /// Task-wide default options
    pub fn options(&self) -> &Mapping {
        &self.options
    }
}

/// Option keys to values for one invocation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TargetOptions(pub Mapping);

impl TargetOptions {
    /// Raw value of an option
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key).filter(|v| !v.is_null())
    }

    /// Whether an option is present and non-null
    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// String option; numbers and booleans are rendered as text
    pub fn get_str(&self, key: &str) -> ExecutionResult<Option<String>> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(Value::Number(n)) => Ok(Some(n.to_string())),
            Some(Value::Bool(b)) => Ok(Some(b.to_string())),
            Some(_) => Err(invalid(key, "expected a string")),
        }
    }

    /// String option that must be present
    pub fn require_str(&self, key: &str) -> ExecutionResult<String> {
        self.get_str(key)?
            .ok_or_else(|| ExecutionError::MissingOption(key.to_string()))
    }

    /// Boolean option with a default
    pub fn get_bool(&self, key: &str, default: bool) -> ExecutionResult<bool> {
        match self.get(key) {
            None => Ok(default),
            Some(Value::Bool(b)) => Ok(*b),
            Some(Value::String(s)) if s == "true" => Ok(true),
            Some(Value::String(s)) if s == "false" => Ok(false),
            Some(_) => Err(invalid(key, "expected a boolean")),
        }
    }

    /// Unsigned integer option with a default
    pub fn get_u64(&self, key: &str, default: u64) -> ExecutionResult<u64> {
        match self.get(key) {
            None => Ok(default),
            Some(Value::Number(n)) => n
                .as_u64()
                .ok_or_else(|| invalid(key, "expected a non-negative integer")),
            Some(Value::String(s)) => s
                .parse()
                .map_err(|_| invalid(key, "expected a non-negative integer")),
            Some(_) => Err(invalid(key, "expected a non-negative integer")),
        }
    }

    /// List of strings; a single string counts as a one-element list
    pub fn get_list(&self, key: &str) -> ExecutionResult<Vec<String>> {
        match self.get(key) {
            None => Ok(Vec::new()),
            Some(value) => value_to_list(value).ok_or_else(|| invalid(key, "expected a list of strings")),
        }
    }

    /// Mapping option
    pub fn get_mapping(&self, key: &str) -> ExecutionResult<Option<&Mapping>> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::Mapping(map)) => Ok(Some(map)),
            Some(_) => Err(invalid(key, "expected a mapping")),
        }
    }

    /// Copy of these options with one key replaced
    pub fn with(mut self, key: &str, value: Value) -> Self {
        self.0.insert(Value::String(key.to_string()), value);
        self
    }
}

/// Convert a string or list of strings value
pub fn value_to_list(value: &Value) -> Option<Vec<String>> {
    match value {
        Value::String(s) => Some(vec![s.clone()]),
        Value::Sequence(seq) => seq
            .iter()
            .map(|item| item.as_str().map(str::to_string))
            .collect(),
        _ => None,
    }
}

fn invalid(key: &str, error: &str) -> ExecutionError {
    ExecutionError::InvalidOption {
        name: key.to_string(),
        error: error.to_string(),
    }
}
