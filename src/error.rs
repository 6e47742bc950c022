//! Error types for Taskweave

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for Taskweave operations
pub type Result<T> = std::result::Result<T, WeaveError>;

/// Exit code for a run that failed or was cancelled
pub const EXIT_FAILURE: i32 = 1;

/// Exit code for configuration errors detected before anything executed
pub const EXIT_CONFIG: i32 = 2;

/// Main error type for Taskweave
#[derive(Error, Debug)]
pub enum WeaveError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Capability failures outside of a run
    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),

    /// Template interpolation errors
    #[error("Interpolation error: {0}")]
    Interpolation(#[from] InterpolationError),

    /// A run stopped at a failing invocation
    #[error("Task \"{task}:{target}\" failed: {source}")]
    TaskFailed {
        task: String,
        target: String,
        #[source]
        source: ExecutionError,
    },

    /// A run was cancelled between invocations
    #[error("Run cancelled after {completed} completed invocation(s)")]
    Cancelled { completed: usize },

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// YAML parsing errors
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON parsing errors
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),
}

impl WeaveError {
    /// Process exit code for this error
    pub fn exit_code(&self) -> i32 {
        if is_configuration_error(self) {
            EXIT_CONFIG
        } else {
            EXIT_FAILURE
        }
    }
}

/// Declaration parsing, validation and expansion errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to find config file (searched: {0})")]
    NotFound(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Task '{0}' has no configuration")]
    TaskNotFound(String),

    #[error("Target '{target}' is not configured for task '{task}'")]
    TargetNotFound { task: String, target: String },

    #[error("Task '{0}' has no targets configured")]
    NoTargets(String),

    #[error("Task '{0}' is not registered")]
    UnknownTask(String),

    #[error("Invalid task reference: {0}")]
    InvalidReference(String),

    #[error("Cyclic alias detected: {0}")]
    CyclicAlias(String),

    #[error("Failed to include file '{path}': {error}")]
    IncludeFile { path: PathBuf, error: String },
}

/// Capability failures raised while an invocation runs
#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("Command failed with exit code {0:?}")]
    CommandFailed(Option<i32>),

    #[error("Failed to start '{command}': {error}")]
    Spawn { command: String, error: String },

    #[error("Required input '{0}' does not exist")]
    MissingInput(PathBuf),

    #[error("Pattern '{0}' matched no files")]
    NoMatches(String),

    #[error("Option '{0}' is required but not provided")]
    MissingOption(String),

    #[error("Invalid option value for '{name}': {error}")]
    InvalidOption { name: String, error: String },

    #[error("Refusing to touch '{0}' outside the working directory")]
    OutsideWorkingDir(PathBuf),

    #[error(transparent)]
    Template(#[from] InterpolationError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Watch error: {0}")]
    Watch(String),
}

impl ExecutionError {
    /// Whether a task configured to tolerate failures may continue past this error.
    ///
    /// Misconfiguration is never tolerated; operational failures are.
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            ExecutionError::MissingOption(_)
                | ExecutionError::InvalidOption { .. }
                | ExecutionError::OutsideWorkingDir(_)
        )
    }
}

/// Template interpolation errors
#[derive(Error, Debug)]
pub enum InterpolationError {
    #[error("Template path '{0}' is not defined")]
    UndefinedVariable(String),

    #[error("Invalid template syntax: {0}")]
    InvalidSyntax(String),

    #[error("Unknown template function '{0}'")]
    UnknownFunction(String),

    #[error("Recursive interpolation detected")]
    RecursiveInterpolation,
}

/// Specialized result type for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Specialized result type for capability invocations
pub type ExecutionResult<T> = std::result::Result<T, ExecutionError>;

/// Specialized result type for interpolation operations
pub type InterpolationResult<T> = std::result::Result<T, InterpolationError>;

/// Whether an error was raised before any capability ran
pub fn is_configuration_error(err: &WeaveError) -> bool {
    matches!(
        err,
        WeaveError::Config(_) | WeaveError::Yaml(_) | WeaveError::Json(_)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        let config: WeaveError = ConfigError::CyclicAlias("a -> b -> a".to_string()).into();
        assert_eq!(config.exit_code(), EXIT_CONFIG);

        let failed = WeaveError::TaskFailed {
            task: "shell".to_string(),
            target: "build".to_string(),
            source: ExecutionError::CommandFailed(Some(1)),
        };
        assert_eq!(failed.exit_code(), EXIT_FAILURE);
        assert_eq!(WeaveError::Cancelled { completed: 2 }.exit_code(), EXIT_FAILURE);
    }

    #[test]
    fn test_recoverable_errors() {
        assert!(ExecutionError::CommandFailed(Some(2)).is_recoverable());
        assert!(ExecutionError::Template(InterpolationError::UndefinedVariable(
            "version".to_string()
        ))
        .is_recoverable());
        assert!(!ExecutionError::MissingOption("command".to_string()).is_recoverable());
        assert!(!ExecutionError::OutsideWorkingDir(PathBuf::from("/etc")).is_recoverable());
    }

    #[test]
    fn test_task_failed_message_names_invocation() {
        let err = WeaveError::TaskFailed {
            task: "clean".to_string(),
            target: "build".to_string(),
            source: ExecutionError::CommandFailed(Some(3)),
        };
        let message = err.to_string();
        assert!(message.contains("clean:build"));
        assert!(message.contains("Some(3)"));
    }
}
