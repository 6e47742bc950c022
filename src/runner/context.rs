//! Execution context for runs
//!
//! The context carries the settings every invocation shares and owns the
//! console reporting of a run.

use chrono::{DateTime, Local};
use colored::Colorize;
use std::env;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Settings shared by every invocation of a run
#[derive(Debug, Clone)]
pub struct Context {
    /// Directory file patterns and commands are resolved against
    pub working_dir: PathBuf,

    /// Declaration file path
    pub config_path: Option<PathBuf>,

    /// Shell interpreter (e.g., ["sh", "-c"])
    pub interpreter: Vec<String>,

    /// Verbosity level
    pub verbosity: Verbosity,

    /// Continue past every recoverable failure
    pub force: bool,

    /// Fixed time for template date functions
    pub now: Option<DateTime<Local>>,
}

/// Verbosity levels for output
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Verbosity {
    Silent = 0,
    Quiet = 1,
    Normal = 2,
    Verbose = 3,
}

impl Context {
    /// Create a new context with default settings
    pub fn new() -> Self {
        Context {
            working_dir: env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            config_path: None,
            interpreter: vec!["sh".to_string(), "-c".to_string()],
            verbosity: Verbosity::Normal,
            force: false,
            now: None,
        }
    }

    /// Create a context with a specific working directory
    pub fn with_working_dir(mut self, dir: PathBuf) -> Self {
        self.working_dir = dir;
        self
    }

    /// Set the declaration file path
    pub fn with_config_path(mut self, path: PathBuf) -> Self {
        self.config_path = Some(path);
        self
    }

    /// Set the interpreter
    pub fn with_interpreter(mut self, interpreter: Vec<String>) -> Self {
        if !interpreter.is_empty() {
            self.interpreter = interpreter;
        }
        self
    }

    /// Set verbosity level
    pub fn with_verbosity(mut self, verbosity: Verbosity) -> Self {
        self.verbosity = verbosity;
        self
    }

    /// Tolerate every recoverable failure
    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// Pin the time seen by templates
    pub fn with_now(mut self, now: DateTime<Local>) -> Self {
        self.now = Some(now);
        self
    }

    /// Time to use for an invocation starting now
    pub fn invocation_time(&self) -> DateTime<Local> {
        self.now.unwrap_or_else(Local::now)
    }

    /// Print info message
    pub fn print_info(&self, message: &str) {
        if self.verbosity >= Verbosity::Normal {
            eprintln!("{}", message);
        }
    }

    /// Print warning message
    pub fn print_warning(&self, message: &str) {
        if self.verbosity >= Verbosity::Quiet {
            eprintln!("{} {}", "Warning:".yellow().bold(), message);
        }
    }

    /// Print error message
    pub fn print_error(&self, message: &str) {
        if self.verbosity >= Verbosity::Quiet {
            eprintln!("{} {}", "Error:".red().bold(), message);
        }
    }

    /// Print debug message (only in verbose mode)
    pub fn print_debug(&self, message: &str) {
        if self.verbosity >= Verbosity::Verbose {
            eprintln!("{}", message.dimmed());
        }
    }

    /// Print invocation start message
    pub fn print_task_start(&self, invocation: &str, capability: &str) {
        if self.verbosity >= Verbosity::Normal {
            eprintln!(
                "\n{} {} {}",
                "Running".underline(),
                format!("\"{}\"", invocation).underline(),
                format!("({}) task", capability).underline()
            );
        }
    }

    /// Print the final line of a run
    pub fn print_run_complete(&self, success: bool) {
        if success {
            self.print_info(&format!("\n{}", "Done.".green()));
        } else if self.verbosity >= Verbosity::Quiet {
            eprintln!("\n{}", "Aborted due to errors.".red());
        }
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

/// Request to stop a run at the next invocation boundary
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// A token that has not been cancelled
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
