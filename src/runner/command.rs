//! Shell command execution
//!
//! Commands run through the configured interpreter with inherited stdio.

use crate::error::{ExecutionError, ExecutionResult};
use crate::runner::{Context, Verbosity};
use std::path::PathBuf;
use std::process::{Child, Command as StdCommand, Stdio};

/// A command line ready to run
#[derive(Debug, Clone)]
pub struct ShellCommand {
    /// The command line handed to the interpreter
    pub exec: String,

    /// Working directory
    pub dir: PathBuf,

    /// Extra environment variables
    pub env: Vec<(String, String)>,

    /// Whether to suppress the command echo
    pub quiet: bool,
}

impl ShellCommand {
    /// A command run in the given directory
    pub fn new(exec: impl Into<String>, dir: PathBuf) -> Self {
        ShellCommand {
            exec: exec.into(),
            dir,
            env: Vec::new(),
            quiet: false,
        }
    }
}

/// Execute a command and wait for it to exit
pub fn execute_command(cmd: &ShellCommand, ctx: &Context) -> ExecutionResult<()> {
    let status = build(cmd, ctx)?
        .status()
        .map_err(|e| spawn_error(cmd, ctx, e))?;

    if !status.success() {
        return Err(ExecutionError::CommandFailed(status.code()));
    }

    Ok(())
}

/// Start a command without waiting for it
pub fn spawn_command(cmd: &ShellCommand, ctx: &Context) -> ExecutionResult<Child> {
    build(cmd, ctx)?
        .spawn()
        .map_err(|e| spawn_error(cmd, ctx, e))
}

fn build(cmd: &ShellCommand, ctx: &Context) -> ExecutionResult<StdCommand> {
    let (program, interpreter_args) = ctx
        .interpreter
        .split_first()
        .ok_or_else(|| ExecutionError::InvalidOption {
            name: "interpreter".to_string(),
            error: "interpreter must not be empty".to_string(),
        })?;

    if !cmd.quiet && ctx.verbosity >= Verbosity::Normal {
        eprintln!("$ {}", cmd.exec);
    }

    let mut command = StdCommand::new(program);
    command
        .args(interpreter_args)
        .arg(&cmd.exec)
        .current_dir(&cmd.dir)
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit());

    for (key, value) in &cmd.env {
        command.env(key, value);
    }

    Ok(command)
}

fn spawn_error(cmd: &ShellCommand, ctx: &Context, error: std::io::Error) -> ExecutionError {
    ExecutionError::Spawn {
        command: format!("{} {}", ctx.interpreter.join(" "), cmd.exec),
        error: error.to_string(),
    }
}
