//! `shell`: run a command through the interpreter
//!
//! ```yaml
//! shell:
//!   options:
//!     fail-on-error: true
//!   build:
//!     command: ["pegjs src/grammar.pegjs lib/parser.js", "echo done"]
//!     cwd: .
//!     env: {NODE_ENV: production}
//!   serve:
//!     command: npm run server
//!     forever: true
//! ```

use crate::error::{ExecutionError, ExecutionResult};
use crate::runner::{execute_command, spawn_command, Invocation, InvocationContext, ShellCommand};
use crate::tasks::Capability;
use serde_yaml::Value;

#[derive(Debug, Clone, Copy, Default)]
pub struct Shell;

impl Shell {
    fn command(invocation: &Invocation, ctx: &InvocationContext<'_>) -> ExecutionResult<ShellCommand> {
        let options = &invocation.options;
        let parts = options.get_list("command")?;
        if parts.is_empty() {
            return Err(ExecutionError::MissingOption("command".to_string()));
        }

        let dir = match options.get_str("cwd")? {
            Some(cwd) => ctx.resolve(cwd),
            None => ctx.working_dir().to_path_buf(),
        };

        let mut cmd = ShellCommand::new(parts.join(" && "), dir);
        cmd.quiet = options.get_bool("quiet", false)?;

        if let Some(env) = options.get_mapping("env")? {
            for (key, value) in env {
                let key = key.as_str().ok_or_else(|| ExecutionError::InvalidOption {
                    name: "env".to_string(),
                    error: "variable names must be strings".to_string(),
                })?;
                let value = match value {
                    Value::String(s) => s.clone(),
                    Value::Number(n) => n.to_string(),
                    Value::Bool(b) => b.to_string(),
                    _ => {
                        return Err(ExecutionError::InvalidOption {
                            name: "env".to_string(),
                            error: format!("value of '{}' must be a scalar", key),
                        })
                    }
                };
                cmd.env.push((key.to_string(), value));
            }
        }

        Ok(cmd)
    }
}

impl Capability for Shell {
    fn description(&self) -> &str {
        "Run shell commands"
    }

    fn invoke(&self, invocation: &Invocation, ctx: &InvocationContext<'_>) -> ExecutionResult<()> {
        let cmd = Self::command(invocation, ctx)?;

        if invocation.options.get_bool("forever", false)? {
            let label = invocation.label();
            if ctx.engine.stop_detached(&label)? {
                ctx.context()
                    .print_info(&format!("Stopped the previous \"{}\"", label));
            }
            let child = spawn_command(&cmd, ctx.context())?;
            ctx.context()
                .print_info(&format!("Started \"{}\" in the background (pid {})", label, child.id()));
            ctx.engine.detach(label, child)?;
            return Ok(());
        }

        execute_command(&cmd, ctx.context())
    }
}

#[cfg(test)]
mod tests {
    use crate::error::ExecutionError;
    use crate::runner::RunState;
    use crate::tasks::testing::{engine_in, run};
    use std::fs;
    use std::time::{Duration, Instant};
    use tempfile::TempDir;

    #[test]
    fn test_command_list_runs_in_order() {
        let dir = TempDir::new().unwrap();
        let engine = engine_in(
            dir.path(),
            r#"
tasks:
  shell:
    build:
      command: ["echo one > out.txt", "echo two >> out.txt"]
"#,
        );
        assert!(run(&engine, "shell:build").succeeded());
        let out = fs::read_to_string(dir.path().join("out.txt")).unwrap();
        assert_eq!(out.lines().collect::<Vec<_>>(), vec!["one", "two"]);
    }

    #[test]
    fn test_cwd_and_env() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("lib")).unwrap();
        let engine = engine_in(
            dir.path(),
            r#"
tasks:
  shell:
    env:
      command: echo "$MODE" > mode.txt
      cwd: lib
      env: {MODE: release}
"#,
        );
        assert!(run(&engine, "shell:env").succeeded());
        let mode = fs::read_to_string(dir.path().join("lib/mode.txt")).unwrap();
        assert_eq!(mode.trim(), "release");
    }

    #[test]
    fn test_non_zero_exit_fails() {
        let dir = TempDir::new().unwrap();
        let engine = engine_in(dir.path(), "tasks:\n  shell:\n    bad: {command: \"exit 4\"}\n");
        let report = run(&engine, "shell:bad");
        assert_eq!(report.state, RunState::Failed(0));
        assert!(matches!(
            report.failure.unwrap().cause,
            ExecutionError::CommandFailed(Some(4))
        ));
    }

    #[test]
    fn test_missing_command() {
        let dir = TempDir::new().unwrap();
        let engine = engine_in(dir.path(), "tasks:\n  shell:\n    empty: {cwd: .}\n");
        let report = run(&engine, "shell:empty");
        assert!(matches!(
            report.failure.unwrap().cause,
            ExecutionError::MissingOption(_)
        ));
    }

    #[test]
    fn test_forever_is_detached() {
        let dir = TempDir::new().unwrap();
        let engine = engine_in(
            dir.path(),
            r#"
tasks:
  shell:
    server:
      command: "sleep 0.2 && echo up > server.txt"
      forever: true
    after:
      command: "echo next > after.txt"
"#,
        );
        let report = run(&engine, "shell");
        assert!(report.succeeded());
        assert!(dir.path().join("after.txt").exists());
        assert_eq!(engine.detached_count(), 1);

        engine.wait_detached().unwrap();
        assert!(dir.path().join("server.txt").exists());
        assert_eq!(engine.detached_count(), 0);
    }

    #[test]
    fn test_forever_rerun_replaces_previous_process() {
        let dir = TempDir::new().unwrap();
        let engine = engine_in(
            dir.path(),
            r#"
tasks:
  shell:
    server:
      command: "exec sleep 30"
      forever: true
"#,
        );

        let started = Instant::now();
        for _ in 0..3 {
            assert!(run(&engine, "shell:server").succeeded());
            assert_eq!(engine.detached_count(), 1);
        }

        // Only the last instance is left; earlier ones were stopped and reaped
        assert!(engine.stop_detached("shell:server").unwrap());
        assert_eq!(engine.detached_count(), 0);
        assert!(!engine.stop_detached("shell:server").unwrap());
        engine.wait_detached().unwrap();
        assert!(started.elapsed() < Duration::from_secs(20));
    }
}
