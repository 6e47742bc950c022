//! Execution Engine
//!
//! Expands a top-level reference into an ordered list of invocations and
//! runs them one at a time. A run either completes every invocation, stops
//! at the first failure that is not tolerated, or stops at an invocation
//! boundary when cancelled. Completed invocations are never rolled back.

use crate::config::{validate_config, ConfigTree, Project, TargetOptions, TaskReference};
use crate::error::{ConfigError, ConfigResult, ExecutionError, ExecutionResult, WeaveError};
use crate::runner::{interpolate_mapping, CancelToken, Candidate, Context, TaskRegistry, TemplateContext};
use crate::tasks::{self, Capability};
use indexmap::IndexMap;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Child;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, warn};

/// Option that lets a pipeline continue past a task's failure when `false`
pub const FAIL_ON_ERROR: &str = "fail-on-error";

/// Lifecycle of a single run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Pending,
    Expanding,
    /// Running the invocation at this index
    Executing(usize),
    Succeeded,
    /// Stopped by the invocation at this index
    Failed(usize),
    /// Stopped before the invocation at this index
    Cancelled(usize),
}

impl RunState {
    /// Whether `next` is a legal successor of this state
    pub fn can_advance_to(self, next: RunState) -> bool {
        use RunState::*;
        match (self, next) {
            (Pending, Expanding) => true,
            (Expanding, Executing(0)) | (Expanding, Succeeded) | (Expanding, Cancelled(0)) => true,
            (Executing(i), Executing(j)) => j == i + 1,
            (Executing(i), Failed(j)) => i == j,
            (Executing(i), Cancelled(j)) => j == i + 1,
            (Executing(_), Succeeded) => true,
            _ => false,
        }
    }

    /// Whether the run has ended
    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::Succeeded | RunState::Failed(_) | RunState::Cancelled(_))
    }
}

/// A resolved unit of work handed to a capability
pub struct Invocation {
    /// Task name
    pub task: String,

    /// Target name
    pub target: String,

    /// Capability bound to the task
    pub capability: Arc<dyn Capability>,

    /// Merged and interpolated options
    pub options: TargetOptions,
}

impl Invocation {
    /// `task:target` label
    pub fn label(&self) -> String {
        format!("{}:{}", self.task, self.target)
    }
}

impl fmt::Debug for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Invocation")
            .field("task", &self.task)
            .field("target", &self.target)
            .field("options", &self.options)
            .finish()
    }
}

/// What a capability may reach while it runs
pub struct InvocationContext<'a> {
    /// Engine running the invocation
    pub engine: &'a Engine,

    /// Cancellation token of the enclosing run
    pub cancel: &'a CancelToken,
}

impl InvocationContext<'_> {
    /// Shared run settings
    pub fn context(&self) -> &Context {
        self.engine.context()
    }

    /// Directory relative paths resolve against
    pub fn working_dir(&self) -> &Path {
        &self.engine.context().working_dir
    }

    /// Resolve a path against the working directory
    pub fn resolve(&self, path: impl AsRef<Path>) -> PathBuf {
        self.working_dir().join(path)
    }
}

/// How one invocation ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Succeeded,
    /// Failed, but the task tolerates failures
    Tolerated(String),
}

/// Record of one executed invocation
#[derive(Debug, Clone)]
pub struct StepRecord {
    pub candidate: Candidate,
    pub outcome: StepOutcome,
}

/// The invocation that stopped a run
#[derive(Debug)]
pub struct StepFailure {
    pub index: usize,
    pub candidate: Candidate,
    pub cause: ExecutionError,
}

/// Result of one run
#[derive(Debug)]
pub struct RunReport {
    /// What was requested
    pub label: String,

    /// Final state
    pub state: RunState,

    /// Invocations that ran to completion, in order
    pub steps: Vec<StepRecord>,

    /// Set when the state is `Failed`
    pub failure: Option<StepFailure>,
}

impl RunReport {
    /// Whether every invocation completed or was tolerated
    pub fn succeeded(&self) -> bool {
        self.state == RunState::Succeeded
    }

    /// Labels of executed invocations, in order
    pub fn executed(&self) -> Vec<String> {
        self.steps.iter().map(|s| s.candidate.to_string()).collect()
    }

    /// Convert a failed or cancelled run into an error
    pub fn into_result(self) -> Result<RunReport, WeaveError> {
        match self.state {
            RunState::Cancelled(completed) => Err(WeaveError::Cancelled { completed }),
            RunState::Failed(_) => match self.failure {
                Some(failure) => Err(WeaveError::TaskFailed {
                    task: failure.candidate.task,
                    target: failure.candidate.target,
                    source: failure.cause,
                }),
                None => Err(WeaveError::Cancelled {
                    completed: self.steps.len(),
                }),
            },
            _ => Ok(self),
        }
    }
}

/// An invocation planned during expansion
struct Planned {
    candidate: Candidate,
    capability: Arc<dyn Capability>,
    raw: TargetOptions,
    tolerant: bool,
}

/// Runs task references against an immutable registry and config tree
pub struct Engine {
    registry: TaskRegistry,
    tree: ConfigTree,
    context: Context,
    /// Processes of never-terminating invocations, at most one per label
    detached: Mutex<IndexMap<String, Child>>,
}

impl Engine {
    /// Create an engine; every alias is expanded once to reject bad declarations
    pub fn new(registry: TaskRegistry, tree: ConfigTree, context: Context) -> ConfigResult<Self> {
        registry.validate(&tree)?;
        Ok(Engine {
            registry,
            tree,
            context,
            detached: Mutex::new(IndexMap::new()),
        })
    }

    /// Register built-ins, layer the project's aliases on top, and validate
    pub fn from_project(project: Project, context: Context) -> ConfigResult<Self> {
        validate_config(&project)?;

        let mut registry = TaskRegistry::new();
        tasks::register_builtins(&mut registry);
        for (name, refs) in project.aliases {
            registry.register_alias(name, refs);
        }

        let context = match project.interpreter {
            Some(interpreter) => context.with_interpreter(interpreter),
            None => context,
        };

        Engine::new(registry, project.tree, context)
    }

    /// The task registry
    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    /// The config tree
    pub fn tree(&self) -> &ConfigTree {
        &self.tree
    }

    /// Shared run settings
    pub fn context(&self) -> &Context {
        &self.context
    }

    /// Expanded invocation list for references, without running anything
    pub fn plan(&self, refs: &[TaskReference]) -> ConfigResult<Vec<Candidate>> {
        self.registry.expand_all(refs, &self.tree)
    }

    /// Run one top-level task reference (`task` or `task:target`)
    pub fn run(&self, task: &str) -> ConfigResult<RunReport> {
        let reference: TaskReference = task.parse()?;
        self.run_references(&[reference], &CancelToken::new())
    }

    /// Run references in order as one pipeline
    ///
    /// Configuration errors are returned before any capability executes.
    /// Invocation failures end up in the report.
    pub fn run_references(&self, refs: &[TaskReference], cancel: &CancelToken) -> ConfigResult<RunReport> {
        let label = refs.iter().map(ToString::to_string).collect::<Vec<_>>().join(" ");
        let mut state = RunState::Pending;

        advance(&mut state, RunState::Expanding, &label);
        let planned = self.expand(refs)?;
        self.context
            .print_debug(&format!("Expanded \"{}\" into {} invocation(s)", label, planned.len()));

        let mut report = RunReport {
            label,
            state,
            steps: Vec::with_capacity(planned.len()),
            failure: None,
        };

        let ctx = InvocationContext { engine: self, cancel };

        for (index, plan) in planned.into_iter().enumerate() {
            if cancel.is_cancelled() {
                advance(&mut report.state, RunState::Cancelled(index), &report.label);
                self.context.print_warning("Run cancelled.");
                return Ok(report);
            }

            advance(&mut report.state, RunState::Executing(index), &report.label);
            self.context.print_task_start(&plan.candidate.to_string(), &plan.candidate.task);

            match self.invoke(&plan, &ctx) {
                Ok(()) => report.steps.push(StepRecord {
                    candidate: plan.candidate,
                    outcome: StepOutcome::Succeeded,
                }),
                Err(cause) if (plan.tolerant || self.context.force) && cause.is_recoverable() => {
                    warn!(invocation = %plan.candidate, error = %cause, "tolerated failure");
                    self.context.print_warning(&format!("{} Continuing.", cause));
                    report.steps.push(StepRecord {
                        candidate: plan.candidate,
                        outcome: StepOutcome::Tolerated(cause.to_string()),
                    });
                }
                Err(cause) => {
                    self.context.print_error(&format!("\"{}\" failed: {}", plan.candidate, cause));
                    advance(&mut report.state, RunState::Failed(index), &report.label);
                    report.failure = Some(StepFailure {
                        index,
                        candidate: plan.candidate,
                        cause,
                    });
                    self.context.print_run_complete(false);
                    return Ok(report);
                }
            }
        }

        advance(&mut report.state, RunState::Succeeded, &report.label);
        self.context.print_run_complete(true);
        Ok(report)
    }

    /// Resolve references into planned invocations
    fn expand(&self, refs: &[TaskReference]) -> ConfigResult<Vec<Planned>> {
        self.plan(refs)?
            .into_iter()
            .map(|candidate| {
                let capability = self
                    .registry
                    .capability(&candidate.task)
                    .ok_or_else(|| ConfigError::UnknownTask(candidate.task.clone()))?;
                let raw = self.tree.get_target(&candidate.task, &candidate.target)?;
                let tolerant = !raw.get_bool(FAIL_ON_ERROR, true).map_err(|e| {
                    ConfigError::Invalid(format!("{} in \"{}\"", e, candidate))
                })?;
                Ok(Planned {
                    candidate,
                    capability,
                    raw,
                    tolerant,
                })
            })
            .collect()
    }

    /// Interpolate options at invocation time and call the capability
    fn invoke(&self, plan: &Planned, ctx: &InvocationContext<'_>) -> ExecutionResult<()> {
        let templates = TemplateContext::new(self.tree.data()).with_now(self.context.invocation_time());
        let options = TargetOptions(interpolate_mapping(&plan.raw.0, &templates)?);

        let invocation = Invocation {
            task: plan.candidate.task.clone(),
            target: plan.candidate.target.clone(),
            capability: Arc::clone(&plan.capability),
            options,
        };
        debug!(invocation = %plan.candidate, "invoking capability");

        plan.capability.invoke(&invocation, ctx)
    }

    fn detached(&self) -> MutexGuard<'_, IndexMap<String, Child>> {
        self.detached.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Keep a launched process that the run does not wait for
    ///
    /// A process still registered under the same label is stopped first.
    pub fn detach(&self, label: impl Into<String>, child: Child) -> io::Result<()> {
        let label = label.into();
        debug!(invocation = %label, pid = child.id(), "detached process");
        let previous = self.detached().insert(label.clone(), child);
        match previous {
            Some(previous) => stop_process(&label, previous),
            None => Ok(()),
        }
    }

    /// Stop the process an earlier invocation of `label` detached
    ///
    /// Returns whether there was one.
    pub fn stop_detached(&self, label: &str) -> io::Result<bool> {
        let previous = self.detached().shift_remove(label);
        match previous {
            Some(child) => stop_process(label, child).map(|()| true),
            None => Ok(false),
        }
    }

    /// Number of detached processes currently tracked
    pub fn detached_count(&self) -> usize {
        self.detached().len()
    }

    /// Wait for every detached process to exit
    pub fn wait_detached(&self) -> io::Result<()> {
        let detached = std::mem::take(&mut *self.detached());
        for (label, mut child) in detached {
            self.context
                .print_info(&format!("Waiting for \"{}\" (pid {})", label, child.id()));
            let status = child.wait()?;
            debug!(invocation = %label, %status, "detached process exited");
        }
        Ok(())
    }
}

fn stop_process(label: &str, mut child: Child) -> io::Result<()> {
    if child.try_wait()?.is_none() {
        child.kill()?;
    }
    let status = child.wait()?;
    debug!(invocation = label, pid = child.id(), %status, "stopped detached process");
    Ok(())
}

fn advance(state: &mut RunState, next: RunState, label: &str) {
    debug_assert!(
        state.can_advance_to(next),
        "illegal run transition {:?} -> {:?}",
        state,
        next
    );
    debug!(run = label, from = ?state, to = ?next, "run state");
    *state = next;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;
    use crate::runner::Verbosity;
    use chrono::{Local, TimeZone};

    /// Records invocations; fails targets whose options say `fail: true`
    #[derive(Clone, Default)]
    struct Recorder {
        log: Arc<Mutex<Vec<String>>>,
    }

    impl Capability for Recorder {
        fn description(&self) -> &str {
            "records invocations"
        }

        fn invoke(&self, invocation: &Invocation, _ctx: &InvocationContext<'_>) -> ExecutionResult<()> {
            let mut entry = invocation.label();
            if let Some(value) = invocation.options.get_str("value")? {
                entry = format!("{}={}", entry, value);
            }
            self.log.lock().unwrap().push(entry);
            if invocation.options.get_bool("fail", false)? {
                return Err(ExecutionError::CommandFailed(Some(1)));
            }
            if invocation.options.get_bool("misconfigured", false)? {
                return Err(ExecutionError::MissingOption("command".to_string()));
            }
            Ok(())
        }
    }

    /// Sets the run's cancel token from inside an invocation
    struct Canceller;

    impl Capability for Canceller {
        fn description(&self) -> &str {
            "cancels the run"
        }

        fn invoke(&self, _invocation: &Invocation, ctx: &InvocationContext<'_>) -> ExecutionResult<()> {
            ctx.cancel.cancel();
            Ok(())
        }
    }

    fn engine_for(yaml: &str, recorder: &Recorder) -> ConfigResult<Engine> {
        let project = parse_config(yaml, None).unwrap();
        validate_config(&project)?;
        let mut registry = TaskRegistry::new();
        for name in ["clean", "compile", "copy"] {
            registry.register(name, recorder.clone());
        }
        registry.register("stop", Canceller);
        for (name, refs) in project.aliases {
            registry.register_alias(name, refs);
        }
        let ctx = Context::new()
            .with_verbosity(Verbosity::Silent)
            .with_now(Local.with_ymd_and_hms(2016, 1, 1, 0, 0, 0).unwrap());
        Engine::new(registry, project.tree, ctx)
    }

    fn log(recorder: &Recorder) -> Vec<String> {
        recorder.log.lock().unwrap().clone()
    }

    const BUILD: &str = r#"
data:
  version: 1.2.3
tasks:
  clean:
    build:
      paths: ["out/*.js"]
  compile:
    build:
      source: src/x.pegjs
  build: ["clean:build", "compile:build"]
"#;

    #[test]
    fn test_alias_runs_in_order() {
        let recorder = Recorder::default();
        let engine = engine_for(BUILD, &recorder).unwrap();

        let report = engine.run("build").unwrap();
        assert!(report.succeeded());
        assert_eq!(report.executed(), vec!["clean:build", "compile:build"]);
        assert_eq!(log(&recorder), vec!["clean:build", "compile:build"]);
    }

    #[test]
    fn test_failure_aborts_remaining() {
        let yaml = BUILD.replace("paths: [\"out/*.js\"]", "fail: true");
        let recorder = Recorder::default();
        let engine = engine_for(&yaml, &recorder).unwrap();

        let report = engine.run("build").unwrap();
        assert_eq!(report.state, RunState::Failed(0));
        assert_eq!(log(&recorder), vec!["clean:build"]);

        let failure = report.failure.as_ref().unwrap();
        assert_eq!(failure.candidate, Candidate::new("clean", "build"));
        assert!(matches!(failure.cause, ExecutionError::CommandFailed(Some(1))));

        match report.into_result() {
            Err(WeaveError::TaskFailed { task, target, .. }) => {
                assert_eq!((task.as_str(), target.as_str()), ("clean", "build"));
            }
            other => panic!("expected task failure, got {:?}", other),
        }
    }

    #[test]
    fn test_tolerated_failure_continues() {
        let yaml = BUILD.replace("paths: [\"out/*.js\"]", "fail: true\n      fail-on-error: false");
        let recorder = Recorder::default();
        let engine = engine_for(&yaml, &recorder).unwrap();

        let report = engine.run("build").unwrap();
        assert!(report.succeeded());
        assert_eq!(log(&recorder), vec!["clean:build", "compile:build"]);
        assert!(matches!(report.steps[0].outcome, StepOutcome::Tolerated(_)));
    }

    #[test]
    fn test_task_wide_tolerance() {
        let yaml = BUILD.replace(
            "  clean:\n    build:\n      paths: [\"out/*.js\"]",
            "  clean:\n    options:\n      fail-on-error: false\n    build:\n      fail: true",
        );
        let recorder = Recorder::default();
        let engine = engine_for(&yaml, &recorder).unwrap();

        assert!(engine.run("build").unwrap().succeeded());
        assert_eq!(log(&recorder).len(), 2);
    }

    #[test]
    fn test_misconfiguration_is_never_tolerated() {
        let yaml = BUILD.replace(
            "paths: [\"out/*.js\"]",
            "misconfigured: true\n      fail-on-error: false",
        );
        let recorder = Recorder::default();
        let engine = engine_for(&yaml, &recorder).unwrap();

        let report = engine.run("build").unwrap();
        assert_eq!(report.state, RunState::Failed(0));
        assert_eq!(log(&recorder), vec!["clean:build"]);
    }

    #[test]
    fn test_cyclic_alias_fails_before_execution() {
        let recorder = Recorder::default();
        let result = engine_for(
            r#"
tasks:
  clean:
    build: ["out/*.js"]
  a: ["clean:build", b]
  b: [a]
"#,
            &recorder,
        );
        assert!(matches!(result, Err(ConfigError::CyclicAlias(_))));
        assert!(log(&recorder).is_empty());
    }

    #[test]
    fn test_unknown_task_fails_before_execution() {
        let recorder = Recorder::default();
        let engine = engine_for(BUILD, &recorder).unwrap();
        assert!(matches!(engine.run("uglify"), Err(ConfigError::UnknownTask(_))));
        assert!(matches!(engine.run("build:dist"), Err(ConfigError::InvalidReference(_))));
        assert!(log(&recorder).is_empty());
    }

    #[test]
    fn test_templates_resolved_at_invocation() {
        let yaml = BUILD.replace("source: src/x.pegjs", "value: \"v<%= version %>-<%= today('yyyy') %>\"");
        let recorder = Recorder::default();
        let engine = engine_for(&yaml, &recorder).unwrap();

        engine.run("compile:build").unwrap();
        assert_eq!(log(&recorder), vec!["compile:build=v1.2.3-2016"]);
    }

    #[test]
    fn test_template_error_aborts_run() {
        let yaml = BUILD.replace("paths: [\"out/*.js\"]", "value: \"<%= missing %>\"");
        let recorder = Recorder::default();
        let engine = engine_for(&yaml, &recorder).unwrap();

        let report = engine.run("build").unwrap();
        assert_eq!(report.state, RunState::Failed(0));
        assert!(log(&recorder).is_empty());
        let cause = &report.failure.as_ref().unwrap().cause;
        assert!(cause.to_string().contains("missing"));
    }

    #[test]
    fn test_cancelled_before_first_invocation() {
        let recorder = Recorder::default();
        let engine = engine_for(BUILD, &recorder).unwrap();
        let cancel = CancelToken::new();
        cancel.cancel();

        let report = engine
            .run_references(&[TaskReference::bare("build")], &cancel)
            .unwrap();
        assert_eq!(report.state, RunState::Cancelled(0));
        assert!(log(&recorder).is_empty());
        assert!(matches!(
            report.into_result(),
            Err(WeaveError::Cancelled { completed: 0 })
        ));
    }

    #[test]
    fn test_cancelled_between_invocations() {
        let yaml = format!(
            "{}  stop:\n    now: {{}}\n  early: [\"stop:now\", \"clean:build\"]\n  late: [\"clean:build\", \"stop:now\", \"compile:build\"]\n",
            BUILD
        );
        let recorder = Recorder::default();
        let engine = engine_for(&yaml, &recorder).unwrap();

        let report = engine
            .run_references(&[TaskReference::bare("early")], &CancelToken::new())
            .unwrap();
        assert_eq!(report.state, RunState::Cancelled(1));
        assert_eq!(report.executed(), vec!["stop:now"]);
        assert!(log(&recorder).is_empty());

        let report = engine
            .run_references(&[TaskReference::bare("late")], &CancelToken::new())
            .unwrap();
        assert_eq!(report.state, RunState::Cancelled(2));
        assert_eq!(report.executed(), vec!["clean:build", "stop:now"]);
        assert_eq!(log(&recorder), vec!["clean:build"]);
        assert!(matches!(
            report.into_result(),
            Err(WeaveError::Cancelled { completed: 2 })
        ));
    }

    #[test]
    fn test_empty_alias_succeeds() {
        let recorder = Recorder::default();
        let engine = engine_for("tasks:\n  nothing: []\n", &recorder).unwrap();
        let report = engine.run("nothing").unwrap();
        assert!(report.succeeded());
        assert!(report.steps.is_empty());
    }

    #[test]
    fn test_state_transitions() {
        use RunState::*;
        assert!(Pending.can_advance_to(Expanding));
        assert!(Expanding.can_advance_to(Executing(0)));
        assert!(Executing(0).can_advance_to(Executing(1)));
        assert!(Executing(3).can_advance_to(Failed(3)));
        assert!(Executing(1).can_advance_to(Cancelled(2)));
        assert!(!Executing(0).can_advance_to(Executing(2)));
        assert!(!Pending.can_advance_to(Executing(0)));
        assert!(!Succeeded.can_advance_to(Executing(0)));
        assert!(Failed(0).is_terminal());
        assert!(!Executing(0).is_terminal());
    }
}
