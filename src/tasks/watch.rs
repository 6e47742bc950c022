//! `watch`: re-run tasks when files change
//!
//! ```yaml
//! watch:
//!   options:
//!     debounce-delay: 500
//!     coalesce: queue-one
//!   build:
//!     files: ["src/**/*.{js,pegjs}", "!src/**/*.tmp"]
//!     tasks: [build, "shell:test"]
//! ```
//!
//! Change events are debounced, filtered against `files`, and then start a
//! run of `tasks` on the watch thread. Triggers that arrive while a run is in
//! progress are handled by the coalescing policy, so two runs never overlap.
//! The watch ends when the run's cancel token is set.

use crate::config::TaskReference;
use crate::error::{ExecutionError, ExecutionResult};
use crate::runner::{Invocation, InvocationContext, RunState};
use crate::tasks::{files, Capability};
use globset::{GlobSet, GlobSetBuilder};
use notify_debouncer_mini::{new_debouncer, DebounceEventResult};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::Duration;
use tracing::{debug, warn};

/// Default debounce window in milliseconds
pub const DEFAULT_DEBOUNCE_MS: u64 = 500;

/// How often the loop checks for cancellation
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// What happens to triggers that arrive while a run is in progress
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CoalescePolicy {
    /// Ignore them
    Drop,
    /// Run once more after the current run, however many arrived
    #[default]
    QueueOne,
    /// Run once more per trigger
    QueueAll,
}

impl FromStr for CoalescePolicy {
    type Err = ExecutionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "drop" => Ok(CoalescePolicy::Drop),
            "queue-one" => Ok(CoalescePolicy::QueueOne),
            "queue-all" => Ok(CoalescePolicy::QueueAll),
            other => Err(ExecutionError::InvalidOption {
                name: "coalesce".to_string(),
                error: format!("expected drop, queue-one or queue-all, got '{}'", other),
            }),
        }
    }
}

impl fmt::Display for CoalescePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CoalescePolicy::Drop => "drop",
            CoalescePolicy::QueueOne => "queue-one",
            CoalescePolicy::QueueAll => "queue-all",
        };
        f.write_str(name)
    }
}

/// Tracks whether a run is active and how many are queued behind it
#[derive(Debug, Clone)]
pub struct Coalescer {
    policy: CoalescePolicy,
    running: bool,
    pending: usize,
}

impl Coalescer {
    pub fn new(policy: CoalescePolicy) -> Self {
        Coalescer {
            policy,
            running: false,
            pending: 0,
        }
    }

    /// A trigger arrived; returns whether a run starts now
    pub fn trigger(&mut self) -> bool {
        if !self.running {
            self.running = true;
            return true;
        }
        match self.policy {
            CoalescePolicy::Drop => {}
            CoalescePolicy::QueueOne => self.pending = 1,
            CoalescePolicy::QueueAll => self.pending += 1,
        }
        false
    }

    /// The active run ended; returns whether a queued run starts now
    pub fn finish(&mut self) -> bool {
        if self.pending > 0 {
            self.pending -= 1;
            return true;
        }
        self.running = false;
        false
    }

    /// Forget queued runs
    pub fn reset(&mut self) {
        self.running = false;
        self.pending = 0;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn pending(&self) -> usize {
        self.pending
    }
}

/// Include and exclude patterns relative to the working directory
#[derive(Debug, Clone)]
pub struct PathFilter {
    include: GlobSet,
    exclude: GlobSet,
}

impl PathFilter {
    pub fn new(patterns: &[String]) -> ExecutionResult<Self> {
        let mut include = GlobSetBuilder::new();
        let mut exclude = GlobSetBuilder::new();

        for pattern in patterns {
            let (builder, pattern) = match pattern.strip_prefix('!') {
                Some(rest) => (&mut exclude, rest),
                None => (&mut include, pattern.as_str()),
            };
            builder.add(files::compile_glob(pattern)?);
        }

        Ok(PathFilter {
            include: include.build().map_err(|e| invalid("files", &e.to_string()))?,
            exclude: exclude.build().map_err(|e| invalid("files", &e.to_string()))?,
        })
    }

    /// Whether a relative path is watched
    pub fn matches(&self, path: &Path) -> bool {
        self.include.is_match(path) && !self.exclude.is_match(path)
    }
}

/// Settings of one watch target
#[derive(Debug)]
struct WatchSpec {
    filter: PathFilter,
    tasks: Vec<TaskReference>,
    debounce: Duration,
    policy: CoalescePolicy,
    at_begin: bool,
}

impl WatchSpec {
    fn from_invocation(invocation: &Invocation) -> ExecutionResult<Self> {
        let options = &invocation.options;

        let files = options.get_list("files")?;
        if files.is_empty() {
            return Err(ExecutionError::MissingOption("files".to_string()));
        }

        let tasks = options
            .get_list("tasks")?
            .iter()
            .map(|t| t.parse::<TaskReference>().map_err(|e| invalid("tasks", &e.to_string())))
            .collect::<ExecutionResult<Vec<_>>>()?;
        if tasks.is_empty() {
            return Err(ExecutionError::MissingOption("tasks".to_string()));
        }

        let policy = match options.get_str("coalesce")? {
            Some(policy) => policy.parse()?,
            None => CoalescePolicy::default(),
        };

        Ok(WatchSpec {
            filter: PathFilter::new(&files)?,
            tasks,
            debounce: Duration::from_millis(options.get_u64("debounce-delay", DEFAULT_DEBOUNCE_MS)?),
            policy,
            at_begin: options.get_bool("at-begin", false)?,
        })
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Watch;

impl Watch {
    /// Run the target's tasks once; returns false when the watch should stop
    fn rerun(&self, spec: &WatchSpec, ctx: &InvocationContext<'_>) -> ExecutionResult<bool> {
        let report = ctx
            .engine
            .run_references(&spec.tasks, ctx.cancel)
            .map_err(|e| ExecutionError::Watch(e.to_string()))?;

        match report.state {
            RunState::Cancelled(_) => Ok(false),
            RunState::Failed(_) => {
                ctx.context().print_warning("Run failed; still watching.");
                Ok(true)
            }
            _ => Ok(true),
        }
    }

    /// Relative paths of events the filter accepts
    fn relevant(root: &Path, canonical_root: &Path, filter: &PathFilter, paths: Vec<PathBuf>) -> Vec<PathBuf> {
        paths
            .into_iter()
            .filter_map(|path| {
                path.strip_prefix(root)
                    .or_else(|_| path.strip_prefix(canonical_root))
                    .map(Path::to_path_buf)
                    .ok()
            })
            .filter(|relative| filter.matches(relative))
            .collect()
    }
}

impl Capability for Watch {
    fn description(&self) -> &str {
        "Run tasks whenever watched files change"
    }

    fn invoke(&self, invocation: &Invocation, ctx: &InvocationContext<'_>) -> ExecutionResult<()> {
        let spec = WatchSpec::from_invocation(invocation)?;

        // Reject bad references before watching anything
        let planned = ctx
            .engine
            .plan(&spec.tasks)
            .map_err(|e| invalid("tasks", &e.to_string()))?;
        if planned.iter().any(|c| c.task == invocation.task && c.target == invocation.target) {
            return Err(invalid("tasks", &format!("\"{}\" would re-run itself", invocation.label())));
        }

        let root = ctx.working_dir().to_path_buf();
        let canonical_root = std::fs::canonicalize(&root)?;

        let (tx, rx) = mpsc::channel();
        let mut debouncer = new_debouncer(spec.debounce, move |res: DebounceEventResult| {
            let message = res
                .map(|events| events.into_iter().map(|event| event.path).collect::<Vec<_>>())
                .map_err(|e| e.to_string());
            let _ = tx.send(message);
        })
        .map_err(|e| ExecutionError::Watch(e.to_string()))?;

        debouncer
            .watcher()
            .watch(&root, notify::RecursiveMode::Recursive)
            .map_err(|e| ExecutionError::Watch(e.to_string()))?;

        ctx.context().print_info(&format!(
            "Watching {} for changes (debounce {}ms, coalesce {})",
            root.display(),
            spec.debounce.as_millis(),
            spec.policy
        ));

        if spec.at_begin && !self.rerun(&spec, ctx)? {
            return Ok(());
        }

        let mut coalescer = Coalescer::new(spec.policy);

        while !ctx.cancel.is_cancelled() {
            let paths = match rx.recv_timeout(POLL_INTERVAL) {
                Ok(Ok(paths)) => paths,
                Ok(Err(error)) => {
                    warn!(%error, "watch error");
                    ctx.context().print_warning(&format!("Watch error: {}", error));
                    continue;
                }
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(ExecutionError::Watch("file watcher stopped".to_string()));
                }
            };

            let changed = Self::relevant(&root, &canonical_root, &spec.filter, paths);
            if changed.is_empty() || !coalescer.trigger() {
                continue;
            }

            for path in &changed {
                ctx.context().print_info(&format!(">> File \"{}\" changed.", path.display()));
            }

            loop {
                if !self.rerun(&spec, ctx)? {
                    coalescer.reset();
                    break;
                }

                // Changes made while the run was active
                while let Ok(message) = rx.try_recv() {
                    if let Ok(paths) = message {
                        if !Self::relevant(&root, &canonical_root, &spec.filter, paths).is_empty() {
                            coalescer.trigger();
                        }
                    }
                }
                debug!(pending = coalescer.pending(), "run finished");

                if ctx.cancel.is_cancelled() || !coalescer.finish() {
                    break;
                }
            }
        }

        coalescer.reset();
        ctx.context().print_info("Watch stopped.");
        Ok(())
    }
}

fn invalid(name: &str, error: &str) -> ExecutionError {
    ExecutionError::InvalidOption {
        name: name.to_string(),
        error: error.to_string(),
    }
}
