//! Task Registry
//!
//! Maps task names to built-in capabilities or to aliases, and expands task
//! references into an ordered list of (task, target) candidates.

use crate::config::{ConfigTree, TaskReference};
use crate::error::{ConfigError, ConfigResult};
use crate::tasks::Capability;
use indexmap::IndexMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// What a task name is bound to
#[derive(Clone)]
pub enum TaskEntry {
    /// A capability implementation
    Builtin(Arc<dyn Capability>),

    /// An ordered list of other task references
    Alias(Vec<TaskReference>),
}

impl fmt::Debug for TaskEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskEntry::Builtin(capability) => write!(f, "Builtin({})", capability.description()),
            TaskEntry::Alias(refs) => f.debug_tuple("Alias").field(refs).finish(),
        }
    }
}

/// One expanded (task, target) pair, not yet resolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub task: String,
    pub target: String,
}

impl Candidate {
    pub fn new(task: impl Into<String>, target: impl Into<String>) -> Self {
        Candidate {
            task: task.into(),
            target: target.into(),
        }
    }
}

impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.task, self.target)
    }
}

/// Registered tasks
///
/// Populated at startup: built-ins first, then declared aliases, with later
/// registrations shadowing earlier ones of the same name. The engine takes
/// ownership afterwards, so the registry is never modified during a run.
#[derive(Debug, Clone, Default)]
pub struct TaskRegistry {
    entries: IndexMap<String, TaskEntry>,
}

impl TaskRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a name to a capability; the last registration wins
    pub fn register(&mut self, name: impl Into<String>, capability: impl Capability + 'static) {
        self.register_arc(name, Arc::new(capability));
    }

    /// Bind a name to a shared capability
    pub fn register_arc(&mut self, name: impl Into<String>, capability: Arc<dyn Capability>) {
        let name = name.into();
        debug!(task = %name, "registering capability");
        self.entries.insert(name, TaskEntry::Builtin(capability));
    }

    /// Bind a name to an ordered list of references
    pub fn register_alias(&mut self, name: impl Into<String>, refs: Vec<TaskReference>) {
        let name = name.into();
        debug!(task = %name, refs = refs.len(), "registering alias");
        self.entries.insert(name, TaskEntry::Alias(refs));
    }

    /// Look up a task
    pub fn get(&self, name: &str) -> Option<&TaskEntry> {
        self.entries.get(name)
    }

    /// Capability bound to a name, if it is a built-in
    pub fn capability(&self, name: &str) -> Option<Arc<dyn Capability>> {
        match self.entries.get(name) {
            Some(TaskEntry::Builtin(capability)) => Some(Arc::clone(capability)),
            _ => None,
        }
    }

    /// All registered entries in registration order
    pub fn entries(&self) -> impl Iterator<Item = (&str, &TaskEntry)> {
        self.entries.iter().map(|(name, entry)| (name.as_str(), entry))
    }

    /// Expand a reference into candidates, depth-first and left-to-right
    pub fn expand(&self, reference: &TaskReference, tree: &ConfigTree) -> ConfigResult<Vec<Candidate>> {
        let mut path = Vec::new();
        let mut out = Vec::new();
        self.expand_into(reference, tree, &mut path, &mut out)?;
        Ok(out)
    }

    /// Expand several references in order into one list
    pub fn expand_all(&self, refs: &[TaskReference], tree: &ConfigTree) -> ConfigResult<Vec<Candidate>> {
        let mut out = Vec::new();
        for reference in refs {
            out.extend(self.expand(reference, tree)?);
        }
        Ok(out)
    }

    /// Expand every alias and check every configured task, without running anything
    pub fn validate(&self, tree: &ConfigTree) -> ConfigResult<()> {
        for (name, entry) in &self.entries {
            if let TaskEntry::Alias(_) = entry {
                self.expand(&TaskReference::bare(name.as_str()), tree)?;
            }
        }

        for task in tree.task_names() {
            if self.get(task).is_none() {
                tracing::warn!(task, "configuration for a task that is not registered");
            }
        }

        Ok(())
    }

    fn expand_into(
        &self,
        reference: &TaskReference,
        tree: &ConfigTree,
        path: &mut Vec<String>,
        out: &mut Vec<Candidate>,
    ) -> ConfigResult<()> {
        let name = reference.task.as_str();
        let entry = self
            .entries
            .get(name)
            .ok_or_else(|| ConfigError::UnknownTask(name.to_string()))?;

        match entry {
            TaskEntry::Alias(refs) => {
                if reference.target.is_some() {
                    return Err(ConfigError::InvalidReference(format!(
                        "'{}' qualifies alias '{}' with a target",
                        reference, name
                    )));
                }

                if let Some(pos) = path.iter().position(|seen| seen == name) {
                    let mut chain = path[pos..].to_vec();
                    chain.push(name.to_string());
                    return Err(ConfigError::CyclicAlias(chain.join(" -> ")));
                }

                path.push(name.to_string());
                for child in refs {
                    self.expand_into(child, tree, path, out)?;
                }
                path.pop();
            }
            TaskEntry::Builtin(_) => {
                let config = tree.get(name)?;
                match &reference.target {
                    Some(target) => {
                        if !config.has_target(target) {
                            return Err(ConfigError::TargetNotFound {
                                task: name.to_string(),
                                target: target.clone(),
                            });
                        }
                        out.push(Candidate::new(name, target.as_str()));
                    }
                    None => {
                        let before = out.len();
                        out.extend(config.target_names().map(|target| Candidate::new(name, target)));
                        if out.len() == before {
                            return Err(ConfigError::NoTargets(name.to_string()));
                        }
                    }
                }
            }
        }

        Ok(())
    }
}
