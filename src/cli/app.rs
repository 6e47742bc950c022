//! Main CLI application

use crate::config::{find_config_file, parse_config_file, Project, TaskReference};
use crate::error::{Result, WeaveError};
use crate::runner::{CancelToken, Context, Engine, TaskEntry, Verbosity};
use clap::{Arg, ArgAction, ArgMatches, Command};
use clap_complete::{generate, Shell};
use colored::Colorize;
use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Task run when none is named
pub const DEFAULT_TASK: &str = "default";

/// Build the clap command
pub fn build_command() -> Command {
    Command::new("taskweave")
        .version(env!("CARGO_PKG_VERSION"))
        .about("A declarative, YAML-configured build task orchestrator")
        .arg(
            Arg::new("file")
                .short('f')
                .long("file")
                .value_name("FILE")
                .help("Path to weave.yml config file")
                .global(true),
        )
        .arg(
            Arg::new("quiet")
                .short('q')
                .long("quiet")
                .help("Only print command output and errors")
                .action(ArgAction::SetTrue)
                .global(true),
        )
        .arg(
            Arg::new("silent")
                .short('s')
                .long("silent")
                .help("Print no output")
                .action(ArgAction::SetTrue)
                .global(true),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Print verbose output")
                .action(ArgAction::SetTrue)
                .global(true),
        )
        .arg(
            Arg::new("force")
                .long("force")
                .help("Continue past recoverable task failures")
                .action(ArgAction::SetTrue)
                .global(true),
        )
        .subcommand(
            Command::new("run")
                .about("Run tasks in order (default: the 'default' task)")
                .arg(
                    Arg::new("tasks")
                        .value_name("TASK")
                        .help("Task or task:target references")
                        .num_args(0..),
                ),
        )
        .subcommand(
            Command::new("plan")
                .about("Print the invocations a run would execute")
                .arg(
                    Arg::new("tasks")
                        .value_name("TASK")
                        .help("Task or task:target references")
                        .num_args(0..),
                ),
        )
        .subcommand(Command::new("list").about("List tasks, targets and aliases"))
        .subcommand(
            Command::new("completions")
                .about("Generate a shell completion script")
                .arg(
                    Arg::new("shell")
                        .value_name("SHELL")
                        .required(true)
                        .value_parser(clap::value_parser!(Shell)),
                ),
        )
}

/// Get verbosity level from matches
fn get_verbosity(matches: &ArgMatches) -> Verbosity {
    if matches.get_flag("silent") {
        Verbosity::Silent
    } else if matches.get_flag("quiet") {
        Verbosity::Quiet
    } else if matches.get_flag("verbose") {
        Verbosity::Verbose
    } else {
        Verbosity::Normal
    }
}

fn init_tracing(verbosity: Verbosity) {
    let level = if verbosity == Verbosity::Verbose { "debug" } else { "warn" };
    // A subscriber may already be installed when embedded
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .with_writer(io::stderr)
        .try_init();
}

/// Load the declaration named by `--file` or found from the current directory
fn load_project(file: Option<&String>) -> Result<(Project, PathBuf)> {
    let path = match file {
        Some(path) => PathBuf::from(path),
        None => find_config_file()?,
    };
    let project = parse_config_file(&path)?;
    load_dotenv(&project.base_dir());
    Ok((project, path))
}

fn load_dotenv(dir: &Path) {
    let path = dir.join(".env");
    if !path.is_file() {
        return;
    }
    match dotenvy::from_path(&path) {
        Ok(()) => debug!(path = %path.display(), "loaded environment file"),
        Err(error) => tracing::warn!(path = %path.display(), %error, "failed to load environment file"),
    }
}

/// Task references named on the command line, or the default task
fn references(matches: Option<&ArgMatches>) -> Result<Vec<TaskReference>> {
    let names: Vec<String> = matches
        .and_then(|m| m.get_many::<String>("tasks"))
        .map(|values| values.cloned().collect())
        .unwrap_or_default();

    if names.is_empty() {
        return Ok(vec![TaskReference::bare(DEFAULT_TASK)]);
    }

    names
        .iter()
        .map(|name| name.parse::<TaskReference>().map_err(WeaveError::from))
        .collect()
}

/// Run references as one pipeline, then wait for detached processes
fn run_tasks(engine: &Engine, refs: &[TaskReference]) -> Result<()> {
    let cancel = CancelToken::new();
    engine.run_references(refs, &cancel)?.into_result()?;
    engine.wait_detached()?;
    Ok(())
}

fn print_plan(engine: &Engine, refs: &[TaskReference]) -> Result<()> {
    for (index, candidate) in engine.plan(refs)?.iter().enumerate() {
        println!("{:>3}. {}", index + 1, candidate);
    }
    Ok(())
}

fn print_list(engine: &Engine, project: &ProjectSummary) {
    if let Some(name) = &project.name {
        println!("{}", name.bold());
    }
    if let Some(usage) = &project.usage {
        println!("{}", usage);
    }
    if let Some(path) = &engine.context().config_path {
        println!("{}", format!("Declared in {}", path.display()).dimmed());
    }

    println!("{}", "Tasks:".bold());
    for (name, entry) in engine.registry().entries() {
        match entry {
            TaskEntry::Builtin(capability) => {
                let targets: Vec<&str> = match engine.tree().get(name) {
                    Ok(config) => config.target_names().collect(),
                    Err(_) => Vec::new(),
                };
                if targets.is_empty() {
                    println!("  {:<12} {}", name.green(), capability.description().dimmed());
                } else {
                    println!(
                        "  {:<12} {} [{}]",
                        name.green(),
                        capability.description(),
                        targets.join(", ")
                    );
                }
            }
            TaskEntry::Alias(refs) => {
                let refs: Vec<String> = refs.iter().map(ToString::to_string).collect();
                println!("  {:<12} -> {}", name.cyan(), refs.join(", "));
            }
        }
    }
}

/// Project metadata kept after the engine takes the declaration
struct ProjectSummary {
    name: Option<String>,
    usage: Option<String>,
}

/// Run the CLI application with the process arguments
pub fn run() -> Result<()> {
    run_from(std::env::args_os())
}

/// Run the CLI application with provided arguments
pub fn run_from<I, T>(args: I) -> Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let mut command = build_command();
    let matches = command.clone().get_matches_from(args);

    let verbosity = get_verbosity(&matches);
    init_tracing(verbosity);

    if let Some(("completions", sub)) = matches.subcommand() {
        if let Some(shell) = sub.get_one::<Shell>("shell") {
            generate(*shell, &mut command, "taskweave", &mut io::stdout());
        }
        return Ok(());
    }

    let (project, path) = load_project(matches.get_one::<String>("file"))?;
    debug!(config = %path.display(), tasks = project.tree.task_names().count(), "loaded declaration");

    let summary = ProjectSummary {
        name: project.name.clone(),
        usage: project.usage.clone(),
    };
    let context = Context::new()
        .with_working_dir(project.base_dir())
        .with_config_path(path)
        .with_verbosity(verbosity)
        .with_force(matches.get_flag("force"));
    let engine = Engine::from_project(project, context)?;

    match matches.subcommand() {
        Some(("run", sub)) => run_tasks(&engine, &references(Some(sub))?),
        Some(("plan", sub)) => print_plan(&engine, &references(Some(sub))?),
        Some(("list", _)) => {
            print_list(&engine, &summary);
            Ok(())
        }
        _ => {
            if engine.registry().get(DEFAULT_TASK).is_some() {
                run_tasks(&engine, &references(None)?)
            } else {
                if let Some(usage) = summary.usage {
                    command = command.about(usage);
                }
                command.print_help()?;
                println!();
                Ok(())
            }
        }
    }
}
