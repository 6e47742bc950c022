//! Integration tests for the command-line surface

mod common;

use assert_cmd::Command;
use common::{create_test_config, write_file};
use predicates::prelude::*;

const CONFIG: &str = r#"
name: demo
tasks:
  shell:
    hello:
      command: "echo hello > hello.txt"
    fail:
      command: "exit 5"
  clean:
    tmp: [".tmp/**/*"]
  default: ["shell:hello"]
  broken: ["shell:fail", "shell:hello"]
  loop-a: [loop-b]
  loop-b: [loop-a]
"#;

fn taskweave() -> Command {
    Command::cargo_bin("taskweave").unwrap()
}

#[test]
fn test_no_subcommand_runs_default() {
    let (temp_dir, _) = create_test_config(CONFIG);
    taskweave().current_dir(temp_dir.path()).arg("-s").assert().success();
    assert!(temp_dir.path().join("hello.txt").exists());
}

#[test]
fn test_run_from_subdirectory_uses_declaration_dir() {
    let (temp_dir, _) = create_test_config(CONFIG);
    write_file(temp_dir.path(), "nested/keep.txt", "");
    taskweave()
        .current_dir(temp_dir.path().join("nested"))
        .args(["run", "shell:hello"])
        .assert()
        .success()
        .stderr(predicate::str::contains("Running \"shell:hello\""));
    assert!(temp_dir.path().join("hello.txt").exists());
}

#[test]
fn test_failed_task_exits_one() {
    let (temp_dir, _) = create_test_config(CONFIG);
    taskweave()
        .current_dir(temp_dir.path())
        .args(["run", "broken"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("shell:fail"));
    assert!(!temp_dir.path().join("hello.txt").exists());
}

#[test]
fn test_force_continues() {
    let (temp_dir, _) = create_test_config(CONFIG);
    taskweave()
        .current_dir(temp_dir.path())
        .args(["run", "broken", "--force", "-q"])
        .assert()
        .success();
    assert!(temp_dir.path().join("hello.txt").exists());
}

#[test]
fn test_configuration_errors_exit_two() {
    let (temp_dir, _) = create_test_config(CONFIG);
    taskweave()
        .current_dir(temp_dir.path())
        .args(["run", "uglify"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("uglify"));

    taskweave()
        .current_dir(temp_dir.path())
        .args(["run", "default:x"])
        .assert()
        .code(2);
}

#[test]
fn test_cycle_reported_before_running() {
    let (temp_dir, _) = create_test_config(CONFIG);
    taskweave()
        .current_dir(temp_dir.path())
        .args(["run", "shell:hello"])
        .env("RUST_LOG", "off")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("loop-a -> loop-b -> loop-a").or(predicate::str::contains("loop-b -> loop-a -> loop-b")));
    assert!(!temp_dir.path().join("hello.txt").exists());
}

#[test]
fn test_plan_prints_invocations() {
    let (temp_dir, config_path) = create_test_config(&CONFIG.replace("  loop-a: [loop-b]\n  loop-b: [loop-a]\n", ""));
    taskweave()
        .args(["plan", "default", "shell", "-f"])
        .arg(&config_path)
        .assert()
        .success()
        .stdout(predicate::str::contains("1. shell:hello"))
        .stdout(predicate::str::contains("3. shell:fail"));
    assert!(!temp_dir.path().join("hello.txt").exists());
}

#[test]
fn test_list_shows_tasks_and_aliases() {
    let (_temp_dir, config_path) = create_test_config(&CONFIG.replace("  loop-a: [loop-b]\n  loop-b: [loop-a]\n", ""));
    taskweave()
        .arg("list")
        .arg("--file")
        .arg(&config_path)
        .env("NO_COLOR", "1")
        .assert()
        .success()
        .stdout(predicate::str::contains("demo"))
        .stdout(predicate::str::contains("hello, fail"))
        .stdout(predicate::str::contains("shell:fail, shell:hello"));
}

#[test]
fn test_missing_config_exits_two() {
    let temp_dir = tempfile::TempDir::new().unwrap();
    taskweave()
        .current_dir(temp_dir.path())
        .args(["-f", "nope.yml", "run"])
        .assert()
        .code(2);
}

#[test]
fn test_completions() {
    taskweave()
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("taskweave"));
}
