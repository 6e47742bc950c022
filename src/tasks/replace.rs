//! `replace`: substitute marked tokens in files
//!
//! Each pattern's `match` is looked up literally, prefixed with `prefix`
//! (default `@@`) unless `use-prefix: false`. Structured replacements are
//! written as JSON.

use crate::error::{ExecutionError, ExecutionResult};
use crate::runner::{Invocation, InvocationContext};
use crate::tasks::{ensure_parent, files, Capability};
use serde_yaml::Value;
use std::fs;
use std::path::PathBuf;
use tracing::debug;

const DEFAULT_PREFIX: &str = "@@";

/// A prefixed token and the text that replaces it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    token: String,
    replacement: String,
}

impl Pattern {
    pub fn new(token: &str, prefix: &str, replacement: String) -> ExecutionResult<Self> {
        let token = format!("{}{}", prefix, token);
        if token.is_empty() {
            return Err(invalid("'match' must not be empty"));
        }
        Ok(Pattern { token, replacement })
    }

    /// Apply to a text, returning the new text and the replacement count
    pub fn apply(&self, text: &str) -> (String, usize) {
        let count = text.matches(self.token.as_str()).count();
        if count == 0 {
            return (text.to_string(), 0);
        }
        (text.replace(self.token.as_str(), &self.replacement), count)
    }
}

/// Read the `patterns` option
pub fn parse_patterns(invocation: &Invocation) -> ExecutionResult<Vec<Pattern>> {
    let options = &invocation.options;
    let prefix = if options.get_bool("use-prefix", true)? {
        options
            .get_str("prefix")?
            .unwrap_or_else(|| DEFAULT_PREFIX.to_string())
    } else {
        String::new()
    };

    let entries = match options.get("patterns") {
        None => return Err(ExecutionError::MissingOption("patterns".to_string())),
        Some(Value::Sequence(entries)) => entries,
        Some(_) => return Err(invalid("expected a list of {match, replacement}")),
    };

    entries
        .iter()
        .map(|entry| {
            let token = entry
                .get("match")
                .and_then(Value::as_str)
                .ok_or_else(|| invalid("each pattern needs a string 'match'"))?;
            let replacement = match entry.get("replacement") {
                None | Some(Value::Null) => String::new(),
                Some(Value::String(s)) => s.clone(),
                Some(Value::Number(n)) => n.to_string(),
                Some(Value::Bool(b)) => b.to_string(),
                Some(other) => serde_json::to_string(other).map_err(|e| invalid(&e.to_string()))?,
            };
            Pattern::new(token, &prefix, replacement)
        })
        .collect()
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Replace;

impl Capability for Replace {
    fn description(&self) -> &str {
        "Replace tokens in files"
    }

    fn invoke(&self, invocation: &Invocation, ctx: &InvocationContext<'_>) -> ExecutionResult<()> {
        let patterns = parse_patterns(invocation)?;

        for mapping in files::resolve_mappings(&invocation.options, ctx.working_dir())? {
            let rename = mapping.sources.len() == 1 && !mapping.dest_is_dir;

            for source in mapping.sources.iter().filter(|s| s.path.is_file()) {
                let output: PathBuf = match &mapping.dest {
                    Some(dest) if rename && !dest.is_dir() => dest.clone(),
                    Some(dest) => dest.join(&source.relative),
                    None => source.path.clone(),
                };

                let mut text = fs::read_to_string(&source.path)?;
                let mut total = 0;
                for pattern in &patterns {
                    let (replaced, count) = pattern.apply(&text);
                    text = replaced;
                    total += count;
                }

                ensure_parent(&output)?;
                fs::write(&output, text)?;
                debug!(from = %source.path.display(), to = %output.display(), replacements = total, "replaced");
            }
        }

        Ok(())
    }
}

fn invalid(error: &str) -> ExecutionError {
    ExecutionError::InvalidOption {
        name: "patterns".to_string(),
        error: error.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::testing::{engine_in, run};
    use tempfile::TempDir;

    #[test]
    fn test_pattern_is_literal() {
        let pattern = Pattern::new("a.b", "@@", "$1".to_string()).unwrap();
        let (text, count) = pattern.apply("x @@a.b y @@aXb");
        assert_eq!(text, "x $1 y @@aXb");
        assert_eq!(count, 1);
    }

    #[test]
    fn test_empty_token_rejected() {
        assert!(Pattern::new("", "", "x".to_string()).is_err());
        assert!(Pattern::new("", "@@", "x".to_string()).is_ok());
    }

    #[test]
    fn test_replace_in_place_with_version() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("dist")).unwrap();
        fs::write(dir.path().join("dist/sqlite-parser.js"), "v = '@@VERSION';").unwrap();
        fs::write(dir.path().join("dist/other.js"), "@@VERSION").unwrap();

        let engine = engine_in(
            dir.path(),
            r#"
data:
  pkg: {version: 1.0.0}
tasks:
  replace:
    options:
      patterns:
        - match: VERSION
          replacement: "<%= pkg.version %>"
    dist:
      files:
        - expand: true
          cwd: dist/
          src: "sqlite-parser*.js"
          dest: dist/
"#,
        );
        assert!(run(&engine, "replace:dist").succeeded());
        assert_eq!(
            fs::read_to_string(dir.path().join("dist/sqlite-parser.js")).unwrap(),
            "v = '1.0.0';"
        );
        assert_eq!(fs::read_to_string(dir.path().join("dist/other.js")).unwrap(), "@@VERSION");
    }

    #[test]
    fn test_replace_without_prefix_to_dest() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("in.json"), "{\"cfg\": CONFIG}").unwrap();

        let engine = engine_in(
            dir.path(),
            r#"
tasks:
  replace:
    json:
      use-prefix: false
      patterns:
        - match: CONFIG
          replacement: {debug: true}
      src: in.json
      dest: out.json
"#,
        );
        assert!(run(&engine, "replace:json").succeeded());
        assert_eq!(
            fs::read_to_string(dir.path().join("out.json")).unwrap(),
            "{\"cfg\": {\"debug\":true}}"
        );
        assert!(dir.path().join("in.json").exists());
    }

    #[test]
    fn test_replace_requires_patterns() {
        let dir = TempDir::new().unwrap();
        let engine = engine_in(dir.path(), "tasks:\n  replace:\n    x: [\"*.js\"]\n");
        let report = run(&engine, "replace:x");
        assert!(matches!(
            report.failure.unwrap().cause,
            ExecutionError::MissingOption(_)
        ));
    }
}
