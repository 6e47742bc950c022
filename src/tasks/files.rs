//! Source/destination file mappings
//!
//! File-based capabilities accept three declaration formats:
//!
//! - compact: `src` (and optionally `dest`) directly on the target
//! - files array: `files: [{cwd, src, dest, expand, flatten, filter, nonull}]`
//! - files object: `files: {dest: src}`
//!
//! Patterns support `*`, `?`, `**`, `{a,b}` alternation and `!` exclusion.
//! An empty match set is not an error unless `nonull` is set.

use crate::config::{value_to_list, TargetOptions};
use crate::error::{ExecutionError, ExecutionResult};
use glob::{MatchOptions, Pattern};
use globset::{Glob, GlobBuilder, GlobMatcher};
use serde_yaml::{Mapping, Value};
use std::path::{Path, PathBuf};

/// Which kinds of matched paths to keep
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Filter {
    #[default]
    Any,
    IsFile,
    IsDirectory,
}

impl Filter {
    fn parse(value: Option<&str>) -> ExecutionResult<Self> {
        match value {
            None => Ok(Filter::Any),
            Some("isFile") => Ok(Filter::IsFile),
            Some("isDirectory") => Ok(Filter::IsDirectory),
            Some(other) => Err(ExecutionError::InvalidOption {
                name: "filter".to_string(),
                error: format!("unknown filter '{}', expected isFile or isDirectory", other),
            }),
        }
    }

    fn keeps(self, path: &Path) -> bool {
        match self {
            Filter::Any => true,
            Filter::IsFile => path.is_file(),
            Filter::IsDirectory => path.is_dir(),
        }
    }
}

/// One declared group of sources and an optional destination
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FileSpec {
    pub cwd: Option<String>,
    pub src: Vec<String>,
    pub dest: Option<String>,
    pub expand: bool,
    pub flatten: bool,
    pub filter: Filter,
    pub nonull: bool,
}

impl FileSpec {
    fn from_mapping(map: &Mapping) -> ExecutionResult<Self> {
        let options = TargetOptions(map.clone());
        Ok(FileSpec {
            cwd: options.get_str("cwd")?,
            src: options.get_list("src")?,
            dest: options.get_str("dest")?,
            expand: options.get_bool("expand", false)?,
            flatten: options.get_bool("flatten", false)?,
            filter: Filter::parse(options.get_str("filter")?.as_deref())?,
            nonull: options.get_bool("nonull", false)?,
        })
    }
}

/// A matched source path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    /// Absolute (working-directory-joined) path
    pub path: PathBuf,

    /// Path relative to the group's `cwd`
    pub relative: PathBuf,
}

/// Sources and where they go
#[derive(Debug, Clone, PartialEq)]
pub struct FileMapping {
    pub sources: Vec<SourceFile>,

    /// Destination; `None` means in place
    pub dest: Option<PathBuf>,

    /// Destination was written with a trailing `/`
    pub dest_is_dir: bool,
}

/// Read the file groups declared on a target
pub fn file_specs(options: &TargetOptions) -> ExecutionResult<Vec<FileSpec>> {
    if options.contains("src") || options.contains("dest") {
        return Ok(vec![FileSpec::from_mapping(&options.0)?]);
    }

    match options.get("files") {
        None => Ok(Vec::new()),
        Some(Value::Sequence(groups)) => groups
            .iter()
            .map(|group| match group {
                Value::Mapping(map) => FileSpec::from_mapping(map),
                _ => Err(invalid_files("each entry of 'files' must be a mapping")),
            })
            .collect(),
        Some(Value::Mapping(map)) => map
            .iter()
            .map(|(dest, src)| {
                let dest = dest
                    .as_str()
                    .ok_or_else(|| invalid_files("destination keys must be strings"))?;
                let src = value_to_list(src)
                    .ok_or_else(|| invalid_files("sources must be a string or list of strings"))?;
                Ok(FileSpec {
                    src,
                    dest: Some(dest.to_string()),
                    ..FileSpec::default()
                })
            })
            .collect(),
        Some(_) => Err(invalid_files("expected a list or a mapping")),
    }
}

/// Resolve every file group of a target against the working directory
pub fn resolve_mappings(options: &TargetOptions, working_dir: &Path) -> ExecutionResult<Vec<FileMapping>> {
    let mut mappings = Vec::new();

    for spec in file_specs(options)? {
        let base = match &spec.cwd {
            Some(cwd) => working_dir.join(cwd),
            None => working_dir.to_path_buf(),
        };

        let sources: Vec<SourceFile> = expand_patterns(&base, &spec.src, spec.nonull)?
            .into_iter()
            .map(|relative| SourceFile {
                path: base.join(&relative),
                relative,
            })
            .filter(|source| spec.filter.keeps(&source.path))
            .collect();

        let dest_is_dir = spec.dest.as_deref().is_some_and(|d| d.ends_with('/'));
        let dest = spec.dest.as_deref().map(|d| working_dir.join(d));

        if spec.expand {
            for source in sources {
                let dest = dest.as_ref().map(|dir| {
                    if spec.flatten {
                        dir.join(source.relative.file_name().unwrap_or_default())
                    } else {
                        dir.join(&source.relative)
                    }
                });
                mappings.push(FileMapping {
                    sources: vec![source],
                    dest,
                    dest_is_dir: false,
                });
            }
        } else {
            let sources = if spec.flatten {
                sources
                    .into_iter()
                    .map(|source| SourceFile {
                        relative: PathBuf::from(source.relative.file_name().unwrap_or_default()),
                        path: source.path,
                    })
                    .collect()
            } else {
                sources
            };
            mappings.push(FileMapping {
                sources,
                dest,
                dest_is_dir,
            });
        }
    }

    Ok(mappings)
}

/// All matched source paths of a target, de-duplicated, in match order
pub fn resolve_sources(options: &TargetOptions, working_dir: &Path) -> ExecutionResult<Vec<PathBuf>> {
    let mut paths: Vec<PathBuf> = Vec::new();
    for mapping in resolve_mappings(options, working_dir)? {
        for source in mapping.sources {
            if !paths.contains(&source.path) {
                paths.push(source.path);
            }
        }
    }
    Ok(paths)
}

/// Match patterns under `base`, returning paths relative to it
///
/// Patterns apply in order: a `!` pattern removes what earlier patterns
/// matched. Within one pattern, paths come in directory walk order.
pub fn expand_patterns(base: &Path, patterns: &[String], nonull: bool) -> ExecutionResult<Vec<PathBuf>> {
    let mut matched: Vec<PathBuf> = Vec::new();

    for pattern in patterns {
        if let Some(excluded) = pattern.strip_prefix('!') {
            let matcher = compile_glob(excluded)?.compile_matcher();
            matched.retain(|path| !matcher.is_match(path));
            continue;
        }

        let pattern = pattern.trim_start_matches("./");
        let found = if is_glob(pattern) {
            glob_relative(base, pattern, &compile_glob(pattern)?.compile_matcher())?
        } else {
            let literal = pattern.trim_end_matches('/');
            if base.join(literal).exists() {
                vec![PathBuf::from(literal)]
            } else {
                Vec::new()
            }
        };

        if found.is_empty() && nonull {
            return Err(if is_glob(pattern) {
                ExecutionError::NoMatches(pattern.to_string())
            } else {
                ExecutionError::MissingInput(base.join(pattern))
            });
        }

        for path in found {
            if !matched.contains(&path) {
                matched.push(path);
            }
        }
    }

    Ok(matched)
}

/// Compile one source pattern; `*` and `?` never cross a `/`
pub fn compile_glob(pattern: &str) -> ExecutionResult<Glob> {
    GlobBuilder::new(pattern.trim_start_matches("./"))
        .literal_separator(true)
        .build()
        .map_err(|e| ExecutionError::InvalidOption {
            name: "src".to_string(),
            error: format!("invalid pattern '{}': {}", pattern, e),
        })
}

/// Walk everything below the pattern's literal directory prefix and keep
/// what the matcher accepts
///
/// Hidden entries are only visited when the pattern names a dot segment.
fn glob_relative(base: &Path, pattern: &str, matcher: &GlobMatcher) -> ExecutionResult<Vec<PathBuf>> {
    let prefix: Vec<&str> = pattern
        .split('/')
        .take_while(|segment| !is_glob(segment))
        .collect();
    let hidden = pattern
        .split('/')
        .any(|segment| segment.starts_with('.') && segment != "." && segment != "..");

    let options = MatchOptions {
        case_sensitive: true,
        require_literal_separator: true,
        require_literal_leading_dot: !hidden,
    };

    let root = prefix.iter().fold(base.to_path_buf(), |dir, segment| dir.join(segment));
    let walk = format!("{}/**/*", Pattern::escape(root.to_string_lossy().trim_end_matches('/')));
    let entries = glob::glob_with(&walk, options).map_err(|e| ExecutionError::InvalidOption {
        name: "src".to_string(),
        error: format!("invalid pattern '{}': {}", pattern, e),
    })?;

    let mut found = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| ExecutionError::Io(e.into_error()))?;
        let Ok(relative) = path.strip_prefix(base) else {
            continue;
        };
        if !relative.as_os_str().is_empty() && matcher.is_match(relative) {
            found.push(relative.to_path_buf());
        }
    }
    Ok(found)
}

/// Whether a pattern contains glob syntax
pub fn is_glob(pattern: &str) -> bool {
    pattern.contains(['*', '?', '[', '{'])
}

fn invalid_files(error: &str) -> ExecutionError {
    ExecutionError::InvalidOption {
        name: "files".to_string(),
        error: error.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn options(yaml: &str) -> TargetOptions {
        TargetOptions(serde_yaml::from_str(yaml).unwrap())
    }

    fn tree() -> TempDir {
        let dir = TempDir::new().unwrap();
        for file in [
            "src/a.js",
            "src/b.js",
            "src/grammar.pegjs",
            "src/demo/index.html",
            "src/demo/demo.css",
            "src/.hidden.js",
        ] {
            let path = dir.path().join(file);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, file).unwrap();
        }
        dir
    }

    fn rel(paths: &[PathBuf]) -> Vec<String> {
        paths.iter().map(|p| p.to_string_lossy().replace('\\', "/")).collect()
    }

    #[test]
    fn test_patterns_and_exclusions() {
        let dir = tree();
        let found = expand_patterns(
            dir.path(),
            &["src/*.js".to_string(), "src/*.pegjs".to_string(), "!src/b.js".to_string()],
            false,
        )
        .unwrap();
        assert_eq!(rel(&found), vec!["src/a.js", "src/grammar.pegjs"]);
    }

    #[test]
    fn test_recursive_brace_pattern_skips_dotfiles() {
        let dir = tree();
        let found = expand_patterns(dir.path(), &["src/**/*.{html,css}".to_string()], false).unwrap();
        assert_eq!(rel(&found), vec!["src/demo/demo.css", "src/demo/index.html"]);

        let found = expand_patterns(dir.path(), &["src/*".to_string()], false).unwrap();
        assert!(!rel(&found).contains(&"src/.hidden.js".to_string()));
        let found = expand_patterns(dir.path(), &["src/.*.js".to_string()], false).unwrap();
        assert_eq!(rel(&found), vec!["src/.hidden.js"]);
    }

    #[test]
    fn test_alternation_is_one_pattern_for_nonull() {
        let dir = tree();
        let found = expand_patterns(dir.path(), &["src/{a,missing}.js".to_string()], true).unwrap();
        assert_eq!(rel(&found), vec!["src/a.js"]);

        let result = expand_patterns(dir.path(), &["src/{x,y}.js".to_string()], true);
        assert!(matches!(result, Err(ExecutionError::NoMatches(p)) if p == "src/{x,y}.js"));
    }

    #[test]
    fn test_exclusion_with_alternation() {
        let dir = tree();
        let found = expand_patterns(
            dir.path(),
            &["src/**/*".to_string(), "!src/**/*.{js,css}".to_string()],
            false,
        )
        .unwrap();
        let mut found = rel(&found);
        found.sort();
        assert_eq!(found, vec!["src/demo", "src/demo/index.html", "src/grammar.pegjs"]);
    }

    #[test]
    fn test_empty_match_is_not_an_error() {
        let dir = tree();
        let found = expand_patterns(dir.path(), &["out/*.js".to_string()], false).unwrap();
        assert!(found.is_empty());
    }

    #[test]
    fn test_nonull_literal_missing() {
        let dir = tree();
        let result = expand_patterns(dir.path(), &["src/missing.js".to_string()], true);
        assert!(matches!(result, Err(ExecutionError::MissingInput(_))));

        let result = expand_patterns(dir.path(), &["out/*.js".to_string()], true);
        assert!(matches!(result, Err(ExecutionError::NoMatches(_))));
    }

    #[test]
    fn test_compact_format() {
        let specs = file_specs(&options("src: [a.js]\ndest: out.js")).unwrap();
        assert_eq!(specs.len(), 1);
        assert_eq!(specs[0].src, vec!["a.js"]);
        assert_eq!(specs[0].dest.as_deref(), Some("out.js"));
    }

    #[test]
    fn test_files_object_format() {
        let specs = file_specs(&options(
            r#"
files:
  dist/min.js: [dist/full.js]
  dist/other.js: dist/x.js
"#,
        ))
        .unwrap();
        assert_eq!(specs.len(), 2);
        assert_eq!(specs[0].dest.as_deref(), Some("dist/min.js"));
        assert_eq!(specs[1].src, vec!["dist/x.js"]);
    }

    #[test]
    fn test_no_files_declared() {
        assert!(file_specs(&options("banner: x")).unwrap().is_empty());
        assert!(file_specs(&options("files: 3")).is_err());
    }

    #[test]
    fn test_expanded_mapping_with_cwd() {
        let dir = tree();
        let mappings = resolve_mappings(
            &options(
                r#"
files:
  - expand: true
    cwd: src/
    src: ["*.js"]
    dest: lib/
    filter: isFile
"#,
            ),
            dir.path(),
        )
        .unwrap();

        assert_eq!(mappings.len(), 2);
        assert_eq!(mappings[0].sources[0].path, dir.path().join("src/").join("a.js"));
        assert_eq!(mappings[0].dest, Some(dir.path().join("lib/").join("a.js")));
    }

    #[test]
    fn test_flattened_mapping() {
        let dir = tree();
        let mappings = resolve_mappings(
            &options(
                r#"
files:
  - src: [src/demo/index.html]
    expand: true
    flatten: true
    dest: .tmp/
"#,
            ),
            dir.path(),
        )
        .unwrap();
        assert_eq!(mappings[0].dest, Some(dir.path().join(".tmp/").join("index.html")));
    }

    #[test]
    fn test_filter_directories() {
        let dir = tree();
        let sources = resolve_sources(&options("src: [\"src/*\"]\nfilter: isDirectory"), dir.path()).unwrap();
        assert_eq!(sources, vec![dir.path().join("src/demo")]);
    }

    #[test]
    fn test_unknown_filter() {
        let dir = tree();
        let result = resolve_sources(&options("src: [\"src/*\"]\nfilter: isSocket"), dir.path());
        assert!(matches!(result, Err(ExecutionError::InvalidOption { .. })));
    }
}
