//! Template interpolation for option values
//!
//! Placeholders use the `<%= expr %>` syntax. An expression is either a
//! dotted path into the data namespace (`pkg.version`, `files.0`) or a call
//! to one of a fixed set of built-in functions (`today("yyyy")`,
//! `env("HOME")`). Anything else is a syntax error; there is no general
//! expression evaluation.

use crate::error::{InterpolationError, InterpolationResult};
use chrono::{DateTime, Local};
use regex::Regex;
use serde_yaml::{Mapping, Value};
use std::env;
use std::sync::OnceLock;

const OPEN: &str = "<%=";

/// Maximum nesting of placeholders that resolve to further placeholders
const MAX_DEPTH: usize = 16;

/// Read-only inputs to interpolation
#[derive(Debug, Clone)]
pub struct TemplateContext<'a> {
    data: &'a Value,
    now: DateTime<Local>,
}

impl<'a> TemplateContext<'a> {
    /// Context over a data namespace, with "now" captured at creation
    pub fn new(data: &'a Value) -> Self {
        TemplateContext {
            data,
            now: Local::now(),
        }
    }

    /// Pin the time used by date functions
    pub fn with_now(mut self, now: DateTime<Local>) -> Self {
        self.now = now;
        self
    }
}

/// Built-in template functions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Builtin {
    /// Current date formatted with a date mask
    Today,
    /// Environment variable
    Env,
}

impl Builtin {
    fn from_name(name: &str) -> InterpolationResult<Self> {
        match name {
            "today" | "template.today" | "grunt.template.today" => Ok(Builtin::Today),
            "env" => Ok(Builtin::Env),
            _ => Err(InterpolationError::UnknownFunction(name.to_string())),
        }
    }

    fn call(self, args: &[String], ctx: &TemplateContext<'_>) -> InterpolationResult<Value> {
        match (self, args) {
            (Builtin::Today, []) => Ok(Value::String(ctx.now.format("%Y-%m-%d").to_string())),
            (Builtin::Today, [mask]) => Ok(Value::String(
                ctx.now.format(&date_mask_to_strftime(mask)).to_string(),
            )),
            (Builtin::Env, [name]) => env::var(name)
                .map(Value::String)
                .map_err(|_| InterpolationError::UndefinedVariable(format!("env.{}", name))),
            (builtin, _) => Err(InterpolationError::InvalidSyntax(format!(
                "wrong number of arguments to {:?}",
                builtin
            ))),
        }
    }
}

/// A parsed placeholder expression
#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Path(Vec<String>),
    Call { name: String, args: Vec<String> },
}

/// Interpolate all placeholders in a string
pub fn interpolate(s: &str, ctx: &TemplateContext<'_>) -> InterpolationResult<String> {
    interpolate_at(s, ctx, 0)
}

/// Interpolate a value recursively through sequences and mappings
///
/// Non-string leaves are returned unchanged. A string made of exactly one
/// placeholder that resolves to a sequence or mapping yields that value.
pub fn interpolate_value(value: &Value, ctx: &TemplateContext<'_>) -> InterpolationResult<Value> {
    interpolate_value_at(value, ctx, 0)
}

/// Interpolate every value of a mapping
pub fn interpolate_mapping(map: &Mapping, ctx: &TemplateContext<'_>) -> InterpolationResult<Mapping> {
    map.iter()
        .map(|(key, value)| Ok((key.clone(), interpolate_value(value, ctx)?)))
        .collect()
}

fn interpolate_value_at(
    value: &Value,
    ctx: &TemplateContext<'_>,
    depth: usize,
) -> InterpolationResult<Value> {
    if depth > MAX_DEPTH {
        return Err(InterpolationError::RecursiveInterpolation);
    }

    match value {
        Value::String(s) => match sole_placeholder(s) {
            Some(expr) => {
                let resolved = evaluate(&parse_expression(expr)?, expr, ctx)?;
                match resolved {
                    Value::Sequence(_) | Value::Mapping(_) => {
                        interpolate_value_at(&resolved, ctx, depth + 1)
                    }
                    scalar => {
                        let text = render(expr, &scalar)?;
                        Ok(Value::String(interpolate_at(&text, ctx, depth + 1)?))
                    }
                }
            }
            None => Ok(Value::String(interpolate_at(s, ctx, depth)?)),
        },
        Value::Sequence(seq) => seq
            .iter()
            .map(|item| interpolate_value_at(item, ctx, depth))
            .collect::<InterpolationResult<Vec<_>>>()
            .map(Value::Sequence),
        Value::Mapping(map) => map
            .iter()
            .map(|(k, v)| Ok((k.clone(), interpolate_value_at(v, ctx, depth)?)))
            .collect::<InterpolationResult<Mapping>>()
            .map(Value::Mapping),
        other => Ok(other.clone()),
    }
}

/// Matches one `<%= expr %>` placeholder, capturing the expression
fn placeholder() -> &'static Regex {
    static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
    PLACEHOLDER.get_or_init(|| Regex::new(r"(?s)<%=(.*?)%>").expect("placeholder pattern is valid"))
}

fn interpolate_at(s: &str, ctx: &TemplateContext<'_>, depth: usize) -> InterpolationResult<String> {
    if depth > MAX_DEPTH {
        return Err(InterpolationError::RecursiveInterpolation);
    }
    if !s.contains(OPEN) {
        return Ok(s.to_string());
    }

    let mut out = String::with_capacity(s.len());
    let mut last = 0;

    for caps in placeholder().captures_iter(s) {
        let (Some(whole), Some(inner)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        out.push_str(&s[last..whole.start()]);

        let expr = inner.as_str().trim();
        let value = evaluate(&parse_expression(expr)?, expr, ctx)?;
        out.push_str(&interpolate_at(&render(expr, &value)?, ctx, depth + 1)?);
        last = whole.end();
    }

    let tail = &s[last..];
    if tail.contains(OPEN) {
        return Err(InterpolationError::InvalidSyntax(format!(
            "unterminated placeholder in '{}'",
            s
        )));
    }
    out.push_str(tail);

    Ok(out)
}

/// The expression of a string that is exactly one placeholder
fn sole_placeholder(s: &str) -> Option<&str> {
    let caps = placeholder().captures(s)?;
    let whole = caps.get(0)?;
    if whole.start() != 0 || whole.end() != s.len() {
        return None;
    }
    Some(caps.get(1)?.as_str().trim())
}

fn parse_expression(expr: &str) -> InterpolationResult<Expr> {
    let syntax = |reason: &str| InterpolationError::InvalidSyntax(format!("'{}': {}", expr, reason));

    if expr.is_empty() {
        return Err(syntax("empty expression"));
    }

    if let Some(body) = expr.strip_suffix(')') {
        let (name, args) = body.split_once('(').ok_or_else(|| syntax("unbalanced ')'"))?;
        let name = name.trim();
        if !is_dotted_name(name) {
            return Err(syntax("invalid function name"));
        }
        return Ok(Expr::Call {
            name: name.to_string(),
            args: parse_args(args).ok_or_else(|| syntax("arguments must be quoted strings"))?,
        });
    }

    if !is_dotted_name(expr) {
        return Err(syntax("expected a dotted path or a function call"));
    }
    Ok(Expr::Path(expr.split('.').map(str::to_string).collect()))
}

fn is_dotted_name(s: &str) -> bool {
    !s.is_empty()
        && s.split('.').all(|segment| {
            !segment.is_empty()
                && segment
                    .chars()
                    .all(|c| c.is_alphanumeric() || c == '_' || c == '-' || c == '$')
        })
}

/// Parse a comma-separated list of single- or double-quoted string literals
fn parse_args(src: &str) -> Option<Vec<String>> {
    let mut args = Vec::new();
    let mut chars = src.trim().chars().peekable();

    while chars.peek().is_some() {
        let quote = chars.next().filter(|c| *c == '"' || *c == '\'')?;
        let mut arg = String::new();
        loop {
            match chars.next()? {
                c if c == quote => break,
                c => arg.push(c),
            }
        }
        args.push(arg);

        while chars.peek().is_some_and(|c| c.is_whitespace()) {
            chars.next();
        }
        match chars.next() {
            None => break,
            Some(',') => {
                while chars.peek().is_some_and(|c| c.is_whitespace()) {
                    chars.next();
                }
                chars.peek()?;
            }
            Some(_) => return None,
        }
    }

    Some(args)
}

fn evaluate(expr: &Expr, source: &str, ctx: &TemplateContext<'_>) -> InterpolationResult<Value> {
    match expr {
        Expr::Path(segments) => lookup(ctx.data, segments)
            .filter(|v| !v.is_null())
            .cloned()
            .ok_or_else(|| InterpolationError::UndefinedVariable(source.to_string())),
        Expr::Call { name, args } => Builtin::from_name(name)?.call(args, ctx),
    }
}

fn lookup<'v>(data: &'v Value, segments: &[String]) -> Option<&'v Value> {
    segments.iter().try_fold(data, |current, segment| match current {
        Value::Mapping(map) => map.get(segment.as_str()),
        Value::Sequence(seq) => segment.parse::<usize>().ok().and_then(|i| seq.get(i)),
        _ => None,
    })
}

/// Render a resolved value as text
fn render(expr: &str, value: &Value) -> InterpolationResult<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Sequence(seq) => seq
            .iter()
            .map(|item| render(expr, item))
            .collect::<InterpolationResult<Vec<_>>>()
            .map(|items| items.join(",")),
        Value::Null => Err(InterpolationError::UndefinedVariable(expr.to_string())),
        Value::Mapping(_) | Value::Tagged(_) => Err(InterpolationError::InvalidSyntax(format!(
            "'{}' does not resolve to text",
            expr
        ))),
    }
}

/// Translate a date mask (`yyyy-mm-dd HH:MM`) into a strftime format
pub fn date_mask_to_strftime(mask: &str) -> String {
    const TOKENS: &[(&str, &str)] = &[
        ("yyyy", "%Y"),
        ("yy", "%y"),
        ("mmmm", "%B"),
        ("mmm", "%b"),
        ("mm", "%m"),
        ("m", "%-m"),
        ("dddd", "%A"),
        ("ddd", "%a"),
        ("dd", "%d"),
        ("d", "%-d"),
        ("HH", "%H"),
        ("H", "%-H"),
        ("hh", "%I"),
        ("h", "%-I"),
        ("MM", "%M"),
        ("M", "%-M"),
        ("ss", "%S"),
        ("s", "%-S"),
        ("TT", "%p"),
        ("tt", "%P"),
    ];

    let mut out = String::new();
    let mut rest = mask;

    'scan: while let Some(c) = rest.chars().next() {
        if c == '\'' {
            let quoted = &rest[1..];
            let end = quoted.find('\'').unwrap_or(quoted.len());
            out.push_str(&quoted[..end].replace('%', "%%"));
            rest = quoted.get(end + 1..).unwrap_or("");
            continue;
        }
        for (token, format) in TOKENS {
            if let Some(tail) = rest.strip_prefix(token) {
                out.push_str(format);
                rest = tail;
                continue 'scan;
            }
        }
        if c == '%' {
            out.push_str("%%");
        } else {
            out.push(c);
        }
        rest = &rest[c.len_utf8()..];
    }

    out
}
