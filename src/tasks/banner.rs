//! `banner`: prepend or append text to files in place

use crate::error::{ExecutionError, ExecutionResult};
use crate::runner::{Invocation, InvocationContext};
use crate::tasks::{files, Capability};
use std::fs;
use std::str::FromStr;

/// Where the banner goes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Position {
    #[default]
    Top,
    Bottom,
}

impl FromStr for Position {
    type Err = ExecutionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "top" => Ok(Position::Top),
            "bottom" => Ok(Position::Bottom),
            other => Err(ExecutionError::InvalidOption {
                name: "position".to_string(),
                error: format!("expected 'top' or 'bottom', got '{}'", other),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Banner;

impl Capability for Banner {
    fn description(&self) -> &str {
        "Add a banner to files"
    }

    fn invoke(&self, invocation: &Invocation, ctx: &InvocationContext<'_>) -> ExecutionResult<()> {
        let options = &invocation.options;
        let banner = options.require_str("banner")?;
        let position = match options.get_str("position")? {
            Some(position) => position.parse()?,
            None => Position::default(),
        };
        let linebreak = options.get_bool("linebreak", true)?;

        let mut count = 0;
        for path in files::resolve_sources(options, ctx.working_dir())? {
            if !path.is_file() {
                continue;
            }
            let contents = fs::read_to_string(&path)?;
            fs::write(&path, apply(&banner, &contents, position, linebreak))?;
            count += 1;
        }

        ctx.context().print_info(&format!("Banner added to {} file(s)", count));
        Ok(())
    }
}

/// Contents with the banner attached
pub fn apply(banner: &str, contents: &str, position: Position, linebreak: bool) -> String {
    let gap = if linebreak { "\n" } else { "" };
    match position {
        Position::Top => format!("{}{}{}", banner, gap, contents),
        Position::Bottom => format!("{}{}{}", contents, gap, banner),
    }
}
