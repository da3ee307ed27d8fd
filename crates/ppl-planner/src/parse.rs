//! Field extraction for the `parse` command

use indexmap::IndexMap;
use ppl_ast::{Literal, ParseMethod};
use ppl_ir::{Expr, Value};
use regex::Regex;

use crate::compiler::Planner;
use crate::error::{PlanError, Result};

const DEFAULT_PATTERNS_PATTERN: &str = "[a-zA-Z0-9]";
const DEFAULT_PATTERNS_FIELD: &str = "patterns_field";

/// `%{SYNTAX:name}` or `%{SYNTAX:name:type}`
const GROK_FIELD: &str = r"%\{([A-Za-z0-9_]+):([A-Za-z0-9_@.\[\]]+)(?::[A-Za-z0-9_]+)?\}";

/// The pattern actually applied; `patterns` falls back to stripping alphanumerics
pub(crate) fn effective_pattern(method: ParseMethod, pattern: &str) -> &str {
    match method {
        ParseMethod::Patterns if pattern.is_empty() => DEFAULT_PATTERNS_PATTERN,
        _ => pattern,
    }
}

fn invalid_pattern(err: regex::Error) -> PlanError {
    PlanError::InvalidArgument(format!("invalid parse pattern: {}", err))
}

/// Names of the columns a parse command derives
pub(crate) fn named_groups(
    method: ParseMethod,
    pattern: &str,
    arguments: &IndexMap<String, Literal>,
) -> Result<Vec<String>> {
    match method {
        ParseMethod::Regex => {
            let regex = Regex::new(pattern).map_err(invalid_pattern)?;
            Ok(regex
                .capture_names()
                .flatten()
                .map(String::from)
                .collect())
        }
        ParseMethod::Grok => {
            let grok = Regex::new(GROK_FIELD).map_err(invalid_pattern)?;
            let mut names: Vec<String> = Vec::new();
            for caps in grok.captures_iter(pattern) {
                let name = caps[2].to_string();
                if !names.contains(&name) {
                    names.push(name);
                }
            }
            Ok(names)
        }
        ParseMethod::Patterns => {
            Regex::new(pattern).map_err(invalid_pattern)?;
            match arguments.get("new_field") {
                None => Ok(vec![DEFAULT_PATTERNS_FIELD.to_string()]),
                Some(Literal::String(name)) => Ok(vec![name.clone()]),
                Some(other) => Err(PlanError::InvalidArgument(format!(
                    "new_field expects a string, got {}",
                    other
                ))),
            }
        }
    }
}

/// Expression computing group `name` of `pattern` applied to `source`
pub(crate) fn extraction(
    planner: &Planner<'_>,
    method: ParseMethod,
    source: Expr,
    pattern: &str,
    name: &str,
) -> Result<Expr> {
    let pattern = Expr::literal(Value::String(pattern.to_string()));
    let name = Expr::literal(Value::String(name.to_string()));
    match method {
        ParseMethod::Regex => planner.call("regexp_extract", vec![source, pattern, name]),
        ParseMethod::Grok => {
            let parsed = planner.call("grok", vec![source, pattern])?;
            planner.call("item", vec![parsed, name])
        }
        ParseMethod::Patterns => planner.call(
            "regexp_replace",
            vec![source, pattern, Expr::literal(Value::String(String::new()))],
        ),
    }
}
