use std::{borrow::Cow, sync::OnceLock};

use regex::{Captures, Regex};
use thiserror::Error;

/// Placeholder expansion failure
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExpandError {
    #[error("environment variable not found: `{0}`")]
    MissingVar(String),
    #[error("only variables scoped with 'env.' are supported: `{0}`")]
    UnsupportedScope(String),
}

// `{{ env.NAME }}` with an optional `| default("value")`
fn placeholder() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"\{\{\s*(?<key>[A-Za-z0-9_.]+)\s*(?:\|\s*default\("(?<default>[^"]*)"\))?\s*\}\}"#)
            .expect("must be valid regex")
    })
}

/// Substitute `{{ env.VAR }}` placeholders in raw config text
///
/// Runs before TOML parsing so the config structs hold plain values. A
/// `default("...")` filter supplies the value when the variable is unset.
/// Comment lines are copied through untouched, so a commented-out secret
/// never has to be present in the environment.
pub fn expand_env(input: &str) -> Result<String, ExpandError> {
    let mut output = String::with_capacity(input.len());

    for line in input.split_inclusive('\n') {
        if line.trim_start().starts_with('#') {
            output.push_str(line);
        } else {
            output.push_str(&expand_line(line)?);
        }
    }

    Ok(output)
}

fn expand_line(line: &str) -> Result<Cow<'_, str>, ExpandError> {
    let mut failure = None;

    let expanded = placeholder().replace_all(line, |caps: &Captures<'_>| {
        let key = &caps["key"];
        let default = caps.name("default").map(|m| m.as_str());

        match resolve(key, default) {
            Ok(value) => value,
            Err(e) => {
                failure.get_or_insert(e);
                String::new()
            }
        }
    });

    match failure {
        Some(e) => Err(e),
        None => Ok(expanded),
    }
}

fn resolve(key: &str, default: Option<&str>) -> Result<String, ExpandError> {
    let Some(var) = key.strip_prefix("env.").filter(|var| !var.is_empty() && !var.contains('.')) else {
        return Err(ExpandError::UnsupportedScope(key.to_owned()));
    };

    match (std::env::var(var), default) {
        (Ok(value), _) => Ok(value),
        (Err(_), Some(default)) => Ok(default.to_owned()),
        (Err(_), None) => Err(ExpandError::MissingVar(var.to_owned())),
    }
}
