//! `${VAR}` substitution in config text before it reaches the YAML parser.
//!
//! `$VAR` and `${VAR}` must be set. `${VAR:-fallback}` also falls back when
//! the value is empty, `${VAR-fallback}` only when it is unset. `$$` is a
//! literal dollar sign.

use regex::{Captures, Regex};
use std::sync::LazyLock;

static REFERENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\$|\$\{([A-Za-z_][A-Za-z0-9_]*)(:?-[^}]*)?\}|\$([A-Za-z_][A-Za-z0-9_]*)")
        .expect("reference pattern is a valid regex")
});

/// How a reference behaves when its variable has no usable value.
enum Fallback<'a> {
    Required,
    WhenUnset(&'a str),
    WhenUnsetOrEmpty(&'a str),
}

impl<'a> Fallback<'a> {
    fn parse(suffix: Option<&'a str>) -> Self {
        match suffix {
            None => Fallback::Required,
            Some(s) => match s.strip_prefix(":-") {
                Some(value) => Fallback::WhenUnsetOrEmpty(value),
                None => Fallback::WhenUnset(s.strip_prefix('-').unwrap_or(s)),
            },
        }
    }
}

/// Substitute every reference in `input`.
///
/// Fails with one message per bad reference, so all of them are reported
/// together.
pub fn interpolate(input: &str) -> Result<String, Vec<String>> {
    let mut problems = Vec::new();
    let text = REFERENCE.replace_all(input, |caps: &Captures| {
        substitute(caps, &mut problems)
    });

    if problems.is_empty() {
        Ok(text.into_owned())
    } else {
        Err(problems)
    }
}

fn substitute(caps: &Captures, problems: &mut Vec<String>) -> String {
    let Some(name) = caps.get(1).or_else(|| caps.get(3)) else {
        return "$".to_string();
    };
    let name = name.as_str();
    let fallback = Fallback::parse(caps.get(2).map(|m| m.as_str()));

    let value = match (std::env::var(name).ok(), fallback) {
        (Some(v), Fallback::WhenUnsetOrEmpty(d)) if v.is_empty() => d.to_string(),
        (Some(v), _) => v,
        (None, Fallback::WhenUnset(d) | Fallback::WhenUnsetOrEmpty(d)) => d.to_string(),
        (None, Fallback::Required) => {
            problems.push(format!("${name} is not set"));
            return String::new();
        }
    };

    // A newline would let a value add YAML keys of its own
    if value.contains(['\n', '\r']) {
        problems.push(format!("${name} contains a line break"));
        return String::new();
    }
    value
}
