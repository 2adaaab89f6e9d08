//! Expression parsing and evaluation for `Tpl`.

use std::sync::LazyLock;

use regex::{Captures, Regex};

use super::filters::to_text;
use super::{Scope, Tpl};
use crate::types::{value_get, Map, Value};

/// One whole expression, optionally escaped: `$a.b`, `${a|f:x}`, `\$a`.
static EXPRESSION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)^(\\)?\$(?:([a-z0-9_.]+|&)|\{(.+)\})$").expect("expression pattern")
});

/// Expressions nested inside `${...}`, resolved before the outer one.
static NESTED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(\\)?\$(?:([a-z0-9_.]+)|\{([^}{]+)\})").expect("nested pattern")
});

/// Expressions embedded in text.
static TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(\\)?\$(?:([a-z0-9_.]+|&)|\{([^}{]+?)\})").expect("token pattern")
});

/// A string that is exactly one unescaped expression.
static WHOLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\$(?:[a-z0-9_.]+|\{[^}{]+\})$").expect("whole pattern")
});

static PIPE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s*\|\s*").expect("pipe pattern"));

// =============================================================================
// Lookup
// =============================================================================

pub(super) fn variable(path: &str, scope: &dyn Scope) -> Option<Value> {
    if path.is_empty() {
        return None;
    }
    let path = path.strip_prefix('$').unwrap_or(path);
    if path == "$" || path == "&" {
        return Some(scope.snapshot());
    }
    if let Some(found) = scope.lookup(path) {
        return Some(found);
    }

    let path = path.strip_prefix('{').unwrap_or(path);
    let path = path.strip_suffix('}').unwrap_or(path);
    let mut segments = path.split('.');
    let mut current = scope.lookup(segments.next()?)?;
    for segment in segments {
        current = value_get(&current, segment)?.clone();
    }
    Some(current)
}

// =============================================================================
// Expressions
// =============================================================================

pub(super) fn expression(tpl: &Tpl, text: &str, scope: &dyn Scope) -> Option<Value> {
    let caps = EXPRESSION.captures(text)?;
    if caps.get(1).is_some() {
        return Some(Value::String(text[1..].to_string()));
    }
    let body = caps.get(2).or_else(|| caps.get(3))?.as_str();

    let mut body = NESTED
        .replace_all(body, |inner: &Captures| {
            if inner.get(1).is_some() {
                inner[0][1..].to_string()
            } else {
                expression(tpl, &inner[0], scope)
                    .map(|value| to_text(&value))
                    .unwrap_or_default()
            }
        })
        .into_owned();
    if !body.contains('|') {
        body.push('|');
        body.push_str(tpl.default_filter());
    }

    let mut stages = PIPE.split(&body);
    let path = stages.next().unwrap_or_default().trim();
    let input = match variable(path, scope) {
        Some(value) if !value.is_null() => value,
        _ if !body.contains("default") => return Some(Value::String(String::new())),
        _ => Value::Null,
    };

    Some(stages.fold(input, |input, stage| {
        let (name, args) = split_filter(stage);
        tpl.apply_filter(&name, &input, &args)
    }))
}

/// `name:arg1:arg2`, with `\:` for a literal colon and `\\` for a backslash.
fn split_filter(stage: &str) -> (String, Vec<String>) {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut chars = stage.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' if matches!(chars.peek(), Some(':' | '\\')) => {
                if let Some(escaped) = chars.next() {
                    current.push(escaped);
                }
            }
            ':' => parts.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    parts.push(current);

    let mut parts = parts.into_iter();
    let name = parts.next().unwrap_or_default();
    (name, parts.collect())
}

pub(super) fn tokenize(tpl: &Tpl, source: &str, scope: &dyn Scope) -> String {
    TOKEN
        .replace_all(source, |caps: &Captures| {
            if caps.get(1).is_some() {
                caps[0][1..].to_string()
            } else {
                expression(tpl, &caps[0], scope)
                    .map(|value| to_text(&value))
                    .unwrap_or_default()
            }
        })
        .into_owned()
}

// =============================================================================
// Mapping
// =============================================================================

pub(super) fn mapping(tpl: &Tpl, template: &Value, scope: &dyn Scope) -> Value {
    match template {
        Value::String(text) if text == "$$" => scope.snapshot(),
        Value::String(text) if WHOLE.is_match(text) => {
            expression(tpl, text, scope).unwrap_or_else(|| Value::String(String::new()))
        }
        Value::String(text) if text.contains('$') => Value::String(tokenize(tpl, text, scope)),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| mapping(tpl, item, scope))
                .collect(),
        ),
        Value::Object(entries) => object(tpl, entries, scope),
        other => other.clone(),
    }
}

/// Mapped values that drop their key instead of setting it.
const UNDEFINED: &str = "__undefined";

fn object(tpl: &Tpl, entries: &Map, scope: &dyn Scope) -> Value {
    let mut out = Map::new();
    for (key, value) in entries {
        if key == "&" {
            // `&` spreads an object into the result; any other value replaces it.
            match mapping(tpl, value, scope) {
                Value::Object(spread) => out.extend(spread),
                Value::Null => {}
                Value::String(text) if text.is_empty() => {}
                other => return other,
            }
            continue;
        }
        if let Some(rows) = rows(tpl, value, scope) {
            out.insert(key.clone(), rows);
            continue;
        }
        match mapping(tpl, value, scope) {
            Value::String(text) if text == UNDEFINED => {}
            mapped => {
                out.insert(key.clone(), mapped);
            }
        }
    }
    Value::Object(out)
}

/// `{"$rows": template}` maps `template` over every row of the array the
/// scope holds at `rows`. Anything else is not a row mapping.
fn rows(tpl: &Tpl, value: &Value, scope: &dyn Scope) -> Option<Value> {
    let entries = value.as_object().filter(|entries| entries.len() == 1)?;
    let (key, template) = entries.iter().next()?;
    let Value::Array(items) = scope.lookup(key.strip_prefix('$')?)? else {
        return None;
    };
    Some(Value::Array(
        items
            .iter()
            .map(|row| mapping(tpl, template, &RowScope { row, outer: scope }))
            .collect(),
    ))
}

/// One array row layered over the scope it came from.
struct RowScope<'a> {
    row: &'a Value,
    outer: &'a dyn Scope,
}

impl Scope for RowScope<'_> {
    fn lookup(&self, key: &str) -> Option<Value> {
        match self.row.as_object().and_then(|row| row.get(key)) {
            Some(found) => Some(found.clone()),
            None => self.outer.lookup(key),
        }
    }

    fn snapshot(&self) -> Value {
        self.row.clone()
    }
}
