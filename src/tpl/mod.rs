//! Template Module - `$name` / `${expr|filter:arg}` resolution
//!
//! Mapped nodes hand each of their own entries to a `TemplateEngine`
//! together with the parent view as the data scope. `Tpl` is the builtin
//! engine:
//!
//! - `"$a"`, `"$a.b.c"`, `"${a|upperCase}"` - the whole string is one
//!   expression; the looked-up value keeps its type
//! - `"hello ${name}!"` - interpolated as text
//! - `"$$"` - the whole scope (`&` inside an expression means the same)
//! - `"\$a"` - a literal `$a`
//! - objects and arrays - resolved entry by entry; an `"&"` key spreads its
//!   resolved object into the result
//!
//! A missing value resolves to `""` unless the expression names the
//! `default` filter.
//!
//! # Example
//!
//! ```ignore
//! use serde_json::json;
//! use spark_flowstore::tpl::{TemplateEngine, Tpl};
//!
//! let tpl = Tpl::new();
//! tpl.register_filter("double", |input, _| json!(input.as_f64().unwrap_or(0.0) * 2.0));
//!
//! let data = json!({"user": {"name": "ada"}, "n": 2});
//! assert_eq!(tpl.resolve(&json!("${user.name|upperCase}"), &data), json!("ADA"));
//! assert_eq!(tpl.resolve(&json!("${n|double}"), &data), json!(4.0));
//! ```

mod filters;
mod resolve;

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::types::{value_get, Map, Value};

pub use filters::{format_bytes, format_duration};

/// `(input, args) -> output`. Args are the `:`-separated filter parameters.
pub type FilterFn = Rc<dyn Fn(&Value, &[String]) -> Value>;

// =============================================================================
// Scope
// =============================================================================

/// Data a template is resolved against.
pub trait Scope {
    fn lookup(&self, key: &str) -> Option<Value>;

    /// The whole scope as one value, for `$$` and `&`.
    fn snapshot(&self) -> Value;
}

/// Scope with nothing in it.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyScope;

impl Scope for EmptyScope {
    fn lookup(&self, _key: &str) -> Option<Value> {
        None
    }

    fn snapshot(&self) -> Value {
        Value::Object(Map::new())
    }
}

impl Scope for Value {
    fn lookup(&self, key: &str) -> Option<Value> {
        value_get(self, key).cloned()
    }

    fn snapshot(&self) -> Value {
        self.clone()
    }
}

impl Scope for Map {
    fn lookup(&self, key: &str) -> Option<Value> {
        self.get(key).cloned()
    }

    fn snapshot(&self) -> Value {
        Value::Object(self.clone())
    }
}

// =============================================================================
// TemplateEngine
// =============================================================================

pub trait TemplateEngine {
    /// Resolve `template` against `scope`. Never fails; unresolvable
    /// expressions come back as `""`.
    fn resolve(&self, template: &Value, scope: &dyn Scope) -> Value;
}

/// The builtin engine and its filter table.
pub struct Tpl {
    filters: RefCell<HashMap<String, FilterFn>>,
    default_filter: String,
}

impl Tpl {
    pub fn new() -> Self {
        Self::with_default_filter("raw")
    }

    /// `default_filter` applies to expressions that name no filter.
    pub fn with_default_filter(default_filter: impl Into<String>) -> Self {
        let table = filters::builtins()
            .into_iter()
            .map(|(name, filter)| (name.to_string(), filter))
            .collect();
        Self {
            filters: RefCell::new(table),
            default_filter: default_filter.into(),
        }
    }

    /// Add a filter, or replace the one already registered under `name`.
    pub fn register_filter<F>(&self, name: &str, filter: F)
    where
        F: Fn(&Value, &[String]) -> Value + 'static,
    {
        self.filters
            .borrow_mut()
            .insert(name.to_string(), Rc::new(filter));
    }

    pub fn has_filter(&self, name: &str) -> bool {
        self.filters.borrow().contains_key(name)
    }

    pub fn default_filter(&self) -> &str {
        &self.default_filter
    }

    /// Apply a named filter. Unknown names fall back to `raw`.
    pub fn apply_filter(&self, name: &str, input: &Value, args: &[String]) -> Value {
        let filter = self.filters.borrow().get(name).cloned();
        match filter {
            Some(filter) => filter(input, args),
            None => {
                tracing::debug!(filter = name, "unknown filter, passing value through");
                input.clone()
            }
        }
    }

    /// Look up a path (`$a.b`, `${a.b}`, `a.0.b`, `$$`, `&`) without filters.
    pub fn resolve_variable(&self, path: &str, scope: &dyn Scope) -> Option<Value> {
        resolve::variable(path, scope)
    }

    /// Evaluate one whole expression such as `${a|upperCase}`.
    ///
    /// `None` when `expression` is not a single expression.
    pub fn resolve_expression(&self, expression: &str, scope: &dyn Scope) -> Option<Value> {
        resolve::expression(self, expression, scope)
    }

    /// Interpolate every expression inside `text`.
    pub fn tokenize(&self, text: &str, scope: &dyn Scope) -> String {
        resolve::tokenize(self, text, scope)
    }
}

impl Default for Tpl {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateEngine for Tpl {
    fn resolve(&self, template: &Value, scope: &dyn Scope) -> Value {
        resolve::mapping(self, template, scope)
    }
}
