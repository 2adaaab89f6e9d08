//! Flow configuration.
//!
//! Every `Flow` carries one `FlowConfig`. Defaults match what the resolver
//! expects when nothing is configured; a TOML document can override any
//! subset of the fields.
//!
//! ```toml
//! name_prefix = "@"
//! parent_key = "__super"
//! root_name = "--system--"
//! default_filter = "raw"
//! child_names = false
//! ```

use serde::{Deserialize, Serialize};

use crate::error::FlowResult;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowConfig {
    /// Sigil that turns a key into a named-ancestor lookup.
    pub name_prefix: String,
    /// Reserved key that always yields the parent view.
    pub parent_key: String,
    /// Name given to the root node of every flow.
    pub root_name: String,
    /// Filter applied to template expressions that name none.
    pub default_filter: String,
    /// Name unnamed `compose` children `{receiver}/{index}`, where the
    /// receiver is the view `compose` was called on.
    pub child_names: bool,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            name_prefix: "@".to_string(),
            parent_key: "__super".to_string(),
            root_name: "--system--".to_string(),
            default_filter: "raw".to_string(),
            child_names: false,
        }
    }
}

impl FlowConfig {
    pub fn from_toml_str(source: &str) -> FlowResult<Self> {
        Ok(toml::from_str(source)?)
    }

    /// Strip the named-ancestor sigil, if `key` carries it.
    pub fn ancestor_name<'k>(&self, key: &'k str) -> Option<&'k str> {
        if self.name_prefix.is_empty() {
            return None;
        }
        key.strip_prefix(self.name_prefix.as_str())
    }
}
