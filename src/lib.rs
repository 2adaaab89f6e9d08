//! # spark-flowstore
//!
//! Dynamic scope-chain store for reactive state trees.
//!
//! Built on [spark-signals](https://github.com/RLabs-Inc/spark-signals) for fine-grained reactivity.
//!
//! ## Architecture
//!
//! A flow is a tree of scope nodes. Each node wraps a store (raw state plus
//! mutation and action handlers) and exposes a `View`: a read-only merged
//! window over its own data and, by delegation, its ancestors' data.
//!
//! New nodes are only ever derived from existing views, never by editing one
//! already handed out:
//! ```text
//! root → extend(data) → narrow("person") → remap({"label": "${name}"})
//!                     ↘ compose([a, b])   (b's keys win over a's)
//! ```
//!
//! Nothing is read while a node is built. Every read walks the chain at the
//! time it happens, so derived views stay live against later commits, and
//! the reactive observer only sees the dependencies a real read creates.
//!
//! ## Modules
//!
//! - [`types`] - Core types (Value, PathKey, NodeFlags, Resolved, etc.)
//! - [`flow`] - `Flow` context and `View` with every structural operator
//! - [`store`] - Raw state plus mutation/action registry
//! - [`reactive`] - Observer interface and the spark-signals adapter
//! - [`tpl`] - Template/filter engine used by mapped nodes

pub mod config;
pub mod engine;
pub mod error;
pub mod flow;
pub mod reactive;
mod resolver;
pub mod state;
pub mod store;
pub mod tpl;
pub mod types;

// Re-export commonly used items
pub use types::*;

pub use config::FlowConfig;
pub use engine::NodeOptions;
pub use error::{FlowError, FlowResult};
pub use flow::{Flow, View};

pub use reactive::{Dep, NoopObserver, Observer, SignalObserver, SignalTracker, Tracker};
pub use state::State;
pub use store::{
    ActionContext, ActionFn, ActionFuture, MutationFn, StateSource, Store, StoreConfig,
};
pub use tpl::{EmptyScope, FilterFn, Scope, TemplateEngine, Tpl};
