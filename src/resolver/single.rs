//! Own-state resolution for plain, narrowed and mapped nodes.

use crate::engine::FlowNode;
use crate::flow::View;
use crate::state::State;
use crate::tpl::EmptyScope;
use crate::types::{value_get, value_keys, NodeFlags, Value};

/// A node's effective state at one instant. Never kept across calls.
pub(super) enum Effective {
    /// The store's own state.
    Shared(State),
    /// `parent[path]`, read just now.
    Detached(Value),
    /// Narrowed into nothing.
    Missing,
}

impl Effective {
    pub(super) fn of(view: &View) -> Self {
        let node = view.node();
        let Some(path) = &node.path else {
            return Effective::Shared(node.store.state());
        };
        let Some(parent) = view.parent() else {
            return Effective::Missing;
        };
        match parent.get(&path.as_key()) {
            Some(value) => Effective::Detached(value),
            None => Effective::Missing,
        }
    }

    pub(super) fn get(&self, key: &str) -> Option<Value> {
        match self {
            Effective::Shared(state) => state.get(key),
            Effective::Detached(value) => value_get(value, key).cloned(),
            Effective::Missing => None,
        }
    }

    pub(super) fn keys(&self) -> Vec<String> {
        match self {
            Effective::Shared(state) => state.keys(),
            Effective::Detached(value) => value_keys(value),
            Effective::Missing => Vec::new(),
        }
    }
}

/// Marks a node busy resolving its own state until dropped.
///
/// A narrowed or mapped node can loop back into itself through a joined
/// parent; the inner visit then sees no own state.
pub(super) struct InFlight<'a> {
    node: &'a FlowNode,
}

impl<'a> InFlight<'a> {
    pub(super) fn enter(node: &'a FlowNode, key: &str) -> Option<Self> {
        if node.in_flight.replace(true) {
            tracing::debug!(node = %node.id, key, "re-entrant resolution treated as absent");
            return None;
        }
        Some(Self { node })
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.node.in_flight.set(false);
    }
}

pub(super) fn own_read(view: &View, key: &str) -> Option<Value> {
    let node = view.node();
    let _guard = InFlight::enter(node, key)?;
    let raw = Effective::of(view).get(key)?;
    if node.flags().contains(NodeFlags::MAPPED) {
        return Some(map_value(view, &raw));
    }
    Some(raw)
}

pub(super) fn own_keys(view: &View) -> Vec<String> {
    match InFlight::enter(view.node(), "") {
        Some(_guard) => Effective::of(view).keys(),
        None => Vec::new(),
    }
}

/// Resolve a mapped entry against the parent's view.
fn map_value(view: &View, raw: &Value) -> Value {
    let engine = view.engine();
    match view.parent() {
        Some(parent) => engine.resolve(raw, &parent),
        None => engine.resolve(raw, &EmptyScope),
    }
}
