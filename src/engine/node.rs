//! FlowNode - one scope node and the options it is built from.
//!
//! A node wraps a `Store`, its parent id, an optional narrowing path, an
//! optional child list (joined nodes) and behavior flags. Building a node
//! only stores what later resolution needs; it never reads the parent or the
//! store's data.
//!
//! Ownership runs one way. A node keeps its parent alive, except the
//! children a joined node builds for itself, which its child list owns. A
//! child list entry is only weak when the listed node already keeps the
//! joined node alive.

use std::cell::{Cell, RefCell};
use std::ptr;
use std::rc::Rc;

use serde::Deserialize;

use super::registry::SlotHandle;
use crate::error::FlowResult;
use crate::flow::View;
use crate::reactive::Observer;
use crate::store::{StateSource, Store, StoreConfig};
use crate::types::{Map, NodeFlags, NodeId, PathKey, Value};

// =============================================================================
// NodeOptions
// =============================================================================

/// Construction options for a scope node.
///
/// Flags are tri-state so a partial set of options can override another.
#[derive(Clone, Default, Debug)]
pub struct NodeOptions {
    pub name: Option<String>,
    pub store: Option<StoreConfig>,
    pub local_only: Option<bool>,
    pub mapped: Option<bool>,
    pub joined: Option<bool>,
    pub path: Option<PathKey>,
    pub children: Vec<View>,
    pub intercept: Option<bool>,
    pub state_reactive: Option<bool>,
}

impl NodeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn store(mut self, store: StoreConfig) -> Self {
        self.store = Some(store);
        self
    }

    /// Plain data, no handlers.
    pub fn state(self, state: Value) -> Self {
        self.store(StoreConfig::new(state))
    }

    pub fn local_only(mut self, local_only: bool) -> Self {
        self.local_only = Some(local_only);
        self
    }

    pub fn mapped(mut self, mapped: bool) -> Self {
        self.mapped = Some(mapped);
        self
    }

    pub fn joined(mut self, joined: bool) -> Self {
        self.joined = Some(joined);
        self
    }

    pub fn path(mut self, path: impl Into<PathKey>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn child(mut self, child: View) -> Self {
        self.children.push(child);
        self
    }

    pub fn intercept(mut self, intercept: bool) -> Self {
        self.intercept = Some(intercept);
        self
    }

    pub fn state_reactive(mut self, state_reactive: bool) -> Self {
        self.state_reactive = Some(state_reactive);
        self
    }

    pub fn flags(&self) -> NodeFlags {
        let mut flags = NodeFlags::NONE;
        flags.set(NodeFlags::LOCAL_ONLY, self.local_only.unwrap_or(false));
        flags.set(NodeFlags::MAPPED, self.mapped.unwrap_or(false));
        flags.set(NodeFlags::JOINED, self.joined.unwrap_or(false));
        flags
    }

    /// Every field set in `overrides` replaces the one here.
    pub fn merge(self, overrides: NodeOptions) -> Self {
        Self {
            name: overrides.name.or(self.name),
            store: overrides.store.or(self.store),
            local_only: overrides.local_only.or(self.local_only),
            mapped: overrides.mapped.or(self.mapped),
            joined: overrides.joined.or(self.joined),
            path: overrides.path.or(self.path),
            children: if overrides.children.is_empty() {
                self.children
            } else {
                overrides.children
            },
            intercept: overrides.intercept.or(self.intercept),
            state_reactive: overrides.state_reactive.or(self.state_reactive),
        }
    }

    /// Decode options from a JSON document.
    ///
    /// A document with a `store` key is full config (`store.state` holds the
    /// data); anything else is bare data.
    pub fn from_json(document: Value) -> FlowResult<Self> {
        let is_config = document
            .as_object()
            .is_some_and(|map| map.contains_key("store"));
        if !is_config {
            return Ok(Self::from(document));
        }

        let spec: NodeSpec = serde_json::from_value(document)?;
        Ok(Self {
            name: spec.name,
            store: spec
                .store
                .map(|store| StoreConfig::new(store.state.unwrap_or_else(|| Value::Object(Map::new())))),
            local_only: spec.local_only,
            mapped: spec.mapped,
            joined: spec.joined,
            path: spec.path,
            children: Vec::new(),
            intercept: spec.intercept,
            state_reactive: spec.state_reactive,
        })
    }
}

/// Bare data is sugar for a store whose state is that data.
impl From<Value> for NodeOptions {
    fn from(state: Value) -> Self {
        NodeOptions::new().state(state)
    }
}

impl From<StoreConfig> for NodeOptions {
    fn from(store: StoreConfig) -> Self {
        NodeOptions::new().store(store)
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct NodeSpec {
    name: Option<String>,
    store: Option<StoreSpec>,
    local_only: Option<bool>,
    mapped: Option<bool>,
    joined: Option<bool>,
    path: Option<PathKey>,
    intercept: Option<bool>,
    state_reactive: Option<bool>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct StoreSpec {
    state: Option<Value>,
}

// =============================================================================
// FlowNode
// =============================================================================

/// One entry of a joined node's child list.
struct ChildEntry {
    id: NodeId,
    /// Strong unless the child itself keeps the joined node alive.
    owned: Option<Rc<FlowNode>>,
}

pub(crate) struct FlowNode {
    pub(crate) id: NodeId,
    pub(crate) parent: Option<NodeId>,
    /// Strong hold on the parent, absent for children a joined node owns.
    keep: Option<Rc<FlowNode>>,
    pub(crate) path: Option<PathKey>,
    pub(crate) store: Rc<Store>,
    /// What the node was built from, minus children. Used for copies.
    pub(crate) options: NodeOptions,
    name: RefCell<Option<String>>,
    flags: Cell<NodeFlags>,
    children: RefCell<Vec<ChildEntry>>,
    /// Where writes through a view land. Never read by resolution.
    shadow: RefCell<Map>,
    /// Set while this node resolves its narrowing path.
    pub(crate) in_flight: Cell<bool>,
    /// Vacates the registry slot when the node drops.
    _slot: SlotHandle,
}

impl FlowNode {
    /// Build a node for `slot`.
    ///
    /// # Arguments
    /// * `slot` - Handle of the registry slot the node goes into
    /// * `parent` - Parent node, if any
    /// * `hold_parent` - Whether this node keeps `parent` alive
    /// * `options` - What the node is built from; its children become
    ///   owned entries of the child list
    /// * `observer` - Marks the new store's state
    pub(crate) fn new(
        slot: SlotHandle,
        parent: Option<&Rc<FlowNode>>,
        hold_parent: bool,
        mut options: NodeOptions,
        observer: Rc<dyn Observer>,
    ) -> Self {
        let children = options
            .children
            .drain(..)
            .map(|child| ChildEntry {
                id: child.id(),
                owned: Some(child.node().clone()),
            })
            .collect();
        let store = Store::new(
            options.store.as_ref(),
            options.intercept.unwrap_or(false),
            options.state_reactive.unwrap_or(false),
            observer,
        );
        Self {
            id: slot.id,
            parent: parent.map(|parent| parent.id),
            keep: parent.filter(|_| hold_parent).cloned(),
            path: options.path.clone(),
            store,
            name: RefCell::new(options.name.clone()),
            flags: Cell::new(options.flags()),
            options,
            children: RefCell::new(children),
            shadow: RefCell::new(Map::new()),
            in_flight: Cell::new(false),
            _slot: slot,
        }
    }

    pub(crate) fn name(&self) -> Option<String> {
        self.name.borrow().clone()
    }

    pub(crate) fn set_name(&self, name: Option<String>) {
        *self.name.borrow_mut() = name;
    }

    pub(crate) fn flags(&self) -> NodeFlags {
        self.flags.get()
    }

    pub(crate) fn set_local_only(&self, local_only: bool) {
        let mut flags = self.flags.get();
        flags.set(NodeFlags::LOCAL_ONLY, local_only);
        self.flags.set(flags);
    }

    pub(crate) fn is_joined(&self) -> bool {
        self.flags().contains(NodeFlags::JOINED)
    }

    // =========================================================================
    // Child list (joined nodes)
    // =========================================================================

    pub(crate) fn children(&self) -> Vec<NodeId> {
        self.children.borrow().iter().map(|entry| entry.id).collect()
    }

    /// Append `child`, owning it unless it already keeps this node alive.
    pub(crate) fn push_child(&self, child: &Rc<FlowNode>) -> usize {
        let owned = (!child.reaches(self)).then(|| child.clone());
        let mut children = self.children.borrow_mut();
        children.push(ChildEntry {
            id: child.id,
            owned,
        });
        children.len() - 1
    }

    pub(crate) fn remove_child(&self, child: NodeId) -> bool {
        let removed = {
            let mut children = self.children.borrow_mut();
            match children.iter().position(|entry| entry.id == child) {
                Some(index) => Some(children.remove(index)),
                None => None,
            }
        };
        // Dropped outside the borrow: it may be the child's last handle.
        removed.is_some()
    }

    pub(crate) fn child_at(&self, index: usize) -> Option<NodeId> {
        self.children.borrow().get(index).map(|entry| entry.id)
    }

    /// Whether this node keeps `target` alive, directly or through the
    /// nodes it holds.
    pub(crate) fn reaches(&self, target: &FlowNode) -> bool {
        if ptr::eq(self, target) {
            return true;
        }
        if self.keep.as_deref().is_some_and(|parent| parent.reaches(target)) {
            return true;
        }
        self.children
            .borrow()
            .iter()
            .filter_map(|entry| entry.owned.as_deref())
            .any(|child| child.reaches(target))
    }

    // =========================================================================
    // Copies
    // =========================================================================

    /// Options for a fresh node carrying this node's configuration.
    ///
    /// The copy shares this node's raw state and re-registers its handlers.
    pub(crate) fn copy_options(&self, children: Vec<View>) -> NodeOptions {
        let base = self.options.store.clone().unwrap_or_default();
        let flags = self.flags();
        NodeOptions {
            name: self.name(),
            store: Some(StoreConfig {
                state: StateSource::Shared(self.store.raw_state()),
                ..base
            }),
            local_only: Some(flags.contains(NodeFlags::LOCAL_ONLY)),
            mapped: Some(flags.contains(NodeFlags::MAPPED)),
            joined: Some(flags.contains(NodeFlags::JOINED)),
            path: self.path.clone(),
            children,
            intercept: self.options.intercept,
            state_reactive: self.options.state_reactive,
        }
    }

    pub(crate) fn shadow_write(&self, key: &str, value: Value) {
        self.shadow.borrow_mut().insert(key.to_string(), value);
    }
}
