//! Flow Module - the root context every node tree hangs off
//!
//! A `Flow` owns one node arena, one root node, the observer every store
//! marks its state with, and the template engine mapped nodes resolve
//! through. It is created once by the embedding application and passed to
//! whatever needs to start a new top-level node.
//!
//! # Example
//!
//! ```ignore
//! use serde_json::json;
//! use spark_flowstore::{Flow, NodeOptions};
//!
//! let flow = Flow::new();
//! let top = flow.create(NodeOptions::new().name("top").state(json!({"a": 11, "b": 12})));
//! let child = top.extend(json!({"b": 22}));
//!
//! assert_eq!(child.get("a"), Some(json!(11)));
//! assert_eq!(child.get("b"), Some(json!(22)));
//! assert_eq!(child.find_by_name("top").and_then(|v| v.get("b")), Some(json!(12)));
//! ```

mod view;

use std::fmt;
use std::rc::Rc;

use crate::config::FlowConfig;
use crate::engine::{FlowNode, NodeOptions, NodeRegistry};
use crate::error::{FlowError, FlowResult};
use crate::reactive::{NoopObserver, Observer};
use crate::tpl::{TemplateEngine, Tpl};
use crate::types::{Map, NodeId, Value};

pub use view::View;

// =============================================================================
// Flow
// =============================================================================

#[derive(Clone)]
pub struct Flow {
    inner: Rc<FlowInner>,
}

pub(crate) struct FlowInner {
    pub(crate) config: FlowConfig,
    pub(crate) observer: Rc<dyn Observer>,
    pub(crate) engine: Rc<dyn TemplateEngine>,
    pub(crate) nodes: NodeRegistry,
    root: Rc<FlowNode>,
}

impl Flow {
    pub fn new() -> Self {
        Self::with_config(FlowConfig::default())
    }

    pub fn with_config(config: FlowConfig) -> Self {
        Self::with_observer(config, Rc::new(NoopObserver))
    }

    /// Flow whose stores are marked by `observer`, using the builtin
    /// template engine.
    pub fn with_observer(config: FlowConfig, observer: Rc<dyn Observer>) -> Self {
        let engine = Rc::new(Tpl::with_default_filter(config.default_filter.clone()));
        Self::with_parts(config, observer, engine)
    }

    pub fn with_parts(
        config: FlowConfig,
        observer: Rc<dyn Observer>,
        engine: Rc<dyn TemplateEngine>,
    ) -> Self {
        let nodes = NodeRegistry::new();
        let root_options = NodeOptions::new()
            .name(config.root_name.clone())
            .state(Value::Object(Map::new()));
        let root = nodes
            .allocate(|slot| FlowNode::new(slot, None, false, root_options, observer.clone()));
        tracing::trace!(node = %root.id, name = %config.root_name, "created flow root");

        Self {
            inner: Rc::new(FlowInner {
                config,
                observer,
                engine,
                nodes,
                root,
            }),
        }
    }

    pub fn root(&self) -> View {
        View::new(self.inner.clone(), self.inner.root.clone())
    }

    /// New top-level node under the root.
    pub fn create(&self, options: impl Into<NodeOptions>) -> View {
        self.root().extend(options)
    }

    /// Release `view`'s node and every node parented to it, ahead of time.
    ///
    /// Nodes are reclaimed on their own once no view, child or child list
    /// holds them; releasing only cuts them off early. A node released from
    /// a joined parent also leaves its child list. The root is never
    /// released.
    ///
    /// # Arguments
    /// * `view` - A live view created by this flow
    ///
    /// # Returns
    /// How many nodes went away, or `ForeignNode`/`Released` when `view`
    /// belongs to another flow or is already gone.
    pub fn release(&self, view: &View) -> FlowResult<usize> {
        let id = view.id();
        if !view.belongs_to(&self.inner) {
            return Err(FlowError::ForeignNode(id));
        }
        if id == self.inner.root.id {
            tracing::warn!(node = %id, "the flow root cannot be released");
            return Ok(0);
        }
        if !self.inner.nodes.is_live(id) {
            return Err(FlowError::Released(id));
        }

        if let Some(parent) = view.parent().filter(|parent| parent.node().is_joined()) {
            parent.node().remove_child(id);
        }
        let released = self.inner.nodes.release(id);
        tracing::debug!(node = %id, released, "released node subtree");
        Ok(released)
    }

    /// Count of live nodes, root included. Nodes nothing holds any more are
    /// not counted.
    pub fn node_count(&self) -> usize {
        self.inner.nodes.live_count()
    }

    pub fn config(&self) -> &FlowConfig {
        &self.inner.config
    }

    pub fn observer(&self) -> Rc<dyn Observer> {
        self.inner.observer.clone()
    }

    pub fn engine(&self) -> Rc<dyn TemplateEngine> {
        self.inner.engine.clone()
    }

    pub(crate) fn from_inner(inner: Rc<FlowInner>) -> Self {
        Self { inner }
    }
}

impl Default for Flow {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Flow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Flow")
            .field("config", &self.inner.config)
            .field("nodes", &self.inner.nodes.live_count())
            .field("slots", &self.inner.nodes.capacity())
            .finish()
    }
}

// =============================================================================
// Construction
// =============================================================================

impl FlowInner {
    /// Allocate a node under `parent` and hand back its view. The new node
    /// keeps `parent` alive.
    ///
    /// Only stores what resolution will need later. Nothing is read from
    /// the parent or from the new store's state here.
    pub(crate) fn build(self: &Rc<Self>, parent: Option<&Rc<FlowNode>>, options: NodeOptions) -> View {
        self.allocate(parent, true, options)
    }

    /// Allocate a child that `parent`'s child list will own, so it must not
    /// keep `parent` alive in turn.
    pub(crate) fn build_owned(self: &Rc<Self>, parent: &Rc<FlowNode>, options: NodeOptions) -> View {
        self.allocate(Some(parent), false, options)
    }

    fn allocate(
        self: &Rc<Self>,
        parent: Option<&Rc<FlowNode>>,
        hold_parent: bool,
        mut options: NodeOptions,
    ) -> View {
        options.children.retain(|child| {
            let usable = child.belongs_to(self) && child.is_live();
            if !usable {
                tracing::warn!(child = %child.id(), "skipping child from another flow or already released");
            }
            usable
        });

        let node = self.nodes.allocate(|slot| {
            FlowNode::new(slot, parent, hold_parent, options, self.observer.clone())
        });
        tracing::trace!(node = %node.id, parent = ?node.parent, "created node");
        View::new(self.clone(), node)
    }

    pub(crate) fn view(self: &Rc<Self>, id: NodeId) -> Option<View> {
        self.nodes.get(id).map(|node| View::new(self.clone(), node))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_root_is_named_and_empty() {
        let flow = Flow::new();
        let root = flow.root();
        assert_eq!(root.name().as_deref(), Some("--system--"));
        assert!(root.keys().is_empty());
        assert!(root.parent().is_none());
        assert_eq!(flow.node_count(), 1);
    }

    #[test]
    fn test_create_hangs_off_root() {
        let flow = Flow::new();
        let top = flow.create(json!({"a": 1}));
        assert_eq!(top.parent(), Some(flow.root()));
        assert_eq!(top.get("a"), Some(json!(1)));
        assert_eq!(flow.node_count(), 2);
    }

    #[test]
    fn test_release_subtree() {
        let flow = Flow::new();
        let top = flow.create(json!({"a": 1}));
        let child = top.extend(json!({"b": 2}));
        let grandchild = child.narrow("b");
        let other = flow.create(json!({}));

        assert_eq!(flow.release(&child).unwrap(), 2);
        assert!(!child.is_live());
        assert!(!grandchild.is_live());
        assert!(top.is_live());
        assert!(other.is_live());

        // Released views resolve to nothing.
        assert_eq!(child.get("b"), None);
        assert!(!child.has("a"));
        assert!(child.keys().is_empty());

        assert!(matches!(flow.release(&child), Err(FlowError::Released(_))));
    }

    #[test]
    fn test_release_leaves_joined_parent() {
        let flow = Flow::new();
        let joined = flow.create(json!({})).compose([json!({"a": 1}), json!({"a": 2})]);
        let second = joined.child(1).unwrap();
        assert_eq!(joined.get("a"), Some(json!(2)));

        flow.release(&second).unwrap();
        assert_eq!(joined.children().len(), 1);
        assert_eq!(joined.get("a"), Some(json!(1)));
    }

    #[test]
    fn test_unheld_nodes_are_reclaimed() {
        let flow = Flow::new();
        let top = flow.create(json!({"a": {"b": 1}}));
        for _ in 0..1000 {
            let narrowed = top.narrow("a");
            assert_eq!(narrowed.get("b"), Some(json!(1)));
        }
        assert_eq!(flow.node_count(), 2);

        // Slots of dropped nodes are reused.
        let slots = flow.inner.nodes.capacity();
        let _kept = top.remap(json!({"c": "$a"}));
        assert_eq!(flow.inner.nodes.capacity(), slots);
        assert_eq!(flow.node_count(), 3);
    }

    #[test]
    fn test_release_then_drop() {
        let flow = Flow::new();
        let top = flow.create(json!({}));
        let child = top.extend(json!({"a": 1}));
        flow.release(&child).unwrap();
        drop(child);

        let next = top.extend(json!({}));
        assert!(next.is_live());
        assert_eq!(flow.node_count(), 3);
    }

    #[test]
    fn test_root_never_released() {
        let flow = Flow::new();
        assert_eq!(flow.release(&flow.root()).unwrap(), 0);
        assert!(flow.root().is_live());
    }

    #[test]
    fn test_foreign_view_rejected() {
        let flow = Flow::new();
        let other = Flow::new();
        let view = other.create(json!({}));
        assert!(matches!(flow.release(&view), Err(FlowError::ForeignNode(_))));
    }

    #[test]
    fn test_custom_config() {
        let config = FlowConfig::from_toml_str("root_name = \"app\"\nname_prefix = \"#\"").unwrap();
        let flow = Flow::with_config(config);
        let top = flow.create(NodeOptions::new().name("top").state(json!({"a": 1})));
        let child = top.extend(json!({}));
        assert_eq!(flow.root().name().as_deref(), Some("app"));
        assert_eq!(child.resolve("#top").and_then(|r| r.into_view()), Some(top));
        assert!(child.resolve("@top").is_none());
    }
}
