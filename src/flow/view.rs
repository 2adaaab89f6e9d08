//! View - the only external handle on a scope node.
//!
//! Every read goes through the resolver. Every structural operator builds a
//! fresh node and returns its view; the only in-place edits are the name,
//! the local-only flag and a joined node's child list.

use std::fmt;
use std::rc::Rc;

use super::{Flow, FlowInner};
use crate::config::FlowConfig;
use crate::engine::{FlowNode, NodeOptions};
use crate::error::{FlowError, FlowResult};
use crate::resolver;
use crate::state::State;
use crate::store::{ActionFuture, StateSource, Store, StoreConfig};
use crate::tpl::{Scope, TemplateEngine};
use crate::types::{
    BoundMember, Descriptor, Map, Member, NodeFlags, NodeId, PathKey, Resolved, Value,
};

#[derive(Clone)]
pub struct View {
    flow: Rc<FlowInner>,
    node: Rc<FlowNode>,
}

impl View {
    pub(crate) fn new(flow: Rc<FlowInner>, node: Rc<FlowNode>) -> Self {
        Self { flow, node }
    }

    pub(crate) fn node(&self) -> &Rc<FlowNode> {
        &self.node
    }

    pub(crate) fn config(&self) -> &FlowConfig {
        &self.flow.config
    }

    pub(crate) fn engine(&self) -> &dyn TemplateEngine {
        self.flow.engine.as_ref()
    }

    pub(crate) fn bind(&self, member: Member) -> BoundMember {
        BoundMember {
            member,
            view: self.clone(),
        }
    }

    pub(crate) fn belongs_to(&self, flow: &Rc<FlowInner>) -> bool {
        Rc::ptr_eq(&self.flow, flow)
    }

    // =========================================================================
    // Node info
    // =========================================================================

    pub fn id(&self) -> NodeId {
        self.node.id
    }

    /// False once the node was released from its flow.
    pub fn is_live(&self) -> bool {
        self.flow
            .nodes
            .get(self.node.id)
            .is_some_and(|live| Rc::ptr_eq(&live, &self.node))
    }

    pub fn name(&self) -> Option<String> {
        self.node.name()
    }

    pub fn set_name(&self, name: impl Into<String>) {
        self.node.set_name(Some(name.into()));
    }

    pub fn flags(&self) -> NodeFlags {
        self.node.flags()
    }

    pub fn path(&self) -> Option<&PathKey> {
        self.node.path.as_ref()
    }

    /// The parent view, if the parent is still live.
    pub fn parent(&self) -> Option<View> {
        self.flow.view(self.node.parent?)
    }

    pub fn flow(&self) -> Flow {
        Flow::from_inner(self.flow.clone())
    }

    pub fn store(&self) -> &Rc<Store> {
        &self.node.store
    }

    // =========================================================================
    // Resolution
    // =========================================================================

    /// Full read: values, node handles and bound members.
    ///
    /// Tries, in order: the parent key, a `@name` ancestor lookup, member
    /// names, this node's own state, then the parent chain (unless the node
    /// is local-only).
    ///
    /// # Arguments
    /// * `key` - Property name, possibly carrying the ancestor sigil
    ///
    /// # Returns
    /// What the key names, or `None` when nothing in reach has it.
    pub fn resolve(&self, key: &str) -> Option<Resolved> {
        resolver::read(self, key)
    }

    /// Read a data value. Node handles and members read as `None`.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.resolve(key).and_then(Resolved::into_value)
    }

    pub fn has(&self, key: &str) -> bool {
        resolver::has(self, key)
    }

    /// Own enumerable keys. Inherited keys are never listed.
    pub fn keys(&self) -> Vec<String> {
        resolver::keys(self)
    }

    pub fn describe(&self, key: &str) -> Option<Descriptor> {
        resolver::describe(self, key)
    }

    /// Accepted and logged, but never visible to any read.
    pub fn write(&self, key: &str, value: Value) {
        resolver::write(self, key, value);
    }

    /// The spread of this view: every own key with its resolved value.
    pub fn to_value(&self) -> Value {
        let mut out = Map::new();
        for key in self.keys() {
            if let Some(value) = self.get(&key) {
                out.insert(key, value);
            }
        }
        Value::Object(out)
    }

    // =========================================================================
    // Structural operators
    // =========================================================================

    /// New node under this one. Bare data is sugar for a store holding it.
    ///
    /// # Arguments
    /// * `options` - Full `NodeOptions`, a `StoreConfig` or plain data
    ///
    /// # Returns
    /// The new node's view. It keeps this node alive for as long as it lives.
    pub fn extend(&self, options: impl Into<NodeOptions>) -> View {
        self.flow.build(Some(&self.node), options.into())
    }

    /// New node whose own state is `self[path]`, re-read on every access.
    ///
    /// Commits on the new node run against this node's raw state.
    ///
    /// # Arguments
    /// * `path` - Key or index to narrow to; a missing target reads as absent
    pub fn narrow(&self, path: impl Into<PathKey>) -> View {
        let store = StoreConfig::from_source(StateSource::Shared(self.node.store.raw_state()));
        self.flow
            .build(Some(&self.node), NodeOptions::new().path(path).store(store))
    }

    /// New mapped node: each entry of `template` is resolved against this
    /// view on read.
    pub fn remap(&self, template: Value) -> View {
        self.flow
            .build(Some(&self.node), NodeOptions::new().mapped(true).state(template))
    }

    /// New joined node with one child per entry, later entries winning.
    ///
    /// # Arguments
    /// * `entries` - One set of options per child, in layering order
    ///
    /// # Returns
    /// The joined node's view. Its child list owns the children, so they
    /// live as long as it does.
    pub fn compose<I>(&self, entries: I) -> View
    where
        I: IntoIterator,
        I::Item: Into<NodeOptions>,
    {
        let joined = self
            .flow
            .build(Some(&self.node), NodeOptions::new().joined(true));
        let prefix = self
            .config()
            .child_names
            .then(|| self.name().unwrap_or_default());
        for (index, entry) in entries.into_iter().enumerate() {
            let mut options: NodeOptions = entry.into();
            if let Some(prefix) = prefix.as_deref().filter(|_| options.name.is_none()) {
                options.name = Some(format!("{prefix}/{index}"));
            }
            let child = self.flow.build_owned(&joined.node, options);
            joined.node.push_child(&child.node);
        }
        joined
    }

    /// Insert a node between this one and its parent.
    ///
    /// `A -> B` becomes `A -> C -> B'`, where `C` is built from `options` and
    /// `B'` is a fresh copy of this node. This view is left untouched; the
    /// copy is returned.
    pub fn splice(&self, options: impl Into<NodeOptions>) -> View {
        let parent = self.parent();
        let inserted = self.flow.build(parent.as_ref().map(View::node), options.into());
        let copy = self.node.copy_options(self.children());
        self.flow.build(Some(&inserted.node), copy)
    }

    /// Flip the local-only flag on this node in place.
    pub fn relocalize(&self, local_only: bool) -> View {
        self.node.set_local_only(local_only);
        self.clone()
    }

    /// A copy of this node with `local_only` and `overrides` applied.
    pub fn relocalize_with(&self, local_only: bool, overrides: impl Into<NodeOptions>) -> View {
        let options = self
            .node
            .copy_options(self.children())
            .merge(NodeOptions::new().local_only(local_only))
            .merge(overrides.into());
        let parent = self.parent();
        self.flow.build(parent.as_ref().map(View::node), options)
    }

    /// Nearest node named `name`, starting at this one and walking parents.
    pub fn find_by_name(&self, name: &str) -> Option<View> {
        let mut current = Some(self.clone());
        while let Some(view) = current {
            if view.name().as_deref() == Some(name) {
                return Some(view);
            }
            current = view.parent();
        }
        None
    }

    // =========================================================================
    // Child list (joined nodes)
    // =========================================================================

    /// Append `child` to this joined node, on top of every earlier child.
    ///
    /// The list owns `child` unless `child` itself keeps this node alive,
    /// in which case the entry lasts only while `child` is held elsewhere.
    ///
    /// # Arguments
    /// * `child` - A live view from the same flow
    ///
    /// # Returns
    /// The child's index, or `NotJoined`, `ForeignNode` or `Released`.
    pub fn add_child(&self, child: &View) -> FlowResult<usize> {
        self.check_child_edit(child)?;
        Ok(self.node.push_child(&child.node))
    }

    /// Remove `child` from this joined node. Returns whether it was listed.
    pub fn remove_child(&self, child: &View) -> FlowResult<bool> {
        if !self.node.is_joined() {
            return Err(FlowError::NotJoined(self.id()));
        }
        Ok(self.node.remove_child(child.id()))
    }

    pub fn child(&self, index: usize) -> Option<View> {
        self.flow.view(self.node.child_at(index)?)
    }

    /// Live children in registration order. Empty unless joined.
    pub fn children(&self) -> Vec<View> {
        self.node
            .children()
            .into_iter()
            .filter_map(|id| self.flow.view(id))
            .collect()
    }

    fn check_child_edit(&self, child: &View) -> FlowResult<()> {
        if !self.node.is_joined() {
            return Err(FlowError::NotJoined(self.id()));
        }
        if !child.belongs_to(&self.flow) {
            return Err(FlowError::ForeignNode(child.id()));
        }
        if !child.is_live() {
            return Err(FlowError::Released(child.id()));
        }
        Ok(())
    }

    // =========================================================================
    // Store access
    // =========================================================================

    pub fn state(&self) -> State {
        self.node.store.state()
    }

    /// Run this node's own mutation handlers for `ty`. Ancestors' handlers
    /// are not consulted; reach them through `find_by_name` or `@name`.
    ///
    /// # Arguments
    /// * `ty` - Mutation type
    /// * `payload` - Handed to every handler as is
    ///
    /// # Returns
    /// The first handler error. An unknown type is logged and is `Ok`.
    pub fn commit(&self, ty: &str, payload: Value) -> anyhow::Result<()> {
        self.node.store.commit(ty, payload)
    }

    pub fn commit_object(&self, mutation: &Value) -> anyhow::Result<()> {
        self.node.store.commit_object(mutation)
    }

    /// Start this node's own action handlers for `ty`.
    ///
    /// # Arguments
    /// * `ty` - Action type
    /// * `payload` - Handed to every handler as is
    ///
    /// # Returns
    /// `None` for an unknown type (logged). Otherwise a future with the
    /// single handler's result, or every result in order when several run.
    pub fn dispatch(&self, ty: &str, payload: Value) -> Option<ActionFuture> {
        self.node.store.dispatch(ty, payload)
    }

    pub fn dispatch_object(&self, action: &Value) -> Option<ActionFuture> {
        self.node.store.dispatch_object(action)
    }

    /// Register more handlers on this node's store.
    pub fn register(&self, config: &StoreConfig) {
        self.node.store.register(Some(config));
    }
}

impl PartialEq for View {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.node, &other.node)
    }
}

impl Eq for View {}

impl fmt::Debug for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("View")
            .field("id", &self.node.id)
            .field("name", &self.node.name())
            .field("flags", &self.node.flags())
            .field("path", &self.node.path)
            .finish()
    }
}

impl Scope for View {
    fn lookup(&self, key: &str) -> Option<Value> {
        self.get(key)
    }

    fn snapshot(&self) -> Value {
        self.to_value()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extend_shadows_parent() {
        let flow = Flow::new();
        let parent = flow.create(NodeOptions::new().name("p").state(json!({"a": 11, "b": 12})));
        let child = parent.extend(json!({"b": 22}));
        assert_eq!(child.get("a"), Some(json!(11)));
        assert_eq!(child.get("b"), Some(json!(22)));
        assert_eq!(child.find_by_name("p").unwrap().get("b"), Some(json!(12)));
    }

    #[test]
    fn test_narrow_shares_raw_state() {
        let flow = Flow::new();
        let top = flow.create(
            StoreConfig::new(json!({"person": {"name": "a"}})).mutation("rename", |state, v| {
                state.update_key("person", |person| person["name"] = v.clone());
                Ok(())
            }),
        );
        let person = top.narrow("person");
        assert_eq!(person.get("name"), Some(json!("a")));
        assert_eq!(person.path(), Some(&PathKey::from("person")));

        // The narrowed store carries no handlers of its own.
        assert!(!person.store().has_mutation("rename"));
        person.commit("rename", json!("b")).unwrap();
        assert_eq!(person.get("name"), Some(json!("a")));

        top.commit("rename", json!("c")).unwrap();
        assert_eq!(person.get("name"), Some(json!("c")));
        assert!(person.state().ptr_eq(&top.state()));
    }

    #[test]
    fn test_remap_reads_parent() {
        let flow = Flow::new();
        let top = flow.create(json!({"a": 1, "b": "x"}));
        let mapped = top.remap(json!({"c": "${a}", "d": "b is $b"}));
        assert!(mapped.flags().contains(NodeFlags::MAPPED));
        assert_eq!(mapped.get("c"), Some(json!(1)));
        assert_eq!(mapped.get("d"), Some(json!("b is x")));
        // Inherited keys still resolve raw.
        assert_eq!(mapped.get("b"), Some(json!("x")));
    }

    #[test]
    fn test_compose_layers_children() {
        let flow = Flow::new();
        let joined = flow
            .create(json!({"top": 1, "c": 2}))
            .compose([json!({"a": 1, "c": 3}), json!({"a": 2})]);
        assert!(joined.flags().contains(NodeFlags::JOINED));
        assert_eq!(joined.get("a"), Some(json!(2)));
        assert_eq!(joined.get("c"), Some(json!(3)));
        assert_eq!(joined.keys(), vec!["a", "c"]);
        assert_eq!(joined.children().len(), 2);
        assert_eq!(joined.child(0).unwrap().get("a"), Some(json!(1)));
        assert!(joined.child(2).is_none());
    }

    #[test]
    fn test_child_list_edits() {
        let flow = Flow::new();
        let top = flow.create(json!({}));
        let joined = top.compose([json!({"a": 1})]);
        let extra = top.extend(json!({"a": 9}));

        assert_eq!(joined.add_child(&extra).unwrap(), 1);
        assert_eq!(joined.get("a"), Some(json!(9)));
        assert!(joined.remove_child(&extra).unwrap());
        assert!(!joined.remove_child(&extra).unwrap());
        assert_eq!(joined.get("a"), Some(json!(1)));

        assert!(matches!(top.add_child(&extra), Err(FlowError::NotJoined(_))));
        assert!(matches!(top.remove_child(&extra), Err(FlowError::NotJoined(_))));

        let stranger = Flow::new().create(json!({}));
        assert!(matches!(joined.add_child(&stranger), Err(FlowError::ForeignNode(_))));

        flow.release(&extra).unwrap();
        assert!(matches!(joined.add_child(&extra), Err(FlowError::Released(_))));
    }

    #[test]
    fn test_joined_child_ownership() {
        let flow = Flow::new();
        let top = flow.create(json!({}));
        let joined = top.compose([json!({"a": 1})]);
        let inner = joined.extend(json!({"a": 2}));
        joined.add_child(&inner).unwrap();
        assert_eq!(joined.get("a"), Some(json!(2)));
        assert_eq!(flow.node_count(), 5);

        // `inner` keeps `joined` alive, so the list only borrows it.
        drop(inner);
        assert_eq!(joined.children().len(), 1);
        assert_eq!(joined.get("a"), Some(json!(1)));

        drop(joined);
        assert_eq!(flow.node_count(), 2);
    }

    #[test]
    fn test_compose_child_names() {
        let config = FlowConfig {
            child_names: true,
            ..FlowConfig::default()
        };
        let flow = Flow::with_config(config);
        let list = flow.create(NodeOptions::new().name("list").state(json!({})));
        let joined = list.compose([
            NodeOptions::from(json!({"a": 1})),
            NodeOptions::new().name("kept").state(json!({"a": 2})),
        ]);
        let first = joined.child(0).unwrap();
        assert_eq!(first.name().as_deref(), Some("list/0"));
        assert_eq!(joined.child(1).unwrap().name().as_deref(), Some("kept"));

        let below = first.extend(json!({}));
        assert_eq!(below.resolve("@list/0").and_then(Resolved::into_view), Some(first));

        let plain = Flow::new()
            .create(NodeOptions::new().name("list").state(json!({})))
            .compose([json!({})]);
        assert!(plain.child(0).unwrap().name().is_none());
    }

    #[test]
    fn test_splice_inserts_copy() {
        let flow = Flow::new();
        let a = flow.create(NodeOptions::new().name("a").state(json!({"top": 1, "c": 2})));
        let b = a.extend(NodeOptions::new().name("b").state(json!({"a": 1})));
        let spliced = b.splice(NodeOptions::new().name("c").state(json!({"a": 2, "c": 5})));

        assert_ne!(spliced, b);
        assert_eq!(spliced.name().as_deref(), Some("b"));
        assert_eq!(spliced.get("a"), Some(json!(1)));
        assert_eq!(spliced.get("c"), Some(json!(5)));
        assert_eq!(spliced.parent().and_then(|p| p.name()).as_deref(), Some("c"));
        assert_eq!(spliced.find_by_name("a"), Some(a.clone()));

        // The original chain is unchanged.
        assert_eq!(b.get("c"), Some(json!(2)));
        assert_eq!(b.parent(), Some(a));
        assert!(b.state().ptr_eq(&spliced.state()));
    }

    #[test]
    fn test_relocalize_in_place_and_copy() {
        let flow = Flow::new();
        let top = flow.create(json!({"test": 1, "aaa": {}}));
        let picked = top.narrow("aaa");
        assert_eq!(picked.get("test"), Some(json!(1)));

        let same = picked.relocalize(true);
        assert_eq!(same, picked);
        assert_eq!(picked.get("test"), None);

        let copy = picked.relocalize_with(false, NodeOptions::new().name("copy"));
        assert_ne!(copy, picked);
        assert_eq!(copy.name().as_deref(), Some("copy"));
        assert_eq!(copy.get("test"), Some(json!(1)));
        assert!(picked.flags().contains(NodeFlags::LOCAL_ONLY));
    }

    #[test]
    fn test_set_name() {
        let flow = Flow::new();
        let top = flow.create(json!({}));
        let child = top.extend(json!({}));
        assert!(child.find_by_name("renamed").is_none());
        top.set_name("renamed");
        assert_eq!(child.find_by_name("renamed"), Some(top));
    }

    #[test]
    fn test_to_value_spreads_own_keys() {
        let flow = Flow::new();
        let top = flow.create(json!({"a": 1}));
        let child = top.extend(json!({"b": 2}));
        assert_eq!(child.to_value(), json!({"b": 2}));
        assert_eq!(Scope::lookup(&child, "a"), Some(json!(1)));
    }

    #[test]
    fn test_register_adds_handlers() {
        let flow = Flow::new();
        let top = flow.create(json!({"n": 0}));
        top.register(&StoreConfig::default().mutation("inc", |state, _| {
            state.update_key("n", |n| *n = json!(n.as_i64().unwrap_or(0) + 1));
            Ok(())
        }));
        top.commit("inc", Value::Null).unwrap();
        top.commit_object(&json!({"type": "inc"})).unwrap();
        assert_eq!(top.get("n"), Some(json!(2)));
    }
}
