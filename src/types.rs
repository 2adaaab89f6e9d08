//! Core types for spark-flowstore.
//!
//! These types define the foundation that everything builds on.
//! They flow through the resolver and define what a view can hand back.

use std::fmt;

use crate::flow::View;

/// Dynamic data held by a store. Objects keep insertion order.
pub type Value = serde_json::Value;

/// Ordered object map used for state objects.
pub type Map = serde_json::Map<String, Value>;

// =============================================================================
// PathKey - narrowing key
// =============================================================================

/// A key or array index used to narrow a node onto part of its parent's data.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathKey {
    Key(String),
    Index(usize),
}

impl PathKey {
    /// The property name this path resolves through.
    ///
    /// Indices are looked up by their decimal form, the same way array
    /// entries are exposed by `View::keys`.
    pub fn as_key(&self) -> String {
        match self {
            PathKey::Key(key) => key.clone(),
            PathKey::Index(index) => index.to_string(),
        }
    }
}

impl fmt::Display for PathKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathKey::Key(key) => f.write_str(key),
            PathKey::Index(index) => write!(f, "{index}"),
        }
    }
}

impl From<&str> for PathKey {
    fn from(key: &str) -> Self {
        PathKey::Key(key.to_string())
    }
}

impl From<String> for PathKey {
    fn from(key: String) -> Self {
        PathKey::Key(key)
    }
}

impl From<usize> for PathKey {
    fn from(index: usize) -> Self {
        PathKey::Index(index)
    }
}

impl<'de> serde::Deserialize<'de> for PathKey {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(serde::Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Index(usize),
            Key(String),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Index(index) => PathKey::Index(index),
            Raw::Key(key) => PathKey::Key(key),
        })
    }
}

/// Look up `key` directly inside a plain value.
///
/// Objects match by property name, arrays by decimal index. Anything else
/// owns no keys.
pub fn value_get<'a>(value: &'a Value, key: &str) -> Option<&'a Value> {
    match value {
        Value::Object(map) => map.get(key),
        Value::Array(items) => key.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    }
}

/// Own enumerable keys of a plain value, in order.
pub fn value_keys(value: &Value) -> Vec<String> {
    match value {
        Value::Object(map) => map.keys().cloned().collect(),
        Value::Array(items) => (0..items.len()).map(|i| i.to_string()).collect(),
        _ => Vec::new(),
    }
}

// =============================================================================
// Node identity and flags
// =============================================================================

/// Generation-checked handle into a flow's node arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId {
    pub index: u32,
    pub generation: u32,
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}v{}", self.index, self.generation)
    }
}

bitflags::bitflags! {
    /// Behavior flags of a scope node.
    ///
    /// Combine with bitwise OR: `NodeFlags::LOCAL_ONLY | NodeFlags::MAPPED`
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct NodeFlags: u8 {
        const NONE = 0;
        /// Never delegate a miss to the parent.
        const LOCAL_ONLY = 1 << 0;
        /// Own entries are templates resolved against the parent.
        const MAPPED = 1 << 1;
        /// Own data is the layered union of the child list.
        const JOINED = 1 << 2;
    }
}

// =============================================================================
// Members - operators reachable by key
// =============================================================================

/// Node members that shadow state keys of the same name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Member {
    Extend,
    Narrow,
    Remap,
    Compose,
    Splice,
    Relocalize,
    FindByName,
    AddChild,
    RemoveChild,
    Child,
    State,
    Commit,
    Dispatch,
    Register,
}

impl Member {
    pub const ALL: [Member; 14] = [
        Member::Extend,
        Member::Narrow,
        Member::Remap,
        Member::Compose,
        Member::Splice,
        Member::Relocalize,
        Member::FindByName,
        Member::AddChild,
        Member::RemoveChild,
        Member::Child,
        Member::State,
        Member::Commit,
        Member::Dispatch,
        Member::Register,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Member::Extend => "extend",
            Member::Narrow => "narrow",
            Member::Remap => "remap",
            Member::Compose => "compose",
            Member::Splice => "splice",
            Member::Relocalize => "relocalize",
            Member::FindByName => "find_by_name",
            Member::AddChild => "add_child",
            Member::RemoveChild => "remove_child",
            Member::Child => "child",
            Member::State => "state",
            Member::Commit => "commit",
            Member::Dispatch => "dispatch",
            Member::Register => "register",
        }
    }

    pub fn from_key(key: &str) -> Option<Member> {
        Member::ALL.into_iter().find(|member| member.as_str() == key)
    }
}

/// A member bound to the view it was read from.
///
/// Carries the node's identity no matter where it is passed afterwards.
#[derive(Clone)]
pub struct BoundMember {
    pub member: Member,
    pub view: View,
}

impl fmt::Debug for BoundMember {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundMember")
            .field("member", &self.member)
            .field("node", &self.view.id())
            .finish()
    }
}

// =============================================================================
// Resolution results
// =============================================================================

/// What a read on a view produced.
#[derive(Debug, Clone)]
pub enum Resolved {
    /// Plain data from some node's effective state (or a mapped result).
    Value(Value),
    /// A node handle: the parent accessor or a named ancestor.
    View(View),
    /// One of the node's own operators.
    Member(BoundMember),
}

impl Resolved {
    pub fn into_value(self) -> Option<Value> {
        match self {
            Resolved::Value(value) => Some(value),
            _ => None,
        }
    }

    pub fn into_view(self) -> Option<View> {
        match self {
            Resolved::View(view) => Some(view),
            _ => None,
        }
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Resolved::Value(value) => Some(value),
            _ => None,
        }
    }
}

/// Property descriptor of an own key.
///
/// Views never accept real writes, so `writable` is always false.
#[derive(Debug, Clone, PartialEq)]
pub struct Descriptor {
    pub value: Value,
    pub enumerable: bool,
    pub configurable: bool,
    pub writable: bool,
}

impl Descriptor {
    pub fn own(value: Value) -> Self {
        Self {
            value,
            enumerable: true,
            configurable: true,
            writable: false,
        }
    }
}
