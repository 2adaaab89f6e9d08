//! Resolver - the property-resolution algorithm.
//!
//! Every observation on a view walks the same precedence chain, so read,
//! has, keys and describe always agree on which keys exist:
//!
//! 1. the parent accessor key (always answers, `Null` on the root)
//! 2. the named-ancestor sigil (`@name` -> nearest node called `name`)
//! 3. the node's own members (`extend`, `narrow`, ... `dispatch`)
//! 4. the node's own effective state, see `single` and `joined`
//! 5. the parent, unless the node is local-only
//! 6. nothing
//!
//! `keys` only lists level 4, minus anything levels 1-3 would catch. Inherited
//! keys are readable (`get`, `has`) but never enumerable.

mod joined;
mod single;

use crate::flow::View;
use crate::types::{Descriptor, Member, NodeFlags, Resolved, Value};

// =============================================================================
// Operations
// =============================================================================

pub(crate) fn read(view: &View, key: &str) -> Option<Resolved> {
    if !is_resolvable(view, key) {
        return None;
    }
    let config = view.config();

    if key == config.parent_key {
        return Some(match view.parent() {
            Some(parent) => Resolved::View(parent),
            None => Resolved::Value(Value::Null),
        });
    }

    if let Some(name) = config.ancestor_name(key) {
        return view.find_by_name(name).map(Resolved::View);
    }

    if let Some(member) = Member::from_key(key) {
        return Some(Resolved::Member(view.bind(member)));
    }

    if let Some(value) = own_read(view, key) {
        return Some(Resolved::Value(value));
    }

    delegate(view, |parent| read(parent, key)).flatten()
}

pub(crate) fn has(view: &View, key: &str) -> bool {
    read(view, key).is_some()
}

pub(crate) fn keys(view: &View) -> Vec<String> {
    if !is_resolvable(view, "") {
        return Vec::new();
    }
    own_keys(view)
        .into_iter()
        .filter(|key| !is_shadowed(view, key))
        .collect()
}

pub(crate) fn describe(view: &View, key: &str) -> Option<Descriptor> {
    if !is_resolvable(view, key) || is_shadowed(view, key) {
        return None;
    }
    own_read(view, key).map(Descriptor::own)
}

/// Writes never reach real state. They land in the node's shadow map.
pub(crate) fn write(view: &View, key: &str, value: Value) {
    tracing::warn!(
        node = %view.id(),
        key,
        "write to a flow view ignored, use commit or dispatch"
    );
    view.node().shadow_write(key, value);
}

// =============================================================================
// Shared levels
// =============================================================================

/// Level 4 for any node kind.
pub(crate) fn own_read(view: &View, key: &str) -> Option<Value> {
    if view.node().is_joined() {
        joined::own_read(view, key)
    } else {
        single::own_read(view, key)
    }
}

pub(crate) fn own_keys(view: &View) -> Vec<String> {
    if view.node().is_joined() {
        joined::own_keys(view)
    } else {
        single::own_keys(view)
    }
}

/// Keys that levels 1-3 answer before own state is ever consulted.
fn is_shadowed(view: &View, key: &str) -> bool {
    let config = view.config();
    key == config.parent_key
        || config.ancestor_name(key).is_some()
        || Member::from_key(key).is_some()
}

fn delegate<T>(view: &View, op: impl FnOnce(&View) -> T) -> Option<T> {
    if view.flags().contains(NodeFlags::LOCAL_ONLY) {
        return None;
    }
    let parent = view.parent()?;
    Some(op(&parent))
}

fn is_resolvable(view: &View, key: &str) -> bool {
    if view.is_live() {
        return true;
    }
    tracing::warn!(node = %view.id(), key, "resolution on a released node");
    false
}
