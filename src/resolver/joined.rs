//! Own-state resolution for joined nodes.
//!
//! A joined node has no data of its own. Its children are layered: the
//! latest child owning a key wins, and the key set is the union of every
//! child's keys in registration order.

use indexmap::IndexSet;

use crate::flow::View;
use crate::types::Value;

pub(super) fn own_read(view: &View, key: &str) -> Option<Value> {
    view.children()
        .iter()
        .rev()
        .find_map(|child| super::own_read(child, key))
}

pub(super) fn own_keys(view: &View) -> Vec<String> {
    let mut union = IndexSet::new();
    for child in view.children() {
        union.extend(super::own_keys(&child));
    }
    union.into_iter().collect()
}
