//! Node Registry - slot allocation for scope nodes.
//!
//! Manages the lifecycle of node slots inside one flow:
//! - Slot allocation with a free pool for O(1) reuse
//! - Generation counters so a reused slot never answers for a stale id
//! - Automatic vacating once the last strong handle on a node goes away
//! - Optional early release of a node and everything parented to it
//!
//! Slots only hold `Weak` references. Nodes are owned by the views handed
//! out for them, by their children (a child keeps its parent alive) and by
//! joined nodes' child lists. When a node drops, its `SlotHandle` vacates
//! the slot and bumps the generation, so ids of dropped nodes go stale the
//! same way released ones do.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use super::node::FlowNode;
use crate::types::NodeId;

// =============================================================================
// Registry State
// =============================================================================

struct Slot {
    generation: u32,
    node: Option<Weak<FlowNode>>,
}

#[derive(Default)]
struct Slots {
    /// Slots by index. A `None` node marks a free slot.
    slots: RefCell<Vec<Slot>>,
    /// Freed slot indices for reuse.
    free: RefCell<Vec<u32>>,
}

impl Slots {
    /// Free the slot `id` names, unless it already moved on.
    fn vacate(&self, id: NodeId) -> bool {
        {
            let mut slots = self.slots.borrow_mut();
            let Some(slot) = slots.get_mut(id.index as usize) else {
                return false;
            };
            if slot.generation != id.generation || slot.node.is_none() {
                return false;
            }
            slot.node = None;
            slot.generation = slot.generation.wrapping_add(1);
        }
        self.free.borrow_mut().push(id.index);
        true
    }
}

/// A node's tie back to its slot. Vacates the slot when dropped with the node.
pub(crate) struct SlotHandle {
    pub(crate) id: NodeId,
    slots: Weak<Slots>,
}

impl SlotHandle {
    /// A handle tied to no registry.
    #[cfg(test)]
    pub(crate) fn detached(id: NodeId) -> Self {
        Self {
            id,
            slots: Weak::new(),
        }
    }
}

impl Drop for SlotHandle {
    fn drop(&mut self) {
        // The registry may already be gone when the flow itself drops.
        if let Some(slots) = self.slots.upgrade() {
            if slots.vacate(self.id) {
                tracing::trace!(node = %self.id, "reclaimed node");
            }
        }
    }
}

#[derive(Default)]
pub(crate) struct NodeRegistry {
    shared: Rc<Slots>,
}

impl NodeRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    // =========================================================================
    // Allocation
    // =========================================================================

    /// Allocate a slot and record the node `build` makes for it.
    ///
    /// # Arguments
    /// * `build` - Makes the node from the handle of its new slot
    ///
    /// # Returns
    /// The only strong handle on the node. The slot stays occupied until
    /// every clone of it is dropped or the node is released.
    pub(crate) fn allocate(&self, build: impl FnOnce(SlotHandle) -> FlowNode) -> Rc<FlowNode> {
        let reused = self.shared.free.borrow_mut().pop();
        let id = match reused {
            Some(index) => {
                let slots = self.shared.slots.borrow();
                NodeId {
                    index,
                    generation: slots[index as usize].generation,
                }
            }
            None => {
                let mut slots = self.shared.slots.borrow_mut();
                slots.push(Slot {
                    generation: 0,
                    node: None,
                });
                NodeId {
                    index: (slots.len() - 1) as u32,
                    generation: 0,
                }
            }
        };

        let handle = SlotHandle {
            id,
            slots: Rc::downgrade(&self.shared),
        };
        let node = Rc::new(build(handle));
        self.shared.slots.borrow_mut()[id.index as usize].node = Some(Rc::downgrade(&node));
        node
    }

    /// Release a node and, first, every live node whose parent it is.
    ///
    /// Released nodes stay readable through handles that still hold them,
    /// but their ids go stale. Returns how many nodes were released. Stale
    /// ids release nothing.
    pub(crate) fn release(&self, id: NodeId) -> usize {
        if self.get(id).is_none() {
            return 0;
        }

        // Collect first, release after: releasing mutates the slots.
        let children: Vec<NodeId> = self
            .shared
            .slots
            .borrow()
            .iter()
            .filter_map(|slot| slot.node.as_ref()?.upgrade())
            .filter(|node| node.parent == Some(id))
            .map(|node| node.id)
            .collect();

        let mut released = 0;
        for child in children {
            released += self.release(child);
        }

        self.shared.vacate(id);
        tracing::trace!(node = %id, "released node");
        released + 1
    }

    // =========================================================================
    // Lookups
    // =========================================================================

    pub(crate) fn get(&self, id: NodeId) -> Option<Rc<FlowNode>> {
        let slots = self.shared.slots.borrow();
        let slot = slots.get(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.node.as_ref()?.upgrade()
    }

    pub(crate) fn is_live(&self, id: NodeId) -> bool {
        self.get(id).is_some()
    }

    /// Count of live nodes.
    pub(crate) fn live_count(&self) -> usize {
        self.shared
            .slots
            .borrow()
            .iter()
            .filter(|slot| slot.node.as_ref().is_some_and(|node| node.strong_count() > 0))
            .count()
    }

    /// Number of slots ever allocated, live or free.
    pub(crate) fn capacity(&self) -> usize {
        self.shared.slots.borrow().len()
    }
}
