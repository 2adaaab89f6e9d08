//! Flow Engine - node storage and construction.
//!
//! The engine manages the core data structures:
//! - Registry: weak slots, generation-checked ids, reclaim on drop, release
//! - FlowNode: one scope node (store, parent, path, flags, child list)
//! - NodeOptions: what a node is built from
//!
//! # Architecture
//!
//! The registry never keeps a node alive. Ownership points up the chain
//! and down into joined child lists only:
//!
//! ```text
//! n0v0: root   (parent=-,    flags=NONE)              held by the Flow
//! n1v0: top    (parent=n0v0, flags=NONE)              holds n0v0
//! n2v0: join   (parent=n1v0, flags=JOINED,            holds n1v0, n3v0, n4v0
//!               children=[n3v0, n4v0])
//! n3v0: {a, c} (parent=n2v0)                          holds nothing
//! n4v0: {a}    (parent=n2v0)                          holds nothing
//! ```
//!
//! A view on `n4v0` alone does not keep `n2v0` alive. Once the joined view
//! goes, the child's parent lookup comes back empty.

pub(crate) mod node;
pub(crate) mod registry;

pub use node::NodeOptions;
pub(crate) use node::FlowNode;
pub(crate) use registry::NodeRegistry;
