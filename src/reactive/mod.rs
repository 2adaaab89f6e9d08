//! Reactive Module - the observation system a store rides on
//!
//! The store never propagates changes itself. It only asks an `Observer` to
//! mark raw state observable and to perform notifying inserts; `State` then
//! reports every tracked read and every write to the installed `Tracker`.
//!
//! - **Observer** - `mark_observable` + `tracking_set`, the two primitives the core calls
//! - **Tracker** - per-state dependency sink installed by an observer
//! - **SignalObserver** - spark-signals backed observer, effects re-run on change
//! - **NoopObserver** - marks state without tracking anything
//!
//! # Example
//!
//! ```ignore
//! use std::rc::Rc;
//! use spark_flowstore::{Flow, FlowConfig, SignalObserver};
//!
//! let flow = Flow::with_observer(FlowConfig::default(), Rc::new(SignalObserver));
//! ```

mod signals;

use std::rc::Rc;

use crate::state::State;
use crate::types::Value;

pub use signals::{SignalObserver, SignalTracker};

/// A dependency on some part of a state object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dep<'a> {
    /// One top-level key.
    Key(&'a str),
    /// The key set itself (insertions, removals).
    Shape,
    /// Every key plus the shape, for writes that may touch anything.
    All,
}

/// Receives read and write notifications for one state object.
pub trait Tracker {
    fn track(&self, dep: Dep<'_>);
    fn trigger(&self, dep: Dep<'_>);
}

/// The external reactive observation system.
pub trait Observer {
    /// Make `state` observable. Must be idempotent.
    fn mark_observable(&self, state: &State);

    /// Assign `key` so that existing subscribers see the new entry.
    fn tracking_set(&self, state: &State, key: &str, value: Value) {
        if !state.is_observable() {
            self.mark_observable(state);
        }
        state.tracking_set(key, value);
    }
}

// =============================================================================
// NoopObserver
// =============================================================================

struct NoopTracker;

impl Tracker for NoopTracker {
    fn track(&self, _dep: Dep<'_>) {}
    fn trigger(&self, _dep: Dep<'_>) {}
}

/// Observer that marks state without tracking anything.
///
/// Useful where no reactive runtime is driving the flow.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl Observer for NoopObserver {
    fn mark_observable(&self, state: &State) {
        state.install_tracker(Rc::new(NoopTracker));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_noop_marks_once() {
        let state = State::new(json!({}));
        assert!(!state.is_observable());
        NoopObserver.mark_observable(&state);
        assert!(state.is_observable());
        NoopObserver.mark_observable(&state);
        assert!(state.is_observable());
    }

    #[test]
    fn test_tracking_set_marks_if_needed() {
        let state = State::new(json!({}));
        NoopObserver.tracking_set(&state, "a", json!(1));
        assert!(state.is_observable());
        assert_eq!(state.get("a"), Some(json!(1)));
    }
}
