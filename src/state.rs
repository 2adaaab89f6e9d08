//! Raw state handle.
//!
//! `State` is the one mutable data object a store owns. It is shared by
//! reference: the store, the handlers it runs, copies of the node, and the
//! embedding reactive system all hold the same handle.
//!
//! Reads and writes report to the tracker an `Observer` installed:
//!
//! | Operation | Tracker |
//! |---|---|
//! | `get(key)` on a present key | tracks that key |
//! | `contains_key(key)` | nothing |
//! | `keys()` / `snapshot()` | tracks the shape (`snapshot` also every key) |
//! | `set(key)` on a present key | triggers that key |
//! | `set(key)` on an absent key | nothing (plain assignment) |
//! | `tracking_set(key)` | triggers the key and the shape |
//! | `update_key(key, f)` | triggers that key |
//! | `update(f)` / `replace(v)` | triggers everything |

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::reactive::{Dep, Tracker};
use crate::types::{value_get, value_keys, Value};

#[derive(Clone)]
pub struct State {
    inner: Rc<StateInner>,
}

struct StateInner {
    value: RefCell<Value>,
    tracker: RefCell<Option<Rc<dyn Tracker>>>,
}

impl State {
    pub fn new(value: Value) -> Self {
        Self {
            inner: Rc::new(StateInner {
                value: RefCell::new(value),
                tracker: RefCell::new(None),
            }),
        }
    }

    /// Whether two handles point at the same state object.
    pub fn ptr_eq(&self, other: &State) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    // =========================================================================
    // Observation
    // =========================================================================

    pub fn is_observable(&self) -> bool {
        self.inner.tracker.borrow().is_some()
    }

    /// Install `tracker` unless one is already present.
    ///
    /// Returns false when the state was already observable.
    pub fn install_tracker(&self, tracker: Rc<dyn Tracker>) -> bool {
        let mut slot = self.inner.tracker.borrow_mut();
        if slot.is_some() {
            return false;
        }
        *slot = Some(tracker);
        true
    }

    fn tracker(&self) -> Option<Rc<dyn Tracker>> {
        self.inner.tracker.borrow().clone()
    }

    pub(crate) fn track(&self, dep: Dep<'_>) {
        if let Some(tracker) = self.tracker() {
            tracker.track(dep);
        }
    }

    fn trigger(&self, dep: Dep<'_>) {
        if let Some(tracker) = self.tracker() {
            tracker.trigger(dep);
        }
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Clone the entry at `key`, tracking it when present.
    pub fn get(&self, key: &str) -> Option<Value> {
        let found = value_get(&self.inner.value.borrow(), key).cloned();
        if found.is_some() {
            self.track(Dep::Key(key));
        }
        found
    }

    /// Own-key test. Never registers a dependency.
    pub fn contains_key(&self, key: &str) -> bool {
        value_get(&self.inner.value.borrow(), key).is_some()
    }

    pub fn keys(&self) -> Vec<String> {
        self.track(Dep::Shape);
        value_keys(&self.inner.value.borrow())
    }

    pub fn len(&self) -> usize {
        match &*self.inner.value.borrow() {
            Value::Object(map) => map.len(),
            Value::Array(items) => items.len(),
            _ => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_array(&self) -> bool {
        self.inner.value.borrow().is_array()
    }

    /// Deep copy of the whole object, depending on all of it.
    pub fn snapshot(&self) -> Value {
        self.track(Dep::All);
        self.inner.value.borrow().clone()
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Plain assignment.
    ///
    /// Replacing a present key notifies its readers. Inserting an absent key
    /// is not guaranteed to be observed; use `tracking_set` for that.
    pub fn set(&self, key: &str, value: Value) {
        let existed = {
            let mut data = self.inner.value.borrow_mut();
            assign(&mut data, key, value)
        };
        if existed {
            self.trigger(Dep::Key(key));
        } else {
            tracing::trace!(key, "untracked insert into state");
        }
    }

    /// Assign `key` so readers of the key and of the key set are notified.
    pub fn tracking_set(&self, key: &str, value: Value) {
        {
            let mut data = self.inner.value.borrow_mut();
            assign(&mut data, key, value);
        }
        self.trigger(Dep::Key(key));
        self.trigger(Dep::Shape);
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        let removed = {
            let mut data = self.inner.value.borrow_mut();
            match &mut *data {
                Value::Object(map) => map.shift_remove(key),
                _ => None,
            }
        };
        if removed.is_some() {
            self.trigger(Dep::Key(key));
            self.trigger(Dep::Shape);
        }
        removed
    }

    /// Mutate the entry under `key` in place, notifying its readers.
    ///
    /// Returns `None` without calling `f` when the key is absent.
    pub fn update_key<R>(&self, key: &str, f: impl FnOnce(&mut Value) -> R) -> Option<R> {
        let result = {
            let mut data = self.inner.value.borrow_mut();
            let slot = match &mut *data {
                Value::Object(map) => map.get_mut(key),
                Value::Array(items) => key.parse::<usize>().ok().and_then(|i| items.get_mut(i)),
                _ => None,
            };
            slot.map(f)
        };
        if result.is_some() {
            self.trigger(Dep::Key(key));
        }
        result
    }

    /// Mutate the whole object. Everything that read it is notified.
    pub fn update<R>(&self, f: impl FnOnce(&mut Value) -> R) -> R {
        let result = {
            let mut data = self.inner.value.borrow_mut();
            f(&mut data)
        };
        self.trigger(Dep::All);
        result
    }

    pub fn replace(&self, value: Value) -> Value {
        self.update(|data| std::mem::replace(data, value))
    }
}

/// Write `value` under `key`. Returns whether the key already existed.
fn assign(data: &mut Value, key: &str, value: Value) -> bool {
    match data {
        Value::Object(map) => map.insert(key.to_string(), value).is_some(),
        Value::Array(items) => match key.parse::<usize>() {
            Ok(index) if index < items.len() => {
                items[index] = value;
                true
            }
            Ok(index) if index == items.len() => {
                items.push(value);
                false
            }
            _ => {
                tracing::warn!(key, len = items.len(), "array assignment out of range ignored");
                false
            }
        },
        _ => {
            tracing::warn!(key, "assignment into non-container state ignored");
            false
        }
    }
}

impl fmt::Debug for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("State")
            .field("value", &*self.inner.value.borrow())
            .field("observable", &self.is_observable())
            .finish()
    }
}

impl From<Value> for State {
    fn from(value: Value) -> Self {
        State::new(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::cell::RefCell;

    #[derive(Default)]
    struct Recorder {
        tracked: RefCell<Vec<String>>,
        triggered: RefCell<Vec<String>>,
    }

    fn label(dep: Dep<'_>) -> String {
        match dep {
            Dep::Key(key) => key.to_string(),
            Dep::Shape => "<shape>".to_string(),
            Dep::All => "<all>".to_string(),
        }
    }

    impl Tracker for Recorder {
        fn track(&self, dep: Dep<'_>) {
            self.tracked.borrow_mut().push(label(dep));
        }
        fn trigger(&self, dep: Dep<'_>) {
            self.triggered.borrow_mut().push(label(dep));
        }
    }

    fn recorded(value: Value) -> (State, Rc<Recorder>) {
        let state = State::new(value);
        let recorder = Rc::new(Recorder::default());
        assert!(state.install_tracker(recorder.clone()));
        (state, recorder)
    }

    #[test]
    fn test_get_tracks_present_keys_only() {
        let (state, rec) = recorded(json!({"a": 1}));
        assert_eq!(state.get("a"), Some(json!(1)));
        assert_eq!(state.get("b"), None);
        assert_eq!(*rec.tracked.borrow(), vec!["a"]);
    }

    #[test]
    fn test_contains_key_is_untracked() {
        let (state, rec) = recorded(json!({"a": 1}));
        assert!(state.contains_key("a"));
        assert!(!state.contains_key("z"));
        assert!(rec.tracked.borrow().is_empty());
    }

    #[test]
    fn test_plain_insert_is_silent() {
        let (state, rec) = recorded(json!({"a": 1}));
        state.set("b", json!(2));
        assert_eq!(state.get("b"), Some(json!(2)));
        assert!(rec.triggered.borrow().is_empty());

        state.set("a", json!(3));
        assert_eq!(*rec.triggered.borrow(), vec!["a"]);
    }

    #[test]
    fn test_tracking_set_triggers_shape() {
        let (state, rec) = recorded(json!({}));
        state.tracking_set("n", json!(true));
        assert_eq!(*rec.triggered.borrow(), vec!["n", "<shape>"]);
    }

    #[test]
    fn test_update_key_nested() {
        let (state, rec) = recorded(json!({"aaa": {}}));
        let done = state.update_key("aaa", |aaa| {
            aaa["test"] = json!(22);
        });
        assert!(done.is_some());
        assert_eq!(state.get("aaa"), Some(json!({"test": 22})));
        assert_eq!(*rec.triggered.borrow(), vec!["aaa"]);

        assert!(state.update_key("missing", |_| ()).is_none());
    }

    #[test]
    fn test_array_assign() {
        let state = State::new(json!([1, 2]));
        state.set("1", json!(20));
        state.set("2", json!(30));
        state.set("9", json!(90));
        assert_eq!(state.snapshot(), json!([1, 20, 30]));
        assert!(state.is_array());
        assert_eq!(state.len(), 3);
    }

    #[test]
    fn test_remove_keeps_order() {
        let state = State::new(json!({"a": 1, "b": 2, "c": 3}));
        assert_eq!(state.remove("b"), Some(json!(2)));
        assert_eq!(state.keys(), vec!["a", "c"]);
    }

    #[test]
    fn test_shared_handle() {
        let state = State::new(json!({"a": 1}));
        let other = state.clone();
        other.set("a", json!(2));
        assert_eq!(state.get("a"), Some(json!(2)));
        assert!(state.ptr_eq(&other));
        assert!(!state.ptr_eq(&State::new(json!({}))));
    }
}
