//! Store Module - raw state plus mutation/action registry
//!
//! A `Store` owns one raw `State` and two handler registries:
//!
//! - **Mutations** - synchronous, run in registration order by `commit`
//! - **Actions** - asynchronous, started in registration order by `dispatch`
//!
//! Registering twice under the same name fans out; nothing is overwritten.
//! Unknown types are logged at error level and become no-ops.
//!
//! # Example
//!
//! ```ignore
//! use serde_json::json;
//! use spark_flowstore::store::StoreConfig;
//!
//! let config = StoreConfig::new(json!({"a": 1}))
//!     .mutation("setA", |state, payload| {
//!         state.set("a", payload.clone());
//!         Ok(())
//!     })
//!     .action("setA", |ctx, payload| async move {
//!         ctx.commit("setA", payload)?;
//!         anyhow::Ok(serde_json::Value::Null)
//!     });
//! ```

mod action;

use std::cell::RefCell;
use std::fmt;
use std::future::Future;
use std::rc::Rc;

use futures::FutureExt;
use indexmap::IndexMap;

use crate::reactive::{Dep, Observer};
use crate::state::State;
use crate::types::Value;

pub use action::{ActionContext, ActionFuture};

/// Synchronous state change. Receives the raw state and the payload.
pub type MutationFn = Rc<dyn Fn(&State, &Value) -> anyhow::Result<()>>;

/// Asynchronous handler. Receives a context bound to its store.
pub type ActionFn = Rc<dyn Fn(ActionContext, Value) -> ActionFuture>;

// =============================================================================
// StateSource
// =============================================================================

/// Where a new store's raw state comes from.
#[derive(Clone, Default)]
pub enum StateSource {
    /// A fresh empty object.
    #[default]
    Empty,
    /// A fresh state holding a copy of this value.
    Value(Value),
    /// An existing state object, shared by reference.
    Shared(State),
    /// Called once per store construction.
    Factory(Rc<dyn Fn() -> Value>),
}

impl StateSource {
    pub(crate) fn produce(&self) -> State {
        match self {
            StateSource::Empty => State::new(Value::Object(Default::default())),
            StateSource::Value(value) => State::new(value.clone()),
            StateSource::Shared(state) => state.clone(),
            StateSource::Factory(factory) => State::new(factory()),
        }
    }
}

impl fmt::Debug for StateSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateSource::Empty => f.write_str("Empty"),
            StateSource::Value(value) => f.debug_tuple("Value").field(value).finish(),
            StateSource::Shared(state) => f.debug_tuple("Shared").field(state).finish(),
            StateSource::Factory(_) => f.write_str("Factory(..)"),
        }
    }
}

// =============================================================================
// StoreConfig
// =============================================================================

/// State source plus the named handlers to register on construction.
#[derive(Clone, Default)]
pub struct StoreConfig {
    pub state: StateSource,
    pub mutations: IndexMap<String, MutationFn>,
    pub actions: IndexMap<String, ActionFn>,
}

impl StoreConfig {
    pub fn new(state: Value) -> Self {
        Self::from_source(StateSource::Value(state))
    }

    pub fn from_source(state: StateSource) -> Self {
        Self {
            state,
            mutations: IndexMap::new(),
            actions: IndexMap::new(),
        }
    }

    /// Use a factory that builds the initial state for each store.
    pub fn with_factory(factory: impl Fn() -> Value + 'static) -> Self {
        Self::from_source(StateSource::Factory(Rc::new(factory)))
    }

    pub fn mutation<F>(mut self, name: &str, handler: F) -> Self
    where
        F: Fn(&State, &Value) -> anyhow::Result<()> + 'static,
    {
        self.mutations.insert(name.to_string(), Rc::new(handler));
        self
    }

    pub fn action<F, Fut>(mut self, name: &str, handler: F) -> Self
    where
        F: Fn(ActionContext, Value) -> Fut + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + 'static,
    {
        self.actions.insert(name.to_string(), boxed_action(handler));
        self
    }
}

impl fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreConfig")
            .field("state", &self.state)
            .field("mutations", &self.mutations.keys().collect::<Vec<_>>())
            .field("actions", &self.actions.keys().collect::<Vec<_>>())
            .finish()
    }
}

pub(crate) fn boxed_action<F, Fut>(handler: F) -> ActionFn
where
    F: Fn(ActionContext, Value) -> Fut + 'static,
    Fut: Future<Output = anyhow::Result<Value>> + 'static,
{
    Rc::new(move |ctx, payload| handler(ctx, payload).boxed_local())
}

// =============================================================================
// Store
// =============================================================================

pub struct Store {
    state: RefCell<State>,
    intercept: bool,
    observer: Rc<dyn Observer>,
    mutations: RefCell<IndexMap<String, Vec<MutationFn>>>,
    actions: RefCell<IndexMap<String, Vec<ActionFn>>>,
}

impl Store {
    /// Build a store from `config`.
    ///
    /// The initial state is produced from the config's source but never
    /// read. `state_reactive` asserts the state is already observable so
    /// marking is skipped.
    pub fn new(
        config: Option<&StoreConfig>,
        intercept: bool,
        state_reactive: bool,
        observer: Rc<dyn Observer>,
    ) -> Rc<Self> {
        let state = config
            .map(|config| config.state.produce())
            .unwrap_or_else(|| StateSource::Empty.produce());
        let store = Rc::new(Self {
            state: RefCell::new(state.clone()),
            intercept,
            observer,
            mutations: RefCell::new(IndexMap::new()),
            actions: RefCell::new(IndexMap::new()),
        });
        store.set_state(state, state_reactive);
        store.register(config);
        store
    }

    /// Externally visible state.
    ///
    /// With `intercept` set, every access also depends on the key set of the
    /// raw state, so entries added later are observed through this store.
    pub fn state(&self) -> State {
        let state = self.state.borrow().clone();
        if self.intercept {
            state.track(Dep::Shape);
        }
        state
    }

    /// The raw state handle, without the intercept dependency.
    pub fn raw_state(&self) -> State {
        self.state.borrow().clone()
    }

    pub fn is_intercepted(&self) -> bool {
        self.intercept
    }

    /// Install `raw` as this store's state, marking it observable unless
    /// the caller says it already is.
    pub fn set_state(&self, raw: State, already_reactive: bool) {
        if !already_reactive && !raw.is_observable() {
            self.observer.mark_observable(&raw);
        }
        *self.state.borrow_mut() = raw;
    }

    pub fn observer(&self) -> Rc<dyn Observer> {
        self.observer.clone()
    }

    // =========================================================================
    // Registration
    // =========================================================================

    pub fn register(&self, config: Option<&StoreConfig>) {
        let Some(config) = config else { return };
        for (name, handler) in &config.mutations {
            self.register_mutation(name, handler.clone());
        }
        for (name, handler) in &config.actions {
            self.register_action(name, handler.clone());
        }
    }

    pub fn register_mutation(&self, name: &str, handler: MutationFn) {
        self.mutations
            .borrow_mut()
            .entry(name.to_string())
            .or_default()
            .push(handler);
    }

    pub fn register_action(&self, name: &str, handler: ActionFn) {
        self.actions
            .borrow_mut()
            .entry(name.to_string())
            .or_default()
            .push(handler);
    }

    pub fn has_mutation(&self, name: &str) -> bool {
        self.mutations.borrow().contains_key(name)
    }

    pub fn has_action(&self, name: &str) -> bool {
        self.actions.borrow().contains_key(name)
    }

    // =========================================================================
    // Commit
    // =========================================================================

    /// Run every mutation handler registered under `ty`, in order.
    ///
    /// # Arguments
    /// * `ty` - Mutation type
    /// * `payload` - Passed to each handler along with the raw state
    ///
    /// # Returns
    /// The first handler error as is; later handlers do not run. An unknown
    /// type is logged at error level and returns `Ok`.
    pub fn commit(&self, ty: &str, payload: Value) -> anyhow::Result<()> {
        // Clone the list out: handlers may register or commit re-entrantly.
        let handlers = self.mutations.borrow().get(ty).cloned();
        let Some(handlers) = handlers else {
            tracing::error!(mutation = ty, "unknown mutation type");
            return Ok(());
        };
        let state = self.state.borrow().clone();
        for handler in handlers {
            handler(&state, &payload)?;
        }
        Ok(())
    }

    /// Object-style commit: `{"type": "setA", ...}` is both type and payload.
    pub fn commit_object(&self, mutation: &Value) -> anyhow::Result<()> {
        match object_type(mutation) {
            Some(ty) => self.commit(&ty, mutation.clone()),
            None => {
                tracing::error!(?mutation, "mutation object without a type");
                Ok(())
            }
        }
    }
}

pub(crate) fn object_type(value: &Value) -> Option<String> {
    value.get("type")?.as_str().map(str::to_string)
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("state", &*self.state.borrow())
            .field("intercept", &self.intercept)
            .field("mutations", &self.mutations.borrow().keys().collect::<Vec<_>>())
            .field("actions", &self.actions.borrow().keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::NoopObserver;
    use serde_json::json;
    use std::cell::Cell;

    fn store(config: StoreConfig) -> Rc<Store> {
        Store::new(Some(&config), false, false, Rc::new(NoopObserver))
    }

    #[test]
    fn test_commit_visible_immediately() {
        let s = store(StoreConfig::new(json!({"a": 1})).mutation("setA", |state, v| {
            state.set("a", v.clone());
            Ok(())
        }));
        s.commit("setA", json!(123)).unwrap();
        assert_eq!(s.state().get("a"), Some(json!(123)));
    }

    #[test]
    fn test_unknown_mutation_is_noop() {
        let s = store(StoreConfig::new(json!({"a": 1})));
        assert!(s.commit("nope", json!(1)).is_ok());
        assert_eq!(s.state().get("a"), Some(json!(1)));
    }

    #[test]
    fn test_fan_out_in_order() {
        let s = store(StoreConfig::new(json!({"log": []})));
        for tag in ["first", "second"] {
            s.register_mutation(
                "push",
                Rc::new(move |state: &State, _: &Value| -> anyhow::Result<()> {
                    state.update_key("log", |log| {
                        if let Value::Array(items) = log {
                            items.push(json!(tag));
                        }
                    });
                    Ok(())
                }),
            );
        }
        s.commit("push", Value::Null).unwrap();
        assert_eq!(s.state().get("log"), Some(json!(["first", "second"])));
    }

    #[test]
    fn test_handler_error_propagates_and_stops() {
        let later = Rc::new(Cell::new(false));
        let later_clone = later.clone();
        let s = store(StoreConfig::new(json!({})));
        s.register_mutation("boom", Rc::new(|_: &State, _: &Value| -> anyhow::Result<()> {
            anyhow::bail!("bad payload")
        }));
        s.register_mutation(
            "boom",
            Rc::new(move |_: &State, _: &Value| -> anyhow::Result<()> {
                later_clone.set(true);
                Ok(())
            }),
        );
        let err = s.commit("boom", Value::Null).unwrap_err();
        assert_eq!(err.to_string(), "bad payload");
        assert!(!later.get());
    }

    #[test]
    fn test_commit_object() {
        let s = store(StoreConfig::new(json!({"a": 0})).mutation("set", |state, v| {
            state.set("a", v["value"].clone());
            Ok(())
        }));
        s.commit_object(&json!({"type": "set", "value": 7})).unwrap();
        assert_eq!(s.state().get("a"), Some(json!(7)));
        assert!(s.commit_object(&json!({"value": 8})).is_ok());
        assert_eq!(s.state().get("a"), Some(json!(7)));
    }

    #[test]
    fn test_state_marked_observable() {
        let s = store(StoreConfig::new(json!({})));
        assert!(s.state().is_observable());

        let raw = State::new(json!({}));
        let reactive = Store::new(
            Some(&StoreConfig::from_source(StateSource::Shared(raw.clone()))),
            false,
            true,
            Rc::new(NoopObserver),
        );
        assert!(!reactive.state().is_observable());
        assert!(reactive.state().ptr_eq(&raw));
    }

    #[test]
    fn test_factory_called_per_store() {
        let calls = Rc::new(Cell::new(0));
        let calls_clone = calls.clone();
        let config = StoreConfig::with_factory(move || {
            calls_clone.set(calls_clone.get() + 1);
            json!({"n": calls_clone.get()})
        });
        let a = store(config.clone());
        let b = store(config);
        assert_eq!(calls.get(), 2);
        assert_eq!(a.state().get("n"), Some(json!(1)));
        assert_eq!(b.state().get("n"), Some(json!(2)));
    }

    #[test]
    fn test_no_config_gives_empty_object() {
        let s = Store::new(None, true, false, Rc::new(NoopObserver));
        assert!(s.state().is_empty());
        assert!(s.is_intercepted());
        assert!(!s.has_mutation("x"));
    }
}
