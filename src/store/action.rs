//! Action dispatch.
//!
//! A single registered handler hands back its own future untouched. Several
//! handlers are all started in registration order and combined: the result
//! resolves to an array of their values once every one has resolved, and
//! fails as soon as any one fails.

use std::rc::Rc;

use futures::future::{try_join_all, LocalBoxFuture};
use futures::{FutureExt, TryFutureExt};

use super::{object_type, Store};
use crate::state::State;
use crate::types::Value;

pub type ActionFuture = LocalBoxFuture<'static, anyhow::Result<Value>>;

/// What an action handler sees: its store's commit/dispatch and state.
#[derive(Clone)]
pub struct ActionContext {
    store: Rc<Store>,
}

impl ActionContext {
    pub(crate) fn new(store: Rc<Store>) -> Self {
        Self { store }
    }

    pub fn commit(&self, ty: &str, payload: Value) -> anyhow::Result<()> {
        self.store.commit(ty, payload)
    }

    pub fn dispatch(&self, ty: &str, payload: Value) -> Option<ActionFuture> {
        self.store.dispatch(ty, payload)
    }

    pub fn state(&self) -> State {
        self.store.state()
    }

    pub fn store(&self) -> &Rc<Store> {
        &self.store
    }
}

impl Store {
    /// Start every action handler registered under `ty`.
    ///
    /// # Arguments
    /// * `ty` - Action type
    /// * `payload` - Passed to each handler with a context bound to this store
    ///
    /// # Returns
    /// `None` for an unknown type, logged at error level. A single handler's
    /// future comes back untouched; several are joined and fail together.
    pub fn dispatch(self: &Rc<Self>, ty: &str, payload: Value) -> Option<ActionFuture> {
        let handlers = self.actions.borrow().get(ty).cloned();
        let Some(handlers) = handlers else {
            tracing::error!(action = ty, "unknown action type");
            return None;
        };

        if let [only] = handlers.as_slice() {
            return Some(only(ActionContext::new(self.clone()), payload));
        }

        let started: Vec<ActionFuture> = handlers
            .iter()
            .map(|handler| handler(ActionContext::new(self.clone()), payload.clone()))
            .collect();
        Some(try_join_all(started).map_ok(Value::Array).boxed_local())
    }

    /// Object-style dispatch: `{"type": "load", ...}` is both type and payload.
    pub fn dispatch_object(self: &Rc<Self>, action: &Value) -> Option<ActionFuture> {
        match object_type(action) {
            Some(ty) => self.dispatch(&ty, action.clone()),
            None => {
                tracing::error!(?action, "action object without a type");
                None
            }
        }
    }
}
