//! spark-signals backed observation.
//!
//! Each observable state gets one `Signal<u64>` for its key set plus one
//! lazily created signal per key that was ever read while present. A write
//! bumps the matching signal to a fresh clock value, so any effect or
//! derived that read through it re-runs.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use spark_signals::{signal, Signal};

use super::{Dep, Observer, Tracker};
use crate::state::State;

/// Observer that installs a `SignalTracker` on every state it marks.
#[derive(Debug, Clone, Copy, Default)]
pub struct SignalObserver;

impl Observer for SignalObserver {
    fn mark_observable(&self, state: &State) {
        if state.is_observable() {
            return;
        }
        state.install_tracker(Rc::new(SignalTracker::new()));
    }
}

pub struct SignalTracker {
    shape: Signal<u64>,
    keys: RefCell<HashMap<String, Signal<u64>>>,
    clock: Cell<u64>,
}

impl SignalTracker {
    pub fn new() -> Self {
        Self {
            shape: signal(0),
            keys: RefCell::new(HashMap::new()),
            clock: Cell::new(0),
        }
    }

    fn key_signal(&self, key: &str) -> Signal<u64> {
        if let Some(existing) = self.keys.borrow().get(key) {
            return existing.clone();
        }
        let created = signal(0);
        self.keys
            .borrow_mut()
            .insert(key.to_string(), created.clone());
        created
    }

    fn bump(&self, target: &Signal<u64>) {
        let next = self.clock.get() + 1;
        self.clock.set(next);
        target.set(next);
    }
}

impl Default for SignalTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl Tracker for SignalTracker {
    fn track(&self, dep: Dep<'_>) {
        match dep {
            Dep::Key(key) => {
                let _ = self.key_signal(key).get();
            }
            Dep::Shape => {
                let _ = self.shape.get();
            }
            Dep::All => {
                let _ = self.shape.get();
                let all: Vec<Signal<u64>> = self.keys.borrow().values().cloned().collect();
                for sig in all {
                    let _ = sig.get();
                }
            }
        }
    }

    fn trigger(&self, dep: Dep<'_>) {
        // Collect first: effects re-run synchronously and may track new keys.
        let targets: Vec<Signal<u64>> = match dep {
            Dep::Key(key) => self.keys.borrow().get(key).cloned().into_iter().collect(),
            Dep::Shape => vec![self.shape.clone()],
            Dep::All => {
                let mut all: Vec<Signal<u64>> = self.keys.borrow().values().cloned().collect();
                all.push(self.shape.clone());
                all
            }
        };
        for target in &targets {
            self.bump(target);
        }
    }
}
