//! Store Context
//!
//! One context per instantiated store: the keyed state bag, the unique
//! instance identifier, and the per-context binding cache. A context is
//! created by exactly one `create_store`/`create_store_with` call and lives
//! as long as any bound wrapper or active scope still references it.

use crate::bind::BindingCache;
use parking_lot::RwLock;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// A state update handed to `set_store` / `StoreContext::update`.
///
/// Either a patch value applied directly, or an updater computing one from
/// the current state. In both cases the produced value is merged key-by-key
/// into the state when it is an object, and replaces the state wholesale when
/// it is anything else (including `Null`).
pub enum StateUpdate {
    Patch(Value),
    Updater(Box<dyn FnOnce(&Value) -> Value + Send>),
}

impl StateUpdate {
    /// Build an updater from a closure over the current state.
    pub fn with<F>(f: F) -> Self
    where
        F: FnOnce(&Value) -> Value + Send + 'static,
    {
        StateUpdate::Updater(Box::new(f))
    }
}

impl From<Value> for StateUpdate {
    fn from(value: Value) -> Self {
        StateUpdate::Patch(value)
    }
}

impl fmt::Debug for StateUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateUpdate::Patch(value) => f.debug_tuple("Patch").field(value).finish(),
            StateUpdate::Updater(_) => f.write_str("Updater(..)"),
        }
    }
}

/// The context of one store instance.
///
/// Every bound function and record of the instance shares this context by
/// reference, so a mutation made through one bound method is observed by all
/// the others. Contexts from independent `create_store` calls are disjoint.
pub struct StoreContext {
    instance_id: String,
    state: RwLock<Value>,
    pub(crate) bindings: BindingCache,
}

impl StoreContext {
    pub(crate) fn new(initial: Value) -> Arc<Self> {
        let instance_id = format!("store_{}", Uuid::new_v4().simple());
        debug!(instance_id = %instance_id, "created store context");
        Arc::new(StoreContext {
            instance_id,
            state: RwLock::new(initial),
            bindings: BindingCache::new(),
        })
    }

    /// Identifier distinguishing concurrently live instances.
    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> Value {
        self.state.read().clone()
    }

    /// Apply a state update.
    ///
    /// An object result shallow-merges into the existing state map in place;
    /// any other result replaces the state cell wholesale. Merging into a
    /// state that is itself no longer an object also replaces it.
    pub fn update(&self, update: impl Into<StateUpdate>) {
        let produced = match update.into() {
            StateUpdate::Patch(value) => value,
            StateUpdate::Updater(f) => {
                let snapshot = self.state.read().clone();
                f(&snapshot)
            }
        };

        let mut state = self.state.write();
        match produced {
            Value::Object(patch) => match &mut *state {
                Value::Object(map) => {
                    for (key, value) in patch {
                        map.insert(key, value);
                    }
                }
                other => *other = Value::Object(patch),
            },
            other => *state = other,
        }
    }
}

impl fmt::Debug for StoreContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreContext")
            .field("instance_id", &self.instance_id)
            .finish()
    }
}
