//! Store API
//!
//! The public surface: store creation in ambient and factory modes, plus the
//! ambient accessors that read and update whichever store is active for the
//! current execution path. This module is the only way in or out of the
//! scope carrier.

use crate::bind;
use crate::carrier::{self, Scoped};
use crate::context::{StateUpdate, StoreContext};
use crate::error::StoreError;
use crate::value::DynValue;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;

/// Handle to a store created without a factory.
///
/// Cloning is cheap and shares the same context.
#[derive(Debug, Clone)]
pub struct StoreHandle {
    context: Arc<StoreContext>,
}

impl StoreHandle {
    /// The context backing this handle.
    pub fn context(&self) -> &Arc<StoreContext> {
        &self.context
    }

    /// Run `f` inside this store's scope, passing it the context.
    ///
    /// A record- or function-valued result comes back rebound to this store;
    /// scalars and arrays pass through unchanged. Errors from `f` propagate
    /// unchanged.
    pub fn with_store<F>(&self, f: F) -> Result<DynValue, StoreError>
    where
        F: FnOnce(&Arc<StoreContext>) -> Result<DynValue, StoreError>,
    {
        let result = carrier::run_with(&self.context, || f(&self.context))?;
        Ok(bind::bind(result, &self.context))
    }

    /// Run a future inside this store's scope.
    ///
    /// The scope is re-entered on every poll, so `get_store`/`set_store`
    /// keep resolving to this store across suspension points even when other
    /// scoped tasks interleave. Tasks spawned from inside the future do not
    /// inherit the scope; wrap them in their own `scope` call.
    pub fn scope<F: Future>(&self, future: F) -> Scoped<F> {
        carrier::scope(self.context.clone(), future)
    }
}

/// Create a store in ambient mode.
///
/// The returned handle runs callbacks inside the store's scope on demand;
/// nothing is bound until a callback produces a record or function.
pub fn create_store(initial: Value) -> StoreHandle {
    StoreHandle {
        context: StoreContext::new(initial),
    }
}

/// Create a store and immediately run `factory` inside its scope.
///
/// The factory's result is deeply rebound to the new store before being
/// returned: every function in it, and every function reachable through
/// nested records, re-enters this store's scope whenever it is invoked —
/// arbitrarily later and interleaved with other instances. The factory
/// usually takes no arguments and discovers its own store via `get_store`.
pub fn create_store_with<F>(initial: Value, factory: F) -> Result<DynValue, StoreError>
where
    F: FnOnce() -> Result<DynValue, StoreError>,
{
    let context = StoreContext::new(initial);
    carrier::run_with(&context, || {
        let result = factory()?;
        Ok(bind::bind(result, &context))
    })
}

/// Snapshot of the active store's state.
///
/// Fails with `NoActiveScope` outside any `with_store`/factory scope.
pub fn get_store() -> Result<Value, StoreError> {
    carrier::current()
        .map(|context| context.state())
        .ok_or(StoreError::NoActiveScope)
}

/// Update the active store's state.
///
/// Accepts a patch `Value` or a `StateUpdate::with` updater; see
/// `StoreContext::update` for the merge/replace rules. Fails with
/// `NoActiveScope` outside any scope.
pub fn set_store(update: impl Into<StateUpdate>) -> Result<(), StoreError> {
    let context = carrier::current().ok_or(StoreError::NoActiveScope)?;
    context.update(update);
    Ok(())
}

/// Get the current state together with a setter for the active store.
///
/// Pure composition of `get_store` and `set_store`: the setter resolves the
/// ambient store at each call, so invoking it with no scope active fails
/// with `NoActiveScope` just like `set_store` would. A bound function that
/// captured the setter re-enters its own scope on invocation, which is what
/// makes the setter address the right store there.
pub fn use_store() -> Result<(Value, StoreSetter), StoreError> {
    let state = get_store()?;
    Ok((state, StoreSetter))
}

/// Setter half of `use_store`.
#[derive(Debug, Clone)]
pub struct StoreSetter;

impl StoreSetter {
    pub fn set(&self, update: impl Into<StateUpdate>) -> Result<(), StoreError> {
        set_store(update)
    }
}
