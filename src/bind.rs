//! Auto-Rebinder
//!
//! Makes a value produced while a context was active keep behaving as if
//! that context were active, no matter when or from where it is invoked
//! later. Dispatches on the runtime tag of the value: functions are wrapped
//! to re-enter their owning scope and rebind their results, plain records
//! become read-intercepting proxies, and everything else (scalars, arrays,
//! opaque instances) passes through untouched.

use crate::carrier;
use crate::context::StoreContext;
use crate::value::{DynValue, FnCell, NativeFn, Record};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tracing::error;

/// Per-context side-table from original pointer identity to the wrapper
/// bound under that context.
///
/// Entries hold `Weak` references, so the cache keeps neither originals nor
/// wrappers alive: it only guarantees that rebinding an object some consumer
/// still holds returns the exact wrapper that consumer already has. Dead
/// entries are pruned on insert, and the whole table drops with its context.
pub(crate) struct BindingCache {
    records: RwLock<HashMap<usize, Weak<Record>>>,
    functions: RwLock<HashMap<usize, Weak<FnCell>>>,
}

impl BindingCache {
    pub(crate) fn new() -> Self {
        BindingCache {
            records: RwLock::new(HashMap::new()),
            functions: RwLock::new(HashMap::new()),
        }
    }

    fn lookup_record(&self, key: usize) -> Option<Arc<Record>> {
        self.records.read().get(&key).and_then(Weak::upgrade)
    }

    fn insert_record(&self, key: usize, proxy: &Arc<Record>) {
        let mut records = self.records.write();
        records.retain(|_, wrapper| wrapper.strong_count() > 0);
        records.insert(key, Arc::downgrade(proxy));
    }

    fn lookup_function(&self, key: usize) -> Option<NativeFn> {
        self.functions
            .read()
            .get(&key)
            .and_then(Weak::upgrade)
            .map(NativeFn)
    }

    fn insert_function(&self, key: usize, wrapper: &NativeFn) {
        let mut functions = self.functions.write();
        functions.retain(|_, cell| cell.strong_count() > 0);
        functions.insert(key, Arc::downgrade(&wrapper.0));
    }

    #[cfg(test)]
    pub(crate) fn record_entries(&self) -> usize {
        self.records.read().len()
    }
}

/// Rebind `value` to `context`.
///
/// Scalars, arrays, and opaque instances are returned unchanged; functions
/// and records come back wrapped. Rebinding a wrapper already bound to the
/// same context returns it as-is.
pub(crate) fn bind(value: DynValue, context: &Arc<StoreContext>) -> DynValue {
    match value {
        DynValue::Record(record) => DynValue::Record(bind_record(record, context)),
        DynValue::Function(f) => DynValue::Function(bind_function(f, context)),
        other => other,
    }
}

fn bind_record(record: Arc<Record>, context: &Arc<StoreContext>) -> Arc<Record> {
    if let Some(bound) = record.bound_context() {
        if Arc::ptr_eq(bound, context) {
            return record;
        }
    }

    let key = Arc::as_ptr(&record) as usize;
    if let Some(existing) = context.bindings.lookup_record(key) {
        return existing;
    }

    let proxy = Arc::new(Record::new_bound(record, context.clone()));
    context.bindings.insert_record(key, &proxy);
    proxy
}

fn bind_function(f: NativeFn, context: &Arc<StoreContext>) -> NativeFn {
    if let Some(bound) = f.bound_context() {
        if Arc::ptr_eq(bound, context) {
            return f;
        }
    }

    let key = Arc::as_ptr(&f.0) as usize;
    if let Some(existing) = context.bindings.lookup_function(key) {
        return existing;
    }

    let target = f.clone();
    let ctx = context.clone();
    let wrapper = NativeFn::new_bound(context.clone(), move |args| {
        carrier::run_with(&ctx, || match target.call(args) {
            Ok(result) => Ok(bind(result, &ctx)),
            Err(err) => {
                // Surfaced for diagnostics, then propagated unchanged.
                error!(instance_id = %ctx.instance_id(), error = %err, "bound function failed");
                Err(err)
            }
        })
    });
    context.bindings.insert_function(key, &wrapper);
    wrapper
}
