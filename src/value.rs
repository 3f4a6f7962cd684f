//! Dynamic Value Model
//!
//! Runtime type-tagged values exchanged between stores, factories, and bound
//! functions. The tag set (scalar / array / record / function / opaque) is
//! what the auto-rebinder dispatches on: only records and functions are ever
//! wrapped, everything else passes through binding unchanged.

use crate::bind;
use crate::context::StoreContext;
use crate::error::StoreError;
use parking_lot::RwLock;
use serde_json::{Map, Number, Value};
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// A dynamically typed value.
///
/// `Record` and `Function` are refcounted and shared; cloning a `DynValue`
/// never deep-copies them. `Opaque` carries an instance of some foreign
/// abstraction that the rebinder deliberately leaves untouched.
#[derive(Clone)]
pub enum DynValue {
    Null,
    Bool(bool),
    Number(Number),
    Str(String),
    /// Arrays are carried as-is and are excluded from deep binding.
    Array(Vec<DynValue>),
    Record(Arc<Record>),
    Function(NativeFn),
    /// An instance of some custom type; never walked or wrapped.
    Opaque(Arc<dyn Any + Send + Sync>),
}

impl DynValue {
    /// Wrap a closure as a callable value.
    pub fn function<F>(f: F) -> Self
    where
        F: Fn(&[DynValue]) -> Result<DynValue, StoreError> + Send + Sync + 'static,
    {
        DynValue::Function(NativeFn::new(f))
    }

    /// Wrap an arbitrary instance as an opaque value.
    pub fn opaque<T: Any + Send + Sync>(value: T) -> Self {
        DynValue::Opaque(Arc::new(value))
    }

    /// Convert a JSON value into a `DynValue`, deeply.
    ///
    /// Objects become fresh records, arrays convert element-wise.
    pub fn from_json(value: Value) -> Self {
        match value {
            Value::Null => DynValue::Null,
            Value::Bool(b) => DynValue::Bool(b),
            Value::Number(n) => DynValue::Number(n),
            Value::String(s) => DynValue::Str(s),
            Value::Array(items) => {
                DynValue::Array(items.into_iter().map(DynValue::from_json).collect())
            }
            Value::Object(map) => {
                let record = Record::new();
                for (key, item) in map {
                    record.insert(key, DynValue::from_json(item));
                }
                DynValue::Record(Arc::new(record))
            }
        }
    }

    /// Convert back to JSON, if the value is pure data.
    ///
    /// Returns `None` when the value contains a function or opaque instance
    /// anywhere inside it.
    pub fn to_json(&self) -> Option<Value> {
        match self {
            DynValue::Null => Some(Value::Null),
            DynValue::Bool(b) => Some(Value::Bool(*b)),
            DynValue::Number(n) => Some(Value::Number(n.clone())),
            DynValue::Str(s) => Some(Value::String(s.clone())),
            DynValue::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(item.to_json()?);
                }
                Some(Value::Array(out))
            }
            DynValue::Record(record) => {
                let mut map = Map::new();
                for key in record.keys() {
                    let item = record.get(&key)?;
                    map.insert(key, item.to_json()?);
                }
                Some(Value::Object(map))
            }
            DynValue::Function(_) | DynValue::Opaque(_) => None,
        }
    }

    pub fn is_scalar(&self) -> bool {
        matches!(
            self,
            DynValue::Null | DynValue::Bool(_) | DynValue::Number(_) | DynValue::Str(_)
        )
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            DynValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            DynValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            DynValue::Number(n) => n.as_i64(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            DynValue::Number(n) => n.as_f64(),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&Arc<Record>> {
        match self {
            DynValue::Record(record) => Some(record),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<&NativeFn> {
        match self {
            DynValue::Function(f) => Some(f),
            _ => None,
        }
    }

    /// Read a record slot; `None` for non-records and missing slots.
    pub fn get(&self, key: &str) -> Option<DynValue> {
        self.as_record().and_then(|record| record.get(key))
    }

    /// Invoke the value as a function.
    ///
    /// Fails with `StoreError::NotCallable` for any non-function tag.
    pub fn call(&self, args: &[DynValue]) -> Result<DynValue, StoreError> {
        match self {
            DynValue::Function(f) => f.call(args),
            _ => Err(StoreError::NotCallable),
        }
    }
}

impl fmt::Debug for DynValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DynValue::Null => write!(f, "Null"),
            DynValue::Bool(b) => write!(f, "Bool({})", b),
            DynValue::Number(n) => write!(f, "Number({})", n),
            DynValue::Str(s) => write!(f, "Str({:?})", s),
            DynValue::Array(items) => f.debug_tuple("Array").field(items).finish(),
            DynValue::Record(record) => {
                write!(f, "Record({:p})", Arc::as_ptr(record))
            }
            DynValue::Function(func) => write!(f, "Function({:p})", Arc::as_ptr(&func.0)),
            DynValue::Opaque(any) => write!(f, "Opaque({:p})", Arc::as_ptr(any)),
        }
    }
}

/// Scalars and arrays compare by value; records, functions, and opaques by
/// identity.
impl PartialEq for DynValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (DynValue::Null, DynValue::Null) => true,
            (DynValue::Bool(a), DynValue::Bool(b)) => a == b,
            (DynValue::Number(a), DynValue::Number(b)) => a == b,
            (DynValue::Str(a), DynValue::Str(b)) => a == b,
            (DynValue::Array(a), DynValue::Array(b)) => a == b,
            (DynValue::Record(a), DynValue::Record(b)) => Arc::ptr_eq(a, b),
            (DynValue::Function(a), DynValue::Function(b)) => NativeFn::ptr_eq(a, b),
            (DynValue::Opaque(a), DynValue::Opaque(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl From<bool> for DynValue {
    fn from(b: bool) -> Self {
        DynValue::Bool(b)
    }
}

impl From<i64> for DynValue {
    fn from(n: i64) -> Self {
        DynValue::Number(Number::from(n))
    }
}

impl From<&str> for DynValue {
    fn from(s: &str) -> Self {
        DynValue::Str(s.to_string())
    }
}

impl From<String> for DynValue {
    fn from(s: String) -> Self {
        DynValue::Str(s)
    }
}

impl From<Value> for DynValue {
    fn from(value: Value) -> Self {
        DynValue::from_json(value)
    }
}

impl From<Record> for DynValue {
    fn from(record: Record) -> Self {
        DynValue::Record(Arc::new(record))
    }
}

impl From<NativeFn> for DynValue {
    fn from(f: NativeFn) -> Self {
        DynValue::Function(f)
    }
}

/// Binding attached to a record proxy: the record it delegates to and the
/// context re-entered for values read out of it.
pub(crate) struct RecordBinding {
    pub(crate) target: Arc<Record>,
    pub(crate) context: Arc<StoreContext>,
}

/// A plain record: a shared, mutable slot map.
///
/// A record is either *plain* (owns its slots) or *bound* (delegates every
/// operation to a target record; slot reads additionally pass function- and
/// record-valued slots through the rebinder of the owning context). Writes,
/// removals, and enumeration always reach the underlying record — binding
/// intercepts reads only.
pub struct Record {
    slots: RwLock<HashMap<String, DynValue>>,
    binding: Option<RecordBinding>,
}

impl Record {
    pub fn new() -> Self {
        Record {
            slots: RwLock::new(HashMap::new()),
            binding: None,
        }
    }

    pub(crate) fn new_bound(target: Arc<Record>, context: Arc<StoreContext>) -> Self {
        Record {
            slots: RwLock::new(HashMap::new()),
            binding: Some(RecordBinding { target, context }),
        }
    }

    /// The context this record is bound to, if it is a proxy.
    pub(crate) fn bound_context(&self) -> Option<&Arc<StoreContext>> {
        self.binding.as_ref().map(|b| &b.context)
    }

    /// Read a slot.
    ///
    /// On a bound record the value is rebound lazily, on every read, through
    /// the owning context's binding cache so repeated reads of the same slot
    /// stay referentially stable.
    pub fn get(&self, key: &str) -> Option<DynValue> {
        match &self.binding {
            Some(b) => b.target.get(key).map(|value| bind::bind(value, &b.context)),
            None => self.slots.read().get(key).cloned(),
        }
    }

    /// Write a slot, returning the previous value if any.
    pub fn insert(&self, key: impl Into<String>, value: DynValue) -> Option<DynValue> {
        match &self.binding {
            Some(b) => b.target.insert(key, value),
            None => self.slots.write().insert(key.into(), value),
        }
    }

    /// Remove a slot, returning the removed value if any.
    pub fn remove(&self, key: &str) -> Option<DynValue> {
        match &self.binding {
            Some(b) => b.target.remove(key),
            None => self.slots.write().remove(key),
        }
    }

    pub fn contains_key(&self, key: &str) -> bool {
        match &self.binding {
            Some(b) => b.target.contains_key(key),
            None => self.slots.read().contains_key(key),
        }
    }

    pub fn keys(&self) -> Vec<String> {
        match &self.binding {
            Some(b) => b.target.keys(),
            None => self.slots.read().keys().cloned().collect(),
        }
    }

    pub fn len(&self) -> usize {
        match &self.binding {
            Some(b) => b.target.len(),
            None => self.slots.read().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for Record {
    fn default() -> Self {
        Record::new()
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.binding {
            Some(b) => f
                .debug_struct("Record")
                .field("bound_to", &b.context.instance_id())
                .finish(),
            None => {
                let slots = self.slots.read();
                f.debug_struct("Record").field("len", &slots.len()).finish()
            }
        }
    }
}

impl FromIterator<(String, DynValue)> for Record {
    fn from_iter<I: IntoIterator<Item = (String, DynValue)>>(iter: I) -> Self {
        Record {
            slots: RwLock::new(iter.into_iter().collect()),
            binding: None,
        }
    }
}

type NativeFnImpl = dyn Fn(&[DynValue]) -> Result<DynValue, StoreError> + Send + Sync;

pub(crate) struct FnCell {
    pub(crate) call: Box<NativeFnImpl>,
    /// Context re-entered on invocation when this is a bound wrapper.
    pub(crate) binding: Option<Arc<StoreContext>>,
}

/// A refcounted callable value.
///
/// Cloning shares the same underlying closure; `ptr_eq` compares that
/// identity, which is what the binding cache keys on.
#[derive(Clone)]
pub struct NativeFn(pub(crate) Arc<FnCell>);

impl NativeFn {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&[DynValue]) -> Result<DynValue, StoreError> + Send + Sync + 'static,
    {
        NativeFn(Arc::new(FnCell {
            call: Box::new(f),
            binding: None,
        }))
    }

    pub(crate) fn new_bound<F>(context: Arc<StoreContext>, f: F) -> Self
    where
        F: Fn(&[DynValue]) -> Result<DynValue, StoreError> + Send + Sync + 'static,
    {
        NativeFn(Arc::new(FnCell {
            call: Box::new(f),
            binding: Some(context),
        }))
    }

    /// The context this function is bound to, if it is a wrapper.
    pub(crate) fn bound_context(&self) -> Option<&Arc<StoreContext>> {
        self.0.binding.as_ref()
    }

    pub fn call(&self, args: &[DynValue]) -> Result<DynValue, StoreError> {
        (self.0.call)(args)
    }

    /// Identity comparison: do both values share one underlying closure?
    pub fn ptr_eq(a: &NativeFn, b: &NativeFn) -> bool {
        Arc::ptr_eq(&a.0, &b.0)
    }
}

impl fmt::Debug for NativeFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NativeFn({:p})", Arc::as_ptr(&self.0))
    }
}
