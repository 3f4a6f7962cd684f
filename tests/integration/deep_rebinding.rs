//! Deep rebinding through nested factories and records

use deepstore::{create_store_with, get_store, DynValue, NativeFn, Record};
use serde_json::json;
use std::sync::Arc;

/// Every layer of `result.nested().get_data()` must stay bound after the
/// original scope has exited: the outer function, the record it returns, and
/// the inner function read out of that record.
#[test]
fn test_nested_factory_layers_stay_bound() {
    fn nested_factory() -> Result<DynValue, deepstore::StoreError> {
        let inner = Record::new();
        inner.insert(
            "get_data",
            DynValue::function(|_| Ok(DynValue::from(get_store()?["data"].clone()))),
        );
        Ok(DynValue::from(inner))
    }

    let result = create_store_with(json!({"data": "value1"}), || {
        let api = Record::new();
        api.insert("nested", DynValue::function(|_| nested_factory()));
        Ok(DynValue::from(api))
    })
    .unwrap();

    let inner = result.get("nested").unwrap().call(&[]).unwrap();
    let data = inner.get("get_data").unwrap().call(&[]).unwrap();
    assert_eq!(data.as_str(), Some("value1"));
}

#[test]
fn test_repeated_reads_are_referentially_stable() {
    let result = create_store_with(json!({"data": "x"}), || {
        let api = Record::new();
        api.insert("method", DynValue::function(|_| Ok(DynValue::Null)));
        let nested = Record::new();
        api.insert("nested", DynValue::from(nested));
        Ok(DynValue::from(api))
    })
    .unwrap();

    let first = result.get("method").unwrap();
    let second = result.get("method").unwrap();
    match (&first, &second) {
        (DynValue::Function(a), DynValue::Function(b)) => assert!(NativeFn::ptr_eq(a, b)),
        other => panic!("expected functions, got {other:?}"),
    }

    let first = result.get("nested").unwrap();
    let second = result.get("nested").unwrap();
    match (&first, &second) {
        (DynValue::Record(a), DynValue::Record(b)) => assert!(Arc::ptr_eq(a, b)),
        other => panic!("expected records, got {other:?}"),
    }
}

#[test]
fn test_arrays_and_scalars_pass_through_record_reads() {
    let result = create_store_with(json!({}), || {
        let api = Record::new();
        api.insert("list", DynValue::Array(vec![DynValue::from(1i64)]));
        api.insert("label", DynValue::from("plain"));
        Ok(DynValue::from(api))
    })
    .unwrap();

    assert_eq!(
        result.get("list").unwrap(),
        DynValue::Array(vec![DynValue::from(1i64)])
    );
    assert_eq!(result.get("label").unwrap().as_str(), Some("plain"));
}

#[test]
fn test_opaque_instances_are_not_wrapped() {
    struct Client {
        endpoint: &'static str,
    }

    let result = create_store_with(json!({}), || {
        let api = Record::new();
        api.insert("client", DynValue::opaque(Client { endpoint: "rpc" }));
        Ok(DynValue::from(api))
    })
    .unwrap();

    match result.get("client").unwrap() {
        DynValue::Opaque(any) => {
            let client = any.downcast_ref::<Client>().unwrap();
            assert_eq!(client.endpoint, "rpc");
        }
        other => panic!("expected opaque value, got {other:?}"),
    }
}

#[test]
fn test_writes_pass_through_to_the_underlying_record() {
    let result = create_store_with(json!({}), || {
        let api = Record::new();
        api.insert("count", DynValue::from(1i64));
        Ok(DynValue::from(api))
    })
    .unwrap();

    let record = result.as_record().unwrap();
    record.insert("count", DynValue::from(2i64));
    assert_eq!(record.get("count").unwrap().as_i64(), Some(2));
    assert_eq!(record.remove("count").unwrap().as_i64(), Some(2));
    assert!(!record.contains_key("count"));
}

/// A bound method invoked while a *different* store is active must still see
/// its own state: re-entry shadows whatever scope the caller happens to be in.
#[test]
fn test_bound_call_shadows_foreign_active_scope() {
    let reader = create_store_with(json!({"data": "mine"}), || {
        Ok(DynValue::function(|_| {
            Ok(DynValue::from(get_store()?["data"].clone()))
        }))
    })
    .unwrap();

    let other = deepstore::create_store(json!({"data": "theirs"}));
    let seen = other
        .with_store(|_| reader.call(&[]))
        .unwrap();
    assert_eq!(seen.as_str(), Some("mine"));
}
