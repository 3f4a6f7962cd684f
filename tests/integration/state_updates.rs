//! State update semantics through bound methods

use deepstore::{create_store_with, get_store, set_store, use_store, DynValue, Record, StateUpdate};
use proptest::prelude::*;
use serde_json::json;

fn counter_factory() -> Result<DynValue, deepstore::StoreError> {
    let api = Record::new();
    api.insert(
        "increment",
        DynValue::function(|_| {
            set_store(StateUpdate::with(|state| {
                json!({"x": state["x"].as_i64().unwrap() + 1})
            }))?;
            Ok(DynValue::Null)
        }),
    );
    api.insert(
        "read",
        DynValue::function(|_| Ok(DynValue::from(get_store()?["x"].clone()))),
    );
    Ok(DynValue::from(api))
}

#[test]
fn test_updater_applied_twice_increments_twice() {
    let counter = create_store_with(json!({"x": 1}), counter_factory).unwrap();
    let increment = counter.get("increment").unwrap();
    increment.call(&[]).unwrap();
    increment.call(&[]).unwrap();
    assert_eq!(counter.get("read").unwrap().call(&[]).unwrap().as_i64(), Some(3));
}

#[test]
fn test_mutation_in_one_method_visible_in_another() {
    let api = create_store_with(json!({"data": "old", "keep": true}), || {
        let api = Record::new();
        api.insert(
            "write",
            DynValue::function(|_| {
                set_store(json!({"data": "new"}))?;
                Ok(DynValue::Null)
            }),
        );
        api.insert(
            "read",
            DynValue::function(|_| Ok(DynValue::from(get_store()?))),
        );
        Ok(DynValue::from(api))
    })
    .unwrap();

    api.get("write").unwrap().call(&[]).unwrap();
    let state = api.get("read").unwrap().call(&[]).unwrap();
    assert_eq!(state.get("data").unwrap().as_str(), Some("new"));
    assert_eq!(state.get("keep").unwrap().as_bool(), Some(true));
}

#[test]
fn test_use_store_pair_inside_factory() {
    let api = create_store_with(json!({"data": "initial"}), || {
        let (state, setter) = use_store()?;
        assert_eq!(state["data"], json!("initial"));

        let api = Record::new();
        api.insert(
            "rewrite",
            DynValue::function(move |_| {
                // The bound call re-entered this store's scope, so the
                // ambient setter resolves to it.
                setter.set(json!({"data": "rewritten"}))?;
                Ok(DynValue::Null)
            }),
        );
        api.insert(
            "read",
            DynValue::function(|_| Ok(DynValue::from(get_store()?["data"].clone()))),
        );
        Ok(DynValue::from(api))
    })
    .unwrap();

    api.get("rewrite").unwrap().call(&[]).unwrap();
    assert_eq!(
        api.get("read").unwrap().call(&[]).unwrap().as_str(),
        Some("rewritten")
    );
}

#[test]
fn test_scalar_updater_replaces_state_wholesale() {
    let api = create_store_with(json!({"x": 1}), || {
        let api = Record::new();
        api.insert(
            "flatten",
            DynValue::function(|_| {
                set_store(StateUpdate::with(|_| json!("flat")))?;
                Ok(DynValue::Null)
            }),
        );
        api.insert(
            "read",
            DynValue::function(|_| Ok(DynValue::from(get_store()?))),
        );
        Ok(DynValue::from(api))
    })
    .unwrap();

    api.get("flatten").unwrap().call(&[]).unwrap();
    assert_eq!(
        api.get("read").unwrap().call(&[]).unwrap().as_str(),
        Some("flat")
    );
}

proptest! {
    /// Shallow merge: patched keys take the patch value, all other keys are
    /// left exactly as they were.
    #[test]
    fn prop_patch_merge_keeps_unpatched_keys(
        base in proptest::collection::hash_map("[a-z]{1,8}", any::<i64>(), 0..8),
        patch in proptest::collection::hash_map("[a-z]{1,8}", any::<i64>(), 0..8),
    ) {
        let base_state: serde_json::Map<String, serde_json::Value> = base
            .iter()
            .map(|(k, v)| (k.clone(), json!(v)))
            .collect();
        let patch_state: serde_json::Map<String, serde_json::Value> = patch
            .iter()
            .map(|(k, v)| (k.clone(), json!(v)))
            .collect();

        let handle = deepstore::create_store(serde_json::Value::Object(base_state));
        handle
            .with_store(|_| {
                set_store(serde_json::Value::Object(patch_state.clone()))?;
                Ok(DynValue::Null)
            })
            .unwrap();

        let merged = handle.context().state();
        let merged = merged.as_object().unwrap();
        for (key, value) in &patch {
            prop_assert_eq!(merged.get(key), Some(&json!(value)));
        }
        for (key, value) in &base {
            if !patch.contains_key(key) {
                prop_assert_eq!(merged.get(key), Some(&json!(value)));
            }
        }
    }
}
