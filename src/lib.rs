//! Deepstore: Implicit Instance-Scoped State Propagation
//!
//! Create a store (a keyed state bag plus a unique instance id), run code
//! under it, and every function produced inside that scope — nested
//! arbitrarily deep in returned records — silently re-enters that exact
//! store whenever it is invoked later, interleaved with calls belonging to
//! other store instances. No context threading through signatures; misuse
//! outside any scope fails loudly with [`StoreError::NoActiveScope`].
//!
//! ```
//! use deepstore::{create_store_with, get_store, DynValue, Record};
//! use serde_json::json;
//!
//! let client = create_store_with(json!({"network": "mainnet"}), || {
//!     let api = Record::new();
//!     api.insert(
//!         "network",
//!         DynValue::function(|_| Ok(DynValue::from(get_store()?["network"].clone()))),
//!     );
//!     Ok(DynValue::from(api))
//! })
//! .unwrap();
//!
//! // The scope exited at creation; the bound method re-enters it by itself.
//! let network = client.get("network").unwrap().call(&[]).unwrap();
//! assert_eq!(network.as_str(), Some("mainnet"));
//! ```

mod bind;
mod carrier;
pub mod context;
pub mod error;
pub mod store;
pub mod value;

pub use carrier::Scoped;
pub use context::{StateUpdate, StoreContext};
pub use error::StoreError;
pub use store::{
    create_store, create_store_with, get_store, set_store, use_store, StoreHandle, StoreSetter,
};
pub use value::{DynValue, NativeFn, Record};
