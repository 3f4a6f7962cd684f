//! Error types for the deepstore state propagation system.

use thiserror::Error;

/// Store-related errors
#[derive(Debug, Error)]
pub enum StoreError {
    /// An ambient accessor was called with no scope active.
    ///
    /// This is a programmer error (an accessor ran outside any
    /// `with_store`/factory scope, or a bound function's wrapping was
    /// bypassed) and is surfaced loudly rather than defaulted to empty state.
    #[error("no active store scope")]
    NoActiveScope,

    /// A user callback (factory, `with_store` body, or bound function) failed.
    ///
    /// Carried transparently: the payload is whatever the callback returned,
    /// never converted or wrapped further.
    #[error(transparent)]
    Callback(#[from] anyhow::Error),

    /// `DynValue::call` was invoked on a value that is not a function.
    #[error("value is not callable")]
    NotCallable,
}

impl StoreError {
    /// True when the error originated in user callback code.
    pub fn is_callback(&self) -> bool {
        matches!(self, StoreError::Callback(_))
    }
}
