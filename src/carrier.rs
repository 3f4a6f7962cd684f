//! Scope Carrier
//!
//! The process-wide "what is current" channel shared by every store instance:
//! a per-thread LIFO stack of active contexts plus a poll-instrumented future
//! for carrying a context across asynchronous suspension. Private to the
//! crate; the store API is the only surface that enters or reads scopes.

use crate::context::StoreContext;
use std::cell::RefCell;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tracing::trace;

thread_local! {
    static ACTIVE: RefCell<Vec<Arc<StoreContext>>> = const { RefCell::new(Vec::new()) };
}

/// The innermost active context on this thread, if any.
pub(crate) fn current() -> Option<Arc<StoreContext>> {
    ACTIVE.with(|stack| stack.borrow().last().cloned())
}

/// Run `body` with `context` active, restoring the previous frame on every
/// exit path (normal return or unwind).
pub(crate) fn run_with<R>(context: &Arc<StoreContext>, body: impl FnOnce() -> R) -> R {
    let _frame = FrameGuard::enter(context.clone());
    body()
}

/// Pushes a frame on construction, pops it on drop.
///
/// Guards are only ever held on the stack of the entering function, so drops
/// happen in LIFO order and each guard pops exactly the frame it pushed.
struct FrameGuard;

impl FrameGuard {
    fn enter(context: Arc<StoreContext>) -> Self {
        trace!(instance_id = %context.instance_id(), "entering store scope");
        ACTIVE.with(|stack| stack.borrow_mut().push(context));
        FrameGuard
    }
}

impl Drop for FrameGuard {
    fn drop(&mut self) {
        ACTIVE.with(|stack| {
            if let Some(context) = stack.borrow_mut().pop() {
                trace!(instance_id = %context.instance_id(), "exiting store scope");
            }
        });
    }
}

/// A future running inside a store scope.
///
/// Every poll re-enters the context and exits again before yielding, so the
/// association survives suspension and never leaks into unrelated tasks
/// interleaved on the same thread. A task spawned from inside the scope does
/// not inherit it ambiently; wrap the spawned future in its own `Scoped`.
pub struct Scoped<F> {
    context: Arc<StoreContext>,
    inner: Pin<Box<F>>,
}

pub(crate) fn scope<F: Future>(context: Arc<StoreContext>, inner: F) -> Scoped<F> {
    Scoped {
        context,
        inner: Box::pin(inner),
    }
}

impl<F: Future> Future for Scoped<F> {
    type Output = F::Output;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        // All fields are Unpin (the inner future is boxed), so Scoped is too.
        let this = self.get_mut();
        let _frame = FrameGuard::enter(this.context.clone());
        this.inner.as_mut().poll(cx)
    }
}
