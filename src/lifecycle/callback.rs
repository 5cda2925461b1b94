//! # Callback abstraction and function-backed implementation.
//!
//! [`Callback`] is the unit every subsystem runs: lifecycle stage hooks, scheduled
//! bodies and sequence-match triggers. [`CallbackFn`] wraps a closure
//! `F: Fn() -> Fut`, producing a fresh future per call, and [`CallbackRef`] is the
//! shared handle (`Arc<dyn Callback>`) passed around the runtime.
//!
//! ## Example
//! ```rust
//! use stagehand::{CallbackFn, CallbackRef, TaskError};
//!
//! let cb: CallbackRef = CallbackFn::arc("warm-cache", || async {
//!     Ok::<_, TaskError>(())
//! });
//! assert_eq!(cb.name(), "warm-cache");
//! ```

use std::borrow::Cow;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::error::TaskError;

/// Boxed future returned by [`Callback::call`].
pub type BoxCallbackFuture = Pin<Box<dyn Future<Output = Result<(), TaskError>> + Send + 'static>>;

/// Shared handle to a callback.
pub type CallbackRef = Arc<dyn Callback>;

/// # Asynchronous, repeatable unit of work.
///
/// Each [`call`](Callback::call) must produce an independent future; the same
/// callback may be invoked many times (scheduled bodies) or concurrently
/// (unprioritized stage callbacks).
pub trait Callback: Send + Sync + 'static {
    /// Returns a stable, human-readable name used in logs.
    fn name(&self) -> &str;

    /// Creates the future for one invocation.
    fn call(&self) -> BoxCallbackFuture;
}

/// Function-backed callback.
#[derive(Debug)]
pub struct CallbackFn<F> {
    name: Cow<'static, str>,
    f: F,
}

impl<F> CallbackFn<F> {
    /// Creates a new function-backed callback.
    ///
    /// Prefer [`CallbackFn::arc`] when you immediately need a [`CallbackRef`].
    pub fn new(name: impl Into<Cow<'static, str>>, f: F) -> Self {
        Self { name: name.into(), f }
    }

    /// Creates the callback and returns it as a shared handle.
    pub fn arc(name: impl Into<Cow<'static, str>>, f: F) -> Arc<Self> {
        Arc::new(Self::new(name, f))
    }
}

impl<F, Fut> Callback for CallbackFn<F>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), TaskError>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn call(&self) -> BoxCallbackFuture {
        Box::pin((self.f)())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[tokio::test]
    async fn each_call_builds_a_fresh_future() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let cb: CallbackRef = CallbackFn::arc("count", move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });

        let first = cb.call();
        let second = cb.call();
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        second.await.unwrap();
        first.await.unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }
}
