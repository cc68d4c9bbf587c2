//! Continuation chaining shared by [`Future`] and [`SharedFuture`](crate::SharedFuture).
//!
//! Both handle types expose the same small capability, [`FutureLike`], and
//! `then`/`via` are written once against it.
use crate::executor::Executor;
use crate::pair::{make_exceptional_future, make_ready_future};
use crate::{Error, Future, Promise};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

/// What a consumer handle offers to the chaining machinery.
pub(crate) trait FutureLike: Sized + Send + 'static {
    fn executor(&self) -> Arc<dyn Executor>;

    fn set_executor(&mut self, executor: Arc<dyn Executor>);

    /// Hands the handle back to `f` once its state is resolved: inline if it
    /// already is, otherwise on the resolving thread.
    fn on_ready<F>(self, f: F) -> Result<(), Error>
    where
        F: FnOnce(Self) + Send + 'static;
}

/// A value a continuation may return.
///
/// `Result<T, E>` resolves to `T` or the converted error. A [`Future<T>`]
/// is unwrapped, so the chained future resolves with the inner outcome
/// rather than a nested future.
pub trait Resolve: Send + 'static {
    type Output: Send + 'static;

    fn into_future(self) -> Future<Self::Output>;
}

impl<T, E> Resolve for Result<T, E>
where
    T: Send + 'static,
    E: Into<Error> + Send + 'static,
{
    type Output = T;

    fn into_future(self) -> Future<T> {
        match self {
            Ok(value) => make_ready_future(value),
            Err(err) => make_exceptional_future(err),
        }
    }
}

impl<T: Send + 'static> Resolve for Future<T> {
    type Output = T;

    fn into_future(self) -> Future<T> {
        self
    }
}

pub(crate) fn via<H: FutureLike>(mut handle: H, executor: Arc<dyn Executor>) -> H {
    handle.set_executor(executor);
    handle
}

/// Runs `func` with the resolved `handle` through the handle's executor and
/// forwards whatever it produces into a fresh future.
pub(crate) fn then_future<H, F, R>(handle: H, func: F) -> Result<Future<R::Output>, Error>
where
    H: FutureLike,
    F: FnOnce(H) -> R + Send + 'static,
    R: Resolve,
{
    let (mut promise, future) = Promise::pair();
    let executor = handle.executor();
    handle.on_ready(move |ready| {
        tracing::trace!(
            pending = executor.num_pending_closures(),
            "dispatching continuation"
        );
        executor.add(Box::new(move || {
            match panic::catch_unwind(AssertUnwindSafe(move || func(ready))) {
                Ok(next) => forward(next.into_future(), promise),
                Err(payload) => {
                    let _ = promise.set_exception(Error::from_panic(payload));
                }
            }
        }));
    })?;
    Ok(future)
}

/// Resolves `promise` with the outcome of `inner` once it is available.
/// An invalid `inner` breaks the promise.
pub(crate) fn forward<T: Send + 'static>(inner: Future<T>, mut promise: Promise<T>) {
    if !inner.is_valid() {
        let _ = promise.set_exception(Error::BrokenPromise);
        return;
    }
    let _ = inner.on_ready(move |mut done| {
        let _ = promise.set_result(done.get());
    });
}

impl<T: Send + 'static> Future<Future<T>> {
    /// Collapses a future of a future into a future of the inner value.
    ///
    /// The result fails with the outer error if the outer future fails, with
    /// [`Error::BrokenPromise`] if the inner future is invalid, and otherwise
    /// resolves with the inner outcome.
    ///
    /// ```
    /// use promise_future::{make_ready_future, Promise};
    ///
    /// let mut inner = Promise::new();
    /// let outer = make_ready_future(inner.get_future().unwrap());
    /// let mut flat = outer.flatten().unwrap();
    /// assert!(!flat.is_ready().unwrap());
    /// inner.set_value(1).unwrap();
    /// assert_eq!(flat.get().unwrap(), 1);
    /// ```
    pub fn flatten(self) -> Result<Future<T>, Error> {
        let (promise, future) = Promise::pair();
        self.on_ready(move |mut outer: Future<Future<T>>| match outer.get() {
            Ok(inner) => forward(inner, promise),
            Err(err) => {
                let mut promise = promise;
                let _ = promise.set_exception(err);
            }
        })?;
        Ok(future)
    }
}
