use crate::chain::{self, FutureLike, Resolve};
use crate::executor::{inline_executor, Executor};
use crate::state::SharedState;
use crate::{Error, SharedFuture};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

/// The producing half of a promise/future pair. It publishes exactly one
/// value or error.
///
/// Dropping a promise that was never fulfilled fails its future with
/// [`Error::BrokenPromise`].
///
/// # Examples
///
/// ```
/// use promise_future::Promise;
/// use std::thread;
///
/// let mut promise = Promise::<String>::new();
/// let mut future = promise.get_future().unwrap();
///
/// let task1 = thread::spawn(move || future.get());
/// promise.set_value("Hi".into()).unwrap();
/// assert_eq!(task1.join().expect("The task1 thread has panicked.").unwrap(), "Hi");
/// ```
pub struct Promise<T> {
    state: Arc<SharedState<T>>,
}

/// The consuming half of a promise/future pair, owned by a single holder.
///
/// A future can be waited on, consumed with [`get`](Future::get), chained
/// with [`then`](Future::then), or `.await`ed.
pub struct Future<T> {
    state: Option<Arc<SharedState<T>>>,
    executor: Arc<dyn Executor>,
}

impl<T> Promise<T> {
    pub fn new() -> Self {
        Promise {
            state: Arc::new(SharedState::new()),
        }
    }

    /// A promise together with its already retrieved future.
    pub(crate) fn pair() -> (Self, Future<T>) {
        let promise = Self::new();
        promise.state.mark_retrieved();
        let future = Future::from_state(Arc::clone(&promise.state), inline_executor());
        (promise, future)
    }

    /// Returns the future bound to this promise. Only the first call succeeds.
    pub fn get_future(&self) -> Result<Future<T>, Error> {
        if !self.state.mark_retrieved() {
            return Err(Error::FutureAlreadyRetrieved);
        }
        Ok(Future::from_state(Arc::clone(&self.state), inline_executor()))
    }

    pub fn set_value(&mut self, value: T) -> Result<(), Error> {
        self.state.publish(Ok(value))
    }

    /// Fails the promise. The error is stored and replayed by the consumer's `get`.
    pub fn set_exception<E: Into<Error>>(&mut self, error: E) -> Result<(), Error> {
        self.state.publish(Err(error.into()))
    }

    pub fn set_result(&mut self, result: Result<T, Error>) -> Result<(), Error> {
        self.state.publish(result)
    }

    /// Fulfills the promise with whatever `producer` returns. A panic inside
    /// `producer` is stored as [`Error::Panicked`].
    pub fn set_with<F, E>(&mut self, producer: F) -> Result<(), Error>
    where
        F: FnOnce() -> Result<T, E>,
        E: Into<Error>,
    {
        let result = match panic::catch_unwind(AssertUnwindSafe(producer)) {
            Ok(result) => result.map_err(Into::into),
            Err(payload) => Err(Error::from_panic(payload)),
        };
        self.set_result(result)
    }

    /// Whether a value or error has been published.
    pub fn is_ready(&self) -> bool {
        self.state.is_ready()
    }
}

impl<T> Default for Promise<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for Promise<T> {
    /// If this is an unresolved promise, fail it so nobody waits forever.
    fn drop(&mut self) {
        if !self.state.is_ready() {
            tracing::debug!("promise dropped unfulfilled; publishing broken promise");
            let _ = self.state.publish(Err(Error::BrokenPromise));
        }
    }
}

impl<T> fmt::Debug for Promise<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Promise")
            .field("ready", &self.state.is_ready())
            .finish()
    }
}

impl<T> Future<T> {
    pub(crate) fn from_state(state: Arc<SharedState<T>>, executor: Arc<dyn Executor>) -> Self {
        Future {
            state: Some(state),
            executor,
        }
    }

    fn state(&self) -> Result<&Arc<SharedState<T>>, Error> {
        self.state.as_ref().ok_or(Error::NoState)
    }

    /// Whether this handle still refers to a shared state.
    pub fn is_valid(&self) -> bool {
        self.state.is_some()
    }

    /// Blocks until the result is available.
    pub fn wait(&self) -> Result<(), Error> {
        self.state()?.wait();
        Ok(())
    }

    /// Blocks until the result is available and moves it out. The handle is
    /// invalid afterwards; a second call returns [`Error::NoState`].
    pub fn get(&mut self) -> Result<T, Error> {
        let state = self.state.take().ok_or(Error::NoState)?;
        state.wait();
        state.take_outcome()
    }

    pub fn is_ready(&self) -> Result<bool, Error> {
        Ok(self.state()?.is_ready())
    }
}

impl<T: Send + 'static> Future<T> {
    /// Sets the executor future continuations of this handle are dispatched
    /// through. The future returned by `then` starts over on the inline
    /// executor.
    pub fn via(self, executor: Arc<dyn Executor>) -> Self {
        chain::via(self, executor)
    }

    /// Chains `func` on the value of this future.
    ///
    /// `func` only runs if this future succeeds; an error is forwarded to the
    /// returned future untouched. `func` may return a `Result` or another
    /// [`Future`], which is unwrapped.
    ///
    /// # Examples
    ///
    /// ```
    /// use promise_future::{make_ready_future, Error};
    ///
    /// let mut future = make_ready_future(20)
    ///     .then(|v| -> Result<i32, Error> { Ok(v + 1) })
    ///     .unwrap()
    ///     .then(|v| -> Result<i32, Error> { Ok(v * 2) })
    ///     .unwrap();
    /// assert_eq!(future.get().unwrap(), 42);
    /// ```
    pub fn then<F, R>(self, func: F) -> Result<Future<R::Output>, Error>
    where
        F: FnOnce(T) -> R + Send + 'static,
        R: Resolve,
    {
        chain::then_future(self, move |mut antecedent: Future<T>| match antecedent.get() {
            Ok(value) => func(value).into_future(),
            Err(err) => make_exceptional_future(err),
        })
    }

    /// Chains `func` on this future itself, whether it holds a value or an
    /// error.
    pub fn then_future<F, R>(self, func: F) -> Result<Future<R::Output>, Error>
    where
        F: FnOnce(Future<T>) -> R + Send + 'static,
        R: Resolve,
    {
        chain::then_future(self, func)
    }
}

impl<T: Send + Sync + 'static> Future<T> {
    /// Converts this handle into a copyable [`SharedFuture`].
    pub fn share(mut self) -> Result<SharedFuture<T>, Error> {
        let state = self.state.take().ok_or(Error::NoState)?;
        Ok(SharedFuture::from_state(state, self.executor))
    }
}

impl<T: Send + 'static> FutureLike for Future<T> {
    fn executor(&self) -> Arc<dyn Executor> {
        Arc::clone(&self.executor)
    }

    fn set_executor(&mut self, executor: Arc<dyn Executor>) {
        self.executor = executor;
    }

    fn on_ready<F>(mut self, f: F) -> Result<(), Error>
    where
        F: FnOnce(Self) + Send + 'static,
    {
        let state = self.state.take().ok_or(Error::NoState)?;
        let executor = self.executor;
        state.add_callback(Box::new(move |state: Arc<SharedState<T>>| {
            f(Future::from_state(state, executor))
        }));
        Ok(())
    }
}

impl<T> Default for Future<T> {
    /// A handle without a shared state.
    fn default() -> Self {
        Future {
            state: None,
            executor: inline_executor(),
        }
    }
}

impl<T> fmt::Debug for Future<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Future")
            .field("valid", &self.is_valid())
            .field("ready", &self.state.as_ref().map(|s| s.is_ready()))
            .finish()
    }
}

impl<T> std::future::Future for Future<T> {
    type Output = Result<T, Error>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let ready = match self.state {
            Some(ref state) => state.poll_ready(cx.waker()),
            None => return Poll::Ready(Err(Error::NoState)),
        };
        if ready {
            Poll::Ready(self.get())
        } else {
            Poll::Pending
        }
    }
}

/// A future that already holds `value`.
pub fn make_ready_future<T>(value: T) -> Future<T> {
    Future::from_state(Arc::new(SharedState::new_ready(Ok(value))), inline_executor())
}

/// A future that already holds `error`.
pub fn make_exceptional_future<T, E: Into<Error>>(error: E) -> Future<T> {
    Future::from_state(
        Arc::new(SharedState::new_ready(Err(error.into()))),
        inline_executor(),
    )
}

#[cfg(test)]
mod tests {
#[allow(unused_imports)]
use futures::executor::block_on;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use super::{make_exceptional_future, make_ready_future, Future, Promise};
use crate::{Error, Executor, QueuedExecutor};

#[test]
fn test_promise_resolve() {
    let mut op = Promise::<String>::new();
    let mut op_a = op.get_future().unwrap();
    let task1 = thread::spawn(move || op_a.get().unwrap());
    let task2 = thread::spawn(move || op.set_value(String::from("🍓")).unwrap());
    task2.join().expect("The task2 thread has panicked");
    assert_eq!(task1.join().expect("The task1 thread has panicked"), "🍓");
}

#[test]
fn test_get_twice() {
    let mut op = Promise::new();
    let mut op_a = op.get_future().unwrap();
    op.set_value(5).unwrap();
    assert_eq!(op_a.get().unwrap(), 5);
    assert!(!op_a.is_valid());
    assert!(matches!(op_a.get(), Err(Error::NoState)));
    assert!(matches!(op_a.wait(), Err(Error::NoState)));
    assert!(matches!(op_a.is_ready(), Err(Error::NoState)));
}

#[test]
fn test_promise_unresolved() {
    let op = Promise::<String>::new();
    let mut op_a = op.get_future().unwrap();
    let task1 = thread::spawn(move || op_a.get());
    let task2 = thread::spawn(move || {
        // Move the promise into this thread and never resolve it.
        std::mem::drop(op);
    });
    task2.join().expect("The task2 thread has panicked");
    let result = task1.join().expect("The task1 thread has panicked");
    assert!(matches!(result, Err(Error::BrokenPromise)));
}

#[test]
fn test_promise_no_consumer() {
    let mut op = Promise::<String>::new();
    let op_a = op.get_future().unwrap();
    let task1 = thread::spawn(move || {
        let _op_a = op_a;
    });
    let task2 = thread::spawn(move || op.set_value(String::from("🍓")));
    task1.join().expect("The task1 thread has panicked");
    assert!(task2.join().expect("The task2 thread has panicked").is_ok());
}

#[test]
fn test_promise_reject() {
    let mut a = Promise::<String>::new();
    let mut b = a.get_future().unwrap();
    let task1 = thread::spawn(move || b.get());
    a.set_exception("reject!!").unwrap();
    let err = task1.join().expect("The task1 thread has panicked").unwrap_err();
    assert_eq!(err.to_string(), "reject!!");
}

#[test]
fn test_promise_resolve_twice() {
    let mut a = Promise::new();
    a.set_value("hi").unwrap();
    assert!(matches!(a.set_value("hi"), Err(Error::PromiseAlreadySatisfied)));
    assert!(matches!(
        a.set_exception(Error::BrokenPromise),
        Err(Error::PromiseAlreadySatisfied)
    ));
}

#[test]
fn test_get_future_twice() {
    let a = Promise::<u8>::new();
    let _b = a.get_future().unwrap();
    assert!(matches!(a.get_future(), Err(Error::FutureAlreadyRetrieved)));
}

#[test]
fn test_set_with_captures_panic() {
    let mut a = Promise::<u8>::new();
    let mut b = a.get_future().unwrap();
    a.set_with(|| -> Result<u8, Error> { panic!("producer failed") })
        .unwrap();
    assert!(matches!(b.get(), Err(Error::Panicked(ref m)) if m == "producer failed"));

    let mut a = Promise::<u8>::new();
    let mut b = a.get_future().unwrap();
    a.set_with(|| Ok::<_, Error>(9)).unwrap();
    assert_eq!(b.get().unwrap(), 9);
}

#[test]
fn test_ready_constructors() {
    let mut ready = make_ready_future(3);
    assert!(ready.is_ready().unwrap());
    assert_eq!(ready.get().unwrap(), 3);

    let mut failed = make_exceptional_future::<u8, _>(Error::BrokenPromise);
    assert!(failed.is_ready().unwrap());
    assert!(matches!(failed.get(), Err(Error::BrokenPromise)));
}

#[test]
fn test_default_future_has_no_state() {
    let mut f = Future::<u8>::default();
    assert!(!f.is_valid());
    assert!(matches!(f.get(), Err(Error::NoState)));
    assert!(matches!(f.then(|v| Ok::<_, Error>(v)), Err(Error::NoState)));
}

#[test]
fn test_then_runs_on_resolving_thread() {
    let mut op = Promise::<u32>::new();
    let caller = thread::current().id();
    let mut chained = op
        .get_future()
        .unwrap()
        .then(move |v| -> Result<bool, Error> {
            Ok(v == 1 && thread::current().id() != caller)
        })
        .unwrap();
    thread::spawn(move || op.set_value(1).unwrap())
        .join()
        .expect("The producer thread has panicked");
    assert!(chained.get().unwrap());
}

#[test]
fn test_then_skips_on_error() {
    let called = Arc::new(AtomicBool::new(false));
    let seen = Arc::clone(&called);
    let mut chained = make_exceptional_future::<u8, _>("bad input")
        .then(move |v| {
            seen.store(true, Ordering::SeqCst);
            Ok::<_, Error>(v)
        })
        .unwrap();
    assert_eq!(chained.get().unwrap_err().to_string(), "bad input");
    assert!(!called.load(Ordering::SeqCst));
}

#[test]
fn test_then_future_sees_error() {
    let mut chained = make_exceptional_future::<u8, _>("bad input")
        .then_future(|mut f: Future<u8>| -> Result<String, Error> {
            Ok(format!("recovered from {}", f.get().unwrap_err()))
        })
        .unwrap();
    assert_eq!(chained.get().unwrap(), "recovered from bad input");
}

#[test]
fn test_then_captures_panic() {
    let mut chained = make_ready_future(1)
        .then(|_v| -> Result<u8, Error> { panic!("continuation failed") })
        .unwrap();
    assert!(matches!(chained.get(), Err(Error::Panicked(ref m)) if m == "continuation failed"));
}

#[test]
fn test_via_queued_executor() {
    let queue = Arc::new(QueuedExecutor::new());
    let mut op = Promise::<u32>::new();
    let mut chained = op
        .get_future()
        .unwrap()
        .via(queue.clone())
        .then(|v| Ok::<_, Error>(v + 1))
        .unwrap();
    op.set_value(1).unwrap();
    assert_eq!(queue.num_pending_closures(), 1);
    assert!(!chained.is_ready().unwrap());
    queue.run();
    assert_eq!(chained.get().unwrap(), 2);
}

#[test]
fn test_await_future() {
    let mut op = Promise::<String>::new();
    let op_a = op.get_future().unwrap();
    let task1 = thread::spawn(move || block_on(async { op_a.await }));
    let task2 = thread::spawn(move || op.set_value(String::from("🍓")).unwrap());
    task2.join().expect("The task2 thread has panicked");
    assert_eq!(
        task1.join().expect("The task1 thread has panicked").unwrap(),
        "🍓"
    );
}

#[test]
fn test_await_broken_promise() {
    let op = Promise::<u8>::new();
    let op_a = op.get_future().unwrap();
    drop(op);
    assert!(matches!(block_on(op_a), Err(Error::BrokenPromise)));
}
}
