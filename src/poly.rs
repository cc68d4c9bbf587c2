use crate::chain::{self, FutureLike, Resolve};
use crate::executor::Executor;
use crate::pair::make_exceptional_future;
use crate::state::SharedState;
use crate::{Error, Future};
use parking_lot::Mutex;
use std::fmt;
use std::sync::{Arc, OnceLock};

/// A consumer handle that can be cloned. Every copy reads the same result,
/// and [`get`](SharedFuture::get) can be called any number of times.
///
/// # Examples
///
/// ```
/// use promise_future::Promise;
/// use std::thread;
///
/// let mut promise = Promise::<String>::new();
/// let consumer = promise.get_future().unwrap().share().unwrap();
/// let consumer2 = consumer.clone();
/// let task1 = thread::spawn(move || consumer.get().cloned());
/// let task2 = thread::spawn(move || consumer2.get().cloned());
/// promise.set_value("Hi".into()).unwrap();
/// assert_eq!(task1.join().expect("The task1 thread has panicked.").unwrap(), "Hi");
/// assert_eq!(task2.join().expect("The task2 thread has panicked.").unwrap(), "Hi");
/// ```
pub struct SharedFuture<T> {
    shared: Option<Arc<Shared<T>>>,
    executor: Arc<dyn Executor>,
}

type Subscriber<T> = Box<dyn FnOnce(Arc<Shared<T>>) + Send + 'static>;

/// The read side common to every copy.
struct Shared<T> {
    state: Arc<SharedState<T>>,
    /// The outcome, moved out of `state` by whoever observes it first.
    outcome: OnceLock<Result<T, Error>>,
    /// Continuations attached through any copy; `None` once they have run.
    subscribers: Mutex<Option<Vec<Subscriber<T>>>>,
}

impl<T> Shared<T> {
    fn settle(&self) -> &Result<T, Error> {
        self.outcome.get_or_init(|| self.state.take_outcome())
    }

    fn fire(self: &Arc<Self>) {
        let _ = self.settle();
        let subscribers = self.subscribers.lock().take().unwrap_or_default();
        for subscriber in subscribers {
            subscriber(Arc::clone(self));
        }
    }

    fn subscribe(self: &Arc<Self>, subscriber: Subscriber<T>) {
        {
            let mut subscribers = self.subscribers.lock();
            if let Some(pending) = subscribers.as_mut() {
                pending.push(subscriber);
                return;
            }
        }
        subscriber(Arc::clone(self));
    }
}

impl<T: Send + Sync + 'static> SharedFuture<T> {
    /// Takes over `state`. The state's single continuation fans out to every
    /// continuation attached through any copy of this handle.
    pub(crate) fn from_state(state: Arc<SharedState<T>>, executor: Arc<dyn Executor>) -> Self {
        let shared = Arc::new(Shared {
            state: Arc::clone(&state),
            outcome: OnceLock::new(),
            subscribers: Mutex::new(Some(Vec::new())),
        });
        let fanout = Arc::clone(&shared);
        state.add_callback(Box::new(move |_: Arc<SharedState<T>>| fanout.fire()));
        SharedFuture {
            shared: Some(shared),
            executor,
        }
    }

    pub fn via(self, executor: Arc<dyn Executor>) -> Self {
        chain::via(self, executor)
    }

    /// Chains `func` on a reference to the value. On error `func` is skipped
    /// and the error is forwarded.
    pub fn then<F, R>(self, func: F) -> Result<Future<R::Output>, Error>
    where
        F: FnOnce(&T) -> R + Send + 'static,
        R: Resolve,
    {
        chain::then_future(self, move |antecedent: SharedFuture<T>| {
            let next = match antecedent.get() {
                Ok(value) => func(value).into_future(),
                Err(err) => make_exceptional_future(err),
            };
            next
        })
    }

    /// Chains `func` on a copy of this handle.
    pub fn then_future<F, R>(self, func: F) -> Result<Future<R::Output>, Error>
    where
        F: FnOnce(SharedFuture<T>) -> R + Send + 'static,
        R: Resolve,
    {
        chain::then_future(self, func)
    }
}

impl<T> SharedFuture<T> {
    fn shared(&self) -> Result<&Arc<Shared<T>>, Error> {
        self.shared.as_ref().ok_or(Error::NoState)
    }

    pub fn is_valid(&self) -> bool {
        self.shared.is_some()
    }

    pub fn wait(&self) -> Result<(), Error> {
        self.shared()?.state.wait();
        Ok(())
    }

    pub fn is_ready(&self) -> Result<bool, Error> {
        Ok(self.shared()?.state.is_ready())
    }

    /// Blocks until the result is available and borrows it. Errors are
    /// cloned out to each caller.
    pub fn get(&self) -> Result<&T, Error> {
        let shared = self.shared()?;
        shared.state.wait();
        shared.settle().as_ref().map_err(Clone::clone)
    }
}

impl<T: Send + Sync + 'static> FutureLike for SharedFuture<T> {
    fn executor(&self) -> Arc<dyn Executor> {
        Arc::clone(&self.executor)
    }

    fn set_executor(&mut self, executor: Arc<dyn Executor>) {
        self.executor = executor;
    }

    fn on_ready<F>(self, f: F) -> Result<(), Error>
    where
        F: FnOnce(Self) + Send + 'static,
    {
        let shared = self.shared.ok_or(Error::NoState)?;
        let executor = self.executor;
        shared.subscribe(Box::new(move |shared: Arc<Shared<T>>| {
            f(SharedFuture {
                shared: Some(shared),
                executor,
            })
        }));
        Ok(())
    }
}

impl<T> Clone for SharedFuture<T> {
    fn clone(&self) -> Self {
        SharedFuture {
            shared: self.shared.clone(),
            executor: Arc::clone(&self.executor),
        }
    }
}

impl<T> Default for SharedFuture<T> {
    fn default() -> Self {
        SharedFuture {
            shared: None,
            executor: crate::executor::inline_executor(),
        }
    }
}

impl<T> fmt::Debug for SharedFuture<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedFuture")
            .field("valid", &self.is_valid())
            .field("ready", &self.is_ready().ok())
            .finish()
    }
}
