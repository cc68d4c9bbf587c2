//! The synchronized one-shot cell shared by a promise and its consumers.
use crate::Error;
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::Waker;

/// A continuation registered on a state. It receives an owning reference so
/// it can rebuild a consumer handle once the state resolves.
pub(crate) type Callback<T> = Box<dyn FnOnce(Arc<SharedState<T>>) + Send + 'static>;

#[derive(Debug)]
enum Slot<T> {
    Empty,
    Value(T),
    Error(Error),
    /// The value was moved out by a single-owner consumer.
    Taken,
}

impl<T> Slot<T> {
    fn is_empty(&self) -> bool {
        matches!(self, Slot::Empty)
    }
}

struct Inner<T> {
    slot: Slot<T>,
    retrieved: bool,
    callback: Option<Callback<T>>,
    waker: Option<Waker>,
}

pub(crate) struct SharedState<T> {
    /// Set once the slot left `Empty`; lets `wait` and `is_ready` skip the lock.
    ready: AtomicBool,
    inner: Mutex<Inner<T>>,
    cond: Condvar,
}

impl<T> SharedState<T> {
    pub(crate) fn new() -> Self {
        Self::with_slot(Slot::Empty, false)
    }

    /// A state that is resolved from the start. Nothing else can observe it
    /// yet, so no locking is involved.
    pub(crate) fn new_ready(outcome: Result<T, Error>) -> Self {
        let slot = match outcome {
            Ok(value) => Slot::Value(value),
            Err(err) => Slot::Error(err),
        };
        Self::with_slot(slot, true)
    }

    fn with_slot(slot: Slot<T>, ready: bool) -> Self {
        SharedState {
            ready: AtomicBool::new(ready),
            inner: Mutex::new(Inner {
                slot,
                retrieved: false,
                callback: None,
                waker: None,
            }),
            cond: Condvar::new(),
        }
    }

    pub(crate) fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    /// Blocks until the state is resolved.
    pub(crate) fn wait(&self) {
        if self.is_ready() {
            return;
        }
        let mut inner = self.inner.lock();
        while inner.slot.is_empty() {
            self.cond.wait(&mut inner);
        }
    }

    /// Flags the state as handed out to a consumer. Returns `false` if that
    /// already happened.
    pub(crate) fn mark_retrieved(&self) -> bool {
        let mut inner = self.inner.lock();
        !std::mem::replace(&mut inner.retrieved, true)
    }

    /// Moves the outcome out of a resolved state.
    pub(crate) fn take_outcome(&self) -> Result<T, Error> {
        let mut inner = self.inner.lock();
        match std::mem::replace(&mut inner.slot, Slot::Taken) {
            Slot::Value(value) => Ok(value),
            Slot::Error(err) => {
                inner.slot = Slot::Error(err.clone());
                Err(err)
            }
            Slot::Empty => {
                inner.slot = Slot::Empty;
                Err(Error::NoState)
            }
            Slot::Taken => Err(Error::NoState),
        }
    }

    /// Readiness check for the `.await` bridge. Stores `waker` when the state
    /// is still empty so the publisher can wake it.
    pub(crate) fn poll_ready(&self, waker: &Waker) -> bool {
        if self.is_ready() {
            return true;
        }
        let mut inner = self.inner.lock();
        if !inner.slot.is_empty() {
            return true;
        }
        match inner.waker {
            Some(ref current) if current.will_wake(waker) => {}
            _ => inner.waker = Some(waker.clone()),
        }
        false
    }

    /// Resolves the state with `outcome`.
    ///
    /// Waiters are notified while the lock is held; the waker and the
    /// registered continuation run after it is released, so user code can
    /// freely touch this or any other state.
    pub(crate) fn publish(self: &Arc<Self>, outcome: Result<T, Error>) -> Result<(), Error> {
        let (callback, waker) = {
            let mut inner = self.inner.lock();
            if !inner.slot.is_empty() {
                return Err(Error::PromiseAlreadySatisfied);
            }
            tracing::trace!(is_error = outcome.is_err(), "publishing outcome");
            inner.slot = match outcome {
                Ok(value) => Slot::Value(value),
                Err(err) => Slot::Error(err),
            };
            self.ready.store(true, Ordering::Release);
            self.cond.notify_all();
            (inner.callback.take(), inner.waker.take())
        };
        if let Some(waker) = waker {
            waker.wake();
        }
        if let Some(callback) = callback {
            tracing::trace!("running continuation on publishing thread");
            callback(Arc::clone(self));
        }
        Ok(())
    }

    /// Registers the state's single continuation, or runs it right away if
    /// the state is already resolved.
    pub(crate) fn add_callback(self: &Arc<Self>, callback: Callback<T>) {
        {
            let mut inner = self.inner.lock();
            debug_assert!(inner.callback.is_none(), "continuation already registered");
            if inner.slot.is_empty() {
                inner.callback = Some(callback);
                return;
            }
        }
        callback(Arc::clone(self));
    }
}
