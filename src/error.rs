//! Error kinds reported by the engine, and the wrapper used to carry
//! user-supplied errors through a shared state.
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Everything that can come out of a failed promise or a misused handle.
///
/// The first four variants describe structural misuse and are returned
/// directly from the offending call. `Panicked` and `Exception` are stored in
/// a shared state and replayed by `get`.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// The promise was dropped before it was fulfilled, or a flattened
    /// future produced an invalid inner future.
    #[error("broken promise")]
    BrokenPromise,
    /// `get_future` was called more than once on the same promise.
    #[error("future already retrieved")]
    FutureAlreadyRetrieved,
    /// The promise was already fulfilled with a value or an error.
    #[error("promise already satisfied")]
    PromiseAlreadySatisfied,
    /// The handle has no shared state (already retrieved or default-constructed).
    #[error("no associated state")]
    NoState,
    /// A continuation or producer closure panicked.
    #[error("panicked: {0}")]
    Panicked(String),
    /// A user error captured with `set_exception` or returned from a continuation.
    #[error(transparent)]
    Exception(Exception),
}

impl Error {
    /// Wraps an arbitrary error so it can be stored in a promise.
    pub fn new<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Error::Exception(Exception(Arc::new(error)))
    }

    /// Builds an error from a plain message.
    pub fn msg<M: fmt::Display>(message: M) -> Self {
        Self::new(Message(message.to_string()))
    }

    /// Returns the wrapped user error if it has type `E`.
    ///
    /// ```
    /// use promise_future::{Error, Promise};
    ///
    /// let mut promise = Promise::<u8>::new();
    /// let mut future = promise.get_future().unwrap();
    /// promise
    ///     .set_exception(Error::new(std::io::Error::other("disk")))
    ///     .unwrap();
    /// let err = future.get().unwrap_err();
    /// assert_eq!(err.downcast_ref::<std::io::Error>().unwrap().to_string(), "disk");
    /// ```
    pub fn downcast_ref<E>(&self) -> Option<&E>
    where
        E: std::error::Error + 'static,
    {
        match self {
            Error::Exception(exception) => exception.0.downcast_ref::<E>(),
            _ => None,
        }
    }

    pub(crate) fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic payload".to_string()
        };
        tracing::warn!(panic = %message, "captured panic from continuation");
        Error::Panicked(message)
    }
}

impl From<String> for Error {
    fn from(message: String) -> Self {
        Error::msg(message)
    }
}

impl From<&str> for Error {
    fn from(message: &str) -> Self {
        Error::msg(message)
    }
}

/// A user error shared between every reader of a failed state.
#[derive(Clone)]
pub struct Exception(Arc<dyn std::error::Error + Send + Sync + 'static>);

impl Exception {
    /// The wrapped error.
    pub fn get_ref(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
        &*self.0
    }
}

impl fmt::Debug for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}

impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&*self.0, f)
    }
}

impl std::error::Error for Exception {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.0.source()
    }
}

#[derive(Debug, thiserror::Error)]
#[error("{0}")]
struct Message(String);
