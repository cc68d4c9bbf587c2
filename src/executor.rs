//! The boundary continuations are dispatched through.
//!
//! An executor decides which thread runs a continuation. With the default
//! [`InlineExecutor`], a continuation runs on whichever thread resolved the
//! antecedent. [`QueuedExecutor`] holds closures until its owner drains them.
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::{Arc, OnceLock};

/// A unit of work handed to an executor.
pub type Closure = Box<dyn FnOnce() + Send + 'static>;

pub trait Executor: Send + Sync {
    /// Schedules `closure`, or runs it immediately.
    fn add(&self, closure: Closure);

    /// Number of closures accepted but not yet run.
    fn num_pending_closures(&self) -> usize {
        0
    }
}

/// Runs every closure synchronously inside `add`.
#[derive(Debug, Default, Clone, Copy)]
pub struct InlineExecutor;

impl Executor for InlineExecutor {
    fn add(&self, closure: Closure) {
        closure()
    }
}

/// The executor every handle starts with.
pub fn inline_executor() -> Arc<dyn Executor> {
    static INLINE: OnceLock<Arc<dyn Executor>> = OnceLock::new();
    Arc::clone(INLINE.get_or_init(|| Arc::new(InlineExecutor)))
}

/// Queues closures until the owner calls [`run_one`](Self::run_one) or
/// [`run`](Self::run), so continuations run on the draining thread.
///
/// # Examples
///
/// ```
/// use promise_future::{Promise, QueuedExecutor};
/// use std::sync::Arc;
///
/// let queue = Arc::new(QueuedExecutor::new());
/// let mut promise = Promise::<u32>::new();
/// let future = promise.get_future().unwrap().via(queue.clone());
/// let mut doubled = future.then(|v| Ok::<_, promise_future::Error>(v * 2)).unwrap();
///
/// promise.set_value(21).unwrap();
/// assert!(!doubled.is_ready().unwrap());
/// assert_eq!(queue.run(), 1);
/// assert_eq!(doubled.get().unwrap(), 42);
/// ```
#[derive(Default)]
pub struct QueuedExecutor {
    queue: Mutex<VecDeque<Closure>>,
}

impl QueuedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs the oldest queued closure. Returns `false` if the queue was empty.
    pub fn run_one(&self) -> bool {
        // Pop first so the closure runs without the queue locked.
        let next = self.queue.lock().pop_front();
        match next {
            Some(closure) => {
                closure();
                true
            }
            None => false,
        }
    }

    /// Runs closures until the queue is empty, including any queued while
    /// draining. Returns how many ran.
    pub fn run(&self) -> usize {
        let mut ran = 0;
        while self.run_one() {
            ran += 1;
        }
        ran
    }
}

impl Executor for QueuedExecutor {
    fn add(&self, closure: Closure) {
        self.queue.lock().push_back(closure);
    }

    fn num_pending_closures(&self) -> usize {
        self.queue.lock().len()
    }
}

impl std::fmt::Debug for QueuedExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueuedExecutor")
            .field("pending", &self.num_pending_closures())
            .finish()
    }
}
