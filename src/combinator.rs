//! `when_all` and `when_any`: compose several futures into one.
//!
//! Both combinators hand back the *collection* of futures, in input order,
//! rather than bare values. Every input keeps its own outcome, so one failing
//! input never hides the others. The caller inspects the slots it cares about.
//!
//! Fixed arity uses tuples (up to eight futures), ranges use `Vec`.
use crate::chain::FutureLike;
use crate::{Error, Future, Promise};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// When a composed future fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// Once every input has resolved.
    All,
    /// As soon as the first input resolves.
    Any,
}

/// A fixed group of futures that can be composed into one.
pub trait FutureSet {
    /// The collection handed out once the composition fires.
    type Ready: Send + 'static;

    fn compose(self, completion: Completion) -> Future<Self::Ready>;
}

/// Resolves once every input has resolved, with or without error.
///
/// ```
/// use promise_future::{make_ready_future, when_all};
///
/// let mut all = when_all((make_ready_future(1), make_ready_future("two")));
/// let (mut a, mut b) = all.get().unwrap();
/// assert_eq!(a.get().unwrap(), 1);
/// assert_eq!(b.get().unwrap(), "two");
/// ```
pub fn when_all<S: FutureSet>(futures: S) -> Future<S::Ready> {
    futures.compose(Completion::All)
}

/// Resolves as soon as one input resolves. The other slots may still be
/// pending and resolve later.
pub fn when_any<S: FutureSet>(futures: S) -> Future<S::Ready> {
    futures.compose(Completion::Any)
}

pub fn when_all_iter<I, T>(futures: I) -> Future<Vec<Future<T>>>
where
    I: IntoIterator<Item = Future<T>>,
    T: Send + 'static,
{
    when_all(futures.into_iter().collect::<Vec<_>>())
}

pub fn when_any_iter<I, T>(futures: I) -> Future<Vec<Future<T>>>
where
    I: IntoIterator<Item = Future<T>>,
    T: Send + 'static,
{
    when_any(futures.into_iter().collect::<Vec<_>>())
}

/// State shared by every input's continuation.
struct Bookkeeping<C> {
    /// The output promise and the collection it will be fulfilled with.
    /// Taken exactly once, by whichever input satisfies the completion rule.
    output: Mutex<Option<(Promise<C>, C)>>,
    completed: AtomicUsize,
    total: usize,
    completion: Completion,
}

impl<C: Send + 'static> Bookkeeping<C> {
    fn start(collection: C, total: usize, completion: Completion) -> (Arc<Self>, Future<C>) {
        let (promise, future) = Promise::pair();
        let bookkeeping = Arc::new(Bookkeeping {
            output: Mutex::new(Some((promise, collection))),
            completed: AtomicUsize::new(0),
            total,
            completion,
        });
        if total == 0 {
            bookkeeping.fire();
        }
        (bookkeeping, future)
    }

    /// Forwards `input` into `slot` once it resolves, then records progress.
    fn attach<T: Send + 'static>(self: &Arc<Self>, input: Future<T>, mut slot: Promise<T>) {
        if !input.is_valid() {
            let _ = slot.set_exception(Error::NoState);
            self.record();
            return;
        }
        let bookkeeping = Arc::clone(self);
        let _ = input.on_ready(move |mut done| {
            let _ = slot.set_result(done.get());
            bookkeeping.record();
        });
    }

    fn record(&self) {
        let completed = self.completed.fetch_add(1, Ordering::AcqRel) + 1;
        let satisfied = match self.completion {
            Completion::All => completed == self.total,
            Completion::Any => completed >= 1,
        };
        if satisfied {
            self.fire();
        }
    }

    fn fire(&self) {
        let output = self.output.lock().take();
        if let Some((mut promise, collection)) = output {
            tracing::trace!(
                completion = ?self.completion,
                total = self.total,
                "composed future ready"
            );
            let _ = promise.set_value(collection);
        }
    }
}

impl<T: Send + 'static> FutureSet for Vec<Future<T>> {
    type Ready = Vec<Future<T>>;

    fn compose(self, completion: Completion) -> Future<Self::Ready> {
        let (slots, results): (Vec<_>, Vec<_>) = self.iter().map(|_| Promise::<T>::pair()).unzip();
        let (bookkeeping, output) = Bookkeeping::start(results, self.len(), completion);
        for (input, slot) in self.into_iter().zip(slots) {
            bookkeeping.attach(input, slot);
        }
        output
    }
}

macro_rules! impl_future_set {
    ($len:expr; $($T:ident $input:ident $slot:ident $result:ident),+) => {
        impl<$($T: Send + 'static),+> FutureSet for ($(Future<$T>,)+) {
            type Ready = ($(Future<$T>,)+);

            fn compose(self, completion: Completion) -> Future<Self::Ready> {
                let ($($input,)+) = self;
                $(let ($slot, $result) = Promise::<$T>::pair();)+
                let (bookkeeping, output) =
                    Bookkeeping::start(($($result,)+), $len, completion);
                $(bookkeeping.attach($input, $slot);)+
                output
            }
        }
    };
}

impl_future_set!(1; A a pa ra);
impl_future_set!(2; A a pa ra, B b pb rb);
impl_future_set!(3; A a pa ra, B b pb rb, C c pc rc);
impl_future_set!(4; A a pa ra, B b pb rb, C c pc rc, D d pd rd);
impl_future_set!(5; A a pa ra, B b pb rb, C c pc rc, D d pd rd, E e pe re);
impl_future_set!(6; A a pa ra, B b pb rb, C c pc rc, D d pd rd, E e pe re, F f pf rf);
impl_future_set!(7; A a pa ra, B b pb rb, C c pc rc, D d pd rd, E e pe re, F f pf rf, G g pg rg);
impl_future_set!(8; A a pa ra, B b pb rb, C c pc rc, D d pd rd, E e pe re, F f pf rf, G g pg rg, H h ph rh);

#[cfg(test)]
mod tests {
    use super::{when_all, when_all_iter, when_any, when_any_iter};
    use crate::{make_ready_future, Error, Future, Promise};
    use std::thread;

    #[test]
    fn test_when_all_keeps_input_order() {
        let mut p1 = Promise::<i32>::new();
        let mut p2 = Promise::<i32>::new();
        let mut p3 = Promise::<i32>::new();
        let mut all = when_all((
            p1.get_future().unwrap(),
            p2.get_future().unwrap(),
            p3.get_future().unwrap(),
        ));
        let t3 = thread::spawn(move || p3.set_value(3).unwrap());
        t3.join().expect("The t3 thread has panicked");
        assert!(!all.is_ready().unwrap());
        let t1 = thread::spawn(move || p1.set_value(1).unwrap());
        let t2 = thread::spawn(move || p2.set_value(2).unwrap());
        t1.join().expect("The t1 thread has panicked");
        t2.join().expect("The t2 thread has panicked");

        let (mut f1, mut f2, mut f3) = all.get().unwrap();
        assert_eq!(
            (f1.get().unwrap(), f2.get().unwrap(), f3.get().unwrap()),
            (1, 2, 3)
        );
    }

    #[test]
    fn test_when_all_waits_for_failures() {
        let mut p1 = Promise::<u8>::new();
        let p2 = Promise::<String>::new();
        let mut all = when_all((p1.get_future().unwrap(), p2.get_future().unwrap()));
        drop(p2);
        assert!(!all.is_ready().unwrap());
        p1.set_value(7).unwrap();
        let (mut a, mut b) = all.get().unwrap();
        assert_eq!(a.get().unwrap(), 7);
        assert!(matches!(b.get(), Err(Error::BrokenPromise)));
    }

    #[test]
    fn test_when_any_hands_out_pending_slots() {
        let mut p1 = Promise::<i32>::new();
        let mut p2 = Promise::<i32>::new();
        let mut p3 = Promise::<i32>::new();
        let mut any = when_any((
            p1.get_future().unwrap(),
            p2.get_future().unwrap(),
            p3.get_future().unwrap(),
        ));
        assert!(!any.is_ready().unwrap());
        thread::spawn(move || p2.set_value(2).unwrap())
            .join()
            .expect("The p2 thread has panicked");

        let (mut f1, mut f2, mut f3) = any.get().unwrap();
        assert!(!f1.is_ready().unwrap());
        assert!(f2.is_ready().unwrap());
        assert!(!f3.is_ready().unwrap());
        assert_eq!(f2.get().unwrap(), 2);

        // The remaining slots still resolve afterwards.
        p1.set_value(1).unwrap();
        p3.set_exception("late failure").unwrap();
        assert_eq!(f1.get().unwrap(), 1);
        assert_eq!(f3.get().unwrap_err().to_string(), "late failure");
    }

    #[test]
    fn test_when_all_iter() {
        let mut promises: Vec<Promise<usize>> = (0..5).map(|_| Promise::new()).collect();
        let futures: Vec<Future<usize>> =
            promises.iter().map(|p| p.get_future().unwrap()).collect();
        let mut all = when_all_iter(futures);
        let workers: Vec<_> = promises
            .drain(..)
            .enumerate()
            .rev()
            .map(|(i, mut p)| thread::spawn(move || p.set_value(i * 10).unwrap()))
            .collect();
        for worker in workers {
            worker.join().expect("The worker thread has panicked");
        }
        let values: Vec<usize> = all
            .get()
            .unwrap()
            .iter_mut()
            .map(|f| f.get().unwrap())
            .collect();
        assert_eq!(values, vec![0, 10, 20, 30, 40]);
    }

    #[test]
    fn test_when_any_iter_first_ready() {
        let mut promises: Vec<Promise<u8>> = (0..3).map(|_| Promise::new()).collect();
        let mut any = when_any_iter(promises.iter().map(|p| p.get_future().unwrap()));
        promises[1].set_value(9).unwrap();
        let slots = any.get().unwrap();
        let ready: Vec<bool> = slots.iter().map(|f| f.is_ready().unwrap()).collect();
        assert_eq!(ready, vec![false, true, false]);
    }

    #[test]
    fn test_empty_ranges_resolve_immediately() {
        let mut all = when_all_iter(Vec::<Future<u8>>::new());
        assert!(all.get().unwrap().is_empty());
        let mut any = when_any_iter(std::iter::empty::<Future<u8>>());
        assert!(any.get().unwrap().is_empty());
    }

    #[test]
    fn test_invalid_input_counts_as_failed() {
        let mut all = when_all((make_ready_future(1), Future::<u8>::default()));
        let (mut a, mut b) = all.get().unwrap();
        assert_eq!(a.get().unwrap(), 1);
        assert!(matches!(b.get(), Err(Error::NoState)));
    }

    #[test]
    fn test_when_all_then() {
        let mut sum = when_all(vec![make_ready_future(1), make_ready_future(2)])
            .then(|mut slots| -> Result<i32, Error> {
                let mut total = 0;
                for slot in slots.iter_mut() {
                    total += slot.get()?;
                }
                Ok(total)
            })
            .unwrap();
        assert_eq!(sum.get().unwrap(), 3);
    }
}
