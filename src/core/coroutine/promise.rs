//=========================================================================
// Promise
//=========================================================================
//
// One-shot, poll-based completion handle for a coroutine task.
//
// Backed by a bounded(1) channel: the task's resolution hooks send the
// settlement, the holder polls with try_take(). Single-threaded use —
// settlement is observable on the tick after the task finishes (or
// immediately for pre-settled promises).
//
//=========================================================================

//=== External Dependencies ===============================================

use crossbeam_channel::{bounded, Receiver, Sender};

//=== Internal Dependencies ===============================================

use crate::error::{Error, Result};

use super::{Coroutine, Scheduler};

//=== Promise =============================================================

pub(crate) type PromiseSender<T> = Sender<Result<T>>;

/// Future-style result of a one-shot asynchronous operation.
///
/// Poll with [`try_take`](Promise::try_take); the settlement is delivered
/// exactly once.
pub struct Promise<T> {
    rx: Receiver<Result<T>>,
}

impl<T> Promise<T> {
    /// Creates an unsettled promise and its settlement side.
    pub(crate) fn channel() -> (PromiseSender<T>, Self) {
        let (tx, rx) = bounded(1);
        (tx, Self { rx })
    }

    /// Creates a promise already fulfilled with `value`.
    pub fn resolved(value: T) -> Self {
        let (tx, promise) = Self::channel();
        let _ = tx.send(Ok(value));
        promise
    }

    /// Creates a promise already rejected with `err`.
    pub fn rejected(err: Error) -> Self {
        let (tx, promise) = Self::channel();
        let _ = tx.send(Err(err));
        promise
    }

    /// Takes the settlement if the operation has finished.
    ///
    /// Returns `None` while pending; the settlement is yielded at most
    /// once.
    pub fn try_take(&self) -> Option<Result<T>> {
        self.rx.try_recv().ok()
    }
}

//=== Promisify ===========================================================

impl Scheduler {
    /// One-shot wrapper: registers the task and returns a promise that
    /// fulfills on completion or rejects on failure.
    ///
    /// Rejects immediately — without registering — with
    /// [`Error::InvalidSequence`] if the task no longer produces a step
    /// sequence. Hooks already attached to the task still run before the
    /// promise settles. Cancellation leaves the promise pending forever:
    /// it is not a failure.
    pub fn promisify(&self, task: Coroutine) -> Promise<()> {
        if task.disposed() {
            return Promise::rejected(Error::InvalidSequence);
        }
        let (tx, promise) = Promise::channel();
        let resolve = tx.clone();
        let task = task
            .chain_done(move || {
                let _ = resolve.send(Ok(()));
            })
            .chain_catch(move |err| {
                let _ = tx.send(Err(err.clone()));
            });
        match self.spawn(task) {
            Ok(_) => promise,
            Err(err) => Promise::rejected(err),
        }
    }
}

//=========================================================================
// Tests
//=========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::coroutine::Step;

    fn yields(n: u32) -> Coroutine {
        let mut remaining = n;
        Coroutine::new(move || {
            if remaining > 0 {
                remaining -= 1;
                Ok(Step::Yield)
            } else {
                Ok(Step::Return)
            }
        })
    }

    #[test]
    fn resolves_after_completion() {
        let sched = Scheduler::new();
        let promise = sched.promisify(yields(2));

        sched.tick();
        assert!(promise.try_take().is_none());
        sched.tick();
        assert!(promise.try_take().is_none());

        sched.tick();
        assert_eq!(promise.try_take(), Some(Ok(())));
        // Settlement is delivered at most once.
        assert!(promise.try_take().is_none());
    }

    #[test]
    fn rejects_on_failure() {
        let sched = Scheduler::new();
        let promise = sched.promisify(Coroutine::new(|| Err(Error::NotLoaded("hud".into()))));

        sched.tick();
        assert_eq!(promise.try_take(), Some(Err(Error::NotLoaded("hud".into()))));
    }

    #[test]
    fn rejects_disposed_task_without_registering() {
        let sched = Scheduler::new();
        let mut task = yields(1);
        task.dispose();

        let promise = sched.promisify(task);
        assert!(sched.is_empty());
        assert_eq!(promise.try_take(), Some(Err(Error::InvalidSequence)));
    }

    #[test]
    fn cancellation_leaves_promise_pending() {
        let sched = Scheduler::new();
        let promise = sched.promisify(yields(10));
        sched.tick();
        sched.shutdown();
        assert!(promise.try_take().is_none());
    }

    #[test]
    fn pre_settled_constructors() {
        let resolved: Promise<u32> = Promise::resolved(7);
        assert_eq!(resolved.try_take(), Some(Ok(7)));

        let rejected: Promise<u32> = Promise::rejected(Error::Disposed);
        assert_eq!(rejected.try_take(), Some(Err(Error::Disposed)));
    }
}
