//=========================================================================
// Coroutine System
//=========================================================================
//
// Cooperative multitasking built on resumable step sequences.
//
// Architecture:
//   Scheduler
//     ├─ tasks: TaskId -> TaskSlot (stack of Coroutine frames)
//     └─ tick() advances every task one step per external frame
//
// A step sequence is a pull-based lazy computation: each `resume()` runs
// to the next suspension point and reports whether to yield, delegate
// into a nested task, or finish. Between suspensions, code executes to
// completion without preemption — there is exactly one logical clock.
//
//=========================================================================

//=== Module Declarations =================================================

mod promise;
mod scheduler;
mod wait;

//=== Public API ==========================================================

pub use promise::Promise;
pub(crate) use promise::PromiseSender;
pub use scheduler::{Scheduler, TaskId};
pub use wait::{wait_frame, wait_frames, wait_seconds, wait_until, wait_while, Timer};

//=== Internal Dependencies ===============================================

use crate::error::{Error, Result};

//=== Step ================================================================

/// Outcome of advancing a step sequence by one step.
pub enum Step {
    /// Suspend; the sequence resumes on the next tick.
    Yield,

    /// Suspend and drive the given nested task to completion before this
    /// sequence resumes. Composition flattens: the scheduler steps into
    /// the nested task transparently, one step per tick.
    Await(Coroutine),

    /// The sequence finished.
    Return,
}

//=== StepSequence ========================================================

/// A resumable, interruptible computation advanced one step per tick.
///
/// Implement this for hand-rolled state machines, or use the blanket
/// implementation and write the sequence as a closure:
///
/// ```
/// use stagecraft::prelude::*;
///
/// let mut remaining = 3;
/// let seq = move || -> stagecraft::Result<Step> {
///     if remaining > 0 {
///         remaining -= 1;
///         Ok(Step::Yield)
///     } else {
///         Ok(Step::Return)
///     }
/// };
/// let _task = Coroutine::new(seq);
/// ```
pub trait StepSequence {
    /// Runs the sequence to its next suspension point.
    ///
    /// An `Err` fails the owning task: error hooks fire and the task is
    /// deregistered. Errors never propagate out of the tick loop.
    fn resume(&mut self) -> Result<Step>;
}

// Closures are step sequences.
impl<F> StepSequence for F
where
    F: FnMut() -> Result<Step>,
{
    fn resume(&mut self) -> Result<Step> {
        self()
    }
}

//=== Hooks ===============================================================

type DoneHook = Box<dyn FnOnce()>;
type CatchHook = Box<dyn FnOnce(&Error)>;
type FinallyHook = Box<dyn FnOnce()>;
type CallbackHook = Box<dyn FnOnce(Option<&Error>)>;

//=== Coroutine ===========================================================

/// A cooperative task: a step sequence plus completion hooks.
///
/// Construct with a sequence, attach hooks builder-style, then hand the
/// task to a [`Scheduler`] (directly via [`Scheduler::spawn`], wrapped
/// via [`Scheduler::promisify`], or nested inside another sequence via
/// [`Step::Await`]).
///
/// Hook semantics:
/// - `done` fires when the sequence completes normally.
/// - `catch` fires on a true failure, never on cancellation.
/// - `finally` fires exactly once when the task is released for any
///   reason: completion, failure, or cancellation.
/// - `as_callback` fires after `done`/`catch` with the error (if any),
///   mirroring a node-style callback.
pub struct Coroutine {
    seq: Option<Box<dyn StepSequence>>,
    done: Option<DoneHook>,
    catch: Option<CatchHook>,
    finally: Option<FinallyHook>,
    callback: Option<CallbackHook>,
}

impl Coroutine {
    /// Creates a task from a step sequence.
    pub fn new(seq: impl StepSequence + 'static) -> Self {
        Self {
            seq: Some(Box::new(seq)),
            done: None,
            catch: None,
            finally: None,
            callback: None,
        }
    }

    /// True once the underlying sequence has been released.
    ///
    /// A disposed task is never resumed; disposal is idempotent.
    pub fn disposed(&self) -> bool {
        self.seq.is_none()
    }

    //--- Hook Builders ----------------------------------------------------

    /// Sets the completion hook.
    pub fn done(mut self, hook: impl FnOnce() + 'static) -> Self {
        self.done = Some(Box::new(hook));
        self
    }

    /// Sets the error hook. Cancellation is not an error and never
    /// reaches this hook.
    pub fn catch(mut self, hook: impl FnOnce(&Error) + 'static) -> Self {
        self.catch = Some(Box::new(hook));
        self
    }

    /// Sets the cleanup hook, run exactly once on release.
    pub fn finally(mut self, hook: impl FnOnce() + 'static) -> Self {
        self.finally = Some(Box::new(hook));
        self
    }

    /// Sets the raw callback hook, fired after `done`/`catch` with the
    /// failure (if any).
    pub fn as_callback(mut self, hook: impl FnOnce(Option<&Error>) + 'static) -> Self {
        self.callback = Some(Box::new(hook));
        self
    }

    /// Releases the sequence and runs the `finally` hook.
    ///
    /// Idempotent: repeated calls do nothing.
    pub fn dispose(&mut self) {
        if self.seq.is_some() {
            self.seq = None;
            if let Some(finally) = self.finally.take() {
                finally();
            }
        }
    }

    //--- Scheduler Interface ----------------------------------------------

    /// Advances the sequence one step. A disposed frame completes
    /// immediately.
    pub(crate) fn resume_step(&mut self) -> Result<Step> {
        match self.seq.as_mut() {
            Some(seq) => seq.resume(),
            None => Ok(Step::Return),
        }
    }

    /// Normal completion: `done`, then `as_callback(None)`, then dispose.
    pub(crate) fn complete(&mut self) {
        if let Some(done) = self.done.take() {
            done();
        }
        if let Some(callback) = self.callback.take() {
            callback(None);
        }
        self.dispose();
    }

    /// Failure: `catch`, then `as_callback(err)`, then dispose.
    pub(crate) fn fail(&mut self, err: &Error) {
        if let Some(catch) = self.catch.take() {
            catch(err);
        }
        if let Some(callback) = self.callback.take() {
            callback(Some(err));
        }
        self.dispose();
    }

    /// Cancellation: dispose only. Error hooks deliberately do not fire.
    pub(crate) fn cancel(&mut self) {
        self.callback = None;
        self.catch = None;
        self.done = None;
        self.dispose();
    }

    //--- Hook Chaining ----------------------------------------------------
    //
    // Used by promisify: resolution hooks run after any user hooks
    // already attached.
    //

    pub(crate) fn chain_done(mut self, hook: impl FnOnce() + 'static) -> Self {
        self.done = Some(match self.done.take() {
            Some(prev) => Box::new(move || {
                prev();
                hook();
            }),
            None => Box::new(hook),
        });
        self
    }

    pub(crate) fn chain_catch(mut self, hook: impl FnOnce(&Error) + 'static) -> Self {
        self.catch = Some(match self.catch.take() {
            Some(prev) => Box::new(move |err: &Error| {
                prev(err);
                hook(err);
            }),
            None => Box::new(hook),
        });
        self
    }
}

impl std::fmt::Debug for Coroutine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coroutine")
            .field("disposed", &self.disposed())
            .finish()
    }
}

//=========================================================================
// Tests
//=========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    fn yields(n: u32) -> impl FnMut() -> Result<Step> {
        let mut remaining = n;
        move || {
            if remaining > 0 {
                remaining -= 1;
                Ok(Step::Yield)
            } else {
                Ok(Step::Return)
            }
        }
    }

    #[test]
    fn new_task_is_not_disposed() {
        let task = Coroutine::new(yields(1));
        assert!(!task.disposed());
    }

    #[test]
    fn dispose_is_idempotent_and_runs_finally_once() {
        let count = Rc::new(Cell::new(0));
        let observed = count.clone();
        let mut task = Coroutine::new(yields(1)).finally(move || observed.set(observed.get() + 1));

        task.dispose();
        task.dispose();

        assert!(task.disposed());
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn disposed_frame_completes_immediately() {
        let mut task = Coroutine::new(yields(5));
        task.dispose();
        assert!(matches!(task.resume_step(), Ok(Step::Return)));
    }

    #[test]
    fn cancel_skips_error_and_done_hooks() {
        let fired = Rc::new(Cell::new(false));
        let done_flag = fired.clone();
        let catch_flag = fired.clone();
        let finally_hit = Rc::new(Cell::new(false));
        let finally_flag = finally_hit.clone();

        let mut task = Coroutine::new(yields(1))
            .done(move || done_flag.set(true))
            .catch(move |_| catch_flag.set(true))
            .finally(move || finally_flag.set(true));
        task.cancel();

        assert!(!fired.get());
        assert!(finally_hit.get());
    }

    #[test]
    fn fail_fires_catch_then_callback_then_finally() {
        let trace = Rc::new(std::cell::RefCell::new(Vec::new()));
        let t1 = trace.clone();
        let t2 = trace.clone();
        let t3 = trace.clone();

        let mut task = Coroutine::new(yields(0))
            .catch(move |_| t1.borrow_mut().push("catch"))
            .as_callback(move |err| {
                assert!(err.is_some());
                t2.borrow_mut().push("callback");
            })
            .finally(move || t3.borrow_mut().push("finally"));
        task.fail(&Error::Disposed);

        assert_eq!(*trace.borrow(), vec!["catch", "callback", "finally"]);
    }

    #[test]
    fn chained_done_hooks_run_in_attachment_order() {
        let trace = Rc::new(std::cell::RefCell::new(Vec::new()));
        let t1 = trace.clone();
        let t2 = trace.clone();

        let mut task = Coroutine::new(yields(0))
            .done(move || t1.borrow_mut().push("user"))
            .chain_done(move || t2.borrow_mut().push("promise"));
        task.complete();

        assert_eq!(*trace.borrow(), vec!["user", "promise"]);
    }
}
