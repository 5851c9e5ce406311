//=========================================================================
// Coroutine Scheduler
//=========================================================================
//
// Registry of in-flight tasks, advanced one step each per external tick.
//
// Flow:
//   spawn() → registry (insertion order)
//   tick()  → snapshot → advance each task → deregister completed
//
// Ordering guarantees:
// - Tasks are advanced in registration order within a tick.
// - Tasks spawned during a tick first advance on the following tick.
// - A stop issued from inside a running step is staged and applied at
//   the end of the current tick; all other stops take effect immediately
//   (a registered task is always at a suspension point when external
//   code runs).
//
//=========================================================================

//=== External Dependencies ===============================================

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use log::{debug, warn};

//=== Internal Dependencies ===============================================

use crate::error::{Error, Result};

use super::{Coroutine, Step};

//=== Task Id =============================================================

/// Scheduler-unique task identifier, assigned from a monotonic counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u64);

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "task#{}", self.0)
    }
}

//=== Task Slot ===========================================================

// One registered task: a stack of coroutine frames. The bottom frame is
// the spawned coroutine; frames above it are nested tasks entered via
// Step::Await.
struct TaskSlot {
    stack: Vec<Coroutine>,
}

enum Advance {
    Running,
    Finished,
}

// Advances the innermost frame, trampolining through nested delegation:
// an Await pushes a frame and continues into it within the same step; a
// Return pops a frame, fires its hooks, and resumes the outer frame
// within the same step.
fn advance_slot(slot: &mut TaskSlot) -> Advance {
    loop {
        let Some(frame) = slot.stack.last_mut() else {
            return Advance::Finished;
        };
        match frame.resume_step() {
            Ok(Step::Yield) => return Advance::Running,
            Ok(Step::Await(inner)) => {
                slot.stack.push(inner);
            }
            Ok(Step::Return) => {
                if let Some(mut frame) = slot.stack.pop() {
                    frame.complete();
                }
                if slot.stack.is_empty() {
                    return Advance::Finished;
                }
            }
            Err(err) => {
                // A failure anywhere fails the whole task. Every frame is
                // unwound innermost-first with the error, so each level's
                // catch/finally hooks observe it.
                while let Some(mut frame) = slot.stack.pop() {
                    frame.fail(&err);
                }
                return Advance::Finished;
            }
        }
    }
}

fn cancel_slot(slot: &mut TaskSlot) {
    // Innermost-first, mirroring unwind order. Only finally hooks run.
    while let Some(mut frame) = slot.stack.pop() {
        frame.cancel();
    }
}

//=== Scheduler ===========================================================

struct Inner {
    next_id: u64,
    order: Vec<TaskId>,
    tasks: HashMap<TaskId, TaskEntry>,
    deferred_stops: Vec<TaskId>,
    ticking: Cell<bool>,
}

struct TaskEntry {
    paused: Rc<Cell<bool>>,
    slot: Rc<RefCell<TaskSlot>>,
}

/// Cooperative task scheduler driven by an external per-frame tick.
///
/// Cheap to clone: clones share one registry. Single-threaded by design —
/// there is no parallel execution, only one logical clock advancing all
/// tasks one step per [`tick`](Scheduler::tick).
#[derive(Clone)]
pub struct Scheduler {
    inner: Rc<RefCell<Inner>>,
}

impl Scheduler {
    /// Creates an empty scheduler.
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(Inner {
                next_id: 0,
                order: Vec::new(),
                tasks: HashMap::new(),
                deferred_stops: Vec::new(),
                ticking: Cell::new(false),
            })),
        }
    }

    //--- Registration -----------------------------------------------------

    /// Registers a task under a fresh id.
    ///
    /// No steps run synchronously; the first advance happens on the next
    /// tick (tasks spawned during a tick are not advanced until the tick
    /// after).
    ///
    /// Fails with [`Error::Disposed`] if the task was already disposed.
    pub fn spawn(&self, task: Coroutine) -> Result<TaskId> {
        if task.disposed() {
            return Err(Error::Disposed);
        }
        let mut inner = self.inner.borrow_mut();
        let id = TaskId(inner.next_id);
        inner.next_id += 1;
        inner.order.push(id);
        inner.tasks.insert(
            id,
            TaskEntry {
                paused: Rc::new(Cell::new(false)),
                slot: Rc::new(RefCell::new(TaskSlot { stack: vec![task] })),
            },
        );
        debug!("Spawned {}", id);
        Ok(id)
    }

    //--- Task Control -----------------------------------------------------

    /// Cancels a live task.
    ///
    /// Delivers the cancellation signal: every frame runs its `finally`
    /// cleanup (innermost-first), error hooks do not fire, and the task
    /// is deregistered. Unknown ids are ignored.
    ///
    /// Returns true if a task was cancelled.
    pub fn stop(&self, id: TaskId) -> bool {
        let slot = match self.inner.borrow().tasks.get(&id) {
            Some(entry) => entry.slot.clone(),
            None => {
                debug!("Stop ignored, {} is not registered", id);
                return false;
            }
        };
        if let Ok(mut slot) = slot.try_borrow_mut() {
            self.unregister(id);
            cancel_slot(&mut slot);
            debug!("Stopped {}", id);
        } else {
            // Stop requested from inside the task's own step; applied
            // at the end of the current tick.
            self.inner.borrow_mut().deferred_stops.push(id);
        }
        true
    }

    /// Pauses a task: it stays registered but is skipped at each tick, its
    /// last step frozen, until resumed.
    ///
    /// Fails with [`Error::Disposed`] if the id does not refer to a live
    /// task.
    pub fn pause(&self, id: TaskId) -> Result<()> {
        self.set_paused(id, true)
    }

    /// Resumes a paused task; it continues from where it left off at the
    /// next tick.
    ///
    /// Fails with [`Error::Disposed`] if the id does not refer to a live
    /// task.
    pub fn resume(&self, id: TaskId) -> Result<()> {
        self.set_paused(id, false)
    }

    fn set_paused(&self, id: TaskId, paused: bool) -> Result<()> {
        match self.inner.borrow().tasks.get(&id) {
            Some(entry) => {
                entry.paused.set(paused);
                Ok(())
            }
            None => Err(Error::Disposed),
        }
    }

    //--- Queries ----------------------------------------------------------

    /// True if the id refers to a registered task.
    pub fn contains(&self, id: TaskId) -> bool {
        self.inner.borrow().tasks.contains_key(&id)
    }

    /// Number of registered tasks.
    pub fn len(&self) -> usize {
        self.inner.borrow().tasks.len()
    }

    /// True if no tasks are registered.
    pub fn is_empty(&self) -> bool {
        self.inner.borrow().tasks.is_empty()
    }

    //--- Tick Loop --------------------------------------------------------

    /// Advances every registered task by exactly one step.
    ///
    /// Invoked once per external frame. Tasks are advanced in insertion
    /// order; completed and failed tasks are deregistered in the same
    /// pass. Failures are delivered through task hooks and never
    /// propagate out of this method.
    pub fn tick(&self) {
        if self.inner.borrow().ticking.replace(true) {
            warn!("Re-entrant scheduler tick ignored");
            return;
        }

        // Snapshot of the tasks registered before this tick. Tasks
        // spawned by a step land in the registry but not in the snapshot.
        let snapshot: Vec<(TaskId, Rc<Cell<bool>>, Rc<RefCell<TaskSlot>>)> = {
            let inner = self.inner.borrow();
            inner
                .order
                .iter()
                .filter_map(|id| {
                    inner
                        .tasks
                        .get(id)
                        .map(|entry| (*id, entry.paused.clone(), entry.slot.clone()))
                })
                .collect()
        };

        for (id, paused, slot) in snapshot {
            // Stopped earlier in this same tick.
            if !self.contains(id) {
                continue;
            }
            if paused.get() {
                continue;
            }
            let finished = {
                let mut slot = slot.borrow_mut();
                matches!(advance_slot(&mut slot), Advance::Finished)
            };
            if finished {
                self.unregister(id);
            }
        }

        // Apply stops requested from inside running steps.
        loop {
            let Some(id) = self.inner.borrow_mut().deferred_stops.pop() else {
                break;
            };
            self.stop(id);
        }

        self.inner.borrow().ticking.set(false);
    }

    /// Cancels every registered task (running `finally` cleanup for each)
    /// and clears the registry.
    pub fn shutdown(&self) {
        let ids: Vec<TaskId> = self.inner.borrow().order.clone();
        debug!("Scheduler shutdown, cancelling {} task(s)", ids.len());
        for id in ids {
            self.stop(id);
        }
    }

    fn unregister(&self, id: TaskId) {
        let mut inner = self.inner.borrow_mut();
        inner.tasks.remove(&id);
        inner.order.retain(|other| *other != id);
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

//=========================================================================
// Tests
//=========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

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
    fn task_completes_after_yield_count_ticks_and_deregisters() {
        let sched = Scheduler::new();
        let id = sched.spawn(yields(3)).unwrap();

        // Three yielding ticks; the task stays registered.
        for _ in 0..3 {
            sched.tick();
            assert!(sched.contains(id));
        }

        // Fourth tick observes Return and deregisters.
        sched.tick();
        assert!(!sched.contains(id));
        assert!(sched.is_empty());
    }

    #[test]
    fn spawn_disposed_task_fails() {
        let sched = Scheduler::new();
        let mut task = yields(1);
        task.dispose();
        assert_eq!(sched.spawn(task), Err(Error::Disposed));
    }

    #[test]
    fn tasks_advance_in_registration_order() {
        let sched = Scheduler::new();
        let trace = Rc::new(RefCell::new(Vec::new()));

        for name in ["a", "b", "c"] {
            let trace = trace.clone();
            let mut fired = false;
            sched
                .spawn(Coroutine::new(move || {
                    if fired {
                        return Ok(Step::Return);
                    }
                    fired = true;
                    trace.borrow_mut().push(name);
                    Ok(Step::Yield)
                }))
                .unwrap();
        }

        sched.tick();
        assert_eq!(*trace.borrow(), vec!["a", "b", "c"]);
    }

    #[test]
    fn task_spawned_during_tick_advances_next_tick() {
        let sched = Scheduler::new();
        let steps = Rc::new(Cell::new(0u32));

        let inner_steps = steps.clone();
        let spawner = sched.clone();
        sched
            .spawn(Coroutine::new(move || {
                let counter = inner_steps.clone();
                spawner
                    .spawn(Coroutine::new(move || {
                        counter.set(counter.get() + 1);
                        Ok(Step::Return)
                    }))
                    .unwrap();
                Ok(Step::Return)
            }))
            .unwrap();

        sched.tick();
        assert_eq!(steps.get(), 0, "spawned task must not run in the same tick");

        sched.tick();
        assert_eq!(steps.get(), 1);
    }

    #[test]
    fn pause_freezes_and_resume_continues() {
        let sched = Scheduler::new();
        let count = Rc::new(Cell::new(0u32));

        let observed = count.clone();
        let id = sched
            .spawn(Coroutine::new(move || {
                observed.set(observed.get() + 1);
                if observed.get() >= 3 {
                    Ok(Step::Return)
                } else {
                    Ok(Step::Yield)
                }
            }))
            .unwrap();

        sched.tick();
        assert_eq!(count.get(), 1);

        sched.pause(id).unwrap();
        sched.tick();
        sched.tick();
        assert_eq!(count.get(), 1, "paused task must not advance");
        assert!(sched.contains(id));

        sched.resume(id).unwrap();
        sched.tick();
        assert_eq!(count.get(), 2, "resume continues, not restarts");
        sched.tick();
        assert_eq!(count.get(), 3);
        assert!(!sched.contains(id));
    }

    #[test]
    fn pause_unknown_id_fails_disposed() {
        let sched = Scheduler::new();
        let id = sched.spawn(yields(0)).unwrap();
        sched.tick();
        assert_eq!(sched.pause(id), Err(Error::Disposed));
        assert_eq!(sched.resume(id), Err(Error::Disposed));
    }

    #[test]
    fn stop_runs_finally_once_and_skips_error_hook() {
        let sched = Scheduler::new();
        let finallys = Rc::new(Cell::new(0u32));
        let caught = Rc::new(Cell::new(false));

        let finally_count = finallys.clone();
        let catch_flag = caught.clone();
        let id = sched
            .spawn(
                yields(10)
                    .catch(move |_| catch_flag.set(true))
                    .finally(move || finally_count.set(finally_count.get() + 1)),
            )
            .unwrap();

        sched.tick();
        assert!(sched.stop(id));
        assert!(!sched.contains(id));
        assert_eq!(finallys.get(), 1);
        assert!(!caught.get());

        // Stopping again is a no-op.
        assert!(!sched.stop(id));
        assert_eq!(finallys.get(), 1);
    }

    #[test]
    fn stop_drops_the_sequence_without_error_delivery() {
        struct DropFlag(Rc<Cell<bool>>);
        impl Drop for DropFlag {
            fn drop(&mut self) {
                self.0.set(true);
            }
        }

        let sched = Scheduler::new();
        let resumes = Rc::new(Cell::new(0u32));
        let released = Rc::new(Cell::new(false));
        let caught = Rc::new(Cell::new(false));

        let counter = resumes.clone();
        let flag = DropFlag(released.clone());
        let catch_flag = caught.clone();
        let id = sched
            .spawn(
                Coroutine::new(move || {
                    let _held = &flag;
                    counter.set(counter.get() + 1);
                    Ok(Step::Yield)
                })
                .catch(move |_| catch_flag.set(true)),
            )
            .unwrap();

        sched.tick();
        assert_eq!(resumes.get(), 1);

        // A stopped task is never resumed again and never sees an error;
        // its sequence is released on the spot.
        assert!(sched.stop(id));
        assert!(released.get());
        assert!(!caught.get());

        sched.tick();
        assert_eq!(resumes.get(), 1);
    }

    #[test]
    fn failing_task_fires_catch_and_deregisters() {
        let sched = Scheduler::new();
        let caught = Rc::new(RefCell::new(None));

        let sink = caught.clone();
        let mut step = 0;
        let id = sched
            .spawn(
                Coroutine::new(move || {
                    step += 1;
                    if step == 1 {
                        Ok(Step::Yield)
                    } else {
                        Err(Error::NotFound("asset".into()))
                    }
                })
                .catch(move |err| *sink.borrow_mut() = Some(err.clone())),
            )
            .unwrap();

        sched.tick();
        assert!(sched.contains(id));
        sched.tick();
        assert!(!sched.contains(id));
        assert_eq!(*caught.borrow(), Some(Error::NotFound("asset".into())));
    }

    #[test]
    fn nested_await_flattens_into_single_task() {
        let sched = Scheduler::new();
        let trace = Rc::new(RefCell::new(Vec::new()));

        let inner_trace = trace.clone();
        let outer_trace = trace.clone();
        let mut phase = 0;
        let id = sched
            .spawn(Coroutine::new(move || {
                phase += 1;
                match phase {
                    1 => {
                        outer_trace.borrow_mut().push("outer:start");
                        let inner_trace = inner_trace.clone();
                        let mut inner_phase = 0;
                        Ok(Step::Await(Coroutine::new(move || {
                            inner_phase += 1;
                            if inner_phase <= 2 {
                                inner_trace.borrow_mut().push("inner:yield");
                                Ok(Step::Yield)
                            } else {
                                inner_trace.borrow_mut().push("inner:done");
                                Ok(Step::Return)
                            }
                        })))
                    }
                    2 => {
                        outer_trace.borrow_mut().push("outer:resume");
                        Ok(Step::Yield)
                    }
                    _ => Ok(Step::Return),
                }
            }))
            .unwrap();

        // Tick 1: outer starts, delegates, inner yields in the same step.
        sched.tick();
        // Tick 2: inner yields again.
        sched.tick();
        // Tick 3: inner finishes; outer resumes within the same step.
        sched.tick();
        assert_eq!(
            *trace.borrow(),
            vec![
                "outer:start",
                "inner:yield",
                "inner:yield",
                "inner:done",
                "outer:resume"
            ]
        );
        assert!(sched.contains(id), "only one registered task throughout");
        assert_eq!(sched.len(), 1);

        sched.tick();
        assert!(!sched.contains(id));
    }

    #[test]
    fn nested_failure_unwinds_every_frame() {
        let sched = Scheduler::new();
        let trace = Rc::new(RefCell::new(Vec::new()));

        let outer_catch = trace.clone();
        let outer_finally = trace.clone();
        let inner_catch = trace.clone();
        let mut started = false;
        sched
            .spawn(
                Coroutine::new(move || {
                    if started {
                        return Ok(Step::Return);
                    }
                    started = true;
                    let inner_catch = inner_catch.clone();
                    Ok(Step::Await(
                        Coroutine::new(|| Err(Error::NotFound("tex".into())))
                            .catch(move |_| inner_catch.borrow_mut().push("inner:catch")),
                    ))
                })
                .catch(move |_| outer_catch.borrow_mut().push("outer:catch"))
                .finally(move || outer_finally.borrow_mut().push("outer:finally")),
            )
            .unwrap();

        sched.tick();
        assert_eq!(
            *trace.borrow(),
            vec!["inner:catch", "outer:catch", "outer:finally"]
        );
        assert!(sched.is_empty());
    }

    #[test]
    fn self_stop_from_inside_step_is_deferred_and_applied() {
        let sched = Scheduler::new();
        let finally_hit = Rc::new(Cell::new(false));

        let stopper = sched.clone();
        let id_cell: Rc<Cell<Option<TaskId>>> = Rc::new(Cell::new(None));
        let my_id = id_cell.clone();
        let finally_flag = finally_hit.clone();
        let id = sched
            .spawn(
                Coroutine::new(move || {
                    if let Some(id) = my_id.get() {
                        stopper.stop(id);
                    }
                    Ok(Step::Yield)
                })
                .finally(move || finally_flag.set(true)),
            )
            .unwrap();
        id_cell.set(Some(id));

        sched.tick();
        assert!(!sched.contains(id));
        assert!(finally_hit.get());
    }

    #[test]
    fn shutdown_cancels_all_and_runs_finally_hooks() {
        let sched = Scheduler::new();
        let finallys = Rc::new(Cell::new(0u32));

        for _ in 0..3 {
            let count = finallys.clone();
            sched
                .spawn(yields(10).finally(move || count.set(count.get() + 1)))
                .unwrap();
        }

        sched.tick();
        sched.shutdown();
        assert!(sched.is_empty());
        assert_eq!(finallys.get(), 3);
    }
}
