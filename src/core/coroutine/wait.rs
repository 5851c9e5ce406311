//=========================================================================
// Wait Primitives
//=========================================================================
//
// Small coroutines that suspend until a condition holds.
//
// Each returns a Coroutine usable standalone (spawned under its own id)
// or nested inside another sequence via Step::Await. A wait blocks its
// owning task indefinitely until the condition holds or the task is
// stopped; there is no timeout mechanism.
//
//=========================================================================

//=== External Dependencies ===============================================

use std::cell::{Cell, RefCell};
use std::rc::Rc;

//=== Internal Dependencies ===============================================

use super::{Coroutine, Step};

//=== Timer ===============================================================

/// External timer abstraction backing [`wait_seconds`].
///
/// The host advances it once per frame with the elapsed time; scheduled
/// deadlines flip their completion flags as virtual time passes them.
/// Deterministic by construction: time moves only when the host says so.
#[derive(Clone)]
pub struct Timer {
    inner: Rc<RefCell<TimerInner>>,
}

struct TimerInner {
    now: f64,
    deadlines: Vec<(f64, Rc<Cell<bool>>)>,
}

impl Timer {
    /// Creates a timer at virtual time zero.
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(TimerInner {
                now: 0.0,
                deadlines: Vec::new(),
            })),
        }
    }

    /// Advances virtual time, firing every deadline it passes.
    pub fn advance(&self, dt_seconds: f32) {
        let mut inner = self.inner.borrow_mut();
        inner.now += f64::from(dt_seconds.max(0.0));
        let now = inner.now;
        inner.deadlines.retain(|(deadline, flag)| {
            if *deadline <= now {
                flag.set(true);
                false
            } else {
                true
            }
        });
    }

    /// Current virtual time in seconds.
    pub fn now(&self) -> f64 {
        self.inner.borrow().now
    }

    // Schedules a deferred flag-set `seconds` from now.
    fn after(&self, seconds: f32) -> Rc<Cell<bool>> {
        let flag = Rc::new(Cell::new(false));
        let mut inner = self.inner.borrow_mut();
        let deadline = inner.now + f64::from(seconds.max(0.0));
        inner.deadlines.push((deadline, flag.clone()));
        flag
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

//=== Wait Constructors ===================================================

/// Suspends until `seconds` of timer time have elapsed.
///
/// Schedules a deferred flag against the timer and yields every tick
/// until the flag is set.
pub fn wait_seconds(timer: &Timer, seconds: f32) -> Coroutine {
    let flag = timer.after(seconds);
    Coroutine::new(move || {
        if flag.get() {
            Ok(Step::Return)
        } else {
            Ok(Step::Yield)
        }
    })
}

/// Suspends for exactly `frames` scheduler ticks.
pub fn wait_frames(frames: u32) -> Coroutine {
    let mut remaining = frames;
    Coroutine::new(move || {
        if remaining > 0 {
            remaining -= 1;
            Ok(Step::Yield)
        } else {
            Ok(Step::Return)
        }
    })
}

/// Suspends for a single scheduler tick.
pub fn wait_frame() -> Coroutine {
    wait_frames(1)
}

/// Suspends while the predicate is false.
pub fn wait_until(mut predicate: impl FnMut() -> bool + 'static) -> Coroutine {
    Coroutine::new(move || {
        if predicate() {
            Ok(Step::Return)
        } else {
            Ok(Step::Yield)
        }
    })
}

/// Suspends while the predicate is true.
pub fn wait_while(mut predicate: impl FnMut() -> bool + 'static) -> Coroutine {
    Coroutine::new(move || {
        if predicate() {
            Ok(Step::Yield)
        } else {
            Ok(Step::Return)
        }
    })
}

//=========================================================================
// Tests
//=========================================================================
