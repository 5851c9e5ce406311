//=========================================================================
// Ticker
//=========================================================================
//
// Per-frame clock: subscribers receive the elapsed time each tick.
//
// Subscriptions are id-keyed handles. A subscription added while a tick
// is in progress first fires on the following tick; a removal during a
// tick is honored immediately (the callback will not fire again).
//
//=========================================================================

//=== External Dependencies ===============================================

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use log::debug;

//=== Ticker ==============================================================

/// Handle for removing a ticker subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TickerSub(u64);

type TickCallback = Rc<RefCell<dyn FnMut(f32)>>;

struct TickerInner {
    next_id: u64,
    order: Vec<u64>,
    subs: HashMap<u64, TickCallback>,
}

/// Shared per-frame clock. Clones share one subscriber list.
#[derive(Clone)]
pub struct Ticker {
    inner: Rc<RefCell<TickerInner>>,
}

impl Ticker {
    /// Creates a ticker with no subscribers.
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(TickerInner {
                next_id: 0,
                order: Vec::new(),
                subs: HashMap::new(),
            })),
        }
    }

    /// Subscribes a per-frame callback. Callbacks fire in subscription
    /// order with the elapsed time since the last tick.
    pub fn add(&self, callback: impl FnMut(f32) + 'static) -> TickerSub {
        let mut inner = self.inner.borrow_mut();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.order.push(id);
        inner.subs.insert(id, Rc::new(RefCell::new(callback)));
        TickerSub(id)
    }

    /// Unsubscribes. Returns true if the subscription was live.
    pub fn remove(&self, sub: TickerSub) -> bool {
        let mut inner = self.inner.borrow_mut();
        inner.order.retain(|id| *id != sub.0);
        let removed = inner.subs.remove(&sub.0).is_some();
        if !removed {
            debug!("Ticker remove ignored, subscription {:?} not live", sub);
        }
        removed
    }

    /// Number of live subscriptions.
    pub fn len(&self) -> usize {
        self.inner.borrow().subs.len()
    }

    /// True if nothing is subscribed.
    pub fn is_empty(&self) -> bool {
        self.inner.borrow().subs.is_empty()
    }

    /// Fires every subscriber with the elapsed time.
    pub fn tick(&self, dt: f32) {
        let snapshot: Vec<(u64, TickCallback)> = {
            let inner = self.inner.borrow();
            inner
                .order
                .iter()
                .filter_map(|id| inner.subs.get(id).map(|cb| (*id, cb.clone())))
                .collect()
        };
        for (id, callback) in snapshot {
            // Removed earlier in this same tick.
            if !self.inner.borrow().subs.contains_key(&id) {
                continue;
            }
            (callback.borrow_mut())(dt);
        }
    }
}

impl Default for Ticker {
    fn default() -> Self {
        Self::new()
    }
}

//=========================================================================
// Tests
//=========================================================================
