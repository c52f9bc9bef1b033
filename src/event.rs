//! Queue elements.
//!
//! An event is anything the loop can fire: combinator nodes with pending
//! transitions, detached tasks, and the sentinel used by `wait`. Event
//! types are `Rc`-shared between their owner (the promise graph) and the
//! queue, which holds only weak references; dropping the last owner
//! therefore unlinks the event through [`EventHandle`]'s destructor.

use std::cell::Cell;
use std::rc::{Rc, Weak};

use crate::event_loop::{self, LoopInner};
use crate::trace::Trace;

/// An armable unit of scheduling.
///
/// `fire` runs the event's transition. It may return an owned reference to
/// an event (usually itself) whose destruction must be deferred until the
/// loop has finished the fire; detached tasks use this to remove themselves
/// from their set while firing.
pub(crate) trait FireEvent: Trace {
    fn fire(&self) -> Option<Rc<dyn FireEvent>>;

    fn handle(&self) -> &EventHandle;
}

/// The queue linkage carried by every event.
///
/// Holds the owning loop, the slab key while enqueued (`key.is_some()` iff
/// the event is in the queue), and the firing flag. Dropping a handle while
/// enqueued unlinks the event in O(1).
pub(crate) struct EventHandle {
    owner: Rc<LoopInner>,
    target: Weak<dyn FireEvent>,
    key: Cell<Option<usize>>,
    firing: Cell<bool>,
}

impl EventHandle {
    /// Create a handle owned by `owner` that arms `target`.
    ///
    /// `target` is the event this handle is embedded in, obtained from
    /// `Rc::new_cyclic`.
    pub(crate) fn new(owner: Rc<LoopInner>, target: Weak<dyn FireEvent>) -> EventHandle {
        EventHandle {
            owner,
            target,
            key: Cell::new(None),
            firing: Cell::new(false),
        }
    }

    /// Insert at the depth-first point: the event will run immediately
    /// after the currently firing event. No-op if already enqueued.
    pub(crate) fn arm_depth_first(&self) {
        self.assert_owning_loop();
        if self.key.get().is_none() {
            let key = self
                .owner
                .queue
                .borrow_mut()
                .arm_depth_first(self.target.clone());
            self.key.set(Some(key));
        }
    }

    /// Insert at the tail: the event will run after everything already
    /// queued. No-op if already enqueued.
    pub(crate) fn arm_breadth_first(&self) {
        self.assert_owning_loop();
        if self.key.get().is_none() {
            let key = self
                .owner
                .queue
                .borrow_mut()
                .arm_breadth_first(self.target.clone());
            self.key.set(Some(key));
        }
    }

    pub(crate) fn set_firing(&self, firing: bool) {
        self.firing.set(firing);
    }

    /// Forget the queued key without unlinking. Used by the loop when it
    /// pops the event itself, and during shutdown force-unlink.
    pub(crate) fn clear_key(&self) {
        self.key.set(None);
    }

    fn assert_owning_loop(&self) {
        assert!(
            event_loop::current_matches(&self.owner),
            "event armed under a different event loop than the one it was created for"
        );
    }
}

impl Drop for EventHandle {
    fn drop(&mut self) {
        debug_assert!(!self.firing.get(), "event destroyed itself during fire()");
        if let Some(key) = self.key.take() {
            self.owner.queue.borrow_mut().unlink(key);
        }
    }
}
