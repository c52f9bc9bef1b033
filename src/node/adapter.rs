use std::any::type_name;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::mem;
use std::rc::{Rc, Weak};

use crate::error::ResultSlot;
use crate::event::FireEvent;
use crate::node::{OnReady, PromiseNode};
use crate::trace::{short_name, Trace};
use crate::Error;

/// Externally fulfilled leaf: the promise half of [`pending`].
///
/// [`pending`]: crate::pending
pub(crate) struct AdapterNode<T: 'static> {
    shared: Rc<AdapterShared<T>>,
}

struct AdapterShared<T> {
    on_ready: RefCell<OnReady>,
    result: RefCell<ResultSlot<T>>,
    fulfilled: Cell<bool>,
}

pub(crate) fn adapter<T>() -> (AdapterNode<T>, Fulfiller<T>) {
    let shared = Rc::new(AdapterShared {
        on_ready: RefCell::new(OnReady::Unset),
        result: RefCell::new(ResultSlot::new()),
        fulfilled: Cell::new(false),
    });
    let fulfiller = Fulfiller {
        shared: Rc::downgrade(&shared),
        done: false,
    };
    (AdapterNode { shared }, fulfiller)
}

impl<T> PromiseNode<T> for AdapterNode<T> {
    fn on_ready(&mut self, event: Weak<dyn FireEvent>) -> bool {
        self.shared.on_ready.borrow_mut().init(event)
    }

    fn get(&mut self, output: &mut ResultSlot<T>) {
        output.absorb(mem::take(&mut *self.shared.result.borrow_mut()));
    }
}

impl<T> Trace for AdapterNode<T> {
    fn append_trace(&self, out: &mut Vec<&'static str>) {
        out.push(short_name(type_name::<Self>()));
    }
}

/// Fulfills (or rejects) the promise returned alongside it by
/// [`pending`](crate::pending).
///
/// Dropping a fulfiller without calling [`fulfill`](Fulfiller::fulfill) or
/// [`reject`](Fulfiller::reject) rejects the promise. If the promise side
/// has already been destroyed, fulfillment quietly returns the value: the
/// consumer cancelled, and whatever work produced the value should treat
/// that as its cue to stop.
pub struct Fulfiller<T: 'static> {
    shared: Weak<AdapterShared<T>>,
    done: bool,
}

impl<T> Fulfiller<T> {
    /// Complete the promise with `value`.
    ///
    /// Returns the value back if the promise was already destroyed.
    pub fn fulfill(mut self, value: T) -> Result<(), T> {
        self.done = true;
        match self.shared.upgrade() {
            Some(shared) => {
                shared.result.borrow_mut().set_value(value);
                shared.fulfilled.set(true);
                shared.on_ready.borrow_mut().arm();
                Ok(())
            }
            None => Err(value),
        }
    }

    /// Break the promise with `error`.
    pub fn reject(mut self, error: Error) {
        self.done = true;
        if let Some(shared) = self.shared.upgrade() {
            shared.result.borrow_mut().add_error(error);
            shared.fulfilled.set(true);
            shared.on_ready.borrow_mut().arm();
        }
    }

    /// `true` while the promise still exists and has not been fulfilled.
    ///
    /// Work rooted in a fulfiller should check this and stand down once the
    /// consumer has gone away.
    pub fn is_waiting(&self) -> bool {
        match self.shared.upgrade() {
            Some(shared) => !shared.fulfilled.get(),
            None => false,
        }
    }
}

impl<T> Drop for Fulfiller<T> {
    fn drop(&mut self) {
        if self.done {
            return;
        }
        if let Some(shared) = self.shared.upgrade() {
            if !shared.fulfilled.get() {
                shared
                    .result
                    .borrow_mut()
                    .add_error(Error::new("fulfiller was dropped without fulfilling the promise"));
                shared.fulfilled.set(true);
                shared.on_ready.borrow_mut().arm();
            }
        }
    }
}

impl<T> fmt::Debug for Fulfiller<T> {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.debug_struct("Fulfiller")
            .field("is_waiting", &self.is_waiting())
            .finish()
    }
}
