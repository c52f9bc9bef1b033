//! One promise observed by many consumers.
//!
//! The hub owns the inner node and fires when it is ready, stashing the
//! shared result and releasing the inner node immediately. Branches created
//! before that point register in the hub's branch list and are armed by the
//! fire's walk; branches created afterwards observe the inactive list and
//! arm themselves on the spot. Every branch is therefore exactly once
//! either in the list or already armed, and the list is walked at most
//! once.

use std::any::type_name;
use std::cell::{Cell, RefCell};
use std::mem;
use std::rc::{Rc, Weak};

use slab::Slab;

use crate::error::{drop_catching, ResultSlot};
use crate::event::{EventHandle, FireEvent};
use crate::event_loop;
use crate::node::{OnReady, PromiseNode};
use crate::trace::{short_name, Trace};

pub(crate) struct ForkHubInner<T: 'static> {
    handle: EventHandle,
    inner: RefCell<Option<Box<dyn PromiseNode<T>>>>,
    result: RefCell<ResultSlot<T>>,
    branches: RefCell<BranchList>,
}

struct BranchList {
    active: bool,
    slab: Slab<Weak<BranchShared>>,
}

/// State shared between a branch node and the hub's branch list.
struct BranchShared {
    on_ready: RefCell<OnReady>,
    key: Cell<Option<usize>>,
}

impl<T> ForkHubInner<T> {
    /// Requires a current event loop.
    pub(crate) fn new(inner: Box<dyn PromiseNode<T>>) -> Rc<ForkHubInner<T>> {
        let owner = event_loop::current_inner();
        let hub = Rc::new_cyclic(|weak: &Weak<ForkHubInner<T>>| {
            let target: Weak<dyn FireEvent> = weak.clone();
            ForkHubInner {
                handle: EventHandle::new(owner, target),
                inner: RefCell::new(Some(inner)),
                result: RefCell::new(ResultSlot::new()),
                branches: RefCell::new(BranchList {
                    active: true,
                    slab: Slab::new(),
                }),
            }
        });

        let weak_hub: Weak<ForkHubInner<T>> = Rc::downgrade(&hub);
        let target: Weak<dyn FireEvent> = weak_hub;
        let ready = hub
            .inner
            .borrow_mut()
            .as_mut()
            .expect("fresh fork hub")
            .on_ready(target);
        if ready {
            hub.handle.arm_depth_first();
        }

        hub
    }

    pub(crate) fn add_branch(hub: &Rc<ForkHubInner<T>>) -> ForkBranch<T> {
        let shared = Rc::new(BranchShared {
            on_ready: RefCell::new(OnReady::Unset),
            key: Cell::new(None),
        });

        let mut list = hub.branches.borrow_mut();
        if list.active {
            let key = list.slab.insert(Rc::downgrade(&shared));
            shared.key.set(Some(key));
        } else {
            drop(list);
            shared.on_ready.borrow_mut().arm();
        }

        ForkBranch {
            hub: Some(hub.clone()),
            shared,
        }
    }
}

impl<T> FireEvent for ForkHubInner<T> {
    fn fire(&self) -> Option<Rc<dyn FireEvent>> {
        {
            let mut result = self.result.borrow_mut();
            if let Some(mut inner) = self.inner.borrow_mut().take() {
                inner.get(&mut result);
                if let Some(error) = drop_catching(inner) {
                    result.add_error(error);
                }
            }
        }

        let drained = {
            let mut list = self.branches.borrow_mut();
            list.active = false;
            mem::take(&mut list.slab)
        };
        for (_, weak) in drained {
            if let Some(branch) = weak.upgrade() {
                branch.key.set(None);
                branch.on_ready.borrow_mut().arm();
            }
        }

        None
    }

    fn handle(&self) -> &EventHandle {
        &self.handle
    }
}

impl<T> Trace for ForkHubInner<T> {
    fn append_trace(&self, out: &mut Vec<&'static str>) {
        out.push(short_name(type_name::<Self>()));
        if let Some(inner) = &*self.inner.borrow() {
            inner.append_trace(out);
        }
    }
}

/// One consumer of a forked promise.
///
/// Holds the hub strongly until `get`, at which point it copies the shared
/// result and lets go.
pub(crate) struct ForkBranch<T: 'static> {
    hub: Option<Rc<ForkHubInner<T>>>,
    shared: Rc<BranchShared>,
}

impl<T> PromiseNode<T> for ForkBranch<T>
where
    T: Clone + 'static,
{
    fn on_ready(&mut self, event: Weak<dyn FireEvent>) -> bool {
        self.shared.on_ready.borrow_mut().init(event)
    }

    fn get(&mut self, output: &mut ResultSlot<T>) {
        {
            let hub = self.hub.as_ref().expect("fork branch consumed twice");
            let result = hub.result.borrow();
            if let Some(value) = &result.value {
                output.set_value(value.clone());
            }
            for error in &result.errors {
                output.add_error(error.clone());
            }
        }
        if let Some(error) = drop_catching(self.hub.take()) {
            output.add_error(error);
        }
    }
}

impl<T> Trace for ForkBranch<T> {
    fn append_trace(&self, out: &mut Vec<&'static str>) {
        out.push(short_name(type_name::<Self>()));
        if let Some(hub) = &self.hub {
            if let Some(inner) = &*hub.inner.borrow() {
                inner.append_trace(out);
            }
        }
    }
}

impl<T> Drop for ForkBranch<T> {
    fn drop(&mut self) {
        if let Some(key) = self.shared.key.take() {
            if let Some(hub) = &self.hub {
                hub.branches.borrow_mut().slab.remove(key);
            }
        }
    }
}
