use std::any::type_name;
use std::cell::RefCell;
use std::ptr;
use std::rc::{Rc, Weak};

use crate::error::{drop_catching, ResultSlot};
use crate::event::{EventHandle, FireEvent};
use crate::event_loop;
use crate::node::{OnReady, PromiseNode};
use crate::trace::{short_name, Trace};

/// Completes with the first of two dependencies; the loser is cancelled.
///
/// Each side is its own event, armed when its dependency signals readiness.
/// The first side to fire takes the other side's dependency and drops it
/// (panics from that release are swallowed — they stem from the
/// cancellation, not from the winning computation), then arms the shared
/// ready-event. A side whose own dependency was already taken lost the
/// race before firing and does nothing, so two simultaneously ready
/// dependencies cannot cancel each other out.
pub(crate) struct ExclusiveJoinNode<T: 'static> {
    shared: Rc<JoinShared<T>>,
}

struct JoinShared<T: 'static> {
    on_ready: RefCell<OnReady>,
    left: Rc<JoinBranch<T>>,
    right: Rc<JoinBranch<T>>,
}

struct JoinBranch<T: 'static> {
    handle: EventHandle,
    join: RefCell<Weak<JoinShared<T>>>,
    dependency: RefCell<Option<Box<dyn PromiseNode<T>>>>,
}

impl<T> ExclusiveJoinNode<T> {
    /// Requires a current event loop.
    pub(crate) fn new(
        left: Box<dyn PromiseNode<T>>,
        right: Box<dyn PromiseNode<T>>,
    ) -> ExclusiveJoinNode<T> {
        let owner = event_loop::current_inner();
        let left = JoinBranch::new(owner.clone(), left);
        let right = JoinBranch::new(owner, right);

        let shared = Rc::new(JoinShared {
            on_ready: RefCell::new(OnReady::Unset),
            left: left.clone(),
            right: right.clone(),
        });
        *left.join.borrow_mut() = Rc::downgrade(&shared);
        *right.join.borrow_mut() = Rc::downgrade(&shared);

        for branch in [&left, &right] {
            let weak_branch: Weak<JoinBranch<T>> = Rc::downgrade(branch);
            let target: Weak<dyn FireEvent> = weak_branch;
            let ready = branch
                .dependency
                .borrow_mut()
                .as_mut()
                .expect("fresh join branch")
                .on_ready(target);
            if ready {
                branch.handle.arm_depth_first();
            }
        }

        ExclusiveJoinNode { shared }
    }

    fn branch_get(branch: &JoinBranch<T>, output: &mut ResultSlot<T>) -> bool {
        let dependency = branch.dependency.borrow_mut().take();
        match dependency {
            Some(mut dependency) => {
                dependency.get(output);
                if let Some(error) = drop_catching(dependency) {
                    output.add_error(error);
                }
                true
            }
            None => false,
        }
    }
}

impl<T> JoinBranch<T> {
    fn new(
        owner: Rc<crate::event_loop::LoopInner>,
        dependency: Box<dyn PromiseNode<T>>,
    ) -> Rc<JoinBranch<T>> {
        Rc::new_cyclic(|weak: &Weak<JoinBranch<T>>| {
            let target: Weak<dyn FireEvent> = weak.clone();
            JoinBranch {
                handle: EventHandle::new(owner, target),
                join: RefCell::new(Weak::new()),
                dependency: RefCell::new(Some(dependency)),
            }
        })
    }
}

impl<T> FireEvent for JoinBranch<T> {
    fn fire(&self) -> Option<Rc<dyn FireEvent>> {
        if self.dependency.borrow().is_none() {
            // Cancelled: the other side already won.
            return None;
        }
        let join = match self.join.borrow().upgrade() {
            Some(join) => join,
            None => return None,
        };

        let other = if ptr::eq(&*join.left, self) {
            &join.right
        } else {
            &join.left
        };
        if let Some(dependency) = other.dependency.borrow_mut().take() {
            let _ = drop_catching(dependency);
        }

        join.on_ready.borrow_mut().arm();
        None
    }

    fn handle(&self) -> &EventHandle {
        &self.handle
    }
}

impl<T> Trace for JoinBranch<T> {
    fn append_trace(&self, out: &mut Vec<&'static str>) {
        out.push(short_name(type_name::<Self>()));
        if let Some(dependency) = &*self.dependency.borrow() {
            dependency.append_trace(out);
        }
    }
}

impl<T> PromiseNode<T> for ExclusiveJoinNode<T> {
    fn on_ready(&mut self, event: Weak<dyn FireEvent>) -> bool {
        self.shared.on_ready.borrow_mut().init(event)
    }

    fn get(&mut self, output: &mut ResultSlot<T>) {
        let found = Self::branch_get(&self.shared.left, output)
            || Self::branch_get(&self.shared.right, output);
        assert!(found, "get() called before either side completed");
    }
}

impl<T> Trace for ExclusiveJoinNode<T> {
    fn append_trace(&self, out: &mut Vec<&'static str>) {
        out.push(short_name(type_name::<Self>()));
        let left = self.shared.left.dependency.borrow();
        match &*left {
            Some(dependency) => dependency.append_trace(out),
            None => {
                if let Some(dependency) = &*self.shared.right.dependency.borrow() {
                    dependency.append_trace(out);
                }
            }
        }
    }
}
