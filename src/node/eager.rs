use std::any::type_name;
use std::cell::RefCell;
use std::mem;
use std::rc::{Rc, Weak};

use crate::error::{drop_catching, ResultSlot};
use crate::event::{EventHandle, FireEvent};
use crate::event_loop;
use crate::node::{OnReady, PromiseNode};
use crate::trace::{short_name, Trace};

/// Forces the dependency to be pumped as soon as the loop runs, rather
/// than lazily when someone waits.
///
/// On fire the dependency's result moves into an internal cell and the
/// dependency is released; consumption happens whenever the downstream
/// side gets around to it.
pub(crate) struct EagerNode<T: 'static> {
    event: Rc<EagerEvent<T>>,
}

struct EagerEvent<T: 'static> {
    handle: EventHandle,
    dependency: RefCell<Option<Box<dyn PromiseNode<T>>>>,
    result: RefCell<ResultSlot<T>>,
    on_ready: RefCell<OnReady>,
}

impl<T> EagerNode<T> {
    /// Requires a current event loop.
    pub(crate) fn new(dependency: Box<dyn PromiseNode<T>>) -> EagerNode<T> {
        let owner = event_loop::current_inner();
        let event = Rc::new_cyclic(|weak: &Weak<EagerEvent<T>>| {
            let target: Weak<dyn FireEvent> = weak.clone();
            EagerEvent {
                handle: EventHandle::new(owner, target),
                dependency: RefCell::new(Some(dependency)),
                result: RefCell::new(ResultSlot::new()),
                on_ready: RefCell::new(OnReady::Unset),
            }
        });

        let weak_event: Weak<EagerEvent<T>> = Rc::downgrade(&event);
        let target: Weak<dyn FireEvent> = weak_event;
        let ready = event
            .dependency
            .borrow_mut()
            .as_mut()
            .expect("fresh eager node")
            .on_ready(target);
        if ready {
            event.handle.arm_depth_first();
        }

        EagerNode { event }
    }
}

impl<T> FireEvent for EagerEvent<T> {
    fn fire(&self) -> Option<Rc<dyn FireEvent>> {
        {
            let mut result = self.result.borrow_mut();
            if let Some(mut dependency) = self.dependency.borrow_mut().take() {
                dependency.get(&mut result);
                if let Some(error) = drop_catching(dependency) {
                    result.add_error(error);
                }
            }
        }
        self.on_ready.borrow_mut().arm();
        None
    }

    fn handle(&self) -> &EventHandle {
        &self.handle
    }
}

impl<T> Trace for EagerEvent<T> {
    fn append_trace(&self, out: &mut Vec<&'static str>) {
        out.push(short_name(type_name::<Self>()));
        if let Some(dependency) = &*self.dependency.borrow() {
            dependency.append_trace(out);
        }
    }
}

impl<T> PromiseNode<T> for EagerNode<T> {
    fn on_ready(&mut self, event: Weak<dyn FireEvent>) -> bool {
        self.event.on_ready.borrow_mut().init(event)
    }

    fn get(&mut self, output: &mut ResultSlot<T>) {
        output.absorb(mem::take(&mut *self.event.result.borrow_mut()));
    }
}

impl<T> Trace for EagerNode<T> {
    fn append_trace(&self, out: &mut Vec<&'static str>) {
        out.push(short_name(type_name::<Self>()));
        if let Some(dependency) = &*self.event.dependency.borrow() {
            dependency.append_trace(out);
        }
    }
}
