use std::any::type_name;
use std::cell::RefCell;
use std::rc::{Rc, Weak};

use crate::error::{drop_catching, ResultSlot};
use crate::event::{EventHandle, FireEvent};
use crate::event_loop;
use crate::node::{arm_weak_depth_first, ImmediateNode, PromiseNode};
use crate::promise::Promise;
use crate::trace::{short_name, Trace};

/// Flattens a promise-for-promise.
///
/// Step 1: the inner node yields an intermediate `Promise<T>`. This node is
/// the event fired when that happens; the fire adopts the intermediate's
/// node (or an immediate-broken node if step 1 failed) as the new inner.
/// Step 2: `on_ready` and `get` delegate to the adopted node.
///
/// Readiness registered before the transition is handed to the adopted
/// node during the fire, so no extra queue hop is paid when the adopted
/// node is already ready.
pub(crate) struct ChainNode<T: 'static> {
    event: Rc<ChainEvent<T>>,
}

enum ChainState<T: 'static> {
    Step1(Box<dyn PromiseNode<Promise<T>>>),
    Step2(Box<dyn PromiseNode<T>>),
}

struct ChainEvent<T: 'static> {
    handle: EventHandle,
    state: RefCell<Option<ChainState<T>>>,
    on_ready: RefCell<Option<Weak<dyn FireEvent>>>,
}

impl<T> ChainNode<T> {
    /// Requires a current event loop (the transition is queue-driven).
    pub(crate) fn new(inner: Box<dyn PromiseNode<Promise<T>>>) -> ChainNode<T> {
        let owner = event_loop::current_inner();
        let event = Rc::new_cyclic(|weak: &Weak<ChainEvent<T>>| {
            let target: Weak<dyn FireEvent> = weak.clone();
            ChainEvent {
                handle: EventHandle::new(owner, target),
                state: RefCell::new(Some(ChainState::Step1(inner))),
                on_ready: RefCell::new(None),
            }
        });

        let weak_event: Weak<ChainEvent<T>> = Rc::downgrade(&event);
        let target: Weak<dyn FireEvent> = weak_event;
        let ready = match &mut *event.state.borrow_mut() {
            Some(ChainState::Step1(inner)) => inner.on_ready(target),
            _ => unreachable!(),
        };
        if ready {
            event.handle.arm_depth_first();
        }

        ChainNode { event }
    }
}

impl<T> FireEvent for ChainEvent<T> {
    fn fire(&self) -> Option<Rc<dyn FireEvent>> {
        let state = self
            .state
            .borrow_mut()
            .take()
            .expect("chain event fired twice");
        let mut inner = match state {
            ChainState::Step1(inner) => inner,
            ChainState::Step2(_) => panic!("chain event fired after its transition"),
        };

        let mut intermediate: ResultSlot<Promise<T>> = ResultSlot::new();
        inner.get(&mut intermediate);
        if let Some(error) = drop_catching(inner) {
            intermediate.add_error(error);
        }

        let new_inner: Box<dyn PromiseNode<T>> = if intermediate.has_errors() {
            // Step 1 failed: any value it produced is released (panics from
            // that release must not mask the failure) and the adopted node
            // carries the errors.
            if let Some(value) = intermediate.value.take() {
                let _ = drop_catching(value);
            }
            Box::new(ImmediateNode::from_errors(intermediate.errors))
        } else {
            match intermediate.value.take() {
                Some(promise) => promise.into_node(),
                None => panic!("step-1 dependency produced neither a value nor an error"),
            }
        };

        let mut state = self.state.borrow_mut();
        *state = Some(ChainState::Step2(new_inner));

        if let Some(event) = self.on_ready.borrow_mut().take() {
            let ready = match &mut *state {
                Some(ChainState::Step2(inner)) => inner.on_ready(event.clone()),
                _ => unreachable!(),
            };
            if ready {
                arm_weak_depth_first(&event);
            }
        }

        None
    }

    fn handle(&self) -> &EventHandle {
        &self.handle
    }
}

impl<T> ChainEvent<T> {
    fn append_inner_trace(&self, out: &mut Vec<&'static str>) {
        match &*self.state.borrow() {
            Some(ChainState::Step1(inner)) => inner.append_trace(out),
            Some(ChainState::Step2(inner)) => inner.append_trace(out),
            None => {}
        }
    }
}

impl<T> Trace for ChainEvent<T> {
    fn append_trace(&self, out: &mut Vec<&'static str>) {
        out.push(short_name(type_name::<Self>()));
        self.append_inner_trace(out);
    }
}

impl<T> PromiseNode<T> for ChainNode<T> {
    fn on_ready(&mut self, event: Weak<dyn FireEvent>) -> bool {
        let mut state = self.event.state.borrow_mut();
        match &mut *state {
            Some(ChainState::Step1(_)) => {
                let mut slot = self.event.on_ready.borrow_mut();
                assert!(
                    slot.is_none(),
                    "on_ready() may only be called once per node"
                );
                *slot = Some(event);
                false
            }
            Some(ChainState::Step2(inner)) => inner.on_ready(event),
            None => unreachable!("chain observed mid-transition"),
        }
    }

    fn get(&mut self, output: &mut ResultSlot<T>) {
        match &mut *self.event.state.borrow_mut() {
            Some(ChainState::Step2(inner)) => inner.get(output),
            _ => panic!("get() called before the chained promise resolved"),
        }
    }
}

impl<T> Trace for ChainNode<T> {
    fn append_trace(&self, out: &mut Vec<&'static str>) {
        out.push(short_name(type_name::<Self>()));
        self.event.append_inner_trace(out);
    }
}
