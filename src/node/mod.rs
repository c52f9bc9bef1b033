//! Promise-graph nodes.
//!
//! A node is one vertex in a promise graph: stateful and single-use. The
//! contract is two calls, in order: `on_ready` (at most once) registers the
//! event to arm when the node has a result, and `get` (at most once, only
//! after readiness) extracts that result. Combinators own their
//! dependencies through `Box<dyn PromiseNode<T>>` and release them as soon
//! as their result has been taken, so resources held upstream are dropped
//! promptly.

pub(crate) mod adapter;
pub(crate) mod chain;
pub(crate) mod eager;
pub(crate) mod fork;
pub(crate) mod join;
pub(crate) mod transform;

use std::any::type_name;
use std::marker::PhantomData;
use std::mem;
use std::rc::Weak;

use crate::error::ResultSlot;
use crate::event::FireEvent;
use crate::trace::{short_name, Trace};

pub(crate) trait PromiseNode<T>: Trace {
    /// Register `event` to be armed when this node becomes ready.
    ///
    /// Returns `true` if the node is already ready, in which case the event
    /// is *not* registered and the caller should arm itself depth-first.
    /// May be called at most once per node.
    fn on_ready(&mut self, event: Weak<dyn FireEvent>) -> bool;

    /// Extract the result. Called at most once, only after readiness.
    fn get(&mut self, output: &mut ResultSlot<T>);
}

pub(crate) fn arm_weak_depth_first(event: &Weak<dyn FireEvent>) {
    if let Some(event) = event.upgrade() {
        event.handle().arm_depth_first();
    }
}

pub(crate) fn arm_weak_breadth_first(event: &Weak<dyn FireEvent>) {
    if let Some(event) = event.upgrade() {
        event.handle().arm_breadth_first();
    }
}

/// The readiness handshake carried by nodes that become ready from a fire.
///
/// Holds one of: nothing yet, "became ready before anyone registered", or
/// the registered downstream event. Once armed, the state stays
/// already-ready, so readiness reports are monotonic.
pub(crate) enum OnReady {
    Unset,
    AlreadyReady,
    Registered(Weak<dyn FireEvent>),
}

impl OnReady {
    /// Register `event`, or report that readiness already happened.
    pub(crate) fn init(&mut self, event: Weak<dyn FireEvent>) -> bool {
        match self {
            OnReady::AlreadyReady => true,
            OnReady::Registered(_) => panic!("on_ready() may only be called once per node"),
            OnReady::Unset => {
                *self = OnReady::Registered(event);
                false
            }
        }
    }

    /// Signal readiness: arm the registered event depth-first, or remember
    /// that readiness arrived first. Idempotent.
    pub(crate) fn arm(&mut self) {
        if let OnReady::Registered(event) = mem::replace(self, OnReady::AlreadyReady) {
            arm_weak_depth_first(&event);
        }
    }
}

/// Leaf holding a result that is ready from the start: an immediate value,
/// or a broken promise carrying its errors.
pub(crate) struct ImmediateNode<T> {
    result: ResultSlot<T>,
}

impl<T> ImmediateNode<T> {
    pub(crate) fn value(value: T) -> ImmediateNode<T> {
        let mut result = ResultSlot::new();
        result.set_value(value);
        ImmediateNode { result }
    }

    pub(crate) fn broken(error: crate::Error) -> ImmediateNode<T> {
        let mut result = ResultSlot::new();
        result.add_error(error);
        ImmediateNode { result }
    }

    pub(crate) fn from_errors(errors: Vec<crate::Error>) -> ImmediateNode<T> {
        let mut result = ResultSlot::new();
        result.errors = errors;
        ImmediateNode { result }
    }
}

impl<T> PromiseNode<T> for ImmediateNode<T> {
    fn on_ready(&mut self, _event: Weak<dyn FireEvent>) -> bool {
        true
    }

    fn get(&mut self, output: &mut ResultSlot<T>) {
        output.absorb(mem::take(&mut self.result));
    }
}

impl<T> Trace for ImmediateNode<T> {
    fn append_trace(&self, out: &mut Vec<&'static str>) {
        out.push(short_name(type_name::<Self>()));
    }
}

/// Leaf that never becomes ready.
pub(crate) struct NeverNode<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> NeverNode<T> {
    pub(crate) fn new() -> NeverNode<T> {
        NeverNode {
            _marker: PhantomData,
        }
    }
}

impl<T> PromiseNode<T> for NeverNode<T> {
    fn on_ready(&mut self, _event: Weak<dyn FireEvent>) -> bool {
        false
    }

    fn get(&mut self, _output: &mut ResultSlot<T>) {
        panic!("get() called on a promise that never completes");
    }
}

impl<T> Trace for NeverNode<T> {
    fn append_trace(&self, out: &mut Vec<&'static str>) {
        out.push(short_name(type_name::<Self>()));
    }
}

/// Leaf that lets everything already queued run first: `on_ready` arms the
/// consumer breadth-first instead of reporting ready.
pub(crate) struct YieldNode;

impl PromiseNode<()> for YieldNode {
    fn on_ready(&mut self, event: Weak<dyn FireEvent>) -> bool {
        arm_weak_breadth_first(&event);
        false
    }

    fn get(&mut self, output: &mut ResultSlot<()>) {
        output.set_value(());
    }
}

impl Trace for YieldNode {
    fn append_trace(&self, out: &mut Vec<&'static str>) {
        out.push(short_name(type_name::<Self>()));
    }
}
