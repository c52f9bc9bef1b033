use std::any::type_name;
use std::marker::PhantomData;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Weak;

use crate::error::{drop_catching, ResultSlot};
use crate::event::FireEvent;
use crate::node::PromiseNode;
use crate::trace::{short_name, Trace};
use crate::Error;

/// Applies a user function to a dependency's result.
///
/// Readiness passes straight through; the function runs inside `get`, with
/// the dependency released first so its resources are dropped before user
/// code observes the outcome. A panicking function (or dependency drop)
/// becomes this node's error.
pub(crate) struct TransformNode<T, U, F> {
    dependency: Option<Box<dyn PromiseNode<T>>>,
    func: Option<F>,
    _marker: PhantomData<fn() -> U>,
}

impl<T, U, F> TransformNode<T, U, F>
where
    F: FnOnce(Result<T, Error>) -> Result<U, Error>,
{
    pub(crate) fn new(dependency: Box<dyn PromiseNode<T>>, func: F) -> TransformNode<T, U, F> {
        TransformNode {
            dependency: Some(dependency),
            func: Some(func),
            _marker: PhantomData,
        }
    }
}

impl<T, U, F> PromiseNode<U> for TransformNode<T, U, F>
where
    T: 'static,
    F: FnOnce(Result<T, Error>) -> Result<U, Error>,
{
    fn on_ready(&mut self, event: Weak<dyn FireEvent>) -> bool {
        self.dependency
            .as_mut()
            .expect("transform dependency already released")
            .on_ready(event)
    }

    fn get(&mut self, output: &mut ResultSlot<U>) {
        let mut dep_result = ResultSlot::new();
        self.dependency
            .as_mut()
            .expect("transform dependency already released")
            .get(&mut dep_result);
        if let Some(error) = drop_catching(self.dependency.take()) {
            dep_result.add_error(error);
        }

        let func = self.func.take().expect("transform applied twice");
        let input = dep_result.into_result();
        match panic::catch_unwind(AssertUnwindSafe(move || func(input))) {
            Ok(Ok(value)) => output.set_value(value),
            Ok(Err(error)) => output.add_error(error),
            Err(payload) => output.add_error(Error::from_panic(payload)),
        }
    }
}

impl<T, U, F> Trace for TransformNode<T, U, F> {
    fn append_trace(&self, out: &mut Vec<&'static str>) {
        out.push(short_name(type_name::<Self>()));
        if let Some(dependency) = &self.dependency {
            dependency.append_trace(out);
        }
    }
}

/// Keeps arbitrary owned data alive for as long as the node itself.
///
/// Everything else delegates to the dependency; the attachment drops with
/// the node, whether it completed or was cancelled.
pub(crate) struct AttachNode<T, A> {
    dependency: Box<dyn PromiseNode<T>>,
    _attachment: A,
}

impl<T, A> AttachNode<T, A> {
    pub(crate) fn new(dependency: Box<dyn PromiseNode<T>>, attachment: A) -> AttachNode<T, A> {
        AttachNode {
            dependency,
            _attachment: attachment,
        }
    }
}

impl<T, A> PromiseNode<T> for AttachNode<T, A>
where
    T: 'static,
{
    fn on_ready(&mut self, event: Weak<dyn FireEvent>) -> bool {
        self.dependency.on_ready(event)
    }

    fn get(&mut self, output: &mut ResultSlot<T>) {
        self.dependency.get(output);
    }
}

impl<T, A> Trace for AttachNode<T, A> {
    fn append_trace(&self, out: &mut Vec<&'static str>) {
        out.push(short_name(type_name::<Self>()));
        self.dependency.append_trace(out);
    }
}
