use std::fmt;
use std::rc::Rc;

use crate::node::adapter::{adapter, Fulfiller};
use crate::node::chain::ChainNode;
use crate::node::eager::EagerNode;
use crate::node::fork::ForkHubInner;
use crate::node::join::ExclusiveJoinNode;
use crate::node::transform::{AttachNode, TransformNode};
use crate::node::{ImmediateNode, NeverNode, PromiseNode};
use crate::trace::format_trace;
use crate::Error;

/// A deferred value.
///
/// A promise wraps one node of a computation graph. Handles are move-only:
/// every combinator consumes the promise it is called on and returns a new
/// one, and dropping a promise cancels the computation behind it,
/// releasing its resources promptly.
///
/// Combinators that need the queue (`then`, `and_then`, `race`, `fork`,
/// `eagerly_evaluate`) must be called on a thread with a running
/// [`EventLoop`](crate::EventLoop); the purely structural ones (`map`,
/// `map_err`, `attach`) work anywhere.
///
/// # Examples
///
/// ```
/// use pledge::{EventLoop, Promise};
///
/// let event_loop = EventLoop::new();
/// let promise = Promise::value("ping")
///     .and_then(|s| Promise::value(format!("{} pong", s)));
/// assert_eq!(event_loop.wait(promise).unwrap(), "ping pong");
/// ```
pub struct Promise<T: 'static> {
    node: Box<dyn PromiseNode<T>>,
}

impl<T: 'static> Promise<T> {
    /// A promise that is already fulfilled with `value`.
    pub fn value(value: T) -> Promise<T> {
        Promise::from_node(Box::new(ImmediateNode::value(value)))
    }

    /// A promise that is already broken with `error`.
    pub fn broken(error: Error) -> Promise<T> {
        Promise::from_node(Box::new(ImmediateNode::broken(error)))
    }

    /// A promise that never completes.
    pub fn never_done() -> Promise<T> {
        Promise::from_node(Box::new(NeverNode::new()))
    }

    pub(crate) fn from_node(node: Box<dyn PromiseNode<T>>) -> Promise<T> {
        Promise { node }
    }

    pub(crate) fn into_node(self) -> Box<dyn PromiseNode<T>> {
        self.node
    }

    /// Transform the value with `func` once it arrives; errors pass
    /// through untouched. A panic in `func` breaks the resulting promise.
    pub fn map<U, F>(self, func: F) -> Promise<U>
    where
        U: 'static,
        F: FnOnce(T) -> U + 'static,
    {
        Promise::from_node(Box::new(TransformNode::new(
            self.node,
            move |result: Result<T, Error>| result.map(func),
        )))
    }

    /// Transform the error with `func` if the promise breaks; values pass
    /// through untouched.
    pub fn map_err<F>(self, func: F) -> Promise<T>
    where
        F: FnOnce(Error) -> Error + 'static,
    {
        Promise::from_node(Box::new(TransformNode::new(
            self.node,
            move |result: Result<T, Error>| result.map_err(func),
        )))
    }

    /// Continue with another promise once this one settles, whichever way
    /// it settles.
    ///
    /// The result of `func` is awaited in turn, so the returned promise
    /// resolves with the inner outcome.
    ///
    /// # Panics
    ///
    /// Panics if no event loop is running on this thread.
    pub fn then<U, F>(self, func: F) -> Promise<U>
    where
        U: 'static,
        F: FnOnce(Result<T, Error>) -> Promise<U> + 'static,
    {
        let step1: Box<dyn PromiseNode<Promise<U>>> = Box::new(TransformNode::new(
            self.node,
            move |result: Result<T, Error>| Ok(func(result)),
        ));
        Promise::from_node(Box::new(ChainNode::new(step1)))
    }

    /// Continue with another promise on success; errors short-circuit.
    ///
    /// # Panics
    ///
    /// Panics if no event loop is running on this thread.
    pub fn and_then<U, F>(self, func: F) -> Promise<U>
    where
        U: 'static,
        F: FnOnce(T) -> Promise<U> + 'static,
    {
        let step1: Box<dyn PromiseNode<Promise<U>>> = Box::new(TransformNode::new(
            self.node,
            move |result: Result<T, Error>| result.map(func),
        ));
        Promise::from_node(Box::new(ChainNode::new(step1)))
    }

    /// Keep `attachment` alive until this promise completes or is dropped.
    ///
    /// Useful for buffers or guards that callbacks borrow from.
    pub fn attach<A: 'static>(self, attachment: A) -> Promise<T> {
        Promise::from_node(Box::new(AttachNode::new(self.node, attachment)))
    }

    /// Resolve with whichever of the two promises completes first; the
    /// loser is cancelled.
    ///
    /// # Panics
    ///
    /// Panics if no event loop is running on this thread.
    pub fn race(self, other: Promise<T>) -> Promise<T> {
        Promise::from_node(Box::new(ExclusiveJoinNode::new(self.node, other.node)))
    }

    /// Split this promise so several consumers can each await a copy of
    /// its result.
    ///
    /// # Panics
    ///
    /// Panics if no event loop is running on this thread.
    pub fn fork(self) -> ForkedPromise<T>
    where
        T: Clone,
    {
        ForkedPromise {
            hub: ForkHubInner::new(self.node),
        }
    }

    /// Start evaluating now, without waiting for a consumer.
    ///
    /// Ordinarily a promise only makes progress while someone pumps the
    /// loop toward it; an eagerly evaluated promise progresses whenever
    /// the loop runs at all.
    ///
    /// # Panics
    ///
    /// Panics if no event loop is running on this thread.
    pub fn eagerly_evaluate(self) -> Promise<T> {
        Promise::from_node(Box::new(EagerNode::new(self.node)))
    }

    /// A newline-separated description of the node chain, for diagnostics.
    pub fn trace(&self) -> String {
        let mut parts = Vec::new();
        self.node.append_trace(&mut parts);
        format_trace(&parts)
    }
}

impl<T: 'static> fmt::Debug for Promise<T> {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.debug_struct("Promise").finish()
    }
}

/// A promise split for consumption by multiple branches.
///
/// Created by [`Promise::fork`]. Each call to
/// [`add_branch`](ForkedPromise::add_branch) produces an independent
/// promise resolving to a clone of the source's result; branches created
/// after the source resolved get their copy immediately.
pub struct ForkedPromise<T: 'static> {
    hub: Rc<ForkHubInner<T>>,
}

impl<T: Clone + 'static> ForkedPromise<T> {
    /// A new consumer of the forked promise.
    pub fn add_branch(&self) -> Promise<T> {
        Promise::from_node(Box::new(ForkHubInner::add_branch(&self.hub)))
    }
}

impl<T: 'static> fmt::Debug for ForkedPromise<T> {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.debug_struct("ForkedPromise").finish()
    }
}

/// A promise and the [`Fulfiller`] that completes it.
///
/// This is the adapter between the promise graph and the outside world:
/// hand the fulfiller to whatever produces the value, await the promise.
///
/// # Examples
///
/// ```
/// use pledge::{pending, EventLoop};
///
/// let event_loop = EventLoop::new();
/// let (promise, fulfiller) = pending::<u32>();
/// fulfiller.fulfill(99).unwrap();
/// assert_eq!(event_loop.wait(promise).unwrap(), 99);
/// ```
pub fn pending<T: 'static>() -> (Promise<T>, Fulfiller<T>) {
    let (node, fulfiller) = adapter();
    (Promise::from_node(Box::new(node)), fulfiller)
}
