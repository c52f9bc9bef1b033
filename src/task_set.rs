//! Detached tasks.
//!
//! A task set owns void promises that run to completion on their own, with
//! nobody waiting on them: server connections being served, background
//! writes, and the like. Each member is a self-firing event; when its
//! promise resolves the task reports any failure to the set's error
//! handler and removes itself. The loop's `daemonize` facility is a task
//! set with a logging handler.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::mem;
use std::rc::{Rc, Weak};

use slab::Slab;

use crate::error::{drop_catching, ResultSlot};
use crate::event::{EventHandle, FireEvent};
use crate::event_loop;
use crate::promise::Promise;
use crate::trace::{format_trace, short_name, Trace};
use crate::Error;

/// Receives failures from detached tasks.
pub trait ErrorHandler {
    /// Called from the loop thread when a detached task fails.
    fn task_failed(&mut self, error: Error);
}

/// The default handler: reports failures through the log.
#[derive(Debug, Default)]
pub struct LoggingErrorHandler;

impl ErrorHandler for LoggingErrorHandler {
    fn task_failed(&mut self, error: Error) {
        log::error!("uncaught error in detached task: {}", error);
    }
}

pub(crate) struct TaskSetInner {
    handler: RefCell<Box<dyn ErrorHandler>>,
    tasks: RefCell<Slab<Rc<TaskEvent>>>,
}

struct TaskEvent {
    handle: EventHandle,
    set: Weak<TaskSetInner>,
    node: RefCell<Option<Box<dyn crate::node::PromiseNode<()>>>>,
    key: Cell<Option<usize>>,
}

impl TaskSetInner {
    pub(crate) fn new(handler: Box<dyn ErrorHandler>) -> Rc<TaskSetInner> {
        Rc::new(TaskSetInner {
            handler: RefCell::new(handler),
            tasks: RefCell::new(Slab::new()),
        })
    }

    pub(crate) fn add(set: &Rc<TaskSetInner>, node: Box<dyn crate::node::PromiseNode<()>>) {
        let owner = event_loop::current_inner();
        let task = Rc::new_cyclic(|weak: &Weak<TaskEvent>| {
            let target: Weak<dyn FireEvent> = weak.clone();
            TaskEvent {
                handle: EventHandle::new(owner, target),
                set: Rc::downgrade(set),
                node: RefCell::new(Some(node)),
                key: Cell::new(None),
            }
        });

        let weak_task: Weak<TaskEvent> = Rc::downgrade(&task);
        let target: Weak<dyn FireEvent> = weak_task;
        let ready = task
            .node
            .borrow_mut()
            .as_mut()
            .expect("fresh task")
            .on_ready(target);
        if ready {
            task.handle.arm_depth_first();
        }

        let key = set.tasks.borrow_mut().insert(task.clone());
        task.key.set(Some(key));
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.tasks.borrow().is_empty()
    }

    pub(crate) fn trace(&self) -> String {
        let tasks = self.tasks.borrow();
        let mut traces = Vec::new();
        for (_, task) in tasks.iter() {
            let mut parts = Vec::new();
            task.append_trace(&mut parts);
            traces.push(format_trace(&parts));
        }
        traces.join("\n============================================\n")
    }
}

impl Drop for TaskSetInner {
    fn drop(&mut self) {
        // Members are moved out and dropped one at a time so that a
        // panicking member destructor cannot take the rest of the
        // collection down with it.
        let tasks = mem::take(&mut *self.tasks.borrow_mut());
        for (_, task) in tasks {
            if let Some(error) = drop_catching(task) {
                log::error!("detached task panicked during task set teardown: {}", error);
            }
        }
    }
}

impl FireEvent for TaskEvent {
    fn fire(&self) -> Option<Rc<dyn FireEvent>> {
        let mut result = ResultSlot::new();
        if let Some(mut node) = self.node.borrow_mut().take() {
            node.get(&mut result);
            if let Some(error) = drop_catching(node) {
                result.add_error(error);
            }
        }

        let set = self.set.upgrade();
        if let Err(error) = result.into_result() {
            if let Some(set) = &set {
                set.handler.borrow_mut().task_failed(error);
            }
        }

        // Remove ourselves from the set, handing our own ownership back to
        // the loop so destruction happens after this fire completes.
        match (set, self.key.take()) {
            (Some(set), Some(key)) => {
                let own: Rc<dyn FireEvent> = set.tasks.borrow_mut().remove(key);
                Some(own)
            }
            _ => None,
        }
    }

    fn handle(&self) -> &EventHandle {
        &self.handle
    }
}

impl Trace for TaskEvent {
    fn append_trace(&self, out: &mut Vec<&'static str>) {
        out.push(short_name(std::any::type_name::<Self>()));
        if let Some(node) = &*self.node.borrow() {
            node.append_trace(out);
        }
    }
}

/// Owns a collection of detached void promises.
///
/// Promises added here run whenever the loop is pumped; their failures are
/// routed to the set's [`ErrorHandler`]. Dropping the set cancels every
/// member.
///
/// # Examples
///
/// ```
/// use pledge::{EventLoop, Promise, TaskSet, LoggingErrorHandler};
///
/// let event_loop = EventLoop::new();
/// let mut tasks = TaskSet::new(Box::new(LoggingErrorHandler::default()));
/// tasks.add(Promise::value(()).map(|()| println!("ran in the background")));
/// event_loop.wait(pledge::yield_now()).unwrap();
/// assert!(tasks.is_empty());
/// ```
pub struct TaskSet {
    inner: Rc<TaskSetInner>,
}

impl TaskSet {
    /// Create an empty set routing failures to `handler`.
    pub fn new(handler: Box<dyn ErrorHandler>) -> TaskSet {
        TaskSet {
            inner: TaskSetInner::new(handler),
        }
    }

    /// Take ownership of `promise` and drive it in the background.
    ///
    /// # Panics
    ///
    /// Panics if no event loop is running on this thread.
    pub fn add(&mut self, promise: Promise<()>) {
        TaskSetInner::add(&self.inner, promise.into_node());
    }

    /// `true` when every added promise has completed.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Traces of all live members, separated by a divider line.
    pub fn trace(&self) -> String {
        self.inner.trace()
    }
}

impl fmt::Debug for TaskSet {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.debug_struct("TaskSet")
            .field("tasks", &self.inner.tasks.borrow().len())
            .finish()
    }
}
