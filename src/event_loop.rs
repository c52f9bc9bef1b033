//! The event loop.
//!
//! A loop is bound to the thread that creates it for its whole lifetime;
//! there is at most one per thread. All node construction, arming and
//! firing happen on that thread — the `Rc`-based graph cannot leave it —
//! so the loop needs no locks of its own. The only operation that may be
//! performed from another thread is waking the loop's [`Sleep`] primitive
//! through a [`WakeHandle`].
//!
//! Driving work is pull-based: [`EventLoop::wait`] pumps queued events
//! until the promise it was handed reports ready, parking the thread
//! whenever the queue runs dry.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::Arc;

use crate::error::{drop_catching, ResultSlot};
use crate::event::{EventHandle, FireEvent};
use crate::node::YieldNode;
use crate::promise::Promise;
use crate::queue::Queue;
use crate::sleep::{CondvarSleep, Sleep, WakeHandle};
use crate::task_set::{LoggingErrorHandler, TaskSetInner};
use crate::trace::Trace;
use crate::Error;

thread_local! {
    static CURRENT: RefCell<Option<Rc<LoopInner>>> = RefCell::new(None);
}

pub(crate) struct LoopInner {
    pub(crate) queue: RefCell<Queue>,
    running: Cell<bool>,
    sleep: Arc<dyn Sleep>,
    daemons: RefCell<Option<Rc<TaskSetInner>>>,
}

/// `true` if `loop_inner` is the thread's current loop, or if the thread
/// has none at all (events may still be torn down after their loop died).
pub(crate) fn current_matches(loop_inner: &Rc<LoopInner>) -> bool {
    CURRENT.with(|current| match &*current.borrow() {
        Some(current) => Rc::ptr_eq(current, loop_inner),
        None => true,
    })
}

pub(crate) fn try_current_inner() -> Option<Rc<LoopInner>> {
    CURRENT.with(|current| current.borrow().clone())
}

pub(crate) fn current_inner() -> Rc<LoopInner> {
    try_current_inner().expect("no event loop is running on this thread")
}

/// Sentinel event used by `wait`: firing it just records that it fired.
struct BoolEvent {
    handle: EventHandle,
    fired: Cell<bool>,
}

impl BoolEvent {
    fn new(owner: Rc<LoopInner>) -> Rc<BoolEvent> {
        Rc::new_cyclic(|weak: &Weak<BoolEvent>| {
            let target: Weak<dyn FireEvent> = weak.clone();
            BoolEvent {
                handle: EventHandle::new(owner, target),
                fired: Cell::new(false),
            }
        })
    }
}

impl FireEvent for BoolEvent {
    fn fire(&self) -> Option<Rc<dyn FireEvent>> {
        self.fired.set(true);
        None
    }

    fn handle(&self) -> &EventHandle {
        &self.handle
    }
}

impl Trace for BoolEvent {
    fn append_trace(&self, out: &mut Vec<&'static str>) {
        out.push("BoolEvent");
    }
}

struct ResetRunning<'a>(&'a LoopInner);

impl Drop for ResetRunning<'_> {
    fn drop(&mut self) {
        self.0.running.set(false);
    }
}

impl LoopInner {
    fn daemonize(&self, promise: Promise<()>) {
        let daemons = self.daemons.borrow().clone();
        match daemons {
            Some(daemons) => TaskSetInner::add(&daemons, promise.into_node()),
            None => {
                log::warn!("event loop is shutting down; dropping daemonized promise");
            }
        }
    }
}

pub(crate) fn wait_impl<T: 'static>(
    inner: &Rc<LoopInner>,
    promise: Promise<T>,
) -> Result<T, Error> {
    let is_current = CURRENT.with(|current| match &*current.borrow() {
        Some(current) => Rc::ptr_eq(current, inner),
        None => false,
    });
    assert!(
        is_current,
        "wait() called on a loop that is not installed on this thread"
    );
    assert!(
        !inner.running.get(),
        "wait() is not allowed from within event callbacks"
    );

    let mut node = promise.into_node();

    let done = BoolEvent::new(inner.clone());
    let weak_done: Weak<BoolEvent> = Rc::downgrade(&done);
    let target: Weak<dyn FireEvent> = weak_done;
    if node.on_ready(target) {
        done.fired.set(true);
    }

    inner.running.set(true);
    let _reset = ResetRunning(inner);

    while !done.fired.get() {
        let next = inner.queue.borrow_mut().pop();
        match next {
            Some(weak) => {
                let event = match weak.upgrade() {
                    Some(event) => event,
                    None => {
                        debug_assert!(false, "dead event left in the queue");
                        continue;
                    }
                };
                event.handle().clear_key();
                event.handle().set_firing(true);
                let keep_alive = event.fire();
                event.handle().set_firing(false);
                drop(keep_alive);
                inner.queue.borrow_mut().reset_depth_first();
            }
            None => {
                // No events queued: arm the sleeper, re-check, then park.
                // The re-check closes the window against a wake landing
                // between the empty pop above and the arming.
                inner.sleep.prepare_to_sleep();
                if !inner.queue.borrow().is_empty() {
                    inner.sleep.wake();
                }
                inner.sleep.sleep();
            }
        }
    }

    let mut result = ResultSlot::new();
    node.get(&mut result);
    if let Some(error) = drop_catching(node) {
        result.add_error(error);
    }
    result.into_result()
}

/// A single-threaded cooperative event loop.
///
/// Creating an `EventLoop` installs it as the thread's current loop;
/// dropping it uninstalls it. Promises built while the loop is current are
/// bound to it and must be driven through [`wait`](EventLoop::wait) (or
/// detached with [`daemonize`](EventLoop::daemonize)) before the loop goes
/// away.
///
/// # Examples
///
/// ```
/// use pledge::{EventLoop, Promise};
///
/// let event_loop = EventLoop::new();
/// let promise = Promise::value(6).map(|n| n * 7);
/// assert_eq!(event_loop.wait(promise).unwrap(), 42);
/// ```
pub struct EventLoop {
    inner: Rc<LoopInner>,
}

impl EventLoop {
    /// Create a loop backed by the portable condvar sleep strategy and
    /// install it on this thread.
    ///
    /// # Panics
    ///
    /// Panics if this thread already has an event loop.
    pub fn new() -> EventLoop {
        EventLoop::with_sleep(CondvarSleep::new())
    }

    /// Create a loop with a custom [`Sleep`] strategy.
    ///
    /// # Panics
    ///
    /// Panics if this thread already has an event loop.
    pub fn with_sleep<S: Sleep + 'static>(sleep: S) -> EventLoop {
        let inner = Rc::new(LoopInner {
            queue: RefCell::new(Queue::new()),
            running: Cell::new(false),
            sleep: Arc::new(sleep),
            daemons: RefCell::new(None),
        });

        CURRENT.with(|current| {
            let mut current = current.borrow_mut();
            assert!(current.is_none(), "this thread already has an event loop");
            *current = Some(inner.clone());
        });

        // Daemon tasks bind to the current loop, so the set is created only
        // after the thread-local is installed.
        *inner.daemons.borrow_mut() =
            Some(TaskSetInner::new(Box::new(LoggingErrorHandler::default())));

        EventLoop { inner }
    }

    /// Drive queued events until `promise` is ready, then return its value.
    ///
    /// If the queue runs dry before the promise resolves, the thread parks
    /// until some other thread wakes it through a [`WakeHandle`]; a promise
    /// that nothing will ever complete blocks forever.
    ///
    /// # Panics
    ///
    /// Panics when re-entered from within an event callback.
    pub fn wait<T: 'static>(&self, promise: Promise<T>) -> Result<T, Error> {
        wait_impl(&self.inner, promise)
    }

    /// A promise that resolves after everything currently queued has run.
    pub fn yield_now(&self) -> Promise<()> {
        yield_now()
    }

    /// Detach `promise`, letting the loop drive it in the background.
    ///
    /// Failures are logged. During shutdown the promise is quietly dropped.
    pub fn daemonize(&self, promise: Promise<()>) {
        self.inner.daemonize(promise);
    }

    /// A handle that can wake this loop from another thread.
    pub fn wake_handle(&self) -> WakeHandle {
        WakeHandle::new(self.inner.sleep.clone())
    }

    /// A cheap handle to this loop for use where the loop itself cannot be
    /// borrowed.
    pub fn handle(&self) -> LoopHandle {
        LoopHandle {
            inner: self.inner.clone(),
        }
    }
}

impl Default for EventLoop {
    fn default() -> EventLoop {
        EventLoop::new()
    }
}

impl Drop for EventLoop {
    fn drop(&mut self) {
        // Daemon tasks may still touch the loop while they wind down, so
        // they go first, before the queue is inspected.
        let daemons = self.inner.daemons.borrow_mut().take();
        drop(daemons);

        let mut queue = self.inner.queue.borrow_mut();
        if !queue.is_empty() {
            log::error!("event loop destroyed with events still queued; some promise was leaked");
            queue.clear_for_shutdown();
        }
        drop(queue);

        CURRENT.with(|current| {
            let mut current = current.borrow_mut();
            if let Some(existing) = &*current {
                if Rc::ptr_eq(existing, &self.inner) {
                    *current = None;
                }
            }
        });
    }
}

impl fmt::Debug for EventLoop {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.debug_struct("EventLoop")
            .field("running", &self.inner.running.get())
            .finish()
    }
}

/// A clonable, thread-bound handle to the current event loop.
///
/// Useful inside callbacks, where the [`EventLoop`] itself cannot be
/// borrowed.
#[derive(Clone)]
pub struct LoopHandle {
    inner: Rc<LoopInner>,
}

impl LoopHandle {
    /// The loop installed on this thread.
    ///
    /// # Panics
    ///
    /// Panics if no event loop is running on this thread.
    pub fn current() -> LoopHandle {
        LoopHandle {
            inner: current_inner(),
        }
    }

    /// See [`EventLoop::wait`].
    pub fn wait<T: 'static>(&self, promise: Promise<T>) -> Result<T, Error> {
        wait_impl(&self.inner, promise)
    }

    /// See [`EventLoop::yield_now`].
    pub fn yield_now(&self) -> Promise<()> {
        yield_now()
    }

    /// See [`EventLoop::daemonize`].
    pub fn daemonize(&self, promise: Promise<()>) {
        self.inner.daemonize(promise);
    }
}

impl fmt::Debug for LoopHandle {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.debug_struct("LoopHandle").finish()
    }
}

/// A promise that resolves only after everything already queued has run.
///
/// Where a normal readiness notification jumps the queue (it runs right
/// after the event that produced it), a yielded promise goes to the tail.
pub fn yield_now() -> Promise<()> {
    Promise::from_node(Box::new(YieldNode))
}

/// Detach `promise` onto the current thread's loop.
///
/// # Panics
///
/// Panics if no event loop is running on this thread.
pub fn daemonize(promise: Promise<()>) {
    current_inner().daemonize(promise);
}
