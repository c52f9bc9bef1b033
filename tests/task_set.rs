//! Detached-task ownership and error routing.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use pledge::{
    daemonize, yield_now, Error, ErrorHandler, EventLoop, LoggingErrorHandler, Promise, TaskSet,
};

struct CapturingHandler(Rc<RefCell<Vec<Error>>>);

impl ErrorHandler for CapturingHandler {
    fn task_failed(&mut self, error: Error) {
        self.0.borrow_mut().push(error);
    }
}

#[test]
fn failures_route_to_the_handler_exactly_once() {
    let _ = env_logger::try_init();
    let event_loop = EventLoop::new();
    let errors = Rc::new(RefCell::new(Vec::new()));
    let mut tasks = TaskSet::new(Box::new(CapturingHandler(errors.clone())));

    tasks.add(Promise::value(()).map(|()| panic!("exploding task")));
    assert!(!tasks.is_empty());

    event_loop.wait(yield_now()).unwrap();

    assert_eq!(errors.borrow().len(), 1);
    assert!(errors.borrow()[0].message().contains("exploding task"));
    assert!(tasks.is_empty());
}

#[test]
fn successful_tasks_remove_themselves() {
    let event_loop = EventLoop::new();
    let ran = Rc::new(Cell::new(0));
    let mut tasks = TaskSet::new(Box::new(LoggingErrorHandler::default()));

    for _ in 0..3 {
        let ran = ran.clone();
        tasks.add(yield_now().map(move |()| ran.set(ran.get() + 1)));
    }
    assert!(!tasks.is_empty());

    event_loop.wait(yield_now()).unwrap();

    assert_eq!(ran.get(), 3);
    assert!(tasks.is_empty());
}

#[test]
fn teardown_frees_members_even_when_their_destructors_panic() {
    let _ = env_logger::try_init();
    let event_loop = EventLoop::new();

    struct PanickyGuard {
        dropped: Rc<Cell<u32>>,
    }

    impl Drop for PanickyGuard {
        fn drop(&mut self) {
            self.dropped.set(self.dropped.get() + 1);
            panic!("destructor tantrum");
        }
    }

    let dropped = Rc::new(Cell::new(0));
    let mut tasks = TaskSet::new(Box::new(LoggingErrorHandler::default()));
    for _ in 0..3 {
        let guard = PanickyGuard {
            dropped: dropped.clone(),
        };
        tasks.add(Promise::<()>::never_done().attach(guard));
    }

    drop(tasks);
    assert_eq!(dropped.get(), 3);

    event_loop.wait(yield_now()).unwrap();
}

#[test]
fn daemonized_failures_are_logged_not_fatal() {
    let _ = env_logger::try_init();
    let event_loop = EventLoop::new();
    daemonize(Promise::value(()).map(|()| panic!("daemon failure")));
    event_loop.wait(yield_now()).unwrap();
}

#[test]
fn daemons_are_cancelled_when_the_loop_drops() {
    struct DropFlag(Rc<Cell<bool>>);
    impl Drop for DropFlag {
        fn drop(&mut self) {
            self.0.set(true);
        }
    }

    let dropped = Rc::new(Cell::new(false));
    {
        let _event_loop = EventLoop::new();
        daemonize(Promise::<()>::never_done().attach(DropFlag(dropped.clone())));
        assert!(!dropped.get());
    }
    assert!(dropped.get());
}

#[test]
fn trace_lists_live_tasks() {
    let _event_loop = EventLoop::new();
    let mut tasks = TaskSet::new(Box::new(LoggingErrorHandler::default()));
    tasks.add(Promise::<()>::never_done());

    let trace = tasks.trace();
    assert!(trace.contains("TaskEvent"), "trace was: {}", trace);
    assert!(trace.contains("NeverNode"), "trace was: {}", trace);
}
