//! Promise algebra: immediate leaves, transforms, chains, attachments,
//! and the externally-fulfilled adapter.

use std::cell::Cell;
use std::rc::Rc;

use pledge::{daemonize, pending, yield_now, Error, EventLoop, Promise};

struct DropFlag(Rc<Cell<bool>>);

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.0.set(true);
    }
}

#[test]
fn immediate_value() {
    let event_loop = EventLoop::new();
    assert_eq!(event_loop.wait(Promise::value(7)).unwrap(), 7);
}

#[test]
fn immediate_broken() {
    let event_loop = EventLoop::new();
    let err = event_loop
        .wait(Promise::<i32>::broken(Error::new("nope")))
        .unwrap_err();
    assert_eq!(err.message(), "nope");
}

#[test]
fn map_applies_to_the_value() {
    let event_loop = EventLoop::new();
    let promise = Promise::value(6).map(|n| n * 7);
    assert_eq!(event_loop.wait(promise).unwrap(), 42);
}

#[test]
fn map_passes_errors_through() {
    let event_loop = EventLoop::new();
    let promise = Promise::<i32>::broken(Error::new("upstream")).map(|n| n + 1);
    assert_eq!(event_loop.wait(promise).unwrap_err().message(), "upstream");
}

#[test]
fn map_err_rewrites_the_error() {
    let event_loop = EventLoop::new();
    let promise = Promise::<i32>::broken(Error::new("raw"))
        .map_err(|e| Error::new(format!("wrapped: {}", e)));
    assert_eq!(event_loop.wait(promise).unwrap_err().message(), "wrapped: raw");
}

#[test]
fn panic_in_map_breaks_the_promise() {
    let event_loop = EventLoop::new();
    let promise = Promise::value(1).map(|_| -> i32 { panic!("transform exploded") });
    let err = event_loop.wait(promise).unwrap_err();
    assert!(err.message().contains("transform exploded"));
}

#[test]
fn and_then_chains_promises() {
    let event_loop = EventLoop::new();
    let promise = Promise::value(2).and_then(|n| Promise::value(n * 3));
    assert_eq!(event_loop.wait(promise).unwrap(), 6);
}

#[test]
fn chain_propagates_step1_rejection() {
    let event_loop = EventLoop::new();
    let promise =
        Promise::<i32>::broken(Error::new("first stage failed")).and_then(Promise::value);
    assert_eq!(
        event_loop.wait(promise).unwrap_err().message(),
        "first stage failed"
    );
}

#[test]
fn chain_propagates_inner_rejection() {
    let event_loop = EventLoop::new();
    let promise =
        Promise::value(1).and_then(|_| Promise::<i32>::broken(Error::new("second stage failed")));
    assert_eq!(
        event_loop.wait(promise).unwrap_err().message(),
        "second stage failed"
    );
}

#[test]
fn then_observes_errors() {
    let event_loop = EventLoop::new();
    let promise = Promise::<i32>::broken(Error::new("lost")).then(|result| match result {
        Ok(n) => Promise::value(format!("ok {}", n)),
        Err(e) => Promise::value(format!("recovered from {}", e)),
    });
    assert_eq!(event_loop.wait(promise).unwrap(), "recovered from lost");
}

#[test]
fn panic_in_then_breaks_the_promise() {
    let event_loop = EventLoop::new();
    let promise = Promise::value(1).then(|_| -> Promise<i32> { panic!("chain exploded") });
    let err = event_loop.wait(promise).unwrap_err();
    assert!(err.message().contains("chain exploded"));
}

#[test]
fn attachment_lives_until_completion() {
    let event_loop = EventLoop::new();
    let dropped = Rc::new(Cell::new(false));
    let promise = yield_now().attach(DropFlag(dropped.clone()));
    assert!(!dropped.get());
    event_loop.wait(promise).unwrap();
    assert!(dropped.get());
}

#[test]
fn attachment_released_on_cancellation() {
    let dropped = Rc::new(Cell::new(false));
    let promise = Promise::<i32>::never_done().attach(DropFlag(dropped.clone()));
    assert!(!dropped.get());
    drop(promise);
    assert!(dropped.get());
}

#[test]
fn fulfiller_completes_the_promise() {
    let event_loop = EventLoop::new();
    let (promise, fulfiller) = pending::<u32>();
    fulfiller.fulfill(99).unwrap();
    assert_eq!(event_loop.wait(promise).unwrap(), 99);
}

#[test]
fn fulfillment_wakes_a_registered_consumer() {
    let event_loop = EventLoop::new();
    let (promise, fulfiller) = pending::<u32>();
    daemonize(yield_now().map(move |()| {
        fulfiller.fulfill(7).unwrap();
    }));
    assert_eq!(event_loop.wait(promise).unwrap(), 7);
}

#[test]
fn dropped_fulfiller_breaks_the_promise() {
    let event_loop = EventLoop::new();
    let (promise, fulfiller) = pending::<u32>();
    drop(fulfiller);
    let err = event_loop.wait(promise).unwrap_err();
    assert!(err.message().contains("dropped"));
}

#[test]
fn rejection_through_the_fulfiller() {
    let event_loop = EventLoop::new();
    let (promise, fulfiller) = pending::<u32>();
    fulfiller.reject(Error::new("upstream gave up"));
    assert_eq!(
        event_loop.wait(promise).unwrap_err().message(),
        "upstream gave up"
    );
}

#[test]
fn fulfill_after_promise_dropped_returns_the_value() {
    let (promise, fulfiller) = pending::<u32>();
    assert!(fulfiller.is_waiting());
    drop(promise);
    assert!(!fulfiller.is_waiting());
    assert_eq!(fulfiller.fulfill(5), Err(5));
}

#[test]
fn eagerly_evaluate_runs_without_a_consumer() {
    let event_loop = EventLoop::new();
    let ran = Rc::new(Cell::new(false));
    let flag = ran.clone();
    let promise = yield_now().map(move |()| flag.set(true)).eagerly_evaluate();

    event_loop.wait(yield_now()).unwrap();
    assert!(ran.get());

    event_loop.wait(promise).unwrap();
}

#[test]
fn trace_names_the_node_chain() {
    let event_loop = EventLoop::new();
    let promise = Promise::value(1).map(|n| n + 1).and_then(Promise::value);
    let trace = promise.trace();
    assert!(trace.contains("ChainNode"), "trace was: {}", trace);
    assert!(trace.contains("TransformNode"), "trace was: {}", trace);
    assert!(trace.contains("ImmediateNode"), "trace was: {}", trace);
    event_loop.wait(promise).unwrap();
}
