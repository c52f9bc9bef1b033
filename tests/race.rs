//! Exclusive-join (race) semantics: first completion wins, the loser is
//! cancelled promptly.

use pledge::{pending, yield_now, Error, EventLoop, Promise};

#[test]
fn immediate_beats_never() {
    let event_loop = EventLoop::new();
    let promise = Promise::value(7).race(Promise::never_done());
    assert_eq!(event_loop.wait(promise).unwrap(), 7);
}

#[test]
fn winner_cancels_the_losing_adapter() {
    let event_loop = EventLoop::new();
    let (never_fulfilled, fulfiller) = pending::<i32>();
    let promise = Promise::value(7).race(never_fulfilled);

    assert_eq!(event_loop.wait(promise).unwrap(), 7);

    // The losing subtree was destroyed before wait returned; whatever was
    // going to fulfill it can observe that and stand down.
    assert!(!fulfiller.is_waiting());
    assert_eq!(fulfiller.fulfill(9), Err(9));
}

#[test]
fn first_completion_wins() {
    let event_loop = EventLoop::new();
    let (slow, slow_fulfiller) = pending::<&'static str>();
    let fast = yield_now().map(|()| "fast");

    let promise = fast.race(slow);
    assert_eq!(event_loop.wait(promise).unwrap(), "fast");
    assert!(!slow_fulfiller.is_waiting());
}

#[test]
fn both_sides_ready_yields_the_first() {
    let event_loop = EventLoop::new();
    let promise = Promise::value(1).race(Promise::value(2));
    assert_eq!(event_loop.wait(promise).unwrap(), 1);
}

#[test]
fn an_error_wins_the_race_too() {
    let event_loop = EventLoop::new();
    let promise = Promise::<i32>::broken(Error::new("fast failure")).race(Promise::never_done());
    assert_eq!(event_loop.wait(promise).unwrap_err().message(), "fast failure");
}

#[test]
fn order_does_not_matter_for_a_single_completion() {
    let event_loop = EventLoop::new();
    let promise = Promise::never_done().race(Promise::value("second slot"));
    assert_eq!(event_loop.wait(promise).unwrap(), "second slot");
}
