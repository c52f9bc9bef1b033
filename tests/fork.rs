//! Fork semantics: one producer, many consumers, each seeing its own copy
//! of the result no matter when the branch was created.

use pledge::{yield_now, Error, EventLoop, Promise};

#[test]
fn branches_each_observe_the_value() {
    let event_loop = EventLoop::new();
    let forked = Promise::value(String::from("x")).fork();
    let double = |s: String| format!("{}{}", s, s);

    let first = forked.add_branch().map(double);
    let second = forked.add_branch().map(double);

    assert_eq!(event_loop.wait(first).unwrap(), "xx");
    assert_eq!(event_loop.wait(second).unwrap(), "xx");
}

#[test]
fn branch_created_after_resolution_sees_the_value() {
    let event_loop = EventLoop::new();
    let forked = Promise::value(41).fork();

    let early = forked.add_branch();
    assert_eq!(event_loop.wait(early).unwrap(), 41);

    let late = forked.add_branch();
    assert_eq!(event_loop.wait(late).unwrap(), 41);
}

#[test]
fn errors_propagate_to_every_branch() {
    let event_loop = EventLoop::new();
    let forked = Promise::<i32>::broken(Error::new("shared failure")).fork();

    let first = forked.add_branch();
    let second = forked.add_branch();

    assert_eq!(
        event_loop.wait(first).unwrap_err().message(),
        "shared failure"
    );
    assert_eq!(
        event_loop.wait(second).unwrap_err().message(),
        "shared failure"
    );
}

#[test]
fn dropping_a_branch_does_not_disturb_the_rest() {
    let event_loop = EventLoop::new();
    let forked = yield_now().map(|()| 1).fork();

    let doomed = forked.add_branch();
    let survivor = forked.add_branch();
    drop(doomed);

    assert_eq!(event_loop.wait(survivor).unwrap(), 1);
}

#[test]
fn branches_outlive_the_forked_handle() {
    let event_loop = EventLoop::new();
    let forked = Promise::value(String::from("kept")).fork();
    let branch = forked.add_branch();
    drop(forked);
    assert_eq!(event_loop.wait(branch).unwrap(), "kept");
}
