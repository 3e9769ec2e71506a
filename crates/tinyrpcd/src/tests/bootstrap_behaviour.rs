//! Behavioural tests for the server bootstrap sequence.

use std::cell::RefCell;

use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};

use super::support::{self, HealthEvent, TestWorld};

#[fixture]
fn world() -> RefCell<TestWorld> {
    support::world()
}

#[given("a healthy configuration loader")]
fn given_healthy_loader(world: &RefCell<TestWorld>) {
    world.borrow_mut().use_successful_loader();
}

#[given("a failing configuration loader")]
fn given_failing_loader(world: &RefCell<TestWorld>) {
    world.borrow_mut().use_failing_loader();
}

#[when("the server bootstrap runs")]
fn when_bootstrap_runs(world: &RefCell<TestWorld>) {
    world.borrow_mut().bootstrap();
}

#[when("the server is started and asked to stop")]
fn when_started_and_stopped(world: &RefCell<TestWorld>) {
    world.borrow_mut().start_and_stop();
}

#[then("bootstrap succeeds")]
fn then_bootstrap_succeeds(world: &RefCell<TestWorld>) {
    let world = world.borrow();
    assert!(
        world.bootstrap_error().is_none(),
        "bootstrap error: {:?}",
        world.bootstrap_error()
    );
    assert!(world.daemon_bootstrapped(), "daemon should have been bound");
}

#[then("bootstrap fails")]
fn then_bootstrap_fails(world: &RefCell<TestWorld>) {
    assert!(
        world.borrow().bootstrap_error().is_some(),
        "bootstrap succeeded unexpectedly"
    );
}

#[then("the server stops cleanly")]
fn then_server_stops(world: &RefCell<TestWorld>) {
    let world = world.borrow();
    let result = world.run_result().expect("server was not run");
    assert!(result.is_ok(), "server failed: {result:?}");
}

#[then("the reporter recorded bootstrap start")]
fn then_reporter_start(world: &RefCell<TestWorld>) {
    assert!(
        world
            .borrow()
            .reporter
            .events()
            .contains(&HealthEvent::BootstrapStarting),
        "bootstrap start event missing"
    );
}

#[then("the reporter recorded bootstrap success")]
fn then_reporter_success(world: &RefCell<TestWorld>) {
    assert!(
        world
            .borrow()
            .reporter
            .events()
            .contains(&HealthEvent::BootstrapSucceeded),
        "bootstrap success event missing"
    );
}

#[then("the reporter recorded bootstrap failure")]
fn then_reporter_failure(world: &RefCell<TestWorld>) {
    let events = world.borrow().reporter.events();
    let failed = events
        .iter()
        .any(|event| matches!(event, HealthEvent::BootstrapFailed(_)));
    assert!(failed, "bootstrap failure event missing: {events:?}");
}

#[then("the reporter recorded server start and stop")]
fn then_reporter_lifecycle(world: &RefCell<TestWorld>) {
    let events = world.borrow().reporter.events();
    let started = events.iter().position(|event| *event == HealthEvent::ServerStarted);
    let stopped = events.iter().position(|event| *event == HealthEvent::ServerStopped);
    assert!(
        matches!((started, stopped), (Some(start), Some(stop)) if start < stop),
        "lifecycle events missing or out of order: {events:?}"
    );
}

#[scenario(
    path = "tests/features/server_bootstrap.feature",
    name = "Healthy configuration binds the server"
)]
fn healthy_bootstrap(world: RefCell<TestWorld>) {
    drop(world);
}

#[scenario(
    path = "tests/features/server_bootstrap.feature",
    name = "Invalid configuration is reported"
)]
fn failing_bootstrap(world: RefCell<TestWorld>) {
    drop(world);
}

#[scenario(
    path = "tests/features/server_bootstrap.feature",
    name = "A started server reports its lifecycle"
)]
fn server_lifecycle(world: RefCell<TestWorld>) {
    drop(world);
}
