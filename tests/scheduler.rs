use relay::{Error, Runtime, TaskState};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

#[test]
fn deferred_callback_runs_after_synchronous_continuation() {
    let runtime = Runtime::new();
    let handle = runtime.handle();
    let log = Rc::new(RefCell::new(Vec::new()));

    let task_log = log.clone();
    runtime.spawn(async move {
        task_log.borrow_mut().push(1);

        let deferred_log = task_log.clone();
        handle.defer(move || deferred_log.borrow_mut().push(3));

        task_log.borrow_mut().push(2);
        Ok(())
    });

    runtime.run().expect("run");

    assert_eq!(*log.borrow(), vec![1, 2, 3]);
}

#[test]
fn deferred_callbacks_keep_registration_order() {
    let runtime = Runtime::new();
    let log = Rc::new(RefCell::new(Vec::new()));

    for value in 0..5 {
        let log = log.clone();
        runtime.defer(move || log.borrow_mut().push(value));
    }

    runtime.run().expect("run");

    assert_eq!(*log.borrow(), vec![0, 1, 2, 3, 4]);
}

#[test]
fn callbacks_deferred_during_a_drain_wait_for_the_next_one() {
    let runtime = Runtime::new();
    let handle = runtime.handle();
    let log = Rc::new(RefCell::new(Vec::new()));

    let outer_log = log.clone();
    runtime.defer(move || {
        outer_log.borrow_mut().push("outer");

        let inner_log = outer_log.clone();
        handle.defer(move || inner_log.borrow_mut().push("inner"));
    });

    let sibling_log = log.clone();
    runtime.defer(move || sibling_log.borrow_mut().push("sibling"));

    runtime.run().expect("run");

    assert_eq!(*log.borrow(), vec!["outer", "sibling", "inner"]);
}

#[test]
fn failing_task_does_not_stop_its_siblings() {
    let runtime = Runtime::new();
    let failures = Rc::new(RefCell::new(Vec::new()));

    let reported = failures.clone();
    runtime
        .scheduler()
        .on_failure(move |_, failure| reported.borrow_mut().push(failure.to_string()));

    runtime.spawn(async { Err(Error::Task("boom".to_string())) });
    runtime.spawn(async {
        if true {
            panic!("kaboom");
        }
        Ok(())
    });

    let finished = Rc::new(Cell::new(false));
    let done = finished.clone();
    runtime.spawn(async move {
        done.set(true);
        Ok(())
    });

    runtime.run().expect("run");

    assert!(finished.get());
    assert_eq!(runtime.scheduler().live_tasks(), 0);

    let failures = failures.borrow();
    assert_eq!(failures.len(), 2);
    assert!(failures[0].contains("boom"));
    assert!(failures[1].contains("kaboom"));
}

#[test]
fn task_failing_after_a_suspension_is_isolated() {
    let runtime = Runtime::new();
    let handle = runtime.handle();
    let failed = Rc::new(Cell::new(0));

    let count = failed.clone();
    runtime.scheduler().on_failure(move |_, _| count.set(count.get() + 1));

    let failing = handle.clone();
    runtime.spawn(async move {
        failing.yield_now().await;
        Err(Error::ConnectionClosed)
    });

    let steps = Rc::new(Cell::new(0));
    let counter = steps.clone();
    let worker = handle.clone();
    runtime.spawn(async move {
        for _ in 0..3 {
            counter.set(counter.get() + 1);
            worker.yield_now().await;
        }
        Ok(())
    });

    runtime.run().expect("run");

    assert_eq!(failed.get(), 1);
    assert_eq!(steps.get(), 3);
}

#[test]
fn scheduling_a_finished_task_is_a_no_op() {
    let runtime = Runtime::new();
    let id = runtime.spawn(async { Ok(()) });

    assert_eq!(runtime.scheduler().state(id), TaskState::NotStarted);

    runtime.run().expect("run");

    assert_eq!(runtime.scheduler().state(id), TaskState::Terminated);
    assert!(!runtime.handle().schedule(id));
    runtime.run().expect("second run");
}

#[test]
fn tasks_spawned_from_tasks_run_in_the_same_loop() {
    let runtime = Runtime::new();
    let handle = runtime.handle();
    let order = Rc::new(RefCell::new(Vec::new()));

    let parent_order = order.clone();
    runtime.spawn(async move {
        parent_order.borrow_mut().push("parent");

        let child_order = parent_order.clone();
        handle.spawn(async move {
            child_order.borrow_mut().push("child");
            Ok(())
        });

        Ok(())
    });

    runtime.run().expect("run");

    assert_eq!(*order.borrow(), vec!["parent", "child"]);
}
