use readyq::{Error, EventQueue, EventQueueBuilder, LabMultiplexer, Mask, SchedulerHost};

use std::cell::{Cell, RefCell};
use std::os::fd::RawFd;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

type Queue = EventQueue<LabMultiplexer>;

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::TRACE)
        .with_test_writer()
        .try_init();
}

/// Host that stops after a fixed number of pumps, or when asked to.
struct CountingHost {
    pumps: usize,
    limit: usize,
    stop: Rc<Cell<bool>>,
}

impl CountingHost {
    fn new(limit: usize) -> Self {
        Self {
            pumps: 0,
            limit,
            stop: Rc::new(Cell::new(false)),
        }
    }
}

impl SchedulerHost<LabMultiplexer> for CountingHost {
    fn should_shut_down(&mut self) -> bool {
        self.stop.get() || self.pumps >= self.limit
    }

    fn pump(&mut self, _queue: &mut Queue) {
        self.pumps += 1;
    }
}

fn setup() -> (Queue, LabMultiplexer) {
    init_logging();

    let lab = LabMultiplexer::new();
    let queue = EventQueueBuilder::new().build_with(lab.clone());

    (queue, lab)
}

#[test]
fn run_dispatches_then_pumps_each_iteration() {
    let (mut queue, lab) = setup();
    let log = Rc::new(RefCell::new(Vec::<(RawFd, Mask)>::new()));

    let inner = log.clone();
    queue
        .watch(5, Mask::READABLE, move |_: &mut Queue, mask: Mask| {
            inner.borrow_mut().push((5, mask));
        })
        .unwrap();

    lab.ready(&[(5, Mask::READABLE)]);
    lab.ready(&[(5, Mask::READABLE)]);

    let mut host = CountingHost::new(2);
    queue.run(&mut host).unwrap();

    assert_eq!(host.pumps, 2);
    assert_eq!(lab.waits(), 2);
    assert_eq!(log.borrow().len(), 2);
}

#[test]
fn interrupted_wait_is_invisible() {
    let (mut queue, lab) = setup();
    let calls = Rc::new(Cell::new(0));

    let inner = calls.clone();
    queue
        .watch(5, Mask::READABLE, move |_: &mut Queue, _: Mask| {
            inner.set(inner.get() + 1);
        })
        .unwrap();

    lab.interrupted();
    assert_eq!(queue.turn().unwrap(), 0);
    assert_eq!(calls.get(), 0);

    lab.interrupted();
    lab.ready(&[(5, Mask::READABLE)]);

    let mut host = CountingHost::new(2);
    queue.run(&mut host).unwrap();

    assert_eq!(host.pumps, 2);
    assert_eq!(calls.get(), 1);
}

#[test]
fn shutdown_is_checked_before_waiting() {
    let (mut queue, lab) = setup();

    let mut host = CountingHost::new(0);
    queue.run(&mut host).unwrap();

    assert_eq!(host.pumps, 0);
    assert_eq!(lab.waits(), 0);
}

#[test]
fn shutdown_requested_mid_batch_finishes_the_iteration() {
    let (mut queue, lab) = setup();
    let mut host = CountingHost::new(usize::MAX);
    let log = Rc::new(RefCell::new(Vec::<RawFd>::new()));

    let stop = host.stop.clone();
    let inner = log.clone();
    queue
        .watch(5, Mask::READABLE, move |_: &mut Queue, _: Mask| {
            inner.borrow_mut().push(5);
            stop.set(true);
        })
        .unwrap();

    let inner = log.clone();
    queue
        .watch(7, Mask::READABLE, move |_: &mut Queue, _: Mask| {
            inner.borrow_mut().push(7);
        })
        .unwrap();

    lab.ready(&[(5, Mask::READABLE), (7, Mask::READABLE)]);
    lab.ready(&[(7, Mask::READABLE)]);

    queue.run(&mut host).unwrap();

    assert_eq!(*log.borrow(), vec![5, 7]);
    assert_eq!(host.pumps, 1);
    assert_eq!(lab.waits(), 1);
}

#[test]
fn failed_wait_stops_the_loop() {
    let (mut queue, lab) = setup();
    let calls = Rc::new(Cell::new(0));

    let inner = calls.clone();
    queue
        .watch(5, Mask::READABLE, move |_: &mut Queue, _: Mask| {
            inner.set(inner.get() + 1);
        })
        .unwrap();

    lab.fail(libc::EBADF);
    lab.ready(&[(5, Mask::READABLE)]);

    let mut host = CountingHost::new(usize::MAX);
    let error = queue.run(&mut host).unwrap_err();

    match error {
        Error::Wait(source) => assert_eq!(source.raw_os_error(), Some(libc::EBADF)),
        other => panic!("unexpected error: {other:?}"),
    }

    assert_eq!(host.pumps, 0);
    assert_eq!(calls.get(), 0);
}

#[test]
fn pump_can_register_new_resources() {
    struct WatchingHost {
        pumps: usize,
        seen: Rc<Cell<usize>>,
    }

    impl SchedulerHost<LabMultiplexer> for WatchingHost {
        fn should_shut_down(&mut self) -> bool {
            self.pumps == 2
        }

        fn pump(&mut self, queue: &mut Queue) {
            if self.pumps == 0 {
                let seen = self.seen.clone();
                queue
                    .watch(8, Mask::WRITABLE, move |_: &mut Queue, _: Mask| {
                        seen.set(seen.get() + 1);
                    })
                    .unwrap();
            }
            self.pumps += 1;
        }
    }

    let (mut queue, lab) = setup();
    queue
        .watch(5, Mask::READABLE, |_: &mut Queue, _: Mask| {})
        .unwrap();

    lab.ready(&[(5, Mask::READABLE)]);
    lab.ready(&[(8, Mask::WRITABLE)]);

    let seen = Rc::new(Cell::new(0));
    let mut host = WatchingHost {
        pumps: 0,
        seen: seen.clone(),
    };
    queue.run(&mut host).unwrap();

    assert_eq!(seen.get(), 1);
}

#[test]
#[should_panic(expected = "turn called while dispatching a batch")]
fn turn_from_a_callback_panics() {
    let (mut queue, lab) = setup();

    queue
        .watch(5, Mask::READABLE, |queue: &mut Queue, _: Mask| {
            let _ = queue.turn();
        })
        .unwrap();

    lab.ready(&[(5, Mask::READABLE)]);
    let _ = queue.turn();
}

#[test]
fn panicking_callback_leaves_the_queue_usable() {
    let (mut queue, lab) = setup();
    let calls = Rc::new(Cell::new(0));
    let other = Rc::new(Cell::new(0));

    let inner = calls.clone();
    let token = queue
        .watch(5, Mask::READABLE, move |_: &mut Queue, _: Mask| {
            inner.set(inner.get() + 1);
            if inner.get() == 1 {
                panic!("callback failed");
            }
        })
        .unwrap();

    let inner = other.clone();
    queue
        .watch(7, Mask::READABLE, move |_: &mut Queue, _: Mask| {
            inner.set(inner.get() + 1);
        })
        .unwrap();

    lab.ready(&[(5, Mask::READABLE), (7, Mask::READABLE)]);

    let result = panic::catch_unwind(AssertUnwindSafe(|| queue.turn()));
    assert!(result.is_err());

    // The rest of the abandoned batch is not delivered.
    assert_eq!(other.get(), 0);
    assert!(queue.is_watched(token));

    lab.ready(&[(5, Mask::READABLE), (7, Mask::READABLE)]);

    assert_eq!(queue.turn().unwrap(), 2);
    assert_eq!(calls.get(), 2);
    assert_eq!(other.get(), 1);
}
