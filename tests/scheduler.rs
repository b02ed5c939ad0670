use mycoroutine::{Registry, SchedulerConfig, SchedulerError, SchedulerState, TaskId};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

type Trace = Rc<RefCell<Vec<(usize, u32)>>>;

fn counting(registry: &Registry, (label, trace, rounds): (usize, Trace, u32)) {
    for i in 0..rounds {
        trace.borrow_mut().push((label, i));
        registry.yield_now();
    }
}

#[test]
fn two_tasks_interleave_in_registration_order() {
    let registry = Registry::new();
    let trace: Trace = Rc::default();

    let t1 = registry.create_task(counting, (1, trace.clone(), 10));
    let t2 = registry.create_task(counting, (2, trace.clone(), 10));
    registry.register(t1).unwrap();
    registry.register(t2).unwrap();

    let stats = registry.start().unwrap();

    let expected: Vec<_> = (0..10).flat_map(|i| [(1, i), (2, i)]).collect();
    assert_eq!(*trace.borrow(), expected);
    assert_eq!(trace.borrow().len(), 20);
    // Ten resumptions after yields plus the first entry, per task.
    assert_eq!(stats.resumptions, 22);
    assert_eq!(stats.completed, 2);
    assert_eq!(registry.state(), SchedulerState::Finished);
}

#[test]
fn resumptions_add_up_to_yields_plus_one_per_task() {
    let registry = Registry::new();
    let trace: Trace = Rc::default();
    let yields = [0u32, 1, 4, 7, 2];

    let ids: Vec<TaskId> = yields
        .iter()
        .enumerate()
        .map(|(label, &k)| {
            registry
                .register(registry.create_task(counting, (label, trace.clone(), k)))
                .unwrap()
        })
        .collect();

    let stats = registry.start().unwrap();

    let expected: u64 = yields.iter().map(|&k| u64::from(k) + 1).sum();
    assert_eq!(stats.resumptions, expected);
    for (id, &k) in ids.iter().zip(&yields) {
        assert_eq!(registry.resumptions(*id), Some(u64::from(k) + 1));
        assert_eq!(registry.is_finished(*id), Some(true));
    }

    // Every round visits each unfinished task exactly once, in ring order.
    let trace = trace.borrow();
    let mut position = 0;
    for round in 0..7 {
        let live: Vec<usize> = (0..yields.len()).filter(|&l| yields[l] > round).collect();
        let seen: Vec<usize> = trace[position..position + live.len()]
            .iter()
            .map(|&(label, i)| {
                assert_eq!(i, round);
                label
            })
            .collect();
        assert_eq!(seen, live);
        position += live.len();
    }
    assert_eq!(position, trace.len());
}

#[test]
fn single_task_runs_to_completion() {
    let registry = Registry::new();
    let trace: Trace = Rc::default();
    let id = registry
        .register(registry.create_task(counting, (0, trace.clone(), 5)))
        .unwrap();

    assert_eq!(registry.ring_order(), vec![id]);
    let stats = registry.start().unwrap();

    assert_eq!(trace.borrow().len(), 5);
    assert_eq!(stats.resumptions, 6);
    assert_eq!(registry.resumptions(id), Some(6));
    assert_eq!(registry.current_task(), Some(id));
}

#[test]
fn terminates_with_many_tasks() {
    let registry = Registry::with_config(SchedulerConfig::with_stack_size(16 * 1024)).unwrap();
    let done = Rc::new(Cell::new(0));

    for n in 0..64u32 {
        let done = done.clone();
        registry
            .spawn(move |registry| {
                for _ in 0..n % 5 {
                    registry.yield_now();
                }
                done.set(done.get() + 1);
            })
            .unwrap();
    }

    let stats = registry.start().unwrap();
    assert_eq!(done.get(), 64);
    assert_eq!(stats.completed, 64);
}

#[test]
fn task_that_never_yields_holds_the_thread() {
    let registry = Registry::new();
    let peer_hits = Rc::new(Cell::new(0u32));
    let frozen = Rc::new(Cell::new(true));

    let hits = peer_hits.clone();
    registry
        .spawn(move |registry| {
            for _ in 0..3 {
                hits.set(hits.get() + 1);
                registry.yield_now();
            }
        })
        .unwrap();

    let hits = peer_hits.clone();
    let still = frozen.clone();
    registry
        .spawn(move |_| {
            let before = hits.get();
            for _ in 0..100_000 {
                if hits.get() != before {
                    still.set(false);
                }
                std::hint::spin_loop();
            }
        })
        .unwrap();

    registry.start().unwrap();
    assert!(frozen.get());
    assert_eq!(peer_hits.get(), 3);
}

#[test]
fn ring_walk_returns_home_after_n_steps() {
    let registry = Registry::new();
    let ids: Vec<TaskId> = (0..5).map(|_| registry.spawn(|_| {}).unwrap()).collect();

    let order = registry.ring_order();
    assert_eq!(order, ids);
    assert_eq!(registry.len(), 5);
    assert_eq!(registry.current_task(), Some(ids[0]));
}

#[test]
fn parameter_reaches_the_body() {
    fn record(_: &Registry, (out, value): (Rc<Cell<u64>>, u64)) {
        out.set(value);
    }

    let registry = Registry::new();
    let out = Rc::new(Cell::new(0));
    registry
        .register(registry.create_task(record, (out.clone(), 0xC0FFEE)))
        .unwrap();
    registry.start().unwrap();
    assert_eq!(out.get(), 0xC0FFEE);
}

#[test]
fn deep_frames_survive_switches() {
    fn depth(registry: &Registry, n: u32) -> u32 {
        if n == 0 {
            registry.yield_now();
            return 0;
        }
        let buf = [n as u8; 64];
        depth(registry, n - 1) + u32::from(buf[63] == n as u8)
    }

    let registry = Registry::new();
    let result = Rc::new(Cell::new(0));
    for _ in 0..2 {
        let result = result.clone();
        registry
            .spawn(move |registry| {
                let levels = depth(registry, 50);
                result.set(result.get() + levels);
            })
            .unwrap();
    }
    registry.start().unwrap();
    assert_eq!(result.get(), 100);
}

#[test]
fn start_requires_tasks() {
    let registry = Registry::new();
    assert_eq!(registry.start(), Err(SchedulerError::NoTasks));
    assert!(registry.is_empty());
    assert_eq!(registry.state(), SchedulerState::Idle);
}

#[test]
fn registry_cannot_be_restarted_or_extended() {
    let registry = Registry::new();
    registry.spawn(|_| {}).unwrap();
    registry.start().unwrap();

    assert_eq!(registry.start(), Err(SchedulerError::AlreadyStarted));
    let late = registry.create_task_with(|_| {});
    assert_eq!(registry.register(late), Err(SchedulerError::AlreadyStarted));
}

#[test]
fn tasks_cannot_register_or_start_while_running() {
    let registry = Registry::new();
    let outcome = Rc::new(RefCell::new(Vec::new()));

    let seen = outcome.clone();
    registry
        .spawn(move |registry| {
            let extra = registry.create_task_with(|_| {});
            seen.borrow_mut().push(registry.register(extra).map(|_| ()));
            seen.borrow_mut().push(registry.start().map(|_| ()));
        })
        .unwrap();

    registry.start().unwrap();
    assert_eq!(
        *outcome.borrow(),
        vec![
            Err(SchedulerError::AlreadyStarted),
            Err(SchedulerError::AlreadyStarted)
        ]
    );
    assert_eq!(registry.len(), 1);
}

#[test]
fn independent_registries_coexist() {
    let trace: Trace = Rc::default();
    let outer = Registry::new();
    let inner = Registry::new();

    inner
        .register(inner.create_task(counting, (10, trace.clone(), 2)))
        .unwrap();
    outer
        .register(outer.create_task(counting, (1, trace.clone(), 2)))
        .unwrap();

    outer.start().unwrap();
    inner.start().unwrap();
    assert_eq!(*trace.borrow(), vec![(1, 0), (1, 1), (10, 0), (10, 1)]);
}

#[test]
#[should_panic(expected = "outside of a running task")]
fn yield_outside_a_task_panics() {
    let registry = Registry::new();
    registry.spawn(|_| {}).unwrap();
    registry.yield_now();
}

#[test]
fn rejects_undersized_stacks() {
    let err = Registry::with_config(SchedulerConfig::with_stack_size(1024)).unwrap_err();
    assert!(matches!(err, SchedulerError::InvalidStackSize { requested: 1024, .. }));
}

#[test]
fn rejects_oversized_stacks() {
    let err = Registry::with_config(SchedulerConfig::with_stack_size(usize::MAX)).unwrap_err();
    assert!(matches!(
        err,
        SchedulerError::InvalidStackSize { requested: usize::MAX, .. }
    ));
}

#[test]
fn unstarted_tasks_are_dropped_with_the_registry() {
    let token = Rc::new(());
    {
        let registry = Registry::new();
        let held = token.clone();
        registry.spawn(move |_| drop(held)).unwrap();
        assert_eq!(Rc::strong_count(&token), 2);
    }
    assert_eq!(Rc::strong_count(&token), 1);
}
