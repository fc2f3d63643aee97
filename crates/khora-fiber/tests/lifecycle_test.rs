// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Integration tests for fiber lifetimes, terminal callbacks and faults.

use khora_fiber::{
    routine, Anchor, Command, FiberHandle, FiberOptions, HostAnchor, Phase, RunState, Scheduler,
    SchedulerConfig, SchedulerError, Step, Wait,
};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

/// Counts how often each terminal callback fired for a fiber.
#[derive(Default)]
struct Terminal {
    completed: Cell<u32>,
    stopped: Cell<u32>,
}

fn watch(scheduler: &mut Scheduler, fiber: FiberHandle) -> Rc<Terminal> {
    let terminal = Rc::new(Terminal::default());
    let on_complete = terminal.clone();
    let on_stop = terminal.clone();
    assert!(scheduler.on_complete(fiber, move |_, _| {
        on_complete.completed.set(on_complete.completed.get() + 1)
    }));
    assert!(scheduler.on_stop(fiber, move |_, _| {
        on_stop.stopped.set(on_stop.stopped.get() + 1)
    }));
    terminal
}

fn forever() -> impl khora_fiber::Routine {
    routine::from_fn(|_| Ok(Step::next_tick()))
}

#[test]
fn test_completion_fires_only_on_complete() {
    let mut scheduler = Scheduler::default();
    let fiber = scheduler.submit(Anchor::Scheduler, routine::from_fn(|_| Ok(Step::Done)));
    let terminal = watch(&mut scheduler, fiber);

    scheduler.tick(Phase::Update, 0.016).unwrap();
    scheduler.tick(Phase::Update, 0.016).unwrap();

    assert_eq!(terminal.completed.get(), 1);
    assert_eq!(terminal.stopped.get(), 0);
    assert_eq!(scheduler.fiber_count(), 0);
}

#[test]
fn test_stop_fires_only_on_stop() {
    let mut scheduler = Scheduler::default();
    let fiber = scheduler.submit(Anchor::Scheduler, forever());
    let terminal = watch(&mut scheduler, fiber);

    scheduler.tick(Phase::Update, 0.016).unwrap();
    assert!(scheduler.stop(fiber));
    assert!(!scheduler.stop(fiber), "second stop is a stale no-op");

    assert_eq!(terminal.completed.get(), 0);
    assert_eq!(terminal.stopped.get(), 1);
}

#[test]
fn test_slot_is_reused_with_a_new_generation() {
    let mut scheduler = Scheduler::default();
    let first = scheduler.submit(Anchor::Scheduler, routine::from_fn(|_| Ok(Step::Done)));
    scheduler.tick(Phase::Update, 0.016).unwrap();
    assert!(!scheduler.is_running(first));

    let second = scheduler.submit(Anchor::Scheduler, forever());

    assert_eq!(second.index, first.index);
    assert_ne!(second, first);
    assert!(scheduler.is_running(second));
    assert!(!scheduler.is_running(first));
    // Operations through the stale handle never reach the new occupant.
    assert!(!scheduler.stop(first));
    assert!(!scheduler.pause(first));
    assert!(!scheduler.set_priority(first, 4));
    assert!(!scheduler.on_complete(first, |_, _| {}));
    assert!(scheduler.is_running(second));
}

#[test]
fn test_arena_grows_past_initial_capacity() {
    let mut scheduler = Scheduler::new(SchedulerConfig::default().with_initial_capacity(2));
    let handles: Vec<_> = (0..5)
        .map(|_| scheduler.submit(Anchor::Scheduler, forever()))
        .collect();

    assert_eq!(scheduler.fiber_count(), 5);
    assert!(scheduler.capacity() >= 5);
    assert!(handles.iter().all(|&handle| scheduler.is_running(handle)));
}

#[test]
fn test_capacity_ceiling_is_reported() {
    let mut scheduler = Scheduler::new(
        SchedulerConfig::default()
            .with_initial_capacity(1)
            .with_max_capacity(2),
    );
    scheduler.submit(Anchor::Scheduler, forever());
    scheduler.submit(Anchor::Scheduler, forever());

    let result = scheduler.try_submit_with(Anchor::Scheduler, forever(), FiberOptions::default());

    assert!(matches!(
        result,
        Err(SchedulerError::CapacityExceeded { max: 2, .. })
    ));
}

#[test]
fn test_self_stop_is_deferred_until_step_returns() {
    let mut scheduler = Scheduler::default();
    let still_running = Rc::new(Cell::new(false));
    let observed = still_running.clone();
    let fiber = scheduler.submit(
        Anchor::Scheduler,
        routine::from_fn(move |cx| {
            let me = cx.handle();
            assert!(cx.stop(me));
            observed.set(cx.is_running(me));
            Ok(Step::next_tick())
        }),
    );
    let terminal = watch(&mut scheduler, fiber);

    scheduler.tick(Phase::Update, 0.016).unwrap();

    assert!(still_running.get(), "the slot survives until the step returns");
    assert!(!scheduler.is_running(fiber));
    assert_eq!(terminal.stopped.get(), 1);
    assert_eq!(terminal.completed.get(), 0);
}

#[test]
fn test_stop_command_stops_the_fiber() {
    let mut scheduler = Scheduler::default();
    let fiber = scheduler.submit(
        Anchor::Scheduler,
        routine::from_fn(|_| Ok(Step::Yield(Wait::Command(Command::Stop)))),
    );
    let terminal = watch(&mut scheduler, fiber);

    scheduler.tick(Phase::Update, 0.016).unwrap();

    assert_eq!(terminal.stopped.get(), 1);
    assert_eq!(terminal.completed.get(), 0);
}

#[test]
fn test_pause_command_waits_for_resume() {
    let mut scheduler = Scheduler::default();
    let steps = Rc::new(Cell::new(0));
    let counter = steps.clone();
    let fiber = scheduler.submit(
        Anchor::Scheduler,
        routine::from_fn(move |_| {
            counter.set(counter.get() + 1);
            Ok(Step::Yield(Command::Pause.into()))
        }),
    );

    scheduler.tick(Phase::Update, 0.016).unwrap();
    scheduler.tick(Phase::Update, 0.016).unwrap();
    assert_eq!(steps.get(), 1);
    assert!(scheduler.is_fiber_paused(fiber));

    assert!(scheduler.resume(fiber));
    scheduler.tick(Phase::Update, 0.016).unwrap();
    assert_eq!(steps.get(), 2);
}

#[test]
fn test_fiber_stopped_during_traversal_is_skipped() {
    let mut scheduler = Scheduler::default();
    let log = Rc::new(RefCell::new(Vec::new()));
    let victim = Rc::new(Cell::new(FiberHandle::NULL));

    let (record, target) = (log.clone(), victim.clone());
    scheduler.submit_with(
        Anchor::Scheduler,
        routine::from_fn(move |cx| {
            record.borrow_mut().push("A");
            cx.stop(target.get());
            Ok(Step::next_tick())
        }),
        FiberOptions::default().with_priority(2),
    );
    let record = log.clone();
    let b = scheduler.submit_with(
        Anchor::Scheduler,
        routine::from_fn(move |_| {
            record.borrow_mut().push("B");
            Ok(Step::next_tick())
        }),
        FiberOptions::default().with_priority(1),
    );
    victim.set(b);
    let record = log.clone();
    scheduler.submit(
        Anchor::Scheduler,
        routine::from_fn(move |_| {
            record.borrow_mut().push("C");
            Ok(Step::next_tick())
        }),
    );
    let terminal = watch(&mut scheduler, b);

    scheduler.tick(Phase::Update, 0.016).unwrap();

    assert_eq!(*log.borrow(), vec!["A", "C"]);
    assert_eq!(terminal.stopped.get(), 1);
}

#[test]
fn test_fiber_submitted_during_tick_waits_for_next_tick() {
    let mut scheduler = Scheduler::default();
    let log = Rc::new(RefCell::new(Vec::new()));
    let record = log.clone();
    scheduler.submit(
        Anchor::Scheduler,
        routine::from_fn(move |cx| {
            let child_log = record.clone();
            cx.submit(
                Anchor::Scheduler,
                routine::from_fn(move |_| {
                    child_log.borrow_mut().push("spawned");
                    Ok(Step::Done)
                }),
            );
            Ok(Step::Done)
        }),
    );

    scheduler.tick(Phase::Update, 0.016).unwrap();
    assert!(log.borrow().is_empty());

    scheduler.tick(Phase::Update, 0.016).unwrap();
    assert_eq!(*log.borrow(), vec!["spawned"]);
}

#[test]
fn test_reentrant_drive_is_rejected() {
    let mut scheduler = Scheduler::default();
    let outcome = Rc::new(Cell::new(None));
    let steps = Rc::new(Cell::new(0));
    let (record, counter) = (outcome.clone(), steps.clone());
    let fiber = scheduler.submit(
        Anchor::Scheduler,
        routine::from_fn(move |cx| {
            counter.set(counter.get() + 1);
            let me = cx.handle();
            record.set(Some(cx.drive(me).map_err(|err| err.to_string())));
            Ok(Step::next_tick())
        }),
    );

    assert_eq!(scheduler.drive(fiber).ok(), Some(RunState::Running));

    assert_eq!(steps.get(), 1);
    assert_eq!(outcome.take(), Some(Ok(RunState::Running)));
}

#[test]
fn test_drive_of_stale_handle_reports_finished() {
    let mut scheduler = Scheduler::default();
    let fiber = scheduler.submit(Anchor::Scheduler, routine::from_fn(|_| Ok(Step::Done)));

    assert_eq!(scheduler.drive(fiber).ok(), Some(RunState::Finished));
    assert_eq!(scheduler.drive(fiber).ok(), Some(RunState::Finished));
    assert_eq!(scheduler.drive(FiberHandle::NULL).ok(), Some(RunState::Finished));
}

#[test]
fn test_forwarded_fault_disposes_and_notifies() {
    let mut scheduler = Scheduler::default();
    let handled = Rc::new(RefCell::new(Vec::new()));
    let record = handled.clone();
    scheduler.set_error_handler(move |handle, error| {
        record.borrow_mut().push((handle, error.to_string()));
    });
    let fiber = scheduler.submit_with(
        Anchor::Scheduler,
        routine::from_fn(|_| Err(anyhow::anyhow!("boom"))),
        FiberOptions::named("exploder"),
    );
    let exception = Rc::new(Cell::new(false));
    let seen = exception.clone();
    scheduler.on_exception(fiber, move |_, _, error| seen.set(error.to_string() == "boom"));
    let terminal = watch(&mut scheduler, fiber);

    scheduler
        .tick(Phase::Update, 0.016)
        .expect("forwarded faults do not escape the tick");

    assert!(exception.get());
    assert_eq!(*handled.borrow(), vec![(fiber, "boom".to_string())]);
    assert!(!scheduler.is_running(fiber));
    assert_eq!(terminal.stopped.get(), 1);
    assert_eq!(terminal.completed.get(), 0);
}

#[test]
fn test_exception_callback_cannot_step_the_faulted_fiber() {
    let mut scheduler = Scheduler::default();
    let steps = Rc::new(Cell::new(0));
    let counter = steps.clone();
    let fiber = scheduler.submit(
        Anchor::Scheduler,
        routine::from_fn(move |_| {
            counter.set(counter.get() + 1);
            Err(anyhow::anyhow!("boom"))
        }),
    );
    let redrive = Rc::new(Cell::new(None));
    let record = redrive.clone();
    scheduler.on_exception(fiber, move |scheduler, me, _| record.set(scheduler.drive(me).ok()));
    let terminal = watch(&mut scheduler, fiber);

    scheduler
        .tick(Phase::Update, 0.016)
        .expect("forwarded faults do not escape the tick");

    assert_eq!(steps.get(), 1);
    assert_eq!(redrive.get(), Some(RunState::Finished));
    assert!(!scheduler.is_running(fiber));
    assert_eq!(terminal.stopped.get(), 1);
    assert_eq!(terminal.completed.get(), 0);
}

#[test]
fn test_unforwarded_fault_escapes_the_tick() {
    let mut scheduler = Scheduler::new(SchedulerConfig::default().with_forward_errors(false));
    let fiber = scheduler.submit_with(
        Anchor::Scheduler,
        routine::from_fn(|_| Err(anyhow::anyhow!("boom"))),
        FiberOptions::named("exploder"),
    );

    match scheduler.tick(Phase::Update, 0.016) {
        Err(SchedulerError::Fault(fault)) => {
            assert_eq!(fault.handle, fiber);
            assert_eq!(fault.name.as_deref(), Some("exploder"));
            assert_eq!(fault.error.to_string(), "boom");
        }
        other => panic!("expected a fault, got {other:?}"),
    }
    assert!(!scheduler.is_running(fiber));
}

#[test]
fn test_per_fiber_forwarding_overrides_config() {
    let mut scheduler = Scheduler::new(SchedulerConfig::default().with_forward_errors(false));
    let fiber = scheduler.submit_with(
        Anchor::Scheduler,
        routine::from_fn(|_| Err(anyhow::anyhow!("boom"))),
        FiberOptions::default().with_forward_errors(true),
    );

    assert!(scheduler.tick(Phase::Update, 0.016).is_ok());
    assert!(!scheduler.is_running(fiber));
}

#[test]
fn test_destroyed_anchor_disposes_without_stepping() {
    let mut scheduler = Scheduler::default();
    let anchor = HostAnchor::new();
    let steps = Rc::new(Cell::new(0));
    let counter = steps.clone();
    let fiber = scheduler.submit(
        &anchor,
        routine::from_fn(move |_| {
            counter.set(counter.get() + 1);
            Ok(Step::next_tick())
        }),
    );
    let terminal = watch(&mut scheduler, fiber);

    scheduler.tick(Phase::Update, 0.016).unwrap();
    anchor.destroy();
    scheduler.tick(Phase::Update, 0.016).unwrap();

    assert_eq!(steps.get(), 1);
    assert!(!scheduler.is_running(fiber));
    assert_eq!(terminal.stopped.get(), 1);
}

#[test]
fn test_terminal_callback_can_submit_follow_up() {
    let mut scheduler = Scheduler::default();
    let fiber = scheduler.submit(Anchor::Scheduler, routine::from_fn(|_| Ok(Step::Done)));
    let follow_up = Rc::new(Cell::new(FiberHandle::NULL));
    let slot = follow_up.clone();
    scheduler.on_complete(fiber, move |scheduler, _| {
        slot.set(scheduler.submit(Anchor::Scheduler, forever()));
    });

    scheduler.tick(Phase::Update, 0.016).unwrap();

    assert!(scheduler.is_running(follow_up.get()));
    assert_eq!(scheduler.fiber_count(), 1);
}

#[test]
fn test_await_fiber_resumes_after_target_ends() {
    let mut scheduler = Scheduler::default();
    let mut target_steps = 0;
    let target = scheduler.submit(
        Anchor::Scheduler,
        routine::from_fn(move |_| {
            target_steps += 1;
            Ok(if target_steps < 2 {
                Step::next_tick()
            } else {
                Step::Done
            })
        }),
    );
    let resumed = Rc::new(Cell::new(false));
    let flag = resumed.clone();
    let mut awaited = false;
    scheduler.submit_with(
        Anchor::Scheduler,
        routine::from_fn(move |_| {
            if std::mem::take(&mut awaited) {
                flag.set(true);
                return Ok(Step::Done);
            }
            awaited = true;
            Ok(Step::Yield(target.into()))
        }),
        FiberOptions::default().with_priority(1),
    );

    scheduler.tick(Phase::Update, 0.016).unwrap();
    scheduler.tick(Phase::Update, 0.016).unwrap();
    assert!(!scheduler.is_running(target));
    assert!(!resumed.get());

    scheduler.tick(Phase::Update, 0.016).unwrap();
    assert!(resumed.get());
}

#[test]
fn test_nested_routines_unwind_in_order() {
    let mut scheduler = Scheduler::default();
    let log = Rc::new(RefCell::new(Vec::new()));
    let record = log.clone();
    let sequence = routine::Sequence::new(Vec::new())
        .then(routine::wait_seconds(0.5))
        .then(routine::from_fn(move |_| {
            record.borrow_mut().push("after wait");
            Ok(Step::Done)
        }));
    let fiber = scheduler.submit(Anchor::Scheduler, sequence);

    scheduler.tick(Phase::Update, 0.25).unwrap();
    assert_eq!(scheduler.stats(fiber).map(|stats| stats.stack_depth), Some(2));
    scheduler.tick(Phase::Update, 0.25).unwrap();
    assert!(log.borrow().is_empty());
    scheduler.tick(Phase::Update, 0.25).unwrap();

    assert_eq!(*log.borrow(), vec!["after wait"]);
    assert!(!scheduler.is_running(fiber));
}
