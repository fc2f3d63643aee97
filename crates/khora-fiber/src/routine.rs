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

//! Resumable computations and the context they are stepped with.

use crate::error::SchedulerError;
use crate::handle::FiberHandle;
use crate::scheduler::{RunState, Scheduler};
use crate::wait::{Step, Wait};
use std::collections::VecDeque;
use std::ops::{Deref, DerefMut};

/// A suspend/resume state machine driven by a fiber.
///
/// Each call to [`Routine::resume`] advances the computation to its next
/// suspension point. Returning an error stops the fiber (or escapes from the
/// tick when fault-forwarding is disabled).
pub trait Routine: 'static {
    /// Advances the routine by one step.
    fn resume(&mut self, cx: &mut FiberContext<'_>) -> anyhow::Result<Step>;

    /// Called when the owning fiber unwinds this routine, either because it
    /// finished or because the fiber is being disposed. Routines that own
    /// other fibers stop them here.
    fn release(&mut self, _scheduler: &mut Scheduler) {}
}

impl Routine for Box<dyn Routine> {
    fn resume(&mut self, cx: &mut FiberContext<'_>) -> anyhow::Result<Step> {
        (**self).resume(cx)
    }

    fn release(&mut self, scheduler: &mut Scheduler) {
        (**self).release(scheduler)
    }
}

/// Access to the scheduler from inside a step.
///
/// Derefs to the [`Scheduler`], so a routine can submit, stop or query other
/// fibers, or tick the manual phase, while it runs.
pub struct FiberContext<'a> {
    scheduler: &'a mut Scheduler,
    handle: FiberHandle,
    delta_time: f64,
}

impl<'a> FiberContext<'a> {
    pub(crate) fn new(scheduler: &'a mut Scheduler, handle: FiberHandle, delta_time: f64) -> Self {
        Self {
            scheduler,
            handle,
            delta_time,
        }
    }

    /// The fiber being stepped.
    pub fn handle(&self) -> FiberHandle {
        self.handle
    }

    /// This step's delta time, after every time-scale multiplier was applied.
    pub fn delta_time(&self) -> f64 {
        self.delta_time
    }

    /// Drives `child` once with `delta_time` standing in for this fiber's own
    /// resolved delta. The previous delta is restored before returning.
    pub fn drive_with_delta(
        &mut self,
        child: FiberHandle,
        delta_time: f64,
    ) -> Result<RunState, SchedulerError> {
        self.scheduler.drive_with_ambient(child, delta_time)
    }
}

impl Deref for FiberContext<'_> {
    type Target = Scheduler;

    fn deref(&self) -> &Scheduler {
        self.scheduler
    }
}

impl DerefMut for FiberContext<'_> {
    fn deref_mut(&mut self) -> &mut Scheduler {
        self.scheduler
    }
}

/// A routine backed by a closure.
pub struct FromFn<F> {
    f: F,
}

impl<F> Routine for FromFn<F>
where
    F: FnMut(&mut FiberContext<'_>) -> anyhow::Result<Step> + 'static,
{
    fn resume(&mut self, cx: &mut FiberContext<'_>) -> anyhow::Result<Step> {
        (self.f)(cx)
    }
}

/// Builds a routine from a closure called once per step.
pub fn from_fn<F>(f: F) -> FromFn<F>
where
    F: FnMut(&mut FiberContext<'_>) -> anyhow::Result<Step> + 'static,
{
    FromFn { f }
}

/// A routine that waits `seconds` and finishes.
pub fn wait_seconds(seconds: f64) -> impl Routine {
    let mut waited = false;
    from_fn(move |_| {
        if waited {
            return Ok(Step::Done);
        }
        waited = true;
        Ok(Step::wait(seconds))
    })
}

/// A routine that finishes on the first step where `condition` holds.
pub fn wait_until<F>(mut condition: F) -> impl Routine
where
    F: FnMut(&mut FiberContext<'_>) -> bool + 'static,
{
    from_fn(move |cx| {
        Ok(if condition(cx) {
            Step::Done
        } else {
            Step::next_tick()
        })
    })
}

/// A routine that finishes on the first step where `condition` no longer holds.
pub fn wait_while<F>(mut condition: F) -> impl Routine
where
    F: FnMut(&mut FiberContext<'_>) -> bool + 'static,
{
    wait_until(move |cx| !condition(cx))
}

/// Runs routines one after another, as nested sub-routines of one fiber.
pub struct Sequence {
    queue: VecDeque<Box<dyn Routine>>,
}

impl Sequence {
    /// Creates a sequence from boxed routines.
    pub fn new(routines: impl IntoIterator<Item = Box<dyn Routine>>) -> Self {
        Self {
            queue: routines.into_iter().collect(),
        }
    }

    /// Appends a routine.
    pub fn then(mut self, routine: impl Routine) -> Self {
        self.queue.push_back(Box::new(routine));
        self
    }
}

impl Routine for Sequence {
    fn resume(&mut self, _cx: &mut FiberContext<'_>) -> anyhow::Result<Step> {
        Ok(match self.queue.pop_front() {
            Some(next) => Step::Yield(Wait::Nested(next)),
            None => Step::Done,
        })
    }
}

/// Pushed by the driver when a routine yields [`Wait::Fiber`].
pub(crate) struct AwaitFiber {
    target: FiberHandle,
    warned: bool,
}

impl AwaitFiber {
    pub(crate) fn new(target: FiberHandle) -> Self {
        Self {
            target,
            warned: false,
        }
    }
}

impl Routine for AwaitFiber {
    fn resume(&mut self, cx: &mut FiberContext<'_>) -> anyhow::Result<Step> {
        if self.target == cx.handle() && !std::mem::replace(&mut self.warned, true) {
            log::warn!("{} is waiting on itself and will never resume", self.target);
        }
        Ok(if cx.is_running(self.target) {
            Step::next_tick()
        } else {
            Step::Done
        })
    }
}
