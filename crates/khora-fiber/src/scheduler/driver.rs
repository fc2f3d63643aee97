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

//! Stepping, waiting and disposal of individual fibers.

use super::{RunState, Scheduler};
use crate::error::{FiberFault, SchedulerError};
use crate::fiber::StepSource;
use crate::handle::FiberHandle;
use crate::phase::{Lane, Phase};
use crate::routine::{AwaitFiber, FiberContext, Routine};
use crate::table::ListId;
use crate::wait::{Command, Step, Wait};

/// Who asked for a fiber to be stepped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RunToken {
    /// The phase's tick list.
    Tick(Phase),
    /// The phase's wait list.
    Resume(Phase),
    /// An explicit drive.
    Direct,
}

enum StepOutcome {
    /// The top routine yielded a wait.
    Suspended,
    /// The stack unwound completely.
    Finished,
    /// A routine yielded [`Command::Stop`].
    Stopped,
}

impl Scheduler {
    /// Steps every eligible slot of `list`.
    pub(super) fn run_list(
        &mut self,
        list: ListId,
        epoch: u64,
        token: RunToken,
    ) -> Result<(), SchedulerError> {
        if self.table.is_empty(list) {
            return Ok(());
        }
        let depth = self.table.begin_traversal(list, epoch);
        let mut result = Ok(());
        while let Some(index) = self.table.traversal_next(depth) {
            if let RunToken::Tick(phase) = token {
                if self.skips_tick(index, phase) {
                    continue;
                }
            }
            if let Err(err) = self.run_slot(index, token) {
                result = Err(err);
                break;
            }
        }
        self.table.end_traversal(depth);
        result
    }

    /// A fiber waiting for a phase is only resumed by that phase's wait list,
    /// and a fiber already stepped this frame by another pass sits out the
    /// rest of the frame's automatic tick lists.
    fn skips_tick(&self, index: u32, phase: Phase) -> bool {
        let fiber = self.table.fiber(index);
        if fiber.wait_phase.is_some() {
            return true;
        }
        match fiber.last_step {
            Some((frame, source)) => {
                phase.is_auto() && frame == self.clock.frame() && source != StepSource::Tick(phase)
            }
            None => false,
        }
    }

    /// Steps one slot.
    pub(super) fn run_slot(
        &mut self,
        index: u32,
        token: RunToken,
    ) -> Result<RunState, SchedulerError> {
        let fiber = self.table.fiber(index);
        if fiber.is_free() {
            return Ok(RunState::Finished);
        }
        let handle = fiber.handle;
        if fiber.executing || fiber.releasing {
            log::warn!("Rejected reentrant drive of {handle}.");
            return Ok(RunState::Running);
        }
        if fiber.disposing || !fiber.anchor.is_alive() {
            self.dispose_slot(index);
            return Ok(RunState::Finished);
        }
        if self.is_held(index) {
            return Ok(RunState::Running);
        }
        // A held fiber keeps its phase request for the next occurrence.
        if self.table.fiber(index).wait_phase.is_some() {
            self.table.leave_wait(index);
        }

        let delta = self.resolve_delta(index);
        let frame = self.clock.frame();
        let fiber = self.table.fiber_mut(index);
        fiber.external = None;
        match token {
            RunToken::Tick(phase) if phase.is_auto() => {
                fiber.last_step = Some((frame, StepSource::Tick(phase)));
            }
            RunToken::Resume(phase) => fiber.last_step = Some((frame, StepSource::Resume(phase))),
            _ => {}
        }

        let mut overshoot = 0.0;
        if fiber.wait_seconds > 0.0 {
            fiber.wait_seconds -= delta;
            if fiber.wait_seconds > 0.0 {
                return Ok(RunState::Running);
            }
            overshoot = -fiber.wait_seconds;
            fiber.wait_seconds = 0.0;
        }

        let mut stack = std::mem::take(&mut fiber.stack);
        fiber.detached_depth = stack.len();
        fiber.executing = true;
        let saved_ambient = self.ambient_delta.replace(delta);
        let outcome = self.step_stack(index, handle, &mut stack, delta, overshoot);
        self.ambient_delta = saved_ambient;

        let fiber = self.table.fiber_mut(index);
        fiber.executing = false;
        fiber.stack = stack;
        match outcome {
            Ok(StepOutcome::Suspended) if !fiber.disposing => Ok(RunState::Running),
            Ok(_) => {
                self.dispose_slot(index);
                Ok(RunState::Finished)
            }
            Err(error) => self.fault(index, error),
        }
    }

    /// Resumes the top of `stack` until it suspends or the stack unwinds.
    fn step_stack(
        &mut self,
        index: u32,
        handle: FiberHandle,
        stack: &mut Vec<Box<dyn Routine>>,
        delta: f64,
        overshoot: f64,
    ) -> anyhow::Result<StepOutcome> {
        loop {
            let Some(top) = stack.last_mut() else {
                return Ok(StepOutcome::Finished);
            };
            let wait = match top.resume(&mut FiberContext::new(self, handle, delta))? {
                Step::Yield(wait) => wait,
                Step::Done => {
                    if let Some(mut finished) = stack.pop() {
                        finished.release(self);
                    }
                    self.table.fiber_mut(index).detached_depth = stack.len();
                    continue;
                }
            };

            let chained = self.table.fiber(index).lane == Lane::Chained;
            match wait {
                Wait::Seconds(seconds) => {
                    // Overshoot of the wait that just elapsed only counts
                    // against a duration yielded in the same step.
                    self.table.fiber_mut(index).wait_seconds = if seconds > 0.0 {
                        seconds - overshoot
                    } else {
                        0.0
                    };
                    return Ok(StepOutcome::Suspended);
                }
                Wait::Fiber(target) => stack.push(Box::new(AwaitFiber::new(target))),
                Wait::Command(Command::Pause) => {
                    self.table.fiber_mut(index).paused = true;
                    return Ok(StepOutcome::Suspended);
                }
                Wait::Command(Command::Stop) => return Ok(StepOutcome::Stopped),
                Wait::Command(Command::Continue) => {}
                Wait::Phase(_) | Wait::SwitchPhase(_) if chained => {
                    log::warn!(
                        "{handle} is chained and cannot wait on a phase; resuming next drive."
                    );
                    return Ok(StepOutcome::Suspended);
                }
                Wait::Phase(phase) => {
                    self.table.enter_wait(index, phase);
                    return Ok(StepOutcome::Suspended);
                }
                Wait::SwitchPhase(phase) => {
                    self.switch_lane(index, phase);
                    return Ok(StepOutcome::Suspended);
                }
                Wait::Nested(routine) => stack.push(routine),
                Wait::External(wait) => {
                    self.table.fiber_mut(index).external = Some(wait);
                    return Ok(StepOutcome::Suspended);
                }
            }
            self.table.fiber_mut(index).detached_depth = stack.len();
        }
    }

    /// Moves a top-level fiber into another phase's tick list.
    pub(super) fn switch_lane(&mut self, index: u32, phase: Phase) -> bool {
        let fiber = self.table.fiber(index);
        match fiber.lane {
            Lane::Chained => {
                log::warn!("{} is chained and cannot change phase.", fiber.handle);
                false
            }
            Lane::Tick(current) if current == phase => true,
            Lane::Tick(_) => {
                self.table.classify(index, Lane::Tick(phase));
                true
            }
        }
    }

    /// Returns `true` while something outside the routine keeps the fiber
    /// from advancing.
    fn is_held(&mut self, index: u32) -> bool {
        let paused_by_host = self.paused_by_host(index);
        let fiber = self.table.fiber_mut(index);
        if fiber.paused || paused_by_host || fiber.is_locked() {
            return true;
        }
        match fiber.external.as_mut() {
            Some(wait) => !wait.is_ready(),
            None => false,
        }
    }

    /// Group pause bit, or an inactive host anchor the fiber does not ignore.
    pub(super) fn paused_by_host(&self, index: u32) -> bool {
        let fiber = self.table.fiber(index);
        self.groups.is_paused(fiber.anchor.group())
            || (!fiber.anchor.is_active() && !fiber.run_when_inactive)
    }

    /// Chained fibers inherit the delta of whatever is driving them, or
    /// resolve from their root fiber when driven from outside a step.
    fn resolve_delta(&self, index: u32) -> f64 {
        let fiber = self.table.fiber(index);
        if fiber.lane == Lane::Chained {
            if let Some(delta) = self.ambient_delta {
                return delta;
            }
            if let Some(root) = fiber.root.and_then(|root| self.table.resolve(root)) {
                return self.scaled_delta(root);
            }
        }
        self.scaled_delta(index)
    }

    fn scaled_delta(&self, index: u32) -> f64 {
        let fiber = self.table.fiber(index);
        let anchor = &fiber.anchor;
        let scale = fiber.time_scale * anchor.time_scale() * self.groups.time_scale(anchor.group());
        self.clock.delta() * f64::from(scale)
    }

    fn forwards_errors(&self, index: u32) -> bool {
        let fiber = self.table.fiber(index);
        fiber
            .forward_errors
            .or_else(|| {
                let root = self.table.resolve(fiber.root?)?;
                self.table.fiber(root).forward_errors
            })
            .unwrap_or(self.config.forward_errors)
    }

    /// Handles an error returned by a step.
    fn fault(&mut self, index: u32, error: anyhow::Error) -> Result<RunState, SchedulerError> {
        let fiber = self.table.fiber(index);
        let handle = fiber.handle;
        let fault = FiberFault {
            handle,
            name: fiber.name.clone(),
            error,
        };
        if !self.forwards_errors(index) {
            self.dispose_slot(index);
            return Err(fault.into());
        }

        log::error!("{fault}");
        // Handlers that drive the faulted fiber dispose it instead of stepping it.
        self.table.fiber_mut(index).disposing = true;
        let callbacks = std::mem::take(&mut self.table.fiber_mut(index).on_fault);
        if let Some(handler) = self.error_handler.as_mut() {
            handler(handle, &fault.error);
        }
        for callback in callbacks {
            callback(self, handle, &fault.error);
        }
        if let Some(index) = self.table.resolve(handle) {
            self.dispose_slot(index);
        }
        Ok(RunState::Finished)
    }

    /// Unwinds a fiber, frees its slot and fires exactly one family of
    /// terminal callbacks. A fiber that is stepping right now is only flagged;
    /// the driver disposes it when the step returns.
    pub(crate) fn dispose_slot(&mut self, index: u32) {
        let fiber = self.table.fiber_mut(index);
        if fiber.is_free() || fiber.releasing {
            return;
        }
        let handle = fiber.handle;
        if fiber.executing {
            fiber.disposing = true;
            log::trace!("Deferred disposal of stepping {handle}.");
            return;
        }
        fiber.releasing = true;
        let stopped = !fiber.stack.is_empty();
        let mut stack = std::mem::take(&mut fiber.stack);
        while let Some(mut level) = stack.pop() {
            level.release(self);
        }

        self.table.unclassify(index);
        let fiber = self.table.fiber_mut(index);
        let callbacks = if stopped {
            std::mem::take(&mut fiber.on_stop)
        } else {
            std::mem::take(&mut fiber.on_complete)
        };
        fiber.stack = stack;
        fiber.reset();
        self.table.release(index);
        log::debug!("{handle} {}.", if stopped { "stopped" } else { "completed" });

        for callback in callbacks {
            callback(self, handle);
        }
    }
}
