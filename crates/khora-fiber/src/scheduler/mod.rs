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

//! The phase-orchestrating fiber manager.

mod clock;
mod driver;
mod groups;
mod query;

pub use query::{FiberFilter, FiberView};

use crate::anchor::{Anchor, GroupId};
use crate::config::{FiberOptions, SchedulerConfig};
use crate::error::SchedulerError;
use crate::fiber::{FaultCallback, TerminalCallback};
use crate::handle::FiberHandle;
use crate::phase::{Lane, Phase};
use crate::routine::Routine;
use crate::table::{FiberTable, ListId};
use clock::FrameClock;
use driver::RunToken;
use groups::GroupSettings;

/// Outcome of driving a fiber once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// The fiber is still scheduled.
    Running,
    /// The fiber has been disposed, or the handle was already stale.
    Finished,
}

type ErrorHandler = Box<dyn FnMut(FiberHandle, &anyhow::Error)>;

/// Owns every fiber and steps them phase by phase.
///
/// The host calls [`Scheduler::tick`] once per phase per frame. Each call runs
/// the phase's tick list in descending priority order, then resumes the fibers
/// that were waiting for that phase to come around.
pub struct Scheduler {
    pub(crate) table: FiberTable,
    config: SchedulerConfig,
    clock: FrameClock,
    groups: GroupSettings,
    paused: bool,
    /// Resolved delta of the fiber currently stepping; chained children
    /// inherit it.
    ambient_delta: Option<f64>,
    tick_depth: usize,
    error_handler: Option<ErrorHandler>,
}

impl Scheduler {
    /// Creates a scheduler with the given configuration.
    pub fn new(config: SchedulerConfig) -> Self {
        let table = FiberTable::new(config.initial_capacity, config.max_capacity);
        log::info!(
            "Fiber scheduler initialized with {} slots (fixed step {:.4}s).",
            table.capacity(),
            config.fixed_timestep
        );
        Self {
            table,
            config,
            clock: FrameClock::new(),
            groups: GroupSettings::new(),
            paused: false,
            ambient_delta: None,
            tick_depth: 0,
            error_handler: None,
        }
    }

    /// The scheduler's configuration.
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    // --- Submission ---

    /// Schedules `routine` in the `Update` phase with default options.
    ///
    /// # Panics
    ///
    /// Panics if the slot arena cannot grow (see [`Scheduler::try_submit_with`]).
    pub fn submit(&mut self, anchor: impl Into<Anchor>, routine: impl Routine) -> FiberHandle {
        self.submit_with(anchor, routine, FiberOptions::default())
    }

    /// Schedules `routine` with explicit options.
    ///
    /// # Panics
    ///
    /// Panics if the slot arena cannot grow (see [`Scheduler::try_submit_with`]).
    pub fn submit_with(
        &mut self,
        anchor: impl Into<Anchor>,
        routine: impl Routine,
        options: FiberOptions,
    ) -> FiberHandle {
        match self.try_submit_with(anchor, routine, options) {
            Ok(handle) => handle,
            Err(err) => panic!("{err}"),
        }
    }

    /// Schedules `routine`, reporting a capacity error instead of panicking.
    pub fn try_submit_with(
        &mut self,
        anchor: impl Into<Anchor>,
        routine: impl Routine,
        options: FiberOptions,
    ) -> Result<FiberHandle, SchedulerError> {
        let index = self.table.acquire()?;
        let handle =
            self.table
                .fiber_mut(index)
                .init(index, Box::new(routine), anchor.into(), &options);
        self.table.classify(index, Lane::Tick(options.phase));
        log::debug!("Submitted {handle} to {:?}.", options.phase);
        Ok(handle)
    }

    /// Schedules `routine` as a child of `parent`. The child is only ever
    /// stepped by explicit drives (normally from the parent's own step), shares
    /// the parent's anchor and inherits its resolved delta time.
    ///
    /// Returns the null handle if `parent` is not running.
    pub fn chain(
        &mut self,
        parent: FiberHandle,
        routine: impl Routine,
    ) -> Result<FiberHandle, SchedulerError> {
        self.chain_boxed(parent, Box::new(routine))
    }

    pub(crate) fn chain_boxed(
        &mut self,
        parent: FiberHandle,
        routine: Box<dyn Routine>,
    ) -> Result<FiberHandle, SchedulerError> {
        let Some(parent_index) = self.table.resolve(parent) else {
            return Ok(FiberHandle::NULL);
        };
        let owner = self.table.fiber(parent_index);
        let anchor = owner.anchor.clone();
        let root = owner.root.unwrap_or(parent);
        let options = FiberOptions {
            priority: owner.priority,
            run_when_inactive: owner.run_when_inactive,
            ..FiberOptions::default()
        };

        let index = self.table.acquire()?;
        let fiber = self.table.fiber_mut(index);
        let handle = fiber.init(index, routine, anchor, &options);
        fiber.nested_owner = Some(parent);
        fiber.root = Some(root);
        self.table.classify(index, Lane::Chained);
        log::trace!("Chained {handle} beneath {parent}.");
        Ok(handle)
    }

    // --- Per-fiber control ---

    /// Returns `true` while `handle` refers to a scheduled fiber.
    pub fn is_running(&self, handle: FiberHandle) -> bool {
        self.table.resolve(handle).is_some()
    }

    /// Stops a fiber. A fiber that is not stepping right now is disposed
    /// immediately; one that is stepping is disposed as soon as its step
    /// returns. Its stop callbacks fire either way.
    pub fn stop(&mut self, handle: FiberHandle) -> bool {
        match self.table.resolve(handle) {
            Some(index) => {
                self.dispose_slot(index);
                true
            }
            None => false,
        }
    }

    /// Pauses a fiber until [`Scheduler::resume`].
    pub fn pause(&mut self, handle: FiberHandle) -> bool {
        self.with_fiber(handle, |fiber| fiber.paused = true)
    }

    /// Resumes a paused fiber.
    pub fn resume(&mut self, handle: FiberHandle) -> bool {
        self.with_fiber(handle, |fiber| fiber.paused = false)
    }

    /// Returns whether the fiber is explicitly paused.
    pub fn is_fiber_paused(&self, handle: FiberHandle) -> bool {
        self.table
            .resolve(handle)
            .is_some_and(|index| self.table.fiber(index).paused)
    }

    /// Changes a fiber's priority. Its lists are resorted lazily before their
    /// next traversal.
    pub fn set_priority(&mut self, handle: FiberHandle, priority: i32) -> bool {
        let Some(index) = self.table.resolve(handle) else {
            return false;
        };
        if self.table.fiber_mut(index).set_priority(priority) {
            self.table.mark_dirty(index);
        }
        true
    }

    /// Returns a fiber's priority.
    pub fn priority(&self, handle: FiberHandle) -> Option<i32> {
        self.table
            .resolve(handle)
            .map(|index| self.table.fiber(index).priority)
    }

    /// Sets a fiber's own time-scale multiplier.
    pub fn set_time_scale(&mut self, handle: FiberHandle, scale: f32) -> bool {
        self.with_fiber(handle, |fiber| fiber.time_scale = scale.max(0.0))
    }

    /// Returns a fiber's own time-scale multiplier.
    pub fn time_scale(&self, handle: FiberHandle) -> Option<f32> {
        self.table
            .resolve(handle)
            .map(|index| self.table.fiber(index).time_scale)
    }

    /// Moves a fiber to another phase's tick list. Chained fibers belong to
    /// their parent and cannot be moved.
    pub fn set_phase(&mut self, handle: FiberHandle, phase: Phase) -> bool {
        let Some(index) = self.table.resolve(handle) else {
            return false;
        };
        self.switch_lane(index, phase)
    }

    /// Returns the phase whose ticks step the fiber, `None` for chained fibers.
    pub fn phase(&self, handle: FiberHandle) -> Option<Phase> {
        self.table
            .resolve(handle)
            .and_then(|index| self.table.fiber(index).lane.phase())
    }

    /// Names a fiber.
    pub fn set_name(&mut self, handle: FiberHandle, name: impl Into<String>) -> bool {
        let name = name.into();
        self.with_fiber(handle, move |fiber| fiber.name = Some(name))
    }

    /// Returns a fiber's name.
    pub fn name(&self, handle: FiberHandle) -> Option<&str> {
        self.table
            .resolve(handle)
            .and_then(|index| self.table.fiber(index).name.as_deref())
    }

    /// Adds a lock key. A fiber holding any key does not advance.
    pub fn lock(&mut self, handle: FiberHandle, key: u64) -> bool {
        self.with_fiber(handle, |fiber| {
            if !fiber.locks.contains(&key) {
                fiber.locks.push(key);
            }
        })
    }

    /// Removes a lock key.
    pub fn unlock(&mut self, handle: FiberHandle, key: u64) -> bool {
        self.with_fiber(handle, |fiber| fiber.locks.retain(|&held| held != key))
    }

    // --- Callbacks ---

    /// Registers a callback fired when the fiber finishes on its own.
    pub fn on_complete(
        &mut self,
        handle: FiberHandle,
        callback: impl FnOnce(&mut Scheduler, FiberHandle) + 'static,
    ) -> bool {
        let callback: TerminalCallback = Box::new(callback);
        self.subscribe(handle, "complete", |fiber| fiber.on_complete.push(callback))
    }

    /// Registers a callback fired when the fiber is stopped before finishing.
    pub fn on_stop(
        &mut self,
        handle: FiberHandle,
        callback: impl FnOnce(&mut Scheduler, FiberHandle) + 'static,
    ) -> bool {
        let callback: TerminalCallback = Box::new(callback);
        self.subscribe(handle, "stop", |fiber| fiber.on_stop.push(callback))
    }

    /// Registers a callback fired when a step of the fiber fails and the
    /// failure is forwarded.
    pub fn on_exception(
        &mut self,
        handle: FiberHandle,
        callback: impl FnOnce(&mut Scheduler, FiberHandle, &anyhow::Error) + 'static,
    ) -> bool {
        let callback: FaultCallback = Box::new(callback);
        self.subscribe(handle, "exception", |fiber| fiber.on_fault.push(callback))
    }

    /// Installs the scheduler-wide handler for forwarded faults.
    pub fn set_error_handler(
        &mut self,
        handler: impl FnMut(FiberHandle, &anyhow::Error) + 'static,
    ) {
        self.error_handler = Some(Box::new(handler));
    }

    // --- Global and group state ---

    /// Pauses or resumes every automatic phase. Manual ticks still run.
    pub fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
    }

    /// Returns whether automatic phases are paused.
    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Queues a group's pause bit; it takes effect at the next tick.
    pub fn set_group_paused(&mut self, group: GroupId, paused: bool) {
        self.groups.queue_paused(group, paused);
    }

    /// Returns the group's pause bit as seen by the current tick.
    pub fn is_group_paused(&self, group: GroupId) -> bool {
        self.groups.is_paused(Some(group))
    }

    /// Queues a group's time-scale; it takes effect at the next tick.
    pub fn set_group_time_scale(&mut self, group: GroupId, scale: f32) {
        self.groups.queue_time_scale(group, scale);
    }

    /// Returns the group's time-scale as seen by the current tick.
    pub fn group_time_scale(&self, group: GroupId) -> f32 {
        self.groups.time_scale(Some(group))
    }

    // --- Ticking ---

    /// Runs one phase: its tick list first, then the fibers waiting for it.
    ///
    /// `FixedUpdate` always uses the configured fixed timestep and ignores
    /// `delta_time`. May be called from inside a step to tick a phase that is
    /// not already being traversed (typically [`Phase::Manual`]).
    pub fn tick(&mut self, phase: Phase, delta_time: f64) -> Result<(), SchedulerError> {
        let update = ListId::Update(Lane::Tick(phase));
        let waits = ListId::Yield(phase);
        if self.tick_depth >= self.config.max_traversal_depth
            || self.table.is_iterating(update)
            || self.table.is_iterating(waits)
        {
            log::warn!("Rejected tick of {phase:?} from inside its own traversal.");
            return Err(SchedulerError::TraversalRejected { phase });
        }

        let nested = self.tick_depth > 0;
        if !nested {
            self.groups.latch();
        }
        let delta = match phase {
            Phase::FixedUpdate => self.config.fixed_timestep,
            _ => delta_time.max(0.0),
        };
        let saved = self.clock.enter(phase, delta, nested);
        if self.paused && phase.is_auto() {
            self.clock.leave(saved, nested);
            return Ok(());
        }

        self.tick_depth += 1;
        let epoch = self.table.next_epoch();
        let result = self
            .run_list(update, epoch, RunToken::Tick(phase))
            .and_then(|()| self.run_list(waits, epoch, RunToken::Resume(phase)));
        self.tick_depth -= 1;
        self.clock.leave(saved, nested);
        result
    }

    /// Steps one fiber right now, outside of its phase's traversal.
    ///
    /// A fiber that is already stepping is left alone and reported as
    /// running. A fiber waiting for a phase is resumed.
    pub fn drive(&mut self, handle: FiberHandle) -> Result<RunState, SchedulerError> {
        let Some(index) = self.table.resolve(handle) else {
            return Ok(RunState::Finished);
        };
        self.run_slot(index, RunToken::Direct)
    }

    /// Drives `handle` with `delta` as the inherited delta time.
    pub(crate) fn drive_with_ambient(
        &mut self,
        handle: FiberHandle,
        delta: f64,
    ) -> Result<RunState, SchedulerError> {
        let saved = self.ambient_delta.replace(delta);
        let result = self.drive(handle);
        self.ambient_delta = saved;
        result
    }

    // --- Introspection ---

    /// Number of the current frame, inferred from the order of phase ticks.
    pub fn frame(&self) -> u64 {
        self.clock.frame()
    }

    /// Base delta time of the phase being ticked, or of the last one ticked.
    pub fn delta_time(&self) -> f64 {
        self.clock.delta()
    }

    /// The phase being ticked, if any.
    pub fn current_phase(&self) -> Option<Phase> {
        self.clock.phase()
    }

    /// Number of scheduled fibers, chained children included.
    pub fn fiber_count(&self) -> usize {
        self.table.len()
    }

    /// Number of slots in the arena.
    pub fn capacity(&self) -> usize {
        self.table.capacity()
    }

    fn with_fiber(
        &mut self,
        handle: FiberHandle,
        f: impl FnOnce(&mut crate::fiber::Fiber),
    ) -> bool {
        match self.table.resolve(handle) {
            Some(index) => {
                f(self.table.fiber_mut(index));
                true
            }
            None => false,
        }
    }

    fn subscribe(
        &mut self,
        handle: FiberHandle,
        event: &str,
        f: impl FnOnce(&mut crate::fiber::Fiber),
    ) -> bool {
        let subscribed = self.with_fiber(handle, f);
        if !subscribed {
            log::warn!("Ignored {event} callback for stale {handle}.");
        }
        subscribed
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new(SchedulerConfig::default())
    }
}
