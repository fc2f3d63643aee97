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

//! Per-slot fiber state.
//!
//! A [`Fiber`] is a reusable execution slot. The scheduler's driver owns the
//! algorithm that steps it; this module only holds the state and the small
//! transitions that do not touch the rest of the table.

use crate::anchor::Anchor;
use crate::config::FiberOptions;
use crate::diagnostics::WaitReason;
use crate::handle::{next_generation, FiberHandle};
use crate::phase::{Lane, Phase};
use crate::routine::Routine;
use crate::scheduler::Scheduler;
use crate::wait::ExternalWait;

/// Callback fired once when a fiber completes or is stopped.
pub type TerminalCallback = Box<dyn FnOnce(&mut Scheduler, FiberHandle)>;

/// Callback fired once when a fiber's step fails.
pub type FaultCallback = Box<dyn FnOnce(&mut Scheduler, FiberHandle, &anyhow::Error)>;

/// Which list pass last stepped a fiber, for the once-per-frame rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StepSource {
    Tick(Phase),
    Resume(Phase),
}

/// One slot of the fiber table.
pub struct Fiber {
    pub(crate) handle: FiberHandle,
    /// Survives reset so the next occupant gets a fresh generation.
    generation: u32,
    pub(crate) stack: Vec<Box<dyn Routine>>,
    /// Depth of `stack` while it is detached for a step.
    pub(crate) detached_depth: usize,
    pub(crate) executing: bool,
    pub(crate) disposing: bool,
    pub(crate) releasing: bool,
    pub(crate) paused: bool,
    pub(crate) wait_seconds: f64,
    pub(crate) external: Option<Box<dyn ExternalWait>>,
    pub(crate) locks: Vec<u64>,
    pub(crate) time_scale: f32,
    pub(crate) priority: i32,
    pub(crate) name: Option<String>,
    pub(crate) anchor: Anchor,
    pub(crate) lane: Lane,
    pub(crate) wait_phase: Option<Phase>,
    pub(crate) nested_owner: Option<FiberHandle>,
    pub(crate) root: Option<FiberHandle>,
    pub(crate) forward_errors: Option<bool>,
    pub(crate) run_when_inactive: bool,
    pub(crate) last_step: Option<(u64, StepSource)>,
    pub(crate) on_complete: Vec<TerminalCallback>,
    pub(crate) on_stop: Vec<TerminalCallback>,
    pub(crate) on_fault: Vec<FaultCallback>,
}

impl Fiber {
    pub(crate) fn new() -> Self {
        Self {
            handle: FiberHandle::NULL,
            generation: 0,
            stack: Vec::new(),
            detached_depth: 0,
            executing: false,
            disposing: false,
            releasing: false,
            paused: false,
            wait_seconds: 0.0,
            external: None,
            locks: Vec::new(),
            time_scale: 1.0,
            priority: 0,
            name: None,
            anchor: Anchor::Scheduler,
            lane: Lane::default(),
            wait_phase: None,
            nested_owner: None,
            root: None,
            forward_errors: None,
            run_when_inactive: false,
            last_step: None,
            on_complete: Vec::new(),
            on_stop: Vec::new(),
            on_fault: Vec::new(),
        }
    }

    /// Claims the slot for a new computation and returns its handle.
    pub(crate) fn init(
        &mut self,
        index: u32,
        routine: Box<dyn Routine>,
        anchor: Anchor,
        options: &FiberOptions,
    ) -> FiberHandle {
        self.generation = next_generation(self.generation);
        self.handle = FiberHandle::new(index, self.generation);
        self.stack.push(routine);
        self.anchor = anchor;
        self.lane = Lane::Tick(options.phase);
        self.priority = options.priority;
        self.name = options.name.clone();
        self.time_scale = options.time_scale.max(0.0);
        self.forward_errors = options.forward_errors;
        self.run_when_inactive = options.run_when_inactive;
        self.handle
    }

    /// Returns every field except the generation to its default.
    pub(crate) fn reset(&mut self) {
        let generation = self.generation;
        let mut stack = std::mem::take(&mut self.stack);
        stack.clear();
        *self = Self::new();
        self.generation = generation;
        // Keep the stack's allocation for the next occupant.
        self.stack = stack;
    }

    /// Returns `true` while the slot holds no computation.
    pub fn is_free(&self) -> bool {
        self.handle.is_null()
    }

    /// The handle of the current occupant, null when free.
    pub fn handle(&self) -> FiberHandle {
        self.handle
    }

    /// Number of nested routines, including the root.
    pub fn stack_depth(&self) -> usize {
        if self.executing {
            self.detached_depth
        } else {
            self.stack.len()
        }
    }

    /// Updates the priority and reports whether it changed.
    pub(crate) fn set_priority(&mut self, priority: i32) -> bool {
        if self.priority == priority {
            return false;
        }
        self.priority = priority;
        true
    }

    /// Returns `true` while the fiber holds at least one lock key.
    pub fn is_locked(&self) -> bool {
        !self.locks.is_empty()
    }

    /// Classifies why the fiber is or is not advancing. `paused_by_host`
    /// folds in the group pause bit and the anchor's activity.
    pub(crate) fn wait_reason(&self, paused_by_host: bool) -> WaitReason {
        if self.disposing || self.releasing {
            WaitReason::Disposing
        } else if self.executing {
            WaitReason::Running
        } else if self.paused || paused_by_host {
            WaitReason::Paused
        } else if self.is_locked() {
            WaitReason::LockHeld
        } else if self.external.is_some() {
            WaitReason::ExternalWait
        } else if self.wait_phase.is_some() {
            WaitReason::PhaseWait
        } else if self.wait_seconds > 0.0 {
            WaitReason::TimeWait
        } else {
            WaitReason::Running
        }
    }
}
