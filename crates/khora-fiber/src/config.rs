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

//! Scheduler-wide and per-fiber configuration.

use crate::phase::Phase;

/// Configuration for a [`Scheduler`](crate::Scheduler).
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Number of fiber slots pre-constructed at creation.
    pub initial_capacity: usize,
    /// Hard ceiling on the number of slots.
    /// Growing past it is a fatal capacity error.
    pub max_capacity: usize,
    /// Delta time, in seconds, used for every `FixedUpdate` tick.
    pub fixed_timestep: f64,
    /// Default for fault-forwarding when neither the fiber nor its chain root
    /// sets one. When forwarding, a failing step is logged and the fiber is
    /// stopped; otherwise the error escapes from the tick.
    pub forward_errors: bool,
    /// Maximum number of phase traversals active at once
    /// (the top-level tick plus nested manual ticks issued from inside a step).
    pub max_traversal_depth: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            initial_capacity: 64,
            max_capacity: (u32::MAX - 1) as usize,
            fixed_timestep: 1.0 / 50.0,
            forward_errors: true,
            max_traversal_depth: 2,
        }
    }
}

impl SchedulerConfig {
    /// Sets the number of pre-constructed slots.
    pub fn with_initial_capacity(mut self, capacity: usize) -> Self {
        self.initial_capacity = capacity;
        self
    }

    /// Sets the slot ceiling.
    pub fn with_max_capacity(mut self, capacity: usize) -> Self {
        self.max_capacity = capacity.min((u32::MAX - 1) as usize);
        self
    }

    /// Sets the fixed timestep in seconds.
    pub fn with_fixed_timestep(mut self, step: f64) -> Self {
        self.fixed_timestep = step;
        self
    }

    /// Sets the global fault-forwarding default.
    pub fn with_forward_errors(mut self, forward: bool) -> Self {
        self.forward_errors = forward;
        self
    }
}

/// Options applied to a fiber at submission.
#[derive(Debug, Clone)]
pub struct FiberOptions {
    /// The phase whose ticks step the fiber.
    pub phase: Phase,
    /// Higher priorities are stepped first within a phase.
    pub priority: i32,
    /// Optional name for queries and diagnostics.
    pub name: Option<String>,
    /// The fiber's own time-scale multiplier.
    pub time_scale: f32,
    /// Per-fiber fault-forwarding override.
    pub forward_errors: Option<bool>,
    /// Keep running while the host anchor is inactive.
    pub run_when_inactive: bool,
}

impl Default for FiberOptions {
    fn default() -> Self {
        Self {
            phase: Phase::Update,
            priority: 0,
            name: None,
            time_scale: 1.0,
            forward_errors: None,
            run_when_inactive: false,
        }
    }
}

impl FiberOptions {
    /// Options for a named fiber.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Default::default()
        }
    }

    /// Sets the phase.
    pub fn with_phase(mut self, phase: Phase) -> Self {
        self.phase = phase;
        self
    }

    /// Sets the priority.
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Sets the time-scale multiplier.
    pub fn with_time_scale(mut self, scale: f32) -> Self {
        self.time_scale = scale;
        self
    }

    /// Overrides fault-forwarding for this fiber.
    pub fn with_forward_errors(mut self, forward: bool) -> Self {
        self.forward_errors = Some(forward);
        self
    }

    /// Keeps the fiber running while its host anchor is inactive.
    pub fn run_when_inactive(mut self) -> Self {
        self.run_when_inactive = true;
        self
    }
}
