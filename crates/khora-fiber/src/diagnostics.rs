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

//! Diagnostics snapshots of scheduled fibers.

use crate::handle::FiberHandle;
use crate::phase::{Lane, Phase};
use serde::Serialize;

/// Why a fiber is, or is not, advancing right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum WaitReason {
    /// Stepping, or ready to step on its next drive.
    Running,
    /// Counting down a duration.
    TimeWait,
    /// Blocked on a host-level wait.
    ExternalWait,
    /// Waiting for the next occurrence of a phase.
    PhaseWait,
    /// Paused explicitly, by its group, or by an inactive host anchor.
    Paused,
    /// Holding at least one lock key.
    LockHeld,
    /// Stopped and about to be reclaimed.
    Disposing,
}

/// A point-in-time view of one fiber.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FiberStats {
    /// The fiber's handle.
    pub handle: FiberHandle,
    /// The tick list the fiber lives in.
    pub lane: Lane,
    /// The phase whose wait list the fiber sits in, if any.
    pub wait_phase: Option<Phase>,
    /// Current wait category.
    pub wait_reason: WaitReason,
    /// Remaining duration wait, in scaled seconds.
    pub wait_seconds: f64,
    /// Scheduling priority.
    pub priority: i32,
    /// The fiber's own time-scale multiplier.
    pub time_scale: f32,
    /// Optional name.
    pub name: Option<String>,
    /// Number of nested routines on the fiber's stack.
    pub stack_depth: usize,
    /// Snapshots of fibers chained beneath this one by nested containers.
    pub nested: Vec<FiberStats>,
}

impl FiberStats {
    /// Counts this fiber and every fiber nested beneath it.
    pub fn total_fibers(&self) -> usize {
        1 + self.nested.iter().map(FiberStats::total_fibers).sum::<usize>()
    }
}
