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

//! Frame numbering and the base delta of the phase being ticked.

use crate::phase::Phase;

/// Tracks which external frame the host is in.
///
/// The host only ever calls `tick(phase, dt)`, so frames are inferred: a tick
/// starts a new frame when its phase does not come after the previous one.
/// Back-to-back `FixedUpdate` ticks are fixed-step catch-up within one frame.
/// `Manual` ticks never move the clock.
#[derive(Debug, Clone)]
pub(crate) struct FrameClock {
    frame: u64,
    last_auto: Option<Phase>,
    phase: Option<Phase>,
    delta: f64,
}

/// What a nested tick must restore when it ends.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ClockState {
    phase: Option<Phase>,
    delta: f64,
}

impl FrameClock {
    pub(crate) fn new() -> Self {
        Self {
            frame: 0,
            last_auto: None,
            phase: None,
            delta: 0.0,
        }
    }

    /// Number of the current frame.
    pub(crate) fn frame(&self) -> u64 {
        self.frame
    }

    /// The phase being ticked, if any.
    pub(crate) fn phase(&self) -> Option<Phase> {
        self.phase
    }

    /// Base delta of the phase being ticked, or of the last one ticked.
    pub(crate) fn delta(&self) -> f64 {
        self.delta
    }

    /// Records the start of a phase tick.
    pub(crate) fn enter(&mut self, phase: Phase, delta: f64, nested: bool) -> ClockState {
        let saved = ClockState {
            phase: self.phase,
            delta: self.delta,
        };
        if !nested && phase.is_auto() {
            if let Some(last) = self.last_auto {
                let repeats_fixed_step = phase == last && phase == Phase::FixedUpdate;
                if phase.index() <= last.index() && !repeats_fixed_step {
                    self.frame += 1;
                }
            }
            self.last_auto = Some(phase);
        }
        self.phase = Some(phase);
        self.delta = delta;
        saved
    }

    /// Records the end of a phase tick. Top-level ticks leave their delta in
    /// place for manual drives issued between ticks.
    pub(crate) fn leave(&mut self, saved: ClockState, nested: bool) {
        self.phase = saved.phase;
        if nested {
            self.delta = saved.delta;
        }
    }
}
