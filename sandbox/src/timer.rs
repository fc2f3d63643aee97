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

use std::time::Instant;

/// Measures frame deltas and counts how many fixed steps each frame owes.
#[derive(Debug, Clone)]
pub(crate) struct FrameTimer {
    last: Instant,
    fixed_step: f64,
    accumulator: f64,
}

impl FrameTimer {
    /// Upper bound on catch-up steps per frame.
    const MAX_FIXED_STEPS: u32 = 5;

    /// Creates a new FrameTimer starting now.
    /// ## Arguments
    /// * `fixed_step` - Length of one fixed-update step, in seconds.
    #[inline]
    pub fn new(fixed_step: f64) -> Self {
        Self {
            last: Instant::now(),
            fixed_step,
            accumulator: 0.0,
        }
    }

    /// Starts a new frame.
    /// ## Returns
    /// The seconds elapsed since the previous frame, and the number of
    /// fixed steps to run in this one.
    pub fn begin_frame(&mut self) -> (f64, u32) {
        let now = Instant::now();
        let delta = now.duration_since(self.last).as_secs_f64();
        self.last = now;
        (delta, self.advance(delta))
    }

    fn advance(&mut self, delta: f64) -> u32 {
        if self.fixed_step <= 0.0 {
            return 0;
        }
        self.accumulator += delta;
        let mut steps = 0;
        while self.accumulator >= self.fixed_step && steps < Self::MAX_FIXED_STEPS {
            self.accumulator -= self.fixed_step;
            steps += 1;
        }
        if steps == Self::MAX_FIXED_STEPS {
            // Drop the backlog instead of spiralling.
            self.accumulator = self.accumulator.min(self.fixed_step);
        }
        steps
    }
}
