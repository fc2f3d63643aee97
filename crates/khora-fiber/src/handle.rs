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

//! Generation-tagged references to fiber slots.

use serde::Serialize;
use std::fmt;

/// A safe, copyable reference to a scheduled fiber.
///
/// It combines a slot index with a generation count to solve the "ABA problem".
/// When a fiber finishes, its slot is recycled for the next submission, but the
/// generation is incremented. A handle kept from the earlier computation then no
/// longer matches the slot and every operation on it becomes a no-op.
///
/// The all-zero value is the null handle. Live handles always carry a
/// generation of at least 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub struct FiberHandle {
    /// The index of the fiber slot in the scheduler's table.
    pub index: u32,
    /// A counter incremented each time the slot is reused.
    pub generation: u32,
}

impl FiberHandle {
    /// The null handle. Never refers to a running fiber.
    pub const NULL: Self = Self {
        index: 0,
        generation: 0,
    };

    pub(crate) fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    /// Returns `true` for the all-zero handle.
    pub fn is_null(&self) -> bool {
        self.generation == 0
    }
}

impl fmt::Display for FiberHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            write!(f, "Fiber(null)")
        } else {
            write!(f, "Fiber({}v{})", self.index, self.generation)
        }
    }
}

/// Returns the generation that follows `generation`, skipping zero on wrap.
pub(crate) fn next_generation(generation: u32) -> u32 {
    match generation.wrapping_add(1) {
        0 => 1,
        next => next,
    }
}
