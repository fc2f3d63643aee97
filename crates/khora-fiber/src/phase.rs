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

//! Tick phases and the lanes fibers are classified into.

use serde::Serialize;

/// A named, ordered stage within one external frame.
///
/// The declaration order is the order in which a host is expected to tick the
/// phases inside a frame. `FixedUpdate` may be ticked several times in a row
/// to catch up a fixed timestep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum Phase {
    /// Fixed-timestep simulation phase.
    FixedUpdate,
    /// Variable-timestep phase, once per frame.
    #[default]
    Update,
    /// Runs after `Update`, once per frame.
    LateUpdate,
    /// First user-defined phase.
    Custom1,
    /// Second user-defined phase.
    Custom2,
    /// Never ticked automatically; the host drives it explicitly.
    Manual,
}

impl Phase {
    /// Number of phases.
    pub const COUNT: usize = 6;

    /// All phases in frame order.
    pub const ALL: [Phase; Self::COUNT] = [
        Phase::FixedUpdate,
        Phase::Update,
        Phase::LateUpdate,
        Phase::Custom1,
        Phase::Custom2,
        Phase::Manual,
    ];

    /// Position of the phase within a frame.
    pub fn index(self) -> usize {
        self as usize
    }

    /// Returns `false` for [`Phase::Manual`].
    pub fn is_auto(self) -> bool {
        self != Phase::Manual
    }

    /// Returns the canonical name of the phase.
    pub fn name(self) -> &'static str {
        match self {
            Phase::FixedUpdate => "fixed_update",
            Phase::Update => "update",
            Phase::LateUpdate => "late_update",
            Phase::Custom1 => "custom1",
            Phase::Custom2 => "custom2",
            Phase::Manual => "manual",
        }
    }

    /// Parses a phase from its canonical name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|phase| phase.name() == name)
    }
}

/// The tick list a fiber belongs to.
///
/// Root fibers live in the list of their phase. Fibers chained beneath a
/// nested container live in the `Chained` lane, which the scheduler never
/// traverses: only the owning container's step drives them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Lane {
    /// Stepped by the scheduler on every tick of the phase.
    Tick(Phase),
    /// Stepped only by the parent container.
    Chained,
}

impl Lane {
    /// Number of lanes (one per phase plus the chained lane).
    pub(crate) const COUNT: usize = Phase::COUNT + 1;

    pub(crate) fn index(self) -> usize {
        match self {
            Lane::Tick(phase) => phase.index(),
            Lane::Chained => Phase::COUNT,
        }
    }

    /// Returns the phase for tick lanes.
    pub fn phase(self) -> Option<Phase> {
        match self {
            Lane::Tick(phase) => Some(phase),
            Lane::Chained => None,
        }
    }
}

impl Default for Lane {
    fn default() -> Self {
        Lane::Tick(Phase::default())
    }
}
