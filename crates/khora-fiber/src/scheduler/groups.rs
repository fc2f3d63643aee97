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

//! Double-buffered per-group pause mask and time-scales.

use crate::anchor::{GroupId, MAX_GROUPS};

/// Group settings as seen by the current tick, plus the values queued for the
/// next one. Queued values are latched only at the start of a top-level tick,
/// so a phase pass never sees a group change halfway through.
#[derive(Debug, Clone)]
pub(crate) struct GroupSettings {
    paused: u32,
    queued_paused: u32,
    scales: [f32; MAX_GROUPS],
    queued_scales: [f32; MAX_GROUPS],
}

impl GroupSettings {
    pub(crate) fn new() -> Self {
        Self {
            paused: 0,
            queued_paused: 0,
            scales: [1.0; MAX_GROUPS],
            queued_scales: [1.0; MAX_GROUPS],
        }
    }

    /// Makes the queued values current.
    pub(crate) fn latch(&mut self) {
        self.paused = self.queued_paused;
        self.scales = self.queued_scales;
    }

    pub(crate) fn queue_paused(&mut self, group: GroupId, paused: bool) {
        if paused {
            self.queued_paused |= group.bit();
        } else {
            self.queued_paused &= !group.bit();
        }
    }

    pub(crate) fn queue_time_scale(&mut self, group: GroupId, scale: f32) {
        self.queued_scales[group.index()] = scale.max(0.0);
    }

    pub(crate) fn is_paused(&self, group: Option<GroupId>) -> bool {
        group.is_some_and(|group| self.paused & group.bit() != 0)
    }

    pub(crate) fn time_scale(&self, group: Option<GroupId>) -> f32 {
        group.map_or(1.0, |group| self.scales[group.index()])
    }
}
