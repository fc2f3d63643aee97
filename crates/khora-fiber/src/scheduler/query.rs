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

//! Filtered lookups, bulk operations and diagnostics snapshots.

use super::Scheduler;
use crate::anchor::{AnchorId, GroupId};
use crate::diagnostics::FiberStats;
use crate::fiber::Fiber;
use crate::handle::FiberHandle;
use crate::phase::{Lane, Phase};
use crate::table::ListId;
use std::fmt;

/// Read-only view of a scheduled fiber, handed to [`FiberFilter::Where`].
pub struct FiberView<'a> {
    fiber: &'a Fiber,
}

impl<'a> FiberView<'a> {
    /// The fiber's handle.
    pub fn handle(&self) -> FiberHandle {
        self.fiber.handle
    }

    /// The fiber's name.
    pub fn name(&self) -> Option<&'a str> {
        self.fiber.name.as_deref()
    }

    /// Identity of the host anchor, if any.
    pub fn anchor(&self) -> Option<AnchorId> {
        self.fiber.anchor.id()
    }

    /// Group of the host anchor, if any.
    pub fn group(&self) -> Option<GroupId> {
        self.fiber.anchor.group()
    }

    /// Scheduling priority.
    pub fn priority(&self) -> i32 {
        self.fiber.priority
    }

    /// The tick list the fiber lives in.
    pub fn lane(&self) -> Lane {
        self.fiber.lane
    }

    /// Whether the fiber is explicitly paused.
    pub fn is_paused(&self) -> bool {
        self.fiber.paused
    }

    /// Whether the fiber holds the given lock key.
    pub fn holds_lock(&self, key: u64) -> bool {
        self.fiber.locks.contains(&key)
    }
}

/// Selects fibers for lookups and bulk operations.
pub enum FiberFilter {
    /// Every fiber.
    All,
    /// Fibers with exactly this name.
    Name(String),
    /// Fibers anchored to this host object.
    Anchor(AnchorId),
    /// Fibers whose host anchor belongs to this group.
    Group(GroupId),
    /// Fibers accepted by a predicate.
    Where(Box<dyn Fn(&FiberView<'_>) -> bool>),
}

impl FiberFilter {
    /// Filter by name.
    pub fn name(name: impl Into<String>) -> Self {
        FiberFilter::Name(name.into())
    }

    /// Filter by predicate.
    pub fn matching(predicate: impl Fn(&FiberView<'_>) -> bool + 'static) -> Self {
        FiberFilter::Where(Box::new(predicate))
    }

    /// Returns whether the viewed fiber is selected.
    pub fn matches(&self, view: &FiberView<'_>) -> bool {
        match self {
            FiberFilter::All => true,
            FiberFilter::Name(name) => view.name() == Some(name.as_str()),
            FiberFilter::Anchor(id) => view.anchor() == Some(*id),
            FiberFilter::Group(group) => view.group() == Some(*group),
            FiberFilter::Where(predicate) => predicate(view),
        }
    }
}

impl fmt::Debug for FiberFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FiberFilter::All => f.write_str("All"),
            FiberFilter::Name(name) => f.debug_tuple("Name").field(name).finish(),
            FiberFilter::Anchor(id) => f.debug_tuple("Anchor").field(id).finish(),
            FiberFilter::Group(group) => f.debug_tuple("Group").field(group).finish(),
            FiberFilter::Where(_) => f.write_str("Where(..)"),
        }
    }
}

impl Scheduler {
    /// Handles of every fiber selected by `filter`, in submission order.
    pub fn query(&self, filter: &FiberFilter) -> Vec<FiberHandle> {
        self.table
            .iter(ListId::Active)
            .map(|index| self.table.fiber(index))
            .filter(|fiber| filter.matches(&FiberView { fiber }))
            .map(|fiber| fiber.handle)
            .collect()
    }

    /// The first fiber selected by `filter`, or the null handle.
    pub fn query_first(&self, filter: &FiberFilter) -> FiberHandle {
        self.table
            .iter(ListId::Active)
            .map(|index| self.table.fiber(index))
            .find(|fiber| filter.matches(&FiberView { fiber }))
            .map_or(FiberHandle::NULL, |fiber| fiber.handle)
    }

    /// Pauses every selected fiber and returns their handles.
    pub fn pause_where(&mut self, filter: &FiberFilter) -> Vec<FiberHandle> {
        self.for_each_where(filter, |scheduler, index| {
            scheduler.table.fiber_mut(index).paused = true;
        })
    }

    /// Resumes every selected fiber and returns their handles.
    pub fn resume_where(&mut self, filter: &FiberFilter) -> Vec<FiberHandle> {
        self.for_each_where(filter, |scheduler, index| {
            scheduler.table.fiber_mut(index).paused = false;
        })
    }

    /// Stops every selected fiber and returns their handles.
    pub fn stop_where(&mut self, filter: &FiberFilter) -> Vec<FiberHandle> {
        self.for_each_where(filter, Scheduler::dispose_slot)
    }

    /// Stops every fiber and returns how many were stopped.
    pub fn kill_all(&mut self) -> usize {
        let stopped = self.stop_where(&FiberFilter::All).len();
        log::debug!("Killed {stopped} fibers.");
        stopped
    }

    /// Walks the active list under a traversal frame, so `action` may dispose
    /// the visited fiber or any other.
    fn for_each_where(
        &mut self,
        filter: &FiberFilter,
        mut action: impl FnMut(&mut Scheduler, u32),
    ) -> Vec<FiberHandle> {
        let epoch = self.table.next_epoch();
        let depth = self.table.begin_traversal(ListId::Active, epoch);
        let mut selected = Vec::new();
        while let Some(index) = self.table.traversal_next(depth) {
            let fiber = self.table.fiber(index);
            if !filter.matches(&FiberView { fiber }) {
                continue;
            }
            selected.push(fiber.handle);
            action(self, index);
        }
        self.table.end_traversal(depth);
        selected
    }

    /// Snapshot of one fiber and the fibers chained beneath it.
    pub fn stats(&self, handle: FiberHandle) -> Option<FiberStats> {
        self.table
            .resolve(handle)
            .map(|index| self.stats_for(index))
    }

    /// Snapshots of every top-level fiber, chained fibers nested beneath their
    /// owners.
    pub fn diagnostics(&self) -> Vec<FiberStats> {
        self.table
            .iter(ListId::Active)
            .filter(|&index| self.table.fiber(index).nested_owner.is_none())
            .map(|index| self.stats_for(index))
            .collect()
    }

    fn stats_for(&self, index: u32) -> FiberStats {
        let fiber = self.table.fiber(index);
        let handle = fiber.handle;
        let globally_paused = self.paused && fiber.lane.phase().is_some_and(Phase::is_auto);
        let nested = self
            .table
            .iter(ListId::Active)
            .filter(|&child| self.table.fiber(child).nested_owner == Some(handle))
            .map(|child| self.stats_for(child))
            .collect();
        FiberStats {
            handle,
            lane: fiber.lane,
            wait_phase: fiber.wait_phase,
            wait_reason: fiber.wait_reason(globally_paused || self.paused_by_host(index)),
            wait_seconds: fiber.wait_seconds.max(0.0),
            priority: fiber.priority,
            time_scale: fiber.time_scale,
            name: fiber.name.clone(),
            stack_depth: fiber.stack_depth(),
            nested,
        }
    }
}
