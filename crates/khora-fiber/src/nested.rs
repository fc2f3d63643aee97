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

//! Routines that own and drive other fibers.
//!
//! Children are chained beneath the fiber running the container: they share
//! its anchor, are never stepped by a phase tick, and are driven exactly once
//! per step of the container with the container's resolved delta time. When
//! the container is unwound, every child still running is stopped.

use crate::handle::FiberHandle;
use crate::routine::{FiberContext, Routine};
use crate::scheduler::{RunState, Scheduler};
use crate::wait::Step;

/// Children of a container, started lazily on its first step.
#[derive(Default)]
struct Children {
    pending: Vec<Box<dyn Routine>>,
    live: Vec<FiberHandle>,
}

impl Children {
    fn new(routines: impl IntoIterator<Item = Box<dyn Routine>>) -> Self {
        Self {
            pending: routines.into_iter().collect(),
            live: Vec::new(),
        }
    }

    fn start(&mut self, cx: &mut FiberContext<'_>) -> anyhow::Result<()> {
        let parent = cx.handle();
        for routine in self.pending.drain(..) {
            let child = cx.chain_boxed(parent, routine)?;
            if !child.is_null() {
                self.live.push(child);
            }
        }
        Ok(())
    }

    /// Drives every live child once, dropping the ones that ended.
    fn drive_all(&mut self, cx: &mut FiberContext<'_>) -> anyhow::Result<()> {
        let mut i = 0;
        while i < self.live.len() {
            match cx.drive(self.live[i])? {
                RunState::Finished => {
                    self.live.remove(i);
                }
                RunState::Running => i += 1,
            }
        }
        Ok(())
    }

    /// Drives live children in order until one ends. Children after the one
    /// that ended are not driven.
    fn drive_until_one_ends(&mut self, cx: &mut FiberContext<'_>) -> anyhow::Result<bool> {
        for i in 0..self.live.len() {
            if cx.drive(self.live[i])? == RunState::Finished {
                self.live.remove(i);
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn stop_all(&mut self, scheduler: &mut Scheduler) {
        self.pending.clear();
        for child in self.live.drain(..) {
            scheduler.stop(child);
        }
    }
}

/// Runs several routines side by side and finishes when all of them have.
#[derive(Default)]
pub struct Parallel {
    children: Children,
}

impl Parallel {
    /// Creates a container from boxed routines.
    pub fn new(routines: impl IntoIterator<Item = Box<dyn Routine>>) -> Self {
        Self {
            children: Children::new(routines),
        }
    }

    /// Adds a routine.
    pub fn with(mut self, routine: impl Routine) -> Self {
        self.children.pending.push(Box::new(routine));
        self
    }

    /// Handles of the children still running.
    pub fn children(&self) -> &[FiberHandle] {
        &self.children.live
    }
}

impl Routine for Parallel {
    fn resume(&mut self, cx: &mut FiberContext<'_>) -> anyhow::Result<Step> {
        self.children.start(cx)?;
        self.children.drive_all(cx)?;
        Ok(if self.children.live.is_empty() {
            Step::Done
        } else {
            Step::next_tick()
        })
    }

    fn release(&mut self, scheduler: &mut Scheduler) {
        self.children.stop_all(scheduler);
    }
}

/// Runs several routines side by side and finishes as soon as one of them
/// does, stopping the rest.
#[derive(Default)]
pub struct Race {
    children: Children,
}

impl Race {
    /// Creates a container from boxed routines.
    pub fn new(routines: impl IntoIterator<Item = Box<dyn Routine>>) -> Self {
        Self {
            children: Children::new(routines),
        }
    }

    /// Adds a routine.
    pub fn with(mut self, routine: impl Routine) -> Self {
        self.children.pending.push(Box::new(routine));
        self
    }

    /// Handles of the children still running.
    pub fn children(&self) -> &[FiberHandle] {
        &self.children.live
    }
}

impl Routine for Race {
    fn resume(&mut self, cx: &mut FiberContext<'_>) -> anyhow::Result<Step> {
        self.children.start(cx)?;
        if self.children.live.is_empty() || self.children.drive_until_one_ends(cx)? {
            self.children.stop_all(cx);
            return Ok(Step::Done);
        }
        Ok(Step::next_tick())
    }

    fn release(&mut self, scheduler: &mut Scheduler) {
        self.children.stop_all(scheduler);
    }
}

/// Drives a single routine at a coarser rate than its container.
///
/// Delta time accumulates across the container's steps; once it exceeds the
/// interval, the child is driven once with the whole accumulated amount.
pub struct Interval {
    pending: Option<Box<dyn Routine>>,
    child: FiberHandle,
    interval: f64,
    elapsed: f64,
}

impl Interval {
    /// Drives `routine` every `interval` seconds of the container's time.
    pub fn new(interval: f64, routine: impl Routine) -> Self {
        Self {
            pending: Some(Box::new(routine)),
            child: FiberHandle::NULL,
            interval: interval.max(0.0),
            elapsed: 0.0,
        }
    }

    /// Handle of the child, null until the first step.
    pub fn child(&self) -> FiberHandle {
        self.child
    }
}

impl Routine for Interval {
    fn resume(&mut self, cx: &mut FiberContext<'_>) -> anyhow::Result<Step> {
        if let Some(routine) = self.pending.take() {
            let parent = cx.handle();
            self.child = cx.chain_boxed(parent, routine)?;
        }
        if !cx.is_running(self.child) {
            return Ok(Step::Done);
        }

        self.elapsed += cx.delta_time();
        if self.elapsed > self.interval {
            let delta = std::mem::take(&mut self.elapsed);
            if cx.drive_with_delta(self.child, delta)? == RunState::Finished {
                return Ok(Step::Done);
            }
        }
        Ok(Step::next_tick())
    }

    fn release(&mut self, scheduler: &mut Scheduler) {
        self.pending = None;
        scheduler.stop(self.child);
    }
}
