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

//! Host-lifetime anchors and scheduling groups.
//!
//! Every fiber is submitted against an [`Anchor`]. A [`HostAnchor`] stands in
//! for a host object (an entity, a UI widget, ...): when the host object is
//! destroyed, fibers anchored to it are disposed at their next drive; while it is
//! inactive, they are paused. The anchor also carries a time-scale multiplier
//! and an optional [`GroupId`] whose pause bit and time-scale apply on top.

use serde::Serialize;
use std::cell::Cell;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Number of scheduling groups.
pub const MAX_GROUPS: usize = 32;

/// Identifies one of the [`MAX_GROUPS`] scheduling groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct GroupId(u8);

impl GroupId {
    /// Creates a group id, or `None` if `index` is out of range.
    pub fn new(index: u8) -> Option<Self> {
        ((index as usize) < MAX_GROUPS).then_some(Self(index))
    }

    /// The raw group index.
    pub fn index(self) -> usize {
        self.0 as usize
    }

    pub(crate) fn bit(self) -> u32 {
        1 << self.0
    }
}

/// Unique identity of a [`HostAnchor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct AnchorId(pub u64);

impl fmt::Display for AnchorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Anchor({})", self.0)
    }
}

static NEXT_ANCHOR_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug)]
struct AnchorState {
    id: AnchorId,
    alive: Cell<bool>,
    active: Cell<bool>,
    time_scale: Cell<f32>,
    group: Cell<Option<GroupId>>,
}

/// Shared handle to a host object's lifetime and timing state.
///
/// Clones share the same state; the host keeps one clone and flips it to
/// inactive or destroyed, the scheduler observes the change on the next drive.
#[derive(Debug, Clone)]
pub struct HostAnchor {
    state: Rc<AnchorState>,
}

impl HostAnchor {
    /// Creates a live, active anchor with a time-scale of 1 and no group.
    pub fn new() -> Self {
        Self {
            state: Rc::new(AnchorState {
                id: AnchorId(NEXT_ANCHOR_ID.fetch_add(1, Ordering::Relaxed)),
                alive: Cell::new(true),
                active: Cell::new(true),
                time_scale: Cell::new(1.0),
                group: Cell::new(None),
            }),
        }
    }

    /// Creates an anchor that belongs to `group`.
    pub fn with_group(group: GroupId) -> Self {
        let anchor = Self::new();
        anchor.set_group(Some(group));
        anchor
    }

    /// Returns the anchor's identity.
    pub fn id(&self) -> AnchorId {
        self.state.id
    }

    /// Returns `false` once [`HostAnchor::destroy`] has been called.
    pub fn is_alive(&self) -> bool {
        self.state.alive.get()
    }

    /// Marks the host object as destroyed. Irreversible.
    pub fn destroy(&self) {
        self.state.alive.set(false);
        self.state.active.set(false);
    }

    /// Returns whether the host object is currently active.
    pub fn is_active(&self) -> bool {
        self.state.alive.get() && self.state.active.get()
    }

    /// Activates or deactivates the host object.
    pub fn set_active(&self, active: bool) {
        self.state.active.set(active);
    }

    /// The host object's own time-scale multiplier.
    pub fn time_scale(&self) -> f32 {
        self.state.time_scale.get()
    }

    /// Sets the host object's time-scale multiplier.
    pub fn set_time_scale(&self, scale: f32) {
        self.state.time_scale.set(scale.max(0.0));
    }

    /// The scheduling group this host object belongs to.
    pub fn group(&self) -> Option<GroupId> {
        self.state.group.get()
    }

    /// Moves the host object into `group`, or out of any group.
    pub fn set_group(&self, group: Option<GroupId>) {
        self.state.group.set(group);
    }
}

impl Default for HostAnchor {
    fn default() -> Self {
        Self::new()
    }
}

/// What a fiber's lifetime is tied to.
#[derive(Debug, Clone, Default)]
pub enum Anchor {
    /// Owned by the scheduler itself: never dies with a host, never inactive.
    #[default]
    Scheduler,
    /// Tied to a host object.
    Host(HostAnchor),
}

impl Anchor {
    /// Returns `false` once the host object has been destroyed.
    pub fn is_alive(&self) -> bool {
        match self {
            Anchor::Scheduler => true,
            Anchor::Host(host) => host.is_alive(),
        }
    }

    /// Returns whether the host object is active.
    pub fn is_active(&self) -> bool {
        match self {
            Anchor::Scheduler => true,
            Anchor::Host(host) => host.is_active(),
        }
    }

    /// The host object's time-scale multiplier, 1 for scheduler-owned fibers.
    pub fn time_scale(&self) -> f32 {
        match self {
            Anchor::Scheduler => 1.0,
            Anchor::Host(host) => host.time_scale(),
        }
    }

    /// The host object's group, if any.
    pub fn group(&self) -> Option<GroupId> {
        match self {
            Anchor::Scheduler => None,
            Anchor::Host(host) => host.group(),
        }
    }

    /// The host object's identity, if any.
    pub fn id(&self) -> Option<AnchorId> {
        match self {
            Anchor::Scheduler => None,
            Anchor::Host(host) => Some(host.id()),
        }
    }
}

impl From<HostAnchor> for Anchor {
    fn from(host: HostAnchor) -> Self {
        Anchor::Host(host)
    }
}

impl From<&HostAnchor> for Anchor {
    fn from(host: &HostAnchor) -> Self {
        Anchor::Host(host.clone())
    }
}
