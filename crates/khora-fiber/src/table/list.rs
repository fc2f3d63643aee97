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

//! Index-linked list headers and link fields.

use crate::phase::{Lane, Phase};

/// Link value meaning "no slot".
pub(crate) const NIL: u32 = u32::MAX;

/// The three families of link fields each slot carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LinkKind {
    /// Free list or active list; a slot is always in exactly one of them.
    Main = 0,
    /// The tick list of the slot's lane.
    Update = 1,
    /// The wait list of a phase the slot is waiting on.
    Yield = 2,
}

/// Identifies one list of the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ListId {
    Free,
    Active,
    Update(Lane),
    Yield(Phase),
}

impl ListId {
    pub(crate) fn kind(self) -> LinkKind {
        match self {
            ListId::Free | ListId::Active => LinkKind::Main,
            ListId::Update(_) => LinkKind::Update,
            ListId::Yield(_) => LinkKind::Yield,
        }
    }
}

/// A prev/next pair of slot indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Links {
    pub(crate) prev: u32,
    pub(crate) next: u32,
}

impl Default for Links {
    fn default() -> Self {
        Self {
            prev: NIL,
            next: NIL,
        }
    }
}

/// Header of a doubly-linked list threaded through the table's slots.
#[derive(Debug, Clone, Copy)]
pub(crate) struct List {
    pub(crate) head: u32,
    pub(crate) tail: u32,
    pub(crate) count: usize,
    /// Number of traversals currently walking this list.
    pub(crate) iterating: u16,
    /// Priority order is stale; resort before the next traversal.
    pub(crate) dirty: bool,
}

impl Default for List {
    fn default() -> Self {
        Self {
            head: NIL,
            tail: NIL,
            count: 0,
            iterating: 0,
            dirty: false,
        }
    }
}

impl List {
    pub(crate) fn is_empty(&self) -> bool {
        self.count == 0
    }
}

/// Snapshot of an in-flight traversal.
///
/// `cursor` is the next slot to visit. Removing that slot from the list moves
/// the cursor to its successor. Slots enlisted at or after `epoch` were added
/// after the traversal began and are passed over.
#[derive(Debug, Clone, Copy)]
pub(crate) struct TraversalFrame {
    pub(crate) list: ListId,
    pub(crate) cursor: u32,
    pub(crate) remaining: usize,
    pub(crate) epoch: u64,
}
