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

//! The fiber slot arena and its intrusive list index.
//!
//! Every slot carries three prev/next link pairs, one per [`LinkKind`], so a
//! fiber can sit in the free-or-active list, one tick list and one wait list at
//! the same time without any per-fiber allocation. Lists are walked through
//! [`TraversalFrame`]s that survive the walked list being mutated by the very
//! fibers being stepped.

mod list;
mod sort;

pub(crate) use list::ListId;
use list::{LinkKind, Links, List, TraversalFrame, NIL};

use crate::error::SchedulerError;
use crate::fiber::Fiber;
use crate::handle::FiberHandle;
use crate::phase::{Lane, Phase};

const LINK_KINDS: usize = 3;

struct Entry {
    fiber: Fiber,
    links: [Links; LINK_KINDS],
    /// The list each link pair is currently threaded into.
    member: [Option<ListId>; LINK_KINDS],
    /// Table epoch at which the slot joined each list.
    stamps: [u64; LINK_KINDS],
}

impl Entry {
    fn new() -> Self {
        Self {
            fiber: Fiber::new(),
            links: [Links::default(); LINK_KINDS],
            member: [None; LINK_KINDS],
            stamps: [0; LINK_KINDS],
        }
    }
}

/// Slot arena holding one [`Fiber`] per slot plus its list membership.
pub(crate) struct FiberTable {
    entries: Vec<Entry>,
    free: List,
    active: List,
    update: [List; Lane::COUNT],
    waits: [List; Phase::COUNT],
    frames: Vec<TraversalFrame>,
    epoch: u64,
    max_capacity: usize,
}

impl FiberTable {
    /// Creates a table with `initial` free slots.
    pub(crate) fn new(initial: usize, max_capacity: usize) -> Self {
        let mut table = Self {
            entries: Vec::new(),
            free: List::default(),
            active: List::default(),
            update: [List::default(); Lane::COUNT],
            waits: [List::default(); Phase::COUNT],
            frames: Vec::new(),
            epoch: 0,
            max_capacity,
        };
        table.extend_to(initial.min(max_capacity));
        table
    }

    /// Number of slots, free or not.
    pub(crate) fn capacity(&self) -> usize {
        self.entries.len()
    }

    /// Number of running fibers.
    pub(crate) fn len(&self) -> usize {
        self.active.count
    }

    /// Doubles the number of slots.
    pub(crate) fn grow(&mut self) -> Result<(), SchedulerError> {
        let current = self.entries.len();
        if current >= self.max_capacity {
            return Err(SchedulerError::CapacityExceeded {
                requested: current.saturating_mul(2).max(1),
                max: self.max_capacity,
            });
        }
        let target = current.saturating_mul(2).clamp(1, self.max_capacity);
        self.extend_to(target);
        log::info!("Fiber table grown from {current} to {target} slots.");
        Ok(())
    }

    fn extend_to(&mut self, target: usize) {
        let start = self.entries.len();
        self.entries.reserve_exact(target.saturating_sub(start));
        for index in start..target {
            self.entries.push(Entry::new());
            // Appending keeps the existing free order in front of the new slots.
            self.push_back(ListId::Free, index as u32);
        }
    }

    /// Takes the head of the free list, growing first when it is empty.
    /// The slot is appended to the active list.
    pub(crate) fn acquire(&mut self) -> Result<u32, SchedulerError> {
        if self.free.is_empty() {
            self.grow()?;
        }
        let index = self.free.head;
        self.unlink(index, LinkKind::Main);
        self.push_back(ListId::Active, index);
        Ok(index)
    }

    /// Returns a slot to the head of the free list.
    pub(crate) fn release(&mut self, index: u32) {
        self.unlink(index, LinkKind::Main);
        self.push_front(ListId::Free, index);
    }

    pub(crate) fn fiber(&self, index: u32) -> &Fiber {
        &self.entries[index as usize].fiber
    }

    pub(crate) fn fiber_mut(&mut self, index: u32) -> &mut Fiber {
        &mut self.entries[index as usize].fiber
    }

    /// Maps a handle to its slot if the handle is still current.
    pub(crate) fn resolve(&self, handle: FiberHandle) -> Option<u32> {
        if handle.is_null() {
            return None;
        }
        self.entries
            .get(handle.index as usize)
            .filter(|entry| entry.fiber.handle == handle)
            .map(|_| handle.index)
    }

    /// Moves the slot into the tick list of `lane`.
    pub(crate) fn classify(&mut self, index: u32, lane: Lane) {
        self.unlink(index, LinkKind::Update);
        self.push_back(ListId::Update(lane), index);
        self.fiber_mut(index).lane = lane;
    }

    /// Moves the slot into the wait list of `phase`.
    pub(crate) fn enter_wait(&mut self, index: u32, phase: Phase) {
        self.unlink(index, LinkKind::Yield);
        self.push_back(ListId::Yield(phase), index);
        self.fiber_mut(index).wait_phase = Some(phase);
    }

    /// Removes the slot from its wait list, if any.
    pub(crate) fn leave_wait(&mut self, index: u32) {
        self.unlink(index, LinkKind::Yield);
        self.fiber_mut(index).wait_phase = None;
    }

    /// Removes the slot from its tick and wait lists.
    pub(crate) fn unclassify(&mut self, index: u32) {
        self.unlink(index, LinkKind::Update);
        self.leave_wait(index);
    }

    /// Flags the slot's tick and wait lists for a priority resort.
    pub(crate) fn mark_dirty(&mut self, index: u32) {
        for kind in [LinkKind::Update, LinkKind::Yield] {
            if let Some(id) = self.entries[index as usize].member[kind as usize] {
                self.list_mut(id).dirty = true;
            }
        }
    }

    /// Starts a new epoch. Slots enlisted from now on carry the returned value
    /// and are skipped by traversals that began with it.
    pub(crate) fn next_epoch(&mut self) -> u64 {
        self.epoch += 1;
        self.epoch
    }

    pub(crate) fn is_iterating(&self, id: ListId) -> bool {
        self.list(id).iterating > 0
    }

    pub(crate) fn is_empty(&self, id: ListId) -> bool {
        self.list(id).is_empty()
    }

    /// Pushes a traversal frame over `id` and returns its depth. A dirty list
    /// is resorted first unless another traversal is already walking it.
    pub(crate) fn begin_traversal(&mut self, id: ListId, epoch: u64) -> usize {
        let list = self.list(id);
        if list.dirty && list.iterating == 0 {
            self.resort(id);
        }
        let list = self.list_mut(id);
        list.iterating += 1;
        let frame = TraversalFrame {
            list: id,
            cursor: list.head,
            remaining: list.count,
            epoch,
        };
        self.frames.push(frame);
        log::trace!("Traversal of {id:?} started with {} slots.", frame.remaining);
        self.frames.len() - 1
    }

    /// Returns the next slot of the traversal at `depth`.
    pub(crate) fn traversal_next(&mut self, depth: usize) -> Option<u32> {
        loop {
            let frame = self.frames[depth];
            if frame.remaining == 0 || frame.cursor == NIL {
                return None;
            }
            let index = frame.cursor;
            let kind = frame.list.kind() as usize;
            let entry = &self.entries[index as usize];
            let next = entry.links[kind].next;
            let enlisted_after_start = entry.stamps[kind] >= frame.epoch;

            let frame = &mut self.frames[depth];
            frame.cursor = next;
            frame.remaining -= 1;
            if !enlisted_after_start {
                return Some(index);
            }
        }
    }

    /// Pops the traversal frame at `depth`.
    pub(crate) fn end_traversal(&mut self, depth: usize) {
        debug_assert_eq!(depth + 1, self.frames.len(), "traversals must nest");
        if let Some(frame) = self.frames.pop() {
            let list = self.list_mut(frame.list);
            list.iterating = list.iterating.saturating_sub(1);
        }
    }

    /// Walks a list without a traversal frame. The list must not be mutated
    /// while the iterator is alive, which the borrow guarantees.
    pub(crate) fn iter(&self, id: ListId) -> impl Iterator<Item = u32> + '_ {
        let kind = id.kind() as usize;
        let mut cursor = self.list(id).head;
        std::iter::from_fn(move || {
            if cursor == NIL {
                return None;
            }
            let index = cursor;
            cursor = self.entries[index as usize].links[kind].next;
            Some(index)
        })
    }

    fn list(&self, id: ListId) -> &List {
        match id {
            ListId::Free => &self.free,
            ListId::Active => &self.active,
            ListId::Update(lane) => &self.update[lane.index()],
            ListId::Yield(phase) => &self.waits[phase.index()],
        }
    }

    fn list_mut(&mut self, id: ListId) -> &mut List {
        match id {
            ListId::Free => &mut self.free,
            ListId::Active => &mut self.active,
            ListId::Update(lane) => &mut self.update[lane.index()],
            ListId::Yield(phase) => &mut self.waits[phase.index()],
        }
    }

    fn priority(&self, index: u32) -> i32 {
        self.entries[index as usize].fiber.priority
    }

    fn push_back(&mut self, id: ListId, index: u32) {
        let kind = id.kind() as usize;
        let tail = self.list(id).tail;
        let epoch = self.epoch;
        let priority = self.priority(index);

        let entry = &mut self.entries[index as usize];
        debug_assert!(entry.member[kind].is_none(), "slot {index} already listed");
        entry.links[kind] = Links {
            prev: tail,
            next: NIL,
        };
        entry.member[kind] = Some(id);
        entry.stamps[kind] = epoch;

        // Appending behind a lower priority breaks the descending order of a
        // tick or wait list.
        let out_of_order =
            id.kind() != LinkKind::Main && tail != NIL && self.priority(tail) < priority;
        if tail != NIL {
            self.entries[tail as usize].links[kind].next = index;
        }
        let list = self.list_mut(id);
        if tail == NIL {
            list.head = index;
        }
        list.tail = index;
        list.count += 1;
        list.dirty |= out_of_order;
    }

    fn push_front(&mut self, id: ListId, index: u32) {
        let kind = id.kind() as usize;
        let head = self.list(id).head;
        let epoch = self.epoch;

        let entry = &mut self.entries[index as usize];
        debug_assert!(entry.member[kind].is_none(), "slot {index} already listed");
        entry.links[kind] = Links {
            prev: NIL,
            next: head,
        };
        entry.member[kind] = Some(id);
        entry.stamps[kind] = epoch;

        if head != NIL {
            self.entries[head as usize].links[kind].prev = index;
        }
        let list = self.list_mut(id);
        if head == NIL {
            list.tail = index;
        }
        list.head = index;
        list.count += 1;
    }

    /// Removes the slot from whatever list its `kind` links thread it into,
    /// moving any traversal cursor parked on it to its successor.
    fn unlink(&mut self, index: u32, kind: LinkKind) {
        let k = kind as usize;
        let entry = &mut self.entries[index as usize];
        let Some(id) = entry.member[k].take() else {
            return;
        };
        let Links { prev, next } = std::mem::take(&mut entry.links[k]);

        for frame in self.frames.iter_mut() {
            if frame.list == id && frame.cursor == index {
                frame.cursor = next;
            }
        }

        if prev != NIL {
            self.entries[prev as usize].links[k].next = next;
        }
        if next != NIL {
            self.entries[next as usize].links[k].prev = prev;
        }
        let list = self.list_mut(id);
        if prev == NIL {
            list.head = next;
        }
        if next == NIL {
            list.tail = prev;
        }
        list.count -= 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_with(priorities: &[i32]) -> FiberTable {
        let mut table = FiberTable::new(4, 1024);
        for &priority in priorities {
            let index = table.acquire().expect("acquire should succeed");
            table.fiber_mut(index).priority = priority;
            table.classify(index, Lane::Tick(Phase::Update));
        }
        table
    }

    fn traverse(table: &mut FiberTable, id: ListId) -> Vec<u32> {
        let epoch = table.next_epoch();
        let depth = table.begin_traversal(id, epoch);
        let mut visited = Vec::new();
        while let Some(index) = table.traversal_next(depth) {
            visited.push(index);
        }
        table.end_traversal(depth);
        visited
    }

    const UPDATE: ListId = ListId::Update(Lane::Tick(Phase::Update));

    #[test]
    fn growth_doubles_and_preserves_free_order() {
        let mut table = FiberTable::new(2, 1024);
        assert_eq!(table.capacity(), 2);
        assert_eq!(table.acquire().ok(), Some(0));
        assert_eq!(table.acquire().ok(), Some(1));
        // Free list is empty now, the next acquire doubles.
        assert_eq!(table.acquire().ok(), Some(2));
        assert_eq!(table.capacity(), 4);
        assert_eq!(table.iter(ListId::Free).collect::<Vec<_>>(), vec![3]);
        assert_eq!(table.len(), 3);
    }

    #[test]
    fn release_is_lifo() {
        let mut table = FiberTable::new(4, 1024);
        let a = table.acquire().expect("acquire a");
        let b = table.acquire().expect("acquire b");
        table.release(a);
        table.release(b);
        assert_eq!(table.acquire().ok(), Some(b));
        assert_eq!(table.acquire().ok(), Some(a));
    }

    #[test]
    fn growth_past_max_capacity_fails() {
        let mut table = FiberTable::new(2, 3);
        table.acquire().expect("slot 0");
        table.acquire().expect("slot 1");
        table.acquire().expect("slot 2 after clamped growth");
        assert_eq!(table.capacity(), 3);
        match table.acquire() {
            Err(SchedulerError::CapacityExceeded { max, .. }) => assert_eq!(max, 3),
            other => panic!("expected a capacity error, got {other:?}"),
        }
    }

    #[test]
    fn traversal_resorts_dirty_list_stably() {
        let mut table = table_with(&[10, 5, 10, 5, 7]);
        assert_eq!(traverse(&mut table, UPDATE), vec![0, 2, 4, 1, 3]);
        // Clean lists are not reordered.
        assert_eq!(traverse(&mut table, UPDATE), vec![0, 2, 4, 1, 3]);
    }

    #[test]
    fn removal_of_cursor_slot_patches_traversal() {
        let mut table = table_with(&[0, 0, 0, 0]);
        let epoch = table.next_epoch();
        let depth = table.begin_traversal(UPDATE, epoch);
        assert_eq!(table.traversal_next(depth), Some(0));
        // Slot 1 is where the cursor is parked.
        table.unclassify(1);
        assert_eq!(table.traversal_next(depth), Some(2));
        table.unclassify(2);
        assert_eq!(table.traversal_next(depth), Some(3));
        assert_eq!(table.traversal_next(depth), None);
        table.end_traversal(depth);
        assert_eq!(table.iter(UPDATE).collect::<Vec<_>>(), vec![0, 3]);
    }

    #[test]
    fn slots_enlisted_during_traversal_are_not_visited() {
        let mut table = table_with(&[0, 0]);
        let epoch = table.next_epoch();
        let depth = table.begin_traversal(UPDATE, epoch);
        assert_eq!(table.traversal_next(depth), Some(0));
        // Slot 0 re-enters the list it is being walked from; a new slot joins.
        table.classify(0, Lane::Tick(Phase::Update));
        let late = table.acquire().expect("acquire");
        table.classify(late, Lane::Tick(Phase::Update));
        assert_eq!(table.traversal_next(depth), Some(1));
        assert_eq!(table.traversal_next(depth), None);
        table.end_traversal(depth);
        assert_eq!(traverse(&mut table, UPDATE), vec![1, 0, late]);
    }

    #[test]
    fn priority_change_marks_lists_dirty() {
        let mut table = table_with(&[1, 1]);
        table.enter_wait(1, Phase::LateUpdate);
        table.fiber_mut(1).priority = 9;
        table.mark_dirty(1);
        assert!(table.list(UPDATE).dirty);
        assert!(table.list(ListId::Yield(Phase::LateUpdate)).dirty);
        assert_eq!(traverse(&mut table, UPDATE), vec![1, 0]);
        table.leave_wait(1);
        assert!(table.is_empty(ListId::Yield(Phase::LateUpdate)));
        assert_eq!(table.fiber(1).wait_phase, None);
    }

    #[test]
    fn resolve_rejects_stale_handles() {
        let mut table = FiberTable::new(1, 8);
        let index = table.acquire().expect("acquire");
        let handle = FiberHandle::new(index, 1);
        table.fiber_mut(index).handle = handle;
        assert_eq!(table.resolve(handle), Some(index));
        assert_eq!(table.resolve(FiberHandle::new(index, 2)), None);
        assert_eq!(table.resolve(FiberHandle::NULL), None);
        assert_eq!(table.resolve(FiberHandle::new(99, 1)), None);
    }
}
