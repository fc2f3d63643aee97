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

//! Lazy priority resort of index-linked lists.

use super::list::{ListId, NIL};
use super::FiberTable;

impl FiberTable {
    /// Reorders a list by descending priority with a bottom-up merge sort over
    /// its links. Equal priorities keep their relative order.
    ///
    /// Runs in O(n log n) without allocating and clears the dirty flag.
    pub(super) fn resort(&mut self, id: ListId) {
        let kind = id.kind() as usize;
        let (count, first) = {
            let list = self.list(id);
            (list.count, list.head)
        };
        if count < 2 {
            self.list_mut(id).dirty = false;
            return;
        }

        let mut head = first;
        let mut tail;
        let mut width = 1usize;
        loop {
            let mut left = head;
            head = NIL;
            tail = NIL;
            let mut merges = 0usize;

            while left != NIL {
                merges += 1;

                // Split off a left run of up to `width` slots.
                let mut right = left;
                let mut left_len = 0usize;
                while left_len < width && right != NIL {
                    left_len += 1;
                    right = self.entries[right as usize].links[kind].next;
                }
                let mut right_len = width;

                while left_len > 0 || (right_len > 0 && right != NIL) {
                    // Ties take from the left run, which keeps the sort stable.
                    let take_left = if left_len == 0 {
                        false
                    } else if right_len == 0 || right == NIL {
                        true
                    } else {
                        self.priority(left) >= self.priority(right)
                    };

                    let picked = if take_left {
                        let picked = left;
                        left = self.entries[left as usize].links[kind].next;
                        left_len -= 1;
                        picked
                    } else {
                        let picked = right;
                        right = self.entries[right as usize].links[kind].next;
                        right_len -= 1;
                        picked
                    };

                    if tail == NIL {
                        head = picked;
                    } else {
                        self.entries[tail as usize].links[kind].next = picked;
                    }
                    self.entries[picked as usize].links[kind].prev = tail;
                    tail = picked;
                }

                left = right;
            }

            self.entries[tail as usize].links[kind].next = NIL;
            if merges <= 1 {
                break;
            }
            width *= 2;
        }

        let list = self.list_mut(id);
        list.head = head;
        list.tail = tail;
        list.dirty = false;
    }
}
