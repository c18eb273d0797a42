// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Per-shepherd queue of blocked threads.
//!
//! Descriptors live in a [Slab] and are found by thread id through a side table. Queue order is a doubly-linked
//! list threaded through the slab slots, so lookup, move-to-tail and removal are constant time while iteration
//! still follows insertion (and re-insertion) order.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::runtime::scheduler::{
    descriptor::ThreadDescriptor,
    types::ThreadId,
};
use ::slab::Slab;
use ::std::collections::HashMap;

//======================================================================================================================
// Structures
//======================================================================================================================

struct Slot {
    descriptor: ThreadDescriptor,
    prev: Option<usize>,
    next: Option<usize>,
}

/// Ordered set of thread descriptors keyed by thread id.
#[derive(Default)]
pub struct WaitQueue {
    slots: Slab<Slot>,
    ids: HashMap<ThreadId, usize>,
    head: Option<usize>,
    tail: Option<usize>,
}

/// Iterator over descriptors in queue order.
pub struct Iter<'a> {
    queue: &'a WaitQueue,
    cursor: Option<usize>,
}

//======================================================================================================================
// Associate Functions
//======================================================================================================================

impl WaitQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn contains(&self, thread_id: ThreadId) -> bool {
        self.ids.contains_key(&thread_id)
    }

    pub fn get(&self, thread_id: ThreadId) -> Option<&ThreadDescriptor> {
        let key: usize = *self.ids.get(&thread_id)?;
        Some(&self.slots[key].descriptor)
    }

    pub fn get_mut(&mut self, thread_id: ThreadId) -> Option<&mut ThreadDescriptor> {
        let key: usize = *self.ids.get(&thread_id)?;
        Some(&mut self.slots[key].descriptor)
    }

    /// Appends a descriptor at the tail. Hands the descriptor back if its thread is already queued.
    pub fn push_back(&mut self, descriptor: ThreadDescriptor) -> Result<(), ThreadDescriptor> {
        let thread_id: ThreadId = descriptor.thread_id();
        if self.ids.contains_key(&thread_id) {
            return Err(descriptor);
        }
        let key: usize = self.slots.insert(Slot {
            descriptor,
            prev: None,
            next: None,
        });
        self.ids.insert(thread_id, key);
        self.link_back(key);
        Ok(())
    }

    /// Moves a queued thread to the tail. Returns false if the thread is not queued.
    pub fn move_to_back(&mut self, thread_id: ThreadId) -> bool {
        let Some(key) = self.ids.get(&thread_id).copied() else {
            return false;
        };
        if self.tail != Some(key) {
            self.unlink(key);
            self.link_back(key);
        }
        true
    }

    /// Removes a thread from the queue, returning its descriptor.
    pub fn remove(&mut self, thread_id: ThreadId) -> Option<ThreadDescriptor> {
        let key: usize = self.ids.remove(&thread_id)?;
        self.unlink(key);
        Some(self.slots.remove(key).descriptor)
    }

    /// Drops every descriptor.
    pub fn clear(&mut self) {
        self.slots.clear();
        self.ids.clear();
        self.head = None;
        self.tail = None;
    }

    pub fn iter(&self) -> Iter<'_> {
        Iter {
            queue: self,
            cursor: self.head,
        }
    }

    /// Visits every descriptor in queue order with mutable access.
    pub fn for_each_mut<F: FnMut(&mut ThreadDescriptor)>(&mut self, mut f: F) {
        let mut cursor: Option<usize> = self.head;
        while let Some(key) = cursor {
            let slot: &mut Slot = &mut self.slots[key];
            cursor = slot.next;
            f(&mut slot.descriptor);
        }
    }

    fn link_back(&mut self, key: usize) {
        self.slots[key].prev = self.tail;
        self.slots[key].next = None;
        match self.tail {
            Some(tail) => self.slots[tail].next = Some(key),
            None => self.head = Some(key),
        }
        self.tail = Some(key);
    }

    fn unlink(&mut self, key: usize) {
        let (prev, next): (Option<usize>, Option<usize>) = {
            let slot: &Slot = &self.slots[key];
            (slot.prev, slot.next)
        };
        match prev {
            Some(prev) => self.slots[prev].next = next,
            None => self.head = next,
        }
        match next {
            Some(next) => self.slots[next].prev = prev,
            None => self.tail = prev,
        }
        self.slots[key].prev = None;
        self.slots[key].next = None;
    }
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

impl<'a> Iterator for Iter<'a> {
    type Item = &'a ThreadDescriptor;

    fn next(&mut self) -> Option<Self::Item> {
        let key: usize = self.cursor?;
        let slot: &'a Slot = &self.queue.slots[key];
        self.cursor = slot.next;
        Some(&slot.descriptor)
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================
