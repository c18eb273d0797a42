// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Scheduling state of a single shepherd.
//!
//! Only threads running on a shepherd touch its state, and exactly one of them runs at a time, so every operation
//! here is a plain synchronous decision: the state never blocks and never resumes anybody.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::runtime::{
    fail::Fail,
    scheduler::{
        descriptor::{
            Blocker,
            ThreadDescriptor,
        },
        policy::SchedulePolicy,
        queue::WaitQueue,
        types::{
            BlockReason,
            SchedulerStatus,
            ShepherdId,
            ThreadId,
            WakeHandle,
        },
    },
};
use ::rand::{
    rngs::SmallRng,
    Rng,
};
use ::std::collections::HashSet;

//======================================================================================================================
// Structures
//======================================================================================================================

/// Outcome of a scheduling decision: the chosen thread or a sentinel status.
pub type Decision<T> = Result<T, SchedulerStatus>;

/// Blocked threads, runnable bookkeeping and attendance of one shepherd.
pub struct ShepherdState {
    id: ShepherdId,
    queue: WaitQueue,
    /// Number of descriptors in `queue` marked runnable.
    runnable_count: usize,
    /// Runnable descriptor picked by the last detection pass.
    next_runnable: Option<ThreadId>,
    /// Threads that announced themselves on this shepherd.
    attendance: HashSet<ThreadId>,
    /// Number of threads expected to announce themselves.
    capacity: usize,
    /// Sticky once every expected thread has shown up.
    all_started: bool,
    rng: SmallRng,
}

//======================================================================================================================
// Associate Functions
//======================================================================================================================

impl ShepherdState {
    pub fn new(id: ShepherdId, capacity: usize, rng: SmallRng) -> Self {
        Self {
            id,
            queue: WaitQueue::new(),
            runnable_count: 0,
            next_runnable: None,
            attendance: HashSet::with_capacity(capacity),
            capacity,
            all_started: false,
            rng,
        }
    }

    pub fn id(&self) -> ShepherdId {
        self.id
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn contains(&self, thread_id: ThreadId) -> bool {
        self.queue.contains(thread_id)
    }

    #[cfg(test)]
    pub fn descriptor(&self, thread_id: ThreadId) -> Option<&ThreadDescriptor> {
        self.queue.get(thread_id)
    }

    pub fn runnable_count(&self) -> usize {
        self.runnable_count
    }

    #[cfg(test)]
    pub fn next_runnable(&self) -> Option<ThreadId> {
        self.next_runnable
    }

    #[cfg(test)]
    pub fn attendance(&self) -> usize {
        self.attendance.len()
    }

    #[cfg(test)]
    pub fn all_started(&self) -> bool {
        self.all_started
    }

    /// Thread ids in queue order.
    pub fn queued_threads(&self) -> Vec<ThreadId> {
        self.queue.iter().map(|d| d.thread_id()).collect()
    }

    /// Renders the queue as `a->b->c->` for verbose logs.
    pub fn render(&self) -> String {
        self.queue.iter().map(|d| format!("{}->", d.thread_id())).collect()
    }

    /// Records that `thread_id` runs on this shepherd. Returns false if the shepherd is already full.
    pub fn register(&mut self, thread_id: ThreadId) -> bool {
        if !self.attendance.contains(&thread_id) {
            if self.attendance.len() >= self.capacity {
                return false;
            }
            self.attendance.insert(thread_id);
        }
        if self.attendance.len() == self.capacity {
            self.all_started = true;
        }
        true
    }

    /// Queues a newly blocked thread, or re-blocks a queued one and moves it to the tail. The wake handle is only
    /// needed for threads that are not queued yet.
    pub fn enqueue_or_update(
        &mut self,
        thread_id: ThreadId,
        blocker: Blocker,
        wake_handle: Option<WakeHandle>,
    ) -> Result<(), Fail> {
        if let Some(descriptor) = self.queue.get_mut(thread_id) {
            if descriptor.is_runnable() {
                self.runnable_count -= 1;
            }
            descriptor.block(blocker);
            if self.next_runnable == Some(thread_id) {
                self.next_runnable = None;
            }
            self.queue.move_to_back(thread_id);
            return Ok(());
        }

        let Some(wake_handle) = wake_handle else {
            let cause: String = format!("no wake handle for new thread (tid={:?})", thread_id);
            error!("enqueue_or_update(): {}", cause);
            return Err(Fail::new(libc::EINVAL, &cause));
        };
        if self.queue.push_back(ThreadDescriptor::new(thread_id, wake_handle, blocker)).is_err() {
            let cause: String = format!("thread already queued (tid={:?})", thread_id);
            error!("enqueue_or_update(): {}", cause);
            return Err(Fail::new(libc::EEXIST, &cause));
        }
        Ok(())
    }

    /// Drops the descriptor of a departing thread. Returns false if it was not queued.
    pub fn remove(&mut self, thread_id: ThreadId) -> bool {
        match self.queue.remove(thread_id) {
            Some(descriptor) => {
                if descriptor.is_runnable() {
                    self.runnable_count -= 1;
                }
                if self.next_runnable == Some(thread_id) {
                    self.next_runnable = None;
                }
                true
            },
            None => false,
        }
    }

    /// Marks a thread whose wait completed as no longer waiting.
    pub fn mark_resumed(&mut self, thread_id: ThreadId) {
        if let Some(descriptor) = self.queue.get_mut(thread_id) {
            if descriptor.is_runnable() {
                self.runnable_count -= 1;
            }
            descriptor.resume();
            if self.next_runnable == Some(thread_id) {
                self.next_runnable = None;
            }
        }
    }

    /// Drops every descriptor and resets the counters. Attendance is kept.
    pub fn clear(&mut self) {
        self.queue.clear();
        self.runnable_count = 0;
        self.next_runnable = None;
    }

    /// Looks for a thread other than `caller` that can make progress.
    pub fn detect(&mut self, caller: ThreadId, policy: SchedulePolicy, vip: Option<BlockReason>) -> Decision<ThreadId> {
        self.check_preconditions()?;
        match policy {
            SchedulePolicy::Auto => self.detect_auto(caller, vip),
            SchedulePolicy::Fifo | SchedulePolicy::Random => self
                .first_waiting(caller)
                .ok_or(SchedulerStatus::NoRunnableThreads),
            SchedulePolicy::None => Err(SchedulerStatus::NoRunnableThreads),
        }
    }

    /// Picks the thread that should run after `caller` and returns how to wake it.
    pub fn select(
        &mut self,
        caller: ThreadId,
        policy: SchedulePolicy,
        vip: Option<BlockReason>,
    ) -> Decision<(WakeHandle, ThreadId)> {
        self.check_preconditions()?;
        let thread_id: ThreadId = match policy {
            SchedulePolicy::Auto => return self.select_auto(caller, vip),
            SchedulePolicy::Fifo => self.first_waiting(caller),
            SchedulePolicy::Random => self.random_waiting(caller),
            SchedulePolicy::None => None,
        }
        .ok_or(SchedulerStatus::NoRunnableThreads)?;
        let descriptor: &ThreadDescriptor = self
            .queue
            .get(thread_id)
            .ok_or(SchedulerStatus::NoRunnableThreads)?;
        Ok((descriptor.wake_handle(), thread_id))
    }

    fn check_preconditions(&self) -> Decision<()> {
        // Waking a sleeper before everybody has started may leave nobody to schedule the rest.
        if !self.all_started {
            return Err(SchedulerStatus::AllThreadsNotStarted);
        }
        if self.queue.is_empty() {
            return Err(SchedulerStatus::QueueEmpty);
        }
        Ok(())
    }

    fn detect_auto(&mut self, caller: ThreadId, vip: Option<BlockReason>) -> Decision<ThreadId> {
        if self.runnable_count > 1 {
            if let Some(thread_id) = self.cached_candidate(caller, vip) {
                return Ok(thread_id);
            }
            if let Some(thread_id) = self.first_runnable(caller, vip) {
                self.next_runnable = Some(thread_id);
                return Ok(thread_id);
            }
        }

        self.refresh_runnable(caller);
        match self.first_runnable(caller, vip) {
            Some(thread_id) => {
                self.next_runnable = Some(thread_id);
                Ok(thread_id)
            },
            None => {
                self.next_runnable = None;
                Err(SchedulerStatus::NoRunnableThreads)
            },
        }
    }

    fn select_auto(&mut self, caller: ThreadId, vip: Option<BlockReason>) -> Decision<(WakeHandle, ThreadId)> {
        let thread_id: ThreadId = match self.cached_candidate(caller, None) {
            Some(thread_id) => thread_id,
            None => self
                .first_runnable(caller, vip)
                .ok_or(SchedulerStatus::NoRunnableThreads)?,
        };
        let descriptor: &mut ThreadDescriptor = self
            .queue
            .get_mut(thread_id)
            .ok_or(SchedulerStatus::NoRunnableThreads)?;
        descriptor.resume();
        let wake_handle: WakeHandle = descriptor.wake_handle();
        self.runnable_count -= 1;
        self.next_runnable = None;
        Ok((wake_handle, thread_id))
    }

    /// Returns the cached candidate if it is still runnable, is not `caller`, and matches `vip` when given.
    fn cached_candidate(&self, caller: ThreadId, vip: Option<BlockReason>) -> Option<ThreadId> {
        let thread_id: ThreadId = self.next_runnable.filter(|thread_id| *thread_id != caller)?;
        let descriptor: &ThreadDescriptor = self.queue.get(thread_id)?;
        if !descriptor.is_runnable() {
            return None;
        }
        match vip {
            Some(reason) if descriptor.reason() != reason => None,
            _ => Some(thread_id),
        }
    }

    /// First runnable thread other than `caller` with the VIP reason, falling back to the first runnable one.
    fn first_runnable(&self, caller: ThreadId, vip: Option<BlockReason>) -> Option<ThreadId> {
        let mut first: Option<ThreadId> = None;
        for descriptor in self.queue.iter() {
            if descriptor.thread_id() == caller || !descriptor.is_runnable() {
                continue;
            }
            if vip == Some(descriptor.reason()) {
                return Some(descriptor.thread_id());
            }
            if first.is_none() {
                first = Some(descriptor.thread_id());
            }
        }
        first
    }

    /// Re-evaluates the wait condition of every waiting thread other than `caller` and recounts runnable threads.
    fn refresh_runnable(&mut self, caller: ThreadId) {
        let mut runnable_count: usize = 0;
        self.queue.for_each_mut(|descriptor| {
            if descriptor.thread_id() != caller && descriptor.is_waiting() {
                let ready: bool = descriptor.blocker().is_satisfied();
                descriptor.set_runnable(ready);
            }
            if descriptor.is_runnable() {
                runnable_count += 1;
            }
        });
        self.runnable_count = runnable_count;
    }

    fn first_waiting(&self, caller: ThreadId) -> Option<ThreadId> {
        self.queue
            .iter()
            .find(|d| d.thread_id() != caller && d.is_waiting())
            .map(|d| d.thread_id())
    }

    fn random_waiting(&mut self, caller: ThreadId) -> Option<ThreadId> {
        let candidates: usize = self
            .queue
            .iter()
            .filter(|d| d.thread_id() != caller && d.is_waiting())
            .count();
        if candidates == 0 {
            return None;
        }
        let index: usize = self.rng.gen_range(0..candidates);
        self.queue
            .iter()
            .filter(|d| d.thread_id() != caller && d.is_waiting())
            .nth(index)
            .map(|d| d.thread_id())
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================
