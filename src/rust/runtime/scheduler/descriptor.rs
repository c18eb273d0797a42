// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::runtime::{
    scheduler::types::{
        BlockReason,
        ThreadId,
        WaitCondition,
        WakeHandle,
    },
    transport::ContextCounters,
};
use ::std::sync::{
    Arc,
    Weak,
};

//======================================================================================================================
// Structures
//======================================================================================================================

/// What a blocked thread is waiting for.
#[derive(Clone, Debug)]
pub enum Blocker {
    /// Outstanding writes on a context. The context is not kept alive by the waiter.
    Put(Weak<dyn ContextCounters>),
    /// Outstanding reads on a context.
    Get(Weak<dyn ContextCounters>),
    /// A memory location reaching a value.
    Wait(WaitCondition),
}

/// Record of a thread blocked on its shepherd.
#[derive(Debug)]
pub struct ThreadDescriptor {
    thread_id: ThreadId,
    wake_handle: WakeHandle,
    blocker: Blocker,
    is_waiting: bool,
    is_runnable: bool,
}

//======================================================================================================================
// Associate Functions
//======================================================================================================================

impl Blocker {
    /// Blocks on the writes issued over `context`.
    pub fn put<C: ContextCounters + 'static>(context: &Arc<C>) -> Self {
        let weak: Weak<C> = Arc::downgrade(context);
        Blocker::Put(weak)
    }

    /// Blocks on the reads issued over `context`.
    pub fn get<C: ContextCounters + 'static>(context: &Arc<C>) -> Self {
        let weak: Weak<C> = Arc::downgrade(context);
        Blocker::Get(weak)
    }

    pub fn reason(&self) -> BlockReason {
        match self {
            Blocker::Put(_) => BlockReason::Put,
            Blocker::Get(_) => BlockReason::Get,
            Blocker::Wait(_) => BlockReason::Wait,
        }
    }

    /// Checks whether the blocked operation can now make progress. A context that has been destroyed has nothing
    /// left in flight.
    pub fn is_satisfied(&self) -> bool {
        match self {
            Blocker::Put(context) => context.upgrade().map_or(true, |c| c.writes_drained()),
            Blocker::Get(context) => context.upgrade().map_or(true, |c| c.reads_drained()),
            Blocker::Wait(condition) => condition.is_satisfied(),
        }
    }
}

impl ThreadDescriptor {
    /// Creates the descriptor of a thread that has just blocked.
    pub fn new(thread_id: ThreadId, wake_handle: WakeHandle, blocker: Blocker) -> Self {
        Self {
            thread_id,
            wake_handle,
            blocker,
            is_waiting: true,
            is_runnable: false,
        }
    }

    pub fn thread_id(&self) -> ThreadId {
        self.thread_id
    }

    pub fn wake_handle(&self) -> WakeHandle {
        self.wake_handle
    }

    pub fn reason(&self) -> BlockReason {
        self.blocker.reason()
    }

    pub fn blocker(&self) -> &Blocker {
        &self.blocker
    }

    pub fn is_waiting(&self) -> bool {
        self.is_waiting
    }

    pub fn is_runnable(&self) -> bool {
        self.is_runnable
    }

    /// Re-blocks this thread on a new operation.
    pub fn block(&mut self, blocker: Blocker) {
        self.blocker = blocker;
        self.is_waiting = true;
        self.is_runnable = false;
    }

    /// Marks this thread as able to make progress. Only waiting threads can become runnable.
    pub fn set_runnable(&mut self, runnable: bool) {
        self.is_runnable = runnable && self.is_waiting;
    }

    /// Marks this thread as resumed.
    pub fn resume(&mut self) {
        self.is_waiting = false;
        self.is_runnable = false;
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================
