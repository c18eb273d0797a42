// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Contract between the scheduler and the communication transport.
//!
//! The scheduler never moves data itself. It only needs to drive transport progress while a thread waits,
//! flush transport-level memory once a wait is satisfied, and read the per-context counters that tell whether the
//! puts and gets issued over a context have drained.

//======================================================================================================================
// Imports
//======================================================================================================================

use ::std::sync::atomic::{
    AtomicU64,
    Ordering,
};

//======================================================================================================================
// Traits
//======================================================================================================================

/// Progress and memory-visibility hooks provided by the transport.
pub trait Transport: Send + Sync {
    /// Advances transport progress without blocking.
    fn probe(&self);

    /// Makes memory changes performed by the transport visible to subsequent local loads.
    fn syncmem(&self) {}
}

/// Completion counters of a communication context.
pub trait ContextCounters: Send + Sync {
    fn issued_writes(&self) -> u64;
    fn completed_writes(&self) -> u64;
    fn issued_reads(&self) -> u64;
    fn completed_reads(&self) -> u64;

    /// Returns true if every write issued over this context has completed.
    fn writes_drained(&self) -> bool {
        self.issued_writes() == self.completed_writes()
    }

    /// Returns true if every read issued over this context has completed.
    fn reads_drained(&self) -> bool {
        self.issued_reads() == self.completed_reads()
    }
}

//======================================================================================================================
// Structures
//======================================================================================================================

/// Transport that has no progress engine of its own.
#[derive(Default, Debug, Clone, Copy)]
pub struct NullTransport;

/// Atomic issued/completed counters for a single context.
#[derive(Default, Debug)]
pub struct CompletionCounters {
    issued_writes: AtomicU64,
    completed_writes: AtomicU64,
    issued_reads: AtomicU64,
    completed_reads: AtomicU64,
}

/// Point-in-time copy of a context's counters.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterSnapshot {
    pub pending_put: u64,
    pub pending_get: u64,
    pub completed_put: u64,
    pub completed_get: u64,
}

//======================================================================================================================
// Associate Functions
//======================================================================================================================

impl CompletionCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that a write was handed to the transport.
    pub fn issue_write(&self) {
        self.issued_writes.fetch_add(1, Ordering::AcqRel);
    }

    /// Records that a previously issued write completed.
    pub fn complete_write(&self) {
        self.completed_writes.fetch_add(1, Ordering::AcqRel);
    }

    /// Records that a read was handed to the transport.
    pub fn issue_read(&self) {
        self.issued_reads.fetch_add(1, Ordering::AcqRel);
    }

    /// Records that a previously issued read completed.
    pub fn complete_read(&self) {
        self.completed_reads.fetch_add(1, Ordering::AcqRel);
    }

    /// Reads all counters. Issued counters are read after completed ones, so pending counts never go negative.
    pub fn snapshot(&self) -> CounterSnapshot {
        let completed_put: u64 = self.completed_writes();
        let completed_get: u64 = self.completed_reads();
        let issued_put: u64 = self.issued_writes();
        let issued_get: u64 = self.issued_reads();
        CounterSnapshot {
            pending_put: issued_put.saturating_sub(completed_put),
            pending_get: issued_get.saturating_sub(completed_get),
            completed_put,
            completed_get,
        }
    }
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

impl Transport for NullTransport {
    fn probe(&self) {}
}

impl ContextCounters for CompletionCounters {
    fn issued_writes(&self) -> u64 {
        self.issued_writes.load(Ordering::Acquire)
    }

    fn completed_writes(&self) -> u64 {
        self.completed_writes.load(Ordering::Acquire)
    }

    fn issued_reads(&self) -> u64 {
        self.issued_reads.load(Ordering::Acquire)
    }

    fn completed_reads(&self) -> u64 {
        self.completed_reads.load(Ordering::Acquire)
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================
