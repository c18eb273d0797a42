// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::runtime::fail::Fail;
use ::libc::c_int;
use ::std::{
    error,
    fmt,
    str::FromStr,
    sync::{
        atomic::{
            AtomicI64,
            Ordering,
        },
        Arc,
    },
};

//======================================================================================================================
// Constants
//======================================================================================================================

/// OpenSHMEM comparison constants accepted at the C boundary.
pub const SHMEM_CMP_EQ: c_int = 1;
pub const SHMEM_CMP_NE: c_int = 2;
pub const SHMEM_CMP_GT: c_int = 3;
pub const SHMEM_CMP_LE: c_int = 4;
pub const SHMEM_CMP_LT: c_int = 5;
pub const SHMEM_CMP_GE: c_int = 6;

//======================================================================================================================
// Structures
//======================================================================================================================

/// Identifier of a user-level thread, unique within its shepherd.
pub type ThreadId = u64;

/// Index of a shepherd.
pub type ShepherdId = usize;

/// Opaque handle the external threading runtime uses to resume a thread.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct WakeHandle(usize);

/// Why a thread is blocked. Declaration order breaks priority ties.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum BlockReason {
    /// Waiting for issued writes on its context to complete.
    Put,
    /// Waiting for issued reads on its context to complete.
    Get,
    /// Waiting for a memory location to satisfy a comparison.
    Wait,
}

/// Point-to-point synchronization comparators.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Comparator {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
}

/// Memory location a thread can wait on.
pub trait WaitTarget: Send + Sync {
    /// Loads the current value with acquire semantics.
    fn load(&self) -> i64;
}

/// Condition a WAIT-blocked thread is waiting for: `*target <comparator> value`.
#[derive(Clone)]
pub struct WaitCondition {
    target: Arc<dyn WaitTarget>,
    comparator: Comparator,
    value: i64,
}

/// Sentinel outcomes of a scheduling query. Valid results are thread ids and are never negative.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SchedulerStatus {
    /// Scheduling is not active or the identity capability is missing.
    Uninitialized,
    /// The caller's shepherd has no blocked threads.
    QueueEmpty,
    /// Not every thread of the caller's shepherd has registered yet.
    AllThreadsNotStarted,
    /// No other thread on the caller's shepherd can make progress.
    NoRunnableThreads,
}

/// Hint passed to the yield capability.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum YieldHint {
    /// Detection found a thread that may run now.
    CandidateRunnable,
    /// Nothing is known to be runnable; yield anyway so others can make progress.
    NothingRunnable,
}

/// Threading level the runtime was initialized with.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ThreadLevel {
    Single,
    Funneled,
    Serialized,
    Multiple,
}

//======================================================================================================================
// Associate Functions
//======================================================================================================================

impl BlockReason {
    /// All reasons, in declaration order.
    pub const ALL: [BlockReason; 3] = [BlockReason::Put, BlockReason::Get, BlockReason::Wait];

    /// Position of this reason in a priority table.
    pub fn index(self) -> usize {
        match self {
            BlockReason::Put => 0,
            BlockReason::Get => 1,
            BlockReason::Wait => 2,
        }
    }
}

impl Comparator {
    /// Evaluates `lhs <self> rhs`.
    pub fn compare(self, lhs: i64, rhs: i64) -> bool {
        match self {
            Comparator::Eq => lhs == rhs,
            Comparator::Ne => lhs != rhs,
            Comparator::Gt => lhs > rhs,
            Comparator::Ge => lhs >= rhs,
            Comparator::Lt => lhs < rhs,
            Comparator::Le => lhs <= rhs,
        }
    }
}

impl WaitCondition {
    pub fn new(target: Arc<dyn WaitTarget>, comparator: Comparator, value: i64) -> Self {
        Self {
            target,
            comparator,
            value,
        }
    }

    /// Loads the target and evaluates the comparison.
    pub fn is_satisfied(&self) -> bool {
        self.comparator.compare(self.target.load(), self.value)
    }
}

impl SchedulerStatus {
    /// Integer code reported through the C interface.
    pub fn code(self) -> c_int {
        match self {
            SchedulerStatus::Uninitialized => -1,
            SchedulerStatus::QueueEmpty => -2,
            SchedulerStatus::AllThreadsNotStarted => -3,
            SchedulerStatus::NoRunnableThreads => -4,
        }
    }
}

impl YieldHint {
    /// Integer code passed to C yield callbacks.
    pub fn code(self) -> c_int {
        match self {
            YieldHint::CandidateRunnable => 0,
            YieldHint::NothingRunnable => -1,
        }
    }
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

impl From<usize> for WakeHandle {
    fn from(value: usize) -> Self {
        Self(value)
    }
}

impl From<WakeHandle> for usize {
    fn from(value: WakeHandle) -> Self {
        value.0
    }
}

impl WaitTarget for AtomicI64 {
    fn load(&self) -> i64 {
        AtomicI64::load(self, Ordering::Acquire)
    }
}

impl fmt::Debug for WaitCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WaitCondition")
            .field("comparator", &self.comparator)
            .field("value", &self.value)
            .finish()
    }
}

impl TryFrom<c_int> for Comparator {
    type Error = Fail;

    fn try_from(value: c_int) -> Result<Self, Self::Error> {
        match value {
            SHMEM_CMP_EQ => Ok(Comparator::Eq),
            SHMEM_CMP_NE => Ok(Comparator::Ne),
            SHMEM_CMP_GT => Ok(Comparator::Gt),
            SHMEM_CMP_GE => Ok(Comparator::Ge),
            SHMEM_CMP_LT => Ok(Comparator::Lt),
            SHMEM_CMP_LE => Ok(Comparator::Le),
            _ => {
                let cause: String = format!("invalid comparator (cmp={:?})", value);
                error!("try_from(): {}", cause);
                Err(Fail::new(libc::EINVAL, &cause))
            },
        }
    }
}

impl fmt::Display for SchedulerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name: &str = match self {
            SchedulerStatus::Uninitialized => "uninitialized",
            SchedulerStatus::QueueEmpty => "queue empty",
            SchedulerStatus::AllThreadsNotStarted => "all threads not started",
            SchedulerStatus::NoRunnableThreads => "no runnable threads",
        };
        write!(f, "{} ({})", name, self.code())
    }
}

impl error::Error for SchedulerStatus {}

impl FromStr for ThreadLevel {
    type Err = Fail;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "single" => Ok(ThreadLevel::Single),
            "funneled" => Ok(ThreadLevel::Funneled),
            "serialized" => Ok(ThreadLevel::Serialized),
            "multiple" => Ok(ThreadLevel::Multiple),
            _ => Err(Fail::new(libc::EINVAL, &format!("unknown thread level (level={:?})", s))),
        }
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================
