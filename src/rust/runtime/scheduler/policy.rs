// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::runtime::{
    fail::Fail,
    scheduler::types::BlockReason,
};
use ::std::{
    fmt,
    str::FromStr,
};

//======================================================================================================================
// Structures
//======================================================================================================================

/// How the next thread to run is chosen.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Default)]
pub enum SchedulePolicy {
    /// Head of the wait queue.
    Fifo,
    /// Uniformly random queued thread.
    Random,
    /// Runnable threads only, preferring the VIP reason.
    #[default]
    Auto,
    /// Cooperative scheduling disabled.
    None,
}

/// Priority of each block reason, indexed by [BlockReason::index]. Larger values win.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Default)]
pub struct PriorityTable([i32; 3]);

//======================================================================================================================
// Associate Functions
//======================================================================================================================

impl PriorityTable {
    pub fn new(put: i32, get: i32, wait: i32) -> Self {
        Self([put, get, wait])
    }

    pub fn priority(&self, reason: BlockReason) -> i32 {
        self.0[reason.index()]
    }

    /// Derives the reason that receives scheduling preference. A table where every reason has the same priority
    /// expresses no preference. Ties for the highest priority go to the reason declared first.
    pub fn vip(&self) -> Option<BlockReason> {
        if self.0.iter().all(|p| *p == self.0[0]) {
            return None;
        }
        let mut vip: BlockReason = BlockReason::Put;
        for reason in BlockReason::ALL {
            if self.priority(reason) > self.priority(vip) {
                vip = reason;
            }
        }
        Some(vip)
    }
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

impl From<[i32; 3]> for PriorityTable {
    fn from(value: [i32; 3]) -> Self {
        Self(value)
    }
}

impl FromStr for SchedulePolicy {
    type Err = Fail;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fifo" => Ok(SchedulePolicy::Fifo),
            "random" => Ok(SchedulePolicy::Random),
            "auto" => Ok(SchedulePolicy::Auto),
            "none" => Ok(SchedulePolicy::None),
            _ => Err(Fail::new(libc::EINVAL, &format!("unknown schedule policy (policy={:?})", s))),
        }
    }
}

impl fmt::Display for SchedulePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name: &str = match self {
            SchedulePolicy::Fifo => "fifo",
            SchedulePolicy::Random => "random",
            SchedulePolicy::Auto => "auto",
            SchedulePolicy::None => "none",
        };
        write!(f, "{}", name)
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================
