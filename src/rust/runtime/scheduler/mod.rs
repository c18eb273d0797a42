// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

mod descriptor;
mod queue;
mod shepherd;
mod wait;

//======================================================================================================================
// Exports
//======================================================================================================================

pub mod capabilities;
pub mod policy;
pub mod scheduler;
pub mod types;

pub use self::{
    capabilities::{
        CapabilityRegistry,
        UltCapabilities,
    },
    descriptor::Blocker,
    policy::{
        PriorityTable,
        SchedulePolicy,
    },
    scheduler::{
        Scheduler,
        SchedulerConfig,
        SchedulerOptions,
    },
    shepherd::Decision,
    types::{
        BlockReason,
        Comparator,
        SchedulerStatus,
        ShepherdId,
        ThreadId,
        ThreadLevel,
        WaitCondition,
        WaitTarget,
        WakeHandle,
        YieldHint,
    },
};
