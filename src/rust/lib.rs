// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Cooperative scheduling of user-level threads that block inside communication calls.
//!
//! Threads that would otherwise spin on a remote completion or a memory condition record why they are blocked
//! and yield to the threading runtime, which asks the scheduler which thread of the same shepherd should run next.

#![cfg_attr(feature = "strict", deny(warnings))]
#![deny(clippy::all)]

#[macro_use]
extern crate log;

pub mod runtime;
pub mod shmemx;

pub use self::runtime::{
    fail::Fail,
    scheduler::{
        BlockReason,
        Blocker,
        CapabilityRegistry,
        Comparator,
        Decision,
        PriorityTable,
        SchedulePolicy,
        Scheduler,
        SchedulerConfig,
        SchedulerOptions,
        SchedulerStatus,
        ShepherdId,
        ThreadId,
        ThreadLevel,
        UltCapabilities,
        WaitCondition,
        WaitTarget,
        WakeHandle,
        YieldHint,
    },
    transport::{
        CompletionCounters,
        ContextCounters,
        CounterSnapshot,
        NullTransport,
        Transport,
    },
};
pub use self::shmemx::config::Config;

//======================================================================================================================
// Macros
//======================================================================================================================

/// Ensures that two expressions are equal, bailing out of the enclosing `anyhow` function otherwise.
#[macro_export]
macro_rules! ensure_eq {
    ($left:expr, $right:expr $(,)?) => {
        match (&$left, &$right) {
            (left_val, right_val) => {
                if !(*left_val == *right_val) {
                    anyhow::bail!(
                        "ensure failed: `(left == right)` left: `{:?}`, right: `{:?}` at {}:{}",
                        left_val,
                        right_val,
                        file!(),
                        line!()
                    );
                }
            },
        }
    };
}

/// Ensures that two expressions are not equal, bailing out of the enclosing `anyhow` function otherwise.
#[macro_export]
macro_rules! ensure_neq {
    ($left:expr, $right:expr $(,)?) => {
        match (&$left, &$right) {
            (left_val, right_val) => {
                if *left_val == *right_val {
                    anyhow::bail!(
                        "ensure failed: `(left != right)` left: `{:?}`, right: `{:?}` at {}:{}",
                        left_val,
                        right_val,
                        file!(),
                        line!()
                    );
                }
            },
        }
    };
}
