// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::runtime::{
    fail::Fail,
    scheduler::{
        descriptor::Blocker,
        policy::SchedulePolicy,
        scheduler::Scheduler,
        types::{
            BlockReason,
            Comparator,
            ThreadLevel,
            WaitCondition,
            WaitTarget,
            YieldHint,
        },
    },
    transport::ContextCounters,
};
use ::std::{
    hint,
    sync::{
        atomic::{
            self,
            Ordering,
        },
        Arc,
    },
};

//======================================================================================================================
// Associate Functions
//======================================================================================================================

impl Scheduler {
    /// Blocks the caller until `target <comparator> value` holds.
    pub fn wait_until(&self, target: Arc<dyn WaitTarget>, comparator: Comparator, value: i64) -> Result<(), Fail> {
        self.block_until(Blocker::Wait(WaitCondition::new(target, comparator, value)))
    }

    /// Blocks the caller until `target` no longer holds `value`.
    pub fn wait(&self, target: Arc<dyn WaitTarget>, value: i64) -> Result<(), Fail> {
        self.wait_until(target, Comparator::Ne, value)
    }

    /// Evaluates `target <comparator> value` once without blocking.
    pub fn test(&self, target: &dyn WaitTarget, comparator: Comparator, value: i64) -> bool {
        comparator.compare(target.load(), value)
    }

    /// Blocks the caller until every write (`Put`) or read (`Get`) issued over `context` has completed.
    pub fn wait_for_completion<C: ContextCounters + 'static>(
        &self,
        context: &Arc<C>,
        reason: BlockReason,
    ) -> Result<(), Fail> {
        let blocker: Blocker = match reason {
            BlockReason::Put => Blocker::put(context),
            BlockReason::Get => Blocker::get(context),
            BlockReason::Wait => {
                let cause: &str = "completion waits only apply to puts and gets";
                error!("wait_for_completion(): {}", cause);
                return Err(Fail::new(libc::EINVAL, cause));
            },
        };
        self.block_until(blocker)
    }

    /// Blocks the caller until both writes and reads issued over `context` have completed.
    pub fn quiet<C: ContextCounters + 'static>(&self, context: &Arc<C>) -> Result<(), Fail> {
        self.wait_for_completion(context, BlockReason::Put)?;
        self.wait_for_completion(context, BlockReason::Get)
    }

    fn block_until(&self, blocker: Blocker) -> Result<(), Fail> {
        if blocker.is_satisfied() {
            self.complete_wait();
            return Ok(());
        }

        let cooperative: bool = self.capabilities().is_complete()
            && self.capabilities().can_yield()
            && self.options().thread_level != ThreadLevel::Single;
        if !cooperative {
            warn!("block_until(): cannot cooperate, polling (reason={:?})", blocker.reason());
        }

        let mut enqueued: bool = false;
        loop {
            self.transport().probe();
            if blocker.is_satisfied() {
                break;
            }
            if !cooperative {
                hint::spin_loop();
                continue;
            }

            let yield_hint: YieldHint = if self.try_block(&blocker) {
                enqueued = true;
                match self.runnable_thread_exists() {
                    Ok(_) => YieldHint::CandidateRunnable,
                    Err(_) => YieldHint::NothingRunnable,
                }
            } else {
                YieldHint::NothingRunnable
            };
            self.capabilities().yield_now(yield_hint);
        }

        if enqueued {
            if let Err(e) = self.mark_resumed() {
                warn!("block_until(): failed to mark caller as resumed ({:?})", e);
            }
        }
        self.complete_wait();
        Ok(())
    }

    /// Records the caller as blocked. Returns false if the scheduler cannot track it.
    fn try_block(&self, blocker: &Blocker) -> bool {
        if self.options().policy == SchedulePolicy::None || !self.is_active() {
            return false;
        }
        match self.block_self(blocker.clone()) {
            Ok(()) => true,
            Err(e) => {
                trace!("try_block(): {:?}", e);
                false
            },
        }
    }

    fn complete_wait(&self) {
        atomic::fence(Ordering::AcqRel);
        self.transport().syncmem();
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================
