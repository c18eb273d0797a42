// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

mod common;

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::common::SimulatedRuntime;
use ::anyhow::Result;
use ::shmem_ult::{
    Blocker,
    Comparator,
    CompletionCounters,
    NullTransport,
    PriorityTable,
    SchedulePolicy,
    Scheduler,
    SchedulerOptions,
    SchedulerStatus,
    ThreadId,
    WaitCondition,
    WakeHandle,
};
use ::std::{
    collections::HashSet,
    sync::{
        atomic::{
            AtomicI64,
            Ordering,
        },
        Arc,
    },
};

//======================================================================================================================
// Helpers
//======================================================================================================================

fn new_scheduler(policy: SchedulePolicy) -> (Arc<SimulatedRuntime>, Scheduler) {
    let runtime: Arc<SimulatedRuntime> = Arc::new(SimulatedRuntime::new());
    let options: SchedulerOptions = SchedulerOptions {
        policy,
        random_seed: Some(0x5eed),
        ..SchedulerOptions::default()
    };
    let scheduler: Scheduler = Scheduler::new(runtime.clone(), Arc::new(NullTransport), options);
    (runtime, scheduler)
}

/// Registers `threads` on shepherd 0.
fn register_all(runtime: &SimulatedRuntime, scheduler: &Scheduler, threads: &[ThreadId]) -> Result<()> {
    for thread_id in threads {
        runtime.switch_to(0, *thread_id);
        if let Err(e) = scheduler.register_self() {
            anyhow::bail!("failed to register thread {}: {:?}", thread_id, e);
        }
    }
    Ok(())
}

/// Blocks `thread_id` of shepherd 0 on `blocker`.
fn block(runtime: &SimulatedRuntime, scheduler: &Scheduler, thread_id: ThreadId, blocker: Blocker) -> Result<()> {
    runtime.switch_to(0, thread_id);
    match scheduler.block_self(blocker) {
        Ok(()) => Ok(()),
        Err(e) => anyhow::bail!("failed to block thread {}: {:?}", thread_id, e),
    }
}

fn wait_on(flag: &Arc<AtomicI64>, value: i64) -> Blocker {
    Blocker::Wait(WaitCondition::new(flag.clone(), Comparator::Eq, value))
}

//======================================================================================================================
// Tests
//======================================================================================================================

/// Three threads block on a pending put, an unmet wait and a met wait. The met wait is detected, selected and
/// popped, and no other thread is left runnable.
#[test]
fn end_to_end_prefers_satisfied_wait() -> Result<()> {
    let (runtime, scheduler) = new_scheduler(SchedulePolicy::Auto);
    scheduler.init(1, 3, Some(PriorityTable::new(0, 0, 2)));
    register_all(&runtime, &scheduler, &[1, 2, 3])?;

    let counters: Arc<CompletionCounters> = Arc::new(CompletionCounters::new());
    counters.issue_write();
    let unmet: Arc<AtomicI64> = Arc::new(AtomicI64::new(0));
    let met: Arc<AtomicI64> = Arc::new(AtomicI64::new(1));
    block(&runtime, &scheduler, 1, Blocker::put(&counters))?;
    block(&runtime, &scheduler, 2, wait_on(&unmet, 1))?;
    block(&runtime, &scheduler, 3, wait_on(&met, 1))?;

    runtime.switch_to(0, 1);
    shmem_ult::ensure_eq!(scheduler.runnable_thread_exists(), Ok(3));
    shmem_ult::ensure_eq!(scheduler.runnable_count(0), Some(1));
    shmem_ult::ensure_eq!(
        scheduler.get_next_thread(),
        Ok((SimulatedRuntime::handle_of(3), 3))
    );
    shmem_ult::ensure_eq!(scheduler.runnable_count(0), Some(0));
    shmem_ult::ensure_eq!(scheduler.get_next_thread(), Err(SchedulerStatus::NoRunnableThreads));
    Ok(())
}

/// With GET prioritized over PUT, a runnable GET waiter wins over an earlier runnable PUT waiter.
#[test]
fn vip_reason_wins_over_queue_order() -> Result<()> {
    let (runtime, scheduler) = new_scheduler(SchedulePolicy::Auto);
    scheduler.init(1, 3, Some(PriorityTable::new(1, 2, 0)));
    register_all(&runtime, &scheduler, &[1, 2, 3])?;

    let counters: Arc<CompletionCounters> = Arc::new(CompletionCounters::new());
    block(&runtime, &scheduler, 1, Blocker::put(&counters))?;
    block(&runtime, &scheduler, 2, Blocker::get(&counters))?;

    runtime.switch_to(0, 3);
    shmem_ult::ensure_eq!(scheduler.runnable_thread_exists(), Ok(2));
    shmem_ult::ensure_eq!(scheduler.runnable_count(0), Some(2));
    shmem_ult::ensure_eq!(scheduler.get_next_thread().map(|(_, tid)| tid), Ok(2));

    // The PUT waiter is next once the GET waiter is gone.
    shmem_ult::ensure_eq!(scheduler.get_next_thread().map(|(_, tid)| tid), Ok(1));
    Ok(())
}

/// A PUT waiter turns runnable on the first detection pass after its writes drain.
#[test]
fn drained_put_becomes_runnable() -> Result<()> {
    let (runtime, scheduler) = new_scheduler(SchedulePolicy::Auto);
    scheduler.init(1, 2, None);
    register_all(&runtime, &scheduler, &[1, 2])?;

    let counters: Arc<CompletionCounters> = Arc::new(CompletionCounters::new());
    counters.issue_write();
    counters.issue_write();
    block(&runtime, &scheduler, 1, Blocker::put(&counters))?;

    runtime.switch_to(0, 2);
    counters.complete_write();
    shmem_ult::ensure_eq!(scheduler.runnable_thread_exists(), Err(SchedulerStatus::NoRunnableThreads));
    counters.complete_write();
    shmem_ult::ensure_eq!(scheduler.runnable_thread_exists(), Ok(1));
    Ok(())
}

/// Nothing is scheduled until every thread of the shepherd has registered.
#[test]
fn decisions_wait_for_full_attendance() -> Result<()> {
    let (runtime, scheduler) = new_scheduler(SchedulePolicy::Auto);
    let ready: Arc<AtomicI64> = Arc::new(AtomicI64::new(1));
    scheduler.init(1, 3, None);
    register_all(&runtime, &scheduler, &[1, 2])?;
    block(&runtime, &scheduler, 1, wait_on(&ready, 1))?;

    runtime.switch_to(0, 2);
    shmem_ult::ensure_eq!(scheduler.runnable_thread_exists(), Err(SchedulerStatus::AllThreadsNotStarted));
    shmem_ult::ensure_eq!(scheduler.get_next_thread(), Err(SchedulerStatus::AllThreadsNotStarted));

    // Re-registering does not count twice.
    scheduler.register_self()?;
    shmem_ult::ensure_eq!(scheduler.runnable_thread_exists(), Err(SchedulerStatus::AllThreadsNotStarted));

    register_all(&runtime, &scheduler, &[3])?;
    shmem_ult::ensure_eq!(scheduler.runnable_thread_exists(), Ok(1));
    Ok(())
}

#[test]
fn empty_queue_is_reported() -> Result<()> {
    let (runtime, scheduler) = new_scheduler(SchedulePolicy::Auto);
    shmem_ult::ensure_eq!(scheduler.runnable_thread_exists(), Err(SchedulerStatus::Uninitialized));
    scheduler.init(1, 1, None);
    register_all(&runtime, &scheduler, &[1])?;
    shmem_ult::ensure_eq!(scheduler.runnable_thread_exists(), Err(SchedulerStatus::QueueEmpty));
    shmem_ult::ensure_eq!(scheduler.get_next_thread(), Err(SchedulerStatus::QueueEmpty));
    shmem_ult::ensure_eq!(SchedulerStatus::QueueEmpty.code(), -2);
    Ok(())
}

/// Each shepherd only ever sees its own threads.
#[test]
fn shepherds_are_isolated() -> Result<()> {
    let (runtime, scheduler) = new_scheduler(SchedulePolicy::Auto);
    let ready: Arc<AtomicI64> = Arc::new(AtomicI64::new(1));
    scheduler.init(2, 4, None);
    for (shepherd, thread_id) in [(0, 1), (0, 2), (1, 3), (1, 4)] {
        runtime.switch_to(shepherd, thread_id);
        scheduler.register_self()?;
    }
    runtime.switch_to(0, 1);
    scheduler.block_self(wait_on(&ready, 1))?;

    runtime.switch_to(1, 3);
    shmem_ult::ensure_eq!(scheduler.runnable_thread_exists(), Err(SchedulerStatus::QueueEmpty));
    runtime.switch_to(0, 2);
    shmem_ult::ensure_eq!(scheduler.runnable_thread_exists(), Ok(1));
    Ok(())
}

/// Re-blocking moves a thread behind the others, so FIFO picks the longest waiter without popping it.
#[test]
fn fifo_follows_reblock_order() -> Result<()> {
    let (runtime, scheduler) = new_scheduler(SchedulePolicy::Fifo);
    let flag: Arc<AtomicI64> = Arc::new(AtomicI64::new(0));
    scheduler.init(1, 4, None);
    register_all(&runtime, &scheduler, &[1, 2, 3, 4])?;
    for thread_id in 1..=3 {
        block(&runtime, &scheduler, thread_id, wait_on(&flag, 1))?;
    }
    block(&runtime, &scheduler, 1, wait_on(&flag, 2))?;
    shmem_ult::ensure_eq!(scheduler.queued_threads(0), Some(vec![2, 3, 1]));

    runtime.switch_to(0, 4);
    shmem_ult::ensure_eq!(scheduler.runnable_thread_exists(), Ok(2));
    shmem_ult::ensure_eq!(scheduler.get_next_thread(), Ok((SimulatedRuntime::handle_of(2), 2)));
    shmem_ult::ensure_eq!(scheduler.queue_len(0), Some(3));

    runtime.switch_to(0, 2);
    shmem_ult::ensure_eq!(scheduler.get_next_thread().map(|(_, tid)| tid), Ok(3));
    Ok(())
}

/// Random selection eventually reaches every other waiter and never the caller.
#[test]
fn random_covers_other_waiters() -> Result<()> {
    let (runtime, scheduler) = new_scheduler(SchedulePolicy::Random);
    let flag: Arc<AtomicI64> = Arc::new(AtomicI64::new(0));
    scheduler.init(1, 4, None);
    register_all(&runtime, &scheduler, &[1, 2, 3, 4])?;
    for thread_id in 1..=4 {
        block(&runtime, &scheduler, thread_id, wait_on(&flag, 1))?;
    }

    runtime.switch_to(0, 4);
    let mut seen: HashSet<ThreadId> = HashSet::new();
    for _ in 0..256 {
        let (wake_handle, thread_id): (WakeHandle, ThreadId) = scheduler.get_next_thread()?;
        shmem_ult::ensure_neq!(thread_id, 4);
        shmem_ult::ensure_eq!(wake_handle, SimulatedRuntime::handle_of(thread_id));
        seen.insert(thread_id);
    }
    shmem_ult::ensure_eq!(seen, HashSet::from([1, 2, 3]));
    shmem_ult::ensure_eq!(flag.load(Ordering::Acquire), 0);
    Ok(())
}

/// Threads that leave for good stop being candidates.
#[test]
fn unregistered_thread_is_never_chosen() -> Result<()> {
    let (runtime, scheduler) = new_scheduler(SchedulePolicy::Auto);
    let ready: Arc<AtomicI64> = Arc::new(AtomicI64::new(1));
    scheduler.init(1, 3, None);
    register_all(&runtime, &scheduler, &[1, 2, 3])?;
    block(&runtime, &scheduler, 1, wait_on(&ready, 1))?;
    block(&runtime, &scheduler, 2, wait_on(&ready, 1))?;

    runtime.switch_to(0, 3);
    shmem_ult::ensure_eq!(scheduler.runnable_thread_exists(), Ok(1));
    runtime.switch_to(0, 1);
    scheduler.unregister_self()?;

    runtime.switch_to(0, 3);
    shmem_ult::ensure_eq!(scheduler.get_next_thread().map(|(_, tid)| tid), Ok(2));
    shmem_ult::ensure_eq!(scheduler.get_next_thread(), Err(SchedulerStatus::NoRunnableThreads));
    Ok(())
}
