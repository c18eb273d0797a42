// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Cooperative scheduler for user-level threads blocked in communication calls.
//!
//! The scheduler owns one [ShepherdState] per shepherd. Every query resolves the caller through the
//! [UltCapabilities] of the external threading runtime and then only touches the caller's shepherd, so shepherds
//! never contend with each other. Lifecycle operations swap the whole table under an exclusive lock.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::runtime::{
    fail::Fail,
    limits,
    scheduler::{
        capabilities::UltCapabilities,
        descriptor::Blocker,
        policy::{
            PriorityTable,
            SchedulePolicy,
        },
        shepherd::{
            Decision,
            ShepherdState,
        },
        types::{
            BlockReason,
            SchedulerStatus,
            ShepherdId,
            ThreadId,
            ThreadLevel,
            WakeHandle,
        },
    },
    transport::Transport,
};
use ::parking_lot::{
    Mutex,
    MutexGuard,
    RwLock,
};
use ::rand::{
    rngs::SmallRng,
    SeedableRng,
};
use ::std::sync::Arc;

//======================================================================================================================
// Structures
//======================================================================================================================

/// Options read once from the runtime configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SchedulerOptions {
    pub policy: SchedulePolicy,
    /// Log every queue change.
    pub verbose: bool,
    pub thread_level: ThreadLevel,
    /// Seed for the RANDOM policy. Seeded from the OS when unset.
    pub random_seed: Option<u64>,
}

/// Shape of an initialized scheduler.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SchedulerConfig {
    pub policy: SchedulePolicy,
    pub priorities: PriorityTable,
    /// Reason that receives scheduling preference, derived from `priorities`.
    pub vip: Option<BlockReason>,
    pub shepherd_count: usize,
    pub threads_per_shepherd: usize,
}

struct ActiveState {
    config: SchedulerConfig,
    shepherds: Vec<Mutex<ShepherdState>>,
}

/// Cooperative user-level-thread scheduler.
pub struct Scheduler {
    capabilities: Arc<dyn UltCapabilities>,
    transport: Arc<dyn Transport>,
    options: SchedulerOptions,
    state: RwLock<Option<ActiveState>>,
}

//======================================================================================================================
// Associate Functions
//======================================================================================================================

impl Scheduler {
    /// Creates an inactive scheduler. Call [Scheduler::init] to start scheduling.
    pub fn new(
        capabilities: Arc<dyn UltCapabilities>,
        transport: Arc<dyn Transport>,
        options: SchedulerOptions,
    ) -> Self {
        Self {
            capabilities,
            transport,
            options,
            state: RwLock::new(None),
        }
    }

    pub fn options(&self) -> SchedulerOptions {
        self.options
    }

    pub(crate) fn capabilities(&self) -> &dyn UltCapabilities {
        self.capabilities.as_ref()
    }

    pub(crate) fn transport(&self) -> &dyn Transport {
        self.transport.as_ref()
    }

    pub fn is_active(&self) -> bool {
        self.state.read().is_some()
    }

    /// Returns the active configuration, if initialized.
    pub fn config(&self) -> Option<SchedulerConfig> {
        self.state.read().as_ref().map(|state| state.config)
    }

    /// Activates scheduling for `thread_count` threads spread evenly over `shepherd_count` shepherds. Counts that
    /// violate the contract are clamped with a warning.
    pub fn init(&self, shepherd_count: usize, thread_count: usize, priorities: Option<PriorityTable>) {
        let mut state = self.state.write();
        if state.is_some() {
            warn!("init(): scheduler already initialized, keeping current state");
            return;
        }

        let (shepherd_count, threads_per_shepherd): (usize, usize) = Self::clamp_counts(shepherd_count, thread_count);
        let priorities: PriorityTable = priorities.unwrap_or_default();
        let config: SchedulerConfig = SchedulerConfig {
            policy: self.options.policy,
            priorities,
            vip: priorities.vip(),
            shepherd_count,
            threads_per_shepherd,
        };
        if !self.capabilities.is_complete() {
            warn!("init(): threading callbacks are not all registered, blocking calls will poll");
        }

        let shepherds: Vec<Mutex<ShepherdState>> = (0..shepherd_count)
            .map(|id| Mutex::new(ShepherdState::new(id, threads_per_shepherd, self.make_rng(id))))
            .collect();
        if self.options.verbose {
            info!(
                "Number of shepherds {}, number of ults {}, policy {}, vip {:?}",
                shepherd_count,
                shepherd_count * threads_per_shepherd,
                config.policy,
                config.vip
            );
        }
        *state = Some(ActiveState { config, shepherds });
    }

    /// Drops every blocked-thread record and deactivates scheduling. No thread may be blocked at this point.
    pub fn finalize(&self) {
        let mut state = self.state.write();
        match state.take() {
            Some(active) => {
                for shepherd in active.shepherds.iter() {
                    shepherd.lock().clear();
                }
                trace!("finalize(): scheduler deactivated");
            },
            None => warn!("finalize(): scheduler is not initialized"),
        }
    }

    /// Announces the calling thread on its shepherd.
    pub fn register_self(&self) -> Result<(), Fail> {
        let (shepherd, thread_id): (ShepherdId, ThreadId) = self.identity()?;
        self.register(shepherd, thread_id)
    }

    /// Announces `thread_id` on `shepherd`. Decisions on a shepherd wait until all of its threads are announced.
    pub fn register(&self, shepherd: ShepherdId, thread_id: ThreadId) -> Result<(), Fail> {
        self.with_shepherd(shepherd, |state| {
            if !state.register(thread_id) {
                warn!(
                    "register(): shepherd {} already has all of its threads, ignoring (tid={:?})",
                    state.id(),
                    thread_id
                );
            }
        })
    }

    /// Removes the calling thread for good.
    pub fn unregister_self(&self) -> Result<(), Fail> {
        let (shepherd, thread_id): (ShepherdId, ThreadId) = self.identity()?;
        self.remove(shepherd, thread_id)?;
        Ok(())
    }

    /// Records that the calling thread blocks on `blocker`.
    pub fn block_self(&self, blocker: Blocker) -> Result<(), Fail> {
        let (shepherd, thread_id): (ShepherdId, ThreadId) = self.identity()?;
        self.enqueue_or_update(shepherd, thread_id, blocker)
    }

    /// Queues `thread_id` as blocked on `blocker`, or re-blocks it and moves it to the tail of its shepherd's queue.
    pub fn enqueue_or_update(&self, shepherd: ShepherdId, thread_id: ThreadId, blocker: Blocker) -> Result<(), Fail> {
        if self.options.policy == SchedulePolicy::None {
            return Err(Fail::new(libc::ENOTSUP, "cooperative scheduling is disabled"));
        }
        if !self.capabilities.is_complete() {
            let cause: &str = "threading callbacks are not all registered";
            warn!("enqueue_or_update(): {}", cause);
            return Err(Fail::new(libc::ENOSYS, cause));
        }
        let reason: BlockReason = blocker.reason();
        self.with_shepherd(shepherd, |state| -> Result<(), Fail> {
            let is_new: bool = !state.contains(thread_id);
            let wake_handle: Option<WakeHandle> = if is_new {
                self.capabilities.wake_handle()
            } else {
                None
            };
            state.enqueue_or_update(thread_id, blocker, wake_handle)?;
            trace!(
                "enqueue_or_update(): shepherd={:?}, tid={:?}, reason={:?}, new={:?}",
                state.id(),
                thread_id,
                reason,
                is_new
            );
            if self.options.verbose {
                let op: &str = if is_new { "Added" } else { "Updated" };
                self.log_queue(state, op, thread_id);
            }
            Ok(())
        })?
    }

    /// Removes `thread_id` from `shepherd`. Returns false if it was not queued.
    pub fn remove(&self, shepherd: ShepherdId, thread_id: ThreadId) -> Result<bool, Fail> {
        self.with_shepherd(shepherd, |state| {
            let removed: bool = state.remove(thread_id);
            trace!(
                "remove(): shepherd={:?}, tid={:?}, removed={:?}",
                state.id(),
                thread_id,
                removed
            );
            if self.options.verbose && removed {
                self.log_queue(state, "Deleted", thread_id);
            }
            removed
        })
    }

    /// Marks the calling thread as no longer waiting.
    pub fn mark_resumed(&self) -> Result<(), Fail> {
        let (shepherd, thread_id): (ShepherdId, ThreadId) = self.identity()?;
        self.with_shepherd(shepherd, |state| state.mark_resumed(thread_id))
    }

    /// Looks for another thread on the caller's shepherd that can make progress.
    pub fn runnable_thread_exists(&self) -> Decision<ThreadId> {
        let (shepherd, caller): (ShepherdId, ThreadId) = self.query_identity()?;
        self.detect(shepherd, caller)
    }

    /// Looks for a thread other than `caller` on `shepherd` that can make progress.
    pub fn detect(&self, shepherd: ShepherdId, caller: ThreadId) -> Decision<ThreadId> {
        let state = self.state.read();
        let active: &ActiveState = state.as_ref().ok_or(SchedulerStatus::Uninitialized)?;
        let config: SchedulerConfig = active.config;
        let mut shepherd_state: MutexGuard<ShepherdState> = Self::lock_shepherd(active, shepherd);
        shepherd_state.detect(caller, config.policy, config.vip)
    }

    /// Chooses the thread that should run after the caller and returns how to wake it.
    pub fn get_next_thread(&self) -> Decision<(WakeHandle, ThreadId)> {
        let (shepherd, caller): (ShepherdId, ThreadId) = self.query_identity()?;
        self.select(shepherd, caller)
    }

    /// Chooses the thread that should run after `caller` on `shepherd`.
    pub fn select(&self, shepherd: ShepherdId, caller: ThreadId) -> Decision<(WakeHandle, ThreadId)> {
        let state = self.state.read();
        let active: &ActiveState = state.as_ref().ok_or(SchedulerStatus::Uninitialized)?;
        let config: SchedulerConfig = active.config;
        let mut shepherd_state: MutexGuard<ShepherdState> = Self::lock_shepherd(active, shepherd);
        let choice: Decision<(WakeHandle, ThreadId)> = shepherd_state.select(caller, config.policy, config.vip);
        if let Ok((_, thread_id)) = choice {
            if self.options.verbose {
                self.log_queue(&shepherd_state, "Chose", thread_id);
            }
        }
        choice
    }

    /// Number of threads queued on `shepherd`.
    pub fn queue_len(&self, shepherd: ShepherdId) -> Option<usize> {
        self.inspect(shepherd, |state| state.len())
    }

    /// Number of threads marked runnable on `shepherd`.
    pub fn runnable_count(&self, shepherd: ShepherdId) -> Option<usize> {
        self.inspect(shepherd, |state| state.runnable_count())
    }

    /// Thread ids queued on `shepherd`, in queue order.
    pub fn queued_threads(&self, shepherd: ShepherdId) -> Option<Vec<ThreadId>> {
        self.inspect(shepherd, |state| state.queued_threads())
    }

    /// Resolves the caller, failing if the identity capability is missing.
    pub(crate) fn identity(&self) -> Result<(ShepherdId, ThreadId), Fail> {
        match self.capabilities.identity() {
            Some(identity) => Ok(identity),
            None => {
                let cause: &str = "thread identity callback is not registered";
                warn!("identity(): {}", cause);
                Err(Fail::new(libc::ENOSYS, cause))
            },
        }
    }

    fn query_identity(&self) -> Decision<(ShepherdId, ThreadId)> {
        self.identity().map_err(|_| SchedulerStatus::Uninitialized)
    }

    fn with_shepherd<R, F>(&self, shepherd: ShepherdId, f: F) -> Result<R, Fail>
    where
        F: FnOnce(&mut ShepherdState) -> R,
    {
        let state = self.state.read();
        let Some(active) = state.as_ref() else {
            let cause: &str = "scheduler is not initialized";
            warn!("with_shepherd(): {}", cause);
            return Err(Fail::new(libc::EINVAL, cause));
        };
        let mut shepherd_state: MutexGuard<ShepherdState> = Self::lock_shepherd(active, shepherd);
        Ok(f(&mut shepherd_state))
    }

    fn inspect<R, F>(&self, shepherd: ShepherdId, f: F) -> Option<R>
    where
        F: FnOnce(&ShepherdState) -> R,
    {
        let state = self.state.read();
        let active: &ActiveState = state.as_ref()?;
        let shepherd_state: MutexGuard<ShepherdState> = active.shepherds.get(shepherd)?.lock();
        Some(f(&shepherd_state))
    }

    /// Locks the state of `shepherd`, folding out-of-range ids back into the table.
    fn lock_shepherd(active: &ActiveState, shepherd: ShepherdId) -> MutexGuard<'_, ShepherdState> {
        let count: usize = active.shepherds.len();
        let index: ShepherdId = if shepherd < count {
            shepherd
        } else {
            warn!(
                "lock_shepherd(): shepherd id out of range, clamping (shepherd={:?}, count={:?})",
                shepherd, count
            );
            shepherd % count
        };
        active.shepherds[index].lock()
    }

    fn clamp_counts(shepherd_count: usize, thread_count: usize) -> (usize, usize) {
        let mut shepherds: usize = shepherd_count;
        if shepherds == 0 {
            warn!("init(): zero shepherds requested, using one");
            shepherds = 1;
        }
        if shepherds > limits::MAX_SHEPHERDS {
            warn!(
                "init(): too many shepherds, clamping (requested={:?}, max={:?})",
                shepherds,
                limits::MAX_SHEPHERDS
            );
            shepherds = limits::MAX_SHEPHERDS;
        }

        if thread_count % shepherds != 0 {
            warn!(
                "init(): thread count is not divisible by shepherd count, rounding up (threads={:?}, shepherds={:?})",
                thread_count, shepherds
            );
        }
        let mut threads_per_shepherd: usize = thread_count / shepherds + usize::from(thread_count % shepherds != 0);
        if threads_per_shepherd == 0 {
            warn!("init(): zero threads requested, expecting one per shepherd");
            threads_per_shepherd = 1;
        }
        if threads_per_shepherd > limits::MAX_THREADS_PER_SHEPHERD {
            warn!(
                "init(): too many threads per shepherd, clamping (requested={:?}, max={:?})",
                threads_per_shepherd,
                limits::MAX_THREADS_PER_SHEPHERD
            );
            threads_per_shepherd = limits::MAX_THREADS_PER_SHEPHERD;
        }
        (shepherds, threads_per_shepherd)
    }

    fn make_rng(&self, shepherd: ShepherdId) -> SmallRng {
        match self.options.random_seed {
            Some(seed) => SmallRng::seed_from_u64(seed.wrapping_add(shepherd as u64)),
            None => SmallRng::from_entropy(),
        }
    }

    fn log_queue(&self, state: &ShepherdState, op: &str, thread_id: ThreadId) {
        info!("[SHPHRD {}] {} value {}", state.id(), op, thread_id);
        info!("[SHPHRD {}] LL: {}", state.id(), state.render());
    }
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            policy: SchedulePolicy::Auto,
            verbose: false,
            thread_level: ThreadLevel::Multiple,
            random_seed: None,
        }
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================
