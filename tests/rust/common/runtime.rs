// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use ::parking_lot::Mutex;
use ::shmem_ult::{
    ShepherdId,
    ThreadId,
    UltCapabilities,
    WakeHandle,
    YieldHint,
};

//======================================================================================================================
// Structures
//======================================================================================================================

/// Runs while the current thread is yielded, standing in for the threads the runtime switches to.
pub type YieldHook = Box<dyn FnMut(&SimulatedRuntime, YieldHint) + Send>;

/// Threading runtime that runs every user-level thread on the test thread. The test switches the current thread
/// explicitly; a yield hook plays the other threads.
pub struct SimulatedRuntime {
    current: Mutex<(ShepherdId, ThreadId)>,
    hints: Mutex<Vec<YieldHint>>,
    hook: Mutex<Option<YieldHook>>,
}

//======================================================================================================================
// Associate Functions
//======================================================================================================================

impl SimulatedRuntime {
    pub fn new() -> Self {
        Self {
            current: Mutex::new((0, 0)),
            hints: Mutex::new(vec![]),
            hook: Mutex::new(None),
        }
    }

    /// Switches to `thread_id` of `shepherd`.
    pub fn switch_to(&self, shepherd: ShepherdId, thread_id: ThreadId) {
        *self.current.lock() = (shepherd, thread_id);
    }

    pub fn current(&self) -> (ShepherdId, ThreadId) {
        *self.current.lock()
    }

    /// Installs the code that runs on every yield.
    pub fn on_yield(&self, hook: YieldHook) {
        *self.hook.lock() = Some(hook);
    }

    /// Hints received so far.
    pub fn hints(&self) -> Vec<YieldHint> {
        self.hints.lock().clone()
    }

    /// Handle the simulated runtime hands out for `thread_id`.
    pub fn handle_of(thread_id: ThreadId) -> WakeHandle {
        WakeHandle::from(0x1000 + thread_id as usize)
    }
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

impl UltCapabilities for SimulatedRuntime {
    fn identity(&self) -> Option<(ShepherdId, ThreadId)> {
        Some(self.current())
    }

    fn wake_handle(&self) -> Option<WakeHandle> {
        Some(Self::handle_of(self.current().1))
    }

    fn yield_now(&self, hint: YieldHint) -> bool {
        self.hints.lock().push(hint);
        let hook: Option<YieldHook> = self.hook.lock().take();
        if let Some(mut hook) = hook {
            let caller: (ShepherdId, ThreadId) = self.current();
            hook(self, hint);
            self.switch_to(caller.0, caller.1);
            *self.hook.lock() = Some(hook);
        }
        true
    }
}
