// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Capabilities the scheduler borrows from the external lightweight-threading runtime.
//!
//! The scheduler never suspends or resumes a thread itself. It asks the runtime who is calling, how to wake that
//! caller later, and to yield. [CapabilityRegistry] is the late-binding implementation used when the runtime hands
//! over plain callbacks; test doubles and native integrations can implement [UltCapabilities] directly.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::runtime::scheduler::types::{
    ShepherdId,
    ThreadId,
    WakeHandle,
    YieldHint,
};
use ::parking_lot::RwLock;
use ::std::sync::Arc;

//======================================================================================================================
// Traits
//======================================================================================================================

/// Operations the scheduler needs from the threading runtime.
pub trait UltCapabilities: Send + Sync {
    /// Resolves the calling thread to its shepherd and thread id.
    fn identity(&self) -> Option<(ShepherdId, ThreadId)>;

    /// Returns the handle that resumes the calling thread.
    fn wake_handle(&self) -> Option<WakeHandle>;

    /// Suspends the calling thread. Returns false if no yield mechanism is available.
    fn yield_now(&self, hint: YieldHint) -> bool;

    /// Returns true if [UltCapabilities::yield_now] can actually yield.
    fn can_yield(&self) -> bool {
        true
    }

    /// Returns true if every capability cooperative scheduling depends on is available.
    fn is_complete(&self) -> bool {
        true
    }
}

//======================================================================================================================
// Structures
//======================================================================================================================

pub type IdentityFn = Arc<dyn Fn() -> (ShepherdId, ThreadId) + Send + Sync>;
pub type WakeHandleFn = Arc<dyn Fn() -> WakeHandle + Send + Sync>;
pub type YieldFn = Arc<dyn Fn(YieldHint) + Send + Sync>;

/// Slots for runtime-supplied callbacks. Registering overwrites the previous callback; there is no unregister.
#[derive(Default)]
pub struct CapabilityRegistry {
    identity: RwLock<Option<IdentityFn>>,
    wake_handle: RwLock<Option<WakeHandleFn>>,
    yield_fn: RwLock<Option<YieldFn>>,
}

//======================================================================================================================
// Associate Functions
//======================================================================================================================

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_identity<F>(&self, f: F)
    where
        F: Fn() -> (ShepherdId, ThreadId) + Send + Sync + 'static,
    {
        trace!("register_identity()");
        *self.identity.write() = Some(Arc::new(f));
    }

    pub fn register_wake_handle<F>(&self, f: F)
    where
        F: Fn() -> WakeHandle + Send + Sync + 'static,
    {
        trace!("register_wake_handle()");
        *self.wake_handle.write() = Some(Arc::new(f));
    }

    pub fn register_yield<F>(&self, f: F)
    where
        F: Fn(YieldHint) + Send + Sync + 'static,
    {
        trace!("register_yield()");
        *self.yield_fn.write() = Some(Arc::new(f));
    }
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

impl UltCapabilities for CapabilityRegistry {
    fn identity(&self) -> Option<(ShepherdId, ThreadId)> {
        let f: IdentityFn = self.identity.read().clone()?;
        Some(f())
    }

    fn wake_handle(&self) -> Option<WakeHandle> {
        let f: WakeHandleFn = self.wake_handle.read().clone()?;
        Some(f())
    }

    fn yield_now(&self, hint: YieldHint) -> bool {
        // The lock is released before yielding: another thread on this shepherd may register while we are away.
        let f: Option<YieldFn> = self.yield_fn.read().clone();
        match f {
            Some(f) => {
                f(hint);
                true
            },
            None => false,
        }
    }

    fn can_yield(&self) -> bool {
        self.yield_fn.read().is_some()
    }

    fn is_complete(&self) -> bool {
        self.identity.read().is_some() && self.wake_handle.read().is_some() && self.yield_fn.read().is_some()
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================
