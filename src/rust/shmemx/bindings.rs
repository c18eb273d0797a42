// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::{
    runtime::{
        fail::Fail,
        logging,
        scheduler::{
            capabilities::CapabilityRegistry,
            policy::PriorityTable,
            scheduler::{
                Scheduler,
                SchedulerOptions,
            },
            types::{
                Comparator,
                ShepherdId,
                ThreadId,
                WaitTarget,
                WakeHandle,
                YieldHint,
            },
        },
        transport::NullTransport,
    },
    shmemx::config::Config,
};
use ::libc::{
    c_int,
    c_long,
    c_void,
};
use ::std::{
    slice,
    sync::{
        atomic::{
            AtomicI64,
            Ordering,
        },
        Arc,
        OnceLock,
    },
};

//======================================================================================================================
// Structures
//======================================================================================================================

/// Reports the shepherd and thread id of the caller.
pub type GetUltInfoFn = unsafe extern "C" fn(shepherd_out: *mut c_int, tid_out: *mut u64);
/// Returns the handle that resumes the caller.
pub type GetThreadHandleFn = unsafe extern "C" fn() -> *mut c_void;
/// Yields the caller with a hint.
pub type YieldFn = unsafe extern "C" fn(hint: c_int);

/// Symmetric variable handed in by C callers.
struct SymmetricLong(*const c_long);

const _: () = assert!(::std::mem::size_of::<c_long>() == ::std::mem::size_of::<AtomicI64>());

// The location is only read atomically and must outlive the wait that references it.
unsafe impl Send for SymmetricLong {}
unsafe impl Sync for SymmetricLong {}

//======================================================================================================================
// Static Variables
//======================================================================================================================

/// Callbacks registered by the threading runtime.
static REGISTRY: OnceLock<Arc<CapabilityRegistry>> = OnceLock::new();

/// Process-wide scheduler.
static SCHEDULER: OnceLock<Scheduler> = OnceLock::new();

//======================================================================================================================
// registration
//======================================================================================================================

#[no_mangle]
pub extern "C" fn shmemx_register_getultinfo(f: Option<GetUltInfoFn>) -> c_int {
    trace!("shmemx_register_getultinfo()");
    let Some(f) = f else {
        warn!("shmemx_register_getultinfo(): null callback");
        return libc::EINVAL;
    };
    registry().register_identity(move || {
        let mut shepherd: c_int = 0;
        let mut thread_id: u64 = 0;
        unsafe { f(&mut shepherd, &mut thread_id) };
        (shepherd_from_c(shepherd), thread_id as ThreadId)
    });
    0
}

#[no_mangle]
pub extern "C" fn shmemx_register_get_thread_handle(f: Option<GetThreadHandleFn>) -> c_int {
    trace!("shmemx_register_get_thread_handle()");
    let Some(f) = f else {
        warn!("shmemx_register_get_thread_handle(): null callback");
        return libc::EINVAL;
    };
    registry().register_wake_handle(move || WakeHandle::from(unsafe { f() } as usize));
    0
}

#[no_mangle]
pub extern "C" fn shmemx_register_yield(f: Option<YieldFn>) -> c_int {
    trace!("shmemx_register_yield()");
    let Some(f) = f else {
        warn!("shmemx_register_yield(): null callback");
        return libc::EINVAL;
    };
    registry().register_yield(move |hint: YieldHint| unsafe { f(hint.code()) });
    0
}

//======================================================================================================================
// lifecycle
//======================================================================================================================

/// Starts scheduling. `priorities` is either null or points to three entries ordered PUT, GET, WAIT.
#[no_mangle]
pub extern "C" fn shmemx_thread_scheduler_init(
    shepherd_count: u64,
    thread_count: u64,
    priorities: *const c_int,
) -> c_int {
    logging::initialize();
    trace!(
        "shmemx_thread_scheduler_init() shepherd_count={:?}, thread_count={:?}",
        shepherd_count,
        thread_count
    );

    let priorities: Option<PriorityTable> = if priorities.is_null() {
        None
    } else {
        let raw: &[c_int] = unsafe { slice::from_raw_parts(priorities, 3) };
        Some(PriorityTable::new(raw[0], raw[1], raw[2]))
    };
    let shepherd_count: usize = count_from_c(shepherd_count);
    let thread_count: usize = count_from_c(thread_count);
    scheduler().init(shepherd_count, thread_count, priorities);
    0
}

#[no_mangle]
pub extern "C" fn shmemx_thread_scheduler_finalize() -> c_int {
    trace!("shmemx_thread_scheduler_finalize()");
    scheduler().finalize();
    0
}

#[no_mangle]
pub extern "C" fn shmemx_thread_register() -> c_int {
    trace!("shmemx_thread_register()");
    match scheduler().register_self() {
        Ok(()) => 0,
        Err(e) => {
            warn!("thread_register() failed: {:?}", e);
            e.errno
        },
    }
}

#[no_mangle]
pub extern "C" fn shmemx_thread_unregister() -> c_int {
    trace!("shmemx_thread_unregister()");
    match scheduler().unregister_self() {
        Ok(()) => 0,
        Err(e) => {
            warn!("thread_unregister() failed: {:?}", e);
            e.errno
        },
    }
}

//======================================================================================================================
// scheduling
//======================================================================================================================

/// Picks the thread that should run next. Returns zero and fills both outputs on success, a negative scheduling
/// status otherwise.
///
/// Unlike `int shmemx_get_next_thread(void **)`, the handle and the thread id come back through out parameters and
/// the return value only carries the status, so callers of the single-argument form must be updated.
#[no_mangle]
pub extern "C" fn shmemx_get_next_thread(handle_out: *mut *mut c_void, tid_out: *mut u64) -> c_int {
    trace!("shmemx_get_next_thread()");
    if handle_out.is_null() || tid_out.is_null() {
        return libc::EINVAL;
    }
    match scheduler().get_next_thread() {
        Ok((wake_handle, thread_id)) => {
            unsafe {
                *handle_out = usize::from(wake_handle) as *mut c_void;
                *tid_out = thread_id;
            }
            0
        },
        Err(status) => status.code(),
    }
}

/// Waits until `*ivar <cmp> value` holds, yielding to other threads of the shepherd in the meantime.
#[no_mangle]
pub extern "C" fn shmemx_long_wait_until(ivar: *mut c_long, cmp: c_int, value: c_long) -> c_int {
    trace!("shmemx_long_wait_until() cmp={:?}, value={:?}", cmp, value);
    if ivar.is_null() {
        return libc::EINVAL;
    }
    let ret: Result<(), Fail> = Comparator::try_from(cmp).and_then(|comparator| {
        let target: Arc<dyn WaitTarget> = Arc::new(SymmetricLong(ivar));
        scheduler().wait_until(target, comparator, i64::from(value))
    });
    match ret {
        Ok(()) => 0,
        Err(e) => {
            warn!("long_wait_until() failed: {:?}", e);
            e.errno
        },
    }
}

//======================================================================================================================
// Standalone Functions
//======================================================================================================================

/// Counts beyond the address space are clamped by init like any other oversized count.
fn count_from_c(count: u64) -> usize {
    usize::try_from(count).unwrap_or(usize::MAX)
}

fn shepherd_from_c(shepherd: c_int) -> ShepherdId {
    match ShepherdId::try_from(shepherd) {
        Ok(shepherd) => shepherd,
        Err(_) => {
            warn!("getultinfo(): negative shepherd {}, using shepherd 0", shepherd);
            0
        },
    }
}

fn registry() -> &'static Arc<CapabilityRegistry> {
    REGISTRY.get_or_init(|| Arc::new(CapabilityRegistry::new()))
}

/// Returns the process-wide scheduler, reading its options on first use.
fn scheduler() -> &'static Scheduler {
    SCHEDULER.get_or_init(|| {
        let options: SchedulerOptions = match Config::from_env().and_then(|config| config.scheduler_options()) {
            Ok(options) => options,
            Err(e) => {
                warn!("scheduler(): falling back to default options ({:?})", e);
                SchedulerOptions::default()
            },
        };
        Scheduler::new(registry().clone(), Arc::new(NullTransport), options)
    })
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

impl WaitTarget for SymmetricLong {
    fn load(&self) -> i64 {
        let atomic: &AtomicI64 = unsafe { &*(self.0 as *const AtomicI64) };
        atomic.load(Ordering::Acquire)
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================
