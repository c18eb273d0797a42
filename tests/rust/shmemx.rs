// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use ::anyhow::Result;
use ::libc::{
    c_int,
    c_long,
    c_void,
};
use ::shmem_ult::{
    runtime::scheduler::types::{
        SHMEM_CMP_EQ,
        SHMEM_CMP_NE,
    },
    shmemx::bindings::{
        shmemx_get_next_thread,
        shmemx_long_wait_until,
        shmemx_register_get_thread_handle,
        shmemx_register_getultinfo,
        shmemx_register_yield,
        shmemx_thread_register,
        shmemx_thread_scheduler_finalize,
        shmemx_thread_scheduler_init,
        shmemx_thread_unregister,
    },
    SchedulerStatus,
};
use ::std::{
    ptr,
    sync::atomic::{
        AtomicI64,
        AtomicU64,
        Ordering,
    },
};

//======================================================================================================================
// Simulated C Runtime
//======================================================================================================================

static CURRENT_THREAD: AtomicU64 = AtomicU64::new(0);
static LAST_HINT: AtomicI64 = AtomicI64::new(i64::MIN);
static LAST_NEXT: AtomicI64 = AtomicI64::new(i64::MIN);
static IVAR: AtomicI64 = AtomicI64::new(0);

unsafe extern "C" fn get_ult_info(shepherd_out: *mut c_int, tid_out: *mut u64) {
    *shepherd_out = 0;
    *tid_out = CURRENT_THREAD.load(Ordering::SeqCst);
}

unsafe extern "C" fn get_thread_handle() -> *mut c_void {
    (0x1000 + CURRENT_THREAD.load(Ordering::SeqCst) as usize) as *mut c_void
}

/// Asks for the next thread like a real runtime would, then lets the remote store land.
unsafe extern "C" fn yield_thread(hint: c_int) {
    LAST_HINT.store(i64::from(hint), Ordering::SeqCst);
    let mut handle: *mut c_void = ptr::null_mut();
    let mut thread_id: u64 = 0;
    let ret: c_int = shmemx_get_next_thread(&mut handle, &mut thread_id);
    LAST_NEXT.store(i64::from(ret), Ordering::SeqCst);
    IVAR.store(1, Ordering::Release);
}

//======================================================================================================================
// Tests
//======================================================================================================================

/// Drives the whole C surface through one lifecycle. Kept as a single test because the surface is process-wide.
#[test]
fn c_lifecycle() -> Result<()> {
    let mut handle: *mut c_void = ptr::null_mut();
    let mut thread_id: u64 = 0;

    // Nothing is scheduled before init.
    shmem_ult::ensure_eq!(
        shmemx_get_next_thread(&mut handle, &mut thread_id),
        SchedulerStatus::Uninitialized.code()
    );

    shmem_ult::ensure_eq!(shmemx_register_getultinfo(Some(get_ult_info)), 0);
    shmem_ult::ensure_eq!(shmemx_register_get_thread_handle(Some(get_thread_handle)), 0);
    shmem_ult::ensure_eq!(shmemx_register_yield(Some(yield_thread)), 0);

    let priorities: [c_int; 3] = [0, 0, 1];
    shmem_ult::ensure_eq!(shmemx_thread_scheduler_init(1, 1, priorities.as_ptr()), 0);
    CURRENT_THREAD.store(7, Ordering::SeqCst);
    shmem_ult::ensure_eq!(shmemx_thread_register(), 0);

    // The only thread waits; nothing else is runnable, so it yields with -1 and the runtime finds nobody.
    let ivar: *mut c_long = IVAR.as_ptr();
    shmem_ult::ensure_eq!(shmemx_long_wait_until(ivar, SHMEM_CMP_EQ, 1), 0);
    shmem_ult::ensure_eq!(LAST_HINT.load(Ordering::SeqCst), -1);
    shmem_ult::ensure_eq!(
        LAST_NEXT.load(Ordering::SeqCst),
        i64::from(SchedulerStatus::NoRunnableThreads.code())
    );

    // Already satisfied: returns at once.
    shmem_ult::ensure_eq!(shmemx_long_wait_until(ivar, SHMEM_CMP_NE, 0), 0);
    shmem_ult::ensure_eq!(shmemx_long_wait_until(ivar, 99, 0), libc::EINVAL);

    shmem_ult::ensure_eq!(shmemx_thread_unregister(), 0);
    shmem_ult::ensure_eq!(shmemx_thread_scheduler_finalize(), 0);
    shmem_ult::ensure_eq!(
        shmemx_get_next_thread(&mut handle, &mut thread_id),
        SchedulerStatus::Uninitialized.code()
    );
    Ok(())
}
