//! Coarse monotonic time.
//!
//! The memory crates only need timestamps for rate-limited diagnostics, so
//! millisecond granularity is plenty. The embedding kernel registers
//! whatever tick source it has (HPET, TSC-deadline, PIT ticks) during
//! platform bring-up; before registration every query returns `0`, which
//! callers must tolerate.

use core::sync::atomic::{AtomicPtr, Ordering};

/// Signature of a clock source: monotonic milliseconds since boot.
pub type ClockSource = fn() -> u64;

/// Stored as a raw pointer; `null` means "not wired yet, report 0".
static SOURCE: AtomicPtr<()> = AtomicPtr::new(core::ptr::null_mut());

/// Register the platform tick source.  Typically called once during boot.
pub fn clock_register_source(source: ClockSource) {
    SOURCE.store(source as *mut (), Ordering::Release);
}

/// Monotonic milliseconds since boot, or `0` before a source is registered.
#[inline]
pub fn ticks_ms() -> u64 {
    let ptr = SOURCE.load(Ordering::Acquire);
    if ptr.is_null() {
        return 0;
    }
    // SAFETY: `clock_register_source` only stores valid `ClockSource` fn
    // pointers, which are the same size as `*mut ()` on all supported
    // targets.
    let source: ClockSource = unsafe { core::mem::transmute(ptr) };
    source()
}
