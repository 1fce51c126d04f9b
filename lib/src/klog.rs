//! Kernel log facade.
//!
//! Every log line funnels through one backend function pointer. This crate
//! ships no console or serial driver of its own, so until the embedding
//! kernel registers a backend every line is silently dropped. Callers treat
//! logging as best-effort observability and never rely on a line landing
//! anywhere.
//!
//! The backend receives the pre-formatted arguments for a single line. It
//! must write the text atomically with respect to other CPUs and append the
//! trailing newline itself; format strings passed to the macros carry none.
//!
//! ```ignore
//! // In the console driver's init path:
//! emberos_lib::klog::klog_register_backend(console_backend);
//! ```

use core::fmt;
use core::sync::atomic::{AtomicPtr, AtomicU8, Ordering};

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KlogLevel {
    Error = 0,
    Warn = 1,
    Info = 2,
    Debug = 3,
    Trace = 4,
}

impl KlogLevel {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Error,
            1 => Self::Warn,
            2 => Self::Info,
            3 => Self::Debug,
            _ => Self::Trace,
        }
    }
}

/// Threshold below which lines are dropped before formatting.
static LEVEL: AtomicU8 = AtomicU8::new(KlogLevel::Info as u8);

#[inline(always)]
fn is_enabled(level: KlogLevel) -> bool {
    level as u8 <= LEVEL.load(Ordering::Relaxed)
}

/// Signature of a klog backend: takes one formatted line, writes it plus a
/// newline without interleaving output from other CPUs.
pub type KlogBackend = fn(fmt::Arguments<'_>);

/// Null until registration; a null backend drops the line.
static BACKEND: AtomicPtr<()> = AtomicPtr::new(core::ptr::null_mut());

#[inline]
fn dispatch(args: fmt::Arguments<'_>) {
    let ptr = BACKEND.load(Ordering::Acquire);
    if ptr.is_null() {
        return;
    }
    // SAFETY: the only store into BACKEND is `klog_register_backend`, which
    // writes a valid `KlogBackend` fn pointer. Fn pointers round-trip
    // through `*mut ()` on every supported target.
    let backend: KlogBackend = unsafe { core::mem::transmute(ptr) };
    backend(args);
}

/// Install the backend that receives all subsequent log lines. Called once
/// by whoever owns the console.
pub fn klog_register_backend(backend: KlogBackend) {
    BACKEND.store(backend as *mut (), Ordering::Release);
}

pub fn klog_set_level(level: KlogLevel) {
    LEVEL.store(level as u8, Ordering::Relaxed);
}

pub fn klog_get_level() -> KlogLevel {
    KlogLevel::from_u8(LEVEL.load(Ordering::Relaxed))
}

/// Whether a line at `level` would currently be emitted. Lets callers skip
/// building expensive arguments for suppressed levels.
pub fn is_enabled_level(level: KlogLevel) -> bool {
    is_enabled(level)
}

/// Format-and-emit entry point behind the macros.
pub fn log_args(level: KlogLevel, args: fmt::Arguments<'_>) {
    if !is_enabled(level) {
        return;
    }
    dispatch(args);
}

#[macro_export]
macro_rules! klog {
    ($level:expr, $($arg:tt)*) => {{
        $crate::klog::log_args($level, ::core::format_args!($($arg)*));
    }};
}

#[macro_export]
macro_rules! klog_error {
    ($($arg:tt)*) => {
        $crate::klog::log_args($crate::klog::KlogLevel::Error, ::core::format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! klog_warn {
    ($($arg:tt)*) => {
        $crate::klog::log_args($crate::klog::KlogLevel::Warn, ::core::format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! klog_info {
    ($($arg:tt)*) => {
        $crate::klog::log_args($crate::klog::KlogLevel::Info, ::core::format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! klog_debug {
    ($($arg:tt)*) => {
        $crate::klog::log_args($crate::klog::KlogLevel::Debug, ::core::format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! klog_trace {
    ($($arg:tt)*) => {
        $crate::klog::log_args($crate::klog::KlogLevel::Trace, ::core::format_args!($($arg)*))
    };
}
