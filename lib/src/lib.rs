#![no_std]

#[cfg(test)]
extern crate std;

pub mod alignment;
pub mod clock;
pub mod klog;
pub mod ratelimit;

pub use alignment::{
    align_down_u64, align_down_usize, align_up_u64, align_up_usize, is_aligned_u64,
    is_aligned_usize,
};
pub use clock::{clock_register_source, ticks_ms};
pub use klog::{
    KlogLevel, klog_get_level, klog_register_backend, klog_set_level,
};
pub use ratelimit::RateLimit;
