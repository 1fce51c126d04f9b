//! EmberOS Memory ABI Types
//!
//! This crate provides the canonical address types and virtual memory layout
//! constants shared by the memory-management crates. Having a single source
//! of truth eliminates:
//! - Duplicate constant definitions
//! - Layout mismatches between the placement policy and the mapping installer
//!
//! Everything here is plain data; the crate carries no unsafe code and no
//! dependencies.

#![no_std]
#![forbid(unsafe_code)]

pub mod addr;
pub mod memory;

/// Standard 4KB page size.
pub const PAGE_SIZE: u64 = 0x1000;

/// Number of low bits covered by [`PAGE_SIZE`].
pub const PAGE_SHIFT: u32 = 12;

pub use addr::*;
pub use memory::*;
