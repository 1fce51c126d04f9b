//! Virtual memory layout constants for user address spaces.
//!
//! These mirror the per-architecture layout a kernel build would pin down:
//! where the user range ends, the lowest address ever handed to userspace,
//! and the security floor below which mmap placements are refused.

use crate::PAGE_SIZE;

/// One byte past the highest usable user virtual address (128 TiB with
/// 48-bit virtual addressing). Address spaces default their `task_size` to
/// this; a smaller compat task size may lower it per process.
pub const USER_VA_END: u64 = 0x0000_8000_0000_0000;

/// Lowest address the placement layer ever considers. Page zero stays
/// unmapped so null dereferences fault.
pub const FIRST_USER_ADDRESS: u64 = PAGE_SIZE;

/// Default security floor for mmap placements. Keeping the low 64 KiB off
/// limits blunts null-pointer-arithmetic exploits; a per-process floor may
/// raise it further.
pub const DEFAULT_MMAP_MIN_ADDR: u64 = 0x10000;

/// 16 MiB, the alignment of the legacy bottom-up mmap base.
pub const SZ_16M: u64 = 0x100_0000;
