//! Address newtypes shared by the memory crates.
//!
//! Physical and virtual addresses both travel as `u64`, so a bare integer
//! parameter says nothing about which kind it holds. These wrappers put the
//! distinction in the signature at zero cost (`#[repr(transparent)]`). The
//! placement algorithms keep their internal arithmetic in raw `u64`; the
//! newtypes appear at API boundaries, where a value's meaning matters and
//! validity has to be settled once.

use crate::{PAGE_SHIFT, PAGE_SIZE};

/// A byte address in physical memory.
///
/// Nothing in these crates dereferences one; physical addresses exist to be
/// checked against platform RAM ranges and converted to page frame numbers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct PhysAddr(pub u64);

impl PhysAddr {
    /// Highest address the hardware can emit. x86_64 caps physical
    /// addresses at 52 bits.
    pub const MAX: Self = Self((1 << 52) - 1);

    /// Wraps a raw address known to be in range.
    ///
    /// # Panics
    ///
    /// Panics when the value exceeds [`PhysAddr::MAX`]. Use [`try_new`] for
    /// values that arrive from outside.
    ///
    /// [`try_new`]: PhysAddr::try_new
    #[inline]
    pub fn new(addr: u64) -> Self {
        assert!(addr <= Self::MAX.0, "PhysAddr out of range: 0x{:x}", addr);
        Self(addr)
    }

    /// Wraps a raw address, or `None` past [`PhysAddr::MAX`].
    #[inline]
    pub const fn try_new(addr: u64) -> Option<Self> {
        if addr <= Self::MAX.0 {
            Some(Self(addr))
        } else {
            None
        }
    }

    /// First byte of page frame `pfn`, or `None` when the frame lies beyond
    /// the physical address space. The bound is checked before shifting so
    /// an oversized frame number cannot alias a low address.
    #[inline]
    pub const fn from_pfn(pfn: u64) -> Option<Self> {
        if pfn > Self::MAX.0 >> PAGE_SHIFT {
            return None;
        }
        Self::try_new(pfn << PAGE_SHIFT)
    }

    /// Page frame number containing this address.
    #[inline]
    pub const fn pfn(self) -> u64 {
        self.0 >> PAGE_SHIFT
    }

    #[inline]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

/// A byte address in some task's virtual address space.
///
/// Always canonical: bits 63..48 replicate bit 47, per the x86_64 rule.
/// Placement results are returned as `VirtAddr` so callers can rely on that
/// without re-checking.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct VirtAddr(pub u64);

impl VirtAddr {
    /// Wraps a raw address known to be canonical.
    ///
    /// # Panics
    ///
    /// Panics when the value is not canonical. Use [`try_new`] for
    /// arithmetic results that may have wandered out of range.
    ///
    /// [`try_new`]: VirtAddr::try_new
    #[inline]
    pub fn new(addr: u64) -> Self {
        assert!(
            Self::is_canonical(addr),
            "VirtAddr not canonical: 0x{:x}",
            addr
        );
        Self(addr)
    }

    /// Wraps a raw address, or `None` when it is not canonical.
    #[inline]
    pub const fn try_new(addr: u64) -> Option<Self> {
        if Self::is_canonical(addr) {
            Some(Self(addr))
        } else {
            None
        }
    }

    #[inline]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Whether this is address zero. Zero is an ordinary, mappable address
    /// here, not an error sentinel.
    #[inline]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    /// Base of the page containing this address.
    #[inline]
    pub const fn page_base(self) -> Self {
        Self(self.0 & !(PAGE_SIZE - 1))
    }

    /// Byte offset within the containing page.
    #[inline]
    pub const fn page_offset(self) -> u64 {
        self.0 & (PAGE_SIZE - 1)
    }

    /// Whether the address sits in the lower (user) half.
    #[inline]
    pub const fn is_user_space(self) -> bool {
        self.0 < 0x0000_8000_0000_0000
    }

    /// Canonical-form check: bits 63..48 must be copies of bit 47.
    #[inline]
    pub const fn is_canonical(addr: u64) -> bool {
        let sign = (addr >> 47) & 1;
        let upper = addr >> 48;
        if sign == 0 {
            upper == 0
        } else {
            upper == 0xFFFF
        }
    }
}
