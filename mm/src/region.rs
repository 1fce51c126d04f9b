//! Mapped-region model.
//!
//! A [`Region`] is one occupied interval of a process's virtual address
//! space. The placement layer only reads regions; creating and destroying
//! them is the mapping installer's business.

use bitflags::bitflags;

bitflags! {
    /// Properties of a mapped region.
    ///
    /// Carried for the installer's benefit; the gap search treats every
    /// region as opaque occupied space and never reads these.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct RegionFlags: u32 {
        /// Region is readable.
        const READ = 1 << 0;
        /// Region is writable.
        const WRITE = 1 << 1;
        /// Region is executable.
        const EXEC = 1 << 2;
        /// Region is shared between address spaces rather than private.
        const SHARED = 1 << 3;
    }
}

/// Where a region's page content comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum RegionBacking {
    /// Anonymous memory, zero-filled on first touch.
    #[default]
    Anonymous = 0,
    /// Pages come from a file mapping.
    File = 1,
    /// Backed by a shared memory object.
    Shared = 2,
}

/// One occupied interval `[start, end)` of an address space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub start: u64,
    pub end: u64,
    pub flags: RegionFlags,
    pub backing: RegionBacking,
}

impl Region {
    /// Build a region from its bounds. `start < end` is the caller's
    /// responsibility; [`crate::region_set::RegionSet::insert`] rejects
    /// empty intervals.
    pub const fn new(start: u64, end: u64, flags: RegionFlags, backing: RegionBacking) -> Self {
        Self {
            start,
            end,
            flags,
            backing,
        }
    }

    /// Anonymous private read-write region, the common fixture shape.
    pub const fn anon(start: u64, end: u64) -> Self {
        Self::new(
            start,
            end,
            RegionFlags::READ.union(RegionFlags::WRITE),
            RegionBacking::Anonymous,
        )
    }

    pub const fn len(self) -> u64 {
        self.end - self.start
    }

    pub const fn is_empty(self) -> bool {
        self.start >= self.end
    }

    pub const fn contains(self, addr: u64) -> bool {
        self.start <= addr && addr < self.end
    }

    pub const fn overlaps(self, other: Region) -> bool {
        self.start < other.end && other.start < self.end
    }
}
