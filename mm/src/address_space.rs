//! Per-process address-space bookkeeping.
//!
//! Owns the layout picked at creation and the live region set, and runs
//! placement against both. Reservations search and insert inside one
//! critical section so concurrent callers cannot claim the same gap.

use spin::{RwLock, RwLockReadGuard};

use emberos_abi::{DEFAULT_MMAP_MIN_ADDR, USER_VA_END};

use crate::color_align::CacheInfo;
use crate::error::{PlacementError, PlacementResult};
use crate::mmap_layout::{self, EntropySource, MmapDirection, MmapLayout, ProcessAttrs};
use crate::region::{Region, RegionBacking, RegionFlags};
use crate::region_set::RegionSet;
use crate::unmapped_area::{self, MapFlags, MappingRequest, MmapContext};

/// Fixed geometry of an address space.
#[derive(Debug, Clone, Copy)]
pub struct AddressSpaceParams {
    /// Exclusive ceiling of user addresses.
    pub task_size: u64,
    /// Lowest address mappings may occupy.
    pub min_addr: u64,
    pub cache: CacheInfo,
}

impl Default for AddressSpaceParams {
    fn default() -> Self {
        Self {
            task_size: USER_VA_END,
            min_addr: DEFAULT_MMAP_MIN_ADDR,
            cache: CacheInfo::NON_ALIASING,
        }
    }
}

/// One process's mapping state.
#[derive(Debug)]
pub struct AddressSpace {
    pid: u32,
    params: AddressSpaceParams,
    layout: MmapLayout,
    regions: RwLock<RegionSet>,
}

impl AddressSpace {
    /// Create a space with a freshly picked layout.
    pub fn new(
        pid: u32,
        params: AddressSpaceParams,
        attrs: ProcessAttrs,
        entropy: &dyn EntropySource,
    ) -> Self {
        let layout = mmap_layout::pick_mmap_layout(attrs, params.task_size, entropy);
        Self::with_layout(pid, params, layout)
    }

    /// Create a space with a known layout, as exec-time rebuilds do.
    pub const fn with_layout(pid: u32, params: AddressSpaceParams, layout: MmapLayout) -> Self {
        Self {
            pid,
            params,
            layout,
            regions: RwLock::new(RegionSet::new()),
        }
    }

    pub const fn pid(&self) -> u32 {
        self.pid
    }

    pub const fn layout(&self) -> MmapLayout {
        self.layout
    }

    pub const fn mmap_base(&self) -> u64 {
        self.layout.base
    }

    /// Bytes currently mapped.
    pub fn total_mapped(&self) -> u64 {
        self.regions.read().total_bytes()
    }

    fn context(&self, regions: &RegionSet) -> MmapContext {
        MmapContext {
            pid: self.pid,
            task_size: self.params.task_size,
            min_addr: self.params.min_addr,
            mmap_base: self.layout.base,
            cache: self.params.cache,
            total_vm: regions.total_bytes(),
        }
    }

    fn search(&self, ctx: &MmapContext, req: &MappingRequest, regions: &RegionSet) -> PlacementResult {
        match self.layout.direction {
            MmapDirection::BottomUp => unmapped_area::find_unmapped_area(ctx, req, regions),
            MmapDirection::TopDown => unmapped_area::find_unmapped_area_topdown(ctx, req, regions),
        }
    }

    /// Find a placement without claiming it.
    pub fn find_unmapped_area(&self, req: &MappingRequest) -> PlacementResult {
        let regions = self.regions.read();
        let ctx = self.context(&regions);
        self.search(&ctx, req, &regions)
    }

    /// Find a placement and insert the region before releasing the lock.
    pub fn reserve(
        &self,
        req: &MappingRequest,
        flags: RegionFlags,
        backing: RegionBacking,
    ) -> PlacementResult {
        let regions = self.regions.upgradeable_read();
        let ctx = self.context(&regions);
        let addr = self.search(&ctx, req, &*regions)?;
        if req.flags.contains(MapFlags::FIXED) {
            // Fixed placements overlay whatever is there; the index keeps
            // tracking the regions it already holds.
            return Ok(addr);
        }
        let mut regions = regions.upgrade();
        let start = addr.as_u64();
        match regions.insert(Region::new(start, start + req.len, flags, backing)) {
            Ok(()) => Ok(addr),
            Err(_) => Err(PlacementError::OutOfMemory),
        }
    }

    /// Drop the region spanning exactly `[start, end)`.
    pub fn release(&self, start: u64, end: u64) -> bool {
        self.regions.write().remove(start, end)
    }

    /// Read access to the live regions.
    pub fn regions(&self) -> RwLockReadGuard<'_, RegionSet> {
        self.regions.read()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mmap_layout::Lfsr64;

    fn toy_space() -> AddressSpace {
        let params = AddressSpaceParams {
            task_size: 0x4000_0000,
            min_addr: 0x10000,
            cache: CacheInfo::NON_ALIASING,
        };
        let layout = MmapLayout {
            base: 0x1600_0000,
            direction: MmapDirection::BottomUp,
        };
        AddressSpace::with_layout(9, params, layout)
    }

    #[test]
    fn new_space_uses_picked_layout() {
        let entropy = Lfsr64::new(1);
        let attrs = ProcessAttrs {
            randomize: false,
            ..ProcessAttrs::default()
        };
        let space = AddressSpace::new(1, AddressSpaceParams::default(), attrs, &entropy);
        assert_eq!(space.layout().direction, MmapDirection::TopDown);
        assert_eq!(space.mmap_base(), 0x7FFF_F800_0000);
        assert_eq!(space.total_mapped(), 0);
    }

    #[test]
    fn reserve_claims_and_release_frees() {
        let space = toy_space();
        let first = space
            .reserve(
                &MappingRequest::anywhere(0x3000),
                RegionFlags::READ | RegionFlags::WRITE,
                RegionBacking::Anonymous,
            )
            .unwrap();
        assert_eq!(first.as_u64(), 0x1600_0000);
        assert_eq!(space.total_mapped(), 0x3000);

        // Mappings may abut upwards; the guard page only protects starts
        // from placements below them.
        let second = space
            .reserve(
                &MappingRequest::anywhere(0x1000),
                RegionFlags::READ,
                RegionBacking::File,
            )
            .unwrap();
        assert_eq!(second.as_u64(), 0x1600_3000);
        assert_eq!(space.total_mapped(), 0x4000);

        assert!(space.release(0x1600_0000, 0x1600_3000));
        assert!(!space.release(0x1600_0000, 0x1600_3000));
        assert_eq!(space.total_mapped(), 0x1000);
        assert_eq!(space.regions().len(), 1);
    }

    #[test]
    fn find_does_not_claim() {
        let space = toy_space();
        let req = MappingRequest::anywhere(0x1000);
        let a = space.find_unmapped_area(&req).unwrap();
        let b = space.find_unmapped_area(&req).unwrap();
        assert_eq!(a, b);
        assert_eq!(space.total_mapped(), 0);
    }

    #[test]
    fn fixed_reserve_leaves_index_alone() {
        let space = toy_space();
        space
            .reserve(
                &MappingRequest::anywhere(0x2000),
                RegionFlags::READ,
                RegionBacking::Anonymous,
            )
            .unwrap();

        let mut req = MappingRequest::at_hint(0x1600_0000, 0x1000);
        req.flags = MapFlags::FIXED;
        let addr = space
            .reserve(&req, RegionFlags::READ, RegionBacking::Shared)
            .unwrap();
        assert_eq!(addr.as_u64(), 0x1600_0000);
        assert_eq!(space.regions().len(), 1);
        assert_eq!(space.total_mapped(), 0x2000);
    }
}
