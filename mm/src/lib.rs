//! Virtual address-space placement.
//!
//! Decides where new mappings land inside a process's address space: layout
//! selection at process creation, cache-colour constraints for shared pages,
//! gap searches over the live region set, and validation of raw physical
//! memory access. Placement is pure policy; installing and tearing down
//! mappings stays with the caller.

#![no_std]

extern crate alloc;
#[cfg(test)]
extern crate std;

pub mod address_space;
pub mod color_align;
pub mod error;
pub mod mmap_layout;
pub mod phys_mem;
pub mod region;
pub mod region_set;
pub mod unmapped_area;


pub use address_space::{AddressSpace, AddressSpaceParams};
pub use color_align::CacheInfo;
pub use error::{PlacementError, PlacementResult};
pub use mmap_layout::{
    EntropySource, Lfsr64, MmapConfig, MmapDirection, MmapLayout, ProcessAttrs, pick_mmap_layout,
    pick_mmap_layout_with,
};
pub use phys_mem::{IoMemMap, PhysMemInfo, devmem_is_allowed, valid_mmap_phys_range, valid_phys_range};
pub use region::{Region, RegionBacking, RegionFlags};
pub use region_set::{GUARD_GAP, GapQuery, InsertError, RegionIndex, RegionSet};
pub use unmapped_area::{
    MapFlags, MappingRequest, MmapContext, find_unmapped_area, find_unmapped_area_topdown,
};
