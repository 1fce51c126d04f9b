//! Physical range validation for raw memory access.
//!
//! Backs the character-device style interfaces that expose physical memory:
//! reads must stay inside installed RAM, mmap targets must stay below the
//! addressable frame limit, and in strict mode frames belonging to RAM or
//! to a driver are withheld from userspace entirely.

use emberos_abi::PAGE_SHIFT;
use emberos_abi::addr::PhysAddr;
use emberos_lib::klog_debug;

/// Bounds of installed memory.
#[derive(Debug, Clone, Copy)]
pub struct PhysMemInfo {
    /// First byte of RAM.
    pub phys_offset: u64,
    /// One past the last directly-mapped byte of RAM.
    pub ram_limit: u64,
    /// Highest addressable page frame number.
    pub max_pfn: u64,
}

/// Whether `[addr, addr + size)` lies entirely within installed RAM.
pub fn valid_phys_range(addr: PhysAddr, size: u64, info: &PhysMemInfo) -> bool {
    let start = addr.as_u64();
    if start < info.phys_offset {
        return false;
    }
    match start.checked_add(size) {
        Some(end) => end <= info.ram_limit,
        None => false,
    }
}

/// Whether a mapping of `size` bytes starting at frame `pfn` stays below
/// the addressable frame limit.
pub fn valid_mmap_phys_range(pfn: u64, size: u64, info: &PhysMemInfo) -> bool {
    match pfn.checked_add(size >> PAGE_SHIFT) {
        Some(end) => end <= info.max_pfn.saturating_add(1),
        None => false,
    }
}

#[derive(Debug, Clone, Copy)]
struct PhysRange {
    start: u64,
    end: u64,
}

impl PhysRange {
    const fn zeroed() -> Self {
        Self { start: 0, end: 0 }
    }

    const fn contains(&self, addr: u64) -> bool {
        self.start <= addr && addr < self.end
    }
}

/// Slots per range table.
pub const IOMEM_RANGE_CAP: usize = 64;

/// Registry of RAM and driver-exclusive physical ranges, filled once at
/// boot from the platform memory map. Fixed capacity; ranges past the cap
/// are dropped and counted.
#[derive(Debug)]
pub struct IoMemMap {
    ram: [PhysRange; IOMEM_RANGE_CAP],
    ram_count: usize,
    exclusive: [PhysRange; IOMEM_RANGE_CAP],
    exclusive_count: usize,
    overflows: u32,
}

impl IoMemMap {
    pub const fn new() -> Self {
        Self {
            ram: [PhysRange::zeroed(); IOMEM_RANGE_CAP],
            ram_count: 0,
            exclusive: [PhysRange::zeroed(); IOMEM_RANGE_CAP],
            exclusive_count: 0,
            overflows: 0,
        }
    }

    fn add_range(
        slots: &mut [PhysRange; IOMEM_RANGE_CAP],
        count: &mut usize,
        overflows: &mut u32,
        start: u64,
        end: u64,
    ) -> bool {
        if start >= end {
            return false;
        }
        if *count == IOMEM_RANGE_CAP {
            *overflows += 1;
            return false;
        }
        slots[*count] = PhysRange { start, end };
        *count += 1;
        true
    }

    /// Register `[start, end)` as system RAM.
    pub fn add_ram_range(&mut self, start: u64, end: u64) -> bool {
        Self::add_range(
            &mut self.ram,
            &mut self.ram_count,
            &mut self.overflows,
            start,
            end,
        )
    }

    /// Register `[start, end)` as exclusively owned by a driver.
    pub fn add_exclusive_range(&mut self, start: u64, end: u64) -> bool {
        Self::add_range(
            &mut self.exclusive,
            &mut self.exclusive_count,
            &mut self.overflows,
            start,
            end,
        )
    }

    /// Whether any byte of page frame `pfn` is RAM.
    pub fn page_is_ram(&self, pfn: u64) -> bool {
        self.ram[..self.ram_count]
            .iter()
            .any(|range| pfn >= range.start >> PAGE_SHIFT && pfn <= (range.end - 1) >> PAGE_SHIFT)
    }

    /// Whether `addr` falls inside a driver-exclusive range.
    pub fn is_exclusive(&self, addr: PhysAddr) -> bool {
        self.exclusive[..self.exclusive_count]
            .iter()
            .any(|range| range.contains(addr.as_u64()))
    }

    /// Ranges dropped because a table was full.
    pub const fn overflows(&self) -> u32 {
        self.overflows
    }
}

impl Default for IoMemMap {
    fn default() -> Self {
        Self::new()
    }
}

/// Whether userspace may map page frame `pfn` through the raw memory
/// device. Without `strict` every frame is allowed; with it, frames owned
/// by a driver or backed by RAM are refused.
pub fn devmem_is_allowed(pfn: u64, iomem: &IoMemMap, strict: bool) -> bool {
    if !strict {
        return true;
    }
    let Some(addr) = PhysAddr::from_pfn(pfn) else {
        return false;
    };
    if iomem.is_exclusive(addr) {
        klog_debug!("devmem: frame {:#x} is driver exclusive", pfn);
        return false;
    }
    if iomem.page_is_ram(pfn) {
        klog_debug!("devmem: frame {:#x} is system RAM", pfn);
        return false;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    const INFO: PhysMemInfo = PhysMemInfo {
        phys_offset: 0x4000_0000,
        ram_limit: 0x8000_0000,
        max_pfn: 0xFFFF,
    };

    fn phys(addr: u64) -> PhysAddr {
        PhysAddr::new(addr)
    }

    #[test]
    fn phys_range_must_stay_inside_ram() {
        assert!(valid_phys_range(phys(0x4000_0000), 0x1000, &INFO));
        assert!(valid_phys_range(phys(0x7FFF_F000), 0x1000, &INFO));
        assert!(!valid_phys_range(phys(0x7FFF_F000), 0x1001, &INFO));
        assert!(!valid_phys_range(phys(0x3FFF_F000), 0x1000, &INFO));
        assert!(!valid_phys_range(phys(0x4000_0000), u64::MAX, &INFO));
    }

    #[test]
    fn mmap_range_checked_against_frame_limit() {
        assert!(valid_mmap_phys_range(0xFFFF, 0x1000, &INFO));
        assert!(!valid_mmap_phys_range(0xFFFF, 0x2000, &INFO));
        assert!(valid_mmap_phys_range(0, 0x1000_0000, &INFO));
        assert!(!valid_mmap_phys_range(u64::MAX, 0x1000, &INFO));
    }

    fn boot_map() -> IoMemMap {
        let mut iomem = IoMemMap::new();
        assert!(iomem.add_ram_range(0x4000_0000, 0x4010_0000));
        assert!(iomem.add_exclusive_range(0x5000_0000, 0x5000_1000));
        iomem
    }

    #[test]
    fn devmem_policy_matrix() {
        let iomem = boot_map();
        let ram_pfn = 0x4000_0000 >> PAGE_SHIFT;
        let exclusive_pfn = 0x5000_0000 >> PAGE_SHIFT;
        let free_pfn = 0x6000_0000 >> PAGE_SHIFT;

        assert!(devmem_is_allowed(ram_pfn, &iomem, false));
        assert!(devmem_is_allowed(exclusive_pfn, &iomem, false));

        assert!(!devmem_is_allowed(ram_pfn, &iomem, true));
        assert!(!devmem_is_allowed(exclusive_pfn, &iomem, true));
        assert!(devmem_is_allowed(free_pfn, &iomem, true));
        // Frames past the physical address limit never map.
        assert!(!devmem_is_allowed(u64::MAX, &iomem, true));
    }

    #[test]
    fn partial_page_of_ram_blocks_the_whole_frame() {
        let mut iomem = IoMemMap::new();
        iomem.add_ram_range(0x4000_0800, 0x4000_0900);
        assert!(iomem.page_is_ram(0x4000_0800 >> PAGE_SHIFT));
        assert!(!iomem.page_is_ram(0x4000_1000 >> PAGE_SHIFT));
    }

    #[test]
    fn full_table_drops_and_counts() {
        let mut iomem = IoMemMap::new();
        for i in 0..IOMEM_RANGE_CAP as u64 {
            assert!(iomem.add_ram_range(i * 0x1000, i * 0x1000 + 0x800));
        }
        assert!(!iomem.add_ram_range(0x1000_0000, 0x1000_1000));
        assert_eq!(iomem.overflows(), 1);
        // Rejected empty ranges are not overflow.
        assert!(!iomem.add_exclusive_range(0x2000, 0x2000));
        assert_eq!(iomem.overflows(), 1);
        // The exclusive table still has room.
        assert!(iomem.add_exclusive_range(0x2000, 0x3000));
    }
}
