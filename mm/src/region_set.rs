//! Region index for gap searches.
//!
//! [`RegionIndex`] is the surface the gap finder consumes; [`RegionSet`] is
//! the sorted-vector reference implementation behind it. An augmented search
//! tree can slot in behind the same trait once address spaces carry enough
//! regions to justify one.

use alloc::vec::Vec;

use emberos_abi::PAGE_SIZE;

use crate::region::Region;

/// Free page kept below every region's start. A placement may end at
/// `start_gap(region.start)` but never closer to the region.
pub const GUARD_GAP: u64 = PAGE_SIZE;

/// Highest address a placement may end at given the guard page below
/// `start`.
#[inline]
pub const fn start_gap(start: u64) -> u64 {
    start.saturating_sub(GUARD_GAP)
}

/// Parameters of one gap search.
///
/// A hit `addr` satisfies `low <= addr`, `addr + length <= high`, the
/// colour congruence `(addr - align_offset) & align_mask == 0`, and clears
/// the guard page of the nearest region above it.
#[derive(Debug, Clone, Copy)]
pub struct GapQuery {
    pub low: u64,
    pub high: u64,
    pub length: u64,
    pub align_mask: u64,
    pub align_offset: u64,
}

/// Interval index over the mapped regions of one address space.
pub trait RegionIndex {
    /// First region whose end lies above `addr`: the region containing
    /// `addr`, or failing that the nearest one after it.
    fn region_following(&self, addr: u64) -> Option<Region>;

    /// Lowest fitting placement for `query`, ascending first-fit.
    fn lowest_gap(&self, query: &GapQuery) -> Option<u64>;

    /// Highest fitting placement for `query`, descending first-fit.
    fn highest_gap(&self, query: &GapQuery) -> Option<u64>;
}

/// Rejected [`RegionSet::insert`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertError {
    /// `start >= end`.
    EmptyRegion,
    /// The interval intersects an existing region.
    Overlap,
}

/// Sorted, non-overlapping set of mapped regions.
#[derive(Debug, Default)]
pub struct RegionSet {
    regions: Vec<Region>,
    total_bytes: u64,
}

impl RegionSet {
    pub const fn new() -> Self {
        Self {
            regions: Vec::new(),
            total_bytes: 0,
        }
    }

    /// Insert a region, keeping the set sorted by start address.
    pub fn insert(&mut self, region: Region) -> Result<(), InsertError> {
        if region.is_empty() {
            return Err(InsertError::EmptyRegion);
        }
        let idx = self.regions.partition_point(|r| r.end <= region.start);
        if let Some(next) = self.regions.get(idx) {
            if next.start < region.end {
                return Err(InsertError::Overlap);
            }
        }
        self.regions.insert(idx, region);
        self.total_bytes += region.len();
        Ok(())
    }

    /// Remove the region exactly spanning `[start, end)`. Returns false when
    /// no region has those bounds. Splitting for partial unmaps is the
    /// installer's concern, not the index's.
    pub fn remove(&mut self, start: u64, end: u64) -> bool {
        let idx = self.regions.partition_point(|r| r.start < start);
        if let Some(region) = self.regions.get(idx) {
            if region.start == start && region.end == end {
                self.total_bytes -= region.len();
                self.regions.remove(idx);
                return true;
            }
        }
        false
    }

    pub fn iter(&self) -> impl Iterator<Item = &Region> {
        self.regions.iter()
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// Sum of region lengths, maintained incrementally.
    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }
}

impl RegionIndex for RegionSet {
    fn region_following(&self, addr: u64) -> Option<Region> {
        let idx = self.regions.partition_point(|r| r.end <= addr);
        self.regions.get(idx).copied()
    }

    fn lowest_gap(&self, query: &GapQuery) -> Option<u64> {
        if query.length == 0 || query.high <= query.low {
            return None;
        }
        let mut floor = query.low;
        for region in &self.regions {
            if region.end <= floor {
                continue;
            }
            let ceil = start_gap(region.start).min(query.high);
            if let Some(addr) = fit_ascending(floor, ceil, query) {
                return Some(addr);
            }
            floor = region.end;
            if floor >= query.high {
                return None;
            }
        }
        fit_ascending(floor, query.high, query)
    }

    fn highest_gap(&self, query: &GapQuery) -> Option<u64> {
        if query.length == 0 || query.high <= query.low {
            return None;
        }
        let mut ceil = query.high;
        for region in self.regions.iter().rev() {
            if region.end < ceil {
                let floor = region.end.max(query.low);
                if let Some(addr) = fit_descending(floor, ceil, query) {
                    return Some(addr);
                }
            }
            // A region at or beyond the ceiling still projects its guard
            // page into the range below.
            ceil = ceil.min(start_gap(region.start));
            if ceil <= query.low {
                return None;
            }
        }
        fit_descending(query.low, ceil, query)
    }
}

/// Lowest aligned candidate in `[floor, ceil)` with room for the requested
/// length.
fn fit_ascending(floor: u64, ceil: u64, query: &GapQuery) -> Option<u64> {
    if ceil <= floor {
        return None;
    }
    let addr = floor.checked_add(query.align_offset.wrapping_sub(floor) & query.align_mask)?;
    let end = addr.checked_add(query.length)?;
    if end <= ceil { Some(addr) } else { None }
}

/// Highest aligned candidate in `[floor, ceil)` with room for the requested
/// length.
fn fit_descending(floor: u64, ceil: u64, query: &GapQuery) -> Option<u64> {
    if ceil <= floor || ceil - floor < query.length {
        return None;
    }
    let base = ceil - query.length;
    let addr = base.checked_sub(base.wrapping_sub(query.align_offset) & query.align_mask)?;
    if addr >= floor { Some(addr) } else { None }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(regions: &[(u64, u64)]) -> RegionSet {
        let mut s = RegionSet::new();
        for &(start, end) in regions {
            s.insert(Region::anon(start, end)).unwrap();
        }
        s
    }

    fn query(low: u64, high: u64, length: u64) -> GapQuery {
        GapQuery {
            low,
            high,
            length,
            align_mask: 0,
            align_offset: 0,
        }
    }

    fn colour_query(low: u64, high: u64, length: u64, offset: u64) -> GapQuery {
        GapQuery {
            low,
            high,
            length,
            align_mask: 0x3000,
            align_offset: offset,
        }
    }

    #[test]
    fn insert_keeps_order_and_rejects_overlap() {
        let mut s = RegionSet::new();
        s.insert(Region::anon(0x4000, 0x5000)).unwrap();
        s.insert(Region::anon(0x1000, 0x2000)).unwrap();
        s.insert(Region::anon(0x2000, 0x3000)).unwrap();

        let starts: Vec<u64> = s.iter().map(|r| r.start).collect();
        assert_eq!(starts, [0x1000, 0x2000, 0x4000]);

        assert_eq!(
            s.insert(Region::anon(0x1800, 0x2800)),
            Err(InsertError::Overlap)
        );
        assert_eq!(
            s.insert(Region::anon(0x4FFF, 0x6000)),
            Err(InsertError::Overlap)
        );
        assert_eq!(
            s.insert(Region::anon(0x7000, 0x7000)),
            Err(InsertError::EmptyRegion)
        );
        assert_eq!(s.len(), 3);
    }

    #[test]
    fn remove_exact_span_only() {
        let mut s = set(&[(0x1000, 0x2000), (0x3000, 0x5000)]);
        assert!(!s.remove(0x3000, 0x4000));
        assert!(!s.remove(0x2000, 0x3000));
        assert!(s.remove(0x3000, 0x5000));
        assert_eq!(s.len(), 1);
        assert_eq!(s.total_bytes(), 0x1000);
    }

    #[test]
    fn total_bytes_tracks_inserts_and_removes() {
        let mut s = RegionSet::new();
        assert_eq!(s.total_bytes(), 0);
        s.insert(Region::anon(0x1000, 0x4000)).unwrap();
        s.insert(Region::anon(0x8000, 0x9000)).unwrap();
        assert_eq!(s.total_bytes(), 0x4000);
        s.remove(0x1000, 0x4000);
        assert_eq!(s.total_bytes(), 0x1000);
    }

    #[test]
    fn region_following_semantics() {
        let s = set(&[(0x2000, 0x3000), (0x5000, 0x6000)]);
        assert_eq!(s.region_following(0x0).unwrap().start, 0x2000);
        assert_eq!(s.region_following(0x2800).unwrap().start, 0x2000);
        assert_eq!(s.region_following(0x3000).unwrap().start, 0x5000);
        assert_eq!(s.region_following(0x5FFF).unwrap().start, 0x5000);
        assert!(s.region_following(0x6000).is_none());
    }

    #[test]
    fn lowest_gap_empty_set_returns_low() {
        let s = RegionSet::new();
        assert_eq!(s.lowest_gap(&query(0x8000, 0x100000, 0x1000)), Some(0x8000));
    }

    #[test]
    fn lowest_gap_respects_guard_page() {
        // Gap before [0x10000, 0x11000) runs up to 0xF000 only.
        let s = set(&[(0x10000, 0x11000)]);
        assert_eq!(s.lowest_gap(&query(0, 0x100000, 0xF000)), Some(0));
        // 0x10000 bytes no longer fit below; first fit is past the region.
        assert_eq!(s.lowest_gap(&query(0, 0x100000, 0x10000)), Some(0x11000));
    }

    #[test]
    fn lowest_gap_skips_small_gaps() {
        let s = set(&[(0x2000, 0x3000), (0x6000, 0x7000)]);
        // [0x3000, 0x5000) is the gap before 0x6000's guard; too small for
        // 0x3000 bytes, so the fit lands after the second region.
        assert_eq!(s.lowest_gap(&query(0x2000, 0x100000, 0x3000)), Some(0x7000));
        assert_eq!(s.lowest_gap(&query(0x2000, 0x100000, 0x2000)), Some(0x3000));
    }

    #[test]
    fn lowest_gap_honours_high_limit() {
        let s = RegionSet::new();
        assert_eq!(s.lowest_gap(&query(0, 0x3000, 0x3000)), Some(0));
        assert!(s.lowest_gap(&query(0, 0x3000, 0x3001)).is_none());
        assert!(s.lowest_gap(&query(0x3000, 0x3000, 0x1000)).is_none());
        assert!(s.lowest_gap(&query(0, 0x3000, 0)).is_none());
    }

    #[test]
    fn lowest_gap_sees_guard_of_region_at_high() {
        // Region starts exactly at the high limit: its guard page still
        // shortens the usable range.
        let s = set(&[(0x30000, 0x40000)]);
        assert_eq!(s.lowest_gap(&query(0x2E000, 0x30000, 0x1000)), Some(0x2E000));
        assert!(s.lowest_gap(&query(0x2E000, 0x30000, 0x2000)).is_none());
    }

    #[test]
    fn lowest_gap_colour_congruence() {
        let s = RegionSet::new();
        let q = colour_query(0x1000, 0x100000, 0x1000, 0x2000);
        let addr = s.lowest_gap(&q).unwrap();
        assert_eq!(addr, 0x2000);
        assert_eq!(addr & 0x3000, 0x2000);

        // Unmasked page offsets reduce correctly modulo the granule.
        let q = colour_query(0, 0x100000, 0x1000, 0x16000);
        assert_eq!(s.lowest_gap(&q), Some(0x2000));
    }

    #[test]
    fn lowest_gap_region_at_zero() {
        let s = set(&[(0, 0x1000)]);
        assert_eq!(s.lowest_gap(&query(0, 0x100000, 0x1000)), Some(0x1000));
    }

    #[test]
    fn highest_gap_empty_set_hugs_ceiling() {
        let s = RegionSet::new();
        assert_eq!(
            s.highest_gap(&query(0x1000, 0x30000000, 0x2000)),
            Some(0x2FFFE000)
        );
    }

    #[test]
    fn highest_gap_clamped_by_abutting_region() {
        // Region ends exactly at the ceiling; the next candidate sits below
        // its start minus the guard page.
        let s = set(&[(0x2F000000, 0x30000000)]);
        assert_eq!(
            s.highest_gap(&query(0x1000, 0x30000000, 0x2000)),
            Some(0x2EFFD000)
        );
    }

    #[test]
    fn highest_gap_prefers_highest_fit() {
        let s = set(&[(0x10000, 0x20000)]);
        // Both sides of the region could fit the request; descending
        // first-fit takes the upper gap.
        assert_eq!(
            s.highest_gap(&query(0x1000, 0x40000, 0x4000)),
            Some(0x3C000)
        );
    }

    #[test]
    fn highest_gap_falls_through_to_lowest_range() {
        let s = set(&[(0x10000, 0x20000)]);
        // Upper gap [0x20000, 0x21000) too small once the request grows.
        assert_eq!(
            s.highest_gap(&query(0x1000, 0x21000, 0x4000)),
            Some(0xB000)
        );
    }

    #[test]
    fn highest_gap_respects_floor() {
        let s = set(&[(0x4000, 0x5000)]);
        assert_eq!(s.highest_gap(&query(0x1000, 0x4000, 0x1000)), Some(0x2000));
        assert!(s.highest_gap(&query(0x2500, 0x4000, 0x1000)).is_none());
    }

    #[test]
    fn highest_gap_colour_congruence() {
        let s = RegionSet::new();
        let q = colour_query(0x1000, 0x20000, 0x3000, 0x2000);
        let addr = s.highest_gap(&q).unwrap();
        assert_eq!(addr, 0x1A000);
        assert_eq!(addr & 0x3000, 0x2000);
    }

    #[test]
    fn gap_queries_are_read_only() {
        let s = set(&[(0x2000, 0x3000)]);
        let before: Vec<Region> = s.iter().copied().collect();
        let _ = s.lowest_gap(&query(0, 0x100000, 0x1000));
        let _ = s.highest_gap(&query(0, 0x100000, 0x1000));
        let _ = s.region_following(0x0);
        let after: Vec<Region> = s.iter().copied().collect();
        assert_eq!(before, after);
    }
}
