//! Cache-colour alignment for shared mappings.
//!
//! On virtually-indexed caches two mappings of the same file offset only
//! stay coherent when they land at the same colour, the address modulo the
//! aliasing granule. Placements for file-backed or shared mappings are
//! therefore steered to addresses congruent to the mapping's page offset
//! within the granule.

use emberos_abi::{PAGE_SHIFT, PAGE_SIZE};

/// Aliasing granule of a virtually-indexed cache with four page colours.
pub const SHM_COLOR_GRANULE: u64 = 4 * PAGE_SIZE;

/// Cache geometry a placement policy needs to know about.
#[derive(Debug, Clone, Copy)]
pub struct CacheInfo {
    /// Whether distinct virtual mappings of one physical page can occupy
    /// different cache lines.
    pub aliasing: bool,
    /// Colour period in bytes. Always a power of two and at least one page.
    pub granule: u64,
}

impl CacheInfo {
    /// Physically-indexed cache; colouring degenerates to page alignment.
    pub const NON_ALIASING: Self = Self {
        aliasing: false,
        granule: PAGE_SIZE,
    };

    /// Virtually-indexed aliasing cache with a four-page colour period.
    pub const VIPT_ALIASING: Self = Self {
        aliasing: true,
        granule: SHM_COLOR_GRANULE,
    };

    pub const fn mask(&self) -> u64 {
        self.granule - 1
    }
}

/// Whether a mapping must be colour-aligned: only aliasing caches care, and
/// only for pages that can be reached through more than one mapping.
pub const fn needs_color_align(file_backed: bool, shared: bool, cache: CacheInfo) -> bool {
    cache.aliasing && (file_backed || shared)
}

/// Colour the mapping's first page must land on.
pub const fn color_offset(pgoff: u64, cache: CacheInfo) -> u64 {
    (pgoff << PAGE_SHIFT) & cache.mask()
}

/// Round `addr` up to the next address of the mapping's colour. Addresses
/// already on colour are returned unchanged, so hints survive re-validation.
pub const fn color_align(addr: u64, pgoff: u64, cache: CacheInfo) -> u64 {
    let target = color_offset(pgoff, cache);
    addr.saturating_add(target.wrapping_sub(addr) & cache.mask())
}

/// Alignment mask for a gap search. The page-order bits are cleared since
/// gap candidates are already page-aligned.
pub const fn gap_align_mask(cache: CacheInfo, do_align: bool) -> u64 {
    if do_align {
        cache.mask() & !(PAGE_SIZE - 1)
    } else {
        0
    }
}

/// Whether a caller-fixed address sits on the mapping's colour.
pub const fn fixed_color_ok(addr: u64, pgoff: u64, cache: CacheInfo) -> bool {
    addr.wrapping_sub(pgoff << PAGE_SHIFT) & cache.mask() == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aligns_to_colour_and_stays_put() {
        let cache = CacheInfo::VIPT_ALIASING;
        let addr = color_align(0x1000, 3, cache);
        assert_eq!(addr % SHM_COLOR_GRANULE, color_offset(3, cache));
        assert_eq!(color_align(addr, 3, cache), addr);
        assert!(addr >= 0x1000);

        // Already on colour: untouched.
        assert_eq!(color_align(0x3000, 3, cache), 0x3000);
    }

    #[test]
    fn page_granule_degenerates_to_page_round_up() {
        let cache = CacheInfo::NON_ALIASING;
        assert_eq!(color_offset(7, cache), 0);
        assert_eq!(color_align(0x1234, 7, cache), 0x2000);
        assert_eq!(color_align(0x2000, 7, cache), 0x2000);
    }

    #[test]
    fn gap_mask_strips_page_bits() {
        assert_eq!(gap_align_mask(CacheInfo::VIPT_ALIASING, true), 0x3000);
        assert_eq!(gap_align_mask(CacheInfo::VIPT_ALIASING, false), 0);
        assert_eq!(gap_align_mask(CacheInfo::NON_ALIASING, true), 0);
    }

    #[test]
    fn colouring_applies_to_shared_or_file_pages_on_aliasing_caches() {
        let vipt = CacheInfo::VIPT_ALIASING;
        let pipt = CacheInfo::NON_ALIASING;
        assert!(needs_color_align(true, false, vipt));
        assert!(needs_color_align(false, true, vipt));
        assert!(!needs_color_align(false, false, vipt));
        assert!(!needs_color_align(true, true, pipt));
    }

    #[test]
    fn fixed_addresses_must_match_colour() {
        let cache = CacheInfo::VIPT_ALIASING;
        assert!(fixed_color_ok(0x2000, 2, cache));
        assert!(fixed_color_ok(0x16000, 2, cache));
        assert!(!fixed_color_ok(0x3000, 2, cache));
        // pgoff reduces modulo the colour count.
        assert!(fixed_color_ok(0x2000, 6, cache));
    }
}
