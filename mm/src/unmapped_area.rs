//! Free-range searches for new mappings.
//!
//! Both entry points share a preamble: a length precondition, fixed-address
//! validation, and a single probe of the caller's hint. Only when the hint
//! is absent or unusable do they walk the region index, bottom-up from the
//! layout base or top-down beneath it. Failures come back as values; a zero
//! address is an ordinary successful placement.

use bitflags::bitflags;

use emberos_abi::addr::VirtAddr;
use emberos_abi::{FIRST_USER_ADDRESS, PAGE_SHIFT, PAGE_SIZE};
use emberos_lib::ratelimit::RateLimit;
use emberos_lib::{align_up_u64, clock, klog_error};

use crate::color_align::{self, CacheInfo};
use crate::error::{PlacementError, PlacementResult};
use crate::mmap_layout::MmapDirection;
use crate::region_set::{GapQuery, RegionIndex, start_gap};

bitflags! {
    /// Caller-supplied placement flags.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct MapFlags: u32 {
        /// The hint is a demand, not a preference.
        const FIXED = 1 << 0;
        /// Mapping is shared rather than private.
        const SHARED = 1 << 1;
    }
}

/// One placement request.
#[derive(Debug, Clone, Copy)]
pub struct MappingRequest {
    /// Preferred address, zero for none.
    pub hint: u64,
    /// Length in bytes.
    pub len: u64,
    /// Page offset into the backing object.
    pub pgoff: u64,
    pub flags: MapFlags,
    /// Whether a file backs the mapping.
    pub file_backed: bool,
}

impl MappingRequest {
    /// Anonymous private mapping, placed wherever the policy likes.
    pub const fn anywhere(len: u64) -> Self {
        Self {
            hint: 0,
            len,
            pgoff: 0,
            flags: MapFlags::empty(),
            file_backed: false,
        }
    }

    /// Anonymous private mapping with a preferred address.
    pub const fn at_hint(hint: u64, len: u64) -> Self {
        Self {
            hint,
            ..Self::anywhere(len)
        }
    }
}

/// Address-space facts one search runs against.
#[derive(Debug, Clone, Copy)]
pub struct MmapContext {
    pub pid: u32,
    /// Exclusive ceiling of user addresses.
    pub task_size: u64,
    /// Lowest address mappings may occupy.
    pub min_addr: u64,
    /// Base the layout policy picked for this space.
    pub mmap_base: u64,
    pub cache: CacheInfo,
    /// Bytes currently mapped, reported in diagnostics.
    pub total_vm: u64,
}

// Placement failures tend to arrive in bursts from a looping caller, so
// each entry point reports through its own rate limit.
static BOTTOMUP_DIAG: RateLimit = RateLimit::with_defaults("mmap: find_unmapped_area");
static TOPDOWN_DIAG: RateLimit = RateLimit::with_defaults("mmap: find_unmapped_area_topdown");

fn length_diag(rs: &RateLimit, ctx: &MmapContext, req: &MappingRequest) {
    if rs.check(clock::ticks_ms()) {
        klog_error!(
            "{}: len={:#x} exceeds range: task_size={:#x} mmap_min_addr={:#x} pid={} total_vm={:#x} addr={:#x}",
            rs.name(),
            req.len,
            ctx.task_size,
            ctx.min_addr,
            ctx.pid,
            ctx.total_vm,
            req.hint
        );
    }
}

fn search_diag(rs: &RateLimit, ctx: &MmapContext, direction: MmapDirection, query: &GapQuery) {
    if rs.check(clock::ticks_ms()) {
        klog_error!(
            "{}: no free area: pid={} total_vm={:#x} direction={:?} length={:#x} low_limit={:#x} high_limit={:#x} align_mask={:#x} align_offset={:#x}",
            rs.name(),
            ctx.pid,
            ctx.total_vm,
            direction,
            query.length,
            query.low,
            query.high,
            query.align_mask,
            query.align_offset
        );
    }
}

/// Wrap a raw candidate, mapping non-canonical addresses to `err`.
fn place(addr: u64, err: PlacementError) -> PlacementResult {
    VirtAddr::try_new(addr).ok_or(err)
}

/// Whether the aligned hint clears the guard page of the region above it.
/// The caller has already bounded `addr + len` by the task size.
fn hint_fits(index: &dyn RegionIndex, addr: u64, len: u64) -> bool {
    match index.region_following(addr) {
        Some(region) => addr + len <= start_gap(region.start),
        None => true,
    }
}

enum Preamble {
    Done(PlacementResult),
    Search { do_align: bool },
}

/// Checks shared by both directions, in order: length bound, fixed-address
/// validation, hint probe.
fn preamble(
    ctx: &MmapContext,
    req: &MappingRequest,
    index: &dyn RegionIndex,
    rs: &RateLimit,
) -> Preamble {
    if req.len > ctx.task_size.saturating_sub(ctx.min_addr) {
        length_diag(rs, ctx, req);
        return Preamble::Done(Err(PlacementError::OutOfMemory));
    }

    let do_align = color_align::needs_color_align(
        req.file_backed,
        req.flags.contains(MapFlags::SHARED),
        ctx.cache,
    );

    if req.flags.contains(MapFlags::FIXED) {
        // Fixed addresses are taken as given; only the colour congruence
        // can reject them. Overlap with live regions is the installer's
        // problem, not the search's.
        if do_align && !color_align::fixed_color_ok(req.hint, req.pgoff, ctx.cache) {
            return Preamble::Done(Err(PlacementError::InvalidFixedAddress));
        }
        return Preamble::Done(place(req.hint, PlacementError::InvalidFixedAddress));
    }

    if req.hint != 0 && req.len != 0 {
        let addr = if do_align {
            color_align::color_align(req.hint, req.pgoff, ctx.cache)
        } else {
            align_up_u64(req.hint, PAGE_SIZE)
        };
        if ctx.task_size.saturating_sub(req.len) >= addr
            && addr >= ctx.min_addr
            && hint_fits(index, addr, req.len)
        {
            return Preamble::Done(place(addr, PlacementError::OutOfMemory));
        }
    }

    Preamble::Search { do_align }
}

/// Bottom-up placement: ascending first-fit between the layout base and the
/// task ceiling.
pub fn find_unmapped_area(
    ctx: &MmapContext,
    req: &MappingRequest,
    index: &dyn RegionIndex,
) -> PlacementResult {
    let do_align = match preamble(ctx, req, index, &BOTTOMUP_DIAG) {
        Preamble::Done(result) => return result,
        Preamble::Search { do_align } => do_align,
    };

    let query = GapQuery {
        low: ctx.mmap_base.max(ctx.min_addr),
        high: ctx.task_size,
        length: req.len,
        align_mask: color_align::gap_align_mask(ctx.cache, do_align),
        align_offset: req.pgoff << PAGE_SHIFT,
    };
    match index.lowest_gap(&query) {
        Some(addr) => place(addr, PlacementError::OutOfMemory),
        None => {
            search_diag(&BOTTOMUP_DIAG, ctx, MmapDirection::BottomUp, &query);
            Err(PlacementError::OutOfMemory)
        }
    }
}

/// Top-down placement: descending first-fit beneath the layout base, with a
/// bottom-up retry above it. The window below the base can be too small when
/// a large stack limit squeezed the base down.
pub fn find_unmapped_area_topdown(
    ctx: &MmapContext,
    req: &MappingRequest,
    index: &dyn RegionIndex,
) -> PlacementResult {
    let do_align = match preamble(ctx, req, index, &TOPDOWN_DIAG) {
        Preamble::Done(result) => return result,
        Preamble::Search { do_align } => do_align,
    };

    let primary = GapQuery {
        low: FIRST_USER_ADDRESS.max(ctx.min_addr),
        high: ctx.mmap_base,
        length: req.len,
        align_mask: color_align::gap_align_mask(ctx.cache, do_align),
        align_offset: req.pgoff << PAGE_SHIFT,
    };
    if let Some(addr) = index.highest_gap(&primary) {
        return place(addr, PlacementError::OutOfMemory);
    }

    let fallback = GapQuery {
        low: ctx.mmap_base.max(ctx.min_addr),
        high: ctx.task_size,
        ..primary
    };
    match index.lowest_gap(&fallback) {
        Some(addr) => place(addr, PlacementError::OutOfMemory),
        None => {
            search_diag(&TOPDOWN_DIAG, ctx, MmapDirection::BottomUp, &fallback);
            Err(PlacementError::OutOfMemory)
        }
    }
}
