//! Layout selection for fresh address spaces.
//!
//! Chooses where anonymous mappings start: bottom-up from a fixed floor a
//! third of the way into the address space (legacy), or top-down from a
//! base tucked below the stack reservation. Either base can carry a
//! randomized offset.

use core::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};

use emberos_abi::{PAGE_SHIFT, PAGE_SIZE, SZ_16M};
use emberos_lib::align_up_u64;

// ==================== Layout constants ====================

/// Smallest reservation kept between the top-down base and the ceiling of
/// the address space, covering the stack and room to grow it.
pub const MIN_GAP: u64 = 128 * 1024 * 1024;

/// Stack limit value meaning "unlimited".
pub const RLIM_INFINITY: u64 = u64::MAX;

/// Entropy width used for randomized bases until the knob is changed.
pub const DEFAULT_RND_BITS: u8 = 28;

/// Upper bound for the rnd-bits knob.
pub const MAX_RND_BITS: u8 = 32;

/// Largest stack reservation honoured by the top-down base, five sixths of
/// the address space.
const fn max_gap(task_size: u64) -> u64 {
    task_size / 6 * 5
}

/// Legacy bottom-up floor, a third of the way up and rounded to a 16 MiB
/// boundary.
const fn legacy_unmapped_base(task_size: u64) -> u64 {
    align_up_u64(task_size / 3, SZ_16M)
}

// ==================== Layout types ====================

/// Direction gap searches walk in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MmapDirection {
    BottomUp,
    TopDown,
}

/// Placement policy of one address space, fixed at creation.
#[derive(Debug, Clone, Copy)]
pub struct MmapLayout {
    pub base: u64,
    pub direction: MmapDirection,
}

/// Per-process inputs to layout selection.
#[derive(Debug, Clone, Copy)]
pub struct ProcessAttrs {
    /// Process opted into the compatibility personality.
    pub compat_layout: bool,
    /// Soft stack size limit in bytes, or [`RLIM_INFINITY`].
    pub stack_limit: u64,
    /// Whether this process gets a randomized base.
    pub randomize: bool,
}

impl Default for ProcessAttrs {
    fn default() -> Self {
        Self {
            compat_layout: false,
            stack_limit: 8 * 1024 * 1024,
            randomize: true,
        }
    }
}

// ==================== Global configuration ====================

/// Runtime layout knobs, the equivalents of the legacy-layout and
/// rnd-bits sysctls.
#[derive(Debug, Clone, Copy)]
pub struct MmapConfig {
    pub legacy_layout: bool,
    pub rnd_bits: u8,
}

pub const fn default_config() -> MmapConfig {
    MmapConfig {
        legacy_layout: false,
        rnd_bits: DEFAULT_RND_BITS,
    }
}

impl Default for MmapConfig {
    fn default() -> Self {
        default_config()
    }
}

static LEGACY_LAYOUT: AtomicBool = AtomicBool::new(false);
static RND_BITS: AtomicU8 = AtomicU8::new(DEFAULT_RND_BITS);

/// Snapshot of the global knobs.
pub fn get_config() -> MmapConfig {
    MmapConfig {
        legacy_layout: LEGACY_LAYOUT.load(Ordering::Relaxed),
        rnd_bits: RND_BITS.load(Ordering::Relaxed),
    }
}

/// Force the legacy bottom-up layout for every subsequent pick.
pub fn set_legacy_layout(enabled: bool) {
    LEGACY_LAYOUT.store(enabled, Ordering::Relaxed);
}

/// Set the entropy width for future picks, clamped to [`MAX_RND_BITS`].
pub fn set_rnd_bits(bits: u8) {
    RND_BITS.store(bits.min(MAX_RND_BITS), Ordering::Relaxed);
}

// ==================== Entropy ====================

/// Source of layout randomness.
pub trait EntropySource: Sync {
    fn next_u64(&self) -> u64;

    /// Uniform draw from `[0, bound)`. A zero bound yields zero. Powers of
    /// two are masked; other bounds take the remainder, whose bias is
    /// negligible at the widths drawn here.
    fn next_uniform(&self, bound: u64) -> u64 {
        if bound == 0 {
            return 0;
        }
        let raw = self.next_u64();
        if bound.is_power_of_two() {
            raw & (bound - 1)
        } else {
            raw % bound
        }
    }
}

/// xorshift generator behind an atomic word. Layout randomization wants
/// cheap unpredictability, not cryptographic strength.
pub struct Lfsr64 {
    state: AtomicU64,
}

impl Lfsr64 {
    /// A zero seed would pin the generator, so the low bit is forced.
    pub const fn new(seed: u64) -> Self {
        Self {
            state: AtomicU64::new(seed | 1),
        }
    }
}

impl EntropySource for Lfsr64 {
    fn next_u64(&self) -> u64 {
        let mut current = self.state.load(Ordering::Relaxed);
        loop {
            let mut x = current;
            x ^= x << 13;
            x ^= x >> 7;
            x ^= x << 17;
            match self
                .state
                .compare_exchange_weak(current, x, Ordering::Relaxed, Ordering::Relaxed)
            {
                Ok(_) => return x,
                Err(observed) => current = observed,
            }
        }
    }
}

/// Page-aligned random offset carrying at most `bits` bits of entropy.
pub fn random_layout_offset(entropy: &dyn EntropySource, bits: u8) -> u64 {
    let bits = bits.min(MAX_RND_BITS);
    if bits == 0 {
        return 0;
    }
    entropy.next_uniform(1u64 << bits) << PAGE_SHIFT
}

// ==================== Selection ====================

/// Whether a process gets the legacy bottom-up layout. The compatibility
/// personality, an unlimited stack, and the global switch each force it.
pub const fn is_legacy_layout(
    compat_layout: bool,
    stack_unlimited: bool,
    legacy_switch: bool,
) -> bool {
    compat_layout || stack_unlimited || legacy_switch
}

/// Top-down base: the ceiling minus the clamped stack reservation and the
/// random offset, rounded up to a page.
fn topdown_base(task_size: u64, stack_limit: u64, rnd: u64) -> u64 {
    let mut gap = stack_limit;
    if gap < MIN_GAP {
        gap = MIN_GAP;
    } else if gap > max_gap(task_size) {
        gap = max_gap(task_size);
    }
    align_up_u64(
        task_size.saturating_sub(gap).saturating_sub(rnd),
        PAGE_SIZE,
    )
}

/// Select the layout for a fresh address space from the global knobs.
pub fn pick_mmap_layout(attrs: ProcessAttrs, task_size: u64, entropy: &dyn EntropySource) -> MmapLayout {
    pick_mmap_layout_with(attrs, task_size, entropy, get_config())
}

/// Layout selection against an explicit configuration, for callers that
/// must not observe concurrent knob changes.
pub fn pick_mmap_layout_with(
    attrs: ProcessAttrs,
    task_size: u64,
    entropy: &dyn EntropySource,
    config: MmapConfig,
) -> MmapLayout {
    let rnd = if attrs.randomize {
        random_layout_offset(entropy, config.rnd_bits)
    } else {
        0
    };
    if is_legacy_layout(
        attrs.compat_layout,
        attrs.stack_limit == RLIM_INFINITY,
        config.legacy_layout,
    ) {
        MmapLayout {
            base: legacy_unmapped_base(task_size).saturating_add(rnd),
            direction: MmapDirection::BottomUp,
        }
    } else {
        MmapLayout {
            base: topdown_base(task_size, attrs.stack_limit, rnd),
            direction: MmapDirection::TopDown,
        }
    }
}
