//! Error types for the placement layer.

use core::fmt;

use emberos_abi::addr::VirtAddr;

/// Failure modes of a single placement call.
///
/// Both variants are terminal for the call. The only internal retry is the
/// documented top-down to bottom-up fallback inside
/// [`crate::unmapped_area::find_unmapped_area_topdown`]; after it, failure
/// is failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlacementError {
    /// No gap of sufficient size exists in the searched range(s).
    OutOfMemory,
    /// A FIXED request violates its cache-colour alignment constraint.
    InvalidFixedAddress,
}

impl fmt::Display for PlacementError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfMemory => write!(f, "no free area of the requested size"),
            Self::InvalidFixedAddress => {
                write!(f, "fixed address violates alignment constraints")
            }
        }
    }
}

/// Result of one placement call: the chosen start address or why there is
/// none. An address of zero is a legitimate success when the floor permits
/// it, never a sentinel.
pub type PlacementResult = Result<VirtAddr, PlacementError>;
