/// Stamp out `align_down_$suffix`, `align_up_$suffix` and
/// `is_aligned_$suffix` for one integer type.
///
/// Alignments are powers of two. Zero is accepted and means "no alignment":
/// values pass through unchanged and everything reports as aligned.
macro_rules! impl_align_fns {
    ($ty:ty, $suffix:ident) => {
        paste::paste! {
            /// Round `value` down to a multiple of `alignment`.
            #[inline(always)]
            pub const fn [<align_down_ $suffix>](value: $ty, alignment: $ty) -> $ty {
                if alignment == 0 {
                    return value;
                }
                value & !(alignment - 1)
            }

            /// Round `value` up to a multiple of `alignment`, saturating at
            /// the top of the type's range instead of wrapping.
            #[inline(always)]
            pub const fn [<align_up_ $suffix>](value: $ty, alignment: $ty) -> $ty {
                if alignment == 0 {
                    return value;
                }
                let adjusted = value.saturating_add(alignment - 1);
                adjusted & !(alignment - 1)
            }

            /// Whether `value` is a multiple of `alignment`.
            #[inline(always)]
            pub const fn [<is_aligned_ $suffix>](value: $ty, alignment: $ty) -> bool {
                if alignment == 0 {
                    return true;
                }
                value & (alignment - 1) == 0
            }
        }
    };
}

impl_align_fns!(u64, u64);
impl_align_fns!(usize, usize);
