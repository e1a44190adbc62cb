/// Which way [`to_aligned_address`] moves an address that is not already
/// aligned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlignDirection {
  /// Nearest conforming address at or below the input.
  Floor,
  /// Nearest conforming address at or above the input.
  Ceiling,
}

/// Rounds `address` to a multiple of `alignment` in the given direction.
///
/// Addresses that are already a multiple of `alignment` come back unchanged.
/// Any non-zero `alignment` is accepted and treated as a plain multiple; the
/// allocator only ever passes powers of two.
///
/// # Panics
///
/// Panics if `alignment` is zero, or if rounding up would overflow `usize`.
///
/// # Examples
///
/// ```rust
/// use raligned::{AlignDirection, to_aligned_address};
///
/// assert_eq!(to_aligned_address(13, 8, AlignDirection::Ceiling), 16);
/// assert_eq!(to_aligned_address(13, 8, AlignDirection::Floor), 8);
/// assert_eq!(to_aligned_address(64, 64, AlignDirection::Ceiling), 64);
/// ```
#[inline]
pub const fn to_aligned_address(
  address: usize,
  alignment: usize,
  direction: AlignDirection,
) -> usize {
  assert!(alignment != 0, "alignment must be non-zero");

  let remainder = address % alignment;
  if remainder == 0 {
    return address;
  }

  let floor = address - remainder;
  match direction {
    AlignDirection::Floor => floor,
    AlignDirection::Ceiling => match floor.checked_add(alignment) {
      Some(ceiling) => ceiling,
      None => panic!("aligned address overflows usize"),
    },
  }
}
