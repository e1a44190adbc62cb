use std::mem;

/// Record stored immediately before every user block.
///
/// `offset_from_raw_base` is the distance from the raw base returned by the
/// backend to this record. It is the only way back to the raw base and is
/// rewritten after every allocate and reallocate.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Metadata {
  pub user_size: usize,
  pub user_alignment: usize,
  pub offset_from_raw_base: usize,
}

impl Metadata {
  pub const SIZE: usize = mem::size_of::<Metadata>();
  pub const ALIGN: usize = mem::align_of::<Metadata>();

  pub fn new(
    user_size: usize,
    user_alignment: usize,
    offset_from_raw_base: usize,
  ) -> Self {
    Self {
      user_size,
      user_alignment,
      offset_from_raw_base,
    }
  }
}
