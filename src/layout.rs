//! Placement of the metadata block and the user block inside a raw
//! allocation.
//!
//! ```text
//!   raw_base                      metadata             user (aligned)
//!   │                             │                    │
//!   ▼                             ▼                    ▼
//!   ┌─────────────────────────────┬──────────┬───────┬──────────────┬─────┐
//!   │ padding                     │ Metadata │  pad  │  user_size   │ pad │
//!   └─────────────────────────────┴──────────┴───────┴──────────────┴─────┘
//!   ◄──── offset_from_raw_base ──►
//!   ◄──────────────────────────── raw_size ─────────────────────────────────►
//! ```
//!
//! The backend only promises its own natural alignment, so the raw request
//! reserves room for the worst case misalignment of both blocks. The metadata
//! always sits at the highest `Metadata`-aligned address that still ends at or
//! before the user block, which makes its position a pure function of the
//! user pointer.

use std::ptr::NonNull;

use crate::align::{AlignDirection, to_aligned_address};
use crate::meta::Metadata;

/// Sizes requested from the backend for one user allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Request {
  pub user_size: usize,
  pub user_alignment: usize,
  pub raw_size: usize,
  pub raw_alignment: usize,
}

/// Addresses of the two blocks inside a raw allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
  pub metadata: usize,
  pub user: usize,
}

/// A live allocation rediscovered from its user pointer.
#[derive(Debug, Clone, Copy)]
pub struct Recovered {
  pub metadata: NonNull<Metadata>,
  pub raw_base: NonNull<u8>,
  pub record: Metadata,
}

impl Recovered {
  /// Offset of the user block from the raw base.
  pub fn user_offset(
    &self,
    user: NonNull<u8>,
  ) -> usize {
    user.as_ptr() as usize - self.raw_base.as_ptr() as usize
  }
}

/// Computes the raw request for `user_size` bytes aligned to
/// `user_alignment`.
///
/// Returns `None` when the raw size does not fit in `isize::MAX`, the largest
/// size any allocation may have.
pub fn compute_request(
  user_size: usize,
  user_alignment: usize,
) -> Option<Request> {
  let raw_size = Metadata::SIZE
    .checked_add(Metadata::ALIGN)?
    .checked_add(user_size)?
    .checked_add(user_alignment)?;

  if raw_size > isize::MAX as usize {
    return None;
  }

  Some(Request {
    user_size,
    user_alignment,
    raw_size,
    raw_alignment: Metadata::ALIGN.max(user_alignment),
  })
}

/// Places the metadata and user blocks inside the raw allocation starting at
/// `raw_base`.
pub fn compute_layout(
  request: &Request,
  raw_base: usize,
) -> Placement {
  let user = to_aligned_address(
    raw_base + Metadata::SIZE + Metadata::ALIGN,
    request.user_alignment,
    AlignDirection::Ceiling,
  );

  Placement {
    metadata: metadata_address(user),
    user,
  }
}

/// Address of the metadata record that belongs to the user block at `user`.
#[inline]
pub fn metadata_address(user: usize) -> usize {
  to_aligned_address(user - Metadata::SIZE, Metadata::ALIGN, AlignDirection::Floor)
}

/// Writes a fresh metadata record for `request` into the raw allocation at
/// `raw_base` and returns the user pointer.
///
/// # Safety
///
/// `raw_base` must point to at least `request.raw_size` writable bytes.
pub unsafe fn install(
  request: &Request,
  raw_base: NonNull<u8>,
) -> NonNull<u8> {
  let base = raw_base.as_ptr() as usize;
  let placement = compute_layout(request, base);
  let record = Metadata::new(request.user_size, request.user_alignment, placement.metadata - base);

  unsafe {
    let metadata = raw_base.as_ptr().add(placement.metadata - base) as *mut Metadata;
    metadata.write(record);
    NonNull::new_unchecked(raw_base.as_ptr().add(placement.user - base))
  }
}

/// Reads the metadata that precedes `user` and derives the raw base from it.
///
/// # Safety
///
/// `user` must have been returned by [`install`] and its allocation must
/// still be live.
pub unsafe fn recover(user: NonNull<u8>) -> Recovered {
  let user_addr = user.as_ptr() as usize;
  let back = user_addr - metadata_address(user_addr);

  unsafe {
    let metadata = NonNull::new_unchecked(user.as_ptr().sub(back) as *mut Metadata);
    let record = metadata.as_ptr().read();
    let raw_base = NonNull::new_unchecked((metadata.as_ptr() as *mut u8).sub(record.offset_from_raw_base));

    Recovered {
      metadata,
      raw_base,
      record,
    }
  }
}
