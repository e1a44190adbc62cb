use std::mem;
use std::ptr::{self, NonNull};

use thiserror::Error;
use tracing::{debug, trace, warn};

use crate::backend::{Backend, BackendError, DefaultBackend};
use crate::config::{Config, ErrorMode};
use crate::error::{Context, Error as ChainError, StaticError};
use crate::layout::{self, Request};

/// Why an aligned allocation failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AllocError {
  #[error("invalid alignment {alignment}: must be a non-zero power of two")]
  InvalidAlignment { alignment: usize },

  #[error("{size} bytes aligned to {alignment} exceed the largest possible allocation")]
  Exhausted { size: usize, alignment: usize },

  #[error("backend allocator failed: {0}")]
  Backend(#[from] BackendError),
}

static INVALID_ALIGNMENT: StaticError = StaticError::new("invalid alignment");
static EXHAUSTED: StaticError = StaticError::new("allocation size exhausted");
static BACKEND_FAILURE: StaticError = StaticError::new("backend allocator failure");

impl AllocError {
  /// The allocation-free message for this kind of failure.
  pub fn static_error(&self) -> &'static StaticError {
    match self {
      Self::InvalidAlignment { .. } => &INVALID_ALIGNMENT,
      Self::Exhausted { .. } => &EXHAUSTED,
      Self::Backend(_) => &BACKEND_FAILURE,
    }
  }

  /// Turns the failure into a chainable [`Error`](crate::Error).
  ///
  /// In [`ErrorMode::Dynamic`] the `AllocError` itself rides along as the
  /// context and can be recovered with `downcast_ref`.
  #[track_caller]
  pub fn report(
    self,
    mode: ErrorMode,
  ) -> ChainError {
    match mode {
      ErrorMode::Static => ChainError::from_static(self.static_error()),
      ErrorMode::Dynamic => ChainError::with_context(self.to_string(), Context::new(self)),
    }
  }
}

/// An allocator that honours any power-of-two alignment on top of a backend
/// that only guarantees its natural alignment.
///
/// Each allocation carries a small metadata record right before the user
/// block, so [`free`](Self::free) and [`reallocate`](Self::reallocate) need
/// nothing but the user pointer.
///
/// Not thread safe: callers sequence all operations on one allocator.
#[derive(Debug)]
pub struct AlignedAllocator<B: Backend = DefaultBackend> {
  backend: B,
  config: Config,
}

impl AlignedAllocator<DefaultBackend> {
  pub fn new() -> Self {
    Self::with_backend(DefaultBackend::default())
  }
}

impl Default for AlignedAllocator<DefaultBackend> {
  fn default() -> Self {
    Self::new()
  }
}

impl<B: Backend> AlignedAllocator<B> {
  pub fn with_backend(backend: B) -> Self {
    Self {
      backend,
      config: Config::default(),
    }
  }

  pub fn with_config(
    mut self,
    config: Config,
  ) -> Self {
    self.config = config;
    self
  }

  pub fn backend(&self) -> &B {
    &self.backend
  }

  pub fn config(&self) -> &Config {
    &self.config
  }

  /// Allocates `size` bytes aligned to `alignment`.
  pub fn allocate(
    &self,
    size: usize,
    alignment: usize,
  ) -> Result<NonNull<u8>, AllocError> {
    self.place(size, alignment, false)
  }

  /// Allocates `size` zeroed bytes aligned to `alignment`.
  pub fn allocate_zeroed(
    &self,
    size: usize,
    alignment: usize,
  ) -> Result<NonNull<u8>, AllocError> {
    self.place(size, alignment, true)
  }

  /// Allocates `size` bytes with no alignment requirement beyond one byte.
  pub fn allocate_unaligned(
    &self,
    size: usize,
  ) -> Result<NonNull<u8>, AllocError> {
    self.place(size, 1, false)
  }

  pub fn allocate_zeroed_unaligned(
    &self,
    size: usize,
  ) -> Result<NonNull<u8>, AllocError> {
    self.place(size, 1, true)
  }

  /// Allocates room for one `T`, uninitialized.
  pub fn allocate_for<T>(&self) -> Result<NonNull<T>, AllocError> {
    self.place(mem::size_of::<T>(), mem::align_of::<T>(), false).map(NonNull::cast)
  }

  /// Allocates room for one `T`, zeroed.
  pub fn allocate_zeroed_for<T>(&self) -> Result<NonNull<T>, AllocError> {
    self.place(mem::size_of::<T>(), mem::align_of::<T>(), true).map(NonNull::cast)
  }

  /// Resizes the allocation at `address` to `size` bytes, keeping its
  /// alignment. A null `address` allocates with alignment 1.
  ///
  /// The first `min(old, new)` bytes are preserved. On error the original
  /// allocation is untouched and still owned by the caller.
  ///
  /// # Safety
  ///
  /// `address` must be null or a live pointer returned by this allocator.
  pub unsafe fn reallocate(
    &self,
    address: *mut u8,
    size: usize,
  ) -> Result<NonNull<u8>, AllocError> {
    unsafe { self.resize(address, size, false) }
  }

  /// Like [`reallocate`](Self::reallocate), and zeroes the bytes past the old
  /// size when growing.
  ///
  /// # Safety
  ///
  /// `address` must be null or a live pointer returned by this allocator.
  pub unsafe fn reallocate_zeroed(
    &self,
    address: *mut u8,
    size: usize,
  ) -> Result<NonNull<u8>, AllocError> {
    unsafe { self.resize(address, size, true) }
  }

  /// Frees the allocation at `address`. Null is a no-op.
  ///
  /// Freeing the same pointer twice is undefined; use
  /// [`release`](Self::release) when a slot may be freed more than once.
  ///
  /// # Safety
  ///
  /// `address` must be null or a live pointer returned by this allocator.
  pub unsafe fn free(
    &self,
    address: *mut u8,
  ) {
    let Some(user) = NonNull::new(address) else {
      return;
    };

    unsafe {
      let recovered = layout::recover(user);
      trace!(user = ?user, base = ?recovered.raw_base, size = recovered.record.user_size, "free");
      self.backend.free(recovered.raw_base);
    }
  }

  /// Frees the allocation in `slot` and nulls the slot, so releasing the same
  /// slot again is a no-op.
  ///
  /// # Safety
  ///
  /// `*slot` must be null or a live pointer returned by this allocator.
  pub unsafe fn release(
    &self,
    slot: &mut *mut u8,
  ) {
    let address = mem::replace(slot, ptr::null_mut());
    unsafe { self.free(address) }
  }

  /// The size the allocation at `user` was last requested with.
  ///
  /// # Safety
  ///
  /// `user` must be a live pointer returned by this allocator.
  pub unsafe fn usable_size(
    &self,
    user: NonNull<u8>,
  ) -> usize {
    unsafe { layout::recover(user).record.user_size }
  }

  /// The alignment the allocation at `user` was created with.
  ///
  /// # Safety
  ///
  /// `user` must be a live pointer returned by this allocator.
  pub unsafe fn alignment_of(
    &self,
    user: NonNull<u8>,
  ) -> usize {
    unsafe { layout::recover(user).record.user_alignment }
  }

  /// Reports `error` the way this allocator's [`Config`] asks for.
  #[track_caller]
  pub fn report(
    &self,
    error: AllocError,
  ) -> ChainError {
    error.report(self.config.error_mode)
  }

  fn request(
    size: usize,
    alignment: usize,
  ) -> Result<Request, AllocError> {
    if !alignment.is_power_of_two() {
      warn!(size, alignment, "rejected alignment");
      return Err(AllocError::InvalidAlignment { alignment });
    }

    layout::compute_request(size, alignment).ok_or_else(|| {
      warn!(size, alignment, "allocation size overflows");
      AllocError::Exhausted { size, alignment }
    })
  }

  fn place(
    &self,
    size: usize,
    alignment: usize,
    zeroed: bool,
  ) -> Result<NonNull<u8>, AllocError> {
    let request = Self::request(size, alignment)?;

    let raw = if zeroed {
      self.backend.allocate_zeroed(request.raw_size)
    } else {
      self.backend.allocate(request.raw_size)
    };
    let raw_base = raw.map_err(|error| {
      warn!(size, alignment, raw_size = request.raw_size, %error, "backend allocation failed");
      AllocError::Backend(error)
    })?;

    let user = unsafe { layout::install(&request, raw_base) };
    trace!(size, alignment, raw_size = request.raw_size, user = ?user, base = ?raw_base, zeroed, "allocated");
    Ok(user)
  }

  unsafe fn resize(
    &self,
    address: *mut u8,
    size: usize,
    zeroed: bool,
  ) -> Result<NonNull<u8>, AllocError> {
    let Some(old_user) = NonNull::new(address) else {
      return self.place(size, 1, zeroed);
    };

    let old = unsafe { layout::recover(old_user) };
    let old_size = old.record.user_size;
    let old_offset = old.user_offset(old_user);
    let request = Self::request(size, old.record.user_alignment)?;

    // Nothing has been written yet, so a failure here leaves the old block as
    // it was.
    let raw_base = unsafe { self.backend.reallocate(Some(old.raw_base), request.raw_size) }.map_err(|error| {
      warn!(size, old_size, raw_size = request.raw_size, %error, "backend reallocation failed");
      AllocError::Backend(error)
    })?;

    let base = raw_base.as_ptr() as usize;
    let new_offset = layout::compute_layout(&request, base).user - base;
    let moved = old_size.min(size);

    unsafe {
      if old_offset != new_offset {
        debug!(old_offset, new_offset, moved, "user block shifted inside raw allocation");
        ptr::copy(raw_base.as_ptr().add(old_offset), raw_base.as_ptr().add(new_offset), moved);
      }

      let user = layout::install(&request, raw_base);
      if zeroed && size > old_size {
        user.as_ptr().add(old_size).write_bytes(0, size - old_size);
      }

      trace!(size, old_size, raw_size = request.raw_size, user = ?user, base = ?raw_base, "reallocated");
      Ok(user)
    }
  }
}

#[cfg(test)]
mod tests {
  use std::slice;

  use super::*;
  use crate::ErrorKind;
  use crate::backend::mock::MockBackend;

  const ALIGNMENTS: [usize; 10] = [1, 2, 4, 8, 16, 32, 64, 128, 1024, 4096];

  unsafe fn bytes<'a>(
    user: NonNull<u8>,
    len: usize,
  ) -> &'a [u8] {
    unsafe { slice::from_raw_parts(user.as_ptr(), len) }
  }

  unsafe fn fill(
    user: NonNull<u8>,
    len: usize,
  ) {
    for i in 0..len {
      unsafe { user.as_ptr().add(i).write(i as u8) };
    }
  }

  #[test]
  fn test_example_allocation_frees_raw_base() {
    let allocator = AlignedAllocator::with_backend(MockBackend::with_shift(8));

    let user = allocator.allocate(10, 64).unwrap();
    assert_eq!(user.as_ptr() as usize % 64, 0);

    unsafe {
      fill(user, 10);
      assert_eq!(allocator.usable_size(user), 10);
      allocator.free(user.as_ptr());
    }

    let handed_out = allocator.backend().handed_out();
    assert_eq!(handed_out.len(), 1);
    assert_eq!(allocator.backend().freed(), handed_out);
    assert_ne!(handed_out[0], user.as_ptr() as usize);
  }

  #[test]
  fn test_alignment_and_metadata_for_misaligned_bases() {
    for shift in 0..8 {
      let allocator = AlignedAllocator::with_backend(MockBackend::with_shift(shift));

      for &alignment in &ALIGNMENTS {
        for size in [0, 1, 3, 10, 64, 1000] {
          let user = allocator.allocate(size, alignment).unwrap();
          assert_eq!(user.as_ptr() as usize % alignment, 0);

          unsafe {
            assert_eq!(allocator.alignment_of(user), alignment);
            assert_eq!(allocator.usable_size(user), size);
            fill(user, size);
            allocator.free(user.as_ptr());
          }
        }
      }

      assert_eq!(allocator.backend().live(), 0);
    }
  }

  #[test]
  fn test_zero_and_non_power_of_two_alignment_rejected() {
    let allocator = AlignedAllocator::with_backend(MockBackend::default());

    for size in [0, 1, 10, 4096, usize::MAX] {
      assert_eq!(allocator.allocate(size, 0), Err(AllocError::InvalidAlignment { alignment: 0 }));
      assert_eq!(allocator.allocate_zeroed(size, 0), Err(AllocError::InvalidAlignment { alignment: 0 }));
    }
    assert_eq!(allocator.allocate(8, 24), Err(AllocError::InvalidAlignment { alignment: 24 }));
    assert!(allocator.backend().handed_out().is_empty());
  }

  #[test]
  fn test_size_overflow_is_exhausted() {
    let allocator = AlignedAllocator::with_backend(MockBackend::default());

    assert_eq!(allocator.allocate(usize::MAX, 1), Err(AllocError::Exhausted { size: usize::MAX, alignment: 1 }));
    assert!(matches!(
      allocator.allocate(usize::MAX - 16, 64),
      Err(AllocError::Exhausted { .. })
    ));
    assert!(matches!(
      allocator.allocate(isize::MAX as usize, 8),
      Err(AllocError::Exhausted { .. })
    ));
    assert!(allocator.backend().handed_out().is_empty());
  }

  #[test]
  fn test_allocate_zeroed() {
    let allocator = AlignedAllocator::with_backend(MockBackend::with_shift(3));

    let user = allocator.allocate_zeroed(300, 128).unwrap();
    unsafe {
      assert!(bytes(user, 300).iter().all(|&b| b == 0));
      allocator.free(user.as_ptr());
    }
  }

  #[test]
  fn test_typed_allocation() {
    #[repr(align(256))]
    struct Page([u8; 512]);

    let allocator = AlignedAllocator::with_backend(MockBackend::with_shift(1));

    let page = allocator.allocate_zeroed_for::<Page>().unwrap();
    assert_eq!(page.as_ptr() as usize % 256, 0);

    unsafe {
      assert!(page.as_ref().0.iter().all(|&b| b == 0));
      assert_eq!(allocator.usable_size(page.cast()), 512);
      allocator.free(page.as_ptr().cast());
    }

    let word = allocator.allocate_for::<u64>().unwrap();
    unsafe {
      word.as_ptr().write(0x1122334455667788);
      assert_eq!(allocator.alignment_of(word.cast()), mem::align_of::<u64>());
      allocator.free(word.as_ptr().cast());
    }
  }

  #[test]
  fn test_unaligned_allocation_uses_alignment_one() {
    let allocator = AlignedAllocator::with_backend(MockBackend::with_shift(5));

    let user = allocator.allocate_unaligned(17).unwrap();
    let zeroed = allocator.allocate_zeroed_unaligned(17).unwrap();
    unsafe {
      assert_eq!(allocator.alignment_of(user), 1);
      assert!(bytes(zeroed, 17).iter().all(|&b| b == 0));
      allocator.free(user.as_ptr());
      allocator.free(zeroed.as_ptr());
    }
  }

  #[test]
  fn test_reallocate_preserves_content_when_offset_changes() {
    let allocator = AlignedAllocator::with_backend(MockBackend::with_shift(1));

    for &alignment in &ALIGNMENTS {
      for (old_size, new_size) in [(10, 100), (100, 10), (64, 64), (0, 32), (500, 5000)] {
        allocator.backend().set_shift(1);
        let user = allocator.allocate(old_size, alignment).unwrap();

        unsafe {
          fill(user, old_size);
          let expected = bytes(user, old_size.min(new_size)).to_vec();

          // The next raw base lands on a different misalignment, so the user
          // block has to move inside it.
          allocator.backend().set_shift(6);
          let moved = allocator.reallocate(user.as_ptr(), new_size).unwrap();

          assert_eq!(moved.as_ptr() as usize % alignment, 0);
          assert_eq!(allocator.alignment_of(moved), alignment);
          assert_eq!(allocator.usable_size(moved), new_size);
          assert_eq!(bytes(moved, expected.len()), &expected[..]);

          allocator.free(moved.as_ptr());
        }
      }
    }

    assert_eq!(allocator.backend().live(), 0);
  }

  #[test]
  fn test_reallocate_zeroed_zeroes_exactly_the_tail() {
    let allocator = AlignedAllocator::with_backend(MockBackend::with_shift(2));

    let user = allocator.allocate(10, 32).unwrap();
    unsafe {
      user.as_ptr().write_bytes(0xAB, 10);

      allocator.backend().set_shift(7);
      let grown = allocator.reallocate_zeroed(user.as_ptr(), 100).unwrap();

      assert!(bytes(grown, 10).iter().all(|&b| b == 0xAB));
      assert!(bytes(grown, 100)[10..].iter().all(|&b| b == 0));

      let shrunk = allocator.reallocate_zeroed(grown.as_ptr(), 4).unwrap();
      assert!(bytes(shrunk, 4).iter().all(|&b| b == 0xAB));
      allocator.free(shrunk.as_ptr());
    }
  }

  #[test]
  fn test_plain_reallocate_leaves_tail_alone() {
    let allocator = AlignedAllocator::with_backend(MockBackend::default());

    let user = allocator.allocate(4, 8).unwrap();
    unsafe {
      user.as_ptr().write_bytes(0x11, 4);
      let grown = allocator.reallocate(user.as_ptr(), 64).unwrap();

      assert!(bytes(grown, 4).iter().all(|&b| b == 0x11));
      // Fresh mock blocks are filled with garbage, which a plain reallocate
      // does not clear.
      assert!(bytes(grown, 64)[4..].iter().any(|&b| b != 0));
      allocator.free(grown.as_ptr());
    }
  }

  #[test]
  fn test_reallocate_null_allocates() {
    let allocator = AlignedAllocator::with_backend(MockBackend::with_shift(3));

    unsafe {
      let user = allocator.reallocate(ptr::null_mut(), 24).unwrap();
      assert_eq!(allocator.alignment_of(user), 1);
      assert_eq!(allocator.usable_size(user), 24);

      let zeroed = allocator.reallocate_zeroed(ptr::null_mut(), 24).unwrap();
      assert!(bytes(zeroed, 24).iter().all(|&b| b == 0));

      allocator.free(user.as_ptr());
      allocator.free(zeroed.as_ptr());
    }
  }

  #[test]
  fn test_failed_reallocate_leaves_allocation_untouched() {
    let allocator = AlignedAllocator::with_backend(MockBackend::with_shift(4));

    let user = allocator.allocate(48, 64).unwrap();
    unsafe {
      fill(user, 48);
      let content = bytes(user, 48).to_vec();
      let before = layout::recover(user);

      allocator.backend().fail_next();
      let error = allocator.reallocate_zeroed(user.as_ptr(), 4096).unwrap_err();

      let AllocError::Backend(backend) = &error else {
        panic!("expected a backend failure, got {error:?}");
      };
      assert_eq!(backend.code(), Some(12));

      let after = layout::recover(user);
      assert_eq!(after.record, before.record);
      assert_eq!(after.raw_base, before.raw_base);
      assert_eq!(bytes(user, 48), &content[..]);

      allocator.free(user.as_ptr());
    }

    assert_eq!(allocator.backend().live(), 0);
  }

  #[test]
  fn test_failed_allocation_surfaces_backend_error() {
    let allocator = AlignedAllocator::with_backend(MockBackend::default());

    allocator.backend().fail_next();
    let error = allocator.allocate(8, 8).unwrap_err();
    assert_eq!(error, AllocError::Backend(BackendError::os(12)));
    assert!(error.to_string().contains(&BackendError::os(12).to_string()));
  }

  #[test]
  fn test_free_null_and_release_twice() {
    let allocator = AlignedAllocator::with_backend(MockBackend::default());

    unsafe {
      allocator.free(ptr::null_mut());

      let mut slot = allocator.allocate(16, 16).unwrap().as_ptr();
      allocator.release(&mut slot);
      assert!(slot.is_null());
      allocator.release(&mut slot);
    }

    assert_eq!(allocator.backend().freed().len(), 1);
    assert_eq!(allocator.backend().live(), 0);
  }

  #[test]
  fn test_report_follows_config() {
    let allocator = AlignedAllocator::with_backend(MockBackend::default());
    let error = allocator.allocate(1, 0).unwrap_err();

    let dynamic = allocator.report(error.clone());
    assert_eq!(dynamic.kind(), ErrorKind::Dynamic);
    assert_eq!(dynamic.to_string(), error.to_string());
    let context = dynamic.details().unwrap().context.unwrap();
    assert_eq!(context.downcast_ref::<AllocError>(), Some(&error));

    let allocator = allocator.with_config(Config::new().with_error_mode(ErrorMode::Static));
    let fixed = allocator.report(error);
    assert_eq!(fixed.kind(), ErrorKind::Static);
    assert_eq!(fixed.to_string(), "invalid alignment");
  }

  #[test]
  fn test_default_backend_allocator() {
    let allocator = AlignedAllocator::new();

    let user = allocator.allocate(10, 64).unwrap();
    assert_eq!(user.as_ptr() as usize % 64, 0);

    unsafe {
      fill(user, 10);
      let grown = allocator.reallocate(user.as_ptr(), 1 << 16).unwrap();
      assert_eq!(grown.as_ptr() as usize % 64, 0);
      assert_eq!(bytes(grown, 10), &[0, 1, 2, 3, 4, 5, 6, 7, 8, 9]);
      allocator.free(grown.as_ptr());

      let huge = allocator.allocate(100, 1 << 20).unwrap();
      assert_eq!(huge.as_ptr() as usize % (1 << 20), 0);
      allocator.free(huge.as_ptr());
    }
  }
}
