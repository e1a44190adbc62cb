//! Primitive allocators the aligned allocator sits on.
//!
//! A backend hands out raw, alignment-naive byte ranges. The aligned
//! allocator never gives a backend a user pointer, only raw bases the backend
//! itself produced.

use std::borrow::Cow;
use std::io;
use std::ptr::NonNull;

use thiserror::Error;

#[cfg(feature = "libc")]
mod libc;
#[cfg(test)]
pub(crate) mod mock;
mod system;

#[cfg(feature = "libc")]
pub use self::libc::LibcBackend;
pub use self::system::SystemBackend;

/// The backend selected by the crate features.
#[cfg(feature = "libc")]
pub type DefaultBackend = LibcBackend;

/// The backend selected by the crate features.
#[cfg(not(feature = "libc"))]
pub type DefaultBackend = SystemBackend;

/// Failure reported by a backend, with its own diagnostic text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct BackendError {
  code: Option<i32>,
  message: Cow<'static, str>,
}

impl BackendError {
  /// An error with a fixed description and no OS code.
  pub const fn fixed(message: &'static str) -> Self {
    Self {
      code: None,
      message: Cow::Borrowed(message),
    }
  }

  /// An error for an OS error code, described the way the OS describes it.
  pub fn os(code: i32) -> Self {
    Self {
      code: Some(code),
      message: Cow::Owned(io::Error::from_raw_os_error(code).to_string()),
    }
  }

  /// The OS error code, when the backend reported one.
  pub fn code(&self) -> Option<i32> {
    self.code
  }

  pub fn description(&self) -> &str {
    &self.message
  }
}

/// Raw memory provider.
///
/// Implementations only promise their natural alignment, usually a machine
/// word. All methods take `&self`; backends needing state use interior
/// mutability, since the allocator is single threaded.
pub trait Backend {
  /// Allocates `size` bytes of uninitialized memory.
  fn allocate(
    &self,
    size: usize,
  ) -> Result<NonNull<u8>, BackendError>;

  /// Allocates `size` zeroed bytes.
  fn allocate_zeroed(
    &self,
    size: usize,
  ) -> Result<NonNull<u8>, BackendError>;

  /// Resizes `existing` to `new_size` bytes, possibly moving it. `None`
  /// behaves as [`Backend::allocate`].
  ///
  /// On failure `existing` must be left untouched and still valid.
  ///
  /// # Safety
  ///
  /// `existing` must come from this backend and must not have been freed.
  unsafe fn reallocate(
    &self,
    existing: Option<NonNull<u8>>,
    new_size: usize,
  ) -> Result<NonNull<u8>, BackendError>;

  /// Returns `raw` to the backend.
  ///
  /// # Safety
  ///
  /// `raw` must come from this backend and must not have been freed.
  unsafe fn free(
    &self,
    raw: NonNull<u8>,
  );
}

impl<B: Backend + ?Sized> Backend for &B {
  fn allocate(
    &self,
    size: usize,
  ) -> Result<NonNull<u8>, BackendError> {
    (**self).allocate(size)
  }

  fn allocate_zeroed(
    &self,
    size: usize,
  ) -> Result<NonNull<u8>, BackendError> {
    (**self).allocate_zeroed(size)
  }

  unsafe fn reallocate(
    &self,
    existing: Option<NonNull<u8>>,
    new_size: usize,
  ) -> Result<NonNull<u8>, BackendError> {
    unsafe { (**self).reallocate(existing, new_size) }
  }

  unsafe fn free(
    &self,
    raw: NonNull<u8>,
  ) {
    unsafe { (**self).free(raw) }
  }
}
