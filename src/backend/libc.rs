use std::io;
use std::ptr::{self, NonNull};

use ::libc::{c_void, calloc, free, malloc, realloc};

use super::{Backend, BackendError};

/// The C library heap: `malloc`, `calloc`, `realloc` and `free`.
///
/// `errno` is cleared before every call so a failure is reported with the
/// code the call itself set, described through the OS error table.
#[derive(Debug, Default, Clone, Copy)]
pub struct LibcBackend;

impl LibcBackend {
  pub const fn new() -> Self {
    Self
  }

  fn check(
    raw: *mut c_void,
    silent: &'static str,
  ) -> Result<NonNull<u8>, BackendError> {
    if let Some(raw) = NonNull::new(raw as *mut u8) {
      return Ok(raw);
    }

    match io::Error::last_os_error().raw_os_error() {
      Some(code) if code != 0 => Err(BackendError::os(code)),
      _ => Err(BackendError::fixed(silent)),
    }
  }
}

impl Backend for LibcBackend {
  fn allocate(
    &self,
    size: usize,
  ) -> Result<NonNull<u8>, BackendError> {
    clear_errno();
    Self::check(unsafe { malloc(size) }, "malloc() returned null without setting errno")
  }

  fn allocate_zeroed(
    &self,
    size: usize,
  ) -> Result<NonNull<u8>, BackendError> {
    clear_errno();
    Self::check(unsafe { calloc(1, size) }, "calloc() returned null without setting errno")
  }

  unsafe fn reallocate(
    &self,
    existing: Option<NonNull<u8>>,
    new_size: usize,
  ) -> Result<NonNull<u8>, BackendError> {
    let existing = existing.map_or(ptr::null_mut(), |raw| raw.as_ptr() as *mut c_void);

    clear_errno();
    Self::check(
      unsafe { realloc(existing, new_size) },
      "realloc() returned null without setting errno",
    )
  }

  unsafe fn free(
    &self,
    raw: NonNull<u8>,
  ) {
    unsafe { free(raw.as_ptr() as *mut c_void) }
  }
}

#[cfg(any(target_os = "linux", target_os = "android", target_os = "emscripten"))]
fn clear_errno() {
  unsafe { *::libc::__errno_location() = 0 }
}

#[cfg(any(target_os = "macos", target_os = "ios", target_os = "freebsd", target_os = "dragonfly"))]
fn clear_errno() {
  unsafe { *::libc::__error() = 0 }
}

#[cfg(not(any(
  target_os = "linux",
  target_os = "android",
  target_os = "emscripten",
  target_os = "macos",
  target_os = "ios",
  target_os = "freebsd",
  target_os = "dragonfly"
)))]
fn clear_errno() {}
