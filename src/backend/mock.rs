use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::ptr::{self, NonNull};

use super::{Backend, BackendError, SystemBackend};

const ENOMEM: i32 = 12;
const GARBAGE: u8 = 0xCD;

#[derive(Debug, Clone, Copy)]
struct Block {
  inner: NonNull<u8>,
  size: usize,
  shift: usize,
}

/// Recording backend for tests.
///
/// Every block is shifted `shift` bytes past a [`SystemBackend`] block, so
/// bases can be made as misaligned as a test needs. Uninitialized blocks are
/// filled with garbage. Reallocation always moves to a fresh block.
/// `fail_next` makes the next allocate or reallocate fail with `ENOMEM`.
#[derive(Debug, Default)]
pub(crate) struct MockBackend {
  shift: Cell<usize>,
  fail_next: Cell<bool>,
  live: RefCell<HashMap<usize, Block>>,
  handed_out: RefCell<Vec<usize>>,
  freed: RefCell<Vec<usize>>,
}

impl MockBackend {
  pub(crate) fn with_shift(shift: usize) -> Self {
    let backend = Self::default();
    backend.shift.set(shift);
    backend
  }

  pub(crate) fn set_shift(
    &self,
    shift: usize,
  ) {
    self.shift.set(shift);
  }

  pub(crate) fn fail_next(&self) {
    self.fail_next.set(true);
  }

  pub(crate) fn handed_out(&self) -> Vec<usize> {
    self.handed_out.borrow().clone()
  }

  pub(crate) fn freed(&self) -> Vec<usize> {
    self.freed.borrow().clone()
  }

  pub(crate) fn live(&self) -> usize {
    self.live.borrow().len()
  }

  fn injected_failure(&self) -> Result<(), BackendError> {
    if self.fail_next.replace(false) {
      return Err(BackendError::os(ENOMEM));
    }
    Ok(())
  }

  fn carve(
    &self,
    size: usize,
    zeroed: bool,
  ) -> Result<NonNull<u8>, BackendError> {
    self.injected_failure()?;

    let shift = self.shift.get();
    let inner = if zeroed {
      SystemBackend.allocate_zeroed(size + shift)?
    } else {
      SystemBackend.allocate(size + shift)?
    };

    if !zeroed {
      unsafe { inner.as_ptr().write_bytes(GARBAGE, size + shift) };
    }

    let raw = unsafe { NonNull::new_unchecked(inner.as_ptr().add(shift)) };
    self.live.borrow_mut().insert(raw.as_ptr() as usize, Block { inner, size, shift });
    self.handed_out.borrow_mut().push(raw.as_ptr() as usize);
    Ok(raw)
  }
}

impl Backend for MockBackend {
  fn allocate(
    &self,
    size: usize,
  ) -> Result<NonNull<u8>, BackendError> {
    self.carve(size, false)
  }

  fn allocate_zeroed(
    &self,
    size: usize,
  ) -> Result<NonNull<u8>, BackendError> {
    self.carve(size, true)
  }

  unsafe fn reallocate(
    &self,
    existing: Option<NonNull<u8>>,
    new_size: usize,
  ) -> Result<NonNull<u8>, BackendError> {
    let Some(old) = existing else {
      return self.carve(new_size, false);
    };

    let block = self.live.borrow().get(&(old.as_ptr() as usize)).copied().expect("unknown raw base");
    let new = self.carve(new_size, false)?;

    unsafe {
      ptr::copy_nonoverlapping(old.as_ptr(), new.as_ptr(), block.size.min(new_size));
      self.free(old);
    }
    Ok(new)
  }

  unsafe fn free(
    &self,
    raw: NonNull<u8>,
  ) {
    let block = self.live.borrow_mut().remove(&(raw.as_ptr() as usize)).expect("free of unknown raw base");
    self.freed.borrow_mut().push(raw.as_ptr() as usize);

    debug_assert_eq!(block.inner.as_ptr() as usize + block.shift, raw.as_ptr() as usize);
    unsafe { SystemBackend.free(block.inner) }
  }
}

impl Drop for MockBackend {
  fn drop(&mut self) {
    for (_, block) in self.live.borrow_mut().drain() {
      unsafe { SystemBackend.free(block.inner) }
    }
  }
}
