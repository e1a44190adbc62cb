use std::alloc::{GlobalAlloc, Layout, System};
use std::mem;
use std::ptr::NonNull;

use super::{Backend, BackendError};

/// Natural alignment of blocks handed out by [`SystemBackend`], and the size
/// of the header that precedes them.
const HEADER: usize = 2 * mem::size_of::<usize>();

/// The Rust system allocator.
///
/// [`System`] needs the original size on free and realloc, while a backend
/// only ever gets the pointer back, so every block carries a one-word size
/// header in front of it.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemBackend;

impl SystemBackend {
  fn layout(size: usize) -> Result<Layout, BackendError> {
    size
      .checked_add(HEADER)
      .and_then(|total| Layout::from_size_align(total, HEADER).ok())
      .ok_or(BackendError::fixed("requested size overflows the system allocator layout"))
  }

  unsafe fn finish(
    block: *mut u8,
    size: usize,
  ) -> Result<NonNull<u8>, BackendError> {
    let block = NonNull::new(block).ok_or(BackendError::fixed("system allocator is out of memory"))?;

    unsafe {
      (block.as_ptr() as *mut usize).write(size);
      Ok(NonNull::new_unchecked(block.as_ptr().add(HEADER)))
    }
  }

  unsafe fn header(raw: NonNull<u8>) -> (*mut u8, usize) {
    unsafe {
      let block = raw.as_ptr().sub(HEADER);
      (block, (block as *const usize).read())
    }
  }
}

impl Backend for SystemBackend {
  fn allocate(
    &self,
    size: usize,
  ) -> Result<NonNull<u8>, BackendError> {
    let layout = Self::layout(size)?;
    unsafe { Self::finish(System.alloc(layout), size) }
  }

  fn allocate_zeroed(
    &self,
    size: usize,
  ) -> Result<NonNull<u8>, BackendError> {
    let layout = Self::layout(size)?;
    unsafe { Self::finish(System.alloc_zeroed(layout), size) }
  }

  unsafe fn reallocate(
    &self,
    existing: Option<NonNull<u8>>,
    new_size: usize,
  ) -> Result<NonNull<u8>, BackendError> {
    let Some(raw) = existing else {
      return self.allocate(new_size);
    };

    let new_layout = Self::layout(new_size)?;
    unsafe {
      let (block, old_size) = Self::header(raw);
      let old_layout = Layout::from_size_align_unchecked(old_size + HEADER, HEADER);
      Self::finish(System.realloc(block, old_layout, new_layout.size()), new_size)
    }
  }

  unsafe fn free(
    &self,
    raw: NonNull<u8>,
  ) {
    unsafe {
      let (block, size) = Self::header(raw);
      System.dealloc(block, Layout::from_size_align_unchecked(size + HEADER, HEADER));
    }
  }
}
