//! Contiguous storage for error frames.
//!
//! Frames sit side by side in one growable buffer, oldest first. A frame's
//! neighbours are found by position rather than by pointer, so growing the
//! buffer (which may move it) never needs re-linking, and borrows of a frame
//! cannot outlive a push.

#[cfg(test)]
use std::cell::Cell;
use std::collections::TryReserveError;
use std::iter::Rev;
use std::slice;

use super::frame::Frame;

#[derive(Debug, Default)]
pub(crate) struct FrameStack {
  frames: Vec<Frame>,
}

impl FrameStack {
  pub(crate) const fn new() -> Self {
    Self { frames: Vec::new() }
  }

  pub(crate) fn with_frame(frame: Frame) -> Self {
    Self { frames: vec![frame] }
  }

  pub(crate) fn len(&self) -> usize {
    self.frames.len()
  }

  /// Makes room for `additional` more frames, reporting failure instead of
  /// aborting.
  pub(crate) fn reserve(
    &mut self,
    additional: usize,
  ) -> Result<(), TryReserveError> {
    injected_failure()?;
    self.frames.try_reserve(additional)
  }

  /// Appends every frame of `other`, oldest first.
  ///
  /// Callers reserve first; this only moves frames.
  pub(crate) fn append(
    &mut self,
    mut other: FrameStack,
  ) {
    self.frames.append(&mut other.frames);
  }

  pub(crate) fn push(
    &mut self,
    frame: Frame,
  ) {
    self.frames.push(frame);
  }

  pub(crate) fn pop(&mut self) -> Option<Frame> {
    self.frames.pop()
  }

  pub(crate) fn last(&self) -> Option<&Frame> {
    self.frames.last()
  }

  pub(crate) fn first(&self) -> Option<&Frame> {
    self.frames.first()
  }

  /// Newest frame first.
  pub(crate) fn iter(&self) -> Rev<slice::Iter<'_, Frame>> {
    self.frames.iter().rev()
  }
}

#[cfg(test)]
thread_local! {
  static FAIL_NEXT_RESERVE: Cell<bool> = const { Cell::new(false) };
}

/// Makes the next [`FrameStack::reserve`] on this thread fail.
#[cfg(test)]
pub(crate) fn fail_next_reserve() {
  FAIL_NEXT_RESERVE.with(|fail| fail.set(true));
}

#[cfg(test)]
fn injected_failure() -> Result<(), TryReserveError> {
  if FAIL_NEXT_RESERVE.with(|fail| fail.replace(false)) {
    return Vec::<u8>::new().try_reserve(usize::MAX);
  }
  Ok(())
}

#[cfg(not(test))]
fn injected_failure() -> Result<(), TryReserveError> {
  Ok(())
}

impl Drop for FrameStack {
  fn drop(&mut self) {
    // Newest frame first, so contexts are torn down in reverse push order.
    while let Some(frame) = self.frames.pop() {
      drop(frame);
    }
  }
}
