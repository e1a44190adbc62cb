/// How allocator failures are turned into [`Error`](crate::Error) values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ErrorMode {
  /// One predefined static message per failure kind. Never allocates, so it
  /// stays usable when the heap is exhausted.
  Static,
  /// The full diagnostic, with the original `AllocError` attached as
  /// context.
  #[default]
  Dynamic,
}

/// Runtime settings of an [`AlignedAllocator`](crate::AlignedAllocator).
///
/// The backend itself is chosen at build time through the `libc` feature, or
/// injected with [`AlignedAllocator::with_backend`](crate::AlignedAllocator::with_backend).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Config {
  pub error_mode: ErrorMode,
}

impl Config {
  pub fn new() -> Self {
    Self::default()
  }

  /// Sets how failures are reported.
  pub fn with_error_mode(
    mut self,
    error_mode: ErrorMode,
  ) -> Self {
    self.error_mode = error_mode;
    self
  }
}
