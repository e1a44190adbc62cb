//! Chained error values.
//!
//! ```text
//!   Static           Dynamic                 Chain
//!   ┌──────────┐     ┌───────────────────┐   ┌───────┬───────┬───────┬─────┐
//!   │ &'static │     │ message, context  │   │ root  │ frame │ frame │ ... │
//!   └──────────┘     └───────────────────┘   └───────┴───────┴───────┴─────┘
//!   no heap          one frame                oldest ─────────────► newest
//! ```
//!
//! `Dynamic` and `Chain` share one representation, a contiguous frame stack;
//! a lone dynamic error is just a stack of one frame that was never pushed
//! to. A `Static` error borrows its message and never touches the heap.
//! Every error answers `peek`/`pop`/`depth` as a stack of frames.

mod chain;
mod frame;

use std::any::Any;
use std::collections::TryReserveError;
use std::fmt;
use std::iter::Rev;
use std::mem;
use std::panic::Location;
use std::slice;

use thiserror::Error as ThisError;
use tracing::warn;

use self::chain::FrameStack;
pub use self::frame::{Context, Details, Frame, StaticError};

/// Which representation an [`Error`] currently has.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
  Static,
  Dynamic,
  Chain,
}

enum Repr {
  Static(Frame),
  Dynamic(FrameStack),
  Chain(FrameStack),
}

/// A failure, or a chain of failures each caused by the one before it.
///
/// Dropping an error tears down every registered context exactly once, most
/// recently pushed first.
pub struct Error {
  repr: Repr,
}

/// Growing the chain failed. The error that was being pushed is handed back.
#[derive(Debug, ThisError)]
#[error("failed to grow error chain: {source}")]
pub struct PushError {
  source: TryReserveError,
  error: Error,
}

impl PushError {
  /// The error that could not be pushed.
  pub fn into_error(self) -> Error {
    self.error
  }
}

impl Error {
  /// A dynamic error owning a copy of `message`.
  #[track_caller]
  pub fn new(message: impl Into<String>) -> Self {
    Self::dynamic(message.into(), None)
  }

  /// A dynamic error owning `message` and `context`; `destructor` receives
  /// the context when the frame is torn down.
  #[track_caller]
  pub fn new_with_context<T: Any>(
    message: impl Into<String>,
    context: T,
    destructor: impl FnOnce(T) + 'static,
  ) -> Self {
    Self::dynamic(message.into(), Some(Context::with_destructor(context, destructor)))
  }

  /// A dynamic error owning an already built [`Context`].
  #[track_caller]
  pub fn with_context(
    message: impl Into<String>,
    context: Context,
  ) -> Self {
    Self::dynamic(message.into(), Some(context))
  }

  /// A static error. Allocates nothing.
  #[track_caller]
  pub fn from_static(error: &'static StaticError) -> Self {
    Self {
      repr: Repr::Static(Frame::from_static(error, Location::caller())),
    }
  }

  #[track_caller]
  fn dynamic(
    message: String,
    context: Option<Context>,
  ) -> Self {
    let frame = Frame::dynamic(message.into_boxed_str(), context, Location::caller());
    Self {
      repr: Repr::Dynamic(FrameStack::with_frame(frame)),
    }
  }

  pub fn kind(&self) -> ErrorKind {
    match self.repr {
      Repr::Static(_) => ErrorKind::Static,
      Repr::Dynamic(_) => ErrorKind::Dynamic,
      Repr::Chain(_) => ErrorKind::Chain,
    }
  }

  /// Number of frames.
  pub fn depth(&self) -> usize {
    match &self.repr {
      Repr::Static(_) => 1,
      Repr::Dynamic(stack) | Repr::Chain(stack) => stack.len(),
    }
  }

  /// True for a chain whose frames have all been popped.
  pub fn is_empty(&self) -> bool {
    self.depth() == 0
  }

  /// Appends `error` (every frame of it, oldest first) as the newest part of
  /// this chain, promoting a lone error to a chain.
  ///
  /// When the frame buffer cannot grow, `self` is left as it was and `error`
  /// comes back inside the [`PushError`].
  pub fn push(
    &mut self,
    error: Error,
  ) -> Result<(), PushError> {
    let incoming = error.depth();
    let kind = self.kind();

    let mut stack = match mem::replace(&mut self.repr, Repr::Chain(FrameStack::new())) {
      Repr::Static(frame) => {
        let mut stack = FrameStack::new();
        if let Err(source) = stack.reserve(1 + incoming) {
          self.repr = Repr::Static(frame);
          return Err(Self::push_failed(source, error));
        }
        stack.push(frame);
        stack
      },
      Repr::Dynamic(stack) | Repr::Chain(stack) => stack,
    };

    if let Err(source) = stack.reserve(incoming) {
      self.repr = match kind {
        ErrorKind::Dynamic => Repr::Dynamic(stack),
        _ => Repr::Chain(stack),
      };
      return Err(Self::push_failed(source, error));
    }

    match error.into_stack() {
      Ok(frames) => stack.append(frames),
      Err(frame) => stack.push(frame),
    }

    self.repr = Repr::Chain(stack);
    Ok(())
  }

  fn push_failed(
    source: TryReserveError,
    error: Error,
  ) -> PushError {
    warn!(%source, frames = error.depth(), "error chain could not grow");
    PushError { source, error }
  }

  /// The frames of a dynamic error or chain, or the single static frame.
  fn into_stack(self) -> Result<FrameStack, Frame> {
    match self.repr {
      Repr::Static(frame) => Err(frame),
      Repr::Dynamic(stack) | Repr::Chain(stack) => Ok(stack),
    }
  }

  /// The most recently pushed frame.
  pub fn peek(&self) -> Option<&Frame> {
    match &self.repr {
      Repr::Static(frame) => Some(frame),
      Repr::Dynamic(stack) | Repr::Chain(stack) => stack.last(),
    }
  }

  /// Removes the most recently pushed frame.
  ///
  /// The frame's context destructor has already run when this returns; the
  /// frame keeps its message and site. What remains is a chain, possibly
  /// empty.
  pub fn pop(&mut self) -> Option<Frame> {
    let mut frame = match mem::replace(&mut self.repr, Repr::Chain(FrameStack::new())) {
      Repr::Static(frame) => frame,
      Repr::Dynamic(mut stack) | Repr::Chain(mut stack) => {
        let frame = stack.pop();
        self.repr = Repr::Chain(stack);
        frame?
      },
    };

    frame.destroy_context();
    Some(frame)
  }

  /// Message, site and context of the most recently pushed frame.
  pub fn details(&self) -> Option<Details<'_>> {
    self.peek().map(Frame::details)
  }

  /// The oldest frame: the failure everything else was caused by.
  pub fn root_cause(&self) -> Option<&Frame> {
    match &self.repr {
      Repr::Static(frame) => Some(frame),
      Repr::Dynamic(stack) | Repr::Chain(stack) => stack.first(),
    }
  }

  /// Frames from newest to oldest.
  pub fn frames(&self) -> Frames<'_> {
    let inner = match &self.repr {
      Repr::Static(frame) => FramesInner::Single(Some(frame)),
      Repr::Dynamic(stack) | Repr::Chain(stack) => FramesInner::Stack(stack.iter()),
    };
    Frames { inner }
  }
}

/// Iterator over the frames of an [`Error`], newest first.
pub struct Frames<'a> {
  inner: FramesInner<'a>,
}

enum FramesInner<'a> {
  Single(Option<&'a Frame>),
  Stack(Rev<slice::Iter<'a, Frame>>),
}

impl<'a> Iterator for Frames<'a> {
  type Item = &'a Frame;

  fn next(&mut self) -> Option<Self::Item> {
    match &mut self.inner {
      FramesInner::Single(frame) => frame.take(),
      FramesInner::Stack(iter) => iter.next(),
    }
  }
}

impl From<&'static StaticError> for Error {
  #[track_caller]
  fn from(error: &'static StaticError) -> Self {
    Self::from_static(error)
  }
}

impl From<Frame> for Error {
  fn from(frame: Frame) -> Self {
    let repr = if frame.is_static() {
      Repr::Static(frame)
    } else {
      Repr::Dynamic(FrameStack::with_frame(frame))
    };
    Self { repr }
  }
}

impl fmt::Display for Error {
  /// The newest message; `{:#}` prints the whole chain, newest first.
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    let mut frames = self.frames();

    let Some(newest) = frames.next() else {
      return f.write_str("empty error chain");
    };
    f.write_str(newest.message())?;

    if f.alternate() {
      for frame in frames {
        write!(f, ": {}", frame.message())?;
      }
    }
    Ok(())
  }
}

impl fmt::Debug for Error {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    struct Site<'a>(&'a Frame);

    impl fmt::Debug for Site<'_> {
      fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
      ) -> fmt::Result {
        write!(f, "{:?} at {}", self.0.message(), self.0.site())
      }
    }

    struct Listing<'a>(&'a Error);

    impl fmt::Debug for Listing<'_> {
      fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
      ) -> fmt::Result {
        f.debug_list().entries(self.0.frames().map(Site)).finish()
      }
    }

    f.debug_struct("Error")
      .field("kind", &self.kind())
      .field("frames", &Listing(self))
      .finish()
  }
}

impl std::error::Error for Error {}
