use std::any::Any;
use std::fmt;
use std::panic::Location;

/// An error message that lives for the whole program.
///
/// Declared at item level and referenced, never copied into the heap:
///
/// ```rust
/// use raligned::{Error, ErrorKind, StaticError};
///
/// static TOO_HIGH: StaticError = StaticError::new("something > 100");
///
/// let error = Error::from_static(&TOO_HIGH);
/// assert_eq!(error.kind(), ErrorKind::Static);
/// ```
#[derive(Debug, PartialEq, Eq)]
pub struct StaticError {
  message: &'static str,
}

impl StaticError {
  pub const fn new(message: &'static str) -> Self {
    Self { message }
  }

  pub const fn message(&self) -> &'static str {
    self.message
  }
}

impl fmt::Display for StaticError {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    f.write_str(self.message)
  }
}

type Destructor = Box<dyn FnOnce(Box<dyn Any>)>;

/// Opaque value owned by a dynamic frame.
///
/// The destructor, when one is registered, runs exactly once: when the frame
/// is popped, when the owning error is dropped, or when the context itself is
/// dropped, whichever happens first.
pub struct Context {
  value: Option<Box<dyn Any>>,
  destructor: Option<Destructor>,
}

impl Context {
  /// A context torn down by its own `Drop`.
  pub fn new<T: Any>(value: T) -> Self {
    Self {
      value: Some(Box::new(value)),
      destructor: None,
    }
  }

  /// A context handed to `destructor` at teardown.
  pub fn with_destructor<T: Any>(
    value: T,
    destructor: impl FnOnce(T) + 'static,
  ) -> Self {
    let destructor: Destructor = Box::new(move |value: Box<dyn Any>| {
      if let Ok(value) = value.downcast::<T>() {
        destructor(*value);
      }
    });

    Self {
      value: Some(Box::new(value)),
      destructor: Some(destructor),
    }
  }

  pub fn get(&self) -> Option<&dyn Any> {
    self.value.as_deref()
  }

  pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
    self.get().and_then(|value| value.downcast_ref::<T>())
  }

  pub fn has_destructor(&self) -> bool {
    self.destructor.is_some()
  }

  fn destroy(&mut self) {
    let value = self.value.take();
    let destructor = self.destructor.take();

    if let (Some(value), Some(destructor)) = (value, destructor) {
      destructor(value);
    }
  }
}

impl Drop for Context {
  fn drop(&mut self) {
    self.destroy();
  }
}

impl fmt::Debug for Context {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    f.debug_struct("Context")
      .field("live", &self.value.is_some())
      .field("destructor", &self.destructor.is_some())
      .finish()
  }
}

#[derive(Debug)]
pub(crate) enum Payload {
  Static(&'static StaticError),
  Dynamic {
    message: Box<str>,
    context: Option<Context>,
  },
}

/// One entry of an error chain.
#[derive(Debug)]
pub struct Frame {
  payload: Payload,
  site: &'static Location<'static>,
}

/// What a frame reports about itself.
#[derive(Debug, Clone, Copy)]
pub struct Details<'a> {
  pub message: &'a str,
  pub site: &'static Location<'static>,
  pub context: Option<&'a dyn Any>,
}

impl Frame {
  pub(crate) fn from_static(
    error: &'static StaticError,
    site: &'static Location<'static>,
  ) -> Self {
    Self {
      payload: Payload::Static(error),
      site,
    }
  }

  pub(crate) fn dynamic(
    message: Box<str>,
    context: Option<Context>,
    site: &'static Location<'static>,
  ) -> Self {
    Self {
      payload: Payload::Dynamic { message, context },
      site,
    }
  }

  pub fn message(&self) -> &str {
    match &self.payload {
      Payload::Static(error) => error.message(),
      Payload::Dynamic { message, .. } => message,
    }
  }

  /// Where the frame was created.
  pub fn site(&self) -> &'static Location<'static> {
    self.site
  }

  pub fn context(&self) -> Option<&dyn Any> {
    match &self.payload {
      Payload::Static(_) => None,
      Payload::Dynamic { context, .. } => context.as_ref().and_then(Context::get),
    }
  }

  pub fn is_static(&self) -> bool {
    matches!(self.payload, Payload::Static(_))
  }

  pub fn details(&self) -> Details<'_> {
    Details {
      message: self.message(),
      site: self.site,
      context: self.context(),
    }
  }

  /// Runs the context destructor now, leaving message and site in place.
  pub(crate) fn destroy_context(&mut self) {
    if let Payload::Dynamic { context, .. } = &mut self.payload {
      if let Some(mut context) = context.take() {
        context.destroy();
      }
    }
  }
}

impl fmt::Display for Frame {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    f.write_str(self.message())
  }
}
