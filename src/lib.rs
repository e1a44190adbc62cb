//! # raligned - Aligned Allocation and Chained Errors
//!
//! This crate provides two low-level building blocks meant to sit underneath
//! application code:
//!
//! - an **aligned allocator** that satisfies any power-of-two alignment on
//!   top of a backend (such as the C heap) that only guarantees its natural
//!   alignment, and finds its way back from nothing but the user pointer;
//! - a **chained error value** that carries a cause chain with per-frame
//!   owned context, and costs no allocation for static messages.
//!
//! ## Overview
//!
//! ```text
//!   caller ──► AlignedAllocator ──► layout engine ──► Backend ──► raw memory
//!                     │                   ▲
//!                     │   free/realloc    │
//!                     └── user pointer ───┘  (metadata recovery)
//! ```
//!
//! ## Crate Structure
//!
//! ```text
//!   raligned
//!   ├── align      - to_aligned_address (floor / ceiling)
//!   ├── meta       - Metadata record stored before each user block (internal)
//!   ├── layout     - raw request sizing, block placement, pointer recovery
//!   ├── backend    - Backend trait, LibcBackend, SystemBackend
//!   ├── aligned    - AlignedAllocator, AllocError
//!   ├── config     - Config, ErrorMode
//!   └── error      - Error, Frame, Context, StaticError
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use raligned::AlignedAllocator;
//!
//! let allocator = AlignedAllocator::new();
//!
//! let user = allocator.allocate(10, 64).unwrap();
//! assert_eq!(user.as_ptr() as usize % 64, 0);
//!
//! unsafe {
//!     user.as_ptr().write_bytes(0xAB, 10);
//!
//!     // Alignment is remembered; only the size is given again.
//!     let grown = allocator.reallocate_zeroed(user.as_ptr(), 100).unwrap();
//!     assert_eq!(*grown.as_ptr(), 0xAB);
//!     assert_eq!(*grown.as_ptr().add(99), 0);
//!
//!     allocator.free(grown.as_ptr());
//! }
//! ```
//!
//! ## How It Works
//!
//! The backend is asked for enough bytes to align both a metadata record and
//! the user block from any starting address:
//!
//! ```text
//!   raw_size = size_of(Metadata) + align_of(Metadata) + size + alignment
//!
//!   raw_base
//!   ▼
//!   ┌──────────┬────────────────────────┬──────────┬────────────────────┬─────┐
//!   │ padding  │                        │ Metadata │     user block     │ pad │
//!   │          │                        │  size    │                    │     │
//!   │          │                        │  align   │  size bytes usable │     │
//!   │          │                        │  offset ─┼─► back to raw_base │     │
//!   └──────────┴────────────────────────┴──────────┴────────────────────┴─────┘
//!                                                  ▲
//!                                                  └── pointer returned to user
//!                                                      (multiple of alignment)
//! ```
//!
//! The metadata always sits at the last `Metadata`-aligned address before the
//! user block, so it is found from the user pointer by rounding down, and the
//! stored offset leads back to the raw base for `free` and `reallocate`.
//!
//! Errors are a sum type:
//!
//! ```text
//!   Static   &'static message, no heap, nothing to free
//!   Dynamic  owned message + optional context with a destructor
//!   Chain    contiguous frames, oldest cause first, newest pushed last
//! ```
//!
//! ```rust
//! use raligned::{Error, ErrorKind, StaticError};
//!
//! static PARSE: StaticError = StaticError::new("unexpected token");
//!
//! let mut error = Error::from_static(&PARSE);
//! error.push(Error::new("while reading settings.toml")).unwrap();
//!
//! assert_eq!(error.kind(), ErrorKind::Chain);
//! assert_eq!(format!("{error:#}"), "while reading settings.toml: unexpected token");
//! ```
//!
//! ## Features
//!
//! - `libc` (default): [`DefaultBackend`] is [`LibcBackend`], built on
//!   `malloc`/`calloc`/`realloc`/`free` with `errno` diagnostics. Without it,
//!   [`DefaultBackend`] is [`SystemBackend`].
//!
//! Any type implementing [`Backend`] can be injected with
//! [`AlignedAllocator::with_backend`].
//!
//! ## Limitations
//!
//! - **Single-threaded only**: no internal synchronization
//! - **Over-allocates**: every block reserves worst-case padding
//!
//! ## Safety
//!
//! Allocation is safe to call; everything that takes a pointer back
//! (`reallocate*`, `free`, metadata queries) is `unsafe` and requires a live
//! pointer from the same allocator.

pub mod align;
mod aligned;
pub mod backend;
mod config;
mod error;
pub mod layout;
mod meta;

pub use align::{AlignDirection, to_aligned_address};
pub use aligned::{AlignedAllocator, AllocError};
#[cfg(feature = "libc")]
pub use backend::LibcBackend;
pub use backend::{Backend, BackendError, DefaultBackend, SystemBackend};
pub use config::{Config, ErrorMode};
pub use error::{Context, Details, Error, ErrorKind, Frame, Frames, PushError, StaticError};
pub use meta::Metadata;
