//! # synclog storage
//!
//! Byte backends that sit underneath the mutation journal.
//!
//! Backends are **opaque append-only byte stores**: they know nothing about
//! journal frames, batches or sequence numbers. The journal in
//! `synclog_core` owns the format and the recovery policy.
//!
//! ## Available Backends
//!
//! - [`InMemoryBackend`] - ephemeral stores and tests (supports fault injection)
//! - [`FileBackend`] - a single append-only file
//!
//! ## Example
//!
//! ```rust
//! use synclog_storage::{InMemoryBackend, StorageBackend};
//!
//! let mut backend = InMemoryBackend::new();
//! let offset = backend.append(b"frame").unwrap();
//! assert_eq!(backend.read_at(offset, 5).unwrap(), b"frame");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;

pub use backend::StorageBackend;
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use memory::InMemoryBackend;
