//! Template file storage abstraction for Trellis.
//!
//! This crate provides a [`Storage`] trait for the two I/O primitives the view
//! engine needs: reading a template file and listing the template files below
//! a directory. This enables:
//!
//! - **Unit testing** without touching the real filesystem
//! - **Counting and gating I/O** to verify cache and dedup behavior
//! - **Clean separation** between template resolution logic and I/O operations
//!
//! # Architecture
//!
//! The crate provides:
//! - [`Storage`] trait with `read()` and `scan()` methods
//! - [`FsStorage`] implementation for the local filesystem
//! - [`MockStorage`] for testing (behind `mock` feature flag)
//!
//! # Example
//!
//! ```ignore
//! use std::path::Path;
//! use trellis_storage::{FsStorage, Storage};
//!
//! let storage = FsStorage::new();
//! for name in storage.scan(Path::new("views/partials"), ".hbs")? {
//!     println!("{name}");
//! }
//! ```

mod fs;
#[cfg(feature = "mock")]
mod mock;
mod storage;

pub use fs::FsStorage;
#[cfg(feature = "mock")]
pub use mock::MockStorage;
pub use storage::{Storage, StorageError, StorageErrorKind};
