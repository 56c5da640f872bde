//! Keyed memo cache with in-flight request deduplication.
//!
//! This crate provides [`Memo`], the building block behind every cache of the
//! Trellis view engine (raw files, directory listings, compiled and
//! precompiled templates). A memo combines two maps:
//!
//! - **Resolved entries**: values produced by a successful load, kept until
//!   explicitly invalidated
//! - **Pending flights**: loads currently running, one per key at most
//!
//! Callers asking for a key that is already being loaded join the running
//! flight instead of starting their own, so N concurrent requests for the
//! same key cost one underlying operation. Failed loads are never stored: the
//! next request for that key starts from scratch.
//!
//! # Example
//!
//! ```
//! use trellis_cache::Memo;
//!
//! let memo: Memo<String, usize, String> = Memo::new();
//!
//! let len = memo.get_or_load("home.hbs".to_owned(), true, || Ok(42)).unwrap();
//! assert_eq!(len, 42);
//!
//! // Served from the cache, the loader is not called again.
//! let len = memo
//!     .get_or_load("home.hbs".to_owned(), true, || Err("unreachable".to_owned()))
//!     .unwrap();
//! assert_eq!(len, 42);
//! ```

mod flight;
mod memo;

pub use memo::{Lookup, Memo};
