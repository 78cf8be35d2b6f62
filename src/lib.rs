//! Cowmap - A concurrently readable, copy-on-write hashmap
//!
//! A [CowMap] holds its content as an immutable snapshot behind a single
//! atomic reference. Readers load the current snapshot and work against
//! it without locking, without allocating, and without ever observing a
//! half-applied write. Writers copy the snapshot, apply their edit, and
//! atomically publish the copy, retrying if another writer published
//! first.
//!
//! You can use this in place of a `RwLock<HashMap>` when your workload
//! is heavily read-biased - think caches, routing tables, feature flags
//! or configuration maps that are refreshed occasionally but consulted
//! on every request. Readers never stall behind a writer, and a reader
//! holding a point-in-time view never stalls a writer either.
//!
//! The inverse also holds: every write copies the full map, so this is
//! the wrong structure for write-heavy workloads. If writes are frequent
//! or the map is large and hot with updates, a serialised-writer
//! structure (or a sharded lock) will serve you better.
//!
//! Superseded snapshots are garbage collected with crossbeam's epoch
//! based reclaim system. This is a space time trade: long-held read
//! transactions delay reclamation and can cause memory to grow until
//! they are released.
//!
//! # Features
//!
//! * `foldhash` (default) - hash snapshot keys with the foldhash crate
//! * `ahash` - hash snapshot keys with the cpu accelerated ahash crate
//! * `serde` - serialization support for the map and its read transactions

#![deny(warnings)]
#![warn(unused_extern_crates)]
#![warn(missing_docs)]

pub mod map;
pub use map::{CowMap, CowMapReadTxn};

mod internals;

#[cfg(feature = "serde")]
mod utils;
