//! Keyed TTL caching for remote-fetched data.
//!
//! This module provides the `CacheStore`, the one store every screen reads
//! through. It guarantees at most one in-flight fetch per key, serves stale
//! values while revalidating in the background, and supports explicit
//! invalidation, identity-scoped bulk invalidation at sign-out, and JSON
//! snapshots that survive process restarts.

pub mod store;

pub use store::{BoxFetch, CacheStore, Lookup};
