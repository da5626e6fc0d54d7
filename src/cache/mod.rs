//! Request-interception cache routing.
//!
//! The [`CacheRouter`] decides, per intercepted GET request, how to source a
//! response (network-first, cache-first or stale-while-revalidate) and owns
//! the cache generation lifecycle: install-time app-shell population,
//! activation-time cleanup of stale buckets, and the
//! `Installing → Installed → Activating → Active → Redundant` state machine.
//!
//! Responses live in version-tagged buckets behind the [`BucketStore`]
//! seam; the network sits behind [`NetworkFetcher`] so strategies can be
//! exercised with deterministic failure injection.

pub mod buckets;
pub mod fetcher;
pub mod request;
pub mod router;

pub use buckets::{BucketStore, Generation, MemoryBucketStore};
pub use fetcher::{FetchError, HttpFetcher, NetworkFetcher};
pub use request::{classify, Destination, PageRequest, PageResponse, Strategy};
pub use router::{CacheError, CacheRouter, GenerationState};
