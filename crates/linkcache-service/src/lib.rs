//! Client-side link resolution for CMS entities.
//!
//! Entities returned by a CMS space reference each other through unresolved
//! `Link` values that only carry the id of their target. This crate maintains
//! per-view caches which discover those references in a batch of entities,
//! fetch the missing targets from the space in a single deduplicated request,
//! and substitute the results back into the original payloads.
//!
//! The interesting part lives in [`caching`]: a single-flight resolution
//! queue that coalesces overlapping resolution requests (many rows of a grid
//! resolving their links at once) into strictly serialized fetch rounds.
//! [`caches`] exposes the two consumer-facing flavors built on top of it.

#[macro_use]
pub mod metrics;

pub mod caches;
pub mod caching;
pub mod config;
pub mod fetch;
pub mod logging;

#[cfg(test)]
#[allow(unused)]
pub mod test;

pub use caches::{EntityCache, EntityListCache};
pub use caching::{EntityType, ResolveError, ResolveResult, missing_stub};
pub use config::{CacheConfig, Config};
pub use fetch::{EntitySource, HttpEntitySource, SpaceConfig};
