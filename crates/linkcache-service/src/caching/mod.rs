//! # Link-resolution caching
//!
//! The caches in this crate answer one question for UI code: given a batch
//! of entities full of unresolved `Link` references, which entities do those
//! links point to? Answering it naively means every row of a grid fires its
//! own request against the space. Instead, each cache instance coalesces all
//! of its callers into serialized fetch rounds:
//!
//! - The first request of an idle instance runs a round directly: scan the
//!   batch for links of the configured type, dedupe the ids that are not
//!   cached yet, fetch them with a single `sys.id[in]` query, merge the
//!   results into the map.
//! - Requests arriving while a round is in flight are parked in a FIFO
//!   queue. After each round the oldest parked request starts its own round
//!   immediately; by then most of its ids are usually cached and the fetch
//!   is skipped.
//!
//! Ordering is strict: requests complete in arrival order, and no two rounds
//! of one instance ever overlap.
//!
//! ## Missing links are not errors
//!
//! A link target may have been deleted or be inaccessible. Resolution never
//! fails a batch because of that: unresolved links are substituted with
//! [`missing_stub`] placeholders and the UI renders partial results. Only
//! transport-level failures surface as [`ResolveError`], and even those are
//! degraded to stubs by the rewrite-style [`EntityCache`](crate::EntityCache).
//!
//! ## Metrics
//!
//! Every access and fetch is counted, tagged per concern:
//! `cache.resolve.access`, `cache.resolve.queued`, `cache.fetch.batch`,
//! `cache.fetch.error`, `cache.hit` / `cache.miss`, and
//! `cache.entity.malformed` for entities skipped during traversal.

mod links;
mod memory;
mod resolve_error;


pub use links::{EntityType, UnknownEntityType, missing_stub};
pub use resolve_error::{ResolveError, ResolveResult};

pub(crate) use links::{ScanProfile, entity_id, substitute_links};
pub(crate) use memory::ResolutionCache;
