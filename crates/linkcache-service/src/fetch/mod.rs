//! Fetching entities from a space.
//!
//! The cache core only depends on the [`EntitySource`] trait, which models
//! the one endpoint it consumes: a paged "list entities by id" query.
//! [`HttpEntitySource`] is the production implementation against the
//! space's HTTP API; tests substitute a programmable fake.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::caching::{EntityType, ResolveError, ResolveResult};

mod http;

pub use http::{HttpEntitySource, SpaceConfig};

/// A remote source of entities, bound to one space.
#[async_trait]
pub trait EntitySource: Send + Sync {
    /// Fetches the entities of the given type with the given ids.
    ///
    /// Ids absent from the space are simply absent from the result; that is
    /// not an error. The result may contain fewer items than requested for
    /// other reasons too (deleted or inaccessible entities).
    async fn fetch_entities(
        &self,
        entity_type: EntityType,
        ids: &[String],
    ) -> ResolveResult<Vec<Value>>;
}

/// Retries a fetch up to 3 times with a short pause in between.
///
/// Permission errors are not retried; a different outcome is very unlikely.
pub(crate) async fn retry<G, F, T>(task_gen: G) -> ResolveResult<T>
where
    G: Fn() -> F,
    F: Future<Output = ResolveResult<T>>,
{
    let mut tries = 0;
    loop {
        tries += 1;
        let result = task_gen().await;

        let should_not_retry = matches!(result, Ok(_) | Err(ResolveError::PermissionDenied(_)));
        if should_not_retry || tries >= 3 {
            break result;
        }

        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}
