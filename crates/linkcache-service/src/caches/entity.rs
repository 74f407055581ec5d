use std::sync::Arc;

use serde_json::Value;

use crate::caching::{ResolutionCache, ResolveError, ResolveResult, ScanProfile};
use crate::config::CacheConfig;
use crate::fetch::EntitySource;

/// A link-resolution cache that rewrites its input.
///
/// This is the flavor used by editors and selectors that hold a handful of
/// entities and want them back with links replaced by the linked entities
/// themselves. Resolution degrades gracefully: links whose target cannot be
/// fetched come back as [`missing_stub`](crate::missing_stub)s, and even a
/// failed fetch round resolves the batch (with every requested link
/// missing) instead of failing it.
#[derive(Debug)]
pub struct EntityCache {
    inner: Arc<ResolutionCache>,
}

impl EntityCache {
    pub fn new(source: Arc<dyn EntitySource>, config: CacheConfig) -> Self {
        EntityCache {
            inner: Arc::new(ResolutionCache::new(source, config)),
        }
    }

    /// Pure lookup, no fetch triggered.
    pub fn get(&self, id: &str) -> Option<Arc<Value>> {
        self.inner.get(id)
    }

    /// Idempotent upsert keyed by the entity's extracted id.
    pub fn save(&self, entity: &Value) {
        self.inner.save(entity);
    }

    /// Resolves the links inside `entities` and returns rewritten copies.
    ///
    /// Calls made while another resolution is in flight are queued and
    /// serviced in arrival order; see the [`caching`](crate::caching)
    /// module docs for the coalescing contract.
    pub async fn resolve_linked_entities(&self, entities: &[Value]) -> ResolveResult<Vec<Value>> {
        let profile = self.profile();
        let entities: Arc<[Value]> = entities.into();

        match self
            .inner
            .resolve_missing(Arc::clone(&entities), profile.clone())
            .await
        {
            Ok(()) => {}
            Err(ResolveError::Canceled) => return Err(ResolveError::Canceled),
            Err(err) => {
                // Degrade instead of failing the batch: unresolved links
                // become missing stubs during substitution.
                tracing::warn!(
                    error = &err as &dyn std::error::Error,
                    "entity fetch failed, substituting missing links"
                );
            }
        }

        Ok(crate::caching::substitute_links(&entities, &profile, |id| {
            self.inner.get(id).map(|entity| (*entity).clone())
        }))
    }

    fn profile(&self) -> ScanProfile {
        let config = self.inner.config();
        ScanProfile {
            entity_type: config.entity_type,
            link_limit: config.link_limit,
            locale: None,
            allowed_fields: None,
        }
    }
}
