use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use serde_json::Value;

use crate::caching::{ResolutionCache, ResolveResult, ScanProfile};
use crate::config::CacheConfig;
use crate::fetch::EntitySource;

/// A read-through link-resolution cache for list views.
///
/// Grid rows hand their entities over for resolution and afterwards read
/// the linked targets back through [`get`](Self::get) / [`has`](Self::has);
/// the input is never rewritten. Field values are locale maps keyed by
/// locale code, and only the default locale is scanned. Since grids render
/// a subset of columns, [`set_displayed_field_ids`](Self::set_displayed_field_ids)
/// restricts scanning to the fields actually shown.
///
/// Unlike [`EntityCache`](crate::EntityCache), a failed fetch round rejects
/// the call that owns it. Queued calls are unaffected and keep draining.
#[derive(Debug)]
pub struct EntityListCache {
    inner: Arc<ResolutionCache>,
    default_locale: String,
    displayed_field_ids: Mutex<Option<HashSet<String>>>,
}

impl EntityListCache {
    pub fn new(
        source: Arc<dyn EntitySource>,
        config: CacheConfig,
        default_locale: impl Into<String>,
    ) -> Self {
        EntityListCache {
            inner: Arc::new(ResolutionCache::new(source, config)),
            default_locale: default_locale.into(),
            displayed_field_ids: Mutex::new(None),
        }
    }

    /// Pure lookup, no fetch triggered.
    pub fn get(&self, id: &str) -> Option<Arc<Value>> {
        self.inner.get(id)
    }

    /// Pure existence check.
    pub fn has(&self, id: &str) -> bool {
        self.inner.contains(id)
    }

    /// Idempotent upsert keyed by the entity's extracted id.
    pub fn save(&self, entity: &Value) {
        self.inner.save(entity);
    }

    /// Restricts link scanning to the given field ids.
    ///
    /// Fields not in the list are ignored entirely. `None` clears the
    /// restriction again. The change applies to rounds started after this
    /// call; a round already in flight keeps the profile it was called with.
    pub fn set_displayed_field_ids(&self, ids: Option<Vec<String>>) {
        *self.displayed_field_ids.lock().unwrap() = ids.map(|ids| ids.into_iter().collect());
    }

    /// Ensures all entities linked from `entities` are cached.
    ///
    /// Resolves with no payload; read the results through [`get`](Self::get)
    /// and [`has`](Self::has). Calls made while another resolution is in
    /// flight are queued and serviced in arrival order.
    pub async fn resolve_linked_entities(&self, entities: &[Value]) -> ResolveResult {
        self.inner
            .resolve_missing(entities.into(), self.profile())
            .await
    }

    fn profile(&self) -> ScanProfile {
        let config = self.inner.config();
        ScanProfile {
            entity_type: config.entity_type,
            link_limit: config.link_limit,
            locale: Some(self.default_locale.clone()),
            allowed_fields: self.displayed_field_ids.lock().unwrap().clone(),
        }
    }
}
