use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use serde_json::Value;
use tokio::sync::oneshot;

use crate::config::CacheConfig;
use crate::fetch::EntitySource;

use super::links::{ScanProfile, entity_id, harvest_missing_ids};
use super::{ResolveError, ResolveResult};

/// A resolution request that arrived while another round was in flight.
///
/// The sender is consumed when the request's own round completes; dropping
/// it unfulfilled fails the waiting caller with [`ResolveError::Canceled`].
struct PendingRequest {
    entities: Arc<[Value]>,
    profile: ScanProfile,
    tx: oneshot::Sender<ResolveResult>,
}

#[derive(Default)]
struct RoundState {
    /// True while a round (harvest, fetch, merge) is executing.
    ///
    /// At most one round is active per cache instance at any time.
    in_flight: bool,
    /// Requests waiting for the current round, serviced strictly in order.
    queue: VecDeque<PendingRequest>,
}

/// The id→entity map and single-flight resolution queue shared by both
/// cache flavors.
///
/// All callers of a given instance funnel through the same queue: the first
/// request of an idle instance drives its own fetch round, requests arriving
/// mid-round are parked, and after each round the oldest parked request is
/// promoted immediately. That is the entire point of the component; it
/// exists to deduplicate and serialize overlapping resolution requests
/// against the same space and entity type.
///
/// Entities live for the lifetime of the instance (typically one UI view);
/// there is no eviction and saving an id again simply overwrites it.
pub(crate) struct ResolutionCache {
    entities: moka::sync::Cache<String, Arc<Value>>,
    source: Arc<dyn EntitySource>,
    config: CacheConfig,
    state: Mutex<RoundState>,
}

impl std::fmt::Debug for ResolutionCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (in_flight, queued) = self
            .state
            .lock()
            .map(|s| (s.in_flight, s.queue.len()))
            .unwrap_or_default();
        f.debug_struct("ResolutionCache")
            .field("config", &self.config)
            .field("entities", &self.entities.entry_count())
            .field("in_flight", &in_flight)
            .field("queued", &queued)
            .finish()
    }
}

impl ResolutionCache {
    pub(crate) fn new(source: Arc<dyn EntitySource>, config: CacheConfig) -> Self {
        let entities = moka::sync::Cache::builder()
            .name("resolved-entities")
            .build();
        ResolutionCache {
            entities,
            source,
            config,
            state: Mutex::default(),
        }
    }

    pub(crate) fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Pure lookup; never triggers a fetch.
    pub(crate) fn get(&self, id: &str) -> Option<Arc<Value>> {
        let entity = self.entities.get(id);
        if entity.is_some() {
            metric!(counter("cache.hit") += 1);
        } else {
            metric!(counter("cache.miss") += 1);
        }
        entity
    }

    pub(crate) fn contains(&self, id: &str) -> bool {
        self.entities.contains_key(id)
    }

    /// Upserts an entity keyed by its extracted id. Last write wins.
    ///
    /// Entities without an extractable id are logged and dropped so one bad
    /// item in a fetch response does not fail the round.
    pub(crate) fn save(&self, entity: &Value) {
        match entity_id(entity) {
            Some(id) => self.entities.insert(id.to_owned(), Arc::new(entity.clone())),
            None => {
                metric!(counter("cache.entity.malformed") += 1);
                tracing::warn!("dropping entity without an extractable id");
            }
        }
    }

    /// Ensures the entities linked from `entities` are cached.
    ///
    /// If no round is in flight, this call becomes the driver: it runs its
    /// own round and afterwards hands the queue off to a background drain
    /// task. Otherwise the request is parked and its result awaited.
    pub(crate) async fn resolve_missing(
        self: &Arc<Self>,
        entities: Arc<[Value]>,
        profile: ScanProfile,
    ) -> ResolveResult {
        metric!(counter("cache.resolve.access") += 1);

        let parked = {
            let mut state = self.state.lock().unwrap();
            if state.in_flight {
                let (tx, rx) = oneshot::channel();
                metric!(counter("cache.resolve.queued") += 1);
                tracing::debug!(depth = state.queue.len() + 1, "parking resolution request");
                state.queue.push_back(PendingRequest {
                    entities: Arc::clone(&entities),
                    profile: profile.clone(),
                    tx,
                });
                Some(rx)
            } else {
                state.in_flight = true;
                None
            }
        };

        if let Some(rx) = parked {
            return rx.await.unwrap_or(Err(ResolveError::Canceled));
        }

        let guard = RoundGuard::new(Arc::clone(self));
        let result = self.run_round(&entities, &profile).await;
        guard.disarm();
        self.finish_round();
        result
    }

    /// Runs one fetch round: harvest missing ids, fetch them in a single
    /// batch, merge the results into the map.
    ///
    /// Ids beyond `page_size` are not requested in this round; they stay
    /// unresolved until a later call triggers a new round for them. A remote
    /// miss is not retried either way, the set of missing ids is local to
    /// the round and gone when it completes.
    async fn run_round(&self, entities: &[Value], profile: &ScanProfile) -> ResolveResult {
        let mut missing = harvest_missing_ids(entities, profile, |id| self.contains(id));
        if missing.is_empty() {
            tracing::debug!("all linked entities cached, skipping fetch");
            return Ok(());
        }
        if missing.len() > self.config.page_size {
            tracing::debug!(
                dropped = missing.len() - self.config.page_size,
                "truncating fetch batch to one page"
            );
            missing.truncate(self.config.page_size);
        }

        metric!(counter("cache.fetch.batch") += 1);
        metric!(time_raw("cache.fetch.batch_size") = missing.len() as u64);
        tracing::debug!(ids = missing.len(), "fetching missing linked entities");

        let timeout = self.config.fetch_timeout;
        let fetch = self.source.fetch_entities(profile.entity_type, &missing);
        let fetched = match tokio::time::timeout(timeout, fetch).await {
            Ok(Ok(fetched)) => fetched,
            Ok(Err(err)) => {
                metric!(counter("cache.fetch.error") += 1);
                return Err(err);
            }
            Err(_) => {
                metric!(counter("cache.fetch.error") += 1, "reason" => "timeout");
                return Err(ResolveError::Timeout(timeout));
            }
        };

        for entity in &fetched {
            self.save(entity);
        }
        Ok(())
    }

    /// Promotes the oldest parked request once the driver's round is done.
    ///
    /// The drain runs on its own task so the driver's caller is not delayed
    /// by rounds it did not ask for.
    fn finish_round(self: &Arc<Self>) {
        let next = {
            let mut state = self.state.lock().unwrap();
            match state.queue.pop_front() {
                Some(pending) => Some(pending),
                None => {
                    state.in_flight = false;
                    None
                }
            }
        };

        if let Some(pending) = next {
            let this = Arc::clone(self);
            tokio::spawn(async move { this.drain(pending).await });
        }
    }

    /// Services parked requests one round at a time, in arrival order,
    /// until the queue is empty.
    ///
    /// A failed round rejects only the request that owns it; the queue
    /// keeps draining.
    async fn drain(self: &Arc<Self>, mut pending: PendingRequest) {
        let guard = RoundGuard::new(Arc::clone(self));
        loop {
            let result = self.run_round(&pending.entities, &pending.profile).await;
            let _ = pending.tx.send(result);

            let mut state = self.state.lock().unwrap();
            match state.queue.pop_front() {
                Some(next) => {
                    drop(state);
                    pending = next;
                }
                None => {
                    state.in_flight = false;
                    break;
                }
            }
        }
        guard.disarm();
    }
}

/// Clears the in-flight flag if a round driver is dropped mid-round.
///
/// Without this, a canceled driver would leave the flag set and stall the
/// queue forever. Parked requests are dropped along with it, failing their
/// callers with [`ResolveError::Canceled`].
struct RoundGuard {
    cache: Arc<ResolutionCache>,
    armed: bool,
}

impl RoundGuard {
    fn new(cache: Arc<ResolutionCache>) -> Self {
        RoundGuard { cache, armed: true }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for RoundGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut state = self.cache.state.lock().unwrap();
        state.in_flight = false;
        state.queue.clear();
    }
}
