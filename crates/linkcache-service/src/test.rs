//! Test fixtures that need types from this crate.
//!
//! Everything that works on plain JSON lives in the `linkcache-test` helper
//! crate and is re-exported here; this module adds the programmable
//! [`FakeSource`] standing in for a space.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Semaphore;

use crate::caching::{EntityType, ResolveError, ResolveResult, entity_id};
use crate::fetch::EntitySource;

pub use linkcache_test::{asset, entity, entity_server, link, localized, setup, wrapped};

/// An in-memory [`EntitySource`] with scripted contents.
///
/// Records every fetch batch for assertions. A gated source additionally
/// blocks each fetch until a permit is [`release`](Self::release)d, which
/// lets tests hold a round in flight deliberately.
pub struct FakeSource {
    entities: Mutex<HashMap<String, Value>>,
    batches: Mutex<Vec<Vec<String>>>,
    gate: Option<Semaphore>,
    fail_next: Mutex<Option<ResolveError>>,
}

impl FakeSource {
    pub fn new() -> Arc<Self> {
        Arc::new(FakeSource {
            entities: Mutex::default(),
            batches: Mutex::default(),
            gate: None,
            fail_next: Mutex::default(),
        })
    }

    /// A source whose fetches block until [`release`](Self::release)d.
    pub fn gated() -> Arc<Self> {
        Arc::new(FakeSource {
            entities: Mutex::default(),
            batches: Mutex::default(),
            gate: Some(Semaphore::new(0)),
            fail_next: Mutex::default(),
        })
    }

    pub fn insert(&self, entity: Value) {
        let id = entity_id(&entity).expect("fixture entities have ids").to_owned();
        self.entities.lock().unwrap().insert(id, entity);
    }

    /// Lets the next `fetches` gated fetches proceed.
    pub fn release(&self, fetches: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(fetches);
        }
    }

    /// Makes the next fetch fail with the given error.
    pub fn fail_next(&self, error: ResolveError) {
        *self.fail_next.lock().unwrap() = Some(error);
    }

    /// The id batches requested so far, in request order.
    pub fn batches(&self) -> Vec<Vec<String>> {
        self.batches.lock().unwrap().clone()
    }

    pub fn fetch_count(&self) -> usize {
        self.batches.lock().unwrap().len()
    }
}

#[async_trait]
impl EntitySource for FakeSource {
    async fn fetch_entities(
        &self,
        _entity_type: EntityType,
        ids: &[String],
    ) -> ResolveResult<Vec<Value>> {
        self.batches.lock().unwrap().push(ids.to_vec());

        if let Some(gate) = &self.gate {
            gate.acquire().await.expect("gate is never closed").forget();
        }

        if let Some(error) = self.fail_next.lock().unwrap().take() {
            return Err(error);
        }

        let entities = self.entities.lock().unwrap();
        Ok(ids.iter().filter_map(|id| entities.get(id).cloned()).collect())
    }
}
