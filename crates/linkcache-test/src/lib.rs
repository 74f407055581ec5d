//! Helpers for testing the link-resolution caches.
//!
//! When writing tests, keep the following points in mind:
//!
//!  - In every test, call [`setup`]. This will set up the logger so that all
//!    console output is captured by the test runner.
//!
//!  - When using [`entity_server`], make sure that the server is held until
//!    all requests to it have been made. Dropping it aborts the server task
//!    and in-flight connections with it. To avoid that, assign it to a
//!    variable in the test function (e.g. `let server = entity_server(..)`).

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{Value, json};
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::fmt;
use url::Url;

/// Setup the test environment.
///
///  - Initializes logs: The logger only captures logs from this workspace's
///    crates and mutes all others.
pub fn setup() {
    fmt()
        .with_env_filter(EnvFilter::new("linkcache_service=trace"))
        .with_target(false)
        .pretty()
        .with_test_writer()
        .try_init()
        .ok();
}

/// An unresolved link value, as it appears inside an entity's fields.
pub fn link(link_type: &str, id: &str) -> Value {
    json!({
        "sys": {
            "type": "Link",
            "linkType": link_type,
            "id": id,
        }
    })
}

/// A bare entry with the given fields.
pub fn entity(id: &str, fields: Value) -> Value {
    json!({
        "sys": {
            "id": id,
            "type": "Entry",
        },
        "fields": fields,
    })
}

/// A bare asset with the given fields.
pub fn asset(id: &str, fields: Value) -> Value {
    json!({
        "sys": {
            "id": id,
            "type": "Asset",
        },
        "fields": fields,
    })
}

/// Wraps a bare entity into the `data` envelope some callers hand over.
pub fn wrapped(entity: Value) -> Value {
    json!({ "data": entity })
}

/// A field value keyed by locale code, as list views store them.
pub fn localized(locale: &str, value: Value) -> Value {
    let mut map = serde_json::Map::new();
    map.insert(locale.to_owned(), value);
    Value::Object(map)
}

/// A local HTTP server speaking the space's entity collection protocol.
///
/// Serves `GET /entries` and `GET /assets`, filtered by the `sys.id[in]`
/// query parameter. The server task is aborted on drop.
pub struct EntityServer {
    socket: SocketAddr,
    handle: tokio::task::JoinHandle<()>,
}

impl EntityServer {
    /// The base url to configure as the space url.
    pub fn url(&self) -> Url {
        format!("http://{}", self.socket)
            .parse()
            .expect("server url is valid")
    }
}

impl Drop for EntityServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Spawns an [`EntityServer`] serving the given entities.
pub async fn entity_server(entities: Vec<Value>) -> EntityServer {
    let state = Arc::new(entities);
    let app = Router::new()
        .route("/entries", get(list_entities))
        .route("/assets", get(list_entities))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("failed to bind server socket");
    let socket = listener.local_addr().expect("listener has a local addr");
    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.expect("server failed");
    });

    EntityServer { socket, handle }
}

async fn list_entities(
    State(entities): State<Arc<Vec<Value>>>,
    Query(params): Query<HashMap<String, String>>,
) -> Json<Value> {
    let requested: HashSet<&str> = params
        .get("sys.id[in]")
        .map(|ids| ids.split(',').collect())
        .unwrap_or_default();

    let items: Vec<Value> = entities
        .iter()
        .filter(|entity| {
            entity
                .pointer("/sys/id")
                .and_then(Value::as_str)
                .is_some_and(|id| requested.contains(id))
        })
        .cloned()
        .collect();

    Json(json!({
        "total": items.len(),
        "items": items,
    }))
}
