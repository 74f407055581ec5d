//! Support to fetch entities over the space's HTTP API.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use url::Url;

use crate::caching::{EntityType, ResolveError, ResolveResult};
use crate::config::Config;

use super::{EntitySource, retry};

/// The space a cache instance resolves against.
#[derive(Clone, Debug, Deserialize)]
pub struct SpaceConfig {
    /// Base url of the space, e.g. `https://cms.example.com/spaces/<id>`.
    pub url: Url,
    /// Bearer token sent with every request.
    #[serde(default)]
    pub token: Option<String>,
}

/// The collection envelope of a paged entity listing.
#[derive(Debug, Deserialize)]
struct EntityCollection {
    #[serde(default)]
    items: Vec<Value>,
}

/// [`EntitySource`] implementation against the space's HTTP API.
#[derive(Debug)]
pub struct HttpEntitySource {
    client: Client,
    space: SpaceConfig,
    page_size: usize,
}

impl HttpEntitySource {
    pub fn new(client: Client, space: SpaceConfig, page_size: usize) -> Self {
        Self {
            client,
            space,
            page_size,
        }
    }

    /// Builds a source with a default client from the application config.
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            Client::new(),
            config.space.clone(),
            config.cache.page_size,
        )
    }

    fn collection_url(&self, entity_type: EntityType, ids: &[String]) -> ResolveResult<Url> {
        let mut url = self.space.url.clone();
        url.path_segments_mut()
            .map_err(|_| ResolveError::Fetch("space url cannot be a base".into()))?
            .push(entity_type.collection());
        url.query_pairs_mut()
            .append_pair("sys.id[in]", &ids.join(","))
            .append_pair("limit", &self.page_size.to_string());
        Ok(url)
    }
}

#[async_trait]
impl EntitySource for HttpEntitySource {
    async fn fetch_entities(
        &self,
        entity_type: EntityType,
        ids: &[String],
    ) -> ResolveResult<Vec<Value>> {
        let url = self.collection_url(entity_type, ids)?;

        tracing::debug!(%url, "fetching entities from space");

        retry(|| async {
            let mut builder = self.client.get(url.clone());
            if let Some(token) = &self.space.token {
                builder = builder.bearer_auth(token);
            }

            let response = builder.send().await?;
            match response.status() {
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                    let details = response.text().await.unwrap_or_default();
                    Err(ResolveError::PermissionDenied(details))
                }
                status if !status.is_success() => {
                    Err(ResolveError::Fetch(format!("space responded with {status}")))
                }
                _ => {
                    let collection: EntityCollection = response.json().await?;
                    Ok(collection.items)
                }
            }
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    use crate::test;

    #[tokio::test]
    async fn test_fetch_entities() {
        test::setup();

        let entities = vec![
            test::entity("e1", json!({"title": "one"})),
            test::entity("e2", json!({"title": "two"})),
            test::entity("e3", json!({"title": "three"})),
        ];
        let server = linkcache_test::entity_server(entities).await;

        let space = SpaceConfig {
            url: server.url(),
            token: None,
        };
        let source = HttpEntitySource::new(Client::new(), space, 250);

        let ids = vec!["e1".to_owned(), "e3".to_owned(), "nope".to_owned()];
        let fetched = source
            .fetch_entities(EntityType::Entry, &ids)
            .await
            .unwrap();

        let fetched_ids: Vec<_> = fetched
            .iter()
            .map(|e| e["sys"]["id"].as_str().unwrap())
            .collect();
        assert_eq!(fetched_ids, vec!["e1", "e3"]);
    }

    #[tokio::test]
    async fn test_fetch_entities_empty_space() {
        test::setup();

        let server = linkcache_test::entity_server(Vec::new()).await;
        let space = SpaceConfig {
            url: server.url(),
            token: None,
        };
        let source = HttpEntitySource::new(Client::new(), space, 250);

        let ids = vec!["missing".to_owned()];
        let fetched = source
            .fetch_entities(EntityType::Asset, &ids)
            .await
            .unwrap();
        assert!(fetched.is_empty());
    }
}
