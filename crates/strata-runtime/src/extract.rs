//! Extract stage: remote API to document store

use serde_json::Value;
use strata_core::{DatasetSpec, SourceShape};

use crate::error::{Error, Result};
use crate::source::HttpSource;
use crate::store::{DocumentStore, RawDocument};

/// Copies up to `limit` entities from the API into the document store
pub struct Extractor<'a> {
    source: HttpSource,
    store: &'a dyn DocumentStore,
    dataset: &'a DatasetSpec,
    limit: usize,
}

impl<'a> Extractor<'a> {
    /// Create an extractor for `dataset`
    pub fn new(
        source: HttpSource,
        store: &'a dyn DocumentStore,
        dataset: &'a DatasetSpec,
        limit: usize,
    ) -> Self {
        Self {
            source,
            store,
            dataset,
            limit,
        }
    }

    /// Run the extraction and return the number of documents upserted.
    ///
    /// A failed list request aborts the stage. A failure on a single entity
    /// is logged and the entity skipped.
    pub async fn extract(&self) -> Result<usize> {
        let endpoint = &self.dataset.source.endpoint;
        tracing::info!(
            "Starting extract: fetching list from {} (limit={})",
            self.source.endpoint_url(endpoint),
            self.limit
        );

        if self.limit == 0 {
            tracing::info!("Extract done. Upserted 0 raw documents");
            return Ok(0);
        }

        let upserted = match &self.dataset.source.shape {
            SourceShape::ListDetail {
                results_field,
                detail_url_field,
            } => {
                let entries = self
                    .source
                    .list(endpoint, Some(results_field), self.limit, true)
                    .await?;
                tracing::info!("Fetched {} entries. Downloading details...", entries.len());

                let mut upserted = 0;
                for entry in &entries {
                    match self.fetch_and_store(entry, detail_url_field).await {
                        Ok(()) => upserted += 1,
                        Err(e) => {
                            tracing::warn!("Failed to fetch/upsert {}: {}", describe(entry), e)
                        }
                    }
                }
                upserted
            }
            SourceShape::FlatList { results_field } => {
                let entities = self
                    .source
                    .list(endpoint, results_field.as_deref(), self.limit, false)
                    .await?;
                tracing::info!("Fetched {} entities", entities.len());

                let mut upserted = 0;
                for entity in entities {
                    let label = describe(&entity);
                    match self.store_entity(entity).await {
                        Ok(()) => upserted += 1,
                        Err(e) => tracing::warn!("Failed to upsert {}: {}", label, e),
                    }
                }
                upserted
            }
        };

        tracing::info!("Extract done. Upserted {} raw documents", upserted);
        Ok(upserted)
    }

    async fn fetch_and_store(&self, entry: &Value, detail_url_field: &str) -> Result<()> {
        let url = entry
            .get(detail_url_field)
            .and_then(Value::as_str)
            .ok_or_else(|| Error::UnexpectedResponse {
                url: self.source.endpoint_url(&self.dataset.source.endpoint),
                message: format!("list entry has no '{}' string", detail_url_field),
            })?;

        let detail = self.source.get_json(url).await?;
        self.store_entity(detail).await
    }

    async fn store_entity(&self, entity: Value) -> Result<()> {
        let document = RawDocument::from_json(entity).map_err(|other| Error::UnexpectedResponse {
            url: self.source.endpoint_url(&self.dataset.source.endpoint),
            message: format!("entity is not an object: {}", other),
        })?;

        let key_field = &self.dataset.natural_key;
        if document.natural_key(key_field).is_null() {
            tracing::debug!("Entity has no '{}'; upserting under a null key", key_field);
        }

        self.store.upsert(key_field, &document).await
    }
}

/// Short label for log lines: the entity's name or id, else the whole value
fn describe(entry: &Value) -> String {
    ["name", "title", "id"]
        .iter()
        .find_map(|k| entry.get(*k).filter(|v| !v.is_null()))
        .map(|v| match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
        .unwrap_or_else(|| entry.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{method, path, path_regex, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn pokemon() -> DatasetSpec {
        DatasetSpec::resolve("pokemon").unwrap()
    }

    fn games() -> DatasetSpec {
        DatasetSpec::resolve("games").unwrap()
    }

    fn source(server: &MockServer) -> HttpSource {
        HttpSource::new(server.uri(), Duration::from_secs(5)).unwrap()
    }

    /// Mount a list of `count` entries and detail endpoints for each
    async fn mount_pokemon(server: &MockServer, count: usize, failing: Option<usize>) {
        let results: Vec<Value> = (1..=count)
            .map(|i| json!({"name": format!("mon{}", i), "url": format!("{}/pokemon/{}", server.uri(), i)}))
            .collect();

        Mock::given(method("GET"))
            .and(path("/pokemon"))
            .and(query_param("limit", count.to_string()))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "results": results })))
            .mount(server)
            .await;

        if let Some(i) = failing {
            Mock::given(method("GET"))
                .and(path(format!("/pokemon/{}", i)))
                .respond_with(ResponseTemplate::new(500))
                .with_priority(1)
                .mount(server)
                .await;
        }

        for i in 1..=count {
            Mock::given(method("GET"))
                .and(path(format!("/pokemon/{}", i)))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                    "id": i,
                    "name": format!("mon{}", i),
                    "types": [{"slot": 1, "type": {"name": "normal"}}]
                })))
                .mount(server)
                .await;
        }
    }

    #[tokio::test]
    async fn test_list_detail_skips_failed_entity() {
        let server = MockServer::start().await;
        mount_pokemon(&server, 25, Some(13)).await;

        let store = MemoryStore::default();
        let dataset = pokemon();
        let extractor = Extractor::new(source(&server), &store, &dataset, 25);

        assert_eq!(extractor.extract().await.unwrap(), 24);
        let docs = store.documents();
        assert_eq!(docs.len(), 24);
        assert!(docs.iter().all(|d| d["id"] != 13));
    }

    #[tokio::test]
    async fn test_reextract_is_idempotent() {
        let server = MockServer::start().await;
        mount_pokemon(&server, 3, None).await;

        let store = MemoryStore::default();
        let dataset = pokemon();
        let extractor = Extractor::new(source(&server), &store, &dataset, 3);

        assert_eq!(extractor.extract().await.unwrap(), 3);
        let first = store.documents();
        assert_eq!(first.len(), 3);

        assert_eq!(extractor.extract().await.unwrap(), 3);
        assert_eq!(store.documents(), first);
    }

    #[tokio::test]
    async fn test_empty_list_upserts_nothing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/pokemon"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"results": []})))
            .mount(&server)
            .await;

        let store = MemoryStore::default();
        let dataset = pokemon();
        let extractor = Extractor::new(source(&server), &store, &dataset, 25);

        assert_eq!(extractor.extract().await.unwrap(), 0);
        assert!(store.documents().is_empty());
    }

    #[tokio::test]
    async fn test_list_failure_is_fatal() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/pokemon"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let store = MemoryStore::default();
        let dataset = pokemon();
        let extractor = Extractor::new(source(&server), &store, &dataset, 25);

        assert!(matches!(extractor.extract().await, Err(Error::Http(_))));
    }

    #[tokio::test]
    async fn test_store_failure_skips_entity() {
        let server = MockServer::start().await;
        mount_pokemon(&server, 4, None).await;

        let store = MemoryStore::rejecting(json!(2));
        let dataset = pokemon();
        let extractor = Extractor::new(source(&server), &store, &dataset, 4);

        assert_eq!(extractor.extract().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_entry_without_url_is_skipped() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/pokemon"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [
                    {"name": "nourl"},
                    {"name": "ok", "url": format!("{}/pokemon/1", server.uri())}
                ]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path_regex(r"^/pokemon/\d+$"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 1, "name": "ok"})))
            .mount(&server)
            .await;

        let store = MemoryStore::default();
        let dataset = pokemon();
        let extractor = Extractor::new(source(&server), &store, &dataset, 25);

        assert_eq!(extractor.extract().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_flat_list_truncates_to_limit() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/games"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"id": 1, "title": "A"},
                {"id": 2, "title": "B"},
                {"id": 3, "title": "C"},
                "not an object"
            ])))
            .mount(&server)
            .await;

        let store = MemoryStore::default();
        let dataset = games();

        let extractor = Extractor::new(source(&server), &store, &dataset, 2);
        assert_eq!(extractor.extract().await.unwrap(), 2);

        let extractor = Extractor::new(source(&server), &store, &dataset, 10);
        assert_eq!(extractor.extract().await.unwrap(), 3);
        assert_eq!(store.documents().len(), 3);

        let requests = server.received_requests().await.unwrap();
        assert!(requests.iter().all(|r| r.url.query().is_none()));
    }

    #[tokio::test]
    async fn test_zero_limit_makes_no_requests() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;

        let store = MemoryStore::default();
        let dataset = pokemon();
        let extractor = Extractor::new(source(&server), &store, &dataset, 0);

        assert_eq!(extractor.extract().await.unwrap(), 0);
    }

    #[test]
    fn test_describe_prefers_name() {
        assert_eq!(describe(&json!({"name": "bulbasaur", "url": "x"})), "bulbasaur");
        assert_eq!(describe(&json!({"id": 7})), "7");
        assert_eq!(describe(&json!({"url": "x"})), r#"{"url":"x"}"#);
    }
}
