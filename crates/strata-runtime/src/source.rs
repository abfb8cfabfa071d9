//! HTTP client for the remote entity API

use reqwest::Client;
use serde_json::Value;
use std::time::Duration;

use crate::error::{Error, Result};

/// JSON-over-HTTP source rooted at a base URL
#[derive(Debug, Clone)]
pub struct HttpSource {
    client: Client,
    base_url: String,
}

impl HttpSource {
    /// Create a source whose requests each fail after `timeout`
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Absolute URL of an endpoint relative to the base URL
    pub fn endpoint_url(&self, endpoint: &str) -> String {
        format!("{}/{}", self.base_url, endpoint.trim_start_matches('/'))
    }

    /// GET `url` and decode the body as JSON; non-2xx statuses are errors
    pub async fn get_json(&self, url: &str) -> Result<Value> {
        let response = self.client.get(url).send().await?.error_for_status()?;
        Ok(response.json().await?)
    }

    /// Fetch up to `limit` entries from a list endpoint.
    ///
    /// `results_field` names the array inside the response object; when it is
    /// `None` the body itself must be the array. A response object without the
    /// field yields no entries. With `send_limit` the limit also goes out as a
    /// `?limit=` query parameter; otherwise the full list is fetched and
    /// truncated locally.
    pub async fn list(
        &self,
        endpoint: &str,
        results_field: Option<&str>,
        limit: usize,
        send_limit: bool,
    ) -> Result<Vec<Value>> {
        let url = self.endpoint_url(endpoint);
        let request = if send_limit {
            self.client.get(&url).query(&[("limit", limit)])
        } else {
            self.client.get(&url)
        };
        let body: Value = request.send().await?.error_for_status()?.json().await?;

        let entries = match (results_field, body) {
            (None, Value::Array(items)) => items,
            (Some(field), Value::Object(mut object)) => match object.remove(field) {
                Some(Value::Array(items)) => items,
                Some(other) => {
                    return Err(Error::UnexpectedResponse {
                        url,
                        message: format!("field '{}' is not an array: {}", field, other),
                    });
                }
                None => {
                    tracing::warn!("Response from {} has no '{}' field", url, field);
                    Vec::new()
                }
            },
            (Some(_), other) => {
                return Err(Error::UnexpectedResponse {
                    url,
                    message: format!("expected an object, got {}", kind(&other)),
                });
            }
            (None, other) => {
                return Err(Error::UnexpectedResponse {
                    url,
                    message: format!("expected an array, got {}", kind(&other)),
                });
            }
        };

        Ok(entries.into_iter().take(limit).collect())
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn source(server: &MockServer) -> HttpSource {
        HttpSource::new(server.uri(), Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_endpoint_url_joins_cleanly() {
        let source = HttpSource::new("http://api.local/v2/", Duration::from_secs(1)).unwrap();
        assert_eq!(source.endpoint_url("/pokemon"), "http://api.local/v2/pokemon");
        assert_eq!(source.endpoint_url("games"), "http://api.local/v2/games");
    }

    #[tokio::test]
    async fn test_list_sends_limit_and_reads_results_field() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/pokemon"))
            .and(query_param("limit", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "count": 3,
                "results": [{"name": "a"}, {"name": "b"}]
            })))
            .mount(&server)
            .await;

        let entries = source(&server).list("pokemon", Some("results"), 2, true).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1]["name"], "b");
    }

    #[tokio::test]
    async fn test_flat_list_is_truncated() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/games"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"id": 1}, {"id": 2}, {"id": 3}
            ])))
            .mount(&server)
            .await;

        let entries = source(&server).list("games", None, 2, false).await.unwrap();
        assert_eq!(entries, vec![json!({"id": 1}), json!({"id": 2})]);
    }

    #[tokio::test]
    async fn test_unpaged_list_omits_limit() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/games"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{"id": 1}, {"id": 2}, {"id": 3}]
            })))
            .mount(&server)
            .await;

        let entries = source(&server).list("games", Some("data"), 2, false).await.unwrap();
        assert_eq!(entries, vec![json!({"id": 1}), json!({"id": 2})]);

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].url.query(), None);
    }

    #[tokio::test]
    async fn test_missing_results_field_is_empty() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"count": 0})))
            .mount(&server)
            .await;

        let entries = source(&server).list("pokemon", Some("results"), 5, true).await.unwrap();
        assert!(entries.is_empty());
    }

    #[tokio::test]
    async fn test_wrong_shape_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
            .mount(&server)
            .await;

        let err = source(&server).list("games", None, 5, false).await.unwrap_err();
        assert!(matches!(err, Error::UnexpectedResponse { .. }));
    }

    #[tokio::test]
    async fn test_error_status_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = source(&server)
            .get_json(&format!("{}/pokemon/1", server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Http(_)));
    }
}
