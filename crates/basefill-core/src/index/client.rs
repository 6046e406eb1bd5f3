use std::time::Duration;

use reqwest::Method;
use reqwest::header::CONTENT_TYPE;
use serde_json::Value;
use tokio::time::sleep;

use crate::config::IndexConfig;
use crate::error::{IndexError, IndexResult};

const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Handle to the search index REST API.
///
/// Cheap to clone; clones share one connection pool, so concurrent bulk
/// workers can each hold their own copy.
#[derive(Clone)]
pub struct IndexClient {
    client: reqwest::Client,
    base_url: String,
    index_name: String,
    type_name: String,
    max_retries: u32,
    request_timeout: Duration,
    backoff: Duration,
}

impl IndexClient {
    pub fn new(config: &IndexConfig) -> IndexResult<Self> {
        let client = reqwest::Client::builder()
            .user_agent("basefill/0.1")
            .gzip(true)
            .build()?;
        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            index_name: config.index_name.clone(),
            type_name: config.type_name.clone(),
            max_retries: config.max_retries,
            request_timeout: config.request_timeout(),
            backoff: Duration::from_secs(1),
        })
    }

    /// Base delay between retries; doubles per attempt up to 30s.
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn index_name(&self) -> &str {
        &self.index_name
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    pub(crate) fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Send a JSON request and parse a JSON response.
    pub async fn send_json(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<&Value>,
        timeout: Duration,
    ) -> IndexResult<Value> {
        let payload = match body {
            Some(b) => Some(serde_json::to_string(b)?),
            None => None,
        };
        let text = self
            .send(method, path, query, payload, "application/json", timeout)
            .await?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Send a newline-delimited JSON body (the `_bulk` format).
    pub async fn send_ndjson(
        &self,
        path: &str,
        query: &[(&str, &str)],
        body: String,
        timeout: Duration,
    ) -> IndexResult<Value> {
        let text = self
            .send(
                Method::POST,
                path,
                query,
                Some(body),
                "application/x-ndjson",
                timeout,
            )
            .await?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Retries timeouts, connection failures, 429 and 5xx up to
    /// `max_retries` times. Anything else fails immediately.
    async fn send(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<String>,
        content_type: &str,
        timeout: Duration,
    ) -> IndexResult<String> {
        let url = self.url(path);
        let mut attempt = 0u32;
        loop {
            let mut req = self
                .client
                .request(method.clone(), &url)
                .query(query)
                .timeout(timeout);
            if let Some(b) = &body {
                req = req.header(CONTENT_TYPE, content_type).body(b.clone());
            }

            let err = match req.send().await {
                Ok(r) if r.status().is_success() => return Ok(r.text().await?),
                Ok(r) => {
                    let status = r.status().as_u16();
                    let body = r.text().await.unwrap_or_default();
                    IndexError::Status { status, body }
                }
                Err(e) => IndexError::Http(e),
            };

            if !err.is_transient() {
                return Err(err);
            }
            if attempt >= self.max_retries {
                return Err(IndexError::RetriesExhausted {
                    attempts: attempt + 1,
                    last: err.to_string(),
                });
            }

            let delay = self
                .backoff
                .saturating_mul(2u32.saturating_pow(attempt))
                .min(MAX_BACKOFF);
            tracing::warn!(
                url = url.as_str(),
                attempt = attempt + 1,
                error = %err,
                "index request failed, retrying in {:?}",
                delay
            );
            sleep(delay).await;
            attempt += 1;
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use mockito::Server;
    use serde_json::json;

    use super::*;

    pub(crate) fn test_client(url: &str, max_retries: u32) -> IndexClient {
        let config = IndexConfig {
            url: url.to_string(),
            max_retries,
            ..Default::default()
        };
        IndexClient::new(&config)
            .unwrap()
            .with_backoff(Duration::ZERO)
    }

    #[tokio::test]
    async fn retries_server_errors_then_gives_up() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/_cluster/health")
            .with_status(503)
            .with_body("busy")
            .expect(3)
            .create_async()
            .await;

        let client = test_client(&server.url(), 2);
        let err = client
            .send_json(Method::GET, "_cluster/health", &[], None, Duration::from_secs(5))
            .await
            .unwrap_err();

        mock.assert_async().await;
        assert!(matches!(err, IndexError::RetriesExhausted { attempts: 3, .. }));
    }

    #[tokio::test]
    async fn client_errors_are_not_retried() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/_cluster/health")
            .with_status(400)
            .with_body("bad")
            .expect(1)
            .create_async()
            .await;

        let client = test_client(&server.url(), 5);
        let err = client
            .send_json(Method::GET, "_cluster/health", &[], None, Duration::from_secs(5))
            .await
            .unwrap_err();

        mock.assert_async().await;
        assert!(matches!(err, IndexError::Status { status: 400, .. }));
    }

    #[tokio::test]
    async fn parses_json_response() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/_cluster/health")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(json!({"status": "green"}).to_string())
            .create_async()
            .await;

        let client = test_client(&format!("{}/", server.url()), 0);
        let value = client
            .send_json(Method::GET, "/_cluster/health", &[], None, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(value["status"], "green");
    }
}
