use std::collections::VecDeque;

use reqwest::Method;
use serde_json::{Value, json};

use crate::error::{IndexError, IndexResult};
use crate::index::IndexClient;
use crate::index::search::{Hit, parse_hits};

/// Lazy, finite walk over every hit of a query using a server-side scroll.
///
/// Not restartable mid-stream: to start over, open a new cursor, which
/// reissues the query.
pub struct ScrollCursor {
    client: IndexClient,
    query: Value,
    keep_alive: String,
    size: usize,
    scroll_id: Option<String>,
    buffer: VecDeque<Hit>,
    started: bool,
    drained: bool,
}

impl ScrollCursor {
    pub fn new(client: IndexClient, query: &Value, keep_alive: &str, size: usize) -> Self {
        Self {
            client,
            query: query.clone(),
            keep_alive: keep_alive.to_string(),
            size: size.max(1),
            scroll_id: None,
            buffer: VecDeque::new(),
            started: false,
            drained: false,
        }
    }

    /// The next hit, or `None` once the scroll is exhausted.
    pub async fn next(&mut self) -> IndexResult<Option<Hit>> {
        if let Some(hit) = self.buffer.pop_front() {
            return Ok(Some(hit));
        }
        if self.drained {
            return Ok(None);
        }

        let page = self.fetch_page().await?;
        if page.is_empty() {
            self.drained = true;
            self.clear().await;
            return Ok(None);
        }
        self.buffer.extend(page);
        Ok(self.buffer.pop_front())
    }

    pub fn is_drained(&self) -> bool {
        self.drained && self.buffer.is_empty()
    }

    async fn fetch_page(&mut self) -> IndexResult<Vec<Hit>> {
        let timeout = self.client.request_timeout();
        let response = if !self.started {
            self.started = true;
            let mut body = self.query.clone();
            if let Some(obj) = body.as_object_mut() {
                obj.insert("size".to_string(), json!(self.size));
            }
            let path = format!("{}/_search", self.client.index_name());
            self.client
                .send_json(
                    Method::POST,
                    &path,
                    &[("scroll", self.keep_alive.as_str())],
                    Some(&body),
                    timeout,
                )
                .await?
        } else {
            let Some(scroll_id) = self.scroll_id.clone() else {
                return Ok(Vec::new());
            };
            let body = json!({ "scroll": self.keep_alive, "scroll_id": scroll_id });
            self.client
                .send_json(Method::POST, "_search/scroll", &[], Some(&body), timeout)
                .await?
        };

        let scroll_id = response
            .get("_scroll_id")
            .and_then(Value::as_str)
            .ok_or_else(|| IndexError::MissingTag("_scroll_id".to_string()))?;
        self.scroll_id = Some(scroll_id.to_string());

        parse_hits(&response)
    }

    async fn clear(&mut self) {
        let Some(scroll_id) = self.scroll_id.take() else {
            return;
        };
        let body = json!({ "scroll_id": scroll_id });
        if let Err(e) = self
            .client
            .send_json(
                Method::DELETE,
                "_search/scroll",
                &[],
                Some(&body),
                self.client.request_timeout(),
            )
            .await
        {
            tracing::warn!(error = %e, "failed to clear scroll context");
        }
    }
}
