//! Elasticsearch REST implementation of [`ClusterAdmin`].
//!
//! Uses the typed-index REST endpoints (`/_mapping/{type}`, `_type` in bulk
//! actions). Document sources are carried as raw JSON so copies are byte
//! for byte what the cluster stored.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::value::RawValue;
use serde_json::{json, Value};
use tracing::debug;

use super::{BulkFailure, BulkItem, BulkResult, ClusterAdmin, ClusterError, Hit, Result, ScrollPage};

/// Fallback when a hit carries no `_type`. Only typed clusters are
/// supported: bulk actions always send `_type` and mappings go to
/// `/_mapping/{type}`.
const DEFAULT_DOC_TYPE: &str = "_doc";

/// HTTP cluster client configuration.
#[derive(Debug, Clone)]
pub struct HttpClusterConfig {
    /// Base URL, e.g. `http://localhost:9200`.
    pub url: String,

    /// Request timeout.
    pub timeout: Duration,
}

impl Default for HttpClusterConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:9200".to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

impl HttpClusterConfig {
    /// Set the base URL.
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// Set the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[derive(Deserialize)]
struct Acknowledged {
    #[serde(default)]
    acknowledged: bool,
}

#[derive(Deserialize)]
struct ScrollResponse {
    #[serde(rename = "_scroll_id")]
    scroll_id: Option<String>,
    hits: HitsEnvelope,
}

#[derive(Deserialize)]
struct HitsEnvelope {
    #[serde(default)]
    hits: Vec<RawHit>,
}

#[derive(Deserialize)]
struct RawHit {
    #[serde(rename = "_id")]
    id: String,
    #[serde(rename = "_type")]
    doc_type: Option<String>,
    #[serde(rename = "_source")]
    source: Box<RawValue>,
}

#[derive(Deserialize)]
struct BulkResponse {
    #[serde(default)]
    errors: bool,
    #[serde(default)]
    items: Vec<Value>,
}

/// Cluster client speaking the Elasticsearch REST API.
pub struct HttpClusterAdmin {
    client: Client,
    base_url: String,
}

impl HttpClusterAdmin {
    pub fn new(config: HttpClusterConfig) -> Result<Self> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}/{}", self.base_url, path))
    }

    /// Fail on any non-2xx status, keeping the body for diagnostics.
    async fn check(response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(ClusterError::Status {
            status: status.as_u16(),
            body: body.chars().take(500).collect(),
        })
    }

    async fn acknowledged(response: Response) -> Result<bool> {
        let body: Acknowledged = Self::check(response).await?.json().await?;
        Ok(body.acknowledged)
    }

    async fn scroll_page(response: Response) -> Result<ScrollPage> {
        let bytes = Self::check(response).await?.bytes().await?;
        parse_scroll_page(&bytes)
    }
}

fn keep_alive_param(keep_alive: Duration) -> String {
    format!("{}ms", keep_alive.as_millis().max(1))
}

/// Build a newline-delimited bulk body.
fn bulk_body(items: &[BulkItem]) -> Result<String> {
    let mut body = String::new();
    for item in items {
        let action = json!({
            "index": {
                "_index": item.index,
                "_type": item.doc_type,
                "_id": item.id,
            }
        });
        body.push_str(&serde_json::to_string(&action)?);
        body.push('\n');
        // Raw line breaks in JSON can only sit between tokens.
        body.push_str(&item.source.replace(['\n', '\r'], " "));
        body.push('\n');
    }
    Ok(body)
}

fn parse_scroll_page(bytes: &[u8]) -> Result<ScrollPage> {
    let response: ScrollResponse = serde_json::from_slice(bytes)?;
    let hits = response
        .hits
        .hits
        .into_iter()
        .map(|hit| Hit {
            id: hit.id,
            doc_type: hit.doc_type.unwrap_or_else(|| DEFAULT_DOC_TYPE.to_string()),
            source: hit.source.get().to_string(),
        })
        .collect();
    Ok(ScrollPage {
        scroll_id: response.scroll_id,
        hits,
    })
}

fn parse_bulk_response(bytes: &[u8], submitted: usize) -> Result<BulkResult> {
    let response: BulkResponse = serde_json::from_slice(bytes)?;
    let mut result = BulkResult {
        items: submitted,
        failures: Vec::new(),
    };
    if !response.errors {
        return Ok(result);
    }

    for item in &response.items {
        let outcome = item
            .as_object()
            .and_then(|actions| actions.values().next())
            .ok_or_else(|| ClusterError::UnexpectedResponse(format!("bulk item: {}", item)))?;
        if let Some(error) = outcome.get("error") {
            let id = outcome
                .get("_id")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let reason = match (error.get("type"), error.get("reason")) {
                (Some(Value::String(t)), Some(Value::String(r))) => format!("{}: {}", t, r),
                _ => error.to_string(),
            };
            result.failures.push(BulkFailure { id, reason });
        }
    }
    Ok(result)
}

#[async_trait]
impl ClusterAdmin for HttpClusterAdmin {
    async fn ping(&self) -> Result<()> {
        let response = self.request(Method::GET, "").send().await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn index_exists(&self, name: &str) -> Result<bool> {
        let response = self.request(Method::HEAD, name).send().await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(false),
            status if status.is_success() => Ok(true),
            _ => Self::check(response).await.map(|_| false),
        }
    }

    async fn create_index(&self, name: &str, settings: &str) -> Result<bool> {
        let response = self
            .request(Method::PUT, name)
            .header("Content-Type", "application/json")
            .body(settings.to_string())
            .send()
            .await?;
        Self::acknowledged(response).await
    }

    async fn put_mapping(&self, name: &str, mapping_type: &str, definition: &str) -> Result<bool> {
        let response = self
            .request(Method::PUT, &format!("{}/_mapping/{}", name, mapping_type))
            .header("Content-Type", "application/json")
            .body(definition.to_string())
            .send()
            .await?;
        Self::acknowledged(response).await
    }

    async fn open_scroll(
        &self,
        index: &str,
        page_size: usize,
        keep_alive: Duration,
    ) -> Result<ScrollPage> {
        let query = json!({
            "size": page_size,
            "query": { "match_all": {} },
            "sort": ["_doc"],
        });
        let response = self
            .request(Method::POST, &format!("{}/_search", index))
            .query(&[("scroll", keep_alive_param(keep_alive))])
            .json(&query)
            .send()
            .await?;
        Self::scroll_page(response).await
    }

    async fn next_scroll(&self, scroll_id: &str, keep_alive: Duration) -> Result<ScrollPage> {
        let body = json!({
            "scroll": keep_alive_param(keep_alive),
            "scroll_id": scroll_id,
        });
        let response = self
            .request(Method::POST, "_search/scroll")
            .json(&body)
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(ClusterError::ScrollNotFound(scroll_id.to_string()));
        }
        Self::scroll_page(response).await
    }

    async fn clear_scroll(&self, scroll_id: &str) -> Result<()> {
        let body = json!({ "scroll_id": [scroll_id] });
        let response = self
            .request(Method::DELETE, "_search/scroll")
            .json(&body)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn bulk_index(&self, items: Vec<BulkItem>) -> Result<BulkResult> {
        if items.is_empty() {
            return Ok(BulkResult::default());
        }
        let body = bulk_body(&items)?;
        debug!(items = items.len(), bytes = body.len(), "Submitting bulk request");

        let response = self
            .request(Method::POST, "_bulk")
            .header("Content-Type", "application/x-ndjson")
            .body(body)
            .send()
            .await?;
        let bytes = Self::check(response).await?.bytes().await?;
        parse_bulk_response(&bytes, items.len())
    }

    async fn refresh(&self, index: &str) -> Result<()> {
        let response = self
            .request(Method::POST, &format!("{}/_refresh", index))
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn swap_alias(
        &self,
        alias: &str,
        add_to: &str,
        remove_from: Option<&str>,
    ) -> Result<bool> {
        let body = json!({ "actions": alias_actions(alias, add_to, remove_from) });
        let response = self
            .request(Method::POST, "_aliases")
            .json(&body)
            .send()
            .await?;
        Self::acknowledged(response).await
    }

    async fn delete_index(&self, name: &str) -> Result<bool> {
        let response = self.request(Method::DELETE, name).send().await?;
        Self::acknowledged(response).await
    }
}

/// Alias actions for one atomic `_aliases` request.
fn alias_actions(alias: &str, add_to: &str, remove_from: Option<&str>) -> Vec<Value> {
    let mut actions = Vec::with_capacity(2);
    if let Some(source) = remove_from.filter(|s| !s.is_empty()) {
        actions.push(json!({ "remove": { "index": source, "alias": alias } }));
    }
    actions.push(json!({ "add": { "index": add_to, "alias": alias } }));
    actions
}
