//! Search cluster admin capability.
//!
//! The migration engine talks to the cluster only through [`ClusterAdmin`].
//! Implementations:
//! - `HttpClusterAdmin`: Elasticsearch REST API over HTTP
//! - `MockClusterAdmin`: in-memory cluster for tests

pub mod http;
pub mod mock;

pub use http::{HttpClusterAdmin, HttpClusterConfig};
pub use mock::{ClusterCall, MockClusterAdmin};

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// Errors that can occur while talking to the cluster.
#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Cluster returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Unexpected cluster response: {0}")]
    UnexpectedResponse(String),

    #[error("Scroll context not found: {0}")]
    ScrollNotFound(String),
}

/// Result type for cluster operations.
pub type Result<T> = std::result::Result<T, ClusterError>;

/// One document returned by a scroll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hit {
    pub id: String,
    pub doc_type: String,
    /// Raw JSON source exactly as stored.
    pub source: String,
}

/// One page of a scroll.
#[derive(Debug, Clone, Default)]
pub struct ScrollPage {
    /// Cursor for the next page; absent once the cluster has nothing more.
    pub scroll_id: Option<String>,
    pub hits: Vec<Hit>,
}

/// One document to write in a bulk request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkItem {
    pub index: String,
    pub doc_type: String,
    pub id: String,
    pub source: String,
}

impl BulkItem {
    /// Copy a scrolled hit into another index, keeping id and type.
    pub fn copy_of(hit: Hit, index: &str) -> Self {
        Self {
            index: index.to_string(),
            doc_type: hit.doc_type,
            id: hit.id,
            source: hit.source,
        }
    }
}

/// A rejected bulk item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkFailure {
    pub id: String,
    pub reason: String,
}

/// Outcome of a bulk request.
#[derive(Debug, Clone, Default)]
pub struct BulkResult {
    pub items: usize,
    pub failures: Vec<BulkFailure>,
}

impl BulkResult {
    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }
}

/// Admin and data operations the migration engine needs from a cluster.
///
/// Boolean results are acknowledgements: `false` means the cluster answered
/// but did not acknowledge the change.
#[async_trait]
pub trait ClusterAdmin: Send + Sync {
    /// Check that the cluster answers at all.
    async fn ping(&self) -> Result<()>;

    async fn index_exists(&self, name: &str) -> Result<bool>;

    async fn create_index(&self, name: &str, settings: &str) -> Result<bool>;

    async fn put_mapping(&self, name: &str, mapping_type: &str, definition: &str) -> Result<bool>;

    /// Open a scroll over every document of `index`.
    async fn open_scroll(
        &self,
        index: &str,
        page_size: usize,
        keep_alive: Duration,
    ) -> Result<ScrollPage>;

    /// Fetch the next page of an open scroll.
    async fn next_scroll(&self, scroll_id: &str, keep_alive: Duration) -> Result<ScrollPage>;

    /// Release an open scroll.
    async fn clear_scroll(&self, scroll_id: &str) -> Result<()>;

    async fn bulk_index(&self, items: Vec<BulkItem>) -> Result<BulkResult>;

    async fn refresh(&self, index: &str) -> Result<()>;

    /// Atomically point `alias` at `add_to` and, if given, away from `remove_from`.
    async fn swap_alias(&self, alias: &str, add_to: &str, remove_from: Option<&str>)
        -> Result<bool>;

    async fn delete_index(&self, name: &str) -> Result<bool>;
}

/// Cursor over every document of an index, page by page.
///
/// Pages are fetched on demand. The cursor is exhausted once a page comes
/// back empty.
pub struct ScrollCursor<'a> {
    admin: &'a dyn ClusterAdmin,
    index: String,
    page_size: usize,
    keep_alive: Duration,
    scroll_id: Option<String>,
    started: bool,
    exhausted: bool,
}

impl<'a> ScrollCursor<'a> {
    pub fn new(
        admin: &'a dyn ClusterAdmin,
        index: impl Into<String>,
        page_size: usize,
        keep_alive: Duration,
    ) -> Self {
        Self {
            admin,
            index: index.into(),
            page_size,
            keep_alive,
            scroll_id: None,
            started: false,
            exhausted: false,
        }
    }

    /// Next page of hits, or `None` once the index has been read through.
    pub async fn next_page(&mut self) -> Result<Option<Vec<Hit>>> {
        if self.exhausted {
            return Ok(None);
        }

        let page = if !self.started {
            self.started = true;
            self.admin
                .open_scroll(&self.index, self.page_size, self.keep_alive)
                .await?
        } else {
            match &self.scroll_id {
                Some(scroll_id) => self.admin.next_scroll(scroll_id, self.keep_alive).await?,
                None => ScrollPage::default(),
            }
        };

        if page.scroll_id.is_some() {
            self.scroll_id = page.scroll_id;
        }
        if page.hits.is_empty() {
            self.exhausted = true;
            return Ok(None);
        }
        Ok(Some(page.hits))
    }

    /// Release the server-side scroll context, if one was opened.
    pub async fn close(mut self) -> Result<()> {
        match self.scroll_id.take() {
            Some(scroll_id) => self.admin.clear_scroll(&scroll_id).await,
            None => Ok(()),
        }
    }
}
