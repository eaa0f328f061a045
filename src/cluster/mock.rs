//! In-memory cluster for testing.
//!
//! Behaves like a single-node cluster: indices hold settings, mappings and
//! documents; aliases point at indices; scrolls page through a snapshot of
//! an index. Every call is recorded, and individual operations can be made
//! to return "not acknowledged" or fail outright.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{BulkFailure, BulkItem, BulkResult, ClusterAdmin, ClusterError, Hit, Result, ScrollPage};

/// A recorded call against the mock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClusterCall {
    Ping,
    IndexExists(String),
    CreateIndex(String),
    PutMapping { index: String, mapping_type: String },
    OpenScroll(String),
    NextScroll(String),
    ClearScroll(String),
    Bulk { items: usize },
    Refresh(String),
    SwapAlias {
        alias: String,
        add_to: String,
        remove_from: Option<String>,
    },
    DeleteIndex(String),
}

impl ClusterCall {
    /// True for calls that change cluster state.
    pub fn is_write(&self) -> bool {
        matches!(
            self,
            ClusterCall::CreateIndex(_)
                | ClusterCall::PutMapping { .. }
                | ClusterCall::Bulk { .. }
                | ClusterCall::SwapAlias { .. }
                | ClusterCall::DeleteIndex(_)
        )
    }
}

#[derive(Debug, Default)]
struct MockIndex {
    settings: String,
    mappings: BTreeMap<String, String>,
    /// (type, id) -> source
    documents: BTreeMap<(String, String), String>,
}

#[derive(Debug)]
struct ScrollState {
    page_size: usize,
    remaining: VecDeque<Hit>,
}

#[derive(Debug, Default)]
struct Faults {
    unavailable: bool,
    reject_create_index: bool,
    reject_mapping: Option<String>,
    reject_bulk_ids: BTreeSet<String>,
    reject_alias_swap: bool,
    reject_delete: bool,
    /// When the first index is created, the second one vanishes.
    delete_when_created: Option<(String, String)>,
    /// When any index is refreshed, this one vanishes.
    delete_when_refreshed: Option<String>,
    fail_next_scroll: bool,
}

#[derive(Debug, Default)]
struct MockState {
    indices: BTreeMap<String, MockIndex>,
    aliases: BTreeMap<String, BTreeSet<String>>,
    scrolls: HashMap<String, ScrollState>,
    next_scroll: u64,
    calls: Vec<ClusterCall>,
    faults: Faults,
}

impl MockState {
    fn record(&mut self, call: ClusterCall) -> Result<()> {
        self.calls.push(call);
        if self.faults.unavailable {
            return Err(ClusterError::Status {
                status: 503,
                body: "cluster unavailable".to_string(),
            });
        }
        Ok(())
    }

    fn resolve(&self, name: &str) -> Vec<String> {
        if self.indices.contains_key(name) {
            return vec![name.to_string()];
        }
        self.aliases
            .get(name)
            .map(|targets| targets.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn remove_index(&mut self, name: &str) {
        self.indices.remove(name);
        for targets in self.aliases.values_mut() {
            targets.remove(name);
        }
        self.aliases.retain(|_, targets| !targets.is_empty());
    }

    fn next_page(&mut self, scroll_id: &str) -> Result<ScrollPage> {
        let scroll = self
            .scrolls
            .get_mut(scroll_id)
            .ok_or_else(|| ClusterError::ScrollNotFound(scroll_id.to_string()))?;
        let take = scroll.page_size.min(scroll.remaining.len());
        let hits = scroll.remaining.drain(..take).collect();
        Ok(ScrollPage {
            scroll_id: Some(scroll_id.to_string()),
            hits,
        })
    }
}

fn alias_not_found(alias: &str, index: &str) -> ClusterError {
    ClusterError::Status {
        status: 404,
        body: format!(
            "aliases_not_found_exception: aliases [{}] missing on index [{}]",
            alias, index
        ),
    }
}

fn not_found(name: &str) -> ClusterError {
    ClusterError::Status {
        status: 404,
        body: format!("index_not_found_exception: no such index [{}]", name),
    }
}

/// Mock cluster that keeps everything in memory.
#[derive(Debug, Default)]
pub struct MockClusterAdmin {
    state: RwLock<MockState>,
}

impl MockClusterAdmin {
    pub fn new() -> Self {
        Self::default()
    }

    // ------------------------------------------------------------------
    // Seeding
    // ------------------------------------------------------------------

    /// Create an index directly, bypassing call recording and faults.
    pub async fn seed_index(&self, name: &str) {
        self.state
            .write()
            .await
            .indices
            .entry(name.to_string())
            .or_default();
    }

    /// Point an alias at an index directly.
    pub async fn seed_alias(&self, alias: &str, index: &str) {
        self.state
            .write()
            .await
            .aliases
            .entry(alias.to_string())
            .or_default()
            .insert(index.to_string());
    }

    /// Store a document directly, creating the index if needed.
    pub async fn seed_document(&self, index: &str, doc_type: &str, id: &str, source: &str) {
        self.state
            .write()
            .await
            .indices
            .entry(index.to_string())
            .or_default()
            .documents
            .insert((doc_type.to_string(), id.to_string()), source.to_string());
    }

    // ------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------

    pub async fn calls(&self) -> Vec<ClusterCall> {
        self.state.read().await.calls.clone()
    }

    pub async fn clear_calls(&self) {
        self.state.write().await.calls.clear();
    }

    /// Calls that changed (or tried to change) cluster state.
    pub async fn write_calls(&self) -> Vec<ClusterCall> {
        self.calls()
            .await
            .into_iter()
            .filter(ClusterCall::is_write)
            .collect()
    }

    pub async fn index_names(&self) -> Vec<String> {
        self.state.read().await.indices.keys().cloned().collect()
    }

    /// Indices an alias currently points at.
    pub async fn alias_targets(&self, alias: &str) -> Vec<String> {
        self.state
            .read()
            .await
            .aliases
            .get(alias)
            .map(|targets| targets.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub async fn settings_of(&self, index: &str) -> Option<String> {
        self.state
            .read()
            .await
            .indices
            .get(index)
            .map(|i| i.settings.clone())
    }

    /// Mapping types of an index, in type order.
    pub async fn mapping_types(&self, index: &str) -> Vec<String> {
        self.state
            .read()
            .await
            .indices
            .get(index)
            .map(|i| i.mappings.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Every document reachable through an index or alias name.
    pub async fn documents(&self, name: &str) -> Vec<Hit> {
        let state = self.state.read().await;
        state
            .resolve(name)
            .iter()
            .filter_map(|index| state.indices.get(index))
            .flat_map(|index| {
                index.documents.iter().map(|((doc_type, id), source)| Hit {
                    id: id.clone(),
                    doc_type: doc_type.clone(),
                    source: source.clone(),
                })
            })
            .collect()
    }

    /// Source of one document through an index or alias name.
    pub async fn get_document(&self, name: &str, doc_type: &str, id: &str) -> Option<String> {
        let state = self.state.read().await;
        let key = (doc_type.to_string(), id.to_string());
        state
            .resolve(name)
            .iter()
            .filter_map(|index| state.indices.get(index))
            .find_map(|index| index.documents.get(&key).cloned())
    }

    pub async fn open_scrolls(&self) -> usize {
        self.state.read().await.scrolls.len()
    }

    // ------------------------------------------------------------------
    // Fault injection
    // ------------------------------------------------------------------

    /// Fail every call with HTTP 503.
    pub async fn set_unavailable(&self, unavailable: bool) {
        self.state.write().await.faults.unavailable = unavailable;
    }

    pub async fn set_reject_create_index(&self, reject: bool) {
        self.state.write().await.faults.reject_create_index = reject;
    }

    /// Refuse to acknowledge the mapping for one type.
    pub async fn set_reject_mapping(&self, mapping_type: Option<&str>) {
        self.state.write().await.faults.reject_mapping = mapping_type.map(str::to_string);
    }

    /// Report a per-item failure for this document id in bulk requests.
    pub async fn reject_bulk_id(&self, id: &str) {
        self.state
            .write()
            .await
            .faults
            .reject_bulk_ids
            .insert(id.to_string());
    }

    pub async fn set_reject_alias_swap(&self, reject: bool) {
        self.state.write().await.faults.reject_alias_swap = reject;
    }

    pub async fn set_reject_delete(&self, reject: bool) {
        self.state.write().await.faults.reject_delete = reject;
    }

    /// Make `victim` disappear as soon as `trigger` is created.
    pub async fn delete_when_created(&self, trigger: &str, victim: &str) {
        self.state.write().await.faults.delete_when_created =
            Some((trigger.to_string(), victim.to_string()));
    }

    /// Make `victim` disappear on the next successful refresh.
    pub async fn delete_when_refreshed(&self, victim: &str) {
        self.state.write().await.faults.delete_when_refreshed = Some(victim.to_string());
    }

    /// Fail every `next_scroll` with HTTP 500, leaving the scroll open.
    pub async fn set_fail_next_scroll(&self, fail: bool) {
        self.state.write().await.faults.fail_next_scroll = fail;
    }
}

#[async_trait]
impl ClusterAdmin for MockClusterAdmin {
    async fn ping(&self) -> Result<()> {
        self.state.write().await.record(ClusterCall::Ping)
    }

    async fn index_exists(&self, name: &str) -> Result<bool> {
        let mut state = self.state.write().await;
        state.record(ClusterCall::IndexExists(name.to_string()))?;
        Ok(state.indices.contains_key(name))
    }

    async fn create_index(&self, name: &str, settings: &str) -> Result<bool> {
        let mut state = self.state.write().await;
        state.record(ClusterCall::CreateIndex(name.to_string()))?;
        if state.faults.reject_create_index {
            return Ok(false);
        }
        if state.indices.contains_key(name) {
            return Err(ClusterError::Status {
                status: 400,
                body: format!("resource_already_exists_exception: index [{}]", name),
            });
        }
        state.indices.insert(
            name.to_string(),
            MockIndex {
                settings: settings.to_string(),
                ..Default::default()
            },
        );
        if let Some((trigger, victim)) = state.faults.delete_when_created.clone() {
            if trigger == name {
                state.remove_index(&victim);
            }
        }
        Ok(true)
    }

    async fn put_mapping(&self, name: &str, mapping_type: &str, definition: &str) -> Result<bool> {
        let mut state = self.state.write().await;
        state.record(ClusterCall::PutMapping {
            index: name.to_string(),
            mapping_type: mapping_type.to_string(),
        })?;
        if state.faults.reject_mapping.as_deref() == Some(mapping_type) {
            return Ok(false);
        }
        let index = state.indices.get_mut(name).ok_or_else(|| not_found(name))?;
        index
            .mappings
            .insert(mapping_type.to_string(), definition.to_string());
        Ok(true)
    }

    async fn open_scroll(
        &self,
        index: &str,
        page_size: usize,
        _keep_alive: Duration,
    ) -> Result<ScrollPage> {
        let mut state = self.state.write().await;
        state.record(ClusterCall::OpenScroll(index.to_string()))?;
        let remaining: VecDeque<Hit> = state
            .indices
            .get(index)
            .ok_or_else(|| not_found(index))?
            .documents
            .iter()
            .map(|((doc_type, id), source)| Hit {
                id: id.clone(),
                doc_type: doc_type.clone(),
                source: source.clone(),
            })
            .collect();

        state.next_scroll += 1;
        let scroll_id = format!("scroll-{}", state.next_scroll);
        state.scrolls.insert(
            scroll_id.clone(),
            ScrollState {
                page_size: page_size.max(1),
                remaining,
            },
        );
        state.next_page(&scroll_id)
    }

    async fn next_scroll(&self, scroll_id: &str, _keep_alive: Duration) -> Result<ScrollPage> {
        let mut state = self.state.write().await;
        state.record(ClusterCall::NextScroll(scroll_id.to_string()))?;
        if state.faults.fail_next_scroll {
            return Err(ClusterError::Status {
                status: 500,
                body: "search_phase_execution_exception".to_string(),
            });
        }
        state.next_page(scroll_id)
    }

    async fn clear_scroll(&self, scroll_id: &str) -> Result<()> {
        let mut state = self.state.write().await;
        state.record(ClusterCall::ClearScroll(scroll_id.to_string()))?;
        state.scrolls.remove(scroll_id);
        Ok(())
    }

    async fn bulk_index(&self, items: Vec<BulkItem>) -> Result<BulkResult> {
        let mut state = self.state.write().await;
        state.record(ClusterCall::Bulk { items: items.len() })?;

        let mut result = BulkResult {
            items: items.len(),
            failures: Vec::new(),
        };
        for item in items {
            if state.faults.reject_bulk_ids.contains(&item.id) {
                result.failures.push(BulkFailure {
                    id: item.id,
                    reason: "mapper_parsing_exception: rejected by test".to_string(),
                });
                continue;
            }
            match state.indices.get_mut(&item.index) {
                Some(index) => {
                    index.documents.insert((item.doc_type, item.id), item.source);
                }
                None => result.failures.push(BulkFailure {
                    reason: format!("index_not_found_exception: no such index [{}]", item.index),
                    id: item.id,
                }),
            }
        }
        Ok(result)
    }

    async fn refresh(&self, index: &str) -> Result<()> {
        let mut state = self.state.write().await;
        state.record(ClusterCall::Refresh(index.to_string()))?;
        if !state.indices.contains_key(index) {
            return Err(not_found(index));
        }
        if let Some(victim) = state.faults.delete_when_refreshed.take() {
            state.remove_index(&victim);
        }
        Ok(())
    }

    async fn swap_alias(
        &self,
        alias: &str,
        add_to: &str,
        remove_from: Option<&str>,
    ) -> Result<bool> {
        let mut state = self.state.write().await;
        state.record(ClusterCall::SwapAlias {
            alias: alias.to_string(),
            add_to: add_to.to_string(),
            remove_from: remove_from.map(str::to_string),
        })?;
        if state.faults.reject_alias_swap {
            return Ok(false);
        }
        if !state.indices.contains_key(add_to) {
            return Err(not_found(add_to));
        }
        if let Some(source) = remove_from {
            if !state.indices.contains_key(source) {
                return Err(not_found(source));
            }
            let carries_alias = state
                .aliases
                .get(alias)
                .is_some_and(|targets| targets.contains(source));
            if !carries_alias {
                return Err(alias_not_found(alias, source));
            }
        }

        let targets = state.aliases.entry(alias.to_string()).or_default();
        if let Some(source) = remove_from {
            targets.remove(source);
        }
        targets.insert(add_to.to_string());
        Ok(true)
    }

    async fn delete_index(&self, name: &str) -> Result<bool> {
        let mut state = self.state.write().await;
        state.record(ClusterCall::DeleteIndex(name.to_string()))?;
        if state.faults.reject_delete {
            return Ok(false);
        }
        if !state.indices.contains_key(name) {
            return Err(not_found(name));
        }
        state.remove_index(name);
        Ok(true)
    }
}
