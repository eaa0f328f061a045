//! Single-migration executor.
//!
//! Runs the four phases of one migration, each gated on the previous one:
//!
//! 1. Create the target index and put every type mapping.
//! 2. Copy every document from source to target (skipped without a source).
//! 3. Move the alias from source to target in one atomic request.
//! 4. Delete the source index (skipped without a source, no-op if already gone).
//!
//! Nothing is retried here. A failure in phases 1-3 leaves the alias where
//! it was; a failure in phase 4 leaves an orphaned source index behind an
//! alias that has already moved.
//!
//! The alias swap removes the alias from the source, and the cluster rejects
//! that when the source does not carry it. A run that died after creating
//! the first index but before aliasing it therefore cannot be resumed: the
//! next run treats that index as live and fails in phase 3. Delete the
//! unaliased index (or alias it by hand) before running again.

use std::time::Duration;

use tracing::{debug, info, warn};

use super::{Migration, MigrationError, MigrationLabel, Phase, Result};
use crate::catalogue::IndexDefinition;
use crate::cluster::{BulkItem, ClusterAdmin, ClusterError, ScrollCursor};

/// Default documents per scroll page.
pub const DEFAULT_SCROLL_PAGE_SIZE: usize = 200;
/// Default scroll keep-alive between page fetches.
pub const DEFAULT_SCROLL_KEEP_ALIVE: Duration = Duration::from_secs(60);
/// Default documents per bulk request.
pub const DEFAULT_BULK_BATCH_SIZE: usize = 1000;

/// Executor tuning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutorConfig {
    pub scroll_page_size: usize,
    pub scroll_keep_alive: Duration,
    pub bulk_batch_size: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            scroll_page_size: DEFAULT_SCROLL_PAGE_SIZE,
            scroll_keep_alive: DEFAULT_SCROLL_KEEP_ALIVE,
            bulk_batch_size: DEFAULT_BULK_BATCH_SIZE,
        }
    }
}

/// Executes one migration at a time against a cluster.
pub struct MigrationExecutor<'a> {
    admin: &'a dyn ClusterAdmin,
    config: ExecutorConfig,
}

impl<'a> MigrationExecutor<'a> {
    pub fn new(admin: &'a dyn ClusterAdmin, config: ExecutorConfig) -> Self {
        Self { admin, config }
    }

    /// Run all four phases of `migration`.
    pub async fn execute(&self, migration: &Migration) -> Result<()> {
        migration.validate()?;
        let label = migration.label();
        info!(migration = %label, "Starting migration");

        self.create_target(&label, migration.target()).await?;
        let copied = self.copy_documents(&label).await?;
        self.swap_alias(&label).await?;
        self.delete_source(&label).await?;

        info!(migration = %label, documents = copied, "Migration complete");
        Ok(())
    }

    async fn exists(&self, label: &MigrationLabel, phase: Phase, index: &str) -> Result<bool> {
        self.admin
            .index_exists(index)
            .await
            .map_err(|source| cluster_error(label, phase, source))
    }

    async fn require(&self, label: &MigrationLabel, phase: Phase, index: &str) -> Result<()> {
        if self.exists(label, phase, index).await? {
            Ok(())
        } else {
            Err(MigrationError::PreconditionFailed {
                migration: label.clone(),
                phase,
                index: index.to_string(),
            })
        }
    }

    /// Phase 1: create the target index and its mappings.
    async fn create_target(&self, label: &MigrationLabel, target: &IndexDefinition) -> Result<()> {
        let phase = Phase::CreateIndex;
        let name = &label.target;

        let acknowledged = self
            .admin
            .create_index(name, target.settings())
            .await
            .map_err(|source| cluster_error(label, phase, source))?;
        if !acknowledged {
            return Err(MigrationError::IndexCreationFailed {
                migration: label.clone(),
                index: name.clone(),
            });
        }

        for mapping in target.mappings() {
            let acknowledged = self
                .admin
                .put_mapping(name, &mapping.mapping_type, &mapping.definition)
                .await
                .map_err(|source| cluster_error(label, phase, source))?;
            if !acknowledged {
                return Err(MigrationError::MappingCreationFailed {
                    migration: label.clone(),
                    index: name.clone(),
                    mapping_type: mapping.mapping_type.clone(),
                });
            }
        }

        info!(
            index = %name,
            mappings = target.mappings().count(),
            "Created target index"
        );
        Ok(())
    }

    /// Phase 2: copy every source document into the target, keeping ids and
    /// types. Returns the number of documents copied.
    async fn copy_documents(&self, label: &MigrationLabel) -> Result<usize> {
        let phase = Phase::BulkCopy;
        let Some(source) = label.source.as_deref() else {
            return Ok(0);
        };
        let target = label.target.as_str();

        self.require(label, phase, source).await?;
        self.require(label, phase, target).await?;

        let items = self.read_all(label, source, target).await?;
        let total = items.len();

        let mut failed = 0;
        let mut first_reason = None;
        for batch in items.chunks(self.config.bulk_batch_size.max(1)) {
            let result = self
                .admin
                .bulk_index(batch.to_vec())
                .await
                .map_err(|source| cluster_error(label, phase, source))?;
            debug!(items = result.items, failures = result.failures.len(), "Bulk batch submitted");
            failed += result.failures.len();
            if first_reason.is_none() {
                first_reason = result
                    .failures
                    .into_iter()
                    .next()
                    .map(|f| format!("document '{}': {}", f.id, f.reason));
            }
        }

        if failed > 0 {
            return Err(MigrationError::BulkCopyFailed {
                migration: label.clone(),
                failed,
                total,
                first_reason: first_reason.unwrap_or_default(),
            });
        }

        self.admin
            .refresh(target)
            .await
            .map_err(|source| cluster_error(label, phase, source))?;

        info!(source = %source, target = %target, documents = total, "Copied documents");
        Ok(total)
    }

    /// Scroll through the whole source index, turning hits into bulk items
    /// addressed to the target.
    async fn read_all(&self, label: &MigrationLabel, source: &str, target: &str) -> Result<Vec<BulkItem>> {
        let phase = Phase::BulkCopy;
        let mut cursor = ScrollCursor::new(
            self.admin,
            source,
            self.config.scroll_page_size,
            self.config.scroll_keep_alive,
        );

        let mut items = Vec::new();
        let outcome = loop {
            match cursor.next_page().await {
                Ok(Some(hits)) => {
                    debug!(index = %source, hits = hits.len(), read = items.len(), "Scroll page");
                    items.extend(hits.into_iter().map(|hit| BulkItem::copy_of(hit, target)));
                }
                Ok(None) => break Ok(()),
                Err(e) => break Err(e),
            }
        };

        if let Err(e) = cursor.close().await {
            warn!(index = %source, error = %e, "Failed to clear scroll");
        }
        outcome.map_err(|source| cluster_error(label, phase, source))?;
        Ok(items)
    }

    /// Phase 3: move the alias in a single request.
    async fn swap_alias(&self, label: &MigrationLabel) -> Result<()> {
        let phase = Phase::AliasSwap;
        self.require(label, phase, &label.target).await?;

        let source = label.source.as_deref().filter(|s| !s.is_empty());
        if let Some(source) = source {
            self.require(label, phase, source).await?;
        }

        let acknowledged = self
            .admin
            .swap_alias(&label.alias, &label.target, source)
            .await
            .map_err(|source| cluster_error(label, phase, source))?;
        if !acknowledged {
            return Err(MigrationError::AliasSwapFailed {
                migration: label.clone(),
            });
        }

        info!(alias = %label.alias, from = ?source, to = %label.target, "Alias moved");
        Ok(())
    }

    /// Phase 4: delete the superseded index.
    async fn delete_source(&self, label: &MigrationLabel) -> Result<()> {
        let phase = Phase::DeleteSource;
        let Some(source) = label.source.as_deref().filter(|s| !s.is_empty()) else {
            return Ok(());
        };

        if !self.exists(label, phase, source).await? {
            warn!(index = %source, "Source index already gone, nothing to delete");
            return Ok(());
        }

        let acknowledged = self
            .admin
            .delete_index(source)
            .await
            .map_err(|e| cluster_error(label, phase, e))?;
        if !acknowledged {
            return Err(MigrationError::IndexDeletionFailed {
                migration: label.clone(),
                index: source.to_string(),
            });
        }

        info!(index = %source, "Deleted source index");
        Ok(())
    }
}

fn cluster_error(label: &MigrationLabel, phase: Phase, source: ClusterError) -> MigrationError {
    MigrationError::Cluster {
        migration: label.clone(),
        phase,
        source,
    }
}

#[cfg(test)]
mod tests;
