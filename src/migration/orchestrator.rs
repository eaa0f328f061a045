//! Migration orchestration.
//!
//! Loads the catalogue, resolves each alias against the cluster and runs the
//! pending migrations in version order. The first failure ends the whole
//! run; completed migrations stay in place, and running again resumes from
//! whatever version is live.

use std::sync::Arc;

use tracing::{error, info};

use super::{
    resolve_pending, ExecutorConfig, Migration, MigrationError, MigrationExecutor,
    MigrationsApplied, Result,
};
use crate::catalogue::CatalogueSource;
use crate::cluster::ClusterAdmin;

/// Drives catalogue → resolver → executor for every alias.
///
/// Concurrent runs against the same cluster are not safe; callers must
/// serialize them.
pub struct MigrationOrchestrator {
    catalogue: Arc<dyn CatalogueSource>,
    admin: Arc<dyn ClusterAdmin>,
    config: ExecutorConfig,
}

impl MigrationOrchestrator {
    pub fn new(catalogue: Arc<dyn CatalogueSource>, admin: Arc<dyn ClusterAdmin>) -> Self {
        Self {
            catalogue,
            admin,
            config: ExecutorConfig::default(),
        }
    }

    /// Override executor tuning.
    pub fn with_config(mut self, config: ExecutorConfig) -> Self {
        self.config = config;
        self
    }

    /// Every pending migration, in execution order, without running any.
    pub async fn plan(&self) -> Result<Vec<Migration>> {
        let catalogue = self.catalogue.load().await?;
        let mut plan = Vec::new();
        for alias in catalogue.aliases() {
            plan.extend(resolve_pending(&catalogue, alias, self.admin.as_ref()).await?);
        }
        Ok(plan)
    }

    /// Bring every alias up to its newest version.
    ///
    /// Aliases run one after another in name order; within an alias,
    /// migrations run in ascending version order. Stops at the first error.
    pub async fn migrate(&self) -> Result<MigrationsApplied> {
        info!(catalogue = %self.catalogue.describe(), "Loading catalogue");
        let catalogue = self.catalogue.load().await?;
        let executor = MigrationExecutor::new(self.admin.as_ref(), self.config.clone());
        let mut applied = MigrationsApplied::default();

        for alias in catalogue.aliases() {
            let pending = resolve_pending(&catalogue, alias, self.admin.as_ref()).await?;
            if pending.is_empty() {
                info!(alias = %alias, "Alias is up to date");
                continue;
            }
            info!(alias = %alias, pending = pending.len(), "Migrating alias");

            for migration in &pending {
                if let Err(e) = executor.execute(migration).await {
                    log_failure(&e);
                    return Err(e);
                }
                applied.push(migration.label());
            }
        }

        info!(applied = applied.len(), "Migration run complete");
        Ok(applied)
    }
}

fn log_failure(e: &MigrationError) {
    match e.migration() {
        Some(migration) => error!(
            alias = %migration.alias,
            source = ?migration.source,
            target = %migration.target,
            phase = ?e.phase(),
            error = %e,
            "Migration failed"
        ),
        None => error!(error = %e, "Migration failed"),
    }
}
