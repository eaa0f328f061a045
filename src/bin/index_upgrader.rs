//! index-upgrader: one-shot migration runner
//!
//! Loads configuration, waits for the search cluster to answer, then
//! migrates every alias in the catalogue to its newest version and exits.
//!
//! ## Usage
//! ```text
//! index-upgrader [config.yaml]
//! ```
//!
//! ## Configuration
//! - INDEX_UPGRADER_CONFIG: YAML config file (optional)
//! - INDEX_UPGRADER__CLUSTER__URL: cluster URL (default: http://localhost:9200)
//! - INDEX_UPGRADER__CATALOGUE__ROOT: catalogue directory (default: migrations)
//! - INDEX_UPGRADER__DRY_RUN: list pending migrations only
//! - INDEX_UPGRADER_LOG: tracing filter (default: info)

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use backon::Retryable;
use tracing::{error, info, warn};

use index_upgrader::catalogue::FilesystemCatalogue;
use index_upgrader::cluster::{ClusterAdmin, ClusterError, HttpClusterAdmin};
use index_upgrader::config::Config;
use index_upgrader::migration::MigrationOrchestrator;
use index_upgrader::utils::bootstrap::init_tracing;
use index_upgrader::utils::retry::{connection_backoff, is_retryable};

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "index-upgrader failed");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = std::env::args().nth(1);
    let config = Config::load(config_path.as_deref())?;

    let admin = Arc::new(HttpClusterAdmin::new(config.http_config())?);
    info!(url = %admin.base_url(), "Waiting for search cluster");
    (|| async { admin.ping().await })
        .retry(connection_backoff(config.cluster.connect_retries))
        .when(is_retryable)
        .notify(|err: &ClusterError, dur: Duration| {
            warn!(error = %err, delay = ?dur, "Cluster not reachable, retrying");
        })
        .await?;

    let catalogue = Arc::new(FilesystemCatalogue::new(&config.catalogue.root));
    let orchestrator =
        MigrationOrchestrator::new(catalogue, admin).with_config(config.executor_config());

    if config.dry_run {
        let plan = orchestrator.plan().await?;
        info!(pending = plan.len(), "Dry run, nothing will be changed");
        for migration in &plan {
            info!(migration = %migration, "Pending");
        }
        return Ok(());
    }

    let applied = orchestrator.migrate().await?;
    for migration in applied.iter() {
        info!(migration = %migration, "Applied");
    }
    Ok(())
}
