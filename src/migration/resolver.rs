//! Version resolution.
//!
//! Works out which version of each alias is live and which migrations are
//! still pending. The cluster is checked once per definition; everything
//! after that is a pure function of (catalogue, snapshot).

use std::collections::BTreeSet;

use tracing::debug;

use super::{Migration, MigrationError, Result};
use crate::catalogue::{Catalogue, IndexDefinition};
use crate::cluster::ClusterAdmin;

/// Physical indices known to exist in the cluster.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClusterSnapshot {
    existing: BTreeSet<String>,
}

impl ClusterSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_existing<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            existing: names.into_iter().map(Into::into).collect(),
        }
    }

    /// Check the cluster for every definition of one alias.
    pub async fn capture(
        admin: &dyn ClusterAdmin,
        alias: &str,
        definitions: &[&IndexDefinition],
    ) -> Result<Self> {
        let mut snapshot = Self::new();
        for definition in definitions {
            let name = definition.name();
            let exists = admin
                .index_exists(&name)
                .await
                .map_err(|source| MigrationError::Resolve {
                    alias: alias.to_string(),
                    source,
                })?;
            if exists {
                snapshot.existing.insert(name);
            }
        }
        Ok(snapshot)
    }

    pub fn exists(&self, name: &str) -> bool {
        self.existing.contains(name)
    }
}

/// Position of the live version in an ascending version list.
///
/// The highest position whose physical index exists wins, even if earlier
/// versions are missing. `None` means nothing is live yet.
pub fn current_position(versions: &[&IndexDefinition], snapshot: &ClusterSnapshot) -> Option<usize> {
    versions
        .iter()
        .rposition(|definition| snapshot.exists(&definition.name()))
}

/// Pending migrations for one alias, given its ascending version list.
///
/// One migration per consecutive pair from the live version to the newest;
/// when nothing is live, the chain starts with a source-less migration to
/// the first version.
pub fn pending_for_alias(
    alias: &str,
    versions: &[&IndexDefinition],
    snapshot: &ClusterSnapshot,
) -> Vec<Migration> {
    if versions.is_empty() {
        return Vec::new();
    }

    let mut pending = Vec::new();
    let start = match current_position(versions, snapshot) {
        Some(position) => position,
        None => {
            pending.push(Migration::new(alias, None, versions[0].clone()));
            0
        }
    };

    for pair in versions[start..].windows(2) {
        pending.push(Migration::new(
            alias,
            Some(pair[0].clone()),
            pair[1].clone(),
        ));
    }
    pending
}

/// Resolve pending migrations for one alias of the catalogue against the
/// live cluster.
pub async fn resolve_pending(
    catalogue: &Catalogue,
    alias: &str,
    admin: &dyn ClusterAdmin,
) -> Result<Vec<Migration>> {
    let versions = catalogue.versions_of(alias);
    let snapshot = ClusterSnapshot::capture(admin, alias, &versions).await?;
    let pending = pending_for_alias(alias, &versions, &snapshot);

    debug!(
        alias = %alias,
        versions = versions.len(),
        live = ?current_position(&versions, &snapshot).map(|p| versions[p].version()),
        pending = pending.len(),
        "Resolved alias"
    );
    Ok(pending)
}
