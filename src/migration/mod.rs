//! Index migrations.
//!
//! A migration moves an alias from one physical index to the next version:
//!
//! ```text
//! catalogue ──> resolver ──> [Migration, ...] ──> executor (per migration)
//!                  │                                  │
//!                  └── index_exists ──> cluster <─────┘ create, copy, swap, delete
//! ```
//!
//! The cluster's own index/alias state is the only record of which version
//! is live; nothing else is persisted between runs.

pub mod executor;
pub mod orchestrator;
pub mod resolver;

pub use executor::{ExecutorConfig, MigrationExecutor};
pub use orchestrator::MigrationOrchestrator;
pub use resolver::{current_position, pending_for_alias, resolve_pending, ClusterSnapshot};

use std::fmt;

use thiserror::Error;

use crate::catalogue::{CatalogueError, IndexDefinition};
use crate::cluster::ClusterError;

/// Phases of a single migration, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Phase {
    CreateIndex,
    BulkCopy,
    AliasSwap,
    DeleteSource,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::CreateIndex => "create-index",
            Phase::BulkCopy => "bulk-copy",
            Phase::AliasSwap => "alias-swap",
            Phase::DeleteSource => "delete-source",
        };
        f.write_str(name)
    }
}

/// Alias, source and target of a migration, by physical index name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationLabel {
    pub alias: String,
    pub source: Option<String>,
    pub target: String,
}

impl fmt::Display for MigrationLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source {
            Some(source) => write!(f, "{}: {} -> {}", self.alias, source, self.target),
            None => write!(f, "{}: (none) -> {}", self.alias, self.target),
        }
    }
}

/// Errors that abort a migration run.
#[derive(Debug, Error)]
pub enum MigrationError {
    #[error(transparent)]
    Catalogue(#[from] CatalogueError),

    #[error("Failed to read cluster state for alias '{alias}': {source}")]
    Resolve {
        alias: String,
        #[source]
        source: ClusterError,
    },

    #[error("Invalid migration [{migration}]: {reason}")]
    InvalidMigrationSpec {
        migration: MigrationLabel,
        reason: String,
    },

    #[error("Precondition failed in {phase} [{migration}]: index '{index}' does not exist")]
    PreconditionFailed {
        migration: MigrationLabel,
        phase: Phase,
        index: String,
    },

    #[error("Failed to create target index '{index}' [{migration}]")]
    IndexCreationFailed {
        migration: MigrationLabel,
        index: String,
    },

    #[error("Failed to create type '{mapping_type}' for target index '{index}' [{migration}]")]
    MappingCreationFailed {
        migration: MigrationLabel,
        index: String,
        mapping_type: String,
    },

    #[error("Failed to bulk copy {failed} of {total} documents [{migration}]: {first_reason}")]
    BulkCopyFailed {
        migration: MigrationLabel,
        failed: usize,
        total: usize,
        first_reason: String,
    },

    #[error("Failed to atomically move alias [{migration}]")]
    AliasSwapFailed { migration: MigrationLabel },

    #[error("Failed to delete source index '{index}' [{migration}]")]
    IndexDeletionFailed {
        migration: MigrationLabel,
        index: String,
    },

    #[error("Cluster error in {phase} [{migration}]: {source}")]
    Cluster {
        migration: MigrationLabel,
        phase: Phase,
        #[source]
        source: ClusterError,
    },
}

impl MigrationError {
    /// Phase the failure happened in, if it happened while executing.
    pub fn phase(&self) -> Option<Phase> {
        match self {
            MigrationError::Catalogue(_) | MigrationError::Resolve { .. } => None,
            MigrationError::InvalidMigrationSpec { .. } => None,
            MigrationError::PreconditionFailed { phase, .. } => Some(*phase),
            MigrationError::IndexCreationFailed { .. }
            | MigrationError::MappingCreationFailed { .. } => Some(Phase::CreateIndex),
            MigrationError::BulkCopyFailed { .. } => Some(Phase::BulkCopy),
            MigrationError::AliasSwapFailed { .. } => Some(Phase::AliasSwap),
            MigrationError::IndexDeletionFailed { .. } => Some(Phase::DeleteSource),
            MigrationError::Cluster { phase, .. } => Some(*phase),
        }
    }

    /// Migration the failure belongs to, if any.
    pub fn migration(&self) -> Option<&MigrationLabel> {
        match self {
            MigrationError::Catalogue(_) | MigrationError::Resolve { .. } => None,
            MigrationError::InvalidMigrationSpec { migration, .. }
            | MigrationError::PreconditionFailed { migration, .. }
            | MigrationError::IndexCreationFailed { migration, .. }
            | MigrationError::MappingCreationFailed { migration, .. }
            | MigrationError::BulkCopyFailed { migration, .. }
            | MigrationError::AliasSwapFailed { migration }
            | MigrationError::IndexDeletionFailed { migration, .. }
            | MigrationError::Cluster { migration, .. } => Some(migration),
        }
    }
}

/// Result type for migration operations.
pub type Result<T> = std::result::Result<T, MigrationError>;

/// One step of an alias's upgrade chain.
///
/// `source` is `None` only for the first migration of an alias, when no
/// version is live yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Migration {
    alias: String,
    source: Option<IndexDefinition>,
    target: IndexDefinition,
}

impl Migration {
    pub fn new(
        alias: impl Into<String>,
        source: Option<IndexDefinition>,
        target: IndexDefinition,
    ) -> Self {
        Self {
            alias: alias.into(),
            source,
            target,
        }
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn source(&self) -> Option<&IndexDefinition> {
        self.source.as_ref()
    }

    pub fn target(&self) -> &IndexDefinition {
        &self.target
    }

    /// Physical name of the source index, if any.
    pub fn source_name(&self) -> Option<String> {
        self.source.as_ref().map(IndexDefinition::name)
    }

    pub fn label(&self) -> MigrationLabel {
        MigrationLabel {
            alias: self.alias.clone(),
            source: self.source_name(),
            target: self.target.name(),
        }
    }

    /// Check the structural invariants: source and target differ and both
    /// belong to this alias.
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: String| MigrationError::InvalidMigrationSpec {
            migration: self.label(),
            reason,
        };

        if self.alias.is_empty() {
            return Err(invalid("alias is empty".to_string()));
        }
        if self.target.version().is_empty() {
            return Err(invalid("target version is empty".to_string()));
        }
        if self.target.alias() != self.alias {
            return Err(invalid(format!(
                "target belongs to alias '{}'",
                self.target.alias()
            )));
        }
        if let Some(source) = &self.source {
            if source.alias() != self.alias {
                return Err(invalid(format!(
                    "source belongs to alias '{}'",
                    source.alias()
                )));
            }
            if source == &self.target {
                return Err(invalid("source and target are the same index".to_string()));
            }
        }
        Ok(())
    }
}

impl fmt::Display for Migration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Migrations completed by one orchestrator run, in execution order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationsApplied {
    applied: Vec<MigrationLabel>,
}

impl MigrationsApplied {
    pub fn push(&mut self, migration: MigrationLabel) {
        self.applied.push(migration);
    }

    pub fn len(&self) -> usize {
        self.applied.len()
    }

    pub fn is_empty(&self) -> bool {
        self.applied.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MigrationLabel> {
        self.applied.iter()
    }

    /// Target index names in execution order.
    pub fn targets(&self) -> Vec<&str> {
        self.applied.iter().map(|m| m.target.as_str()).collect()
    }
}
