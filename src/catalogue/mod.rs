//! Versioned index catalogue.
//!
//! A catalogue is the set of index definitions an operator has declared,
//! laid out on disk as:
//!
//! ```text
//! {root}/
//!   {alias}/
//!     {version}/
//!       settings.json
//!       mappings/
//!         {type}.json
//! ```
//!
//! Definitions are immutable value objects rebuilt on every run. Within an
//! alias, versions are ordered by plain lexicographic comparison of the
//! version string, so `v10` sorts before `v2`. Zero-pad version numbers when
//! more than nine versions of an alias are expected.

mod filesystem;
mod path;

pub use filesystem::FilesystemCatalogue;
pub use path::{parse_entry, CatalogueEntry};

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use async_trait::async_trait;
use thiserror::Error;

/// Errors raised while building a catalogue.
#[derive(Debug, Error)]
pub enum CatalogueError {
    #[error("Malformed catalogue entry '{path}': {reason}")]
    MalformedCatalogueEntry { path: PathBuf, reason: String },

    #[error("Duplicate index definition: alias={alias}, version={version}")]
    DuplicateDefinition { alias: String, version: String },

    #[error("Index definition {alias}/{version} has no settings file")]
    MissingSettings { alias: String, version: String },

    #[error("IO error reading catalogue: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for catalogue operations.
pub type Result<T> = std::result::Result<T, CatalogueError>;

/// Identity of a versioned index: (alias, version).
///
/// Orders by alias, then version, so a sorted collection of ids groups
/// every alias together in upgrade order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct IndexId {
    pub alias: String,
    pub version: String,
}

impl IndexId {
    pub fn new(alias: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            alias: alias.into(),
            version: version.into(),
        }
    }

    /// Physical index name in the cluster: `{alias}_{version}`.
    pub fn physical_name(&self) -> String {
        format!("{}_{}", self.alias, self.version)
    }
}

impl fmt::Display for IndexId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.alias, self.version)
    }
}

/// Schema for one document type inside an index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeMapping {
    /// Index this mapping belongs to.
    pub owner: IndexId,
    /// Document type name.
    pub mapping_type: String,
    /// Opaque mapping body, sent to the cluster as-is.
    pub definition: String,
}

/// One versioned index: settings plus its type mappings.
///
/// Equality and ordering consider only the (alias, version) identity.
#[derive(Debug, Clone)]
pub struct IndexDefinition {
    id: IndexId,
    settings: String,
    mappings: BTreeMap<String, TypeMapping>,
}

impl IndexDefinition {
    pub fn new(
        alias: impl Into<String>,
        version: impl Into<String>,
        settings: impl Into<String>,
    ) -> Self {
        Self {
            id: IndexId::new(alias, version),
            settings: settings.into(),
            mappings: BTreeMap::new(),
        }
    }

    /// Add a type mapping, replacing any previous mapping for the same type.
    pub fn with_mapping(
        mut self,
        mapping_type: impl Into<String>,
        definition: impl Into<String>,
    ) -> Self {
        self.add_mapping(mapping_type, definition);
        self
    }

    pub(crate) fn add_mapping(
        &mut self,
        mapping_type: impl Into<String>,
        definition: impl Into<String>,
    ) {
        let mapping_type = mapping_type.into();
        let mapping = TypeMapping {
            owner: self.id.clone(),
            mapping_type: mapping_type.clone(),
            definition: definition.into(),
        };
        self.mappings.insert(mapping_type, mapping);
    }

    pub fn id(&self) -> &IndexId {
        &self.id
    }

    pub fn alias(&self) -> &str {
        &self.id.alias
    }

    pub fn version(&self) -> &str {
        &self.id.version
    }

    pub fn settings(&self) -> &str {
        &self.settings
    }

    /// Physical index name in the cluster.
    pub fn name(&self) -> String {
        self.id.physical_name()
    }

    /// Type mappings in type-name order.
    pub fn mappings(&self) -> impl Iterator<Item = &TypeMapping> {
        self.mappings.values()
    }

    pub fn mapping(&self, mapping_type: &str) -> Option<&TypeMapping> {
        self.mappings.get(mapping_type)
    }
}

impl PartialEq for IndexDefinition {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for IndexDefinition {}

impl PartialOrd for IndexDefinition {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for IndexDefinition {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.id.cmp(&other.id)
    }
}

/// Two versions of an alias whose lexicographic order differs from the
/// order of their trailing numbers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderingConflict {
    pub alias: String,
    /// Version that runs first (lexicographically smaller).
    pub runs_first: String,
    /// Version that runs later despite the smaller number.
    pub runs_later: String,
}

/// The full set of index definitions, keyed by identity.
#[derive(Debug, Clone, Default)]
pub struct Catalogue {
    definitions: BTreeMap<IndexId, IndexDefinition>,
}

impl Catalogue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a catalogue, rejecting duplicate (alias, version) pairs.
    pub fn from_definitions(definitions: impl IntoIterator<Item = IndexDefinition>) -> Result<Self> {
        let mut catalogue = Self::new();
        for definition in definitions {
            catalogue.insert(definition)?;
        }
        Ok(catalogue)
    }

    pub fn insert(&mut self, definition: IndexDefinition) -> Result<()> {
        if self.definitions.contains_key(definition.id()) {
            return Err(CatalogueError::DuplicateDefinition {
                alias: definition.alias().to_string(),
                version: definition.version().to_string(),
            });
        }
        self.definitions.insert(definition.id().clone(), definition);
        Ok(())
    }

    pub fn get(&self, alias: &str, version: &str) -> Option<&IndexDefinition> {
        self.definitions.get(&IndexId::new(alias, version))
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    /// All definitions, grouped by alias, versions ascending.
    pub fn iter(&self) -> impl Iterator<Item = &IndexDefinition> {
        self.definitions.values()
    }

    /// Distinct aliases in ascending order.
    pub fn aliases(&self) -> Vec<&str> {
        let mut aliases: Vec<&str> = self.definitions.keys().map(|id| id.alias.as_str()).collect();
        aliases.dedup();
        aliases
    }

    /// Definitions of one alias in ascending version order.
    pub fn versions_of(&self, alias: &str) -> Vec<&IndexDefinition> {
        self.definitions
            .values()
            .filter(|d| d.alias() == alias)
            .collect()
    }

    /// Group definitions by alias, each group in ascending version order.
    pub fn group_by_alias(&self) -> BTreeMap<&str, Vec<&IndexDefinition>> {
        let mut groups: BTreeMap<&str, Vec<&IndexDefinition>> = BTreeMap::new();
        for definition in self.definitions.values() {
            groups.entry(definition.alias()).or_default().push(definition);
        }
        groups
    }

    /// Find adjacent versions whose string order disagrees with the order of
    /// their trailing numbers (e.g. `v10` running before `v2`).
    pub fn ordering_conflicts(&self) -> Vec<OrderingConflict> {
        let mut conflicts = Vec::new();
        for (alias, versions) in self.group_by_alias() {
            for pair in versions.windows(2) {
                let (first, later) = (pair[0].version(), pair[1].version());
                if let (Some(a), Some(b)) = (numeric_suffix(first), numeric_suffix(later)) {
                    if a > b {
                        conflicts.push(OrderingConflict {
                            alias: alias.to_string(),
                            runs_first: first.to_string(),
                            runs_later: later.to_string(),
                        });
                    }
                }
            }
        }
        conflicts
    }
}

fn numeric_suffix(version: &str) -> Option<u64> {
    let digits = version.len() - version.trim_end_matches(|c: char| c.is_ascii_digit()).len();
    if digits == 0 {
        return None;
    }
    version[version.len() - digits..].parse().ok()
}

/// Source of index definitions.
#[async_trait]
pub trait CatalogueSource: Send + Sync {
    /// Build the full catalogue.
    async fn load(&self) -> Result<Catalogue>;

    /// Human-readable location for logging.
    fn describe(&self) -> String;
}

#[async_trait]
impl CatalogueSource for Catalogue {
    async fn load(&self) -> Result<Catalogue> {
        Ok(self.clone())
    }

    fn describe(&self) -> String {
        format!("in-memory ({} definitions)", self.len())
    }
}
