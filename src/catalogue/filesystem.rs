//! Filesystem-backed catalogue loader.
//!
//! Walks the catalogue root, classifies every file with [`parse_entry`] and
//! assembles the definitions. Hidden files and directories (leading `.`)
//! are skipped. Any malformed entry aborts the whole load.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tracing::{debug, info, warn};

use super::{
    parse_entry, Catalogue, CatalogueEntry, CatalogueError, CatalogueSource, IndexDefinition,
    IndexId, Result,
};

/// Catalogue read from a directory tree.
pub struct FilesystemCatalogue {
    root: PathBuf,
}

/// Definition under construction: settings may show up after mappings.
#[derive(Default)]
struct PendingDefinition {
    settings: Option<String>,
    mappings: BTreeMap<String, String>,
}

impl FilesystemCatalogue {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Collect every non-hidden file below the root, relative to it, sorted.
    async fn list_files(&self) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        let mut stack = vec![self.root.clone()];

        while let Some(dir) = stack.pop() {
            let mut entries = fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                if entry.file_name().to_string_lossy().starts_with('.') {
                    continue;
                }
                let path = entry.path();
                if entry.file_type().await?.is_dir() {
                    stack.push(path);
                } else if let Ok(relative) = path.strip_prefix(&self.root) {
                    files.push(relative.to_path_buf());
                }
            }
        }

        files.sort();
        Ok(files)
    }
}

#[async_trait]
impl CatalogueSource for FilesystemCatalogue {
    async fn load(&self) -> Result<Catalogue> {
        let files = self.list_files().await?;
        let mut pending: BTreeMap<IndexId, PendingDefinition> = BTreeMap::new();

        for relative in files {
            let entry = parse_entry(&relative)?;
            let body = fs::read_to_string(self.root.join(&relative)).await?;
            debug!(path = %relative.display(), "Catalogue entry");

            match entry {
                CatalogueEntry::Settings { id } => {
                    let slot = pending.entry(id).or_default();
                    if slot.settings.is_some() {
                        return Err(CatalogueError::MalformedCatalogueEntry {
                            path: relative,
                            reason: "more than one settings file for this version".to_string(),
                        });
                    }
                    slot.settings = Some(body);
                }
                CatalogueEntry::Mapping { id, mapping_type } => {
                    let slot = pending.entry(id).or_default();
                    if slot.mappings.contains_key(&mapping_type) {
                        return Err(CatalogueError::MalformedCatalogueEntry {
                            path: relative,
                            reason: format!("more than one mapping file for type '{}'", mapping_type),
                        });
                    }
                    slot.mappings.insert(mapping_type, body);
                }
            }
        }

        let mut catalogue = Catalogue::new();
        for (id, definition) in pending {
            let settings = definition
                .settings
                .ok_or_else(|| CatalogueError::MissingSettings {
                    alias: id.alias.clone(),
                    version: id.version.clone(),
                })?;
            let mut index = IndexDefinition::new(id.alias, id.version, settings);
            for (mapping_type, body) in definition.mappings {
                index.add_mapping(mapping_type, body);
            }
            catalogue.insert(index)?;
        }

        for conflict in catalogue.ordering_conflicts() {
            warn!(
                alias = %conflict.alias,
                runs_first = %conflict.runs_first,
                runs_later = %conflict.runs_later,
                "Versions are ordered lexicographically; zero-pad version numbers to keep numeric order"
            );
        }

        info!(
            root = %self.root.display(),
            definitions = catalogue.len(),
            aliases = catalogue.aliases().len(),
            "Catalogue loaded"
        );
        Ok(catalogue)
    }

    fn describe(&self) -> String {
        format!("filesystem:{}", self.root.display())
    }
}
