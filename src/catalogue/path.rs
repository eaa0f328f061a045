//! Catalogue path parsing.
//!
//! Turns a path relative to the catalogue root into a typed entry. Accepted
//! shapes:
//!
//! - `{alias}/{version}/settings.{ext}`
//! - `{alias}/{version}/mappings/{type}.{ext}`
//!
//! Version segments may not contain `_`, so the physical name
//! `{alias}_{version}` always splits back at its last underscore.

use std::path::{Component, Path};

use super::{CatalogueError, IndexId, Result};

const SETTINGS_STEM: &str = "settings";
const MAPPINGS_DIR: &str = "mappings";

/// A single file in the catalogue, classified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogueEntry {
    Settings { id: IndexId },
    Mapping { id: IndexId, mapping_type: String },
}

impl CatalogueEntry {
    pub fn id(&self) -> &IndexId {
        match self {
            CatalogueEntry::Settings { id } | CatalogueEntry::Mapping { id, .. } => id,
        }
    }
}

/// Parse a catalogue-relative path.
pub fn parse_entry(relative: &Path) -> Result<CatalogueEntry> {
    let malformed = |reason: &str| CatalogueError::MalformedCatalogueEntry {
        path: relative.to_path_buf(),
        reason: reason.to_string(),
    };

    let mut segments = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(segment) => {
                let segment = segment
                    .to_str()
                    .ok_or_else(|| malformed("path is not valid UTF-8"))?;
                segments.push(segment);
            }
            _ => return Err(malformed("path must be relative and normalized")),
        }
    }

    match segments.as_slice() {
        [alias, version, file] => {
            let id = parse_id(alias, version).map_err(|r| malformed(&r))?;
            let (stem, _) = split_file_name(file).map_err(|r| malformed(&r))?;
            if stem != SETTINGS_STEM {
                return Err(malformed(&format!(
                    "unexpected file in version directory, expected '{}.<ext>'",
                    SETTINGS_STEM
                )));
            }
            Ok(CatalogueEntry::Settings { id })
        }
        [alias, version, dir, file] if *dir == MAPPINGS_DIR => {
            let id = parse_id(alias, version).map_err(|r| malformed(&r))?;
            let (stem, _) = split_file_name(file).map_err(|r| malformed(&r))?;
            Ok(CatalogueEntry::Mapping {
                id,
                mapping_type: stem.to_string(),
            })
        }
        _ => Err(malformed(
            "expected {alias}/{version}/settings.<ext> or {alias}/{version}/mappings/{type}.<ext>",
        )),
    }
}

fn parse_id(alias: &str, version: &str) -> std::result::Result<IndexId, String> {
    check_segment("alias", alias)?;
    check_segment("version", version)?;
    if version.contains('_') {
        return Err(format!(
            "version '{}' contains '_', physical name would be ambiguous",
            version
        ));
    }
    Ok(IndexId::new(alias, version))
}

fn check_segment(what: &str, segment: &str) -> std::result::Result<(), String> {
    if segment.is_empty() {
        return Err(format!("empty {} segment", what));
    }
    if segment.starts_with('.') {
        return Err(format!("{} '{}' starts with '.'", what, segment));
    }
    Ok(())
}

/// Split `name.ext` at the last dot. Both halves must be non-empty.
fn split_file_name(file: &str) -> std::result::Result<(&str, &str), String> {
    match file.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => Ok((stem, ext)),
        _ => Err(format!("file '{}' must be named <name>.<ext>", file)),
    }
}
