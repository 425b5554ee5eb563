//! Read-mostly index of known skills, backed by `skills-registry.json`.

use std::path::{Path, PathBuf};

use {
    chrono::Utc,
    indexmap::IndexMap,
    serde_json::Value,
    skillshelf_common::json::{read_json, write_json_atomic},
    tracing::{debug, info},
};

use crate::{
    error::{Error, Result},
    types::{CatalogSnapshot, CatalogStats, SkillDescriptor},
};

/// Optional exact-match filters applied before the text query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchFilter {
    /// Matches `metadata.category`.
    pub category: Option<String>,
    /// Matches the source `type` (`github` or `local`).
    pub source_type: Option<String>,
}

impl SearchFilter {
    fn matches(&self, skill: &SkillDescriptor) -> bool {
        if let Some(category) = &self.category
            && skill.metadata.category.as_deref() != Some(category.as_str())
        {
            return false;
        }
        if let Some(source_type) = &self.source_type
            && skill.source.type_name() != source_type
        {
            return false;
        }
        true
    }
}

pub struct CatalogRegistry {
    path: PathBuf,
    snapshot: CatalogSnapshot,
}

impl CatalogRegistry {
    /// Load the catalog document at `path`.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if !path.exists() {
            return Err(Error::not_found("catalog", path.display().to_string()));
        }
        let snapshot: CatalogSnapshot = read_json(&path)?;
        if let Some((key, name)) = snapshot.mismatched_key() {
            return Err(Error::Corrupt {
                path,
                reason: format!("entry '{key}' is named '{name}'"),
            });
        }
        debug!(path = %path.display(), skills = snapshot.skills.len(), "loaded catalog");
        Ok(Self { path, snapshot })
    }

    /// An in-memory catalog that is written to `path` only on [`save`](Self::save).
    pub fn from_snapshot(path: impl Into<PathBuf>, snapshot: CatalogSnapshot) -> Self {
        Self {
            path: path.into(),
            snapshot,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn snapshot(&self) -> &CatalogSnapshot {
        &self.snapshot
    }

    /// Case-insensitive substring match on name, description, or any tag,
    /// after the exact filters. An empty query matches every entry.
    /// Results keep catalog order.
    pub fn search(&self, query: &str, filter: &SearchFilter) -> Vec<&SkillDescriptor> {
        let query = query.to_lowercase();
        self.snapshot
            .skills
            .values()
            .filter(|skill| filter.matches(skill))
            .filter(|skill| {
                skill.name.to_lowercase().contains(&query)
                    || skill.description.to_lowercase().contains(&query)
                    || skill
                        .metadata
                        .tags
                        .iter()
                        .any(|tag| tag.to_lowercase().contains(&query))
            })
            .collect()
    }

    pub fn get(&self, name: &str) -> Option<&SkillDescriptor> {
        self.snapshot.skills.get(name)
    }

    pub fn list_all(&self, category: Option<&str>) -> Vec<&SkillDescriptor> {
        self.snapshot
            .skills
            .values()
            .filter(|skill| category.is_none() || skill.metadata.category.as_deref() == category)
            .collect()
    }

    pub fn categories(&self) -> &IndexMap<String, Value> {
        &self.snapshot.categories
    }

    pub fn stats(&self) -> &CatalogStats {
        &self.snapshot.stats
    }

    /// Replace the catalog, stamping `last_updated`, and persist it.
    pub fn save(&mut self, mut snapshot: CatalogSnapshot) -> Result<()> {
        if let Some((key, name)) = snapshot.mismatched_key() {
            return Err(Error::Corrupt {
                path: self.path.clone(),
                reason: format!("refusing to save entry '{key}' named '{name}'"),
            });
        }
        snapshot.last_updated = Some(Utc::now().to_rfc3339());
        write_json_atomic(&self.path, &snapshot)?;
        info!(path = %self.path.display(), skills = snapshot.skills.len(), "saved catalog");
        self.snapshot = snapshot;
        Ok(())
    }
}
