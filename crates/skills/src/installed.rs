//! Durable record of installed skills, backed by `installed-skills.json`.
//!
//! Every mutation rewrites the whole document via temp file + rename.

use std::path::{Path, PathBuf};

use {
    chrono::Utc,
    skillshelf_common::json::{read_json, write_json_atomic},
    tracing::{debug, info},
};

use crate::{
    error::Result,
    types::{InstalledDocument, InstalledSkillRecord, SkillSource},
};

pub struct InstalledRegistry {
    path: PathBuf,
    project_root: PathBuf,
    doc: InstalledDocument,
}

impl InstalledRegistry {
    /// Open the document at `path`, creating and persisting an empty one if absent.
    pub fn open(project_root: impl Into<PathBuf>, path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let project_root = project_root.into();
        let registry = if path.exists() {
            let doc: InstalledDocument = read_json(&path)?;
            debug!(path = %path.display(), skills = doc.installed_skills.len(), "loaded installed registry");
            Self {
                path,
                project_root,
                doc,
            }
        } else {
            let registry = Self {
                path,
                project_root,
                doc: InstalledDocument::default(),
            };
            registry.save()?;
            info!(path = %registry.path.display(), "created installed registry");
            registry
        };
        Ok(registry)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn document(&self) -> &InstalledDocument {
        &self.doc
    }

    /// Directory skills are installed into: `project_root / config.local_skills_path`.
    pub fn skills_dir(&self) -> PathBuf {
        self.resolve(&self.doc.config.local_skills_path)
    }

    /// Absolute location of an installed record.
    pub fn absolute_path(&self, record: &InstalledSkillRecord) -> PathBuf {
        self.resolve(&record.install_path)
    }

    pub fn get(&self, name: &str) -> Option<&InstalledSkillRecord> {
        self.doc.installed_skills.get(name)
    }

    pub fn list(&self) -> Vec<&InstalledSkillRecord> {
        self.doc.installed_skills.values().collect()
    }

    pub fn is_installed(&self, name: &str) -> bool {
        self.doc.installed_skills.contains_key(name)
    }

    /// Record an install, replacing any previous record for `name`.
    pub fn add(&mut self, name: &str, install_path: &Path, source: SkillSource) -> Result<()> {
        let stored = install_path
            .strip_prefix(&self.project_root)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| install_path.to_path_buf());
        let now = Utc::now();
        self.doc
            .installed_skills
            .insert(name.to_string(), InstalledSkillRecord {
                name: name.to_string(),
                install_path: stored,
                source,
                installed_at: now,
                last_updated: now,
                is_valid: true,
                validation_errors: None,
            });
        self.save()
    }

    /// Drop the record for `name`. Returns whether one existed. Files are untouched.
    pub fn remove(&mut self, name: &str) -> Result<bool> {
        if self.doc.installed_skills.shift_remove(name).is_none() {
            return Ok(false);
        }
        self.save()?;
        Ok(true)
    }

    /// Update validity of an existing record; unknown names are ignored.
    pub fn update_validity(
        &mut self,
        name: &str,
        is_valid: bool,
        errors: Option<String>,
    ) -> Result<()> {
        let Some(record) = self.doc.installed_skills.get_mut(name) else {
            return Ok(());
        };
        record.is_valid = is_valid;
        record.validation_errors = errors;
        record.last_updated = Utc::now();
        self.save()
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.project_root.join(path)
        }
    }

    fn save(&self) -> Result<()> {
        write_json_atomic(&self.path, &self.doc)?;
        Ok(())
    }
}
