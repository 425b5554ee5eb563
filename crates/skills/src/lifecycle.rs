//! Install / uninstall / validate orchestration.
//!
//! Install moves through resolve, fetch (into a staging directory inside the
//! install root), validate, replace, register and link. Any failure before
//! the replace step removes the staging directory and leaves the previous
//! installation, if any, exactly as it was.

use std::path::{Path, PathBuf};

use {
    skillshelf_config::StoreConfig,
    tracing::{debug, info, warn},
};

use crate::{
    catalog::{CatalogRegistry, SearchFilter},
    error::{Context, Error, Result},
    fetch::{DefaultFetcher, SourceFetcher, is_plain_component},
    installed::InstalledRegistry,
    link::{DiscoveryLinker, LinkOutcome, UnlinkOutcome},
    parse::{ManifestHeader, read_frontmatter},
    sync::{RemoteCatalogSync, RemoteSyncConfig, merge_with_local},
    types::{CatalogSnapshot, CatalogStats, InstalledSkillRecord, SkillDescriptor, SkillSource},
    validate::{ValidationReport, validate_skill_dir},
};

/// What to install.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallTarget {
    /// A catalog entry, by name.
    Catalog(String),
    /// A local directory installed under an explicit name.
    Local { name: String, path: PathBuf },
}

impl InstallTarget {
    pub fn name(&self) -> &str {
        match self {
            Self::Catalog(name) | Self::Local { name, .. } => name,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallRequest {
    pub target: InstallTarget,
    /// Reinstall even if already installed.
    pub force: bool,
    /// Branch override for github sources.
    pub branch: Option<String>,
}

impl InstallRequest {
    pub fn catalog(name: impl Into<String>) -> Self {
        Self {
            target: InstallTarget::Catalog(name.into()),
            force: false,
            branch: None,
        }
    }

    pub fn local(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            target: InstallTarget::Local {
                name: name.into(),
                path: path.into(),
            },
            force: false,
            branch: None,
        }
    }

    #[must_use]
    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    #[must_use]
    pub fn branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = Some(branch.into());
        self
    }
}

#[derive(Debug, Clone)]
pub struct InstalledSkill {
    pub record: InstalledSkillRecord,
    /// Absolute install directory.
    pub path: PathBuf,
    pub link: LinkOutcome,
    /// Validation of the new tree; may carry warnings.
    pub report: ValidationReport,
}

#[derive(Debug, Clone)]
pub enum InstallOutcome {
    Installed(InstalledSkill),
    /// Nothing was changed; pass `force` to reinstall.
    AlreadyInstalled {
        record: InstalledSkillRecord,
        path: PathBuf,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UninstallOutcome {
    NotInstalled,
    Removed {
        path: PathBuf,
        link: UnlinkOutcome,
        /// `false` when the install directory was already gone.
        files_removed: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidateTarget {
    /// Any directory; nothing is recorded.
    Path(PathBuf),
    /// An installed skill; the result is written back to its record.
    Installed(String),
}

#[derive(Debug, Clone)]
pub struct SkillInfo {
    pub record: InstalledSkillRecord,
    pub path: PathBuf,
    pub header: Option<ManifestHeader>,
}

pub struct SkillManager {
    config: StoreConfig,
    catalog: Option<CatalogRegistry>,
    installed: InstalledRegistry,
    sync: RemoteCatalogSync,
    fetcher: Box<dyn SourceFetcher>,
    linker: DiscoveryLinker,
}

impl SkillManager {
    /// Manager with the HTTP fetcher and the default link strategies.
    pub fn open(config: StoreConfig) -> Result<Self> {
        let fetcher = Box::new(DefaultFetcher::new(&config.github));
        let linker = DiscoveryLinker::new(config.discovery_dir());
        Self::with_components(config, fetcher, linker)
    }

    pub fn with_components(
        config: StoreConfig,
        fetcher: Box<dyn SourceFetcher>,
        linker: DiscoveryLinker,
    ) -> Result<Self> {
        let installed = InstalledRegistry::open(&config.project_root, config.installed_path())?;
        let sync = RemoteCatalogSync::open(config.remote_config_path(), &config.github)?;
        Ok(Self {
            config,
            catalog: None,
            installed,
            sync,
            fetcher,
            linker,
        })
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn remote_config(&self) -> &RemoteSyncConfig {
        self.sync.config()
    }

    /// The catalog, loaded from disk on first use.
    pub fn catalog(&mut self) -> Result<&CatalogRegistry> {
        let catalog = match self.catalog.take() {
            Some(catalog) => catalog,
            None => CatalogRegistry::load(self.config.catalog_path())?,
        };
        Ok(self.catalog.insert(catalog))
    }

    // ── Install ──────────────────────────────────────────────────────────────

    pub async fn install(&mut self, request: InstallRequest) -> Result<InstallOutcome> {
        let name = request.target.name().to_string();
        if !is_plain_component(&name) {
            return Err(Error::invalid_source(format!(
                "skill name '{name}' must be a single path component"
            )));
        }

        let source = self.resolve_source(&request)?;

        if !request.force
            && let Some(record) = self.installed.get(&name)
        {
            info!(skill = %name, "already installed");
            return Ok(InstallOutcome::AlreadyInstalled {
                path: self.installed.absolute_path(record),
                record: record.clone(),
            });
        }

        let skills_dir = self.installed.skills_dir();
        tokio::fs::create_dir_all(&skills_dir)
            .await
            .map_err(|e| Error::io("create", &skills_dir, e))?;
        let staging = skills_dir.join(format!(".{name}.staging"));
        let target = skills_dir.join(&name);

        remove_tree(&staging)
            .await
            .map_err(|e| Error::io("clear staging", &staging, e))?;

        info!(skill = %name, %source, "fetching skill");
        if let Err(e) = self.fetcher.fetch(&source, &staging).await {
            discard(&staging).await;
            return Err(Error::Fetch { name, source: e });
        }

        let report = validate_skill_dir(&staging);
        if !report.is_valid() {
            discard(&staging).await;
            warn!(skill = %name, errors = %report.summary(), "fetched skill failed validation");
            return Err(Error::ValidationFailed { name, report });
        }

        if let Err(e) = remove_tree(&target).await {
            discard(&staging).await;
            return Err(Error::io("remove previous install", &target, e));
        }
        if let Err(e) = tokio::fs::rename(&staging, &target).await {
            discard(&staging).await;
            return Err(Error::io("move staging into", &target, e));
        }

        self.installed.add(&name, &target, source)?;
        let link = self.linker.link(&name, &target);
        let record = self
            .installed
            .get(&name)
            .cloned()
            .with_context(|| format!("record for '{name}' missing right after install"))?;

        info!(skill = %name, path = %target.display(), link = ?link.kind, "installed skill");
        Ok(InstallOutcome::Installed(InstalledSkill {
            record,
            path: target,
            link,
            report,
        }))
    }

    fn resolve_source(&mut self, request: &InstallRequest) -> Result<SkillSource> {
        let source = match &request.target {
            InstallTarget::Local { path, .. } => SkillSource::Local {
                path: std::path::absolute(path).map_err(|e| Error::io("resolve", path, e))?,
            },
            InstallTarget::Catalog(name) => {
                let descriptor = self
                    .catalog()?
                    .get(name)
                    .ok_or_else(|| Error::not_found("skill", name.as_str()))?;
                match descriptor.source.clone() {
                    SkillSource::Local { path } => SkillSource::Local {
                        path: self.config.resolve(&path),
                    },
                    github @ SkillSource::Github { .. } => github,
                }
            },
        };

        Ok(match source {
            SkillSource::Github { ref branch, .. } => {
                let effective = request
                    .branch
                    .clone()
                    .or_else(|| branch.clone())
                    .unwrap_or_else(|| SkillSource::DEFAULT_BRANCH.to_string());
                source.with_branch(effective)
            },
            local @ SkillSource::Local { .. } => local,
        })
    }

    // ── Uninstall ────────────────────────────────────────────────────────────

    /// Remove the discovery entry, the install tree, then the record.
    ///
    /// If the tree cannot be removed the record is kept, marked invalid, and
    /// the error is returned.
    pub async fn uninstall(&mut self, name: &str) -> Result<UninstallOutcome> {
        let Some(record) = self.installed.get(name) else {
            debug!(skill = %name, "not installed, nothing to uninstall");
            return Ok(UninstallOutcome::NotInstalled);
        };
        let path = self.installed.absolute_path(record);

        let link = self.linker.unlink(name)?;

        let files_removed = tokio::fs::symlink_metadata(&path).await.is_ok();
        if let Err(e) = remove_tree(&path).await {
            warn!(skill = %name, path = %path.display(), error = %e, "failed to remove install directory");
            self.installed
                .update_validity(name, false, Some(format!("uninstall incomplete: {e}")))?;
            return Err(Error::io("remove", &path, e));
        }

        self.installed.remove(name)?;
        info!(skill = %name, "uninstalled skill");
        Ok(UninstallOutcome::Removed {
            path,
            link,
            files_removed,
        })
    }

    // ── Validate ─────────────────────────────────────────────────────────────

    pub fn validate(&mut self, target: ValidateTarget) -> Result<ValidationReport> {
        match target {
            ValidateTarget::Path(path) => Ok(validate_skill_dir(&path)),
            ValidateTarget::Installed(name) => {
                let record = self
                    .installed
                    .get(&name)
                    .ok_or_else(|| Error::not_found("installed skill", name.as_str()))?;
                let report = validate_skill_dir(&self.installed.absolute_path(record));
                let errors = (!report.is_valid()).then(|| report.summary());
                self.installed
                    .update_validity(&name, report.is_valid(), errors)?;
                Ok(report)
            },
        }
    }

    /// Re-validate every installed skill, updating each record.
    pub fn revalidate_all(&mut self) -> Result<Vec<(String, ValidationReport)>> {
        let names: Vec<String> = self
            .installed
            .list()
            .into_iter()
            .map(|r| r.name.clone())
            .collect();
        names
            .into_iter()
            .map(|name| {
                let report = self.validate(ValidateTarget::Installed(name.clone()))?;
                Ok((name, report))
            })
            .collect()
    }

    // ── Catalog ──────────────────────────────────────────────────────────────

    pub async fn search(
        &mut self,
        query: &str,
        filter: &SearchFilter,
    ) -> Result<Vec<SkillDescriptor>> {
        let auto = &self.sync.config().auto_sync;
        if auto.enabled && auto.on_search {
            self.sync_catalog(false).await?;
        }
        Ok(self
            .catalog()?
            .search(query, filter)
            .into_iter()
            .cloned()
            .collect())
    }

    pub async fn list_all(&mut self, category: Option<&str>) -> Result<Vec<SkillDescriptor>> {
        let auto = &self.sync.config().auto_sync;
        if auto.enabled && auto.on_list_all {
            self.sync_catalog(false).await?;
        }
        Ok(self
            .catalog()?
            .list_all(category)
            .into_iter()
            .cloned()
            .collect())
    }

    /// Refresh from the remote sources and merge into the local catalog.
    ///
    /// Returns the new stats when the catalog changed. Remote failures are
    /// logged and reported as `None`; local catalog errors are returned.
    pub async fn sync_catalog(&mut self, force: bool) -> Result<Option<CatalogStats>> {
        let remote = match self.sync.refresh(force).await {
            Ok(Some(remote)) => remote,
            Ok(None) => return Ok(None),
            Err(e) => {
                warn!(error = %e, "remote catalog sync failed, keeping local catalog");
                return Ok(None);
            },
        };

        let local = match self.catalog() {
            Ok(catalog) => catalog.snapshot().clone(),
            Err(Error::NotFound { .. }) => CatalogSnapshot::default(),
            Err(e) => return Err(e),
        };
        let merged = merge_with_local(&local, &remote);

        let path = self.config.catalog_path();
        let catalog = self
            .catalog
            .get_or_insert_with(|| CatalogRegistry::from_snapshot(path, CatalogSnapshot::default()));
        catalog.save(merged)?;
        info!(skills = catalog.snapshot().skills.len(), "catalog synced with remote");
        Ok(Some(catalog.stats().clone()))
    }

    // ── Installed ────────────────────────────────────────────────────────────

    pub fn installed(&self) -> Vec<&InstalledSkillRecord> {
        self.installed.list()
    }

    pub fn info(&self, name: &str) -> Option<SkillInfo> {
        let record = self.installed.get(name)?;
        let path = self.installed.absolute_path(record);
        Some(SkillInfo {
            record: record.clone(),
            header: read_frontmatter(&path),
            path,
        })
    }
}

/// Remove whatever is at `path`; absence is not an error.
async fn remove_tree(path: &Path) -> std::io::Result<()> {
    match tokio::fs::symlink_metadata(path).await {
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
        Ok(meta) if meta.is_dir() => tokio::fs::remove_dir_all(path).await,
        Ok(_) => tokio::fs::remove_file(path).await,
    }
}

async fn discard(staging: &Path) {
    if let Err(e) = remove_tree(staging).await {
        warn!(path = %staging.display(), error = %e, "failed to remove staging directory");
    }
}
