use std::path::{Path, PathBuf};

use {
    chrono::{DateTime, Utc},
    indexmap::{IndexMap, IndexSet},
    serde::{Deserialize, Serialize},
    serde_json::Value,
};

// ── Source descriptor ────────────────────────────────────────────────────────

/// Where a skill bundle is fetched from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SkillSource {
    /// A directory inside a GitHub repository.
    Github {
        /// `owner/repo`.
        repo: String,
        /// Directory of the bundle inside the repository.
        #[serde(rename = "path", default)]
        path_in_repo: String,
        /// Browser URL, informational only.
        #[serde(default, skip_serializing_if = "String::is_empty")]
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        branch: Option<String>,
    },
    /// A directory on the local filesystem.
    Local { path: PathBuf },
}

impl SkillSource {
    pub const DEFAULT_BRANCH: &'static str = "main";

    /// The `type` tag as written in documents (`github` or `local`).
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Github { .. } => "github",
            Self::Local { .. } => "local",
        }
    }

    /// Pin the branch of a github source. Local sources are returned unchanged.
    pub fn with_branch(self, branch: impl Into<String>) -> Self {
        match self {
            Self::Github {
                repo,
                path_in_repo,
                url,
                ..
            } => Self::Github {
                repo,
                path_in_repo,
                url,
                branch: Some(branch.into()),
            },
            local @ Self::Local { .. } => local,
        }
    }

    pub fn local(path: impl AsRef<Path>) -> Self {
        Self::Local {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl std::fmt::Display for SkillSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Github {
                repo,
                path_in_repo,
                branch,
                ..
            } => write!(
                f,
                "github:{repo}@{}:{path_in_repo}",
                branch.as_deref().unwrap_or(Self::DEFAULT_BRANCH)
            ),
            Self::Local { path } => write!(f, "local:{}", path.display()),
        }
    }
}

// ── Catalog ──────────────────────────────────────────────────────────────────

/// Searchable metadata attached to a catalog entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default)]
    pub tags: IndexSet<String>,
}

/// One catalog entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillDescriptor {
    /// Unique key, lowercase alphanumerics and hyphens.
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub source: SkillSource,
    #[serde(default)]
    pub metadata: SkillMetadata,
    /// Fields this crate does not interpret, kept so a rewrite does not drop them.
    #[serde(flatten)]
    pub extra: IndexMap<String, Value>,
}

/// Aggregate counters stored alongside the catalog.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CatalogStats {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_skills: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_skills: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_skills: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_sync: Option<String>,
    #[serde(flatten)]
    pub extra: IndexMap<String, Value>,
}

/// The full catalog document. `skills` keeps document order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CatalogSnapshot {
    #[serde(default)]
    pub skills: IndexMap<String, SkillDescriptor>,
    #[serde(default)]
    pub categories: IndexMap<String, Value>,
    #[serde(default)]
    pub stats: CatalogStats,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<String>,
    #[serde(flatten)]
    pub extra: IndexMap<String, Value>,
}

impl CatalogSnapshot {
    /// First entry whose map key differs from its own `name`, if any.
    pub fn mismatched_key(&self) -> Option<(&str, &str)> {
        self.skills
            .iter()
            .find(|(key, skill)| *key != &skill.name)
            .map(|(key, skill)| (key.as_str(), skill.name.as_str()))
    }
}

// ── Installation document ────────────────────────────────────────────────────

/// Durable record of one installed skill.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstalledSkillRecord {
    pub name: String,
    /// Relative to the project root when the install lives under it.
    pub install_path: PathBuf,
    pub source: SkillSource,
    pub installed_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    #[serde(default = "default_valid")]
    pub is_valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation_errors: Option<String>,
}

fn default_valid() -> bool {
    true
}

/// Settings persisted inside the installation document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallConfig {
    #[serde(default = "default_skills_path")]
    pub local_skills_path: PathBuf,
    #[serde(default)]
    pub auto_update: bool,
    #[serde(default = "default_update_interval")]
    pub update_interval_hours: u32,
}

fn default_skills_path() -> PathBuf {
    PathBuf::from("skills")
}

fn default_update_interval() -> u32 {
    24
}

impl Default for InstallConfig {
    fn default() -> Self {
        Self {
            local_skills_path: default_skills_path(),
            auto_update: false,
            update_interval_hours: default_update_interval(),
        }
    }
}

/// Top-level installation document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstalledDocument {
    pub version: String,
    #[serde(default)]
    pub installed_skills: IndexMap<String, InstalledSkillRecord>,
    #[serde(default)]
    pub config: InstallConfig,
}

impl Default for InstalledDocument {
    fn default() -> Self {
        Self {
            version: "1.0.0".into(),
            installed_skills: IndexMap::new(),
            config: InstallConfig::default(),
        }
    }
}
