use std::path::{Path, PathBuf};

use {
    secrecy::Secret,
    serde::{Deserialize, Serialize},
};

/// Root configuration handed to every store component.
///
/// `project_root` is never read from the config file; the caller supplies it
/// and every relative path below is resolved against it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    #[serde(skip)]
    pub project_root: PathBuf,
    pub paths: PathsConfig,
    pub github: GithubConfig,
}

impl StoreConfig {
    /// Default layout rooted at `project_root`.
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        Self {
            project_root: project_root.into(),
            ..Self::default()
        }
    }

    /// Resolve a configured path against the project root. Absolute paths are returned as-is.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.project_root.join(path)
        }
    }

    pub fn data_dir(&self) -> PathBuf {
        self.resolve(&self.paths.data_dir)
    }

    /// Catalog document: `<data>/skills-registry.json`.
    pub fn catalog_path(&self) -> PathBuf {
        self.data_dir().join(&self.paths.catalog_file)
    }

    /// Installation document: `<data>/installed-skills.json`.
    pub fn installed_path(&self) -> PathBuf {
        self.data_dir().join(&self.paths.installed_file)
    }

    /// Remote sync config: `<data>/remote-registry-config.json`.
    pub fn remote_config_path(&self) -> PathBuf {
        self.data_dir().join(&self.paths.remote_config_file)
    }

    /// Directory the host application scans for installed skills.
    pub fn discovery_dir(&self) -> PathBuf {
        self.resolve(&self.paths.discovery_dir)
    }
}

/// On-disk layout. Relative entries resolve against the project root,
/// file names resolve against `data_dir`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub data_dir: PathBuf,
    pub catalog_file: String,
    pub installed_file: String,
    pub remote_config_file: String,
    pub discovery_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            catalog_file: "skills-registry.json".into(),
            installed_file: "installed-skills.json".into(),
            remote_config_file: "remote-registry-config.json".into(),
            discovery_dir: PathBuf::from("plugin-skills"),
        }
    }
}

/// GitHub endpoints and the optional credential passed through to every request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GithubConfig {
    /// REST API base used for directory listings and the contents endpoint.
    pub api_base: String,
    /// Raw content host used for per-file downloads.
    pub raw_base: String,
    pub user_agent: String,
    #[serde(skip_serializing)]
    pub token: Option<Secret<String>>,
    /// Timeout applied to the remote catalog metadata check only.
    pub metadata_timeout_secs: u64,
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.github.com".into(),
            raw_base: "https://raw.githubusercontent.com".into(),
            user_agent: "skillshelf".into(),
            token: None,
            metadata_timeout_secs: 10,
        }
    }
}
